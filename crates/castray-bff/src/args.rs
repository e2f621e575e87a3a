use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "CASTRAY_BFF_ADDR", default_value = "0.0.0.0:8888")]
    pub listen_addr: String,

    /// Base URL of the cluster API.
    #[arg(long, env = "CASTRAY_API_BASE", default_value = "http://localhost:8000")]
    pub api_base: String,

    #[arg(long, env = "CASTRAY_STATUS_PATH", default_value = "/api/status")]
    pub status_path: String,

    #[arg(long, env = "CASTRAY_NODES_PATH", default_value = "/api/nodes")]
    pub nodes_path: String,

    #[arg(long, env = "CASTRAY_REFRESH_INTERVAL_SECS", default_value_t = 30)]
    pub refresh_interval_secs: u64,

    #[arg(long, env = "CASTRAY_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Keep serving the last live data as stale for this long after the
    /// cluster API becomes unreachable.
    #[arg(long, env = "CASTRAY_STALE_AFTER_SECS")]
    pub stale_after_secs: Option<u64>,

    /// Seed for simulated utilization, for reproducible demos.
    #[arg(long, env = "CASTRAY_SEED")]
    pub seed: Option<u64>,

    #[arg(long, env = "CASTRAY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "CASTRAY_OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    /// `text` or `json`.
    #[arg(long, env = "CASTRAY_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["castray-bff"]);
        assert_eq!(args.listen_addr, "0.0.0.0:8888");
        assert_eq!(args.refresh_interval_secs, 30);
        assert_eq!(args.fetch_timeout_secs, 10);
        assert!(args.stale_after_secs.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "castray-bff",
            "--api-base",
            "http://10.30.2.11:8265",
            "--nodes-path",
            "/api/v0/nodes",
            "--stale-after-secs",
            "120",
            "--seed",
            "7",
        ]);
        assert_eq!(args.api_base, "http://10.30.2.11:8265");
        assert_eq!(args.nodes_path, "/api/v0/nodes");
        assert_eq!(args.stale_after_secs, Some(120));
        assert_eq!(args.seed, Some(7));
    }
}
