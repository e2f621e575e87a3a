use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "castray")]
#[command(about = "CastRay cluster feed CLI", long_about = None)]
pub struct Args {
    /// castray-bff base URL
    #[arg(long, env = "CASTRAY_BFF_URL", default_value = "http://127.0.0.1:8888")]
    pub bff_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the current cluster snapshot
    Status {
        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the BFF to re-fetch the cluster feed now
    Refresh,
    /// Fetch and normalize a cluster API directly, without a BFF
    Probe {
        /// Cluster API base URL
        #[arg(long, env = "CASTRAY_API_BASE", default_value = "http://localhost:8000")]
        cluster_url: String,

        #[arg(long, default_value = "/api/status")]
        status_path: String,

        #[arg(long, default_value = "/api/nodes")]
        nodes_path: String,

        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        /// Seed for simulated utilization
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        json: bool,
    },
    /// Poll the BFF and reprint the status until interrupted
    Watch {
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
}
