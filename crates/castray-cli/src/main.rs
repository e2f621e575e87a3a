mod args;
mod client;
mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use castray_common::ClusterSnapshot;
use castray_feed::{
    fetch_and_normalize, HttpTransport, Normalizer, SeededSampler, ThreadRngSampler,
    UsageSampler,
};

use crate::args::{Args, Command};
use crate::client::BffClient;
use crate::output::{print_snapshot, print_summary, Summary};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let bff = BffClient::new(&args.bff_url);

    match args.command {
        Command::Status { json } => {
            let snap: ClusterSnapshot = bff.get("/snapshot").await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snap)?);
            } else {
                print_snapshot(&snap);
            }
        }
        Command::Refresh => {
            let summary: Summary = bff.post("/refresh").await?;
            println!("✓ Refreshed");
            print_summary(&summary);
        }
        Command::Probe {
            cluster_url,
            status_path,
            nodes_path,
            timeout_secs,
            seed,
            json,
        } => {
            let timeout = Duration::from_secs(timeout_secs);
            let transport =
                HttpTransport::new(&cluster_url, timeout)?.with_paths(status_path, nodes_path);
            let sampler: Arc<dyn UsageSampler> = match seed {
                Some(seed) => Arc::new(SeededSampler::new(seed)),
                None => Arc::new(ThreadRngSampler),
            };
            let snap = fetch_and_normalize(&transport, &Normalizer::new(sampler), timeout).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&snap)?);
            } else {
                print_snapshot(&snap);
            }
        }
        Command::Watch { interval_secs } => {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        match bff.get::<ClusterSnapshot>("/snapshot").await {
                            Ok(snap) => print_snapshot(&snap),
                            Err(e) => eprintln!("✗ {e}"),
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
