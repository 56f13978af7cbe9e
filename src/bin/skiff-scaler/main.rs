//! skiff-scaler: runs one leader-elected scaler per function.
//!
//! Leases live in an in-process bucket, so replicas only contend within
//! this process. Remote store adapters implement `skiff_kv::VersionedStore`.

mod args;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use skiff::LoggingAutoscaler;
use skiff::ScalerSet;
use skiff::SkiffConfig;
use skiff_kv::InMemoryBucket;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::args::Args;

/// Initialize tracing subscriber with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = SkiffConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let store = InMemoryBucket::new(config.bucket_config());
    let ctx = CancellationToken::new();
    let scalers = ScalerSet::spawn(store, Arc::new(LoggingAutoscaler), &config, ctx.clone());

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    scalers.shutdown();

    let mut failed = 0;
    for (function, result) in scalers.join().await {
        if let Err(e) = result {
            warn!(function = %function, error = %e, "scaler exited with error");
            failed += 1;
        }
    }
    anyhow::ensure!(failed == 0, "{failed} scaler(s) failed");
    Ok(())
}
