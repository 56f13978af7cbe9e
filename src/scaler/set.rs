//! One scaler task per configured function.

use std::sync::Arc;

use skiff_election::Status;
use skiff_kv::VersionedStore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Autoscaler;
use super::Scaler;
use super::ScalerError;
use super::leader_key;
use crate::config::SkiffConfig;

/// Result of one scaler task, keyed by function name.
pub type ScalerResult = (String, Result<Status, ScalerError>);

/// The scalers of one process, sharing a shutdown token.
pub struct ScalerSet {
    tasks: JoinSet<ScalerResult>,
    ctx: CancellationToken,
}

impl ScalerSet {
    /// Spawn a scaler for every function in `config.scaler.functions`.
    ///
    /// Cancelling `ctx` (or calling [`ScalerSet::shutdown`]) stops them all.
    pub fn spawn<S, A>(store: Arc<S>, autoscaler: Arc<A>, config: &SkiffConfig, ctx: CancellationToken) -> Self
    where
        S: VersionedStore + ?Sized + 'static,
        A: Autoscaler + ?Sized,
    {
        let mut tasks = JoinSet::new();
        for function in &config.scaler.functions {
            let scaler = Scaler::new(
                function.clone(),
                store.clone(),
                autoscaler.clone(),
                config.election_config(leader_key(function)),
                config.scaler.clone(),
            );
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let function = scaler.function().to_string();
                (function, scaler.run(ctx).await)
            });
        }
        info!(count = tasks.len(), bucket = store.bucket(), "scalers started");
        Self { tasks, ctx }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ask every scaler to stop. Returns immediately.
    pub fn shutdown(&self) {
        self.ctx.cancel();
    }

    /// Wait for every scaler to finish.
    pub async fn join(mut self) -> Vec<ScalerResult> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((function, Ok(status))) => {
                    info!(function = %function, status = %status, "scaler finished");
                    results.push((function, Ok(status)));
                }
                Ok((function, Err(e))) => {
                    warn!(function = %function, error = %e, "scaler failed");
                    results.push((function, Err(e)));
                }
                Err(e) => error!(error = %e, "scaler task panicked"),
            }
        }
        results
    }
}
