//! Leader-gated function scalers.
//!
//! Every replica of a scaler joins the election for its function's leader
//! key. Only the replica holding the lease runs the reconcile loop; the
//! others wait for the lease to become free. Deciding *how many*
//! instances a function needs is left to the [`Autoscaler`].

mod set;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skiff_election::CandidateId;
use skiff_election::Election;
use skiff_election::ElectionConfig;
use skiff_election::ElectionError;
use skiff_election::Outcome;
use skiff_election::OutcomeReceiver;
use skiff_election::Status;
use skiff_kv::VersionedStore;
use snafu::ResultExt;
use snafu::Snafu;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::ScalerSettings;

pub use set::ScalerSet;

/// Key contested by the scalers of `function`.
pub fn leader_key(function: &str) -> String {
    format!("{function}-leader")
}

/// Scaling decisions for one function. Only called while leading.
#[async_trait]
pub trait Autoscaler: Send + Sync + 'static {
    /// Bring the function's instance count in line with its load.
    async fn reconcile(&self, function: &str) -> anyhow::Result<()>;
}

/// Autoscaler that only records when a decision would be made.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAutoscaler;

#[async_trait]
impl Autoscaler for LoggingAutoscaler {
    async fn reconcile(&self, function: &str) -> anyhow::Result<()> {
        debug!(function, "reconcile");
        Ok(())
    }
}

/// Errors that end a scaler.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ScalerError {
    /// The election could not be created or failed fatally.
    #[snafu(display("election for function '{function}' failed: {source}"))]
    Election { function: String, source: ElectionError },
}

/// Runs the leader-gated reconcile loop for one function.
pub struct Scaler<S: VersionedStore + ?Sized + 'static, A: Autoscaler + ?Sized> {
    function: String,
    store: Arc<S>,
    autoscaler: Arc<A>,
    election: ElectionConfig,
    settings: ScalerSettings,
}

impl<S: VersionedStore + ?Sized + 'static, A: Autoscaler + ?Sized> Scaler<S, A> {
    /// Create a scaler. `election.key` is replaced by [`leader_key`].
    pub fn new(
        function: impl Into<String>,
        store: Arc<S>,
        autoscaler: Arc<A>,
        mut election: ElectionConfig,
        settings: ScalerSettings,
    ) -> Self {
        let function = function.into();
        election.key = leader_key(&function);
        Self {
            function,
            store,
            autoscaler,
            election,
            settings,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    /// Run until `ctx` is cancelled or the election fails.
    ///
    /// Returns the terminal status of the last election. A store failure
    /// pauses reconciling; with `recreate_on_error` a fresh election (and
    /// candidate ID) is started after `retry_delay`, otherwise the failure
    /// is returned.
    pub async fn run(self, ctx: CancellationToken) -> Result<Status, ScalerError> {
        loop {
            // A new instance per attempt; elections never restart.
            let config = self.election.clone().with_candidate_id(CandidateId::generate());
            let election = Election::new(self.store.clone(), config).context(ElectionSnafu {
                function: self.function.clone(),
            })?;
            let mut outcomes = election.start(&ctx).context(ElectionSnafu {
                function: self.function.clone(),
            })?;
            info!(
                function = %self.function,
                candidate = %election.candidate_id(),
                "joined leader election"
            );

            match self.follow(&election, &mut outcomes, &ctx).await {
                Outcome::Error(source) => {
                    let error = ElectionError::Store { source };
                    if !self.settings.recreate_on_error {
                        return Err(ScalerError::Election {
                            function: self.function.clone(),
                            source: error,
                        });
                    }
                    warn!(
                        function = %self.function,
                        error = %error,
                        retry_delay_ms = self.settings.retry_delay_ms,
                        "election failed, rejoining after delay"
                    );
                    if !sleep_unless_cancelled(self.settings.retry_delay(), &ctx).await {
                        return Ok(Status::Cancelled);
                    }
                }
                terminal => {
                    info!(function = %self.function, outcome = %terminal, "scaler stopped");
                    return Ok(terminal.status());
                }
            }
        }
    }

    /// Consume outcomes, reconciling while leading. Returns the terminal outcome.
    async fn follow(
        &self,
        election: &Election<S>,
        outcomes: &mut OutcomeReceiver,
        ctx: &CancellationToken,
    ) -> Outcome {
        let mut leading = false;
        let mut stopping = false;
        let mut ticker = tokio::time::interval(self.settings.scale_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                outcome = outcomes.recv() => match outcome {
                    Some(Outcome::Won) => {
                        info!(function = %self.function, "leading, reconciling resumed");
                        leading = true;
                        ticker.reset_immediately();
                    }
                    Some(Outcome::Lost) => {
                        if leading {
                            info!(function = %self.function, "leadership lost, reconciling paused");
                        }
                        leading = false;
                    }
                    Some(terminal) => return terminal,
                    // The task only drops the sender after the terminal outcome.
                    None => return Outcome::Stopped,
                },
                _ = ctx.cancelled(), if !stopping => {
                    stopping = true;
                    election.stop();
                }
                _ = ticker.tick(), if leading => {
                    if let Err(e) = self.autoscaler.reconcile(&self.function).await {
                        warn!(function = %self.function, error = %e, "reconcile failed");
                    }
                }
            }
        }
    }
}

/// Returns false if `ctx` was cancelled first.
async fn sleep_unless_cancelled(delay: Duration, ctx: &CancellationToken) -> bool {
    tokio::select! {
        _ = ctx.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
