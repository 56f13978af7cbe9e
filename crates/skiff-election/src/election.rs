//! The election driver.
//!
//! One background task per election walks the phases in [`crate::pure`]:
//! it attempts `create`, renews while winning and polls while losing,
//! blocking only on the phase ticker or on a stop/cancel signal. The task
//! is the single writer of the outcome channel and drops it right after
//! the terminal outcome, which closes the channel exactly once.
//!
//! Stopping never deletes the lease. The leader just stops renewing and
//! the bucket TTL removes the key, after which a polling follower takes
//! over.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use skiff_kv::KvError;
use skiff_kv::VersionedStore;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::CandidateId;
use crate::config::ElectionConfig;
use crate::error::ElectionError;
use crate::outcome::Outcome;
use crate::pure;
use crate::pure::Phase;
use crate::pure::Step;

/// Receiving end of an election's outcome stream.
///
/// Unbounded so that a slow consumer never delays a lease renewal. The
/// task only sends on state changes, so the backlog stays small.
pub type OutcomeReceiver = mpsc::UnboundedReceiver<Outcome>;

/// A single candidate's participation in the election for one key.
///
/// An election runs at most once. After its terminal outcome a new
/// instance must be created to participate again.
///
/// # Example
///
/// ```ignore
/// let election = Election::new(store, ElectionConfig::for_ttl("resize-leader", ttl))?;
/// let mut outcomes = election.start(&shutdown)?;
///
/// // Later, from any task holding the election:
/// election.stop();
/// while let Some(outcome) = outcomes.recv().await {
///     // last value is Outcome::Stopped
/// }
/// ```
pub struct Election<S: VersionedStore + ?Sized + 'static> {
    store: Arc<S>,
    config: ElectionConfig,
    stop: CancellationToken,
    started: AtomicBool,
}

impl<S: VersionedStore + ?Sized + 'static> Election<S> {
    /// Create an election against `store`.
    ///
    /// Fails if the bucket has no TTL or if either interval is not shorter
    /// than the TTL.
    pub fn new(store: Arc<S>, config: ElectionConfig) -> Result<Self, ElectionError> {
        let ttl = store.ttl().ok_or_else(|| ElectionError::MissingTtl {
            bucket: store.bucket().to_string(),
        })?;
        config.validate(ttl)?;

        Ok(Self {
            store,
            config,
            stop: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn candidate_id(&self) -> &CandidateId {
        &self.config.candidate_id
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Start the background task and return its outcome stream.
    ///
    /// Cancelling `ctx` ends the election with [`Outcome::Cancelled`].
    pub fn start(&self, ctx: &CancellationToken) -> Result<OutcomeReceiver, ElectionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ElectionError::AlreadyStarted {
                key: self.config.key.clone(),
            });
        }

        let (outcomes, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            store: self.store.clone(),
            config: self.config.clone(),
            stop: self.stop.clone(),
            ctx: ctx.clone(),
            outcomes,
        };
        tokio::spawn(driver.run());

        Ok(rx)
    }

    /// Request shutdown. Returns immediately; the outcome stream reports
    /// [`Outcome::Stopped`] and then closes.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!(key = %self.config.key, candidate = %self.config.candidate_id, "stop requested");
            self.stop.cancel();
        }
    }

    /// Returns true once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl<S: VersionedStore + ?Sized + 'static> Drop for Election<S> {
    fn drop(&mut self) {
        // The task keeps its own clone of the token and still reports Stopped.
        self.stop.cancel();
    }
}

/// Why a phase wait returned.
enum Wake {
    /// The phase ticker fired.
    Tick,
    /// Stop or context cancellation.
    Interrupted(Outcome),
    /// The outcome receiver was dropped.
    Abandoned,
}

/// State owned by the background task.
struct Driver<S: VersionedStore + ?Sized + 'static> {
    store: Arc<S>,
    config: ElectionConfig,
    stop: CancellationToken,
    ctx: CancellationToken,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl<S: VersionedStore + ?Sized + 'static> Driver<S> {
    async fn run(self) {
        debug!(key = %self.config.key, candidate = %self.config.candidate_id, "election started");

        match self.drive().await {
            Some(outcome) => {
                info!(
                    key = %self.config.key,
                    candidate = %self.config.candidate_id,
                    outcome = %outcome,
                    "election finished"
                );
                let _ = self.outcomes.send(outcome);
            }
            None => {
                debug!(
                    key = %self.config.key,
                    candidate = %self.config.candidate_id,
                    "outcome receiver dropped, abandoning election"
                );
            }
        }
        // Dropping self closes the channel.
    }

    /// Run phases until a terminal outcome. Returns `None` if the receiver
    /// went away first.
    async fn drive(&self) -> Option<Outcome> {
        let key = self.config.key.as_str();
        let value = self.config.candidate_id.as_bytes();
        let mut phase = Phase::Electing;
        let mut ticker: Option<Interval> = None;

        loop {
            let step = match phase {
                Phase::Electing => {
                    if let Some(outcome) = self.interrupted() {
                        return Some(outcome);
                    }
                    pure::on_create(self.call(self.store.create(key, value)).await)
                }
                Phase::Winner { revision } => {
                    let ticker = ticker.get_or_insert_with(|| phase_ticker(self.config.update_interval()));
                    match self.wait(ticker).await {
                        Wake::Tick => {}
                        Wake::Interrupted(outcome) => return Some(outcome),
                        Wake::Abandoned => return None,
                    }
                    pure::on_renew(self.call(self.store.update(key, value, revision)).await)
                }
                Phase::Loser => {
                    let ticker = ticker.get_or_insert_with(|| phase_ticker(self.config.poll_interval()));
                    match self.wait(ticker).await {
                        Wake::Tick => {}
                        Wake::Interrupted(outcome) => return Some(outcome),
                        Wake::Abandoned => return None,
                    }
                    pure::on_poll(self.call(self.store.get(key)).await)
                }
            };

            match step {
                Step::Enter { phase: next, outcome } => {
                    self.trace_transition(&phase, &next);
                    if let Some(outcome) = outcome {
                        if !self.emit(outcome) {
                            return None;
                        }
                    }
                    if !phase.same_kind(&next) {
                        ticker = None;
                    }
                    phase = next;
                }
                Step::Finish(outcome) => {
                    warn!(
                        key,
                        candidate = %self.config.candidate_id,
                        phase = ?phase,
                        outcome = %outcome,
                        "store failure, shutting down election"
                    );
                    return Some(outcome);
                }
            }
        }
    }

    /// Block until the next tick, or report why the election must end.
    async fn wait(&self, ticker: &mut Interval) -> Wake {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Wake::Interrupted(Outcome::Stopped),
            _ = self.ctx.cancelled() => Wake::Interrupted(Outcome::Cancelled),
            _ = self.outcomes.closed() => Wake::Abandoned,
            _ = ticker.tick() => Wake::Tick,
        }
    }

    fn interrupted(&self) -> Option<Outcome> {
        if self.stop.is_cancelled() {
            Some(Outcome::Stopped)
        } else if self.ctx.is_cancelled() {
            Some(Outcome::Cancelled)
        } else {
            None
        }
    }

    /// Run a store call under the configured time budget.
    async fn call<T>(&self, op: impl Future<Output = Result<T, KvError>>) -> Result<T, KvError> {
        match self.config.op_timeout() {
            Some(limit) => tokio::time::timeout(limit, op).await.unwrap_or(Err(KvError::Timeout {
                duration_ms: self.config.op_timeout_ms.unwrap_or_default(),
            })),
            None => op.await,
        }
    }

    fn emit(&self, outcome: Outcome) -> bool {
        info!(key = %self.config.key, candidate = %self.config.candidate_id, outcome = %outcome, "election outcome");
        self.outcomes.send(outcome).is_ok()
    }

    fn trace_transition(&self, from: &Phase, to: &Phase) {
        match (from, to) {
            (Phase::Winner { .. }, Phase::Winner { revision }) => {
                debug!(key = %self.config.key, revision = revision.value(), "lease renewed");
            }
            (Phase::Loser, Phase::Loser) => {
                debug!(key = %self.config.key, "lease still held elsewhere");
            }
            (Phase::Loser, Phase::Electing) => {
                debug!(key = %self.config.key, candidate = %self.config.candidate_id, "lease vacant, re-electing");
            }
            _ => {}
        }
    }
}

/// Ticker whose first tick fires one period from now.
fn phase_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use skiff_kv::BucketConfig;
    use skiff_kv::InMemoryBucket;

    use super::*;
    use crate::outcome::Status;

    const TTL: Duration = Duration::from_secs(2);

    fn bucket() -> Arc<InMemoryBucket> {
        InMemoryBucket::new(BucketConfig::new("scalers", TTL))
    }

    fn election(store: &Arc<InMemoryBucket>) -> Election<InMemoryBucket> {
        Election::new(store.clone(), ElectionConfig::for_ttl("resize-leader", TTL)).unwrap()
    }

    async fn drain(rx: &mut OutcomeReceiver) -> Vec<Status> {
        let mut statuses = Vec::new();
        while let Some(outcome) = rx.recv().await {
            statuses.push(outcome.status());
        }
        statuses
    }

    #[tokio::test]
    async fn test_rejects_bucket_without_ttl() {
        let store = InMemoryBucket::new(BucketConfig::new("forever", Duration::ZERO));
        let result = Election::new(store, ElectionConfig::for_ttl("resize-leader", TTL));
        assert_eq!(
            result.err(),
            Some(ElectionError::MissingTtl {
                bucket: "forever".into()
            })
        );
    }

    #[tokio::test]
    async fn test_rejects_slow_renewal() {
        let mut config = ElectionConfig::for_ttl("resize-leader", TTL);
        config.update_interval_ms = 2500;
        let result = Election::new(bucket(), config);
        assert!(matches!(result, Err(ElectionError::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_candidate_wins_and_stops() {
        let store = bucket();
        let election = election(&store);
        let ctx = CancellationToken::new();
        let mut rx = election.start(&ctx).unwrap();

        assert_eq!(rx.recv().await, Some(Outcome::Won));
        let entry = store.get("resize-leader").await.unwrap();
        assert_eq!(entry.value, election.candidate_id().as_bytes());

        election.stop();
        assert_eq!(drain(&mut rx).await, vec![Status::Stopped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let store = bucket();
        let election = election(&store);
        let ctx = CancellationToken::new();
        let _rx = election.start(&ctx).unwrap();

        assert_eq!(
            election.start(&ctx).err(),
            Some(ElectionError::AlreadyStarted {
                key: "resize-leader".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let store = bucket();
        let election = election(&store);
        let mut rx = election.start(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await, Some(Outcome::Won));

        election.stop();
        election.stop();
        assert!(election.is_stopped());
        assert_eq!(drain(&mut rx).await, vec![Status::Stopped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_never_writes() {
        let store = bucket();
        let election = election(&store);
        election.stop();

        let mut rx = election.start(&CancellationToken::new()).unwrap();
        assert_eq!(drain(&mut rx).await, vec![Status::Stopped]);
        assert!(store.get("resize-leader").await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_cancel_reports_cancelled() {
        let store = bucket();
        let election = election(&store);
        let ctx = CancellationToken::new();
        let mut rx = election.start(&ctx).unwrap();
        assert_eq!(rx.recv().await, Some(Outcome::Won));

        ctx.cancel();
        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(outcome.error(), Some(ElectionError::Cancelled));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_is_fatal() {
        let store = bucket();
        let source = KvError::Unavailable {
            reason: "no responders".into(),
        };
        store.fail_next(source.clone()).await;

        let election = election(&store);
        let mut rx = election.start(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await, Some(Outcome::Error(source)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_failure_is_fatal() {
        let store = bucket();
        let election = election(&store);
        let mut rx = election.start(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await, Some(Outcome::Won));

        store.fail_next(KvError::Timeout { duration_ms: 100 }).await;
        assert_eq!(rx.recv().await, Some(Outcome::Error(KvError::Timeout { duration_ms: 100 })));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leader_loses_when_key_is_replaced() {
        let store = bucket();
        let election = election(&store);
        let mut rx = election.start(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await, Some(Outcome::Won));

        // Someone else takes the key between renewals.
        store.delete("resize-leader").await.unwrap();
        store.create("resize-leader", b"intruder").await.unwrap();

        assert_eq!(rx.recv().await, Some(Outcome::Lost));
        election.stop();
        assert_eq!(drain(&mut rx).await, vec![Status::Stopped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_stops_renewing() {
        let store = bucket();
        let election = election(&store);
        let mut rx = election.start(&CancellationToken::new()).unwrap();
        assert_eq!(rx.recv().await, Some(Outcome::Won));
        let revision = store.current_revision().await;
        drop(rx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.current_revision().await, revision);
        assert!(store.get("resize-leader").await.unwrap_err().is_not_found());
    }
}
