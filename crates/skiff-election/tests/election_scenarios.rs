//! Multi-candidate election scenarios on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skiff_election::Election;
use skiff_election::ElectionConfig;
use skiff_election::Outcome;
use skiff_election::OutcomeReceiver;
use skiff_election::Status;
use skiff_kv::BucketConfig;
use skiff_kv::Entry;
use skiff_kv::InMemoryBucket;
use skiff_kv::KvError;
use skiff_kv::Revision;
use skiff_kv::VersionedStore;
use tokio_util::sync::CancellationToken;

const KEY: &str = "thumbnail-leader";
const TTL: Duration = Duration::from_secs(2);
const POLL: Duration = Duration::from_millis(500);

fn bucket() -> Arc<InMemoryBucket> {
    InMemoryBucket::new(BucketConfig::new("scalers", TTL))
}

struct Nominee<S: VersionedStore + ?Sized + 'static> {
    election: Election<S>,
    rx: OutcomeReceiver,
    last: Option<Status>,
}

impl<S: VersionedStore + ?Sized + 'static> Nominee<S> {
    fn start(store: Arc<S>, ctx: &CancellationToken) -> Self {
        let election = Election::new(store, ElectionConfig::for_ttl(KEY, TTL)).unwrap();
        let rx = election.start(ctx).unwrap();
        Self {
            election,
            rx,
            last: None,
        }
    }

    async fn next(&mut self) -> Option<Status> {
        let status = self.rx.recv().await.map(|o| o.status());
        if status.is_some() {
            self.last = status;
        }
        status
    }

    /// Record everything already delivered without waiting.
    fn catch_up(&mut self) {
        while let Ok(outcome) = self.rx.try_recv() {
            self.last = Some(outcome.status());
        }
    }

    /// Stop and collect the remaining outcomes until the channel closes.
    async fn stop_and_drain(&mut self) -> Vec<Status> {
        self.election.stop();
        let mut rest = Vec::new();
        while let Some(status) = self.next().await {
            rest.push(status);
        }
        rest
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_candidate_takes_over_after_stop() {
    let store = bucket();
    let ctx = CancellationToken::new();

    let mut a = Nominee::start(store.clone(), &ctx);
    assert_eq!(a.next().await, Some(Status::Won));

    let mut b = Nominee::start(store.clone(), &ctx);
    assert_eq!(b.next().await, Some(Status::Lost));

    assert_eq!(a.stop_and_drain().await, vec![Status::Stopped]);

    let handover = tokio::time::timeout(Duration::from_millis(2500), b.next())
        .await
        .expect("follower should win within TTL + poll interval");
    assert_eq!(handover, Some(Status::Won));

    let entry = store.get(KEY).await.unwrap();
    assert_eq!(entry.value, b.election.candidate_id().as_bytes());

    assert_eq!(b.stop_and_drain().await, vec![Status::Stopped]);
}

#[tokio::test(start_paused = true)]
async fn test_hundred_nominees_hand_over_one_by_one() {
    let store = bucket();
    let ctx = CancellationToken::new();

    let mut nominees: Vec<_> = (0..100).map(|_| Nominee::start(store.clone(), &ctx)).collect();
    for nominee in nominees.iter_mut() {
        nominee.next().await;
    }
    let winners = nominees.iter().filter(|n| n.last == Some(Status::Won)).count();
    assert_eq!(winners, 1, "exactly one nominee should win the first round");

    while !nominees.is_empty() {
        let leader = nominees
            .iter()
            .position(|n| n.last == Some(Status::Won))
            .expect("a leader should exist");
        let mut leader = nominees.swap_remove(leader);
        assert_eq!(leader.stop_and_drain().await, vec![Status::Stopped]);

        if nominees.is_empty() {
            break;
        }

        tokio::time::sleep(TTL + POLL * 2).await;
        for nominee in nominees.iter_mut() {
            nominee.catch_up();
        }

        let winners = nominees.iter().filter(|n| n.last == Some(Status::Won)).count();
        assert_eq!(winners, 1, "leadership should pass to exactly one remaining nominee");
        let others_lost = nominees.iter().filter(|n| n.last == Some(Status::Lost)).count();
        assert_eq!(others_lost, nominees.len() - 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_start_has_single_winner() {
    let store = bucket();
    let ctx = CancellationToken::new();

    let mut nominees: Vec<_> = (0..8).map(|_| Nominee::start(store.clone(), &ctx)).collect();
    let mut statuses = Vec::new();
    for nominee in nominees.iter_mut() {
        statuses.push(nominee.next().await);
    }
    assert_eq!(statuses.iter().filter(|s| **s == Some(Status::Won)).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == Some(Status::Lost)).count(), 7);

    // A whole context cancel ends everyone with Cancelled.
    ctx.cancel();
    for nominee in nominees.iter_mut() {
        let mut rest = Vec::new();
        while let Some(status) = nominee.next().await {
            rest.push(status);
        }
        assert_eq!(rest, vec![Status::Cancelled]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_revision_advances_once_per_renewal() {
    let store = bucket();
    let ctx = CancellationToken::new();
    let mut leader = Nominee::start(store.clone(), &ctx);
    assert_eq!(leader.next().await, Some(Status::Won));
    let first = store.get(KEY).await.unwrap().revision;

    let renewals = 5;
    tokio::time::sleep(Duration::from_millis(1500 * renewals + 100)).await;

    let now = store.get(KEY).await.unwrap().revision;
    assert_eq!(now.value() - first.value(), renewals);
    assert_eq!(leader.stop_and_drain().await, vec![Status::Stopped]);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_leader_writes_nothing_more() {
    let store = bucket();
    let ctx = CancellationToken::new();
    let mut leader = Nominee::start(store.clone(), &ctx);
    assert_eq!(leader.next().await, Some(Status::Won));

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(leader.stop_and_drain().await, vec![Status::Stopped]);
    let revision = store.current_revision().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.current_revision().await, revision);
}

#[tokio::test(start_paused = true)]
async fn test_vacated_key_is_taken_by_follower() {
    let store = bucket();
    let ctx = CancellationToken::new();

    let mut a = Nominee::start(store.clone(), &ctx);
    assert_eq!(a.next().await, Some(Status::Won));
    let mut b = Nominee::start(store.clone(), &ctx);
    assert_eq!(b.next().await, Some(Status::Lost));

    // Simulate a crashed leader whose lease is gone.
    store.delete(KEY).await.unwrap();

    let takeover = tokio::time::timeout(POLL + TTL, b.next()).await.unwrap();
    assert_eq!(takeover, Some(Status::Won));

    // The old leader notices at its next renewal.
    assert_eq!(a.next().await, Some(Status::Lost));

    assert_eq!(a.stop_and_drain().await, vec![Status::Stopped]);
    assert_eq!(b.stop_and_drain().await, vec![Status::Stopped]);
}

#[tokio::test(start_paused = true)]
async fn test_stopping_follower_never_wins() {
    let store = bucket();
    let ctx = CancellationToken::new();

    let mut a = Nominee::start(store.clone(), &ctx);
    assert_eq!(a.next().await, Some(Status::Won));
    let mut b = Nominee::start(store.clone(), &ctx);
    assert_eq!(b.next().await, Some(Status::Lost));

    tokio::time::sleep(Duration::from_millis(700)).await;
    let rest = tokio::time::timeout(POLL, b.stop_and_drain()).await.unwrap();
    assert_eq!(rest, vec![Status::Stopped]);

    assert_eq!(a.stop_and_drain().await, vec![Status::Stopped]);
}

#[tokio::test(start_paused = true)]
async fn test_follower_poll_error_is_fatal() {
    let store = bucket();
    let ctx = CancellationToken::new();

    let mut a = Nominee::start(store.clone(), &ctx);
    assert_eq!(a.next().await, Some(Status::Won));
    let mut b = Nominee::start(store.clone(), &ctx);
    assert_eq!(b.next().await, Some(Status::Lost));

    // Whichever call comes next fails; the follower polls first.
    store
        .fail_next(KvError::Unavailable {
            reason: "stream offline".into(),
        })
        .await;

    let outcome = b.rx.recv().await.unwrap();
    assert!(matches!(outcome, Outcome::Error(KvError::Unavailable { .. })));
    assert!(b.rx.recv().await.is_none());

    assert_eq!(a.stop_and_drain().await, vec![Status::Stopped]);
}

/// Store whose reads hang longer than any sensible timeout.
struct StalledReads {
    inner: Arc<InMemoryBucket>,
    delay: Duration,
}

#[async_trait]
impl VersionedStore for StalledReads {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn ttl(&self) -> Option<Duration> {
        self.inner.ttl()
    }

    async fn get(&self, key: &str) -> Result<Entry, KvError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn create(&self, key: &str, value: &[u8]) -> Result<Revision, KvError> {
        self.inner.create(key, value).await
    }

    async fn update(&self, key: &str, value: &[u8], expected: Revision) -> Result<Revision, KvError> {
        self.inner.update(key, value, expected).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.inner.delete(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_store_call_times_out() {
    let inner = bucket();
    inner.create(KEY, b"someone-else").await.unwrap();
    let store = Arc::new(StalledReads {
        inner,
        delay: Duration::from_secs(30),
    });

    let config = ElectionConfig::for_ttl(KEY, TTL).with_op_timeout_ms(200);
    let election = Election::new(store, config).unwrap();
    let mut rx = election.start(&CancellationToken::new()).unwrap();

    assert_eq!(rx.recv().await, Some(Outcome::Lost));
    assert_eq!(rx.recv().await, Some(Outcome::Error(KvError::Timeout { duration_ms: 200 })));
    assert_eq!(rx.recv().await, None);
}
