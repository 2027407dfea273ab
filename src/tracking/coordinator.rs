use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{gateway::GatewayError, utils::clock::Clock};

use super::lock;

/// Monotonic counter of local mutations. Revisions are drawn from a single counter per
/// coordinator, so they only ever grow for any given entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(u64);

/// How a persist call ended, from the point of view of local state.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved,
    /// The call failed and nothing newer was issued since, local state should roll back.
    Failed(GatewayError),
    /// The call failed, but the entity was mutated or removed after the snapshot was taken.
    /// Local state is already ahead of the failed snapshot and must be left alone.
    Superseded(GatewayError),
}

/// The component owning the entities. It knows how to persist a snapshot and how to react to
/// the result. Results never carry data back into local state.
#[async_trait]
pub trait SaveTarget<K, P>: Send + Sync + 'static {
    async fn persist(&self, key: &K, payload: &P) -> Result<(), GatewayError>;

    fn settled(&self, key: &K, revision: Revision, payload: P, outcome: SaveOutcome);
}

struct PendingSave<P> {
    revision: Revision,
    payload: P,
    timer: CancellationToken,
}

struct DebounceEntry<P> {
    /// Latest revision issued for the entity.
    revision: Revision,
    pending: Option<PendingSave<P>>,
    in_flight: usize,
}

struct DebounceState<K, P> {
    entries: HashMap<K, DebounceEntry<P>>,
    last_revision: u64,
}

impl<K, P> DebounceState<K, P> {
    fn next_revision(&mut self) -> Revision {
        self.last_revision += 1;
        Revision(self.last_revision)
    }
}

struct Shared<K, P> {
    target: Arc<dyn SaveTarget<K, P>>,
    clock: Arc<dyn Clock>,
    window: Duration,
    state: Mutex<DebounceState<K, P>>,
    settled: Notify,
}

/// Coalesces bursts of mutations to the same entity into one persist call.
///
/// Every entity has at most one debounce timer. Each mutation replaces the snapshot waiting to be
/// persisted and restarts the timer; when the timer fires the latest snapshot is sent. A call
/// from an older timer may still be running when a newer one fires, so failures are compared
/// against the entity's latest revision and reported as [SaveOutcome::Superseded] when stale.
///
/// An entity is "saving" from its first mutation until it has no timer and no call in flight.
/// Entries are dropped as soon as that happens.
pub struct SaveCoordinator<K, P>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    shared: Arc<Shared<K, P>>,
}

impl<K, P> SaveCoordinator<K, P>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    pub fn new(target: Arc<dyn SaveTarget<K, P>>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                clock,
                window,
                state: Mutex::new(DebounceState {
                    entries: HashMap::new(),
                    last_revision: 0,
                }),
                settled: Notify::new(),
            }),
        }
    }

    /// Replaces whatever is waiting to be persisted for `key` with `payload` and restarts the
    /// debounce window. Must be called from within a tokio runtime.
    pub fn schedule(&self, key: K, payload: P) -> Revision {
        let timer = CancellationToken::new();
        let revision = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            let revision = state.next_revision();
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| DebounceEntry {
                    revision,
                    pending: None,
                    in_flight: 0,
                });
            if let Some(previous) = entry.pending.take() {
                trace!("Coalescing {key:?} {:?} into {revision:?}", previous.revision);
                previous.timer.cancel();
            }
            entry.revision = revision;
            entry.pending = Some(PendingSave {
                revision,
                payload,
                timer: timer.clone(),
            });
            revision
        };

        tokio::spawn(run_timer(self.shared.clone(), key, revision, timer));
        revision
    }

    /// Drops the pending save of `key`, if any, and marks every call still in flight for it as
    /// superseded. In-flight calls themselves can't be recalled, see [Self::wait_settled].
    pub fn cancel(&self, key: &K) {
        {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            let revision = state.next_revision();
            if let Some(entry) = state.entries.get_mut(key) {
                if let Some(pending) = entry.pending.take() {
                    debug!("Cancelled pending save of {key:?}");
                    pending.timer.cancel();
                }
                entry.revision = revision;
                if entry.in_flight == 0 {
                    state.entries.remove(key);
                }
            }
        }
        self.shared.settled.notify_waiters();
    }

    /// Cancels every pending timer. Calls in flight finish as superseded.
    pub fn close(&self) {
        {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            let revision = state.next_revision();
            state.entries.retain(|_, entry| {
                if let Some(pending) = entry.pending.take() {
                    pending.timer.cancel();
                }
                entry.revision = revision;
                entry.in_flight > 0
            });
        }
        self.shared.settled.notify_waiters();
    }

    /// Fires every pending timer right away and waits until nothing is left in flight.
    pub async fn flush(&self) {
        let due = {
            let guard = self.shared.lock();
            guard
                .entries
                .iter()
                .filter_map(|(key, entry)| {
                    entry.pending.as_ref().map(|pending| {
                        pending.timer.cancel();
                        (key.clone(), pending.revision)
                    })
                })
                .collect::<Vec<_>>()
        };

        for (key, revision) in due {
            tokio::spawn(fire(self.shared.clone(), key, revision));
        }
        self.idle().await;
    }

    /// Resolves once no entity has a timer or a call in flight.
    pub async fn idle(&self) {
        loop {
            let notified = self.shared.settled.notified();
            let idle = self.shared.lock().entries.is_empty();
            if idle {
                return;
            }
            notified.await;
        }
    }

    /// Resolves once no persist call for `key` is in flight.
    pub async fn wait_settled(&self, key: &K) {
        loop {
            let notified = self.shared.settled.notified();
            let busy = self
                .shared
                .lock()
                .entries
                .get(key)
                .is_some_and(|entry| entry.in_flight > 0);
            if !busy {
                return;
            }
            notified.await;
        }
    }

    pub fn is_saving(&self, key: &K) -> bool {
        self.shared.lock().entries.contains_key(key)
    }

    pub fn saving_ids(&self) -> HashSet<K> {
        self.shared.lock().entries.keys().cloned().collect()
    }
}

impl<K, P> Drop for SaveCoordinator<K, P>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}

impl<K, P> Shared<K, P>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, DebounceState<K, P>> {
        lock(&self.state)
    }

    /// Moves the pending snapshot of `revision` into flight.
    fn take_pending(&self, key: &K, revision: Revision) -> Option<P> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(key)?;
        match entry.pending.take() {
            Some(pending) if pending.revision == revision => {
                entry.in_flight += 1;
                Some(pending.payload)
            }
            other => {
                entry.pending = other;
                None
            }
        }
    }

    fn complete(
        &self,
        key: &K,
        revision: Revision,
        result: Result<(), GatewayError>,
    ) -> SaveOutcome {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.entries.get_mut(key) else {
            return match result {
                Ok(()) => SaveOutcome::Saved,
                Err(e) => SaveOutcome::Superseded(e),
            };
        };

        entry.in_flight = entry.in_flight.saturating_sub(1);
        let outcome = match result {
            Ok(()) => SaveOutcome::Saved,
            Err(e) if entry.revision > revision => SaveOutcome::Superseded(e),
            Err(e) => SaveOutcome::Failed(e),
        };
        if entry.in_flight == 0 && entry.pending.is_none() {
            state.entries.remove(key);
        }
        outcome
    }
}

async fn run_timer<K, P>(
    shared: Arc<Shared<K, P>>,
    key: K,
    revision: Revision,
    timer: CancellationToken,
) where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    tokio::select! {
        _ = timer.cancelled() => {
            return;
        }
        _ = shared.clock.sleep(shared.window) => ()
    }
    fire(shared, key, revision).await;
}

async fn fire<K, P>(shared: Arc<Shared<K, P>>, key: K, revision: Revision)
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    let Some(payload) = shared.take_pending(&key, revision) else {
        return;
    };

    debug!("Persisting {key:?} at {revision:?}");
    let result = shared.target.persist(&key, &payload).await;
    let outcome = shared.complete(&key, revision, result);
    trace!("Save of {key:?} at {revision:?} settled as {outcome:?}");
    shared.target.settled(&key, revision, payload, outcome);
    shared.settled.notify_waiters();
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::{
        gateway::GatewayError,
        tracking::lock,
        utils::{clock::FixedClock, logging::TEST_LOGGING},
    };

    use super::{Revision, SaveCoordinator, SaveOutcome, SaveTarget};

    /// Payload describing the value to save and how the fake call behaves.
    #[derive(Debug, Clone, PartialEq)]
    struct Edit {
        value: u32,
        latency: Duration,
        fails: bool,
    }

    fn edit(value: u32) -> Edit {
        Edit {
            value,
            latency: Duration::ZERO,
            fails: false,
        }
    }

    #[derive(Default)]
    struct RecordingTarget {
        persisted: Mutex<Vec<(u32, u32)>>,
        settled: Mutex<Vec<(u32, u32, SaveOutcome)>>,
    }

    #[async_trait]
    impl SaveTarget<u32, Edit> for RecordingTarget {
        async fn persist(&self, key: &u32, payload: &Edit) -> Result<(), GatewayError> {
            lock(&self.persisted).push((*key, payload.value));
            tokio::time::sleep(payload.latency).await;
            if payload.fails {
                Err(GatewayError::TransientIo("timeout".into()))
            } else {
                Ok(())
            }
        }

        fn settled(&self, key: &u32, _revision: Revision, payload: Edit, outcome: SaveOutcome) {
            lock(&self.settled).push((*key, payload.value, outcome));
        }
    }

    fn coordinator(target: &Arc<RecordingTarget>) -> SaveCoordinator<u32, Edit> {
        *TEST_LOGGING;
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap());
        SaveCoordinator::new(target.clone(), Arc::new(clock), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_persists_last_snapshot_once() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        for value in 1..=4 {
            saves.schedule(7, edit(value));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert!(lock(&target.persisted).is_empty());
        assert!(saves.is_saving(&7));

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(*lock(&target.persisted), vec![(7, 4)]);
        assert!(saves.saving_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_are_independent() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        saves.schedule(1, edit(10));
        saves.schedule(2, edit(20));
        assert_eq!(saves.saving_ids().len(), 2);

        saves.idle().await;
        let mut persisted = lock(&target.persisted).clone();
        persisted.sort();
        assert_eq!(persisted, vec![(1, 10), (2, 20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_key_is_never_persisted() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        saves.schedule(3, edit(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        saves.cancel(&3);
        assert!(!saves.is_saving(&3));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(lock(&target.persisted).is_empty());
        assert!(lock(&target.settled).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_failure_is_superseded() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        // Fires at 1s, fails at 6s.
        saves.schedule(
            9,
            Edit {
                value: 1,
                latency: Duration::from_secs(5),
                fails: true,
            },
        );
        tokio::time::sleep(Duration::from_millis(1500)).await;
        // Fires at 2.5s and succeeds right away.
        saves.schedule(9, edit(2));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(
            saves.is_saving(&9),
            "older call is still in flight, the entity is still saving"
        );

        saves.idle().await;
        let settled = lock(&target.settled).clone();
        assert_eq!(
            settled,
            vec![
                (9, 2, SaveOutcome::Saved),
                (
                    9,
                    1,
                    SaveOutcome::Superseded(GatewayError::TransientIo("timeout".into()))
                ),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn latest_failure_asks_for_rollback() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        saves.schedule(
            4,
            Edit {
                value: 5,
                latency: Duration::from_millis(200),
                fails: true,
            },
        );
        saves.idle().await;

        assert_eq!(
            *lock(&target.settled),
            vec![(
                4,
                5,
                SaveOutcome::Failed(GatewayError::TransientIo("timeout".into()))
            )]
        );
        assert!(saves.saving_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_settled_outlives_cancel() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        saves.schedule(
            5,
            Edit {
                value: 1,
                latency: Duration::from_secs(3),
                fails: false,
            },
        );
        tokio::time::sleep(Duration::from_millis(1100)).await;
        saves.cancel(&5);
        assert!(saves.is_saving(&5), "the call in flight keeps the entity saving");

        saves.wait_settled(&5).await;
        assert!(!saves.is_saving(&5));
        assert_eq!(*lock(&target.settled), vec![(5, 1, SaveOutcome::Saved)]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_fires_pending_timers_immediately() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);
        let started = tokio::time::Instant::now();

        saves.schedule(1, edit(1));
        saves.schedule(2, edit(2));
        saves.flush().await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(lock(&target.persisted).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_everything() {
        let target = Arc::new(RecordingTarget::default());
        let saves = coordinator(&target);

        saves.schedule(1, edit(1));
        saves.schedule(2, edit(2));
        saves.close();
        assert!(saves.saving_ids().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(lock(&target.persisted).is_empty());
    }
}
