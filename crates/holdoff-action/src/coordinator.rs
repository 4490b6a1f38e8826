//! Delay policy owner and front door of the pending-change queue.
//!
//! A [`DelayCoordinator`] is a cheap, cloneable handle. The stores and the
//! authoritative policy live on a [`StoreWorker`] thread; every mutation is
//! a job on that thread, so queue, cancel and apply never interleave.
//! Reads of the policy come from a watch snapshot the worker refreshes
//! after each persisted change.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use holdoff_core::clock::{Clock, SystemClock};
use holdoff_core::error::HoldoffError;
use holdoff_core::events::DelayEvent;
use holdoff_core::types::{
    validate_duration, ActionId, ActionRecord, ActionStatus, DelayPolicy, DurationUnit,
    NewAction, PendingSnapshot, Timestamp,
};
use holdoff_storage::{ActionStore, Database, SettingsStore};

use crate::codec::{self, Param};
use crate::worker::StoreWorker;

/// Tag of the queued action that turns the delay off.
pub const DISABLE_DELAY: &str = "disableDelay";
/// Tag of the queued action that changes the delay duration.
pub const SET_DELAY_DURATION: &str = "setDelayDuration";

const EVENT_CAPACITY: usize = 256;

/// Outcome of [`DelayCoordinator::set_duration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationChange {
    /// The delay was off, so the new duration took effect at once.
    Applied(DelayPolicy),
    /// The delay is on; the change waits behind the current delay.
    Queued(ActionRecord),
}

/// Counts shown by the status view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub pending: u64,
    pub failed: usize,
    /// The pending record that becomes ready first.
    pub next: Option<ActionRecord>,
}

/// State owned by the worker thread.
struct CoordinatorState {
    actions: ActionStore,
    settings: SettingsStore,
    policy: DelayPolicy,
    clock: Arc<dyn Clock>,
    snapshot_tx: watch::Sender<PendingSnapshot>,
    policy_tx: watch::Sender<DelayPolicy>,
    events_tx: broadcast::Sender<DelayEvent>,
}

impl CoordinatorState {
    fn insert(
        &mut self,
        action_type: &str,
        payload: &str,
        description: &str,
    ) -> Result<ActionRecord, HoldoffError> {
        let policy = self.sync_policy()?;
        let queued_at = self.clock.now();
        let action = NewAction::new(
            action_type,
            payload,
            description,
            queued_at,
            policy.delay_millis(),
        );
        let id = self.actions.insert(&action)?;
        info!(
            id = %id,
            action_type = %action_type,
            applies_at = %action.applies_at,
            "Queued action"
        );

        let record = ActionRecord {
            id,
            action_type: action.action_type,
            payload: action.payload,
            description: action.description,
            queued_at: action.queued_at,
            applies_at: action.applies_at,
            status: ActionStatus::Pending,
        };
        self.emit(DelayEvent::Queued {
            id,
            action_type: record.action_type.clone(),
            applies_at: record.applies_at,
            timestamp: queued_at,
        });
        self.publish_snapshot();
        Ok(record)
    }

    /// Reload the stored policy. Other processes sharing the database may
    /// have changed it since this worker last looked.
    fn sync_policy(&mut self) -> Result<DelayPolicy, HoldoffError> {
        let stored = self.settings.load_or_seed(self.policy)?;
        if stored != self.policy {
            debug!(
                enabled = stored.enabled,
                duration = %stored.display_duration(),
                "Picked up stored delay policy"
            );
            self.policy = stored;
            self.policy_tx.send_replace(stored);
        }
        Ok(stored)
    }

    /// Derive a policy from the stored one and persist it.
    fn update_policy(
        &mut self,
        change: impl FnOnce(DelayPolicy) -> DelayPolicy,
    ) -> Result<DelayPolicy, HoldoffError> {
        let current = self.sync_policy()?;
        let policy = change(current);
        self.set_policy(policy)?;
        Ok(policy)
    }

    fn set_policy(&mut self, policy: DelayPolicy) -> Result<(), HoldoffError> {
        if policy == self.policy {
            return Ok(());
        }
        self.settings.save_policy(&policy)?;
        self.policy = policy;
        self.policy_tx.send_replace(policy);
        info!(
            enabled = policy.enabled,
            duration = %policy.display_duration(),
            "Delay policy changed"
        );
        self.emit(DelayEvent::PolicyChanged {
            policy,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    fn publish_snapshot(&self) {
        match self.actions.all_pending() {
            Ok(records) => {
                self.snapshot_tx
                    .send_replace(PendingSnapshot::from_records(records));
            }
            Err(e) => warn!(error = %e, "Failed to refresh pending snapshot"),
        }
    }

    fn emit(&self, event: DelayEvent) {
        debug!(event = event.event_name(), "Delay event");
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}

struct Inner {
    worker: StoreWorker<CoordinatorState>,
    clock: Arc<dyn Clock>,
    policy_rx: watch::Receiver<DelayPolicy>,
    snapshot_rx: watch::Receiver<PendingSnapshot>,
    events_tx: broadcast::Sender<DelayEvent>,
}

/// Handle for queuing, cancelling and toggling deferred actions.
#[derive(Clone)]
pub struct DelayCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DelayCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayCoordinator")
            .field("policy", &self.policy())
            .finish()
    }
}

impl DelayCoordinator {
    /// Open a coordinator over `db` using wall-clock time.
    ///
    /// `seed` is persisted as the policy only if the database has none yet.
    pub fn open(db: Arc<Database>, seed: DelayPolicy) -> Result<Self, HoldoffError> {
        Self::with_clock(db, seed, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Arc<Database>,
        seed: DelayPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HoldoffError> {
        seed.validate()?;
        let actions = ActionStore::new(Arc::clone(&db));
        let settings = SettingsStore::new(db);
        let policy = settings.load_or_seed(seed)?;
        let snapshot = PendingSnapshot::from_records(actions.all_pending()?);

        let (policy_tx, policy_rx) = watch::channel(policy);
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let state = CoordinatorState {
            actions,
            settings,
            policy,
            clock: Arc::clone(&clock),
            snapshot_tx,
            policy_tx,
            events_tx: events_tx.clone(),
        };
        let worker = StoreWorker::spawn("holdoff-store", state)?;
        info!(
            enabled = policy.enabled,
            duration = %policy.display_duration(),
            "Delay coordinator ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                worker,
                clock,
                policy_rx,
                snapshot_rx,
                events_tx,
            }),
        })
    }

    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    // ========================================================================
    // Policy
    // ========================================================================

    pub fn is_enabled(&self) -> bool {
        self.inner.policy_rx.borrow().enabled
    }

    pub fn policy(&self) -> DelayPolicy {
        *self.inner.policy_rx.borrow()
    }

    /// Turn the delay on. Takes effect immediately.
    pub async fn enable(&self) -> Result<(), HoldoffError> {
        self.inner
            .worker
            .call(|state| {
                state
                    .update_policy(|current| DelayPolicy {
                        enabled: true,
                        ..current
                    })
                    .map(|_| ())
            })
            .await
    }

    /// Queue the delay's own removal behind the current delay.
    ///
    /// Returns `None` without queuing anything when the delay is already
    /// off.
    pub async fn queue_disable(&self) -> Result<Option<ActionRecord>, HoldoffError> {
        let payload = codec::encode(&[]).map_err(|e| HoldoffError::Serialization(e.to_string()))?;
        self.inner
            .worker
            .call(move |state| {
                if !state.sync_policy()?.enabled {
                    debug!("Delay already disabled, nothing to queue");
                    return Ok(None);
                }
                state.insert(DISABLE_DELAY, &payload, "Disable delay").map(Some)
            })
            .await
    }

    /// Change the delay duration.
    ///
    /// While the delay is off this applies at once. While it is on, the
    /// change is queued so a shorter delay cannot bypass the current one.
    pub async fn set_duration(
        &self,
        value: u32,
        unit: DurationUnit,
    ) -> Result<DurationChange, HoldoffError> {
        validate_duration(value)?;
        let payload = codec::encode(&[Param::Long(i64::from(value)), Param::Str(unit.to_string())])
            .map_err(|e| HoldoffError::Serialization(e.to_string()))?;
        self.inner
            .worker
            .call(move |state| {
                let current = state.sync_policy()?;
                let policy = DelayPolicy {
                    duration_value: value,
                    duration_unit: unit,
                    ..current
                };
                if !current.enabled {
                    state.set_policy(policy)?;
                    return Ok(DurationChange::Applied(policy));
                }
                let description = format!("Set delay duration: {}", policy.display_duration());
                state
                    .insert(SET_DELAY_DURATION, &payload, &description)
                    .map(DurationChange::Queued)
            })
            .await
    }

    /// Turn the delay off immediately. Only reachable through the queued
    /// `disableDelay` action.
    pub(crate) async fn disable_now(&self) -> Result<(), HoldoffError> {
        self.inner
            .worker
            .call(|state| {
                state
                    .update_policy(|current| DelayPolicy {
                        enabled: false,
                        ..current
                    })
                    .map(|_| ())
            })
            .await
    }

    /// Apply a duration immediately. Only reachable through the queued
    /// `setDelayDuration` action.
    pub(crate) async fn apply_duration(
        &self,
        value: u32,
        unit: DurationUnit,
    ) -> Result<(), HoldoffError> {
        validate_duration(value)?;
        self.inner
            .worker
            .call(move |state| {
                state
                    .update_policy(|current| DelayPolicy {
                        duration_value: value,
                        duration_unit: unit,
                        ..current
                    })
                    .map(|_| ())
            })
            .await
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Persist a deferred action and return the stored record.
    ///
    /// `applies_at` is fixed from the delay in force when the worker runs
    /// the insert.
    pub async fn queue(
        &self,
        action_type: &str,
        payload: &str,
        description: &str,
    ) -> Result<ActionRecord, HoldoffError> {
        let (action_type, payload, description) = owned(action_type, payload, description);
        self.inner
            .worker
            .call(move |state| state.insert(&action_type, &payload, &description))
            .await
    }

    /// Queue the action only if the stored policy has the delay on.
    ///
    /// `None` means the delay is off and the caller should apply the
    /// action itself. The check and the insert run as one worker job.
    pub async fn queue_if_enabled(
        &self,
        action_type: &str,
        payload: &str,
        description: &str,
    ) -> Result<Option<ActionRecord>, HoldoffError> {
        let (action_type, payload, description) = owned(action_type, payload, description);
        self.inner
            .worker
            .call(move |state| {
                if !state.sync_policy()?.enabled {
                    return Ok(None);
                }
                state.insert(&action_type, &payload, &description).map(Some)
            })
            .await
    }

    /// Hand the insert to the worker without waiting for it.
    ///
    /// Success only means the job was accepted; insert failures are logged.
    pub fn queue_detached(
        &self,
        action_type: &str,
        payload: &str,
        description: &str,
    ) -> Result<(), HoldoffError> {
        let (action_type, payload, description) = owned(action_type, payload, description);
        self.inner.worker.submit(move |state| {
            if let Err(e) = state.insert(&action_type, &payload, &description) {
                warn!(action_type = %action_type, error = %e, "Detached queue failed");
            }
        })
    }

    /// Blocking variant of [`queue`](Self::queue) for threads outside the
    /// async runtime.
    pub fn queue_blocking(
        &self,
        action_type: &str,
        payload: &str,
        description: &str,
    ) -> Result<ActionRecord, HoldoffError> {
        let (action_type, payload, description) = owned(action_type, payload, description);
        self.inner
            .worker
            .call_blocking(move |state| state.insert(&action_type, &payload, &description))
    }

    /// Delete a record whatever its status. Returns `false` if it was
    /// already gone.
    pub async fn cancel(&self, id: ActionId) -> Result<bool, HoldoffError> {
        self.inner
            .worker
            .call(move |state| {
                let removed = state.actions.delete(id)?;
                if removed {
                    info!(id = %id, "Cancelled pending change");
                    state.emit(DelayEvent::Cancelled {
                        id,
                        timestamp: state.clock.now(),
                    });
                    state.publish_snapshot();
                } else {
                    debug!(id = %id, "Cancel of unknown change ignored");
                }
                Ok(removed)
            })
            .await
    }

    // ========================================================================
    // Apply bookkeeping
    // ========================================================================

    /// Pending records whose deadline has passed.
    pub async fn ready_changes(&self) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.inner
            .worker
            .call(|state| {
                let now = state.clock.now();
                state.actions.ready_to_apply(now)
            })
            .await
    }

    /// Re-read a record right before applying it.
    ///
    /// Returns `None` if it was cancelled or is no longer pending.
    pub async fn claim(&self, id: ActionId) -> Result<Option<ActionRecord>, HoldoffError> {
        self.inner
            .worker
            .call(move |state| {
                Ok(state
                    .actions
                    .get(id)?
                    .filter(|r| r.status == ActionStatus::Pending))
            })
            .await
    }

    /// Remove a successfully applied record.
    pub async fn mark_completed(&self, record: &ActionRecord) -> Result<(), HoldoffError> {
        let id = record.id;
        let action_type = record.action_type.clone();
        self.inner
            .worker
            .call(move |state| {
                state.actions.delete(id)?;
                state.emit(DelayEvent::Applied {
                    id,
                    action_type,
                    timestamp: state.clock.now(),
                });
                state.publish_snapshot();
                Ok(())
            })
            .await
    }

    /// Move a record to the terminal failed state.
    pub async fn mark_failed(&self, record: &ActionRecord) -> Result<(), HoldoffError> {
        let failed = ActionRecord {
            status: ActionStatus::Failed,
            ..record.clone()
        };
        self.inner
            .worker
            .call(move |state| {
                if state.actions.update(&failed)? {
                    state.emit(DelayEvent::Failed {
                        id: failed.id,
                        action_type: failed.action_type.clone(),
                        timestamp: state.clock.now(),
                    });
                    state.publish_snapshot();
                }
                Ok(())
            })
            .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn pending(&self) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.inner
            .worker
            .call(|state| state.actions.all_pending())
            .await
    }

    pub async fn failed(&self) -> Result<Vec<ActionRecord>, HoldoffError> {
        self.inner.worker.call(|state| state.actions.failed()).await
    }

    pub async fn summary(&self) -> Result<QueueSummary, HoldoffError> {
        self.inner
            .worker
            .call(|state| {
                Ok(QueueSummary {
                    pending: state.actions.pending_count()?,
                    failed: state.actions.failed()?.len(),
                    next: state.actions.next_pending()?,
                })
            })
            .await
    }

    pub async fn get(&self, id: ActionId) -> Result<Option<ActionRecord>, HoldoffError> {
        self.inner
            .worker
            .call(move |state| state.actions.get(id))
            .await
    }

    /// Re-read the stored policy and the pending list, and push both to
    /// subscribers.
    pub async fn refresh(&self) -> Result<PendingSnapshot, HoldoffError> {
        self.inner
            .worker
            .call(|state| {
                state.sync_policy()?;
                let snapshot = PendingSnapshot::from_records(state.actions.all_pending()?);
                state.snapshot_tx.send_replace(snapshot.clone());
                Ok(snapshot)
            })
            .await
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Ordered pending list, refreshed after every queue, cancel and apply.
    pub fn subscribe(&self) -> watch::Receiver<PendingSnapshot> {
        self.inner.snapshot_rx.clone()
    }

    pub fn subscribe_policy(&self) -> watch::Receiver<DelayPolicy> {
        self.inner.policy_rx.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<DelayEvent> {
        self.inner.events_tx.subscribe()
    }
}

fn owned(action_type: &str, payload: &str, description: &str) -> (String, String, String) {
    (
        action_type.to_string(),
        payload.to_string(),
        description.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdoff_core::clock::ManualClock;

    const START: Timestamp = Timestamp(1_700_000_000_000);

    fn seconds_policy(enabled: bool, value: u32) -> DelayPolicy {
        DelayPolicy {
            enabled,
            duration_value: value,
            duration_unit: DurationUnit::Seconds,
        }
    }

    fn make_coordinator(seed: DelayPolicy) -> (DelayCoordinator, ManualClock) {
        let clock = ManualClock::new(START);
        let db = Arc::new(Database::in_memory().unwrap());
        let coordinator =
            DelayCoordinator::with_clock(db, seed, Arc::new(clock.clone())).unwrap();
        (coordinator, clock)
    }

    // ========================================================================
    // policy toggling
    // ========================================================================

    #[tokio::test]
    async fn test_enable_while_disabled_queues_nothing() {
        let (coordinator, _) = make_coordinator(DelayPolicy::default());
        assert!(!coordinator.is_enabled());

        coordinator.enable().await.unwrap();
        assert!(coordinator.is_enabled());
        assert!(coordinator.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queue_disable_while_enabled() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 1));
        let record = coordinator.queue_disable().await.unwrap().unwrap();

        assert!(coordinator.is_enabled());
        let pending = coordinator.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, record.id);
        assert_eq!(pending[0].action_type, DISABLE_DELAY);
    }

    #[tokio::test]
    async fn test_queue_disable_while_disabled_is_noop() {
        let (coordinator, _) = make_coordinator(DelayPolicy::default());
        assert!(coordinator.queue_disable().await.unwrap().is_none());
        assert!(coordinator.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disable_now_flips_flag() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 1));
        coordinator.disable_now().await.unwrap();
        assert!(!coordinator.is_enabled());
    }

    #[tokio::test]
    async fn test_set_duration_applies_when_disabled() {
        let (coordinator, _) = make_coordinator(DelayPolicy::default());
        let change = coordinator
            .set_duration(30, DurationUnit::Minutes)
            .await
            .unwrap();
        assert!(matches!(change, DurationChange::Applied(_)));
        assert_eq!(coordinator.policy().delay_millis(), 30 * 60_000);
    }

    #[tokio::test]
    async fn test_set_duration_queues_when_enabled() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 10));
        let change = coordinator
            .set_duration(1, DurationUnit::Seconds)
            .await
            .unwrap();

        let DurationChange::Queued(record) = change else {
            panic!("expected queued change, got {:?}", change);
        };
        assert_eq!(record.action_type, SET_DELAY_DURATION);
        assert_eq!(record.description, "Set delay duration: 1 second");
        assert_eq!(coordinator.policy().duration_value, 10);

        coordinator
            .apply_duration(1, DurationUnit::Seconds)
            .await
            .unwrap();
        assert_eq!(coordinator.policy().duration_value, 1);
    }

    #[tokio::test]
    async fn test_set_duration_rejects_zero() {
        let (coordinator, _) = make_coordinator(DelayPolicy::default());
        assert!(matches!(
            coordinator.set_duration(0, DurationUnit::Hours).await,
            Err(HoldoffError::InvalidPolicy(_))
        ));
    }

    #[tokio::test]
    async fn test_policy_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holdoff.db");
        {
            let db = Arc::new(Database::new(&path).unwrap());
            let coordinator = DelayCoordinator::open(db, DelayPolicy::default()).unwrap();
            coordinator.enable().await.unwrap();
        }
        let db = Arc::new(Database::new(&path).unwrap());
        let coordinator = DelayCoordinator::open(db, DelayPolicy::default()).unwrap();
        assert!(coordinator.is_enabled());
    }

    // ========================================================================
    // queueing
    // ========================================================================

    #[tokio::test]
    async fn test_queue_snapshots_delay() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 5));
        let record = coordinator
            .queue("lockNow", r#"{"params":[]}"#, "Lock device")
            .await
            .unwrap();
        assert_eq!(record.queued_at, START);
        assert_eq!(record.applies_at, START.plus_millis(5_000));

        coordinator.apply_duration(1, DurationUnit::Hours).await.unwrap();
        let stored = coordinator.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.applies_at.0 - stored.queued_at.0, 5_000);
    }

    #[tokio::test]
    async fn test_queue_if_enabled_follows_stored_flag() {
        let (scheduler_side, cli_side, _dir) = shared_pair(DelayPolicy::default());
        assert!(scheduler_side
            .queue_if_enabled("lockNow", "{}", "Lock")
            .await
            .unwrap()
            .is_none());

        cli_side.enable().await.unwrap();
        let record = scheduler_side
            .queue_if_enabled("lockNow", "{}", "Lock")
            .await
            .unwrap();
        assert!(record.is_some());
        assert_eq!(cli_side.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_detached_and_blocking() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 1));
        coordinator
            .queue_detached("reboot", r#"{"params":[]}"#, "Reboot device")
            .unwrap();

        let blocking = coordinator.clone();
        let record = tokio::task::spawn_blocking(move || {
            blocking.queue_blocking("lockNow", r#"{"params":[]}"#, "Lock device")
        })
        .await
        .unwrap()
        .unwrap();

        let pending = coordinator.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].action_type, "reboot");
        assert_eq!(pending[1].id, record.id);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 1));
        let record = coordinator.queue("lockNow", "{}", "Lock").await.unwrap();

        assert!(coordinator.cancel(record.id).await.unwrap());
        assert!(!coordinator.cancel(record.id).await.unwrap());
        assert!(coordinator.claim(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ready_changes_follow_clock() {
        let (coordinator, clock) = make_coordinator(seconds_policy(true, 1));
        coordinator.queue("lockNow", "{}", "Lock").await.unwrap();

        assert!(coordinator.ready_changes().await.unwrap().is_empty());
        clock.advance(1_000);
        assert_eq!(coordinator.ready_changes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_failed_and_completed() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 1));
        let a = coordinator.queue("lockNow", "{}", "Lock").await.unwrap();
        let b = coordinator.queue("reboot", "{}", "Reboot").await.unwrap();

        coordinator.mark_failed(&a).await.unwrap();
        coordinator.mark_completed(&b).await.unwrap();

        assert!(coordinator.pending().await.unwrap().is_empty());
        let failed = coordinator.failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, a.id);
        assert!(coordinator.get(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summary_counts_and_next() {
        let (coordinator, clock) = make_coordinator(seconds_policy(true, 5));
        let empty = coordinator.summary().await.unwrap();
        assert_eq!(empty.pending, 0);
        assert!(empty.next.is_none());

        let first = coordinator.queue("lockNow", "{}", "Lock").await.unwrap();
        clock.advance(1);
        let second = coordinator.queue("reboot", "{}", "Reboot").await.unwrap();
        coordinator.mark_failed(&second).await.unwrap();

        let summary = coordinator.summary().await.unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.next.map(|r| r.id), Some(first.id));
    }

    // ========================================================================
    // processes sharing one database
    // ========================================================================

    fn shared_pair(seed: DelayPolicy) -> (DelayCoordinator, DelayCoordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holdoff.db");
        let clock = Arc::new(ManualClock::new(START));
        let open = || {
            let db = Arc::new(Database::new(&path).unwrap());
            DelayCoordinator::with_clock(db, seed, clock.clone()).unwrap()
        };
        let first = open();
        let second = open();
        (first, second, dir)
    }

    #[tokio::test]
    async fn test_apply_duration_keeps_flag_set_elsewhere() {
        let (scheduler_side, cli_side, _dir) = shared_pair(DelayPolicy::default());
        cli_side.enable().await.unwrap();

        scheduler_side
            .apply_duration(5, DurationUnit::Minutes)
            .await
            .unwrap();

        assert!(scheduler_side.is_enabled());
        cli_side.refresh().await.unwrap();
        assert_eq!(
            cli_side.policy(),
            DelayPolicy {
                enabled: true,
                duration_value: 5,
                duration_unit: DurationUnit::Minutes,
            }
        );
    }

    #[tokio::test]
    async fn test_disable_now_sees_flag_set_elsewhere() {
        let (scheduler_side, cli_side, _dir) = shared_pair(DelayPolicy::default());
        cli_side.enable().await.unwrap();
        assert!(!scheduler_side.is_enabled());

        scheduler_side.disable_now().await.unwrap();

        cli_side.refresh().await.unwrap();
        assert!(!cli_side.is_enabled());
    }

    #[tokio::test]
    async fn test_queue_uses_duration_set_elsewhere() {
        let (scheduler_side, cli_side, _dir) = shared_pair(seconds_policy(true, 1));
        cli_side.apply_duration(30, DurationUnit::Seconds).await.unwrap();

        let record = scheduler_side.queue("lockNow", "{}", "Lock").await.unwrap();
        assert_eq!(record.applies_at, START.plus_millis(30_000));
        assert_eq!(scheduler_side.policy().duration_value, 30);
    }

    // ========================================================================
    // observers
    // ========================================================================

    #[tokio::test]
    async fn test_snapshot_updates_on_queue_and_cancel() {
        let (coordinator, _) = make_coordinator(seconds_policy(true, 2));
        let mut snapshots = coordinator.subscribe();
        assert!(snapshots.borrow().is_empty());

        let record = coordinator.queue("lockNow", "{}", "Lock").await.unwrap();
        snapshots.changed().await.unwrap();
        {
            let snapshot = snapshots.borrow_and_update();
            assert_eq!(snapshot.records.len(), 1);
            assert_eq!(snapshot.next_deadline, Some(record.applies_at));
        }

        coordinator.cancel(record.id).await.unwrap();
        snapshots.changed().await.unwrap();
        assert!(snapshots.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let (coordinator, _) = make_coordinator(DelayPolicy::default());
        let mut events = coordinator.events();

        coordinator.enable().await.unwrap();
        let record = coordinator.queue("lockNow", "{}", "Lock").await.unwrap();
        coordinator.cancel(record.id).await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            DelayEvent::PolicyChanged { policy, .. } if policy.enabled
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DelayEvent::Queued { id, .. } if id == record.id
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DelayEvent::Cancelled { id, .. } if id == record.id
        ));
    }

    #[tokio::test]
    async fn test_policy_watch() {
        let (coordinator, _) = make_coordinator(DelayPolicy::default());
        let mut policy = coordinator.subscribe_policy();
        coordinator.enable().await.unwrap();
        policy.changed().await.unwrap();
        assert!(policy.borrow().enabled);
    }
}
