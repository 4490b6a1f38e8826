//! Background loop that applies deferred actions once they are due.
//!
//! Every poll interval the scheduler asks the coordinator for ready
//! records, re-claims each one, hands it to the dispatcher and records the
//! outcome. Nothing that happens inside a tick stops the loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use holdoff_core::types::Timestamp;

use crate::coordinator::DelayCoordinator;
use crate::dispatcher::ActionDispatcher;
use crate::error::SchedulerError;

/// Poll interval used unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub applied: usize,
    pub failed: usize,
    /// Ready records that were cancelled before they could be applied.
    pub skipped: usize,
    /// Records still pending after the tick.
    pub pending: usize,
    pub next_deadline: Option<Timestamp>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.applied == 0 && self.failed == 0 && self.skipped == 0
    }
}

#[derive(Clone)]
struct Runner {
    coordinator: DelayCoordinator,
    dispatcher: Arc<ActionDispatcher>,
}

impl Runner {
    async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let ready = match self.coordinator.ready_changes().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Failed to read ready changes");
                Vec::new()
            }
        };

        for candidate in ready {
            let record = match self.coordinator.claim(candidate.id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(id = %candidate.id, "Change cancelled before apply");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(id = %candidate.id, error = %e, "Failed to claim change");
                    report.skipped += 1;
                    continue;
                }
            };

            if self.dispatcher.execute(&record).await {
                report.applied += 1;
                if let Err(e) = self.coordinator.mark_completed(&record).await {
                    warn!(id = %record.id, error = %e, "Failed to remove applied change");
                }
            } else {
                report.failed += 1;
                if let Err(e) = self.coordinator.mark_failed(&record).await {
                    warn!(id = %record.id, error = %e, "Failed to mark change failed");
                }
            }
        }

        match self.coordinator.refresh().await {
            Ok(snapshot) => {
                report.pending = snapshot.records.len();
                report.next_deadline = snapshot.next_deadline;
            }
            Err(e) => warn!(error = %e, "Failed to refresh pending changes"),
        }

        if report.is_idle() {
            debug!(pending = report.pending, "Scheduler tick: nothing ready");
        } else {
            info!(
                applied = report.applied,
                failed = report.failed,
                skipped = report.skipped,
                pending = report.pending,
                "Scheduler tick"
            );
        }
        report
    }
}

struct Running {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Polls the coordinator and applies due changes in the background.
pub struct Scheduler {
    runner: Runner,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(coordinator: DelayCoordinator, dispatcher: Arc<ActionDispatcher>) -> Self {
        Self {
            runner: Runner {
                coordinator,
                dispatcher,
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
            running: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start the background loop. The first tick runs one poll interval
    /// from now.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let runner = self.runner.clone();
        let interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        runner.tick().await;
                    }
                    _ = signal.notified() => break,
                }
            }
            debug!("Scheduler loop exited");
        });

        info!(poll_interval = ?interval, "Scheduler started");
        *running = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Stop the loop. A tick already in progress is allowed to finish.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SchedulerError::NotRunning)?;

        running.shutdown.notify_one();
        running
            .handle
            .await
            .map_err(|e| SchedulerError::Join(e.to_string()))?;
        info!("Scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one tick now, independent of the background loop.
    pub async fn tick(&self) -> TickReport {
        self.runner.tick().await
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdoff_core::clock::ManualClock;
    use holdoff_core::types::{ActionStatus, DelayPolicy, DurationUnit};
    use holdoff_storage::Database;

    use crate::command::PolicyCommand;
    use crate::gateway::SimulatedGateway;

    const START: Timestamp = Timestamp(1_700_000_000_000);

    struct Fixture {
        db: Arc<Database>,
        scheduler: Scheduler,
        coordinator: DelayCoordinator,
        gateway: Arc<SimulatedGateway>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(START);
        let db = Arc::new(Database::in_memory().unwrap());
        let policy = DelayPolicy {
            enabled: true,
            duration_value: 1,
            duration_unit: DurationUnit::Seconds,
        };
        let coordinator =
            DelayCoordinator::with_clock(db.clone(), policy, Arc::new(clock.clone())).unwrap();
        let gateway = Arc::new(SimulatedGateway::new());
        let dispatcher = Arc::new(ActionDispatcher::with_defaults(
            gateway.clone(),
            coordinator.clone(),
        ));
        Fixture {
            db,
            scheduler: Scheduler::new(coordinator.clone(), dispatcher),
            coordinator,
            gateway,
            clock,
        }
    }

    async fn queue(coordinator: &DelayCoordinator, command: &PolicyCommand) {
        coordinator
            .queue(command.tag(), &command.encode().unwrap(), &command.describe())
            .await
            .unwrap();
    }

    // ========================================================================
    // tick
    // ========================================================================

    #[tokio::test]
    async fn test_tick_empty() {
        let f = fixture();
        let report = f.scheduler.tick().await;
        assert!(report.is_idle());
        assert_eq!(report.pending, 0);
        assert_eq!(report.next_deadline, None);
    }

    #[tokio::test]
    async fn test_tick_leaves_future_records() {
        let f = fixture();
        queue(&f.coordinator, &PolicyCommand::LockNow).await;

        let report = f.scheduler.tick().await;
        assert!(report.is_idle());
        assert_eq!(report.pending, 1);
        assert_eq!(report.next_deadline, Some(START.plus_millis(1_000)));
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tick_applies_and_fails() {
        let f = fixture();
        f.gateway.reject("reboot", "busy");
        queue(&f.coordinator, &PolicyCommand::LockNow).await;
        queue(&f.coordinator, &PolicyCommand::Reboot).await;
        f.clock.advance(1_001);

        let report = f.scheduler.tick().await;
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending, 0);

        let failed = f.coordinator.failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action_type, "reboot");
        assert_eq!(failed[0].status, ActionStatus::Failed);

        let again = f.scheduler.tick().await;
        assert!(again.is_idle());
        assert_eq!(f.gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_tick_applies_in_deadline_order() {
        let f = fixture();
        queue(&f.coordinator, &PolicyCommand::SetPasswordQuality(1)).await;
        f.clock.advance(10);
        queue(&f.coordinator, &PolicyCommand::SetPasswordQuality(2)).await;
        f.clock.advance(5_000);

        f.scheduler.tick().await;
        assert_eq!(
            f.gateway.calls(),
            vec![
                PolicyCommand::SetPasswordQuality(1),
                PolicyCommand::SetPasswordQuality(2)
            ]
        );
        assert_eq!(f.gateway.state().password_quality, 2);
    }

    fn drop_queue_table(db: &Database) {
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE pending_changes")
                .map_err(|e| holdoff_core::error::HoldoffError::Storage(e.to_string()))
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_tick_survives_store_error() {
        let f = fixture();
        queue(&f.coordinator, &PolicyCommand::LockNow).await;
        f.clock.advance(1_001);
        drop_queue_table(&f.db);

        let report = f.scheduler.tick().await;
        assert!(report.is_idle());
        assert_eq!(report.pending, 0);
        assert!(f.gateway.calls().is_empty());
    }

    // ========================================================================
    // lifecycle
    // ========================================================================

    #[tokio::test]
    async fn test_background_loop_keeps_running_after_store_error() {
        let f = fixture();
        let scheduler = f.scheduler.with_poll_interval(Duration::from_millis(10));
        drop_queue_table(&f.db);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.is_running());
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let f = fixture();
        assert!(matches!(
            f.scheduler.stop().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_error() {
        let f = fixture();
        f.scheduler.start().unwrap();
        assert!(f.scheduler.is_running());
        assert!(matches!(
            f.scheduler.start(),
            Err(SchedulerError::AlreadyRunning)
        ));
        f.scheduler.stop().await.unwrap();
        assert!(!f.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_first_tick_waits_for_interval() {
        let f = fixture();
        let scheduler = f.scheduler.with_poll_interval(Duration::from_secs(3600));
        queue(&f.coordinator, &PolicyCommand::LockNow).await;
        f.clock.advance(2_000);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.gateway.calls().is_empty());
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_background_loop_applies_ready_changes() {
        let f = fixture();
        let scheduler = f.scheduler.with_poll_interval(Duration::from_millis(20));
        let mut snapshots = f.coordinator.subscribe();
        queue(&f.coordinator, &PolicyCommand::SetCameraDisabled(true)).await;
        f.clock.advance(1_001);

        scheduler.start().unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if snapshots.borrow_and_update().is_empty() {
                    break;
                }
                snapshots.changed().await.unwrap();
            }
        })
        .await
        .expect("pending change should be applied");
        scheduler.stop().await.unwrap();

        assert_eq!(f.gateway.calls(), vec![PolicyCommand::SetCameraDisabled(true)]);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let f = fixture();
        f.scheduler.start().unwrap();
        f.scheduler.stop().await.unwrap();
        f.scheduler.start().unwrap();
        assert!(f.scheduler.is_running());
        f.scheduler.stop().await.unwrap();
    }
}
