use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::device::{DeviceApi, DeviceSnapshot};

use super::DashboardState;

/// Keeps the poll loop alive. Dropping it stops polling.
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop the timer and abort polls still in flight. Once this returns no
    /// further request is issued.
    pub async fn shutdown(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!("Poller task ended abnormally: {}", e);
            }
        }
        info!("Polling stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

pub(super) fn spawn<D: DeviceApi>(
    device: Arc<D>,
    state: Arc<watch::Sender<DashboardState>>,
    config: DashboardConfig,
) -> PollerHandle {
    let task = tokio::spawn(run(device, state, config));
    PollerHandle { task: Some(task) }
}

/// Unanswered polls at which a hung device gets reported.
const BACKLOG_WARN_AT: usize = 3;

/// True when the in-flight count has just grown to the warning level.
fn backlog_reached(in_flight: usize) -> bool {
    in_flight == BACKLOG_WARN_AT
}

/// One poll per tick, regardless of whether earlier polls have answered.
async fn run<D: DeviceApi>(
    device: Arc<D>,
    state: Arc<watch::Sender<DashboardState>>,
    config: DashboardConfig,
) {
    info!("Polling device every {:?}", config.poll_interval);

    let mut ticker = tokio::time::interval(config.poll_interval);
    let mut in_flight: JoinSet<(u64, Option<DeviceSnapshot>)> = JoinSet::new();
    let mut next_seq: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                next_seq += 1;
                let seq = next_seq;
                let device = Arc::clone(&device);
                in_flight.spawn(async move {
                    match device.status().await {
                        Ok(snapshot) => (seq, Some(snapshot)),
                        Err(e) => {
                            warn!("Poll {} failed: {}", seq, e);
                            (seq, None)
                        }
                    }
                });
                if backlog_reached(in_flight.len()) {
                    warn!(
                        "{} polls still waiting for the device, set DEVICE_TIMEOUT_MS to bound them",
                        in_flight.len()
                    );
                }
            }
            Some(joined) = in_flight.join_next() => {
                let Ok((seq, outcome)) = joined else {
                    continue;
                };
                let applied = state
                    .send_if_modified(|s| s.apply_poll(seq, outcome, config.discard_stale_polls));
                if !applied {
                    debug!("Discarded stale result of poll {}", seq);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::super::testing::{FakeDevice, snapshot};
    use super::super::{CONNECT_FAILURE, Dashboard};
    use super::{BACKLOG_WARN_AT, backlog_reached};
    use crate::config::DashboardConfig;

    fn config(discard_stale_polls: bool) -> DashboardConfig {
        DashboardConfig {
            poll_interval: Duration::from_millis(2000),
            discard_stale_polls,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_show_snapshot_after_successful_poll() {
        let dashboard = Dashboard::new(
            FakeDevice::answering(snapshot(true, 3.25, false)),
            config(true),
        );
        let _poller = dashboard.start_polling();
        sleep(Duration::from_millis(10)).await;

        let state = dashboard.current();
        assert_eq!(state.snapshot, snapshot(true, 3.25, false));
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_poll_on_fixed_interval() {
        let dashboard = Dashboard::new(
            FakeDevice::answering(snapshot(true, 1.0, true)),
            config(true),
        );
        let _poller = dashboard.start_polling();
        sleep(Duration::from_millis(4100)).await;

        assert_eq!(dashboard.device.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_last_snapshot_when_poll_fails() {
        let device = FakeDevice::unreachable().then(Duration::ZERO, Some(snapshot(true, 2.5, true)));
        let dashboard = Dashboard::new(device, config(true));
        let _poller = dashboard.start_polling();

        sleep(Duration::from_millis(10)).await;
        assert_eq!(dashboard.current().error, None);

        sleep(Duration::from_millis(2000)).await;
        let state = dashboard.current();
        assert_eq!(state.snapshot, snapshot(true, 2.5, true));
        assert_eq!(state.error.as_deref(), Some(CONNECT_FAILURE));
    }

    #[tokio::test(start_paused = true)]
    async fn should_recover_after_failed_poll() {
        let dashboard = Dashboard::new(FakeDevice::unreachable(), config(true));
        let _poller = dashboard.start_polling();

        sleep(Duration::from_millis(10)).await;
        assert_eq!(dashboard.current().error.as_deref(), Some(CONNECT_FAILURE));

        dashboard.device.set_fallback(Some(snapshot(true, 0.75, false)));
        sleep(Duration::from_millis(2000)).await;
        let state = dashboard.current();
        assert_eq!(state.snapshot, snapshot(true, 0.75, false));
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_poll_after_shutdown() {
        let dashboard = Dashboard::new(
            FakeDevice::answering(snapshot(true, 1.0, true)),
            config(true),
        );
        let poller = dashboard.start_polling();
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(dashboard.device.status_calls(), 2);

        poller.shutdown().await;
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(dashboard.device.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_poll_after_handle_dropped() {
        let dashboard = Dashboard::new(
            FakeDevice::answering(snapshot(true, 1.0, true)),
            config(true),
        );
        let poller = dashboard.start_polling();
        sleep(Duration::from_millis(10)).await;
        drop(poller);

        sleep(Duration::from_millis(5000)).await;
        assert_eq!(dashboard.device.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_discard_slow_response_from_older_poll() {
        let device = FakeDevice::answering(snapshot(true, 9.0, true))
            .then(Duration::from_millis(3000), Some(snapshot(true, 1.0, false)))
            .then(Duration::ZERO, Some(snapshot(true, 2.0, true)));
        let dashboard = Dashboard::new(device, config(true));
        let _poller = dashboard.start_polling();

        sleep(Duration::from_millis(2500)).await;
        // second poll went out while the first was still pending
        assert_eq!(dashboard.device.status_calls(), 2);
        assert_eq!(dashboard.current().snapshot, snapshot(true, 2.0, true));

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(dashboard.current().snapshot, snapshot(true, 2.0, true));
    }

    #[tokio::test(start_paused = true)]
    async fn should_let_last_response_win_when_stale_check_disabled() {
        let device = FakeDevice::answering(snapshot(true, 9.0, true))
            .then(Duration::from_millis(3000), Some(snapshot(true, 1.0, false)))
            .then(Duration::ZERO, Some(snapshot(true, 2.0, true)));
        let dashboard = Dashboard::new(device, config(false));
        let _poller = dashboard.start_polling();

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(dashboard.current().snapshot, snapshot(true, 1.0, false));
    }

    #[test]
    fn should_flag_backlog_once_when_crossing_threshold() {
        assert!(!backlog_reached(BACKLOG_WARN_AT - 1));
        assert!(backlog_reached(BACKLOG_WARN_AT));
        assert!(!backlog_reached(BACKLOG_WARN_AT + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_polling_while_device_hangs() {
        let hang = Duration::from_secs(3600);
        let device = FakeDevice::answering(snapshot(true, 1.0, true))
            .then(hang, None)
            .then(hang, None)
            .then(hang, None)
            .then(hang, None);
        let dashboard = Dashboard::new(device, config(true));
        let poller = dashboard.start_polling();

        sleep(Duration::from_millis(6100)).await;
        assert_eq!(dashboard.device.status_calls(), 4);
        assert_eq!(dashboard.current().phase(), super::super::Phase::AwaitingFirstPoll);

        sleep(Duration::from_millis(2000)).await;
        assert_eq!(dashboard.current().snapshot, snapshot(true, 1.0, true));

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_notify_subscribers_on_update() {
        let dashboard = Dashboard::new(
            FakeDevice::answering(snapshot(true, 3.25, false)),
            config(true),
        );
        let mut updates = dashboard.subscribe();
        let _poller = dashboard.start_polling();

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().snapshot.flow_rate, 3.25);
    }
}
