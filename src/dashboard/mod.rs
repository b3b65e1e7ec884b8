//! Displayed device state, kept fresh by the poller and changed by relay commands.

pub mod poller;
pub mod relay;
pub mod render;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DashboardConfig;
use crate::device::{DeviceApi, DeviceSnapshot};

pub use poller::PollerHandle;

pub const CONNECT_FAILURE: &str = "Failed to connect to the device";
pub const CONTROL_FAILURE: &str = "Failed to control relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingFirstPoll,
    Connected,
    Error,
}

/// What the dashboard shows: the last good snapshot plus an independent error message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub snapshot: DeviceSnapshot,
    pub error: Option<String>,
    /// Sequence number of the last poll result applied to this state.
    last_poll: Option<u64>,
}

impl DashboardState {
    pub fn phase(&self) -> Phase {
        if self.error.is_some() {
            Phase::Error
        } else if self.last_poll.is_none() {
            Phase::AwaitingFirstPoll
        } else {
            Phase::Connected
        }
    }

    /// Apply the outcome of poll `seq`. Returns false when the result was
    /// discarded because a newer poll has already been applied.
    pub fn apply_poll(
        &mut self,
        seq: u64,
        outcome: Option<DeviceSnapshot>,
        discard_stale: bool,
    ) -> bool {
        if discard_stale && self.last_poll.is_some_and(|last| seq <= last) {
            return false;
        }
        self.last_poll = Some(self.last_poll.map_or(seq, |last| last.max(seq)));

        match outcome {
            Some(snapshot) => {
                self.snapshot = snapshot;
                self.error = None;
            }
            None => self.error = Some(CONNECT_FAILURE.to_string()),
        }
        true
    }

    pub fn apply_command_failure(&mut self) {
        self.error = Some(CONTROL_FAILURE.to_string());
    }
}

/// Owns the device handle and the shared displayed state.
pub struct Dashboard<D> {
    device: Arc<D>,
    state: Arc<watch::Sender<DashboardState>>,
    config: DashboardConfig,
}

impl<D: DeviceApi> Dashboard<D> {
    pub fn new(device: D, config: DashboardConfig) -> Self {
        let (state, _) = watch::channel(DashboardState::default());
        Self {
            device: Arc::new(device),
            state: Arc::new(state),
            config,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    /// Start the recurring poll. Polling stops when the handle is shut down or dropped.
    pub fn start_polling(&self) -> PollerHandle {
        poller::spawn(
            Arc::clone(&self.device),
            Arc::clone(&self.state),
            self.config.clone(),
        )
    }

    /// Fire a relay command without waiting for it.
    pub fn set_relay(&self, on: bool) -> JoinHandle<()> {
        let device = Arc::clone(&self.device);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move { relay::send(device.as_ref(), &state, on).await })
    }

    /// Ask for the opposite of the last known relay state.
    pub fn toggle_relay(&self) -> JoinHandle<()> {
        let target = !self.state.borrow().snapshot.relay_on;
        self.set_relay(target)
    }
}
