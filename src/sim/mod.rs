//! Stand-in for the flow sensor/relay board, speaking the same HTTP API.

pub mod server;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SimConfig;

/// Sensor calibration: pulses emitted per litre.
pub const PULSES_PER_LITRE: f64 = 7.5;

/// Longest gap between generated pulses.
pub const MAX_PULSE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Body of a status response. The relay is reported as the raw pin value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    pub wifi_status: bool,
    pub flow_rate: f64,
    pub relay_status: u8,
}

#[derive(Debug, Default)]
struct Board {
    relay_on: bool,
    pulses: u64,
    wifi_connected: bool,
    fault: Option<String>,
}

pub struct SimDevice {
    board: Mutex<Board>,
    measure_window: Duration,
}

/// Litres per minute for `pulses` counted over `elapsed`, rounded to 2 decimals.
pub fn flow_rate(pulses: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let rate = (pulses as f64 / PULSES_PER_LITRE) * (60.0 / secs);
    (rate * 100.0).round() / 100.0
}

impl SimDevice {
    pub fn new(measure_window: Duration, wifi_connected: bool) -> Self {
        Self {
            board: Mutex::new(Board {
                wifi_connected,
                ..Board::default()
            }),
            measure_window,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.measure_window, config.wifi_connected)
    }

    fn board(&self) -> std::sync::MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_pulses(&self, count: u64) {
        self.board().pulses += count;
    }

    pub fn relay_on(&self) -> bool {
        self.board().relay_on
    }

    /// Make every status request fail with `message` until cleared.
    pub fn set_fault(&self, message: Option<String>) {
        self.board().fault = message;
    }

    /// Serve one request: apply the relay command if any, measure the flow over
    /// the window, then report. No flow forces the relay off.
    pub async fn serve(&self, command: Option<bool>) -> Result<StatusReport, String> {
        if let Some(message) = self.board().fault.clone() {
            return Err(message);
        }

        if let Some(on) = command {
            info!("Relay {}", if on { "on" } else { "off" });
            self.board().relay_on = on;
        }

        let start = Instant::now();
        tokio::time::sleep(self.measure_window).await;
        let elapsed = start.elapsed();

        let mut board = self.board();
        let pulses = std::mem::take(&mut board.pulses);
        let flow = flow_rate(pulses, elapsed);
        debug!("{} pulses in {:?} -> {} L/min", pulses, elapsed, flow);

        if flow == 0.0 && board.relay_on {
            info!("No flow detected, switching relay off");
            board.relay_on = false;
        }

        Ok(StatusReport {
            wifi_status: board.wifi_connected,
            flow_rate: flow,
            relay_status: u8::from(board.relay_on),
        })
    }
}

/// Time between two pulses at `pulses_per_sec`. None when the rate is not
/// positive or the period falls outside `(0, MAX_PULSE_PERIOD]`.
pub fn pulse_period(pulses_per_sec: f64) -> Option<Duration> {
    if !pulses_per_sec.is_finite() || pulses_per_sec <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / pulses_per_sec)
        .ok()
        .filter(|period| !period.is_zero() && *period <= MAX_PULSE_PERIOD)
}

/// Feed pulses into the device at a steady rate. Returns immediately when the
/// rate is zero or unusable.
pub async fn generate_pulses(device: Arc<SimDevice>, pulses_per_sec: f64) {
    if pulses_per_sec == 0.0 {
        return;
    }
    let Some(period) = pulse_period(pulses_per_sec) else {
        warn!("Pulse rate {} out of range, generating no pulses", pulses_per_sec);
        return;
    };
    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        device.record_pulses(1);
    }
}
