use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::sim::{MAX_PULSE_PERIOD, pulse_period};

#[derive(Debug, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Host or host:port of the device, optionally prefixed with `http://`.
    pub address: String,
    /// `DEVICE_TIMEOUT_MS`. Without it a poll against a device that never
    /// answers stays in flight until the dashboard stops, one per tick.
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub poll_interval: Duration,
    /// Drop poll responses that resolve after a newer poll was applied.
    pub discard_stale_polls: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            discard_stale_polls: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub bind: SocketAddr,
    pub pulses_per_sec: f64,
    pub measure_window: Duration,
    pub wifi_connected: bool,
}

fn env_required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} environment variable is required"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> Result<bool, String> {
    match env_optional(key) {
        Some(value) => parse_flag(key, &value),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{key} must be true or false, got {value:?}")),
    }
}

/// Split `scheme://rest` into a lowercased scheme and the rest.
fn split_scheme(address: &str) -> (Option<String>, &str) {
    match address.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, address),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let request_timeout = env_optional("DEVICE_TIMEOUT_MS")
            .map(|v| {
                v.parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| format!("DEVICE_TIMEOUT_MS invalid: {e}"))
            })
            .transpose()?;

        let config = Self {
            device: DeviceConfig {
                address: env_required("DEVICE_ADDRESS")?,
                request_timeout,
            },
            dashboard: DashboardConfig {
                poll_interval: Duration::from_millis(env_or_default("POLL_INTERVAL_MS", 2000)),
                discard_stale_polls: env_flag("DISCARD_STALE_POLLS", true)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        self.device.validate()?;
        if self.dashboard.poll_interval.is_zero() {
            return Err("POLL_INTERVAL_MS must be > 0".into());
        }
        if self.device.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err("DEVICE_TIMEOUT_MS must be > 0".into());
        }
        Ok(())
    }
}

impl DeviceConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            request_timeout: None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err("DEVICE_ADDRESS must not be empty".into());
        }
        match split_scheme(address) {
            (Some(scheme), _) if scheme == "https" => {
                Err("DEVICE_ADDRESS must use plain http, TLS is not supported".into())
            }
            (Some(scheme), _) if scheme != "http" => {
                Err(format!("DEVICE_ADDRESS has unsupported scheme {scheme}://"))
            }
            (_, host) if host.trim_matches('/').is_empty() => {
                Err("DEVICE_ADDRESS must name a host".into())
            }
            _ => Ok(()),
        }
    }

    /// Base URL of the device with a trailing slash.
    /// "192.168.1.16" → "http://192.168.1.16/"
    pub fn base_url(&self) -> String {
        let (_, host) = split_scheme(self.address.trim());
        format!("http://{}/", host.trim_end_matches('/'))
    }
}

impl SimConfig {
    pub fn from_env() -> Result<Self, String> {
        let bind = env_or_default("SIM_BIND", "0.0.0.0:8080".to_string());
        let config = Self {
            bind: bind
                .parse()
                .map_err(|e| format!("SIM_BIND invalid ({bind}): {e}"))?,
            pulses_per_sec: env_or_default("SIM_PULSES_PER_SEC", 0.5),
            measure_window: Duration::from_millis(env_or_default("SIM_MEASURE_MS", 1000)),
            wifi_connected: env_flag("SIM_WIFI_CONNECTED", true)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.pulses_per_sec.is_finite() || self.pulses_per_sec < 0.0 {
            return Err("SIM_PULSES_PER_SEC must be a non-negative number".into());
        }
        if self.pulses_per_sec > 0.0 && pulse_period(self.pulses_per_sec).is_none() {
            return Err(format!(
                "SIM_PULSES_PER_SEC {} out of range, the gap between pulses must be between 1ns and {:?}",
                self.pulses_per_sec, MAX_PULSE_PERIOD
            ));
        }
        if self.measure_window.is_zero() {
            return Err("SIM_MEASURE_MS must be > 0".into());
        }
        Ok(())
    }
}
