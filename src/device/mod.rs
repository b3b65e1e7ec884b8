pub mod client;

use std::future::Future;

use serde::{Deserialize, Deserializer};

/// State reported by the device on `GET /`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(rename = "wifi_status")]
    pub wifi_connected: bool,
    /// Litres per minute.
    pub flow_rate: f64,
    /// The firmware reports the raw pin value, so 0/1 is accepted too.
    #[serde(rename = "relay_status", deserialize_with = "bool_or_pin")]
    pub relay_on: bool,
}

fn bool_or_pin<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Pin(u8),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Pin(0) => Ok(false),
        Raw::Pin(1) => Ok(true),
        Raw::Pin(n) => Err(serde::de::Error::custom(format!(
            "invalid relay pin value {n}"
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid device address {0}")]
    InvalidAddress(String),

    #[error("request to device failed")]
    Transport(#[source] reqwest::Error),

    #[error("device answered with HTTP {0}")]
    Status(u16),

    #[error("unexpected device response")]
    Parse(#[source] serde_json::Error),
}

/// Operations the dashboard needs from the device.
pub trait DeviceApi: Send + Sync + 'static {
    /// Fetch the current device state.
    fn status(&self) -> impl Future<Output = Result<DeviceSnapshot, DeviceError>> + Send;

    /// Ask the device to switch the relay. The response body carries no meaning.
    fn set_relay(&self, on: bool) -> impl Future<Output = Result<(), DeviceError>> + Send;
}

/// Path of the relay command endpoint for the desired state.
pub fn relay_path(on: bool) -> &'static str {
    if on { "relay/on" } else { "relay/off" }
}
