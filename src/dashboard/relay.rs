use tokio::sync::watch;
use tracing::{info, warn};

use crate::device::DeviceApi;

use super::DashboardState;

/// Send one relay command. The snapshot is left alone; the next poll picks up
/// the new relay state.
pub async fn send<D: DeviceApi>(device: &D, state: &watch::Sender<DashboardState>, on: bool) {
    info!("Switching relay {}", if on { "on" } else { "off" });

    if let Err(e) = device.set_relay(on).await {
        warn!("Relay command failed: {}", e);
        state.send_modify(DashboardState::apply_command_failure);
    }
}
