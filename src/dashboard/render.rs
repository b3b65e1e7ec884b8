use std::fmt::Write;

use super::{DashboardState, Phase};

/// Render the dashboard as plain text, one line per item.
pub fn render(state: &DashboardState) -> String {
    let snapshot = &state.snapshot;
    let mut out = String::new();

    let wifi = if snapshot.wifi_connected {
        "Connected"
    } else {
        "Disconnected"
    };
    let (relay, action) = if snapshot.relay_on {
        ("ON", "Turn Off")
    } else {
        ("OFF", "Turn On")
    };

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Flow Sensor Dashboard");
    let _ = writeln!(out, "  Wi-Fi:      {wifi}");
    let _ = writeln!(out, "  Flow Rate:  {:.2} L/min", snapshot.flow_rate);
    let _ = writeln!(out, "  Relay:      {relay}  [t] {action}");

    if state.phase() == Phase::AwaitingFirstPoll {
        let _ = writeln!(out, "  Waiting for first reading...");
    }
    if let Some(error) = &state.error {
        let _ = writeln!(out, "  Error: {error}");
    }
    out
}
