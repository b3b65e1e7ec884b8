use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use flow_dashboard::config::Config;
use flow_dashboard::dashboard::render::render;
use flow_dashboard::dashboard::{Dashboard, DashboardState};
use flow_dashboard::device::client::HttpDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Toggle,
    Relay(bool),
    Quit,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr, the dashboard owns stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let device = match HttpDevice::new(&config.device) {
        Ok(d) => d,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting flow dashboard (device={}, poll every {:?}, discard stale polls: {})",
        device.base_url(),
        config.dashboard.poll_interval,
        config.dashboard.discard_stale_polls,
    );

    let dashboard = Dashboard::new(device, config.dashboard.clone());
    let mut updates = dashboard.subscribe();
    let poller = dashboard.start_polling();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    draw(&updates.borrow_and_update());

    loop {
        tokio::select! {
            Ok(()) = updates.changed() => {
                draw(&updates.borrow_and_update());
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_input(&line) {
                        Some(Input::Toggle) => {
                            dashboard.toggle_relay();
                        }
                        Some(Input::Relay(on)) => {
                            dashboard.set_relay(on);
                        }
                        Some(Input::Quit) => {
                            info!("Quit requested");
                            break;
                        }
                        None if line.trim().is_empty() => {}
                        None => warn!("Unknown command: {} (use t, on, off or q)", line.trim()),
                    },
                    Ok(None) => {
                        info!("stdin closed, commands disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = terminate() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    poller.shutdown().await;
    info!("flow dashboard stopped");
}

async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn draw(state: &DashboardState) {
    let mut stdout = std::io::stdout().lock();
    // clear screen, cursor home
    let _ = write!(stdout, "\x1b[2J\x1b[H{}", render(state));
    let _ = writeln!(stdout, "\n[t] toggle  [on] [off]  [q] quit");
    let _ = stdout.flush();
}

/// Parse one line typed by the operator.
fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "t" | "toggle" => Some(Input::Toggle),
        "on" => Some(Input::Relay(true)),
        "off" => Some(Input::Relay(false)),
        "q" | "quit" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_operator_commands() {
        assert_eq!(parse_input("t"), Some(Input::Toggle));
        assert_eq!(parse_input(" Toggle \n"), Some(Input::Toggle));
        assert_eq!(parse_input("ON"), Some(Input::Relay(true)));
        assert_eq!(parse_input("off"), Some(Input::Relay(false)));
        assert_eq!(parse_input("q"), Some(Input::Quit));
    }

    #[test]
    fn should_ignore_unknown_input() {
        assert_eq!(parse_input(""), None);
        assert_eq!(parse_input("relay"), None);
    }
}
