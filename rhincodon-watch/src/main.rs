//! Terminal live-view client for the hiu paus telemetry relay
//!
//! Connects to the relay's WebSocket push channel and behaves like a
//! dashboard without a screen: keeps the same bounded per-metric series
//! a browser client keeps, prints one line per reading plus any alerts,
//! and can mirror the buffered series to a CSV file after every update
//! so the latest window is always on disk.
//!
//! The connection is supervised the way every link in this system is:
//! a fixed delay, then try again, forever.

use clap::Parser;
use rhincodon_core::{
    export, protocol::PushEvent, Clock, LinkSupervisor, SystemClock, TelemetrySeries,
};
use std::{fs, path::Path, path::PathBuf, thread, time::Duration};
use tracing::{debug, error, info, warn};
use tungstenite::Message;

/// Fixed reconnect delay for the live-view link
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Live terminal view of hiu paus telemetry.
#[derive(Parser)]
struct Cli {
    /// WebSocket URL of the relay
    #[arg(short, long, default_value = "ws://localhost:3000/ws")]
    url: String,

    /// Mirror the buffered samples to this CSV file after every update
    #[arg(short, long)]
    export: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let clock = SystemClock;
    let mut series = TelemetrySeries::new();
    let mut supervisor = LinkSupervisor::new(RECONNECT_DELAY);

    loop {
        let delay = supervisor.next_attempt();
        thread::sleep(delay);
        info!("connecting to {} (attempt {})", cli.url, supervisor.attempts());

        let (mut socket, _response) = match tungstenite::connect(cli.url.as_str()) {
            Ok(connection) => connection,
            Err(e) => {
                error!("connection failed: {e}");
                supervisor.connect_failed();
                continue;
            }
        };
        supervisor.established();

        loop {
            match socket.read_message() {
                Ok(Message::Text(text)) => {
                    handle_frame(&text, &mut series, &clock, cli.export.as_deref());
                }
                Ok(Message::Close(_)) => {
                    info!("server closed the connection");
                    supervisor.connection_lost();
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("connection lost: {e}");
                    supervisor.connection_lost();
                    break;
                }
            }
        }
    }
}

/// Parse one frame and apply it; frames this client does not understand
/// are skipped, never fatal.
fn handle_frame(text: &str, series: &mut TelemetrySeries, clock: &dyn Clock, export_path: Option<&Path>) {
    let frame: PushEvent = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("ignoring unrecognized frame: {e}");
            return;
        }
    };

    let buffered = apply_frame(frame, series, clock);

    if buffered {
        if let Some(path) = export_path {
            if let Err(e) = fs::write(path, export::to_csv_string(series)) {
                warn!("CSV export failed: {e}");
            }
        }
    }
}

/// Apply one push frame to the local series. Returns whether the series
/// changed (a `data` frame landed).
fn apply_frame(frame: PushEvent, series: &mut TelemetrySeries, clock: &dyn Clock) -> bool {
    match frame {
        PushEvent::Welcome { message, .. } => {
            info!("{message}");
            false
        }
        PushEvent::Data(reading) => {
            series.push(&reading, clock.time_label());
            info!(
                "{} | {:>6.1} cm/s | {:>5.1} °C | {:>4.1} mg/L | {:>6.1} kPa | {:>5.1} m | q {}%",
                reading.device_id,
                reading.speed_cms,
                reading.temperature,
                reading.dissolved_oxygen,
                reading.pressure,
                reading.depth,
                reading.quality,
            );
            true
        }
        PushEvent::Alerts(alerts) => {
            for alert in alerts {
                warn!("{}", alert.message);
            }
            false
        }
        PushEvent::History(rows) => {
            info!("received {} historical rows", rows.len());
            false
        }
        PushEvent::EmergencyActivated(_) => {
            warn!("emergency release activated");
            false
        }
    }
}
