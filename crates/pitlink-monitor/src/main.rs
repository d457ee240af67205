//! # PitLink Monitor
//!
//! Connects to the smoker (or the simulated one), prints telemetry and
//! alerts as they arrive, and optionally sends one command.
//!
//! ## Usage
//! ```bash
//! pitlink-monitor --demo chamber 225
//! pitlink-monitor --port /dev/rfcomm0 --celsius
//! RUST_LOG=debug pitlink-monitor --demo
//! ```

mod args;

use anyhow::{Context, Result};
use pitlink_core::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = args::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", args::USAGE);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => LinkConfig::load(path).with_context(|| format!("loading {:?}", path))?,
        None => LinkConfig::load_or_default(),
    };
    if args.demo {
        config.transport = TransportConfig::Simulated;
    } else if let Some(address) = &args.tcp {
        config.transport = TransportConfig::Tcp {
            address: address.clone(),
        };
    } else if let Some(port) = &args.port {
        if let TransportConfig::Serial { port: configured, .. } = &mut config.transport {
            *configured = Some(port.clone());
        }
    }

    let mut session = Session::from_config(&config)?;
    let mut events = session.subscribe();
    let mut state = session.connection_state();

    session.connect().await.context("connecting to smoker")?;
    session.start_polling();

    if let Some(command) = args.command {
        session
            .dispatch(command, args.unit)
            .with_context(|| format!("sending {:?}", command))?;
        info!("sent {:?}", command);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                info!("connection: {:?}", current);
            }
            event = events.recv() => match event {
                Ok(LinkEvent::Telemetry(reading)) => print_reading(&reading, args.unit),
                Ok(LinkEvent::Alert(alert)) => println!("ALERT {:?}: {}", alert.kind, alert.message()),
                Err(RecvError::Lagged(n)) => warn!("dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.shutdown().await;
    Ok(())
}

fn print_reading(reading: &TelemetryReading, unit: TemperatureUnit) {
    let s = &reading.snapshot;
    println!(
        "{} chamber {:>6.1}{sym}  left {:>6.1}{sym}  right {:>6.1}{sym}  fan {:>3}%  hopper {}  damper {}",
        reading.received_at.format("%H:%M:%S"),
        s.chamber_temp(unit),
        s.cook_temp_left(unit),
        s.cook_temp_right(unit),
        s.fan_duty_percent,
        if s.hopper_active { "on " } else { "off" },
        if s.damper_open { "open" } else { "closed" },
        sym = unit.symbol(),
    );
    if s.exceeds_safety_limit() {
        warn!("probe above the controller's shutdown limit");
    }
}
