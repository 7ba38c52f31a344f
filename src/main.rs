//! Host loop for telescope clients.
//!
//! Loads the configuration, opens a client for every enabled telescope and
//! drives them the way a planetarium host would: `perform_communication` every
//! cycle, an interpolated position report every second, and an optional go-to
//! at start-up.
//!
//! ```bash
//! telescope_client --config config/telescopes.toml --goto 5.919,7.407
//! RUST_LOG=telescope_client=debug telescope_client --duration-secs 30
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telescope_client::clock::{Clock, SystemClock};
use telescope_client::config::{Settings, DEFAULT_CONFIG_PATH};
use telescope_client::driver::DriverRegistry;
use telescope_client::navigator::PrecessionNavigator;
use telescope_client::{logging, ClientEvent, DriverClient, EquatorialCoords, TelescopeClient};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "telescope_client", version, about = "Drive telescope mounts through automation drivers")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// J2000 go-to target sent to every telescope, as RA_HOURS,DEC_DEGREES
    #[arg(long, value_parser = parse_target, allow_hyphen_values = true)]
    goto: Option<EquatorialCoords>,

    /// Host update cycle in milliseconds
    #[arg(long, default_value_t = 100)]
    cycle_ms: u64,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Print position reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// List the available driver identifiers and exit
    #[arg(long)]
    list_drivers: bool,
}

fn parse_target(s: &str) -> Result<EquatorialCoords, String> {
    let (ra, dec) = s
        .split_once(',')
        .ok_or_else(|| format!("expected RA_HOURS,DEC_DEGREES, got '{}'", s))?;
    let ra_hours: f64 = ra.trim().parse().map_err(|e| format!("bad RA '{}': {}", ra, e))?;
    let dec_degrees: f64 = dec
        .trim()
        .parse()
        .map_err(|e| format!("bad Dec '{}': {}", dec, e))?;
    if !(0.0..24.0).contains(&ra_hours) {
        return Err(format!("RA {} outside [0, 24) hours", ra_hours));
    }
    if !(-90.0..=90.0).contains(&dec_degrees) {
        return Err(format!("Dec {} outside [-90, 90] degrees", dec_degrees));
    }
    Ok(EquatorialCoords::new(ra_hours, dec_degrees))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let registry = DriverRegistry::with_simulator();
    if cli.list_drivers {
        for id in registry.driver_ids() {
            println!("{}", id);
        }
        return Ok(());
    }

    logging::init_from_config(&settings.application)?;
    info!("{} starting", settings.application.name);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let navigator = Arc::new(PrecessionNavigator::new(clock.clone()));
    let (events, mut event_rx) = broadcast::channel(64);

    let mut clients: Vec<DriverClient> = settings
        .enabled_telescopes()
        .map(|t| {
            DriverClient::from_config(t, &registry, navigator.clone(), clock.clone(), events.clone())
        })
        .collect();
    if clients.is_empty() {
        return Err(anyhow!(
            "No enabled telescopes in {}",
            cli.config.display()
        ));
    }

    for client in &mut clients {
        if !client.is_initialized() {
            warn!("Telescope '{}' could not be initialized", client.name());
        }
    }

    if let Some(target) = cli.goto {
        for client in &mut clients {
            match client.goto_target(target.to_direction()) {
                Some(mode) => info!("{}: go-to {} sent ({:?})", client.name(), target, mode),
                None => warn!("{}: go-to {} dropped", client.name(), target),
            }
        }
    }

    let mut cycle = tokio::time::interval(Duration::from_millis(cli.cycle_ms.max(1)));
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let stop = async {
        match cli.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = cycle.tick() => {
                for client in &mut clients {
                    if client.prepare_communication() {
                        client.perform_communication();
                    }
                }
                drain_events(&mut event_rx);
            }
            _ = report.tick() => {
                let now = clock.now_micros();
                for client in &mut clients {
                    report_position(client, now, cli.json)?;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = &mut stop => break,
        }
    }

    info!("{} stopped", settings.application.name);
    Ok(())
}

fn drain_events(rx: &mut broadcast::Receiver<ClientEvent>) {
    loop {
        match rx.try_recv() {
            Ok(ClientEvent::Fault { message, .. }) => error!("{}", message),
            Err(TryRecvError::Lagged(n)) => warn!("Missed {} client events", n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn report_position(client: &mut DriverClient, now: i64, json: bool) -> Result<()> {
    if !client.is_initialized() {
        return Ok(());
    }
    let direction = client.j2000_position(now);
    if direction.try_normalize(f64::EPSILON).is_none() {
        // no sample yet
        return Ok(());
    }
    let coords = EquatorialCoords::from_direction(&direction);
    if json {
        let line = serde_json::json!({
            "telescope": client.name(),
            "time_us": now,
            "ra_hours": coords.ra_hours,
            "dec_degrees": coords.dec_degrees,
        });
        println!("{}", serde_json::to_string(&line)?);
    } else {
        info!("{}: {} (J2000)", client.name(), coords);
    }
    Ok(())
}
