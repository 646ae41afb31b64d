use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zumo_sim::net::start_websocket_server;
use zumo_sim::state::TelemetryHub;
use zumo_sim::{Simulation, Spawn, VehicleConfig, WorldConfig};

/// Zumo robot simulator with websocket telemetry
#[derive(Parser)]
#[command(name = "zumo-sim")]
#[command(version)]
struct Cli {
    /// Websocket port
    #[arg(short, long, default_value = "9001")]
    port: u16,

    /// Physics steps per second (1..=1000)
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=1000))]
    tick_hz: u32,

    /// JSON file overriding the built-in vehicle preset
    #[arg(long)]
    vehicle_config: Option<PathBuf>,

    /// Start with an empty world (ground only)
    #[arg(long)]
    no_scene: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_scene(sim: &mut Simulation, config: &VehicleConfig, with_props: bool) -> Result<()> {
    sim.physics.add_ground();

    if with_props {
        sim.physics.add_ramp(12.0, 25.0);
        sim.physics.add_block([0.5, 0.5, 0.5], [-3.0, 0.5, 6.0]);
        sim.physics.add_line(0.0, 2.0, 10.0, 0.0, 0.8);
        sim.physics.add_line(0.0, 12.0, 6.0, 90.0, 0.4);
    }

    let id = sim.add_vehicle(config, &Spawn::at(0.0, 0.8, 0.0))?;
    info!(vehicle = %id, "scene ready");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let vehicle_config = match &cli.vehicle_config {
        Some(path) => VehicleConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VehicleConfig::default(),
    };

    let mut sim = Simulation::new(&WorldConfig::default());
    build_scene(&mut sim, &vehicle_config, !cli.no_scene)?;

    let sim = Arc::new(Mutex::new(sim));
    let hub = Arc::new(Mutex::new(TelemetryHub::new()));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let server = tokio::spawn(start_websocket_server(addr, Arc::clone(&sim), Arc::clone(&hub)));

    // Fixed timestep
    let tick_hz = cli.tick_hz;
    let dt = 1.0 / tick_hz as f32;
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(tick_hz, port = cli.port, "starting simulation loop");

    loop {
        ticker.tick().await;

        if server.is_finished() {
            match server.await {
                Ok(Err(e)) => error!(error = %e, "websocket server stopped"),
                Err(e) => error!(error = %e, "websocket task panicked"),
                Ok(Ok(())) => {}
            }
            anyhow::bail!("websocket server exited");
        }

        let mut sim = sim.lock().await;
        sim.step(dt);
        hub.lock().await.broadcast(&sim);
    }
}
