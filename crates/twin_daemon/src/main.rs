mod alerts;
mod routes;
mod state;
mod tick_loop;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;

use crate::routes::make_router_with_cors;
use crate::state::{AppState, SimState};
use crate::tick_loop::run_tick_loop;

#[derive(Parser)]
#[command(name = "twin_daemon", about = "Distillery twin HTTP daemon")]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    #[arg(long, default_value_t = 3001)]
    port: u16,
    /// Station ticks per wall-clock second. 0 runs as fast as possible.
    #[arg(long, default_value_t = 10.0)]
    ticks_per_sec: f64,
    /// Frames per station tick; vehicles move once per frame.
    #[arg(long, default_value_t = 4)]
    frames_per_tick: u32,
    #[arg(long)]
    max_ticks: Option<u64>,
    /// Sample metrics every N ticks (default 60).
    #[arg(long, default_value_t = 60)]
    metrics_every: u64,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();

    let plant = twin_world::load_content(&cli.content_dir)?;
    let seed = cli.seed.unwrap_or_else(rand::random);
    let mut rng = twin_world::make_rng(seed);
    let twin = twin_world::build_initial_state(&plant, seed, &mut rng);

    let frames_per_tick = cli.frames_per_tick.max(1);
    let sim = Arc::new(parking_lot::Mutex::new(SimState::new(
        twin,
        plant,
        rng,
        cli.metrics_every,
        frames_per_tick,
    )));
    let (event_tx, _) = broadcast::channel(256);

    let app_state = AppState {
        sim: sim.clone(),
        event_tx: event_tx.clone(),
        ticks_per_sec: cli.ticks_per_sec,
    };
    let router = make_router_with_cors(app_state, &cli.cors_origin)?;

    let frames_per_sec = cli.ticks_per_sec * f64::from(frames_per_tick);
    tokio::spawn(run_tick_loop(sim, event_tx, frames_per_sec, cli.max_ticks));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, seed, ticks_per_sec = cli.ticks_per_sec, "twin_daemon listening");
    axum::serve(listener, router)
        .await
        .context("serving HTTP")?;
    Ok(())
}
