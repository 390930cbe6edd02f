use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand_chacha::ChaCha8Rng;
use twin_core::{EventLevel, MetricsFileWriter, Plant, TransportStrategy, TwinState};
use twin_world::{build_initial_state, load_content, make_rng};

/// Largest ledger drift tolerated at the end of a run.
const CONSERVATION_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "twin_cli", about = "Distillery twin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the line for a fixed number of station ticks.
    Run {
        #[arg(long)]
        ticks: u64,
        /// Seed a fresh plant with this seed. Mutually exclusive with --state.
        #[arg(long, conflicts_with = "state_file")]
        seed: Option<u64>,
        /// Resume from a saved TwinState JSON file. Mutually exclusive with --seed.
        #[arg(long = "state", conflicts_with = "seed")]
        state_file: Option<String>,
        #[arg(long, default_value = "./content")]
        content_dir: String,
        #[arg(long, default_value = "headless", value_parser = ["headless", "animated"])]
        transport: String,
        /// Frames per station tick; vehicles move once per frame.
        #[arg(long, default_value_t = 1)]
        frames_per_tick: u32,
        #[arg(long, default_value_t = 100)]
        print_every: u64,
        #[arg(long, default_value = "normal", value_parser = ["normal", "debug"])]
        event_level: String,
        /// Sample metrics every N ticks (default 60).
        #[arg(long, default_value_t = 60)]
        metrics_every: u64,
        /// Disable automatic metrics collection to runs/ directory.
        #[arg(long)]
        no_metrics: bool,
    },
}

struct RunArgs {
    ticks: u64,
    seed: Option<u64>,
    state_file: Option<String>,
    content_dir: String,
    strategy: TransportStrategy,
    frames_per_tick: u32,
    print_every: u64,
    event_level: EventLevel,
    metrics_every: u64,
    no_metrics: bool,
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

fn generate_run_id(seed: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = epoch_days_to_date(days);

    format!("{year:04}{month:02}{day:02}_{hours:02}{minutes:02}{seconds:02}_seed{seed}")
}

fn epoch_days_to_date(mut days: u64) -> (u64, u64, u64) {
    // Civil-from-days, http://howardhinnant.github.io/date_algorithms.html
    days += 719_468;
    let era = days / 146_097;
    let day_of_era = days % 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36524 - day_of_era / 146_096) / 365;
    let year = year_of_era + era * 400;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };
    (year, month, day)
}

fn create_run_dir(run_id: &str) -> Result<std::path::PathBuf> {
    let dir = std::path::PathBuf::from("runs").join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

fn write_run_info(
    dir: &std::path::Path,
    run_id: &str,
    seed: u64,
    args: &RunArgs,
    content_version: &str,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "seed": seed,
        "start_time": run_id.split('_').take(2).collect::<Vec<_>>().join("_"),
        "content_version": content_version,
        "metrics_every": args.metrics_every,
        "runner": "twin_cli",
        "args": {
            "ticks": args.ticks,
            "transport": args.strategy,
            "frames_per_tick": args.frames_per_tick,
            "print_every": args.print_every,
        }
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn load_or_build_state(args: &RunArgs, plant: &Plant) -> Result<(TwinState, ChaCha8Rng)> {
    if let Some(path) = &args.state_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file: {path}"))?;
        let loaded: TwinState =
            serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
        let rng = make_rng(loaded.meta.seed);
        return Ok((loaded, rng));
    }
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = make_rng(seed);
    let state = build_initial_state(plant, seed, &mut rng);
    Ok((state, rng))
}

fn run(args: &RunArgs) -> Result<()> {
    let plant = load_content(&args.content_dir)?;
    let (mut state, mut rng) = load_or_build_state(args, &plant)?;

    let mut metrics_writer: Option<MetricsFileWriter> = None;
    if !args.no_metrics {
        let run_id = generate_run_id(state.meta.seed);
        let run_dir = create_run_dir(&run_id)?;
        write_run_info(
            &run_dir,
            &run_id,
            state.meta.seed,
            args,
            &plant.content.content_version,
        )?;
        let writer = MetricsFileWriter::new(run_dir.clone())
            .with_context(|| format!("opening metrics CSV in {}", run_dir.display()))?;
        metrics_writer = Some(writer);
        println!("Run directory: {}", run_dir.display());
    }

    let frames_per_tick = args.frames_per_tick.max(1);
    let dt = plant.content.constants.tick_seconds / f64::from(frames_per_tick);
    let target_tick = state.stats.uptime_ticks + args.ticks;

    println!(
        "Starting simulation: ticks={} seed={} transport={:?} frames_per_tick={frames_per_tick} content_version={}",
        args.ticks, state.meta.seed, args.strategy, plant.content.content_version,
    );
    println!("{}", "-".repeat(80));

    if !state.meta.running {
        twin_core::set_running(&mut state, true);
    }

    while state.stats.uptime_ticks < target_tick {
        let before = state.stats.uptime_ticks;
        let events = twin_core::tick(
            &mut state,
            &plant,
            args.strategy,
            dt,
            &mut rng,
            args.event_level,
        );

        for event in &events {
            if let twin_core::Event::VehicleUnloaded {
                vehicle_id,
                station_id: None,
                admitted,
                ..
            } = &event.event
            {
                tracing::debug!(vehicle = %vehicle_id, admitted, "delivered to sink");
            }
        }

        let now = state.stats.uptime_ticks;
        if now == before {
            continue;
        }
        if args.print_every > 0 && now % args.print_every == 0 {
            print_status(&state);
        }
        if let Some(ref mut writer) = metrics_writer {
            if args.metrics_every > 0 && now % args.metrics_every == 0 {
                let snapshot = twin_core::compute_metrics(&state, &plant);
                writer.write_row(&snapshot).context("writing metrics row")?;
            }
        }
    }

    println!("{}", "-".repeat(80));
    println!("Done. Final state at tick {}:", state.stats.uptime_ticks);
    print_status(&state);

    if let Some(ref mut writer) = metrics_writer {
        writer.flush().context("final metrics flush")?;
        println!("Metrics written to runs/ directory.");
    }

    let drift = twin_core::conservation_error(&state, &plant);
    println!(
        "Conservation: held={:.3} expected={:.3} drift={drift:.2e}",
        twin_core::material_in_system(&state, &plant),
        state.ledger.expected_total(),
    );
    if drift.abs() > CONSERVATION_TOLERANCE {
        bail!("material conservation violated: drift {drift}");
    }

    Ok(())
}

fn print_status(state: &TwinState) {
    let stats = &state.stats;
    let mut ids: Vec<_> = state.stations.keys().collect();
    ids.sort();
    let levels: Vec<String> = ids
        .iter()
        .map(|id| {
            let s = &state.stations[*id];
            format!("{id}={:.0}/{:.0}", s.input_level, s.output_level)
        })
        .collect();

    println!(
        "[tick={tick:05}]  transported={transported:9.1}  processed={processed:9.1}  \
         cycles={cycles:4}  eff={eff:5.1}%  {levels}",
        tick = stats.uptime_ticks,
        transported = stats.total_transported,
        processed = stats.total_processed,
        cycles = stats.cycle_count,
        eff = stats.efficiency,
        levels = levels.join(" "),
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            ticks,
            seed,
            state_file,
            content_dir,
            transport,
            frames_per_tick,
            print_every,
            event_level,
            metrics_every,
            no_metrics,
        } => {
            let strategy = match transport.as_str() {
                "animated" => TransportStrategy::Animated,
                _ => TransportStrategy::Headless,
            };
            let event_level = match event_level.as_str() {
                "debug" => EventLevel::Debug,
                _ => EventLevel::Normal,
            };
            run(&RunArgs {
                ticks,
                seed,
                state_file,
                content_dir,
                strategy,
                frames_per_tick,
                print_every,
                event_level,
                metrics_every,
                no_metrics,
            })?;
        }
    }
    Ok(())
}
