//! Motion Uplink CLI
//!
//! Runs the uplink engine against simulated hardware and inspects its output.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use motion_uplink::{
    config::Config,
    core::{MotionEnergyClassifier, SystemClock},
    radio::{decode_payload, parse_hex, RadioConfig, SimulatedRadio},
    scheduler::{Driver, EventQueue},
    sensor::{MotionProfile, SimulatedAccelerometer},
    stats::create_shared_log_with_persistence,
    Engine, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "motion-uplink")]
#[command(version = VERSION)]
#[command(about = "Accelerometer classification with duty-cycle aware uplink", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine on simulated hardware
    Run {
        /// Motion profile of the simulated accelerometer (still, walk, shake)
        #[arg(long, default_value = "walk")]
        profile: String,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,

        /// Trigger cycles from a periodic timer instead of radio events
        #[arg(long)]
        no_duty_cycle: bool,

        /// Enable anomaly scoring in the reference classifier
        #[arg(long)]
        anomaly: bool,
    },

    /// Show cumulative uplink statistics
    Status,

    /// Show configuration
    Config,

    /// Decode a hex uplink payload into labelled counts
    Decode {
        /// Payload bytes as hex, e.g. "0004000001"
        payload: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            profile,
            cycles,
            no_duty_cycle,
            anomaly,
        } => cmd_run(&profile, cycles, no_duty_cycle, anomaly),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Decode { payload } => cmd_decode(&payload),
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Could not load configuration, using defaults: {}", e);
            Config::default()
        }
    }
}

fn cmd_run(
    profile: &str,
    cycles: Option<usize>,
    no_duty_cycle: bool,
    anomaly: bool,
) -> anyhow::Result<()> {
    let Some(profile) = MotionProfile::parse(profile) else {
        bail!("Unknown motion profile '{profile}' (expected still, walk or shake)");
    };

    let mut config = load_config();
    if no_duty_cycle {
        config.duty_cycle_on = false;
    }
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create data directory: {}", e);
    }

    println!("Motion Uplink v{VERSION}");
    println!();
    println!("  Profile: {profile}");
    println!(
        "  Capture: {} ms at {} ms per sample ({} sub-windows per cycle)",
        config.capture_duration.as_millis(),
        config.sample_interval.as_millis(),
        config.sub_windows()
    );
    println!(
        "  Triggering: {}",
        if config.duty_cycle_on {
            "radio events"
        } else {
            "periodic timer"
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let uplink_log = create_shared_log_with_persistence(config.data_path.join("uplink.json"));

    let clock = SystemClock::new();
    let (event_tx, event_rx) = crossbeam_channel::bounded(16);
    let mut radio = SimulatedRadio::new(RadioConfig::default(), clock).with_events(event_tx);
    radio.join();

    let classifier = MotionEnergyClassifier::for_labels(&config.labels, config.window_samples)
        .with_anomaly(anomaly);
    let engine = Engine::new(
        &config,
        SimulatedAccelerometer::new(profile),
        classifier,
        radio,
        clock,
    )
    .context("Invalid configuration")?
    .with_log(uplink_log.clone());

    let mut driver =
        Driver::new(engine, EventQueue::new(clock), &config).with_cycle_limit(cycles);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")?;

    driver.run(&event_rx, &running);

    if let Err(e) = uplink_log.save() {
        tracing::warn!("Could not save uplink stats: {}", e);
    }

    println!();
    println!("{}", uplink_log.summary());
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = load_config();

    println!("Motion Uplink Status");
    println!("====================");
    println!();

    let stats_path = config.data_path.join("uplink.json");
    if !stats_path.exists() {
        println!("No previous run data found.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&stats_path)
        .with_context(|| format!("Reading {stats_path:?}"))?;
    let stats: serde_json::Value = serde_json::from_str(&content)?;

    println!("Cumulative Statistics:");
    for key in [
        "cycles",
        "sub_windows",
        "transmissions",
        "unchanged",
        "below_threshold",
        "duty_cycle_rejections",
        "failures",
    ] {
        if let Some(value) = stats.get(key) {
            println!("  {key}: {value}");
        }
    }
    if let Some(session) = stats.get("last_session") {
        println!("  last session: {session}");
    }
    if let Some(updated) = stats.get("last_updated") {
        println!("  last updated: {updated}");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_decode(payload: &str) -> anyhow::Result<()> {
    let config = load_config();
    let bytes = parse_hex(payload)?;
    let tally = decode_payload(&bytes, config.labels.len())?;

    println!("{}", tally.describe(&config.labels));
    println!("({} sub-windows)", tally.total());
    Ok(())
}
