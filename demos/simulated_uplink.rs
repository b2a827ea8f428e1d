//! Demonstration of the uplink engine on simulated hardware.
//!
//! This example shows how to:
//! 1. Build an engine from the default configuration
//! 2. Drive it with a simulated clock so no real time passes
//! 3. Watch change detection suppress repeated decisions
//! 4. Watch duty-cycle rejections turn into scheduled retries
//!
//! Run with: cargo run --example simulated_uplink

use motion_uplink::{
    core::{ManualClock, MotionEnergyClassifier},
    radio::{to_hex, RadioConfig, SimulatedRadio},
    sensor::{MotionProfile, SimulatedAccelerometer},
    Config, Engine, NextAction,
};
use std::time::Duration;

fn main() {
    println!("Motion Uplink - Simulated Demo");
    println!("==============================");
    println!();

    let config = Config::default();
    let clock = ManualClock::new();

    let mut radio = SimulatedRadio::new(RadioConfig::default(), clock.clone());
    radio.join();

    let classifier = MotionEnergyClassifier::for_labels(&config.labels, config.window_samples);
    let mut engine = Engine::new(
        &config,
        SimulatedAccelerometer::new(MotionProfile::Walk),
        classifier,
        radio,
        clock.clone(),
    )
    .expect("default configuration is valid");

    let script = [
        MotionProfile::Walk,
        MotionProfile::Walk,
        MotionProfile::Shake,
        MotionProfile::Shake,
        MotionProfile::Still,
    ];

    for profile in script {
        engine.source_mut().set_profile(profile);

        loop {
            let report = engine.run_cycle();
            println!(
                "[{:>8.3}s] {:<6} {:?}",
                clock.peek().as_secs_f64(),
                profile.to_string(),
                report.outcome
            );
            if let Some(tally) = &report.tally {
                println!("            {}", tally.describe(engine.labels()));
            }

            match report.next {
                NextAction::RetryAfter(delay) if delay >= Duration::from_secs(1) => {
                    println!("            retrying in {} ms", delay.as_millis());
                    clock.advance(delay);
                }
                _ => break,
            }
        }
    }

    println!();
    println!("Uplinks:");
    for uplink in engine.transmitter().uplinks() {
        println!(
            "  port {} at {:.3}s: {}",
            uplink.port,
            uplink.queued_at.as_secs_f64(),
            to_hex(&uplink.payload)
        );
    }
    println!(
        "Simulated time: {:.3}s, of which {:.3}s asleep",
        clock.peek().as_secs_f64(),
        clock.total_slept().as_secs_f64()
    );
    println!();
    println!("{}", engine.log().summary());
}
