// Offline trace: drive a simulated arm through a few modes and print its state
//
// Usage: cargo run --example dispatch_trace -- [gesture|manual]

use std::time::{Duration, Instant};

use arm_zenoh_runtime::config::{DeploymentConfig, LOOP_HZ};
use arm_zenoh_runtime::messages::{ArmAction, ArmCommand};
use arm_zenoh_runtime::runtime::Runtime;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let config = match std::env::args().nth(1).as_deref() {
        Some("manual") => DeploymentConfig::manual(),
        _ => DeploymentConfig::gesture(),
    };
    let mut runtime = Runtime::simulated(config)?;
    let dt = Duration::from_millis(1000 / LOOP_HZ);

    let script = [
        ArmCommand::new(1, ArmAction::Move { direction: 1 }),
        ArmCommand::new(1, ArmAction::Move { direction: 1 }),
        ArmCommand::new(1, ArmAction::Stop),
        ArmCommand::new(2, ArmAction::Move { direction: 1 }),
        ArmCommand::new(3, ArmAction::Move { direction: -1 }),
        ArmCommand::new(4, ArmAction::Move { direction: 2 }),
        ArmCommand::new(4, ArmAction::Stop),
        ArmCommand::new(0, ArmAction::Move { direction: 1 }),
    ];

    for cmd in script {
        runtime.on_command(cmd, Instant::now());
        // Let the steppers run for a second
        for _ in 0..LOOP_HZ {
            runtime.tick(dt);
        }
        println!("{:?} -> {}", cmd, serde_json::to_string(&runtime.state())?);
    }

    Ok(())
}
