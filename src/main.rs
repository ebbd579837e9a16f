use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use arm_zenoh_runtime::config::{DEFAULT_SERIAL_BAUD, DeploymentConfig, Variant};
use arm_zenoh_runtime::runtime::{self, SerialInput};

/// Mode-selected motor coordination runtime for the arm
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Built-in deployment to run
    #[arg(long, value_enum, default_value_t = Variant::Gesture)]
    variant: Variant,

    /// JSON deployment file (overrides --variant)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the gesture bridge, e.g. /dev/ttyACM0
    #[arg(long)]
    serial: Option<String>,

    /// Baud rate for --serial
    #[arg(long, default_value_t = DEFAULT_SERIAL_BAUD)]
    baud: u32,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match DeploymentConfig::resolve(args.variant, args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Refusing to start: {}", e);
            std::process::exit(1);
        }
    };

    let serial = args.serial.map(|port| SerialInput {
        port,
        baudrate: args.baud,
    });

    if let Err(e) = runtime::run(config, serial).await {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
