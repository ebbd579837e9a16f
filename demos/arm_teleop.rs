// Keyboard teleop: 0-7 select mode, W/S move, Space stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use arm_zenoh_runtime::config::TOPIC_CMD_ARM;
use arm_zenoh_runtime::messages::{ArmAction, ArmCommand};

const INPUT_TIMEOUT_MS: u64 = 100; // Fall back to idle after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_ARM).await?;

    info!("Controls: 0-7=mode, W/S=move, Space=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mode: u8 = 0;
    let mut action = ArmAction::Idle;
    let mut last_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char(c @ '0'..='7') if pressed => {
                        mode = c as u8 - b'0';
                        action = ArmAction::Idle;
                        info!("Mode: {}", mode);
                    }
                    KeyCode::Char('w') | KeyCode::Up if pressed => {
                        action = ArmAction::Move { direction: 1 };
                        last_input = Instant::now();
                    }
                    KeyCode::Char('s') | KeyCode::Down if pressed => {
                        action = ArmAction::Move { direction: -1 };
                        last_input = Instant::now();
                    }
                    KeyCode::Char(' ') if pressed => {
                        action = ArmAction::Stop;
                        last_input = Instant::now();
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Key released: stop once, then idle
        if last_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            action = match action {
                ArmAction::Move { .. } => ArmAction::Stop,
                _ => ArmAction::Idle,
            };
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let cmd = serde_json::to_string(&ArmCommand::new(mode, action))?;
        publisher.put(cmd).await?;
    }

    Ok(())
}
