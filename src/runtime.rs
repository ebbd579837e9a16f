// 50 Hz control loop with watchdog
// Commands arrive over zenoh (and optionally the gesture serial bridge), get routed
// to the actuator bank, and the steppers are ticked once per loop.
// If commands stop arriving the watchdog stops the arm once.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, ConfigError, DeploymentConfig, LOOP_HZ, TOPIC_CMD_ARM, TOPIC_HEALTH,
    TOPIC_INPUT_AXIS, TOPIC_STATE,
};
use crate::input::spawn_serial_reader;
use crate::messages::{ArmAction, ArmCommand, ArmState, AxisSample, RuntimeHealth, StepperState};
use crate::motor::{
    ActuatorBank, Mode, ModeRouter, PositionActuator, PositionChannel, SimServo, SimStepper,
    StepperDriver,
};

/// Where gesture lines come from, if anywhere
#[derive(Debug, Clone)]
pub struct SerialInput {
    pub port: String,
    pub baudrate: u32,
}

pub struct Runtime<S, P> {
    config: DeploymentConfig,
    router: ModeRouter,
    bank: ActuatorBank<S, P>,
    mode: Mode,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl<S: StepperDriver, P: PositionActuator> Runtime<S, P> {
    /// Validate the deployment against the bank. Refuses to start on any mismatch.
    pub fn new(config: DeploymentConfig, bank: ActuatorBank<S, P>) -> Result<Self, ConfigError> {
        let router = ModeRouter::new(&config)?;
        router.check_bank(&bank)?;
        Ok(Self {
            config,
            router,
            bank,
            mode: 0,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn bank(&self) -> &ActuatorBank<S, P> {
        &self.bank
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: ArmCommand, now: Instant) {
        if cmd.mode != self.mode {
            info!("Mode {} -> {}", self.mode, cmd.mode);
            self.mode = cmd.mode;
        }
        self.cmd_received_at = now;
        self.health = RuntimeHealth::Ok;

        match cmd.action {
            ArmAction::Move { direction } => {
                self.router.dispatch(&mut self.bank, self.mode, direction)
            }
            ArmAction::Stop => self.router.stop(&mut self.bank, self.mode),
            ArmAction::Idle => {}
        }
    }

    /// Process a raw joystick sample
    pub fn on_axis(&mut self, sample: AxisSample, now: Instant) {
        let cmd = self.config.dead_zone.command(sample.mode, sample.raw);
        self.on_command(cmd, now);
    }

    /// Stop the arm once when commands go stale
    pub fn check_watchdog(&mut self, now: Instant) {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        if cmd_age > CMD_TIMEOUT && self.health != RuntimeHealth::CmdStale {
            // Watchdog triggered - stop the arm
            warn!("Command stale ({:?} old), stopping arm", cmd_age);
            self.router.stop(&mut self.bank, self.mode);
            self.health = RuntimeHealth::CmdStale;
        }
    }

    /// Advance step generation
    pub fn tick(&mut self, dt: Duration) {
        self.bank.run(dt);
    }

    pub fn state(&self) -> ArmState {
        ArmState {
            deployment: self.config.name.clone(),
            mode: self.mode,
            steppers: self
                .bank
                .steppers()
                .iter()
                .map(|s| StepperState {
                    target: s.target(),
                    position: s.current_position(),
                })
                .collect(),
            position_deg: self.bank.position_channel().position(),
        }
    }
}

impl Runtime<SimStepper, SimServo> {
    /// Runtime backed by simulated drivers
    pub fn simulated(config: DeploymentConfig) -> Result<Self, ConfigError> {
        let motion = config.default_motion;
        let steppers = config
            .steppers
            .iter()
            .map(|_| SimStepper::new(motion.max_speed, motion.acceleration))
            .collect();
        let servo = PositionChannel::from_config(SimServo::new(), &config.position_actuator);
        Self::new(config, ActuatorBank::new(steppers, servo))
    }
}

pub async fn run(
    config: DeploymentConfig,
    serial: Option<SerialInput>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::simulated(config)?;
    info!(
        "Deployment '{}': {} steppers, {} routed modes",
        runtime.config.name,
        runtime.bank.len(),
        runtime.config.routes.len()
    );

    // Optional gesture bridge on a serial port
    let (serial_tx, mut serial_rx) = mpsc::unbounded_channel::<ArmCommand>();
    if let Some(serial) = &serial {
        spawn_serial_reader(&serial.port, serial.baudrate, serial_tx)?;
    } else {
        drop(serial_tx);
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_ARM).await?;
    let sub_axis = session.declare_subscriber(TOPIC_INPUT_AXIS).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_ARM, TOPIC_INPUT_AXIS);
    info!("Publishing to: {}, {}", TOPIC_STATE, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending input (non-blocking), applying in arrival order per source
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ArmCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, now),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_axis.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<AxisSample>(&payload) {
                Ok(axis) => runtime.on_axis(axis, now),
                Err(e) => warn!("Failed to parse axis sample: {}", e),
            }
        }
        while let Ok(cmd) = serial_rx.try_recv() {
            runtime.on_command(cmd, now);
        }

        // 2. Watchdog
        runtime.check_watchdog(now);

        // 3. Step the drivers
        runtime.tick(period);

        // 4. Publish state and health
        let state_json = serde_json::to_string(&runtime.state())?;
        pub_state.put(state_json).await?;

        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
