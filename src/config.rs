// Timeouts, topics, deployment configuration
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::messages::{ArmAction, ArmCommand};
use crate::motor::router::{Direction, Leg, Mode, Route};

// Runtime loop frequency (also the stepper tick rate)
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_ARM: &str = "arm/cmd"; // mode + action commands
pub const TOPIC_INPUT_AXIS: &str = "arm/input/axis"; // raw joystick samples
pub const TOPIC_STATE: &str = "arm/state"; // actuator state
pub const TOPIC_HEALTH: &str = "arm/state/health"; // health status

// Gesture bridge talks to the controller at this rate
pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;

/// Largest accepted steps-per-unit scale
pub const MAX_STEP_SCALE: i64 = 1_000_000;

/// Errors raised while loading or validating a deployment config.
/// Any of these refuses startup; dispatch itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config has no steppers")]
    NoSteppers,

    #[error("Step scale must be between 1 and 1000000, got {0}")]
    StepScale(i64),

    #[error("{what} must be positive and finite, got {value}")]
    Motion { what: &'static str, value: f32 },

    #[error("Invalid position bounds: min={min}, max={max}")]
    PositionBounds { min: f32, max: f32 },

    #[error("Initial position {initial} outside [{min}, {max}]")]
    InitialPosition { initial: f32, min: f32, max: f32 },

    #[error("Dead zone inverted: low={low}, high={high}")]
    DeadZone { low: u16, high: u16 },

    #[error("Mode 0 is reserved for 'no actuator selected'")]
    ReservedMode,

    #[error("Mode {mode} has no actuators")]
    EmptyRoute { mode: Mode },

    #[error("Mode {mode} routes to stepper {index}, but only {count} steppers exist")]
    UnknownActuator { mode: Mode, index: usize, count: usize },

    #[error("Pin {pin} assigned more than once")]
    DuplicatePin { pin: u8 },
}

/// One step/dir driven actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    pub name: String,
    pub step_pin: u8,
    pub dir_pin: u8,
}

/// Speed/acceleration pair, in steps/s and steps/s²
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionProfile {
    pub max_speed: f32,
    pub acceleration: f32,
}

impl MotionProfile {
    pub const fn new(max_speed: f32, acceleration: f32) -> Self {
        Self {
            max_speed,
            acceleration,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("max speed", self.max_speed)?;
        check_positive("acceleration", self.acceleration)
    }
}

/// The continuous-position actuator (servo) and its travel bounds in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionActuatorConfig {
    pub name: String,
    pub pin: u8,
    pub min: f32,
    pub max: f32,
    pub initial: f32,
}

/// Raw analog band treated as "no input"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadZone {
    pub low: u16,
    pub high: u16,
}

impl DeadZone {
    /// Map a raw analog reading to a direction: below the band -1, above +1, inside 0
    pub fn direction(&self, raw: u16) -> Direction {
        if raw < self.low {
            -1
        } else if raw > self.high {
            1
        } else {
            0
        }
    }

    /// Joystick inside the dead zone means "stop", outside means "move"
    pub fn command(&self, mode: Mode, raw: u16) -> ArmCommand {
        let action = match self.direction(raw) {
            0 => ArmAction::Stop,
            direction => ArmAction::Move { direction },
        };
        ArmCommand::new(mode, action)
    }
}

/// Full description of one arm deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    pub step_scale: i64,
    pub steppers: Vec<StepperConfig>,
    pub default_motion: MotionProfile,
    pub position_actuator: PositionActuatorConfig,
    pub dead_zone: DeadZone,
    pub routes: BTreeMap<Mode, Route>,
}

/// Built-in deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Variant {
    /// 5 steppers, driven by the camera gesture bridge
    Gesture,
    /// 6 steppers, driven by a joystick
    Manual,
}

impl Variant {
    pub fn config(self) -> DeploymentConfig {
        match self {
            Variant::Gesture => DeploymentConfig::gesture(),
            Variant::Manual => DeploymentConfig::manual(),
        }
    }
}

const STEP_SCALE: i64 = 60;
const DEFAULT_MOTION: MotionProfile = MotionProfile::new(300.0, 200.0);
const DEFAULT_DEAD_ZONE: DeadZone = DeadZone {
    low: 400,
    high: 600,
};

fn stepper(name: &str, step_pin: u8, dir_pin: u8) -> StepperConfig {
    StepperConfig {
        name: name.to_string(),
        step_pin,
        dir_pin,
    }
}

fn servo() -> PositionActuatorConfig {
    PositionActuatorConfig {
        name: "servo".to_string(),
        pin: 6,
        min: 0.0,
        max: 180.0,
        initial: 90.0,
    }
}

impl DeploymentConfig {
    /// Gesture-controlled arm: 5 steppers, shoulder pair wired in antiphase
    pub fn gesture() -> Self {
        let routes = BTreeMap::from([
            (1, Route::Position),
            (2, Route::steppers([Leg::forward(0), Leg::reverse(3)])),
            (
                3,
                Route::steppers([Leg::forward(4).with_motion(MotionProfile::new(600.0, 400.0))]),
            ),
            (4, Route::steppers([Leg::forward(1)])),
            (5, Route::steppers([Leg::forward(2)])),
        ]);

        Self {
            name: "gesture".to_string(),
            step_scale: STEP_SCALE,
            steppers: vec![
                stepper("shoulder_a", 44, 45),
                stepper("lower_gearbox", 42, 43),
                stepper("upper_gearbox", 40, 41),
                stepper("shoulder_b", 38, 39),
                stepper("base", 34, 35),
            ],
            default_motion: DEFAULT_MOTION,
            position_actuator: servo(),
            dead_zone: DEFAULT_DEAD_ZONE,
            routes,
        }
    }

    /// Joystick-controlled arm: 6 steppers, shoulder pair selectable as
    /// same-direction (mode 2) or antiphase (mode 3)
    pub fn manual() -> Self {
        let routes = BTreeMap::from([
            (1, Route::Position),
            (2, Route::steppers([Leg::forward(0), Leg::forward(3)])),
            (3, Route::steppers([Leg::forward(0), Leg::reverse(3)])),
            (
                4,
                Route::steppers([Leg::forward(5).with_motion(MotionProfile::new(400.0, 200.0))]),
            ),
            (5, Route::steppers([Leg::forward(1)])),
            (6, Route::steppers([Leg::forward(2)])),
            (7, Route::steppers([Leg::forward(4)])),
        ]);

        Self {
            name: "manual".to_string(),
            step_scale: STEP_SCALE,
            steppers: vec![
                stepper("shoulder_a", 44, 45),
                stepper("lower_gearbox", 42, 43),
                stepper("upper_gearbox", 40, 41),
                stepper("shoulder_b", 38, 39),
                stepper("wrist", 36, 37),
                stepper("base", 34, 35),
            ],
            default_motion: DEFAULT_MOTION,
            position_actuator: servo(),
            dead_zone: DEFAULT_DEAD_ZONE,
            routes,
        }
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        info!("Loaded deployment '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Pick the deployment to run: the file if given, else the built-in variant.
    /// Both are validated.
    pub fn resolve(variant: Variant, path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => variant.config(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn stepper_count(&self) -> usize {
        self.steppers.len()
    }

    /// Check every invariant dispatch relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steppers.is_empty() {
            return Err(ConfigError::NoSteppers);
        }
        if !(1..=MAX_STEP_SCALE).contains(&self.step_scale) {
            return Err(ConfigError::StepScale(self.step_scale));
        }
        self.default_motion.validate()?;

        let pos = &self.position_actuator;
        if !pos.min.is_finite() || !pos.max.is_finite() || pos.min > pos.max {
            return Err(ConfigError::PositionBounds {
                min: pos.min,
                max: pos.max,
            });
        }
        if !(pos.min..=pos.max).contains(&pos.initial) {
            return Err(ConfigError::InitialPosition {
                initial: pos.initial,
                min: pos.min,
                max: pos.max,
            });
        }

        if self.dead_zone.low > self.dead_zone.high {
            return Err(ConfigError::DeadZone {
                low: self.dead_zone.low,
                high: self.dead_zone.high,
            });
        }

        for (&mode, route) in &self.routes {
            if mode == 0 {
                return Err(ConfigError::ReservedMode);
            }
            validate_route(mode, route, self.steppers.len())?;
        }

        let mut pins = HashSet::new();
        let all_pins = self
            .steppers
            .iter()
            .flat_map(|s| [s.step_pin, s.dir_pin])
            .chain(std::iter::once(pos.pin));
        for pin in all_pins {
            if !pins.insert(pin) {
                return Err(ConfigError::DuplicatePin { pin });
            }
        }

        Ok(())
    }
}

/// Check one route against a bank of `count` steppers
pub(crate) fn validate_route(mode: Mode, route: &Route, count: usize) -> Result<(), ConfigError> {
    match route {
        Route::Position => Ok(()),
        Route::Steppers { legs } => {
            if legs.is_empty() {
                return Err(ConfigError::EmptyRoute { mode });
            }
            for leg in legs {
                if leg.actuator >= count {
                    return Err(ConfigError::UnknownActuator {
                        mode,
                        index: leg.actuator,
                        count,
                    });
                }
                if let Some(motion) = &leg.motion {
                    motion.validate()?;
                }
            }
            Ok(())
        }
    }
}

fn check_positive(what: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Motion { what, value })
    }
}
