// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::motor::{Direction, Mode};

// Command from teleop/gesture bridge -> runtime
// {"mode": 2, "action": "move", "direction": 1}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmCommand {
    pub mode: Mode,
    #[serde(flatten)]
    pub action: ArmAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ArmAction {
    /// Move the selected actuator(s) by one direction tick
    Move { direction: Direction },
    /// Stop all steppers, or hold the servo in position mode
    Stop,
    /// Keep the mode selected but do nothing
    Idle,
}

impl ArmCommand {
    pub fn new(mode: Mode, action: ArmAction) -> Self {
        Self { mode, action }
    }
}

/// Raw analog joystick sample, mapped to a direction through the dead zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisSample {
    pub mode: Mode,
    pub raw: u16,
}

/// Per-stepper readback published by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StepperState {
    pub target: i64,
    pub position: i64,
}

/// Arm state published by runtime -> observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    pub deployment: String,
    pub mode: Mode,
    pub steppers: Vec<StepperState>,
    pub position_deg: f32,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
