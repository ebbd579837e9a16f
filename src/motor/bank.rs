// Fixed-size bank of arm actuators
//
// Owns the stepper drivers (indexed 0..K-1) and the single continuous-position
// actuator. The router only talks to actuators through this type.

use std::time::Duration;

use tracing::{debug, info};

use super::driver::{PositionActuator, StepperDriver};
use crate::config::PositionActuatorConfig;

/// Continuous-position actuator plus its clamped stored position
#[derive(Debug)]
pub struct PositionChannel<P> {
    actuator: P,
    position: f32,
    min: f32,
    max: f32,
}

impl<P: PositionActuator> PositionChannel<P> {
    /// Bounds are assumed validated (`min <= max`); the initial position is clamped into them.
    pub fn new(actuator: P, min: f32, max: f32, initial: f32) -> Self {
        Self {
            actuator,
            position: initial.clamp(min, max),
            min,
            max,
        }
    }

    pub fn from_config(actuator: P, config: &PositionActuatorConfig) -> Self {
        Self::new(actuator, config.min, config.max, config.initial)
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    /// Add `delta` degrees, clamp to bounds and write. Returns the new position.
    pub fn nudge(&mut self, delta: f32) -> f32 {
        self.position = (self.position + delta).clamp(self.min, self.max);
        self.actuator.write(self.position);
        self.position
    }

    /// Re-assert the last stored position
    pub fn hold(&mut self) {
        self.actuator.write(self.position);
    }

    pub fn actuator(&self) -> &P {
        &self.actuator
    }
}

/// Ordered stepper drivers plus one continuous-position actuator
#[derive(Debug)]
pub struct ActuatorBank<S, P> {
    steppers: Vec<S>,
    position: PositionChannel<P>,
}

impl<S: StepperDriver, P: PositionActuator> ActuatorBank<S, P> {
    pub fn new(steppers: Vec<S>, position: PositionChannel<P>) -> Self {
        info!(
            "Actuator bank ready: {} steppers, position actuator at {:.1} deg",
            steppers.len(),
            position.position()
        );
        Self { steppers, position }
    }

    /// Number of steppers in the bank
    pub fn len(&self) -> usize {
        self.steppers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steppers.is_empty()
    }

    pub fn stepper(&self, index: usize) -> Option<&S> {
        self.steppers.get(index)
    }

    pub fn stepper_mut(&mut self, index: usize) -> Option<&mut S> {
        self.steppers.get_mut(index)
    }

    pub fn steppers(&self) -> &[S] {
        &self.steppers
    }

    pub fn position_channel(&self) -> &PositionChannel<P> {
        &self.position
    }

    pub fn position_channel_mut(&mut self) -> &mut PositionChannel<P> {
        &mut self.position
    }

    /// Stop every stepper in the bank
    pub fn stop_all(&mut self) {
        debug!("Stopping all {} steppers", self.steppers.len());
        for stepper in &mut self.steppers {
            stepper.stop();
        }
    }

    /// Advance every stepper driver by one tick
    pub fn run(&mut self, dt: Duration) {
        for stepper in &mut self.steppers {
            stepper.run(dt);
        }
    }
}
