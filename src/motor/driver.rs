// Actuator driver capabilities used by the arm
//
// Step/dir pulse generation and PWM drive live behind these traits.
// The sim drivers below stand in for real hardware in the runtime binary and tests.

use std::time::Duration;

use tracing::trace;

/// A stepper-like actuator addressed by absolute step targets
pub trait StepperDriver {
    /// Current position in steps
    fn current_position(&self) -> i64;

    /// Last commanded absolute target
    fn target(&self) -> i64;

    /// Set a new absolute target. Must not block; motion happens in `run`.
    fn move_to(&mut self, target: i64);

    /// Cancel the outstanding target and decelerate to a halt
    fn stop(&mut self);

    /// Max speed in steps/s, used by subsequent moves
    fn set_max_speed(&mut self, steps_per_sec: f32);

    /// Acceleration in steps/s², used by subsequent moves
    fn set_acceleration(&mut self, steps_per_sec2: f32);

    /// Advance step generation by one tick.
    /// Drivers that generate pulses on their own can leave this empty.
    fn run(&mut self, _dt: Duration) {}
}

/// A continuous-position actuator (hobby servo), addressed in degrees
pub trait PositionActuator {
    fn write(&mut self, degrees: f32);
}

/// Simulated accelerating stepper
///
/// Follows a trapezoidal speed profile: accelerate toward max speed, brake
/// once the remaining distance is within stopping distance.
#[derive(Debug, Clone)]
pub struct SimStepper {
    position: i64,
    target: i64,
    speed: f32, // signed, steps/s
    max_speed: f32,
    acceleration: f32,
    travel: f32, // fractional steps not yet taken
}

impl SimStepper {
    pub fn new(max_speed: f32, acceleration: f32) -> Self {
        Self {
            position: 0,
            target: 0,
            speed: 0.0,
            max_speed,
            acceleration,
            travel: 0.0,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    pub fn is_running(&self) -> bool {
        self.position != self.target || self.speed != 0.0
    }

    /// Steps needed to brake from the current speed
    fn stopping_distance(&self) -> f32 {
        self.speed * self.speed / (2.0 * self.acceleration)
    }
}

impl StepperDriver for SimStepper {
    fn current_position(&self) -> i64 {
        self.position
    }

    fn target(&self) -> i64 {
        self.target
    }

    fn move_to(&mut self, target: i64) {
        self.target = target;
    }

    fn stop(&mut self) {
        if self.speed == 0.0 {
            self.target = self.position;
            return;
        }
        // Same policy as AccelStepper: retarget to the point we can brake to
        let steps_to_stop = self.stopping_distance() as i64 + 1;
        self.target = if self.speed > 0.0 {
            self.position.saturating_add(steps_to_stop)
        } else {
            self.position.saturating_sub(steps_to_stop)
        };
    }

    fn set_max_speed(&mut self, steps_per_sec: f32) {
        self.max_speed = steps_per_sec.abs();
    }

    fn set_acceleration(&mut self, steps_per_sec2: f32) {
        if steps_per_sec2 > 0.0 {
            self.acceleration = steps_per_sec2;
        }
    }

    fn run(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        if dt <= 0.0 {
            return;
        }

        let distance = self.target.saturating_sub(self.position) as f32;
        if distance == 0.0 {
            self.speed = 0.0;
            self.travel = 0.0;
            return;
        }
        let heading_away = self.speed * distance < 0.0;

        if heading_away || self.stopping_distance() >= distance.abs() {
            // Brake
            let dv = self.acceleration * dt;
            if self.speed.abs() <= dv {
                self.speed = 0.0;
            } else {
                self.speed -= dv * self.speed.signum();
            }
        } else {
            self.speed = (self.speed + self.acceleration * dt * distance.signum())
                .clamp(-self.max_speed, self.max_speed);
        }

        self.travel += self.speed * dt;
        let whole = self.travel.trunc();
        self.travel -= whole;
        let next = self.position.saturating_add(whole as i64);

        // Never step past the target while approaching it
        let arrived = !heading_away && (self.target.saturating_sub(next) as f32) * distance.signum() <= 0.0;
        if arrived {
            self.position = self.target;
            self.speed = 0.0;
            self.travel = 0.0;
        } else {
            self.position = next;
        }

        trace!(
            "sim stepper: pos={} target={} speed={:.1}",
            self.position, self.target, self.speed
        );
    }
}

/// Simulated servo, remembers the last written angle
#[derive(Debug, Clone, Default)]
pub struct SimServo {
    last_write: Option<f32>,
    writes: usize,
}

impl SimServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_write(&self) -> Option<f32> {
        self.last_write
    }

    /// Number of writes received so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl PositionActuator for SimServo {
    fn write(&mut self, degrees: f32) {
        self.last_write = Some(degrees);
        self.writes += 1;
    }
}
