// Motor coordination for the arm
//
// Provides:
// - Driver capabilities (stepper + continuous-position) and simulated drivers
// - Fixed-size actuator bank
// - Mode router: table-driven mapping from (mode, direction) to actuator commands

pub mod bank;
pub mod driver;
pub mod router;

pub use bank::{ActuatorBank, PositionChannel};
pub use driver::{PositionActuator, SimServo, SimStepper, StepperDriver};
pub use router::{Direction, Leg, Mode, ModeRouter, Polarity, Route};
