// Mode router: turns (mode, direction) into actuator commands
//
// Routing is data. Each mode maps to either the continuous-position actuator
// or a list of stepper legs (index, polarity, optional motion override), and a
// single interpreter walks that table. Deployments differ only in their table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::bank::ActuatorBank;
use super::driver::{PositionActuator, StepperDriver};
use crate::config::{validate_route, ConfigError, DeploymentConfig, MotionProfile};

/// Mode selector. 0 means no actuator selected.
pub type Mode = u8;

/// One tick of commanded motion (usually -1, 0 or +1)
pub type Direction = i32;

/// Whether a stepper follows the input direction or runs against it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Forward,
    Reverse,
}

impl Polarity {
    pub fn apply(self, step: i64) -> i64 {
        match self {
            Polarity::Forward => step,
            Polarity::Reverse => step.saturating_neg(),
        }
    }
}

/// A single stepper driven by a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub actuator: usize,
    #[serde(default)]
    pub polarity: Polarity,
    /// Applied to this stepper only, before every move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionProfile>,
}

impl Leg {
    pub fn forward(actuator: usize) -> Self {
        Self {
            actuator,
            polarity: Polarity::Forward,
            motion: None,
        }
    }

    pub fn reverse(actuator: usize) -> Self {
        Self {
            actuator,
            polarity: Polarity::Reverse,
            motion: None,
        }
    }

    pub fn with_motion(mut self, motion: MotionProfile) -> Self {
        self.motion = Some(motion);
        self
    }
}

/// What a mode drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    /// The continuous-position actuator, moved by the raw (unscaled) direction
    Position,
    /// One or more steppers, moved by the scaled direction
    Steppers { legs: Vec<Leg> },
}

impl Route {
    pub fn steppers(legs: impl IntoIterator<Item = Leg>) -> Self {
        Route::Steppers {
            legs: legs.into_iter().collect(),
        }
    }
}

/// Interprets the routing table against an actuator bank
#[derive(Debug, Clone)]
pub struct ModeRouter {
    routes: BTreeMap<Mode, Route>,
    step_scale: i64,
}

impl ModeRouter {
    /// Build a router from a deployment, validating it first
    pub fn new(config: &DeploymentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            routes: config.routes.clone(),
            step_scale: config.step_scale,
        })
    }

    /// Make sure every routed stepper exists in `bank`.
    /// Called once at startup so dispatch never meets a bad index.
    pub fn check_bank<S, P>(&self, bank: &ActuatorBank<S, P>) -> Result<(), ConfigError>
    where
        S: StepperDriver,
        P: PositionActuator,
    {
        for (&mode, route) in &self.routes {
            validate_route(mode, route, bank.len())?;
        }
        Ok(())
    }

    pub fn route(&self, mode: Mode) -> Option<&Route> {
        self.routes.get(&mode)
    }

    pub fn step_scale(&self) -> i64 {
        self.step_scale
    }

    /// Highest routed mode
    pub fn max_mode(&self) -> Mode {
        self.routes.keys().next_back().copied().unwrap_or(0)
    }

    /// Move whatever `mode` selects by `direction`.
    /// Unmapped modes and a zero direction issue no commands.
    pub fn dispatch<S, P>(&self, bank: &mut ActuatorBank<S, P>, mode: Mode, direction: Direction)
    where
        S: StepperDriver,
        P: PositionActuator,
    {
        if direction == 0 {
            trace!("Mode {}: zero direction, nothing to do", mode);
            return;
        }
        let Some(route) = self.routes.get(&mode) else {
            trace!("Mode {} not routed, ignoring direction {}", mode, direction);
            return;
        };

        match route {
            Route::Position => {
                let position = bank.position_channel_mut().nudge(direction as f32);
                debug!("Mode {}: position actuator -> {:.1} deg", mode, position);
            }
            Route::Steppers { legs } => {
                // Saturate: extreme directions pin at the i64 range instead of wrapping
                let step = i64::from(direction).saturating_mul(self.step_scale);
                for leg in legs {
                    let Some(stepper) = bank.stepper_mut(leg.actuator) else {
                        // Unreachable once check_bank has passed
                        error!("Mode {} routes to missing stepper {}", mode, leg.actuator);
                        continue;
                    };
                    if let Some(motion) = &leg.motion {
                        stepper.set_max_speed(motion.max_speed);
                        stepper.set_acceleration(motion.acceleration);
                    }
                    let target = stepper
                        .current_position()
                        .saturating_add(leg.polarity.apply(step));
                    stepper.move_to(target);
                    debug!("Mode {}: stepper {} -> {}", mode, leg.actuator, target);
                }
            }
        }
    }

    /// Halt motion. In position mode the servo holds its last position;
    /// in every other mode all steppers are stopped.
    pub fn stop<S, P>(&self, bank: &mut ActuatorBank<S, P>, mode: Mode)
    where
        S: StepperDriver,
        P: PositionActuator,
    {
        match self.routes.get(&mode) {
            Some(Route::Position) => {
                debug!("Mode {}: holding position actuator", mode);
                bank.position_channel_mut().hold();
            }
            _ => bank.stop_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_STEP_SCALE;
    use crate::motor::bank::PositionChannel;
    use crate::motor::driver::SimServo;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Call {
        MoveTo(i64),
        Stop,
        MaxSpeed(f32),
        Acceleration(f32),
    }

    /// Stepper that records every command and never moves on its own
    #[derive(Debug, Default)]
    struct RecordingStepper {
        position: i64,
        target: i64,
        calls: Vec<Call>,
    }

    impl StepperDriver for RecordingStepper {
        fn current_position(&self) -> i64 {
            self.position
        }

        fn target(&self) -> i64 {
            self.target
        }

        fn move_to(&mut self, target: i64) {
            self.target = target;
            self.calls.push(Call::MoveTo(target));
        }

        fn stop(&mut self) {
            self.target = self.position;
            self.calls.push(Call::Stop);
        }

        fn set_max_speed(&mut self, steps_per_sec: f32) {
            self.calls.push(Call::MaxSpeed(steps_per_sec));
        }

        fn set_acceleration(&mut self, steps_per_sec2: f32) {
            self.calls.push(Call::Acceleration(steps_per_sec2));
        }
    }

    type TestBank = ActuatorBank<RecordingStepper, SimServo>;

    fn setup(config: DeploymentConfig) -> (ModeRouter, TestBank) {
        let router = ModeRouter::new(&config).unwrap();
        let steppers = (0..config.stepper_count())
            .map(|_| RecordingStepper::default())
            .collect();
        let bank = ActuatorBank::new(
            steppers,
            PositionChannel::from_config(SimServo::new(), &config.position_actuator),
        );
        router.check_bank(&bank).unwrap();
        (router, bank)
    }

    fn calls(bank: &TestBank, index: usize) -> &[Call] {
        &bank.stepper(index).unwrap().calls
    }

    fn total_calls(bank: &TestBank) -> usize {
        bank.steppers().iter().map(|s| s.calls.len()).sum()
    }

    fn targets(bank: &TestBank) -> Vec<i64> {
        bank.steppers().iter().map(|s| s.target).collect()
    }

    #[test]
    fn test_unmapped_modes_are_inert() {
        for config in [DeploymentConfig::gesture(), DeploymentConfig::manual()] {
            let (router, mut bank) = setup(config);
            let unmapped = [0, router.max_mode() + 1, 42, Mode::MAX];
            for mode in unmapped {
                for direction in [-3, -1, 1, 2, 1000] {
                    router.dispatch(&mut bank, mode, direction);
                }
            }
            assert_eq!(total_calls(&bank), 0);
            assert_eq!(bank.position_channel().actuator().writes(), 0);
        }
    }

    #[test]
    fn test_zero_direction_never_changes_targets() {
        let (router, mut bank) = setup(DeploymentConfig::manual());
        router.dispatch(&mut bank, 5, 1);
        let before = targets(&bank);
        for mode in 0..=8 {
            router.dispatch(&mut bank, mode, 0);
        }
        assert_eq!(targets(&bank), before);
        assert_eq!(bank.position_channel().position(), 90.0);
    }

    #[test]
    fn test_position_mode_clamps() {
        let (router, mut bank) = setup(DeploymentConfig::gesture());
        router.dispatch(&mut bank, 1, 200);
        assert_eq!(bank.position_channel().position(), 180.0);
        assert_eq!(bank.position_channel().actuator().last_write(), Some(180.0));

        router.dispatch(&mut bank, 1, -1);
        assert_eq!(bank.position_channel().position(), 179.0);

        router.dispatch(&mut bank, 1, -1000);
        assert_eq!(bank.position_channel().position(), 0.0);
        assert_eq!(total_calls(&bank), 0);
    }

    #[test]
    fn test_position_mode_stays_in_bounds_for_any_sequence() {
        let (router, mut bank) = setup(DeploymentConfig::manual());
        let deltas = [5, 90, 1, -300, 7, 170, 40, -2, -2, 181, -181];
        for delta in deltas {
            router.dispatch(&mut bank, 1, delta);
            let pos = bank.position_channel().position();
            assert!((0.0..=180.0).contains(&pos), "position {} escaped bounds", pos);
        }
    }

    #[test]
    fn test_position_mode_is_unscaled() {
        let (router, mut bank) = setup(DeploymentConfig::gesture());
        router.dispatch(&mut bank, 1, 1);
        assert_eq!(bank.position_channel().position(), 91.0);
    }

    #[test]
    fn test_gesture_mode_2_antiphase() {
        let (router, mut bank) = setup(DeploymentConfig::gesture());
        for d in [1, -2, 3] {
            let before = targets(&bank);
            router.dispatch(&mut bank, 2, d);
            let after = targets(&bank);
            assert_eq!(after[0], before[0] + i64::from(d) * 60);
            assert_eq!(after[3], before[3] - i64::from(d) * 60);
            // RecordingStepper never moves, so reset readback to the new target
            for i in [0, 3] {
                bank.stepper_mut(i).unwrap().position = after[i];
            }
        }
        assert!(calls(&bank, 1).is_empty());
        assert!(calls(&bank, 2).is_empty());
        assert!(calls(&bank, 4).is_empty());
    }

    #[test]
    fn test_manual_mode_2_same_direction() {
        let (router, mut bank) = setup(DeploymentConfig::manual());
        router.dispatch(&mut bank, 2, -1);
        assert_eq!(calls(&bank, 0), &[Call::MoveTo(-60)]);
        assert_eq!(calls(&bank, 3), &[Call::MoveTo(-60)]);
        assert_eq!(total_calls(&bank), 2);
    }

    #[test]
    fn test_manual_mode_3_antiphase() {
        let (router, mut bank) = setup(DeploymentConfig::manual());
        router.dispatch(&mut bank, 3, 1);
        assert_eq!(calls(&bank, 0), &[Call::MoveTo(60)]);
        assert_eq!(calls(&bank, 3), &[Call::MoveTo(-60)]);
    }

    #[test]
    fn test_single_actuator_scaled() {
        let (router, mut bank) = setup(DeploymentConfig::gesture());
        bank.stepper_mut(1).unwrap().position = 500;
        router.dispatch(&mut bank, 4, 2);
        assert_eq!(calls(&bank, 1), &[Call::MoveTo(620)]);
        assert_eq!(total_calls(&bank), 1);
    }

    #[test]
    fn test_manual_single_modes() {
        let (router, mut bank) = setup(DeploymentConfig::manual());
        router.dispatch(&mut bank, 5, 1);
        router.dispatch(&mut bank, 6, 1);
        router.dispatch(&mut bank, 7, -1);
        assert_eq!(calls(&bank, 1), &[Call::MoveTo(60)]);
        assert_eq!(calls(&bank, 2), &[Call::MoveTo(60)]);
        assert_eq!(calls(&bank, 4), &[Call::MoveTo(-60)]);
        assert_eq!(total_calls(&bank), 3);
    }

    #[test]
    fn test_gesture_override_applies_to_base_only() {
        let (router, mut bank) = setup(DeploymentConfig::gesture());
        router.dispatch(&mut bank, 3, 1);
        assert_eq!(
            calls(&bank, 4),
            &[
                Call::MaxSpeed(600.0),
                Call::Acceleration(400.0),
                Call::MoveTo(60)
            ]
        );
        for i in 0..4 {
            assert!(calls(&bank, i).is_empty(), "stepper {} got commands", i);
        }

        // Other modes never touch speed settings
        router.dispatch(&mut bank, 2, 1);
        router.dispatch(&mut bank, 4, 1);
        for i in 0..4 {
            assert!(
                calls(&bank, i)
                    .iter()
                    .all(|c| matches!(c, Call::MoveTo(_))),
                "stepper {} got an override",
                i
            );
        }
    }

    #[test]
    fn test_manual_override_on_stepper_5() {
        let (router, mut bank) = setup(DeploymentConfig::manual());
        router.dispatch(&mut bank, 4, -1);
        assert_eq!(
            calls(&bank, 5),
            &[
                Call::MaxSpeed(400.0),
                Call::Acceleration(200.0),
                Call::MoveTo(-60)
            ]
        );
        assert_eq!(total_calls(&bank), 3);
    }

    #[test]
    fn test_stop_in_position_mode_holds() {
        let (router, mut bank) = setup(DeploymentConfig::gesture());
        router.dispatch(&mut bank, 1, 7);
        router.stop(&mut bank, 1);
        let channel = bank.position_channel();
        assert_eq!(channel.actuator().last_write(), Some(97.0));
        assert_eq!(channel.actuator().writes(), 2);
        assert_eq!(channel.position(), 97.0);
        assert_eq!(total_calls(&bank), 0);
    }

    #[test]
    fn test_stop_in_other_modes_stops_every_stepper_once() {
        for config in [DeploymentConfig::gesture(), DeploymentConfig::manual()] {
            let max_mode = {
                let router = ModeRouter::new(&config).unwrap();
                router.max_mode()
            };
            for mode in (0..=max_mode + 1).filter(|&m| m != 1) {
                let (router, mut bank) = setup(config.clone());
                router.stop(&mut bank, mode);
                for (i, stepper) in bank.steppers().iter().enumerate() {
                    assert_eq!(stepper.calls, vec![Call::Stop], "mode {} stepper {}", mode, i);
                }
                assert_eq!(bank.position_channel().actuator().writes(), 0);
            }
        }
    }

    #[test]
    fn test_check_bank_rejects_short_bank() {
        let router = ModeRouter::new(&DeploymentConfig::manual()).unwrap();
        let steppers = (0..5).map(|_| RecordingStepper::default()).collect();
        let bank: TestBank = ActuatorBank::new(
            steppers,
            PositionChannel::new(SimServo::new(), 0.0, 180.0, 90.0),
        );
        assert!(matches!(
            router.check_bank(&bank),
            Err(ConfigError::UnknownActuator { index: 5, count: 5, .. })
        ));
    }

    #[test]
    fn test_new_variant_is_data_only() {
        // A wrist-only deployment with an inverted wrist
        let mut config = DeploymentConfig::manual();
        config.routes = BTreeMap::from([(1, Route::steppers([Leg::reverse(4)]))]);
        let (router, mut bank) = setup(config);
        router.dispatch(&mut bank, 1, 1);
        assert_eq!(calls(&bank, 4), &[Call::MoveTo(-60)]);
        router.stop(&mut bank, 1);
        assert_eq!(total_calls(&bank), 1 + 6);
    }

    #[test]
    fn test_extreme_moves_saturate() {
        let mut config = DeploymentConfig::gesture();
        config.step_scale = MAX_STEP_SCALE;
        let (router, mut bank) = setup(config);
        bank.stepper_mut(0).unwrap().position = i64::MAX - 10;
        bank.stepper_mut(3).unwrap().position = i64::MIN + 10;

        // Mode 2 drives stepper 0 forward and stepper 3 reversed
        router.dispatch(&mut bank, 2, i32::MAX);
        assert_eq!(calls(&bank, 0), &[Call::MoveTo(i64::MAX)]);
        assert_eq!(calls(&bank, 3), &[Call::MoveTo(i64::MIN)]);

        router.dispatch(&mut bank, 2, i32::MIN);
        let far = i64::from(i32::MIN) * MAX_STEP_SCALE;
        assert_eq!(bank.stepper(0).unwrap().target, i64::MAX - 10 + far);
        assert_eq!(bank.stepper(3).unwrap().target, i64::MIN + 10 - far);
    }

    #[test]
    fn test_reverse_polarity_saturates() {
        assert_eq!(Polarity::Reverse.apply(i64::MIN), i64::MAX);
        assert_eq!(Polarity::Reverse.apply(60), -60);
        assert_eq!(Polarity::Forward.apply(i64::MIN), i64::MIN);
    }
}
