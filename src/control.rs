//! Virtual pan/tilt control.
//!
//! Hosts that normally drive physical camera motors issue pointing commands
//! through this controller; a display capture has no motors, so the
//! controller tracks a virtual two-axis angle instead. Angles are fixed-point
//! with 64 units to the degree.
//!
//! All commands serialize on one control mutex. `dispatch` acquires it and
//! then operates on the guarded `PanTiltState` through inherent methods, so
//! the auto-reset performed for a not-yet-valid state runs under the lock the
//! caller already holds. The state starts invalid with placeholder zero
//! angles; the first reset (explicit or implicit) zeroes it and marks it
//! valid, after which both angles always stay within their limits.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fixed-point angular unit: 64 units equal one degree.
pub const ONE_DEGREE: i32 = 64;

pub const MAX_PAN: i32 = 70 * ONE_DEGREE;
pub const MIN_PAN: i32 = -70 * ONE_DEGREE;
pub const MAX_TILT: i32 = 30 * ONE_DEGREE;
pub const MIN_TILT: i32 = -30 * ONE_DEGREE;

/// Pointing commands accepted by the controller.
///
/// `PanSet`/`TiltSet` take whole degrees; the step commands move by exactly
/// one degree. Out-of-range requests are clamped or refused, never rejected
/// with an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Diagnostic no-op.
    Hello,
    /// Zero both axes and mark the state valid.
    Reset,
    /// Move pan to an absolute position, in degrees.
    PanSet(i32),
    PanPlus,
    PanMinus,
    /// Move tilt to an absolute position, in degrees.
    TiltSet(i32),
    TiltPlus,
    TiltMinus,
}

#[derive(Debug)]
struct PanTiltState {
    pan: i32,
    tilt: i32,
    valid: bool,
}

impl PanTiltState {
    /// Zero both axes and mark valid. Callers hold the control mutex; the
    /// `&mut self` receiver is the proof.
    fn reset(&mut self) {
        self.pan = 0;
        self.tilt = 0;
        self.valid = true;
    }

    fn ensure_valid(&mut self) {
        if !self.valid {
            log::debug!("pan/tilt state invalid, resetting to home position");
            self.reset();
        }
    }

    /// Absolute move: clamp the target into [min, max] and return the delta
    /// moved. A zero-length move leaves the axis untouched and echoes the
    /// current position instead of returning 0.
    fn set_axis(current: &mut i32, degrees: i32, min: i32, max: i32) -> i32 {
        let target =
            (i64::from(degrees) * i64::from(ONE_DEGREE)).clamp(i64::from(min), i64::from(max))
                as i32;
        let delta = target - *current;
        if delta == 0 {
            return *current;
        }
        *current = target;
        delta
    }

    /// Relative move by one degree; refused when it would leave the open
    /// interval (min, max).
    fn step_axis(current: &mut i32, step: i32, min: i32, max: i32) {
        let next = *current + step;
        if min < next && next < max {
            *current = next;
        }
    }

    fn apply(&mut self, cmd: Command) -> i32 {
        match cmd {
            Command::Hello => 0,
            Command::Reset => {
                self.reset();
                0
            }
            Command::PanSet(degrees) => {
                self.ensure_valid();
                Self::set_axis(&mut self.pan, degrees, MIN_PAN, MAX_PAN)
            }
            Command::PanPlus => {
                self.ensure_valid();
                Self::step_axis(&mut self.pan, ONE_DEGREE, MIN_PAN, MAX_PAN);
                0
            }
            Command::PanMinus => {
                self.ensure_valid();
                Self::step_axis(&mut self.pan, -ONE_DEGREE, MIN_PAN, MAX_PAN);
                0
            }
            Command::TiltSet(degrees) => {
                self.ensure_valid();
                Self::set_axis(&mut self.tilt, degrees, MIN_TILT, MAX_TILT)
            }
            Command::TiltPlus => {
                self.ensure_valid();
                Self::step_axis(&mut self.tilt, ONE_DEGREE, MIN_TILT, MAX_TILT);
                0
            }
            Command::TiltMinus => {
                self.ensure_valid();
                Self::step_axis(&mut self.tilt, -ONE_DEGREE, MIN_TILT, MAX_TILT);
                0
            }
        }
    }
}

/// Mutex-guarded virtual pointing state, independent of the capture path.
#[derive(Debug)]
pub struct PanTiltController {
    state: Mutex<PanTiltState>,
}

impl PanTiltController {
    /// New controller: invalid state, placeholder zero angles.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PanTiltState {
                pan: 0,
                tilt: 0,
                valid: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PanTiltState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one command. Holds the control mutex for the full duration,
    /// serializing concurrent callers.
    ///
    /// Returns the fixed-point units moved for absolute moves, the echoed
    /// current position for a zero-length absolute move, and 0 otherwise.
    pub fn dispatch(&self, cmd: Command) -> i32 {
        let mut state = self.lock();
        let result = state.apply(cmd);
        log::debug!(
            "control {:?} -> {} (pan {}, tilt {}, valid {})",
            cmd,
            result,
            state.pan,
            state.tilt,
            state.valid
        );
        result
    }

    /// Current `(pan, tilt)` in fixed-point units; `None` before the first
    /// reset.
    pub fn position(&self) -> Option<(i32, i32)> {
        let state = self.lock();
        state.valid.then_some((state.pan, state.tilt))
    }
}

impl Default for PanTiltController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_is_a_no_op() {
        let controller = PanTiltController::new();
        assert_eq!(controller.dispatch(Command::Hello), 0);
        assert_eq!(controller.position(), None);
    }

    #[test]
    fn reset_zeroes_and_validates() {
        let controller = PanTiltController::new();
        assert_eq!(controller.position(), None);

        assert_eq!(controller.dispatch(Command::Reset), 0);
        assert_eq!(controller.position(), Some((0, 0)));
    }

    #[test]
    fn first_axis_command_implicitly_resets() {
        // A set right after startup behaves as if a reset ran first.
        let controller = PanTiltController::new();
        let moved = controller.dispatch(Command::PanSet(10));
        assert_eq!(moved, 10 * ONE_DEGREE);
        assert_eq!(controller.position(), Some((10 * ONE_DEGREE, 0)));

        let controller = PanTiltController::new();
        controller.dispatch(Command::TiltPlus);
        assert_eq!(controller.position(), Some((0, ONE_DEGREE)));
    }

    #[test]
    fn pan_set_clamps_into_range() {
        let controller = PanTiltController::new();
        for degrees in [-1000, -71, -70, 0, 35, 70, 71, 1000, i32::MAX, i32::MIN] {
            controller.dispatch(Command::PanSet(degrees));
            let (pan, _) = controller.position().unwrap();
            assert!(
                (MIN_PAN..=MAX_PAN).contains(&pan),
                "pan {} out of range after PanSet({})",
                pan,
                degrees
            );
        }
    }

    #[test]
    fn repeated_set_to_same_target_echoes_current_position() {
        let controller = PanTiltController::new();
        let first = controller.dispatch(Command::PanSet(20));
        assert_eq!(first, 20 * ONE_DEGREE);

        // Same clamped target: no movement, echo of the current position.
        let second = controller.dispatch(Command::PanSet(20));
        assert_eq!(second, 20 * ONE_DEGREE);
        assert_eq!(controller.position(), Some((20 * ONE_DEGREE, 0)));

        // Values past the limit clamp to the same target and echo as well.
        controller.dispatch(Command::PanSet(70));
        let echoed = controller.dispatch(Command::PanSet(500));
        assert_eq!(echoed, MAX_PAN);
    }

    #[test]
    fn pan_plus_stops_one_degree_short_of_the_limit() {
        let controller = PanTiltController::new();
        controller.dispatch(Command::PanSet(69));

        // 69 degrees + 1 would land exactly on MAX_PAN: refused.
        for _ in 0..10 {
            assert_eq!(controller.dispatch(Command::PanPlus), 0);
        }
        let (pan, _) = controller.position().unwrap();
        assert_eq!(pan, 69 * ONE_DEGREE);
        assert!(pan < MAX_PAN);
    }

    #[test]
    fn pan_minus_stops_short_of_the_lower_limit() {
        let controller = PanTiltController::new();
        controller.dispatch(Command::PanSet(-69));
        for _ in 0..10 {
            controller.dispatch(Command::PanMinus);
        }
        assert_eq!(controller.position().unwrap().0, -69 * ONE_DEGREE);
    }

    #[test]
    fn steps_move_one_degree_within_range() {
        let controller = PanTiltController::new();
        controller.dispatch(Command::Reset);

        controller.dispatch(Command::PanPlus);
        controller.dispatch(Command::PanPlus);
        controller.dispatch(Command::PanMinus);
        assert_eq!(controller.position(), Some((ONE_DEGREE, 0)));
    }

    #[test]
    fn tilt_uses_its_own_limits() {
        let controller = PanTiltController::new();
        let moved = controller.dispatch(Command::TiltSet(45));
        assert_eq!(moved, MAX_TILT);
        assert_eq!(controller.position(), Some((0, MAX_TILT)));

        let moved = controller.dispatch(Command::TiltSet(-45));
        assert_eq!(moved, MIN_TILT - MAX_TILT);
        assert_eq!(controller.position(), Some((0, MIN_TILT)));

        // At the floor, stepping down is refused.
        controller.dispatch(Command::TiltMinus);
        assert_eq!(controller.position(), Some((0, MIN_TILT)));
    }

    #[test]
    fn reset_after_moves_returns_home_without_revalidating() {
        let controller = PanTiltController::new();
        controller.dispatch(Command::PanSet(12));
        controller.dispatch(Command::TiltSet(-5));

        controller.dispatch(Command::Reset);
        assert_eq!(controller.position(), Some((0, 0)));

        // Valid state: the next step applies directly, no implicit reset to
        // wipe other axes.
        controller.dispatch(Command::PanPlus);
        controller.dispatch(Command::TiltPlus);
        assert_eq!(controller.position(), Some((ONE_DEGREE, ONE_DEGREE)));
    }

    #[test]
    fn concurrent_dispatches_serialize() {
        use std::sync::Arc;

        let controller = Arc::new(PanTiltController::new());
        controller.dispatch(Command::Reset);

        let mut workers = Vec::new();
        for _ in 0..4 {
            let controller = controller.clone();
            workers.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    controller.dispatch(Command::PanPlus);
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        // 400 attempted steps, but the limit caps pan below MAX_PAN.
        let (pan, _) = controller.position().unwrap();
        assert_eq!(pan, MAX_PAN - ONE_DEGREE);
    }
}
