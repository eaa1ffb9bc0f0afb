//! Controller State & Sink
//!
//! The snapshot a script applies on one frame, and the seam through which the
//! frame loop hands it to the emulated device.

pub mod buttons;

pub use buttons::Buttons;

use std::fmt;

/// Largest analog stick deflection
pub const JOYSTICK_MAX: i32 = 32767;
/// Smallest analog stick deflection
pub const JOYSTICK_MIN: i32 = -32767;

/// Analog stick position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StickPosition {
    /// Horizontal deflection
    pub x: i32,
    /// Vertical deflection
    pub y: i32,
}

impl StickPosition {
    /// Centered stick
    pub const CENTER: StickPosition = StickPosition { x: 0, y: 0 };

    /// Create a stick position, clamping both axes to the device range
    pub fn new(x: i32, y: i32) -> Self {
        StickPosition {
            x: x.clamp(JOYSTICK_MIN, JOYSTICK_MAX),
            y: y.clamp(JOYSTICK_MIN, JOYSTICK_MAX),
        }
    }
}

impl fmt::Display for StickPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.x, self.y)
    }
}

/// Full button/stick snapshot for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControllerState {
    /// Pressed buttons
    pub buttons: Buttons,
    /// Left stick
    pub left: StickPosition,
    /// Right stick
    pub right: StickPosition,
}

impl ControllerState {
    /// All inputs released, both sticks centered
    pub const NEUTRAL: ControllerState = ControllerState {
        buttons: Buttons::empty(),
        left: StickPosition::CENTER,
        right: StickPosition::CENTER,
    };

    /// State with the given buttons pressed and sticks centered
    pub fn pressing(buttons: Buttons) -> Self {
        ControllerState {
            buttons,
            ..Self::NEUTRAL
        }
    }

    /// Whether nothing is pressed or deflected
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

/// Renders the state in script record form, e.g. `KEY_A;KEY_B 0;0 0;0`.
impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.buttons.key_names();
        if keys.is_empty() {
            f.write_str("NONE")?;
        } else {
            f.write_str(&keys.join(";"))?;
        }
        write!(f, " {} {}", self.left, self.right)
    }
}

/// Emulated controller as seen by the frame loop
///
/// `apply_*` stage a state; [`set_input_next_frame`](Self::set_input_next_frame)
/// commits the staged state so the device presents it on the next refresh.
/// Implementations must not block.
pub trait ControllerSink {
    /// Stage a button/stick snapshot
    fn apply_state(&mut self, state: &ControllerState);

    /// Stage the all-released state
    fn apply_neutral(&mut self) {
        self.apply_state(&ControllerState::NEUTRAL);
    }

    /// Commit the staged state for the upcoming refresh
    fn set_input_next_frame(&mut self);
}

/// In-memory controller that records every committed state in commit order
///
/// Index `n` of [`commits`](Self::commits) is the state presented on frame `n`
/// of a session that started with this sink empty.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    staged: ControllerState,
    commits: Vec<ControllerState>,
}

impl RecordingSink {
    /// Create an empty recording controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed states, one per frame
    pub fn commits(&self) -> &[ControllerState] {
        &self.commits
    }

    /// Number of committed frames
    pub fn frame_count(&self) -> usize {
        self.commits.len()
    }
}

impl ControllerSink for RecordingSink {
    fn apply_state(&mut self, state: &ControllerState) {
        self.staged = *state;
    }

    fn set_input_next_frame(&mut self) {
        self.commits.push(self.staged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stick_clamp() {
        let stick = StickPosition::new(40_000, -40_000);
        assert_eq!(stick, StickPosition::new(JOYSTICK_MAX, JOYSTICK_MIN));
    }

    #[test]
    fn test_state_display() {
        let state = ControllerState {
            buttons: Buttons::A | Buttons::ZL,
            left: StickPosition::new(100, -5),
            right: StickPosition::CENTER,
        };
        assert_eq!(state.to_string(), "KEY_A;KEY_ZL 100;-5 0;0");
        assert_eq!(ControllerState::NEUTRAL.to_string(), "NONE 0;0 0;0");
    }

    #[test]
    fn test_recording_sink_commits_staged_state() {
        let mut sink = RecordingSink::new();
        sink.apply_state(&ControllerState::pressing(Buttons::B));
        sink.set_input_next_frame();
        sink.set_input_next_frame();
        sink.apply_neutral();
        sink.set_input_next_frame();

        assert_eq!(sink.frame_count(), 3);
        assert_eq!(sink.commits()[1].buttons, Buttons::B);
        assert!(sink.commits()[2].is_neutral());
    }
}
