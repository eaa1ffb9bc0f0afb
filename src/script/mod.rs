//! Script Parsing & Sources
//!
//! A script is an ordered list of `(frame, controller state)` records, one per
//! text line. Sources parse those lines lazily into [`ControlMessage`]s and
//! buffer them in a per-session [`FrameQueue`] ahead of the frame loop.

pub mod parser;
pub mod queue;
pub mod source;

pub use parser::parse_line;
pub use queue::FrameQueue;
pub use source::{LineFileSource, LineStreamSource, ScriptSource, DEFAULT_FILL_THRESHOLD};

use crate::controller::ControllerState;

/// One scripted controller state, stamped with the frame it belongs to
///
/// Moves by value from source to queue to frame loop; never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// Absolute frame index at which `state` must be applied
    pub frame: u64,
    /// Button/stick snapshot for that frame
    pub state: ControllerState,
}

impl ControlMessage {
    /// Create a message
    pub fn new(frame: u64, state: ControllerState) -> Self {
        ControlMessage { frame, state }
    }
}
