//! Frame Loop
//!
//! Runs one script against one controller, one iteration per display refresh.
//!
//! Each frame the engine compares the frame counter with the message it is
//! holding. A due message is applied and the next one fetched; otherwise the
//! controller gets the neutral state. The staged state is committed and the
//! loop blocks on the vsync gate before advancing the counter.
//!
//! The engine never waits on the backing store: the populator keeps the
//! source's queue ahead, and the engine tops it up opportunistically.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::controller::{Buttons, ControllerSink, ControllerState};
use crate::populator::Populator;
use crate::script::{ControlMessage, ScriptSource};
use crate::vsync::VsyncGate;
use crate::{Result, TasError};


/// Lifecycle of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    /// Initial population and first fetch
    Priming,
    /// Source still has unparsed lines
    Advancing,
    /// Source exhausted; waiting for the last held message's frame
    Draining,
    /// Final neutral state committed
    Done,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Priming => "priming",
            SessionPhase::Advancing => "advancing",
            SessionPhase::Draining => "draining",
            SessionPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Name of the script source
    pub script: String,
    /// Frames committed to the controller, including the trailing neutral frame
    pub frames_committed: u64,
    /// Scripted messages applied
    pub messages_applied: u64,
    /// Frame index of the last applied message
    pub last_scripted_frame: Option<u64>,
    /// Messages applied later than their scripted frame
    pub late_messages: u64,
    /// Whether the session stopped on request before the script ended
    pub cancelled: bool,
}

impl SessionReport {
    fn new(script: &str) -> Self {
        SessionReport {
            script: script.to_string(),
            frames_committed: 0,
            messages_applied: 0,
            last_scripted_frame: None,
            late_messages: 0,
            cancelled: false,
        }
    }
}

/// Per-controller playback driver
///
/// The engine borrows the process-wide collaborators (vsync gate, populator);
/// each call to [`run`](Self::run) is one session.
pub struct PlaybackEngine<'a> {
    vsync: &'a dyn VsyncGate,
    populator: Option<&'a Populator>,
    stop: Option<Arc<AtomicBool>>,
}

impl<'a> PlaybackEngine<'a> {
    /// Create an engine paced by `vsync`
    ///
    /// Without a populator the session relies on its own opportunistic
    /// refills.
    pub fn new(vsync: &'a dyn VsyncGate) -> Self {
        PlaybackEngine {
            vsync,
            populator: None,
            stop: None,
        }
    }

    /// Register sessions with a background populator
    pub fn with_populator(mut self, populator: &'a Populator) -> Self {
        self.populator = Some(populator);
        self
    }

    /// Check `stop` at the top of every frame; when set, the session ends
    /// with a neutral frame.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Play `source` on `controller` until the script is exhausted
    ///
    /// Blocks the calling thread for the whole session. The session owns the
    /// source; the controller is only borrowed.
    ///
    /// # Errors
    ///
    /// Returns [`TasError::SourceNotReady`] without touching the controller if
    /// the source failed to open. Nothing that happens after the session
    /// starts is reported as an error.
    pub fn run<S>(&self, source: S, controller: &mut dyn ControllerSink) -> Result<SessionReport>
    where
        S: ScriptSource + 'static,
    {
        let source: Arc<dyn ScriptSource> = Arc::new(source);
        if !source.is_ready() {
            return Err(TasError::SourceNotReady(source.name().to_string()));
        }

        info!("Playing script '{}'", source.name());
        if let Some(populator) = self.populator {
            populator.register(&source);
        }

        let mut session = Session::prime(&*source);
        while session.has_work() {
            if self.stop_requested() {
                info!(
                    "Script '{}' stopped at frame {}",
                    source.name(),
                    session.current_frame
                );
                session.report.cancelled = true;
                break;
            }
            session.step(controller);
            self.commit(controller);
            session.advance();
        }

        controller.apply_neutral();
        self.commit(controller);
        session.report.frames_committed += 1;
        session.set_phase(SessionPhase::Done);

        info!(
            "Script '{}' finished: {} frames, {} messages",
            source.name(),
            session.report.frames_committed,
            session.report.messages_applied
        );
        Ok(session.report)
    }

    /// Hold `buttons` for `hold_frames` frames, then release for one frame
    ///
    /// Returns the number of frames committed.
    pub fn tap(
        &self,
        controller: &mut dyn ControllerSink,
        buttons: Buttons,
        hold_frames: u32,
    ) -> u64 {
        let pressed = ControllerState::pressing(buttons);
        for _ in 0..hold_frames {
            controller.apply_state(&pressed);
            self.commit(controller);
        }
        controller.apply_neutral();
        self.commit(controller);
        u64::from(hold_frames) + 1
    }

    fn commit(&self, controller: &mut dyn ControllerSink) {
        controller.set_input_next_frame();
        self.vsync.wait_for_next();
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }
}

/// Frame-loop state for one session
struct Session<'s> {
    source: &'s dyn ScriptSource,
    held: Option<ControlMessage>,
    current_frame: u64,
    phase: SessionPhase,
    report: SessionReport,
}

impl<'s> Session<'s> {
    /// Populate once, fetch the first message, populate again.
    fn prime(source: &'s dyn ScriptSource) -> Self {
        let mut session = Session {
            source,
            held: None,
            current_frame: 0,
            phase: SessionPhase::Priming,
            report: SessionReport::new(source.name()),
        };

        source.refill_queue();
        session.held = session.fetch();
        source.refill_queue();

        session.update_phase();
        session
    }

    /// A held message is still due, or the source can deliver more.
    fn has_work(&self) -> bool {
        self.held.is_some() || self.source.has_next()
    }

    /// Stage this frame's controller state.
    fn step(&mut self, controller: &mut dyn ControllerSink) {
        if self.held.is_none() {
            self.held = self.fetch();
        }

        match self.held.take() {
            Some(msg) if msg.frame <= self.current_frame => {
                if msg.frame < self.current_frame {
                    warn!(
                        "Script '{}': message for frame {} applied late at frame {}",
                        self.source.name(),
                        msg.frame,
                        self.current_frame
                    );
                    self.report.late_messages += 1;
                }
                trace!("frame {}: {}", self.current_frame, msg.state);
                controller.apply_state(&msg.state);
                self.report.messages_applied += 1;
                self.report.last_scripted_frame = Some(msg.frame);

                if self.source.has_next() {
                    self.held = self.fetch();
                }
            }
            pending => {
                self.held = pending;
                controller.apply_neutral();
            }
        }

        self.source.refill_queue();
    }

    /// Move to the next frame after the commit.
    fn advance(&mut self) {
        self.current_frame += 1;
        self.report.frames_committed += 1;
        self.update_phase();
    }

    fn fetch(&self) -> Option<ControlMessage> {
        match self.source.produce_next() {
            Ok(msg) => Some(msg),
            Err(TasError::EndOfData) => None,
            Err(e) => {
                warn!("Script '{}': {e}", self.source.name());
                None
            }
        }
    }

    fn update_phase(&mut self) {
        let phase = if self.source.has_pending_data() {
            SessionPhase::Advancing
        } else {
            SessionPhase::Draining
        };
        self.set_phase(phase);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(
                "Script '{}': {} -> {} at frame {}",
                self.source.name(),
                self.phase,
                phase,
                self.current_frame
            );
            self.phase = phase;
        }
    }
}
