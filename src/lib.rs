//! Frame-exact scripted controller playback
//!
//! Replays tool-assisted input scripts against an emulated game controller in
//! lock-step with the display refresh signal. Every scripted state lands on
//! exactly the frame it was recorded for, on every run.
//!
//! # Architecture
//! - [`script`]: control messages, the line grammar, the per-session
//!   [`FrameQueue`] and the [`ScriptSource`] capability
//! - [`populator`]: background thread keeping every active source's queue
//!   filled ahead of consumption
//! - [`engine`]: the per-controller frame loop
//! - [`vsync`]: refresh pacing ([`VsyncGate`])
//! - [`controller`]: controller state and the [`ControllerSink`] seam
//! - [`config`]: JSON configuration
//!
//! # Crate feature flags
//! - `cli` (default): the `tas-replay` binary (enables `clap`, `env_logger` and `anyhow`)
//!
//! # Quick start
//! ```no_run
//! use tas_replay::{
//!     LineFileSource, PlaybackConfig, PlaybackEngine, Populator, RecordingSink, TimedVsync,
//! };
//!
//! let config = PlaybackConfig::default();
//! let populator = Populator::start(&config).unwrap();
//! let vsync = TimedVsync::start(config.refresh_rate_hz);
//!
//! let source = LineFileSource::open("scripts/script1.txt", config.fill_threshold);
//! let mut controller = RecordingSink::new();
//! let engine = PlaybackEngine::new(&vsync).with_populator(&populator);
//! let report = engine.run(source, &mut controller).unwrap();
//! println!("{} frames committed", report.frames_committed);
//! ```

#![warn(missing_docs)]

pub mod config; // Configuration
pub mod controller; // Controller State & Sink
pub mod engine; // Frame Loop
pub mod populator; // Background Queue Population
pub mod script; // Script Parsing & Sources
pub mod vsync; // Refresh Pacing

/// Error types for scripted playback
#[derive(thiserror::Error, Debug)]
pub enum TasError {
    /// Backing store failed to open or validate; the session never started
    #[error("Script source not ready: {0}")]
    SourceNotReady(String),

    /// Pop on an empty frame queue (caller must check emptiness first)
    #[error("Frame queue is empty")]
    EmptyQueue,

    /// No more script records; drives the end-of-script transition
    #[error("End of script data")]
    EndOfData,

    /// Malformed script line
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error from filesystem or stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TasError {
    fn from(err: serde_json::Error) -> Self {
        TasError::Config(err.to_string())
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, TasError>;

// Public API exports
pub use config::PlaybackConfig;
pub use controller::{Buttons, ControllerSink, ControllerState, RecordingSink, StickPosition};
pub use engine::{PlaybackEngine, SessionReport};
pub use populator::Populator;
pub use script::{
    parse_line, ControlMessage, FrameQueue, LineFileSource, LineStreamSource, ScriptSource,
};
pub use vsync::{TimedVsync, UnthrottledVsync, VsyncGate};
