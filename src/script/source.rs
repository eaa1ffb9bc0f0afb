//! Script sources
//!
//! A [`ScriptSource`] turns some backing store into an ordered, lazily parsed
//! sequence of [`ControlMessage`]s. It owns the session's [`FrameQueue`] and
//! decides how far ahead of the frame loop it parses (its fill policy).
//!
//! Two variants share one line reader:
//! - [`LineStreamSource`]: any `BufRead` (sockets, stdin, in-memory text)
//! - [`LineFileSource`]: a script file on disk; closes the handle at EOF

use log::{debug, warn};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::parser::{is_skippable, parse_line};
use super::{ControlMessage, FrameQueue};
use crate::{Result, TasError};

/// Default low-water mark: refill while fewer than this many messages are queued
pub const DEFAULT_FILL_THRESHOLD: usize = 15;

/// Producer of frame-stamped control messages
///
/// Shared between the session that owns it and the populator thread, so every
/// method takes `&self`.
pub trait ScriptSource: Send + Sync {
    /// Human-readable identifier for logs and errors
    fn name(&self) -> &str;

    /// Whether the backing store opened and validated
    ///
    /// Checked once before a session starts; a session never starts on a
    /// source that is not ready.
    fn is_ready(&self) -> bool;

    /// Whether unparsed lines remain in the backing store (ignores the queue)
    ///
    /// Once this returns `false` it never returns `true` again.
    fn has_pending_data(&self) -> bool;

    /// Next message in script order
    ///
    /// Takes from the queue first and parses one more line only when the queue
    /// is empty.
    ///
    /// # Errors
    ///
    /// Returns [`TasError::EndOfData`] when neither the queue nor the backing
    /// store has anything left.
    fn produce_next(&self) -> Result<ControlMessage>;

    /// Parse ahead into the queue until the fill policy says stop
    ///
    /// A no-op when the queue is already at the threshold, when the source is
    /// exhausted, or when another refill of this source is in progress.
    fn refill_queue(&self);

    /// Number of parsed messages waiting in the queue
    fn queued(&self) -> usize;

    /// Whether any message is still deliverable (queued or unparsed)
    ///
    /// Exhaustion is checked first: a source is marked exhausted only after
    /// its last record is queued, so a `false` from `has_pending_data` means
    /// the following `queued` sees every record.
    fn has_next(&self) -> bool {
        self.has_pending_data() || self.queued() > 0
    }
}

/// Reader state guarded by the source's read lock
struct ReadState<R> {
    /// `None` once the handle has been closed
    reader: Option<R>,
    line: String,
    line_number: usize,
    last_frame: Option<u64>,
}

/// Script source over any buffered line stream
pub struct LineStreamSource<R> {
    name: String,
    state: Mutex<ReadState<R>>,
    queue: FrameQueue,
    ready: bool,
    exhausted: AtomicBool,
    fill_threshold: usize,
    close_on_eof: bool,
}

impl<R: BufRead + Send> LineStreamSource<R> {
    /// Create a source reading records from `reader`
    ///
    /// The stream is probed once; a read error makes the source not ready.
    pub fn new(reader: R, fill_threshold: usize) -> Self {
        Self::named("stream", reader, fill_threshold)
    }

    /// Create a source with a custom name for logs
    pub fn named(name: impl Into<String>, reader: R, fill_threshold: usize) -> Self {
        Self::build(name.into(), Some(reader), fill_threshold, false)
    }

    fn build(name: String, reader: Option<R>, fill_threshold: usize, close_on_eof: bool) -> Self {
        let mut reader = reader;
        let (ready, at_eof) = match reader.as_mut().map(|r| r.fill_buf().map(|buf| buf.is_empty())) {
            Some(Ok(empty)) => (true, empty),
            Some(Err(e)) => {
                warn!("Script source '{name}' failed validation: {e}");
                (false, true)
            }
            None => (false, true),
        };
        if at_eof && close_on_eof {
            reader = None;
        }

        LineStreamSource {
            name,
            state: Mutex::new(ReadState {
                reader,
                line: String::new(),
                line_number: 0,
                last_frame: None,
            }),
            queue: FrameQueue::new(),
            ready,
            exhausted: AtomicBool::new(at_eof),
            fill_threshold: fill_threshold.max(1),
            close_on_eof,
        }
    }

    /// Whether the underlying handle has been released
    pub fn is_closed(&self) -> bool {
        self.state.lock().reader.is_none()
    }

    fn should_refill(&self) -> bool {
        !self.exhausted.load(Ordering::Acquire) && self.queue.len() < self.fill_threshold
    }

    fn mark_exhausted(&self, state: &mut ReadState<R>) {
        if !self.exhausted.swap(true, Ordering::AcqRel) {
            debug!(
                "Script source '{}' exhausted after {} lines",
                self.name, state.line_number
            );
        }
        if self.close_on_eof {
            state.reader = None;
        }
    }

    /// Read lines until one parses into a record or the stream ends.
    ///
    /// Returns the record and whether the stream is now at its end. Malformed
    /// lines are skipped. I/O errors end the stream. The caller marks the
    /// source exhausted once the record is visible to consumers.
    fn read_record(&self, state: &mut ReadState<R>) -> (Option<ControlMessage>, bool) {
        if self.exhausted.load(Ordering::Acquire) {
            return (None, true);
        }

        loop {
            let Some(reader) = state.reader.as_mut() else {
                return (None, true);
            };
            state.line.clear();

            let read = reader.read_line(&mut state.line);
            let at_eof = match read {
                Ok(0) => true,
                Ok(_) => match reader.fill_buf() {
                    Ok(buf) => buf.is_empty(),
                    Err(e) => {
                        warn!(
                            "Script source '{}' read failed after line {}: {e}",
                            self.name,
                            state.line_number + 1
                        );
                        true
                    }
                },
                Err(ref e) => {
                    warn!(
                        "Script source '{}' read failed at line {}: {e}",
                        self.name,
                        state.line_number + 1
                    );
                    true
                }
            };

            let parsed = match read {
                Ok(n) if n > 0 => {
                    state.line_number += 1;
                    self.parse_current(state)
                }
                _ => None,
            };

            if parsed.is_some() || at_eof {
                return (parsed, at_eof);
            }
        }
    }

    fn parse_current(&self, state: &mut ReadState<R>) -> Option<ControlMessage> {
        if is_skippable(&state.line) {
            return None;
        }
        match parse_line(&state.line) {
            Ok(msg) => {
                if state.last_frame.is_some_and(|last| msg.frame < last) {
                    warn!(
                        "Script source '{}' line {}: frame {} goes backwards",
                        self.name, state.line_number, msg.frame
                    );
                }
                state.last_frame = Some(msg.frame);
                Some(msg)
            }
            Err(e) => {
                warn!(
                    "Script source '{}' line {} skipped: {e}",
                    self.name, state.line_number
                );
                None
            }
        }
    }
}

impl<R: BufRead + Send> ScriptSource for LineStreamSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn has_pending_data(&self) -> bool {
        !self.exhausted.load(Ordering::Acquire)
    }

    fn produce_next(&self) -> Result<ControlMessage> {
        if let Ok(msg) = self.queue.pop() {
            return Ok(msg);
        }

        let mut state = self.state.lock();
        // A refill may have completed while we waited for the lock
        if let Ok(msg) = self.queue.pop() {
            return Ok(msg);
        }
        let (record, at_eof) = self.read_record(&mut state);
        if at_eof {
            self.mark_exhausted(&mut state);
        }
        record.ok_or(TasError::EndOfData)
    }

    fn refill_queue(&self) {
        if !self.should_refill() {
            return;
        }
        let Some(mut state) = self.state.try_lock() else {
            return;
        };

        while self.queue.len() < self.fill_threshold {
            let (record, at_eof) = self.read_record(&mut state);
            if let Some(msg) = record {
                self.queue.push(msg);
            }
            if at_eof {
                self.mark_exhausted(&mut state);
                break;
            }
        }
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Script source over a file on disk
///
/// Releases the file handle as soon as the last line has been read; refills
/// after that are no-ops.
pub struct LineFileSource {
    inner: LineStreamSource<BufReader<File>>,
}

impl LineFileSource {
    /// Open a script file
    ///
    /// Never fails: an unopenable file yields a source whose
    /// [`is_ready`](ScriptSource::is_ready) is `false`.
    pub fn open(path: impl AsRef<Path>, fill_threshold: usize) -> Self {
        let path = path.as_ref();
        let name = path.display().to_string();
        let reader = match File::open(path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) => {
                warn!("Failed to open script '{name}': {e}");
                None
            }
        };

        LineFileSource {
            inner: LineStreamSource::build(name, reader, fill_threshold, true),
        }
    }

    /// Whether the file handle has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl ScriptSource for LineFileSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn has_pending_data(&self) -> bool {
        self.inner.has_pending_data()
    }

    fn produce_next(&self) -> Result<ControlMessage> {
        self.inner.produce_next()
    }

    fn refill_queue(&self) {
        self.inner.refill_queue();
    }

    fn queued(&self) -> usize {
        self.inner.queued()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Buttons;
    use std::io::{self, Cursor, Read};
    use std::io::Write as _;
    use std::sync::Arc;

    fn script(lines: usize) -> String {
        (0..lines).map(|i| format!("{} KEY_A\n", i * 2)).collect()
    }

    #[test]
    fn test_produce_in_order() {
        let source = LineStreamSource::new(Cursor::new("0 A\n# note\n\n2 B\n"), 15);
        assert!(source.is_ready());
        assert!(source.has_pending_data());

        let first = source.produce_next().unwrap();
        assert_eq!((first.frame, first.state.buttons), (0, Buttons::A));
        let second = source.produce_next().unwrap();
        assert_eq!((second.frame, second.state.buttons), (2, Buttons::B));

        assert!(!source.has_pending_data());
        assert!(matches!(source.produce_next(), Err(TasError::EndOfData)));
    }

    #[test]
    fn test_refill_stops_at_threshold() {
        let source = LineStreamSource::new(Cursor::new(script(40)), 15);
        source.refill_queue();
        assert_eq!(source.queued(), 15);

        // Already at threshold: nothing happens
        source.refill_queue();
        assert_eq!(source.queued(), 15);

        source.produce_next().unwrap();
        source.refill_queue();
        assert_eq!(source.queued(), 15);
    }

    #[test]
    fn test_queued_messages_come_before_unparsed_lines() {
        let source = LineStreamSource::new(Cursor::new(script(20)), 5);
        source.refill_queue();

        let frames: Vec<u64> = std::iter::from_fn(|| source.produce_next().ok())
            .map(|m| m.frame)
            .collect();
        assert_eq!(frames, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_exhaustion_is_permanent() {
        let source = LineStreamSource::new(Cursor::new("0 A\n"), 15);
        source.refill_queue();
        assert!(!source.has_pending_data());
        assert!(source.has_next());

        source.produce_next().unwrap();
        assert!(!source.has_next());
        source.refill_queue();
        assert!(!source.has_pending_data());
    }

    #[test]
    fn test_empty_stream() {
        let source = LineStreamSource::new(Cursor::new(""), 15);
        assert!(source.is_ready());
        assert!(!source.has_pending_data());
        assert!(matches!(source.produce_next(), Err(TasError::EndOfData)));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let source = LineStreamSource::new(Cursor::new("0 A\nbogus\n1 KEY_NOPE\n5 B\n"), 15);
        source.refill_queue();
        assert_eq!(source.queued(), 2);
        source.produce_next().unwrap();
        assert_eq!(source.produce_next().unwrap().frame, 5);
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "device removed"));
            }
            self.served = true;
            let data = b"0 A\n1 B\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_read_failure_becomes_end_of_data() {
        let source = LineStreamSource::new(
            BufReader::with_capacity(64, FailingReader { served: false }),
            15,
        );
        assert!(source.is_ready());
        source.refill_queue();

        // The failed lookahead after the last line ends the stream
        assert_eq!(source.queued(), 2);
        assert!(!source.has_pending_data());
        assert!(source.has_next());

        assert_eq!(source.produce_next().unwrap().frame, 0);
        assert_eq!(source.produce_next().unwrap().frame, 1);
        assert!(matches!(source.produce_next(), Err(TasError::EndOfData)));
    }

    #[test]
    fn test_final_record_visible_before_exhaustion() {
        // A consumer draining while another thread refills must never see
        // `has_next() == false` before the last record has been delivered.
        for _ in 0..200 {
            let source = Arc::new(LineStreamSource::new(Cursor::new(script(8)), 1));
            let refiller = {
                let source = Arc::clone(&source);
                std::thread::spawn(move || {
                    while source.has_pending_data() {
                        source.refill_queue();
                        std::thread::yield_now();
                    }
                })
            };

            let mut frames = Vec::new();
            while source.has_next() {
                if let Ok(msg) = source.produce_next() {
                    frames.push(msg.frame);
                }
            }
            refiller.join().unwrap();

            assert_eq!(frames, (0..8).map(|i| i * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_file_source_closes_at_eof() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "0 A\n3 B\n").unwrap();

        let source = LineFileSource::open(file.path(), 15);
        assert!(source.is_ready());
        assert!(!source.is_closed());

        source.refill_queue();
        assert_eq!(source.queued(), 2);
        assert!(source.is_closed());

        // Closed: refill is a no-op
        source.refill_queue();
        assert_eq!(source.queued(), 2);
    }

    #[test]
    fn test_missing_file_is_not_ready() {
        let source = LineFileSource::open("/nonexistent/dir/script1.txt", 15);
        assert!(!source.is_ready());
        assert!(!source.has_next());
        assert!(source.name().contains("script1.txt"));
    }
}
