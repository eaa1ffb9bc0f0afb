//! Background queue population
//!
//! One populator thread serves every active session:
//! - Sessions register their [`ScriptSource`] when they start
//! - Each pass walks a snapshot of the registry round-robin and refills any
//!   source that still has unparsed lines
//! - Between passes the thread sleeps for a short fixed idle delay
//!
//! The registry holds weak references. A session ending drops its source,
//! which deregisters it; exhausted sources are pruned on the next pass.

use log::{debug, error, trace};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::PlaybackConfig;
use crate::script::ScriptSource;
use crate::Result;

/// Registry of sources awaiting population
#[derive(Default)]
struct Registry {
    sources: Mutex<Vec<Weak<dyn ScriptSource>>>,
}

impl Registry {
    fn register(&self, source: &Arc<dyn ScriptSource>) {
        self.sources.lock().push(Arc::downgrade(source));
    }

    /// Live sources with unparsed lines; prunes the rest.
    ///
    /// The lock is held only while copying, so sessions can register while a
    /// pass is refilling.
    fn snapshot(&self) -> Vec<Arc<dyn ScriptSource>> {
        let mut sources = self.sources.lock();
        let mut live = Vec::with_capacity(sources.len());
        sources.retain(|weak| match weak.upgrade() {
            Some(source) if source.has_pending_data() => {
                live.push(source);
                true
            }
            _ => false,
        });
        live
    }

    fn len(&self) -> usize {
        self.sources.lock().len()
    }
}

/// Refill every registered source once. Returns the number of sources visited.
fn run_pass(registry: &Registry) -> usize {
    let sources = registry.snapshot();
    for source in &sources {
        source.refill_queue();
        trace!(
            "Populated '{}' ({} queued)",
            source.name(),
            source.queued()
        );
    }
    sources.len()
}

/// Handle to the background population thread
///
/// Dropping the handle stops the thread.
pub struct Populator {
    registry: Arc<Registry>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Populator {
    /// Start the populator with the configured idle delay
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(config: &PlaybackConfig) -> Result<Self> {
        Self::with_idle_delay(config.populator_idle())
    }

    /// Start the populator sleeping `idle_delay` between passes
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn with_idle_delay(idle_delay: Duration) -> Result<Self> {
        let registry = Arc::new(Registry::default());
        let running = Arc::new(AtomicBool::new(true));

        let registry_clone = Arc::clone(&registry);
        let running_clone = Arc::clone(&running);

        let worker = std::thread::Builder::new()
            .name("tas-populator".into())
            .spawn(move || run_populator_loop(registry_clone, running_clone, idle_delay))?;

        debug!("Populator started (idle delay {idle_delay:?})");

        Ok(Populator {
            registry,
            running,
            worker: Some(worker),
        })
    }

    /// Add a source to the registry
    pub fn register(&self, source: &Arc<dyn ScriptSource>) {
        self.registry.register(source);
        debug!("Registered script source '{}'", source.name());
    }

    /// Signal shutdown and wait for the thread to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Populator thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Populator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Populator loop: refill every registered source, then idle.
fn run_populator_loop(registry: Arc<Registry>, running: Arc<AtomicBool>, idle_delay: Duration) {
    while running.load(Ordering::Relaxed) {
        run_pass(&registry);
        std::thread::sleep(idle_delay);
    }
    debug!("Populator stopped");
}
