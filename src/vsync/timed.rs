//! Timer-driven vertical blank signal
//!
//! Stands in for the display's vsync event: a ticker thread raises one edge
//! per refresh period and wakes every waiting session. The VBL count doubles
//! as a global frame counter.

use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{VsyncGate, REFRESH_RATE_NTSC};

/// How long a waiter sleeps before re-checking that the ticker is alive
const WAIT_RECHECK: Duration = Duration::from_millis(100);

struct VblState {
    /// Edges raised since start
    vbl_count: Mutex<u64>,
    edge: Condvar,
    running: AtomicBool,
}

/// Vsync gate driven by a fixed-rate ticker thread
pub struct TimedVsync {
    state: Arc<VblState>,
    ticker: Option<JoinHandle<()>>,
}

/// Duration of one refresh at `refresh_rate_hz`
///
/// Rates whose period is not a representable, non-zero duration fall back to
/// 60 Hz.
pub fn frame_period(refresh_rate_hz: f64) -> Duration {
    match Duration::try_from_secs_f64(1.0 / refresh_rate_hz) {
        Ok(period) if !period.is_zero() => period,
        _ => Duration::from_secs_f64(1.0 / REFRESH_RATE_NTSC),
    }
}

impl TimedVsync {
    /// Start ticking at `refresh_rate_hz`
    pub fn start(refresh_rate_hz: f64) -> Self {
        let period = frame_period(refresh_rate_hz);
        let state = Arc::new(VblState {
            vbl_count: Mutex::new(0),
            edge: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let state_clone = Arc::clone(&state);
        let ticker = std::thread::spawn(move || run_ticker(state_clone, period));
        debug!("Vsync ticker started ({period:?} per frame)");

        TimedVsync {
            state,
            ticker: Some(ticker),
        }
    }

    /// Total VBL periods since start
    pub fn vbl_count(&self) -> u64 {
        *self.state.vbl_count.lock()
    }

    /// Stop the ticker; pending and future waits return immediately.
    pub fn stop(&mut self) {
        self.state.running.store(false, Ordering::Release);
        self.state.edge.notify_all();
        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                error!("Vsync ticker thread panicked during shutdown");
            }
        }
    }
}

impl VsyncGate for TimedVsync {
    fn wait_for_next(&self) {
        let mut count = self.state.vbl_count.lock();
        let seen = *count;
        while *count == seen && self.state.running.load(Ordering::Acquire) {
            self.state.edge.wait_for(&mut count, WAIT_RECHECK);
        }
    }
}

impl Drop for TimedVsync {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Raise one edge per period, scheduling against absolute deadlines so
/// sleep overshoot does not accumulate.
fn run_ticker(state: Arc<VblState>, period: Duration) {
    let mut deadline = Instant::now() + period;
    while state.running.load(Ordering::Acquire) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        deadline += period;

        *state.vbl_count.lock() += 1;
        state.edge.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_period() {
        let period = frame_period(50.0);
        assert_eq!(period, Duration::from_millis(20));
        assert_eq!(frame_period(0.0), frame_period(REFRESH_RATE_NTSC));
        assert_eq!(frame_period(f64::NAN), frame_period(REFRESH_RATE_NTSC));
    }

    #[test]
    fn test_frame_period_out_of_range_falls_back() {
        let ntsc = frame_period(REFRESH_RATE_NTSC);
        assert_eq!(frame_period(1e-30), ntsc);
        assert_eq!(frame_period(-50.0), ntsc);
        assert_eq!(frame_period(f64::INFINITY), ntsc);
        assert_eq!(frame_period(1e300), ntsc);
    }

    #[test]
    fn test_wait_advances_vbl_count() {
        let vsync = TimedVsync::start(500.0);
        let before = vsync.vbl_count();
        vsync.wait_for_next();
        vsync.wait_for_next();
        assert!(vsync.vbl_count() >= before + 2);
    }

    #[test]
    fn test_wait_after_stop_returns() {
        let mut vsync = TimedVsync::start(1.0);
        vsync.stop();
        vsync.wait_for_next();
    }

    #[test]
    fn test_edges_wake_every_waiter() {
        let vsync = Arc::new(TimedVsync::start(200.0));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let vsync = Arc::clone(&vsync);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        vsync.wait_for_next();
                    }
                })
            })
            .collect();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert!(vsync.vbl_count() >= 5);
    }
}
