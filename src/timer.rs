//! Rearmable timers (spec §5).
//!
//! Each zone owns at most two of these: `soa_update_timer` and
//! `expire_timer`. A [`Timer`] wraps a cancellable `tokio::time::sleep`
//! task that, on firing, sends a unit value down an mpsc channel the zone's
//! cooperative task loop selects on — so a callback firing is just another
//! message in that loop, never a concurrent call into the zone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Floor applied to zero-length rearms, per spec §4.2's "floor to 90s when
/// zero".
pub const MIN_REARM: Duration = Duration::from_secs(90);

/// A single rearmable timer.
pub struct Timer {
    name: &'static str,
    fire: mpsc::Sender<&'static str>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicBool>,
}

impl Timer {
    /// Create a timer that, on firing, sends `name` down `fire`.
    pub fn new(name: &'static str, fire: mpsc::Sender<&'static str>) -> Self {
        Self {
            name,
            fire,
            handle: std::sync::Mutex::new(None),
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace any prior schedule with a new one firing after `duration`.
    pub fn rearm(&self, duration: Duration) {
        self.stop();
        let fire = self.fire.clone();
        let name = self.name;
        let pending = self.pending.clone();
        pending.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            pending.store(false, Ordering::SeqCst);
            let _ = fire.send(name).await;
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Like [`Timer::rearm`], but a zero-length `duration` is floored to
    /// [`MIN_REARM`] rather than firing immediately.
    pub fn rearm_floored(&self, duration: Duration) {
        let floored = if duration.is_zero() { MIN_REARM } else { duration };
        self.rearm(floored);
    }

    /// Cancel any pending schedule. A no-op if nothing is pending.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
        self.pending.store(false, Ordering::SeqCst);
    }

    pub fn pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
