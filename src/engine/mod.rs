//! Per-bus workers and the shared timeout sweeper.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::types::Message;

pub(crate) mod rx;
pub(crate) mod sweeper;
pub(crate) mod tx;

/// How long an idle worker waits on its queue before rechecking for shutdown.
pub(crate) const IDLE_WAIT: Duration = Duration::from_millis(50);

/// A message queued for transmission plus the write attempts it has used.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub(crate) msg: Message,
    pub(crate) retries: u32,
}

impl Envelope {
    pub(crate) fn new(msg: Message) -> Self {
        Self { msg, retries: 0 }
    }
}

/// Shutdown signal shared by every worker.
///
/// Workers sleep on it instead of `thread::sleep` so a stop request cuts
/// retry and poll delays short.
#[derive(Default)]
pub(crate) struct Stop {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl Stop {
    pub(crate) fn set(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for `dur`. Returns `true` once a stop has been requested.
    pub(crate) fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cv.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}
