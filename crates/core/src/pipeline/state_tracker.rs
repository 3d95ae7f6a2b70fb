use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Coarse activity state of a sender pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// No sessions and no pending inbound packets.
    Idle,
    /// There is work for the pipeline thread.
    Active,
}

/// Process-wide activity counters consulted by the pipeline run-loop.
///
/// Endpoints add one pending packet per inbound enqueue and remove one per
/// drained packet; sessions register themselves as active. Counters are
/// plain atomics so network threads never block on them. Waiters are only
/// woken on the idle to active edge.
#[derive(Debug, Default)]
pub struct StateTracker {
    pending_packets: AtomicI64,
    active_sessions: AtomicI64,
    wait_lock: Mutex<()>,
    wait_cond: Condvar,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SenderState {
        if self.num_pending_packets() > 0 || self.num_active_sessions() > 0 {
            SenderState::Active
        } else {
            SenderState::Idle
        }
    }

    pub fn num_pending_packets(&self) -> i64 {
        self.pending_packets.load(Ordering::Acquire)
    }

    pub fn num_active_sessions(&self) -> i64 {
        self.active_sessions.load(Ordering::Acquire)
    }

    pub fn add_pending_packets(&self, delta: i64) {
        let prev = self.pending_packets.fetch_add(delta, Ordering::AcqRel);
        if prev <= 0 && prev + delta > 0 {
            self.notify();
        }
    }

    pub fn add_active_sessions(&self, delta: i64) {
        let prev = self.active_sessions.fetch_add(delta, Ordering::AcqRel);
        tracing::debug!(active_sessions = prev + delta, "active sessions changed");
        if prev <= 0 && prev + delta > 0 {
            self.notify();
        }
    }

    /// Block until the state is [`SenderState::Active`] or `timeout` passes.
    ///
    /// Returns whether the pipeline is active.
    pub fn wait_active(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.wait_lock.lock();

        while self.state() != SenderState::Active {
            if self.wait_cond.wait_until(&mut guard, deadline).timed_out() {
                return self.state() == SenderState::Active;
            }
        }
        true
    }

    fn notify(&self) {
        let _guard = self.wait_lock.lock();
        self.wait_cond.notify_all();
    }
}
