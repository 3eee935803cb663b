//! Keepalive monitor.
//!
//! Every interval the monitor sends a ping carrying a probe sequence number
//! and waits half an interval for the matching pong. A missing pong, or a
//! ping that cannot be written, disposes the channel.
//!
//! The first probe is delayed by a random jitter so that channels opened
//! together do not ping in lockstep.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::channel::Channel;
use crate::error::TransportError;
use crate::metrics as names;

/// Outstanding probe sequence and whether it has been answered.
#[derive(Debug, Default)]
struct Probe {
    sequence: u64,
    answered: bool,
}

/// Per-channel probe bookkeeping shared between the monitor and the reader.
///
/// Sequence and flag change together under one lock, so a pong for an
/// earlier probe can never mark a later one answered.
#[derive(Debug, Default)]
pub struct KeepaliveState {
    probe: Mutex<Probe>,
    notify: Notify,
}

impl KeepaliveState {
    /// Empty state; no probe outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new probe and return its sequence number.
    pub fn begin_probe(&self) -> u64 {
        let mut probe = self.probe.lock();
        probe.sequence += 1;
        probe.answered = false;
        probe.sequence
    }

    /// Record a pong. Returns `true` if it answers the outstanding probe.
    pub fn record_pong(&self, payload: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 8]>::try_from(payload) else {
            return false;
        };
        {
            let mut probe = self.probe.lock();
            if probe.sequence == 0 || u64::from_be_bytes(bytes) != probe.sequence {
                return false;
            }
            probe.answered = true;
        }
        self.notify.notify_waiters();
        true
    }

    /// Whether the outstanding probe has been answered.
    pub fn pong_received(&self) -> bool {
        self.probe.lock().answered
    }

    /// Resolve once the outstanding probe is answered.
    pub async fn wait_for_pong(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();
            if self.pong_received() {
                return;
            }
            notified.await;
        }
    }
}

/// Why a keepalive monitor stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepaliveResult {
    /// The channel's cancellation token fired.
    Cancelled,
    /// The channel was found no longer Open.
    Closed,
    /// A probe went unanswered; the channel was disposed.
    TimedOut,
    /// A ping could not be written; the channel was disposed.
    PingFailed,
}

/// Random delay in `[0, max)`.
pub fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

/// Monitor `channel` until it closes or stops answering.
///
/// Each probe (writing the ping and receiving the matching pong) must finish
/// within half an interval.
pub async fn run(channel: Arc<Channel>, interval: Duration) -> KeepaliveResult {
    let cancel = channel.cancellation();
    let half = interval / 2;

    tokio::select! {
        () = cancel.cancelled() => return KeepaliveResult::Cancelled,
        () = tokio::time::sleep(random_jitter(half)) => {}
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => return KeepaliveResult::Cancelled,
            () = tokio::time::sleep(half) => {}
        }
        if !channel.is_open() {
            return KeepaliveResult::Closed;
        }

        // ping write and pong wait share one budget
        let probe = channel.keepalive().begin_probe();
        let probed = tokio::select! {
            () = cancel.cancelled() => return KeepaliveResult::Cancelled,
            r = tokio::time::timeout(half, async {
                channel.send_ping(probe).await?;
                channel.keepalive().wait_for_pong().await;
                Ok::<(), TransportError>(())
            }) => r,
        };
        let answered = match probed {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(channel_id = %channel.id(), error = %e, "keepalive ping failed");
                counter!(names::LIVENESS_FAILURES_TOTAL, "reason" => "ping").increment(1);
                channel.dispose().await;
                return KeepaliveResult::PingFailed;
            }
            Err(_) => false,
        };
        if !answered {
            let err = TransportError::Liveness { waited: half };
            error!(
                channel_id = %channel.id(),
                remote = %channel.remote_address(),
                error = %err,
                "peer unresponsive, disposing channel"
            );
            counter!(names::LIVENESS_FAILURES_TOTAL, "reason" => "timeout").increment(1);
            channel.dispose().await;
            return KeepaliveResult::TimedOut;
        }
        debug!(channel_id = %channel.id(), probe, "keepalive answered");
    }
}

/// Run the monitor on its own task.
pub fn spawn(channel: Arc<Channel>, interval: Duration) -> JoinHandle<KeepaliveResult> {
    tokio::spawn(run(channel, interval))
}
