//! Background worker threads.
//!
//! Each worker is a named OS thread running one statically compiled loop:
//! receive an envelope, run the matching kernel, send the result back with
//! the same timestamp. Workers share nothing with the main loop; a panic
//! inside one only shows up as a disconnected channel.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::protocol::{Envelope, WorkerKind, WorkerRequest, WorkerResponse};
use crate::physics::{expand_fire_requests, integrate_entities, step_projectiles};

/// Requests a worker may have queued before the main loop backs off.
pub const OUTBOUND_QUEUE_DEPTH: usize = 2;

/// How long `stop` waits to deliver `Shutdown` to a busy worker.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs the kernel for one request.
///
/// The worker loop and the main-thread fallback both go through here.
/// Returns `None` for `Shutdown`.
#[must_use]
pub fn compute(request: WorkerRequest) -> Option<WorkerResponse> {
    match request {
        WorkerRequest::PhysicsUpdate { entities, dt } => Some(WorkerResponse::PhysicsUpdated {
            motions: integrate_entities(&entities, dt),
        }),
        WorkerRequest::CollisionCheck {
            lease,
            entities,
            dt,
            bounds,
            player,
        } => {
            let report = step_projectiles(lease.buffer(), &entities, dt, &bounds, player);
            Some(WorkerResponse::CollisionChecked { lease, report })
        }
        WorkerRequest::CreateProjectiles { requests } => Some(WorkerResponse::ProjectilesCreated {
            projectiles: expand_fire_requests(&requests),
        }),
        WorkerRequest::Shutdown => None,
    }
}

fn serve(kind: WorkerKind, requests: &Receiver<Envelope<WorkerRequest>>, responses: &Sender<Envelope<WorkerResponse>>) {
    for Envelope { timestamp, message } in requests.iter() {
        let Some(response) = compute(message) else {
            break;
        };
        if responses.send(Envelope::new(timestamp, response)).is_err() {
            debug!(worker = %kind, "response channel closed");
            break;
        }
    }
    debug!(worker = %kind, "worker loop exited");
}

/// Handle to one running worker.
pub struct WorkerHandle {
    kind: WorkerKind,
    sender: Sender<Envelope<WorkerRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Starts a worker thread named `starfall-<kind>`.
    ///
    /// # Errors
    ///
    /// Fails if the OS refuses to create the thread.
    pub fn spawn(kind: WorkerKind, responses: Sender<Envelope<WorkerResponse>>) -> io::Result<Self> {
        let (sender, receiver) = bounded(OUTBOUND_QUEUE_DEPTH);
        let thread = thread::Builder::new()
            .name(format!("starfall-{kind}"))
            .spawn(move || serve(kind, &receiver, &responses))?;
        info!(worker = %kind, "worker started");
        Ok(Self {
            kind,
            sender,
            thread: Some(thread),
        })
    }

    /// Which computation this worker runs.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Queues a request without blocking.
    ///
    /// # Errors
    ///
    /// Hands the envelope back if the queue is full or the worker is gone.
    pub fn try_send(&self, envelope: Envelope<WorkerRequest>) -> Result<(), TrySendError<Envelope<WorkerRequest>>> {
        self.sender.try_send(envelope)
    }

    /// Returns true once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Sends `Shutdown` and joins the thread.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        match self.sender.send_timeout(Envelope::new(0, WorkerRequest::Shutdown), SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(SendTimeoutError::Disconnected(_)) => {
                if thread.join().is_err() {
                    warn!(worker = %self.kind, "worker panicked");
                } else {
                    info!(worker = %self.kind, "worker stopped");
                }
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(worker = %self.kind, "worker did not accept shutdown, detaching");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
