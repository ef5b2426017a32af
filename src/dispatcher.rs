//! Link dispatcher.
//!
//! The serial link is half-duplex and stateless between frames: interleaved
//! writes or reads from two logical callers produce byte-level corruption
//! indistinguishable from a device fault. The dispatcher is therefore the
//! sole entry point onto the transport. A dedicated worker thread owns the
//! link and drains a single request queue, so exactly one exchange (write
//! request, read and verify response) is in flight at any instant.
//!
//! The dispatcher never retries. Timeouts and corrupt frames surface to the
//! caller, which owns the policy (the session manager's policy is "skip this
//! poll tick, try again next tick").

use std::io::Write;
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::{Result, VescError};
use crate::frame;
use crate::transport::Transport;

/// Queue depth for pending exchange jobs.
const JOB_QUEUE_DEPTH: usize = 32;

struct Job {
    payloads: Vec<Vec<u8>>,
    reply: oneshot::Sender<Vec<Result<Vec<u8>>>>,
}

/// Handle submitting exchanges to the link worker.
///
/// Cheap to clone; all clones feed the same queue. Jobs are served strictly
/// in arrival order. Dropping the requester does not abort an exchange that
/// already reached the worker: it runs to completion or timeout so the
/// device is never left mid-frame.
#[derive(Clone)]
pub struct Dispatcher {
    jobs: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Start the link worker thread.
    ///
    /// With `link == None` (endpoint could not be opened) the dispatcher
    /// still runs and answers every exchange with
    /// [`VescError::Unavailable`], so callers degrade instead of crashing.
    pub fn spawn(link: Option<Box<dyn Transport>>) -> Dispatcher {
        let (tx, rx) = mpsc::channel(JOB_QUEUE_DEPTH);
        thread::spawn(move || worker(link, rx));
        Dispatcher { jobs: tx }
    }

    /// Perform one request/response exchange.
    ///
    /// `payload` is the unframed request (command id plus parameters); the
    /// returned bytes are the verified response payload.
    pub async fn exchange(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let mut results = self.exchange_batch(vec![payload]).await?;
        match results.pop() {
            Some(result) => result,
            None => Err(VescError::DispatcherClosed),
        }
    }

    /// Perform several exchanges back-to-back with nothing interleaved.
    ///
    /// The composite telemetry poll uses this so its sub-results reflect one
    /// coherent polling instant as closely as the transport allows. Each
    /// exchange gets its own result; a failed exchange does not abort the
    /// rest of the batch.
    pub async fn exchange_batch(&self, payloads: Vec<Vec<u8>>) -> Result<Vec<Result<Vec<u8>>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(Job {
                payloads,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VescError::DispatcherClosed)?;
        reply_rx.await.map_err(|_| VescError::DispatcherClosed)
    }
}

fn worker(mut link: Option<Box<dyn Transport>>, mut jobs: mpsc::Receiver<Job>) {
    while let Some(job) = jobs.blocking_recv() {
        let results: Vec<Result<Vec<u8>>> = match link.as_mut() {
            Some(transport) => job
                .payloads
                .iter()
                .map(|payload| run_exchange(transport.as_mut(), payload))
                .collect(),
            None => job
                .payloads
                .iter()
                .map(|_| Err(VescError::Unavailable("no serial link".into())))
                .collect(),
        };
        // The requester may have detached while we were on the wire; the
        // exchange still ran to completion, only the reply is dropped.
        let _ = job.reply.send(results);
    }
}

fn run_exchange<T: Transport + ?Sized>(link: &mut T, payload: &[u8]) -> Result<Vec<u8>> {
    link.clear_input()?;
    let request = frame::encode(payload);
    trace!(bytes = request.len(), "link write");
    link.write_all(&request)?;
    link.flush()?;
    let response = frame::read_frame(link)?;
    trace!(bytes = response.len(), "link read");
    Ok(response)
}
