//! Evaluation off the calling thread.
//!
//! Requests run on a rayon pool against a snapshot of the graph, so the document stays free to change while
//! pixels are being made. Requests for the same output node are latest-wins: when a newer one comes in, any
//! older one that hasn't delivered yet is dropped, and its receiver reports [`BackgroundError::Superseded`].

use super::{EvalError, Evaluator};
use crate::pixels::PixelBuffer;
use crate::state::graph::{Graph, NodeID};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackgroundError {
    #[error("a newer evaluation of the same node replaced this one")]
    Superseded,
    #[error("{}", .0)]
    Eval(#[from] EvalError),
}

pub struct BackgroundEvaluator {
    evaluator: Arc<Evaluator>,
    /// The most recent ticket handed out per output node. Only that one may deliver.
    latest: Arc<parking_lot::Mutex<hashbrown::HashMap<NodeID, u64>>>,
    next_ticket: AtomicU64,
    /// None to use rayon's global pool.
    pool: Option<Arc<rayon::ThreadPool>>,
}
impl BackgroundEvaluator {
    /// Run on rayon's global pool, sharing the given evaluator's cache.
    #[must_use]
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self {
            evaluator,
            latest: Arc::default(),
            next_ticket: AtomicU64::new(0),
            pool: None,
        }
    }
    /// Run on a specific pool instead of the global one.
    #[must_use]
    pub fn with_pool(evaluator: Arc<Evaluator>, pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            pool: Some(pool),
            ..Self::new(evaluator)
        }
    }
    /// Queue an evaluation of `output` over this snapshot of the graph, superseding any still in flight
    /// for the same node.
    pub fn request(
        &self,
        graph: Arc<Graph>,
        output: NodeID,
        width: u32,
        height: u32,
    ) -> PendingEvaluation {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.latest.lock().insert(output, ticket);

        let (send, receive) = tokio::sync::oneshot::channel();
        let evaluator = self.evaluator.clone();
        let latest = self.latest.clone();

        let job = move || {
            if latest.lock().get(&output) != Some(&ticket) {
                // Dropping the sender is what tells the receiver.
                log::trace!("skipping superseded evaluation of {output}");
                return;
            }
            let result = evaluator.evaluate(&graph, output, width, height);
            deliver(&latest, output, ticket, send, result);
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
        PendingEvaluation { receive }
    }
}

type Delivery = Result<PixelBuffer, EvalError>;

/// Send the result if `ticket` is still the latest for `output`, clearing it. Otherwise drop it, which the
/// receiver sees as superseded. The lock is held until sent, so a newer request can't slip in between the
/// check and the delivery.
fn deliver(
    latest: &parking_lot::Mutex<hashbrown::HashMap<NodeID, u64>>,
    output: NodeID,
    ticket: u64,
    send: tokio::sync::oneshot::Sender<Delivery>,
    result: Delivery,
) {
    let mut latest = latest.lock();
    if latest.get(&output) == Some(&ticket) {
        latest.remove(&output);
        // Receiver may have hung up, that's fine.
        let _ = send.send(result);
    } else {
        log::trace!("discarding superseded evaluation of {output}");
    }
}

/// Handle to a result being computed in the background.
pub struct PendingEvaluation {
    receive: tokio::sync::oneshot::Receiver<Delivery>,
}
impl PendingEvaluation {
    /// Block the current thread until the result is in.
    ///
    /// # Panics
    /// If called from within an async runtime. Use [`Self::into_receiver`] and `.await` there instead.
    pub fn wait(self) -> Result<PixelBuffer, BackgroundError> {
        match self.receive.blocking_recv() {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(BackgroundError::Superseded),
        }
    }
    /// Take the result if it's ready, without blocking. `None` if it's still being worked on.
    pub fn try_take(&mut self) -> Option<Result<PixelBuffer, BackgroundError>> {
        use tokio::sync::oneshot::error::TryRecvError;
        match self.receive.try_recv() {
            Ok(result) => Some(result.map_err(Into::into)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(BackgroundError::Superseded)),
        }
    }
    /// The raw channel, for awaiting from async code. A receive error means the evaluation was superseded.
    #[must_use]
    pub fn into_receiver(self) -> tokio::sync::oneshot::Receiver<Result<PixelBuffer, EvalError>> {
        self.receive
    }
}
