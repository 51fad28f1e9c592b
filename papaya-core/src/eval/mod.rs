//! # Evaluation
//!
//! Turns a graph into pixels. Evaluating an output node computes every node it depends on, dependencies
//! first, and hands back the output node's buffer at the requested size.
//!
//! Results are cached per node. An entry is reused only while all of the following still hold:
//! * The node's [revision](crate::state::graph::Node::revision) is the one it was computed at.
//! * The requested size is the same.
//! * Every input resolves to the very same buffer it did before, compared by [`BufferID`].
//!
//! The last rule is what carries a change anywhere upstream down to the output, without any node needing
//! to know who consumes it. Revisions are never reused, so undoing back to an older graph can't make a
//! stale entry look fresh.

pub mod background;

use crate::pixels::{BufferID, PixelBuffer, PixelError};
use crate::state::graph::{Graph, NodeID};
use smallvec::SmallVec;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("output node {} not found", .0)]
    MissingOutputNode(NodeID),
    #[error("can't evaluate at {width}x{height}")]
    DimensionError { width: u32, height: u32 },
    #[error("{}", .0)]
    Pixel(#[from] PixelError),
}

struct CacheEntry {
    revision: crate::state::graph::Revision,
    size: [u32; 2],
    /// Identity of each input's buffer at the time of computing, in slot order.
    inputs: SmallVec<[Option<BufferID>; 2]>,
    result: PixelBuffer,
}

/// Result of one evaluation, along with what work it took.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub result: PixelBuffer,
    /// Nodes that had to be recomputed, in the order they were. Empty if everything came from cache.
    pub recomputed: Vec<NodeID>,
}

/// Computes node outputs, remembering them between calls.
///
/// Takes `&self` throughout, evaluations of different outputs can run side by side.
#[derive(Default)]
pub struct Evaluator {
    cache: parking_lot::Mutex<hashbrown::HashMap<NodeID, CacheEntry>>,
}
impl Evaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Compute the output of `output` at `width` x `height`.
    pub fn evaluate(
        &self,
        graph: &Graph,
        output: NodeID,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, EvalError> {
        self.evaluate_detailed(graph, output, width, height)
            .map(|evaluation| evaluation.result)
    }
    /// As [`Self::evaluate`], additionally reporting which nodes were recomputed.
    pub fn evaluate_detailed(
        &self,
        graph: &Graph,
        output: NodeID,
        width: u32,
        height: u32,
    ) -> Result<Evaluation, EvalError> {
        let order = graph
            .dependency_order(output)
            .ok_or(EvalError::MissingOutputNode(output))?;
        if width == 0 || height == 0 {
            return Err(EvalError::DimensionError { width, height });
        }

        // Every kind has one output, so results are keyed by node alone.
        let mut results = hashbrown::HashMap::<NodeID, PixelBuffer>::with_capacity(order.len());
        let mut recomputed = Vec::new();
        for id in order {
            // Order came from this graph, so this is always found.
            let node = graph.get(id).ok_or(EvalError::MissingOutputNode(id))?;
            let inputs: SmallVec<[Option<PixelBuffer>; 2]> = node
                .input_sources()
                .map(|source| source.and_then(|source| results.get(&source.node).cloned()))
                .collect();
            let stamps: SmallVec<[Option<BufferID>; 2]> = inputs
                .iter()
                .map(|input| input.as_ref().map(PixelBuffer::id))
                .collect();

            let cached = {
                let cache = self.cache.lock();
                cache
                    .get(&id)
                    .filter(|entry| {
                        entry.revision == node.revision()
                            && entry.size == [width, height]
                            && entry.inputs == stamps
                    })
                    .map(|entry| entry.result.clone())
            };
            let result = if let Some(result) = cached {
                result
            } else {
                // Lock is not held while computing, other evaluations may proceed.
                let inputs: SmallVec<[Option<&PixelBuffer>; 2]> =
                    inputs.iter().map(Option::as_ref).collect();
                let result = node.kind().operation().compute(&inputs, width, height)?;
                log::debug!(
                    "recomputed {id} ({}) at {width}x{height}",
                    node.kind().label()
                );
                self.cache.lock().insert(
                    id,
                    CacheEntry {
                        revision: node.revision(),
                        size: [width, height],
                        inputs: stamps,
                        result: result.clone(),
                    },
                );
                recomputed.push(id);
                result
            };
            results.insert(id, result);
        }

        let result = results
            .remove(&output)
            .ok_or(EvalError::MissingOutputNode(output))?;
        Ok(Evaluation { result, recomputed })
    }
    /// Forget everything.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
    /// Forget results of nodes no longer present in `graph`.
    pub fn retain_nodes(&self, graph: &Graph) {
        self.cache.lock().retain(|id, _| graph.contains(*id));
    }
    /// Number of nodes with a cached result.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}
