//! # Graph
//!
//! The compositing pipeline of a document is a directed acyclic graph. Nodes are operations (image sources,
//! filters...) with a fixed set of typed slots, and connections run from an output slot of one node to an input
//! slot of another. An input slot takes at most one connection, an output may fan out to any number.
//!
//! Both ends of every connection are recorded: inputs point back at their source, outputs list their targets.
//! All mutators keep the two sides in agreement and check every precondition before touching anything, so a
//! failed call never leaves a half-made connection behind.

pub mod commands;
mod node;
pub mod writer;

pub use node::{Bitmap, DataKind, Direction, NodeKind, Operation, SlotLayout};

use crate::pixels::{PixelBuffer, PixelError, Rect};
use smallvec::SmallVec;

pub type NodeID = crate::PapayaID<Node>;

/// Marker for [`Revision`]s.
pub struct RevisionMarker;
/// Stamp of a graph mutation. Fresh for every mutation and never reused, even across undo.
pub type Revision = crate::PapayaID<RevisionMarker>;

/// Address of one slot: the node, and the slot's index within that node's layout.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SlotRef {
    pub node: NodeID,
    pub slot: usize,
}
impl SlotRef {
    #[must_use]
    pub fn new(node: NodeID, slot: usize) -> Self {
        Self { node, slot }
    }
}

/// A directed edge, from an output slot to an input slot.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Connection {
    pub from: SlotRef,
    pub to: SlotRef,
}

#[derive(Clone, PartialEq, Debug)]
enum Peer {
    /// The output feeding this input, if any.
    Input(Option<SlotRef>),
    /// Every input fed by this output, oldest connection first.
    Output(SmallVec<[SlotRef; 2]>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Slot {
    data_kind: DataKind,
    peer: Peer,
}
impl Slot {
    fn new(layout: &SlotLayout) -> Self {
        Self {
            data_kind: layout.data_kind,
            peer: match layout.direction {
                Direction::Input => Peer::Input(None),
                Direction::Output => Peer::Output(SmallVec::new()),
            },
        }
    }
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self.peer {
            Peer::Input(_) => Direction::Input,
            Peer::Output(_) => Direction::Output,
        }
    }
    #[must_use]
    pub fn data_kind(&self) -> DataKind {
        self.data_kind
    }
    /// For an input, the output slot feeding it.
    #[must_use]
    pub fn source(&self) -> Option<SlotRef> {
        match &self.peer {
            Peer::Input(source) => *source,
            Peer::Output(_) => None,
        }
    }
    /// For an output, the input slots it feeds.
    #[must_use]
    pub fn targets(&self) -> &[SlotRef] {
        match &self.peer {
            Peer::Output(targets) => targets,
            Peer::Input(_) => &[],
        }
    }
    fn is_connected(&self) -> bool {
        match &self.peer {
            Peer::Input(source) => source.is_some(),
            Peer::Output(targets) => !targets.is_empty(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    kind: NodeKind,
    slots: SmallVec<[Slot; 2]>,
    pub name: String,
    /// Where the node sits in the graph editor. Meaningless to evaluation.
    pub editor_position: [f32; 2],
    /// Last mutation that could change this node's output.
    revision: Revision,
}
impl Node {
    fn new(kind: NodeKind, name: String, editor_position: [f32; 2]) -> Self {
        let slots = kind.slots().iter().map(Slot::new).collect();
        Self {
            kind,
            slots,
            name,
            editor_position,
            revision: Revision::new(),
        }
    }
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
    #[must_use]
    pub fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx)
    }
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }
    /// Source of each input slot, in slot order.
    pub fn input_sources(&self) -> impl Iterator<Item = Option<SlotRef>> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.direction() == Direction::Input)
            .map(Slot::source)
    }
    /// Whether any slot of this node has a connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slots.iter().any(Slot::is_connected)
    }
}
/// Revision is cache bookkeeping, two nodes with the same content are equal regardless.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.slots == other.slots
            && self.name == other.name
            && same_position(self.editor_position, other.editor_position)
    }
}
/// Positions are opaque and only ever copied around, so they're compared bit-for-bit. Plain `==` would make
/// a NaN position unequal to itself.
pub(crate) fn same_position(a: [f32; 2], b: [f32; 2]) -> bool {
    a.map(f32::to_bits) == b.map(f32::to_bits)
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidConnection {
    #[error("slots carry different kinds of data")]
    TypeMismatch,
    #[error("connections must run from an output slot to an input slot")]
    DirectionMismatch,
    #[error("input slot is already connected")]
    SlotOccupied,
    #[error("connection would create a cycle")]
    WouldCreateCycle,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("invalid connection: {}", .0)]
    InvalidConnection(#[from] InvalidConnection),
    #[error("node {} not found", .0)]
    NodeNotFound(NodeID),
    #[error("node {} has no slot {}", .0.node, .0.slot)]
    SlotNotFound(SlotRef),
    #[error("node {} is not a bitmap", .0)]
    NotABitmap(NodeID),
    #[error("{}", .0)]
    Pixel(#[from] PixelError),
}

#[derive(Clone, Debug)]
pub struct Graph {
    nodes: hashbrown::HashMap<NodeID, Node>,
    revision: Revision,
}
impl Default for Graph {
    fn default() -> Self {
        Self {
            nodes: hashbrown::HashMap::new(),
            revision: Revision::new(),
        }
    }
}
/// Compares content only, see [`Node`]'s impl.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}
// Read access
impl Graph {
    #[must_use]
    pub fn get(&self, id: NodeID) -> Option<&Node> {
        self.nodes.get(&id)
    }
    #[must_use]
    pub fn contains(&self, id: NodeID) -> bool {
        self.nodes.contains_key(&id)
    }
    /// Iterate all nodes, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeID, &Node)> + '_ {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    /// The most recent mutation of the graph as a whole. Changes whenever anything does.
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }
    pub fn slot(&self, slot: SlotRef) -> Result<&Slot, GraphError> {
        self.nodes
            .get(&slot.node)
            .ok_or(GraphError::NodeNotFound(slot.node))?
            .slots
            .get(slot.slot)
            .ok_or(GraphError::SlotNotFound(slot))
    }
    /// Every connection in the graph, in arbitrary order.
    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.nodes.iter().flat_map(|(id, node)| {
            node.slots.iter().enumerate().filter_map(move |(idx, slot)| {
                Some(Connection {
                    from: slot.source()?,
                    to: SlotRef::new(*id, idx),
                })
            })
        })
    }
    /// Connections touching any slot of this node, inbound and outbound.
    #[must_use]
    pub fn connections_of(&self, id: NodeID) -> Vec<Connection> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        node.slots
            .iter()
            .enumerate()
            .flat_map(|(idx, slot)| {
                let here = SlotRef::new(id, idx);
                let inbound = slot.source().map(|from| Connection { from, to: here });
                let outbound = slot
                    .targets()
                    .iter()
                    .map(move |to| Connection { from: here, to: *to });
                inbound.into_iter().chain(outbound)
            })
            .collect()
    }
    /// Would a new edge from `from` to `to` close a loop?
    /// True if `from` is reachable going downstream from `to`, or if they're the same node.
    #[must_use]
    pub fn would_cycle(&self, from: NodeID, to: NodeID) -> bool {
        let mut visited = hashbrown::HashSet::new();
        let mut stack = vec![to];
        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(
                    node.slots
                        .iter()
                        .flat_map(Slot::targets)
                        .map(|target| target.node),
                );
            }
        }
        false
    }
    /// The node and everything it transitively depends on, dependencies first.
    ///
    /// None if the node doesn't exist.
    #[must_use]
    pub fn dependency_order(&self, output: NodeID) -> Option<Vec<NodeID>> {
        if !self.contains(output) {
            return None;
        }
        let mut order = Vec::new();
        let mut visited = hashbrown::HashSet::new();
        // (node, inputs already pushed)
        let mut stack = vec![(output, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            if let Some(node) = self.nodes.get(&id) {
                // Reverse, so the first input is visited first. Keeps the order stable run to run.
                let sources: SmallVec<[SlotRef; 2]> = node.input_sources().flatten().collect();
                stack.extend(
                    sources
                        .into_iter()
                        .rev()
                        .filter(|source| !visited.contains(&source.node))
                        .map(|source| (source.node, false)),
                );
            }
        }
        Some(order)
    }
}
// Mutation
impl Graph {
    /// Start a new mutation, returning its stamp.
    fn bump(&mut self) -> Revision {
        self.revision = Revision::new();
        self.revision
    }
    fn bump_node(&mut self, id: NodeID) {
        let revision = self.bump();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.revision = revision;
        }
    }
    /// Add an unconnected node. Does no pixel work.
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        editor_position: [f32; 2],
    ) -> NodeID {
        let id = NodeID::new();
        let node = Node::new(kind, name.into(), editor_position);
        self.bump();
        self.nodes.insert(id, node);
        id
    }
    /// Put a previously removed node back as it was. It must not carry connections.
    fn reinsert(&mut self, id: NodeID, mut node: Node) -> Result<(), Node> {
        if self.nodes.contains_key(&id) || node.is_connected() {
            return Err(node);
        }
        node.revision = self.bump();
        self.nodes.insert(id, node);
        Ok(())
    }
    /// Check every precondition of `connect` without changing anything.
    fn check_connect(&self, from: SlotRef, to: SlotRef) -> Result<(), GraphError> {
        let from_slot = self.slot(from)?;
        let to_slot = self.slot(to)?;
        if from_slot.direction() != Direction::Output || to_slot.direction() != Direction::Input {
            return Err(InvalidConnection::DirectionMismatch.into());
        }
        if from_slot.data_kind() != to_slot.data_kind() {
            return Err(InvalidConnection::TypeMismatch.into());
        }
        if to_slot.source().is_some() {
            return Err(InvalidConnection::SlotOccupied.into());
        }
        if self.would_cycle(from.node, to.node) {
            return Err(InvalidConnection::WouldCreateCycle.into());
        }
        Ok(())
    }
    /// Connect an output slot to an input slot.
    ///
    /// On error, the graph is unchanged.
    pub fn connect(&mut self, from: SlotRef, to: SlotRef) -> Result<(), GraphError> {
        self.connect_at(from, to, usize::MAX)
    }
    /// Connect, placing `to` at `fanout_index` among the output's targets (clamped to the end).
    pub(crate) fn connect_at(
        &mut self,
        from: SlotRef,
        to: SlotRef,
        fanout_index: usize,
    ) -> Result<(), GraphError> {
        self.check_connect(from, to)?;
        // Checked above, both exist and have the right peer shape.
        if let Some(Peer::Output(targets)) = self
            .nodes
            .get_mut(&from.node)
            .and_then(|node| node.slots.get_mut(from.slot))
            .map(|slot| &mut slot.peer)
        {
            targets.insert(fanout_index.min(targets.len()), to);
        }
        if let Some(Peer::Input(source)) = self
            .nodes
            .get_mut(&to.node)
            .and_then(|node| node.slots.get_mut(to.slot))
            .map(|slot| &mut slot.peer)
        {
            *source = Some(from);
        }
        self.bump_node(to.node);
        Ok(())
    }
    /// Remove the connection into this input slot, if there is one.
    /// Returns the removed connection and where the input sat among its source's targets.
    pub(crate) fn disconnect_indexed(
        &mut self,
        to: SlotRef,
    ) -> Result<Option<(Connection, usize)>, GraphError> {
        let Some(from) = self.slot(to)?.source() else {
            return Ok(None);
        };
        let mut fanout_index = 0;
        if let Some(Peer::Output(targets)) = self
            .nodes
            .get_mut(&from.node)
            .and_then(|node| node.slots.get_mut(from.slot))
            .map(|slot| &mut slot.peer)
        {
            if let Some(idx) = targets.iter().position(|target| *target == to) {
                targets.remove(idx);
                fanout_index = idx;
            }
        }
        if let Some(Peer::Input(source)) = self
            .nodes
            .get_mut(&to.node)
            .and_then(|node| node.slots.get_mut(to.slot))
            .map(|slot| &mut slot.peer)
        {
            *source = None;
        }
        self.bump_node(to.node);
        Ok(Some((Connection { from, to }, fanout_index)))
    }
    /// Remove the connection into this input slot. Not an error if there is none.
    pub fn disconnect(&mut self, to: SlotRef) -> Result<Option<Connection>, GraphError> {
        Ok(self
            .disconnect_indexed(to)?
            .map(|(connection, _)| connection))
    }
    /// Disconnect everything attached to a node, then remove it, handing it back.
    pub fn remove_node(&mut self, id: NodeID) -> Result<Node, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        for connection in self.connections_of(id) {
            self.disconnect(connection.to)?;
        }
        self.bump();
        self.nodes.remove(&id).ok_or(GraphError::NodeNotFound(id))
    }
    /// Remove a node that has no connections. Used when undoing its creation.
    fn remove_unconnected(&mut self, id: NodeID) -> Option<Node> {
        if self.nodes.get(&id)?.is_connected() {
            return None;
        }
        self.bump();
        self.nodes.remove(&id)
    }
    fn node_mut(&mut self, id: NodeID) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }
    /// Move a node in the editor, returning its old position.
    pub fn move_node(&mut self, id: NodeID, position: [f32; 2]) -> Result<[f32; 2], GraphError> {
        self.bump();
        let node = self.node_mut(id)?;
        Ok(std::mem::replace(&mut node.editor_position, position))
    }
    /// Rename a node, returning its old name.
    pub fn rename_node(
        &mut self,
        id: NodeID,
        name: impl Into<String>,
    ) -> Result<String, GraphError> {
        self.bump();
        let node = self.node_mut(id)?;
        Ok(std::mem::replace(&mut node.name, name.into()))
    }
    /// Swap in a whole new source image for a bitmap node, returning the old one.
    pub fn replace_bitmap(
        &mut self,
        id: NodeID,
        source: PixelBuffer,
    ) -> Result<PixelBuffer, GraphError> {
        let bitmap = self
            .node_mut(id)?
            .kind
            .as_bitmap_mut()
            .ok_or(GraphError::NotABitmap(id))?;
        let old = std::mem::replace(&mut bitmap.source, source);
        self.bump_node(id);
        Ok(old)
    }
    /// Paint `patch` over a region of a bitmap node's source, returning the pixels it covered.
    pub fn patch_bitmap(
        &mut self,
        id: NodeID,
        region: Rect,
        patch: &PixelBuffer,
    ) -> Result<PixelBuffer, GraphError> {
        let bitmap = self
            .node_mut(id)?
            .kind
            .as_bitmap_mut()
            .ok_or(GraphError::NotABitmap(id))?;
        // Both fallible steps happen before the swap.
        let covered = bitmap.source.extract(region)?;
        let painted = bitmap.source.patched(region, patch)?;
        bitmap.source = painted;
        self.bump_node(id);
        Ok(covered)
    }
}
