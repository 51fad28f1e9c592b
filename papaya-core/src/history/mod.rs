//! # History
//!
//! Branching undo/redo. Every edit becomes a [`Snapshot`] in a tree, where undoing and then making a new edit
//! creates a branch rather than throwing away what was undone. "First child" is the oldest branch, "last child"
//! the most recent. Redo always follows the most recent branch, older ones are reachable with [`History::goto`].
//!
//! The history doesn't own the state it describes. Navigation walks the shortest path through the tree and
//! applies each command along it into whatever [`CommandConsumer`] is handed in.

pub mod writer;

use crate::commands::{self, CommandConsumer, CommandError, DoUndo};

/// Stable handle to a snapshot. Valid for the life of the [`History`] it came from, snapshots are never removed.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SnapshotId(slab_tree::NodeId);

/// One entry of the history.
#[derive(Clone, Debug)]
pub struct Snapshot<C> {
    /// The edit that led from the parent to this snapshot. None only for the root.
    command: Option<C>,
    is_sub_rect: bool,
    stroke_start_uv: Option<[f32; 2]>,
}
impl<C> Snapshot<C> {
    #[must_use]
    pub fn command(&self) -> Option<&C> {
        self.command.as_ref()
    }
    /// Whether the edit only touched a rectangle of one bitmap, letting viewers skip a full refresh.
    #[must_use]
    pub fn is_sub_rect(&self) -> bool {
        self.is_sub_rect
    }
    /// Where the in-progress stroke started at the moment this snapshot was taken.
    #[must_use]
    pub fn stroke_start_uv(&self) -> Option<[f32; 2]> {
        self.stroke_start_uv
    }
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.command.is_none()
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("snapshot {:?} not found", .0)]
    NotFound(SnapshotId),
    #[error("{}", .0)]
    Command(#[from] CommandError),
}

pub struct History<C> {
    /// Tree structure of snapshots, where undos create branches.
    tree: slab_tree::Tree<Snapshot<C>>,
    root: slab_tree::NodeId,
    // "Pointer" into the tree where the state currently sits.
    current: slab_tree::NodeId,
    len: usize,
}
impl<C> Default for History<C> {
    fn default() -> Self {
        let tree = slab_tree::TreeBuilder::new()
            .with_root(Snapshot {
                command: None,
                is_sub_rect: false,
                stroke_start_uv: None,
            })
            .build();
        // A built tree always has the root it was built with.
        let root = tree
            .root_id()
            .unwrap_or_else(|| unreachable!("tree built without a root"));
        Self {
            tree,
            root,
            current: root,
            len: 1,
        }
    }
}
// Read access
impl<C> History<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn root(&self) -> SnapshotId {
        SnapshotId(self.root)
    }
    #[must_use]
    pub fn current(&self) -> SnapshotId {
        SnapshotId(self.current)
    }
    /// Number of snapshots, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }
    /// A history always has its root, so is never empty. Here for the sake of clippy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
    #[must_use]
    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot<C>> {
        self.tree.get(id.0).map(|node| node.data())
    }
    #[must_use]
    pub fn current_snapshot(&self) -> &Snapshot<C> {
        // `current` always points at a live node, nothing is ever removed from the tree.
        self.tree
            .get(self.current)
            .map(|node| node.data())
            .unwrap_or_else(|| unreachable!("current snapshot missing from history"))
    }
    #[must_use]
    pub fn parent(&self, id: SnapshotId) -> Option<SnapshotId> {
        Some(SnapshotId(self.tree.get(id.0)?.parent()?.node_id()))
    }
    /// Children of a snapshot, oldest first. Empty if the snapshot doesn't exist.
    #[must_use]
    pub fn children(&self, id: SnapshotId) -> Vec<SnapshotId> {
        self.tree
            .get(id.0)
            .map(|node| node.children().map(|child| SnapshotId(child.node_id())).collect())
            .unwrap_or_default()
    }
    /// Every snapshot in depth-first pre-order from the root, oldest branches first, with its depth.
    pub fn depth_first(&self) -> impl Iterator<Item = (SnapshotId, usize, &Snapshot<C>)> + '_ {
        let mut stack = vec![(self.root, 0usize)];
        std::iter::from_fn(move || {
            let (id, depth) = stack.pop()?;
            let node = self.tree.get(id)?;
            // Push reversed so the oldest child pops first.
            let children: Vec<_> = node.children().map(|child| child.node_id()).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
            Some((SnapshotId(id), depth, node.data()))
        })
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.current != self.root
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.tree
            .get(self.current)
            .is_some_and(|node| node.last_child().is_some())
    }
}
// Mutation and navigation
impl<C> History<C> {
    /// Record an edit that has already been applied to the state, as the newest child of the current snapshot.
    /// The new snapshot becomes current.
    pub fn commit(
        &mut self,
        command: C,
        is_sub_rect: bool,
        stroke_start_uv: Option<[f32; 2]>,
    ) -> SnapshotId {
        let snapshot = Snapshot {
            command: Some(command),
            is_sub_rect,
            stroke_start_uv,
        };
        let Some(mut current) = self.tree.get_mut(self.current) else {
            // Never trimmed, so current is always present.
            unreachable!("current snapshot missing from history")
        };
        let new = current.append(snapshot).node_id();
        self.current = new;
        self.len += 1;
        SnapshotId(new)
    }
    /// Step back to the parent snapshot. Returns false if already at the root.
    pub fn undo<S>(&mut self, state: &mut S) -> Result<bool, HistoryError>
    where
        S: CommandConsumer<C> + ?Sized,
    {
        let Some(parent) = self.parent(self.current()) else {
            return Ok(false);
        };
        self.goto(parent, state)?;
        Ok(true)
    }
    /// Step forward into the most recent child. Returns false if there's nowhere to go.
    pub fn redo<S>(&mut self, state: &mut S) -> Result<bool, HistoryError>
    where
        S: CommandConsumer<C> + ?Sized,
    {
        let Some(newest) = self.children(self.current()).last().copied() else {
            return Ok(false);
        };
        self.goto(newest, state)?;
        Ok(true)
    }
    /// Move to any snapshot in the tree, undoing and redoing along the shortest path.
    ///
    /// If any command fails to apply, the ones already applied are reverted and `current` does not move.
    pub fn goto<S>(&mut self, id: SnapshotId, state: &mut S) -> Result<(), HistoryError>
    where
        S: CommandConsumer<C> + ?Sized,
    {
        let steps = traverse(&self.tree, self.current, id.0).map_err(|err| {
            log::warn!("can't navigate to {id:?}: {err}");
            HistoryError::NotFound(id)
        })?;
        // The root is never part of a path, so every step carries a command.
        let steps = steps.into_iter().filter_map(|step| match step {
            DoUndo::Do(snapshot) => snapshot.command.as_ref().map(DoUndo::Do),
            DoUndo::Undo(snapshot) => snapshot.command.as_ref().map(DoUndo::Undo),
        });
        commands::apply_all(state, steps).map_err(|err| {
            log::warn!("history navigation rejected by state: {err}");
            err
        })?;
        self.current = id.0;
        Ok(())
    }
}

/// The snapshot itself, then its parent, and so on up to the root.
fn lineage<T>(
    tree: &slab_tree::Tree<T>,
    id: slab_tree::NodeId,
) -> Result<Vec<slab_tree::NodeId>, TraverseError> {
    let node = tree.get(id).ok_or(TraverseError::NotFound)?;
    Ok(std::iter::once(id)
        .chain(node.ancestors().map(|ancestor| ancestor.node_id()))
        .collect())
}

/// Deepest snapshot that both `a` and `b` descend from. Either end counts as its own ancestor.
fn nearest_ancestor<T>(
    tree: &slab_tree::Tree<T>,
    a: slab_tree::NodeId,
    b: slab_tree::NodeId,
) -> Result<slab_tree::NodeId, TraverseError> {
    let above_a = lineage(tree, a)?;
    // Lineage runs bottom-up, so the first shared one is the deepest.
    lineage(tree, b)?
        .into_iter()
        .find(|id| above_a.contains(id))
        .ok_or(TraverseError::Disconnected)
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
enum TraverseError {
    #[error("can't traverse disconnected subtrees")]
    Disconnected,
    #[error("ID not present in tree")]
    NotFound,
}

/// Walk from `start` up to `ancestor`, exclusive. Every ID yielded is strictly below the ancestor.
fn path_up<T>(
    tree: &slab_tree::Tree<T>,
    start: slab_tree::NodeId,
    ancestor: slab_tree::NodeId,
) -> Vec<slab_tree::NodeId> {
    let mut path = Vec::new();
    let mut cur = start;
    while cur != ancestor {
        path.push(cur);
        match tree
            .get(cur)
            .and_then(|node| node.parent().map(|parent| parent.node_id()))
        {
            Some(parent) => cur = parent,
            // Ancestor was verified, can't run off the top.
            None => break,
        }
    }
    path
}

/// The shortest path between two snapshots, as the sequence of steps taken: undo each node on the way up to the
/// nearest common ancestor, then do each node on the way down.
fn traverse<T>(
    tree: &slab_tree::Tree<T>,
    start: slab_tree::NodeId,
    end: slab_tree::NodeId,
) -> Result<Vec<DoUndo<'_, T>>, TraverseError> {
    let ancestor = nearest_ancestor(tree, start, end)?;
    let up = path_up(tree, start, ancestor);
    let mut down = path_up(tree, end, ancestor);
    down.reverse();

    let data = |id: slab_tree::NodeId| tree.get(id).map(|node| node.data());
    Ok(up
        .into_iter()
        .filter_map(|id| data(id).map(DoUndo::Undo))
        .chain(down.into_iter().filter_map(|id| data(id).map(DoUndo::Do)))
        .collect())
}

#[cfg(test)]
mod path_test {
    use super::{nearest_ancestor, traverse, History, SnapshotId};
    use crate::commands::DoUndo;

    /// Edits on three branches. Numbers are the commands, `root` has none.
    ///```ignore
    ///        root
    ///        /  \
    ///      10    50
    ///     /  \     \
    ///   20    30    60
    ///         |
    ///         40
    struct Branches {
        history: History<i64>,
        ids: hashbrown::HashMap<i64, SnapshotId>,
    }
    impl Branches {
        fn new() -> Self {
            let mut history = History::new();
            let mut ids = hashbrown::HashMap::new();
            let root = history.root();
            let edits = [
                (None, 10),
                (Some(10), 20),
                (Some(10), 30),
                (Some(30), 40),
                (None, 50),
                (Some(50), 60),
            ];
            for (parent, command) in edits {
                // Jump the cursor directly, these tests only look at the shape.
                history.current = parent.map_or(root, |parent| ids[&parent]).0;
                ids.insert(command, history.commit(command, false, None));
            }
            Self { history, ids }
        }
        fn id(&self, command: i64) -> slab_tree::NodeId {
            self.ids[&command].0
        }
        /// Commands met walking from one snapshot to another, root as 0.
        fn walk(&self, from: i64, to: i64) -> Vec<DoUndo<'_, i64>> {
            let lookup = |command: i64| {
                if command == 0 {
                    self.history.root
                } else {
                    self.id(command)
                }
            };
            traverse(&self.history.tree, lookup(from), lookup(to))
                .unwrap()
                .into_iter()
                .filter_map(|step| match step {
                    DoUndo::Do(snapshot) => snapshot.command.as_ref().map(DoUndo::Do),
                    DoUndo::Undo(snapshot) => snapshot.command.as_ref().map(DoUndo::Undo),
                })
                .collect()
        }
    }

    #[test]
    fn common_ancestor() {
        let branches = Branches::new();
        let tree = &branches.history.tree;
        let ancestor = |a, b| nearest_ancestor(tree, branches.id(a), branches.id(b)).unwrap();

        assert_eq!(ancestor(20, 40), branches.id(10));
        assert_eq!(ancestor(40, 20), branches.id(10));
        assert_eq!(ancestor(40, 60), branches.history.root);
        // One end above the other.
        assert_eq!(ancestor(30, 40), branches.id(30));
        assert_eq!(ancestor(60, 50), branches.id(50));
        assert_eq!(ancestor(20, 20), branches.id(20));
    }
    #[test]
    fn walks() {
        let branches = Branches::new();
        // Across siblings.
        assert_eq!(
            branches.walk(20, 40),
            vec![DoUndo::Undo(&20), DoUndo::Do(&30), DoUndo::Do(&40)]
        );
        // Across the root, up one branch and down another.
        assert_eq!(
            branches.walk(40, 60),
            vec![
                DoUndo::Undo(&40),
                DoUndo::Undo(&30),
                DoUndo::Undo(&10),
                DoUndo::Do(&50),
                DoUndo::Do(&60),
            ]
        );
        // Straight up, and straight down.
        assert_eq!(branches.walk(60, 0), vec![DoUndo::Undo(&60), DoUndo::Undo(&50)]);
        assert_eq!(
            branches.walk(0, 40),
            vec![DoUndo::Do(&10), DoUndo::Do(&30), DoUndo::Do(&40)]
        );
        assert!(branches.walk(30, 30).is_empty());
    }
}
