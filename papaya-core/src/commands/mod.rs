//! # Commands
//!
//! Commands are the deltas recorded into a document's [history](crate::history). Every change to the graph
//! made through a [writer](crate::history::writer) is recorded as a command, and every command can be
//! applied forwards ("do") or backwards ("undo") against the state it was recorded from.

pub use crate::state::graph::commands::Command as GraphCommand;

use crate::state::graph::Graph;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("command constructed for a state that does not match the current state")]
    MismatchedState,
    #[error("resource referenced by the command is not found")]
    UnknownResource,
}
pub trait CommandConsumer<C> {
    /// Apply a single command. If this generates an error,
    /// the state of `self` should *not* be observably changed.
    fn apply(&mut self, command: DoUndo<'_, C>) -> Result<(), CommandError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeType {
    /// Commands are grouped because they were individual parts of a single, larger edit.
    Atoms,
    /// A writer panicked mid-edit. The commands may be an incomplete operation,
    /// but they did happen, so they're kept to keep history and state in sync.
    WritePanic,
}

#[derive(Clone, Debug)]
pub enum Command {
    Graph(GraphCommand),
    /// Many commands bundled into one history entry. Undone in reverse order.
    Scope(ScopeType, Box<[Command]>),
}
impl From<GraphCommand> for Command {
    fn from(value: GraphCommand) -> Self {
        Self::Graph(value)
    }
}
impl Command {
    #[must_use]
    pub fn graph(&self) -> Option<&GraphCommand> {
        match self {
            Self::Graph(c) => Some(c),
            Self::Scope(..) => None,
        }
    }
    /// Iterate this command, or every command in the scope recursively, in "do" order.
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &GraphCommand> + '_> {
        match self {
            Self::Graph(c) => Box::new(std::iter::once(c)),
            Self::Scope(_, commands) => Box::new(commands.iter().flat_map(Command::flatten)),
        }
    }
    /// Whether this command only touches a rectangular region of some bitmap's pixels.
    #[must_use]
    pub fn is_sub_rect(&self) -> bool {
        let mut commands = self.flatten().peekable();
        commands.peek().is_some()
            && commands.all(|command| matches!(command, GraphCommand::BitmapPainted { .. }))
    }
}

#[derive(PartialEq, Eq, Debug)]
pub enum DoUndo<'c, T> {
    Do(&'c T),
    Undo(&'c T),
}
// Manual impls, derive would needlessly require `T: Copy`
impl<T> Clone for DoUndo<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for DoUndo<'_, T> {}
impl<'c, T> DoUndo<'c, T> {
    /// The action that reverts this one.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::Do(c) => Self::Undo(c),
            Self::Undo(c) => Self::Do(c),
        }
    }
}

/// Apply each step in order. On failure, steps already taken are reverted so the consumer is left
/// as it was found.
pub(crate) fn apply_all<'c, C, S>(
    state: &mut S,
    steps: impl IntoIterator<Item = DoUndo<'c, C>>,
) -> Result<(), CommandError>
where
    C: 'c,
    S: CommandConsumer<C> + ?Sized,
{
    let mut applied = smallvec::SmallVec::<[DoUndo<'c, C>; 4]>::new();
    for step in steps {
        if let Err(err) = state.apply(step) {
            for done in applied.into_iter().rev() {
                if state.apply(done.inverse()).is_err() {
                    // Nothing sensible left to do, the state no longer matches anything we know about.
                    log::error!("failed to roll back partially applied commands");
                    break;
                }
            }
            return Err(err);
        }
        applied.push(step);
    }
    Ok(())
}

impl CommandConsumer<Command> for Graph {
    fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
        match command {
            DoUndo::Do(Command::Graph(command)) => {
                CommandConsumer::<GraphCommand>::apply(self, DoUndo::Do(command))
            }
            DoUndo::Undo(Command::Graph(command)) => {
                CommandConsumer::<GraphCommand>::apply(self, DoUndo::Undo(command))
            }
            // Do each of the commands in the scope, in order.
            DoUndo::Do(Command::Scope(_, commands)) => {
                apply_all::<Command, _>(self, commands.iter().map(DoUndo::Do))
            }
            // Undo each of the commands of the scope, in reverse order.
            DoUndo::Undo(Command::Scope(_, commands)) => {
                apply_all::<Command, _>(self, commands.iter().rev().map(DoUndo::Undo))
            }
        }
    }
}
