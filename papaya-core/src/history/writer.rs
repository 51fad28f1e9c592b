use crate::commands::{self, Command};
use crate::state::{document::BrushState, graph::Graph};

/// Any type which can sink commands.
pub trait CommandWrite<Command> {
    /// Inserts a command.
    fn write(&mut self, command: Command);
}
impl<Write, Command> CommandWrite<Command> for &mut Write
where
    Write: CommandWrite<Command>,
{
    fn write(&mut self, command: Command) {
        (**self).write(command);
    }
}
// Any subcommand that can be wrapped in Command can be written into any
// smallvec of Command.
impl<Subcommand, Array> CommandWrite<Subcommand> for smallvec::SmallVec<Array>
where
    Subcommand: Into<Command>,
    Array: smallvec::Array<Item = Command>,
{
    fn write(&mut self, command: Subcommand) {
        self.push(command.into());
    }
}

/// Records changes to a document for the duration of one edit. Created by
/// [`Document::write_with`](crate::state::document::Document::write_with).
///
/// When dropped, everything written becomes exactly one new snapshot in the history.
pub struct DocumentWriter<'a> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) history: &'a mut super::History<Command>,
    pub(crate) brush: &'a mut BrushState,
    // Optimize for exactly one command (the most common case)
    pub(crate) commands: smallvec::SmallVec<[Command; 1]>,
    /// Stroke start to remember alongside this edit, if the edit is part of a stroke.
    pub(crate) stroke_start: Option<[f32; 2]>,
}
// If this is leaked, the graph has changes that history doesn't know about. Undo will then
// refuse to apply rather than corrupt anything, since every command checks the state it finds.
impl Drop for DocumentWriter<'_> {
    fn drop(&mut self) {
        // Skip if nothing to write.
        if self.commands.is_empty() {
            return;
        }

        // We always write exactly one command - bundle into one if more!
        // If panic exit, write as a panic scope (even if the scope is just one command long)
        let command = if std::thread::panicking() {
            Command::Scope(
                commands::ScopeType::WritePanic,
                std::mem::take(&mut self.commands).into_boxed_slice(),
            )
        } else if self.commands.len() == 1 {
            let Some(command) = self.commands.pop() else {
                return;
            };
            command
        } else {
            Command::Scope(
                commands::ScopeType::Atoms,
                std::mem::take(&mut self.commands).into_boxed_slice(),
            )
        };

        let is_sub_rect = command.is_sub_rect();
        let stroke_start_uv = self.stroke_start.or(self.brush.stroke_anchor);
        self.brush.stroke_anchor = stroke_start_uv;

        log::trace!("Writing new command: {:#?}", command);
        self.history.commit(command, is_sub_rect, stroke_start_uv);
    }
}
impl DocumentWriter<'_> {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.commands.is_empty()
    }
    pub fn graph(
        &'_ mut self,
    ) -> crate::state::graph::writer::GraphWriter<'_, &mut smallvec::SmallVec<[Command; 1]>> {
        crate::state::graph::writer::GraphWriter::new(&mut self.commands, &mut *self.graph)
    }
    /// Mark this edit as part of a stroke that began at `uv`. Undoing to it later restores the anchor.
    pub fn set_stroke_start(&mut self, uv: [f32; 2]) {
        self.stroke_start = Some(uv);
    }
}
