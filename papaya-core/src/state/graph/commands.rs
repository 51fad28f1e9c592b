use super::{Graph, GraphError, Node, NodeID, SlotRef};
use crate::commands::{CommandConsumer, CommandError, DoUndo};
use crate::pixels::{PixelBuffer, Rect};

#[derive(Clone, Debug)]
pub enum Command {
    NodeCreated {
        target: NodeID,
        /// The node as created, unconnected.
        node: Node,
    },
    /// Node removed. Its connections were already cut by preceding `Disconnected` commands.
    NodeRemoved {
        target: NodeID,
        node: Node,
    },
    Connected {
        from: SlotRef,
        to: SlotRef,
    },
    Disconnected {
        from: SlotRef,
        to: SlotRef,
        /// Where `to` sat among `from`'s targets, so undo puts it back in the same place.
        fanout_index: usize,
    },
    NodeMoved {
        target: NodeID,
        from: [f32; 2],
        to: [f32; 2],
    },
    NodeRenamed {
        target: NodeID,
        from: String,
        to: String,
    },
    /// A rectangle of a bitmap's source was painted over.
    BitmapPainted {
        target: NodeID,
        region: Rect,
        /// Pixels of the region before painting, `region`-sized.
        before: PixelBuffer,
        /// Pixels of the region after painting, `region`-sized.
        after: PixelBuffer,
    },
    BitmapReplaced {
        target: NodeID,
        from: PixelBuffer,
        to: PixelBuffer,
    },
}

impl From<GraphError> for CommandError {
    fn from(value: GraphError) -> Self {
        match value {
            GraphError::NodeNotFound(_) => Self::UnknownResource,
            _ => Self::MismatchedState,
        }
    }
}

impl Graph {
    fn create_from_command(&mut self, target: NodeID, node: &Node) -> Result<(), CommandError> {
        self.reinsert(target, node.clone())
            .map_err(|_| CommandError::MismatchedState)
    }
    fn remove_from_command(&mut self, target: NodeID, node: &Node) -> Result<(), CommandError> {
        let Some(current) = self.get(target) else {
            return Err(CommandError::UnknownResource);
        };
        if current != node {
            return Err(CommandError::MismatchedState);
        }
        self.remove_unconnected(target)
            .map(|_| ())
            .ok_or(CommandError::MismatchedState)
    }
    fn connect_from_command(
        &mut self,
        from: SlotRef,
        to: SlotRef,
        fanout_index: usize,
    ) -> Result<(), CommandError> {
        // `connect_at` checks everything before touching anything.
        self.connect_at(from, to, fanout_index)
            .map_err(Into::into)
    }
    fn disconnect_from_command(&mut self, from: SlotRef, to: SlotRef) -> Result<(), CommandError> {
        if self.slot(to)?.source() != Some(from) {
            return Err(CommandError::MismatchedState);
        }
        self.disconnect(to)?;
        Ok(())
    }
    fn paint_from_command(
        &mut self,
        target: NodeID,
        region: Rect,
        expected: &PixelBuffer,
        patch: &PixelBuffer,
    ) -> Result<(), CommandError> {
        let source = self
            .get(target)
            .ok_or(CommandError::UnknownResource)?
            .kind()
            .as_bitmap()
            .ok_or(CommandError::MismatchedState)?
            .source();
        if source.extract(region).ok().as_ref() != Some(expected) {
            return Err(CommandError::MismatchedState);
        }
        self.patch_bitmap(target, region, patch)?;
        Ok(())
    }
    fn replace_from_command(
        &mut self,
        target: NodeID,
        from: &PixelBuffer,
        to: &PixelBuffer,
    ) -> Result<(), CommandError> {
        let source = self
            .get(target)
            .ok_or(CommandError::UnknownResource)?
            .kind()
            .as_bitmap()
            .ok_or(CommandError::MismatchedState)?
            .source();
        if source != from {
            return Err(CommandError::MismatchedState);
        }
        self.replace_bitmap(target, to.clone())?;
        Ok(())
    }
}

impl CommandConsumer<Command> for Graph {
    fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
        match command {
            DoUndo::Do(Command::NodeCreated { target, node })
            | DoUndo::Undo(Command::NodeRemoved { target, node }) => {
                self.create_from_command(*target, node)
            }
            DoUndo::Undo(Command::NodeCreated { target, node })
            | DoUndo::Do(Command::NodeRemoved { target, node }) => {
                self.remove_from_command(*target, node)
            }
            DoUndo::Do(Command::Connected { from, to }) => {
                self.connect_from_command(*from, *to, usize::MAX)
            }
            DoUndo::Undo(Command::Disconnected {
                from,
                to,
                fanout_index,
            }) => self.connect_from_command(*from, *to, *fanout_index),
            DoUndo::Undo(Command::Connected { from, to })
            | DoUndo::Do(Command::Disconnected { from, to, .. }) => {
                self.disconnect_from_command(*from, *to)
            }
            DoUndo::Do(Command::NodeMoved { target, from, to })
            | DoUndo::Undo(Command::NodeMoved {
                target,
                from: to,
                to: from,
            }) => {
                let node = self.node_mut(*target)?;
                if !super::same_position(node.editor_position, *from) {
                    return Err(CommandError::MismatchedState);
                }
                self.move_node(*target, *to)?;
                Ok(())
            }
            DoUndo::Do(Command::NodeRenamed { target, from, to })
            | DoUndo::Undo(Command::NodeRenamed {
                target,
                from: to,
                to: from,
            }) => {
                if self.node_mut(*target)?.name != *from {
                    return Err(CommandError::MismatchedState);
                }
                self.rename_node(*target, to.clone())?;
                Ok(())
            }
            DoUndo::Do(Command::BitmapPainted {
                target,
                region,
                before,
                after,
            })
            | DoUndo::Undo(Command::BitmapPainted {
                target,
                region,
                before: after,
                after: before,
            }) => self.paint_from_command(*target, *region, before, after),
            DoUndo::Do(Command::BitmapReplaced { target, from, to })
            | DoUndo::Undo(Command::BitmapReplaced {
                target,
                from: to,
                to: from,
            }) => self.replace_from_command(*target, from, to),
        }
    }
}
