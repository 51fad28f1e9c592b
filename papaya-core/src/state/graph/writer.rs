use super::{commands::Command, Connection, Graph, GraphError, Node, NodeID, NodeKind, SlotRef};
use crate::history::writer::CommandWrite;
use crate::pixels::{PixelBuffer, Rect};

/// Mutable access to a graph that records every change it makes as a [`Command`].
///
/// Changes are only recorded once they've succeeded, so a failed call writes nothing.
pub struct GraphWriter<'a, Write: CommandWrite<Command>> {
    writer: Write,
    graph: &'a mut Graph,
}
impl<'a, Write: CommandWrite<Command>> std::ops::Deref for GraphWriter<'a, Write> {
    type Target = Graph;
    fn deref(&self) -> &Self::Target {
        &*self.graph
    }
}
impl<'a, Write: CommandWrite<Command>> GraphWriter<'a, Write> {
    pub fn new(writer: Write, graph: &'a mut Graph) -> Self {
        Self { writer, graph }
    }
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        editor_position: [f32; 2],
    ) -> NodeID {
        let target = self.graph.create_node(kind, name, editor_position);
        if let Some(node) = self.graph.get(target) {
            self.writer.write(Command::NodeCreated {
                target,
                node: node.clone(),
            });
        }
        target
    }
    pub fn connect(&mut self, from: SlotRef, to: SlotRef) -> Result<(), GraphError> {
        self.graph.connect(from, to)?;
        self.writer.write(Command::Connected { from, to });
        Ok(())
    }
    pub fn disconnect(&mut self, to: SlotRef) -> Result<Option<Connection>, GraphError> {
        let Some((connection, fanout_index)) = self.graph.disconnect_indexed(to)? else {
            return Ok(None);
        };
        self.writer.write(Command::Disconnected {
            from: connection.from,
            to: connection.to,
            fanout_index,
        });
        Ok(Some(connection))
    }
    /// Cut every connection of the node, then remove it. Records one command per cut connection plus the
    /// removal itself, so use within a single write to keep them as one history entry.
    pub fn remove_node(&mut self, target: NodeID) -> Result<Node, GraphError> {
        if !self.graph.contains(target) {
            return Err(GraphError::NodeNotFound(target));
        }
        for connection in self.graph.connections_of(target) {
            self.disconnect(connection.to)?;
        }
        let node = self
            .graph
            .remove_unconnected(target)
            .ok_or(GraphError::NodeNotFound(target))?;
        self.writer.write(Command::NodeRemoved {
            target,
            node: node.clone(),
        });
        Ok(node)
    }
    pub fn move_node(&mut self, target: NodeID, to: [f32; 2]) -> Result<(), GraphError> {
        let from = self.graph.move_node(target, to)?;
        self.writer.write(Command::NodeMoved { target, from, to });
        Ok(())
    }
    pub fn rename_node(
        &mut self,
        target: NodeID,
        name: impl Into<String>,
    ) -> Result<(), GraphError> {
        let to = name.into();
        let from = self.graph.rename_node(target, to.clone())?;
        self.writer.write(Command::NodeRenamed { target, from, to });
        Ok(())
    }
    pub fn replace_bitmap(&mut self, target: NodeID, to: PixelBuffer) -> Result<(), GraphError> {
        let from = self.graph.replace_bitmap(target, to.clone())?;
        self.writer
            .write(Command::BitmapReplaced { target, from, to });
        Ok(())
    }
    /// Paint `patch` over `region` of a bitmap's source.
    pub fn paint_bitmap(
        &mut self,
        target: NodeID,
        region: Rect,
        patch: &PixelBuffer,
    ) -> Result<(), GraphError> {
        let before = self.graph.patch_bitmap(target, region, patch)?;
        self.writer.write(Command::BitmapPainted {
            target,
            region,
            before,
            after: patch.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commands::{CommandConsumer, DoUndo};
    use crate::pixels::Rgba8;

    type Recorded = smallvec::SmallVec<[crate::commands::Command; 4]>;

    #[test]
    fn records_only_success() {
        let mut graph = Graph::default();
        let mut commands = Recorded::new();
        let mut writer = GraphWriter::new(&mut commands, &mut graph);
        let a = writer.create_node(NodeKind::InvertColor, "A", [0.0; 2]);
        let b = writer.create_node(NodeKind::InvertColor, "B", [0.0; 2]);
        writer
            .connect(SlotRef::new(a, 1), SlotRef::new(b, 0))
            .unwrap();
        assert!(writer
            .connect(SlotRef::new(b, 1), SlotRef::new(a, 0))
            .is_err());
        assert!(writer.move_node(NodeID::new(), [1.0; 2]).is_err());
        assert_eq!(commands.len(), 3);
    }
    #[test]
    fn remove_node_undoes_exactly() {
        let mut graph = Graph::default();
        let white = PixelBuffer::filled(2, 2, Rgba8::WHITE).unwrap();
        let bitmap = graph.create_node(NodeKind::bitmap(white), "Base image", [0.0; 2]);
        let a = graph.create_node(NodeKind::InvertColor, "A", [0.0; 2]);
        let b = graph.create_node(NodeKind::InvertColor, "B", [0.0; 2]);
        let c = graph.create_node(NodeKind::InvertColor, "C", [0.0; 2]);
        for node in [a, c] {
            graph
                .connect(SlotRef::new(bitmap, 0), SlotRef::new(node, 0))
                .unwrap();
        }
        graph
            .connect(SlotRef::new(a, 1), SlotRef::new(b, 0))
            .unwrap();
        let before = graph.clone();

        let mut commands = Recorded::new();
        GraphWriter::new(&mut commands, &mut graph)
            .remove_node(a)
            .unwrap();
        assert!(!graph.contains(a));
        assert_eq!(graph.connections().count(), 1);

        for command in commands.iter().rev() {
            CommandConsumer::<crate::commands::Command>::apply(&mut graph, DoUndo::Undo(command))
                .unwrap();
        }
        assert_eq!(graph, before);
        assert_eq!(
            graph.slot(SlotRef::new(bitmap, 0)).unwrap().targets(),
            &[SlotRef::new(a, 0), SlotRef::new(c, 0)]
        );
    }
}
