use std::sync::Arc;

use super::graph::{Connection, Graph, GraphError, Node, NodeID, NodeKind, SlotRef};
use crate::commands::Command;
use crate::eval::{
    background::{BackgroundEvaluator, PendingEvaluation},
    EvalError, Evaluator,
};
use crate::history::{writer::DocumentWriter, History, HistoryError, SnapshotId};
use crate::pixels::{PixelBuffer, Rect};

pub type DocumentID = crate::PapayaID<Document>;

/// Brush state that lives with the document's history.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BrushState {
    /// Where the stroke being drawn started, in canvas uv. Restored by undo and redo.
    pub stroke_anchor: Option<[f32; 2]>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
/// How the canvas is shown on screen.
pub struct Viewport {
    /// Size of the canvas, in image pixels.
    pub canvas_size: [u32; 2],
    /// Screen pixels per image pixel.
    pub zoom: f32,
    /// Where the top-left corner of the canvas sits on screen.
    pub pan: [f32; 2],
}
impl Viewport {
    pub const MIN_ZOOM: f32 = 0.01;
    pub const MAX_ZOOM: f32 = 32.0;
    /// Size of the canvas on screen, in whole pixels. Never zero.
    #[must_use]
    pub fn viewport_size(&self) -> [u32; 2] {
        self.canvas_size
            .map(|size| (size as f32 * self.zoom).round().max(1.0) as u32)
    }
    /// Map a screen position to canvas uv. The position is snapped to the image pixel under it first.
    #[must_use]
    pub fn screen_to_uv(&self, screen: [f32; 2]) -> [f32; 2] {
        std::array::from_fn(|axis| {
            let pixel = ((screen[axis] - self.pan[axis]) / self.zoom).floor();
            pixel / self.canvas_size[axis] as f32
        })
    }
    /// Set zoom about the top-left corner of the canvas, clamped to [`Self::MIN_ZOOM`]..=[`Self::MAX_ZOOM`].
    /// Non-finite zoom is ignored.
    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        }
    }
    /// Change zoom, keeping the canvas point under `anchor` (screen space) where it is.
    /// Zoom is clamped to [`Self::MIN_ZOOM`]..=[`Self::MAX_ZOOM`].
    pub fn zoom_about(&mut self, zoom: f32, anchor: [f32; 2]) {
        let zoom = zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        let ratio = zoom / self.zoom;
        self.pan = std::array::from_fn(|axis| anchor[axis] - (anchor[axis] - self.pan[axis]) * ratio);
        self.zoom = zoom;
    }
}
impl Default for Viewport {
    fn default() -> Self {
        Self {
            canvas_size: [1080; 2],
            zoom: 1.0,
            pan: [0.0; 2],
        }
    }
}

/// An open document: the graph, everything that was done to it, and how it's being looked at.
pub struct Document {
    id: DocumentID,
    /// Name of the document, generated if not given.
    pub name: String,
    pub viewport: Viewport,
    graph: Graph,
    history: History<Command>,
    brush: BrushState,
    evaluator: Arc<Evaluator>,
    background: BackgroundEvaluator,
}
impl Default for Document {
    fn default() -> Self {
        Self::with_graph(Graph::default())
    }
}
impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Open a document from an existing graph, with no history.
    #[must_use]
    pub fn with_graph(graph: Graph) -> Self {
        let evaluator = Arc::new(Evaluator::new());
        Self {
            id: DocumentID::new(),
            name: "New Document".into(),
            viewport: Viewport::default(),
            graph,
            history: History::new(),
            brush: BrushState::default(),
            background: BackgroundEvaluator::new(evaluator.clone()),
            evaluator,
        }
    }
    #[must_use]
    pub fn id(&self) -> DocumentID {
        self.id
    }
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
    #[must_use]
    pub fn history(&self) -> &History<Command> {
        &self.history
    }
    #[must_use]
    pub fn brush(&self) -> BrushState {
        self.brush
    }
    #[must_use]
    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }
    /// Make changes during the span of the closure, where each modification of the graph is tracked.
    /// Everything written becomes a single history entry, written as an Atoms scope if there's more than one
    /// change. Nothing is recorded if nothing changed.
    pub fn write_with<F, T>(&mut self, write: F) -> T
    where
        F: FnOnce(&mut DocumentWriter<'_>) -> T,
    {
        let mut writer = DocumentWriter {
            graph: &mut self.graph,
            history: &mut self.history,
            brush: &mut self.brush,
            commands: smallvec::SmallVec::new(),
            stroke_start: None,
        };
        // Panic safe - the writer's Drop impl records whatever happened, keeping history and graph in sync.
        write(&mut writer)
    }
}
// One-shot edits, each its own history entry.
impl Document {
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        editor_position: [f32; 2],
    ) -> NodeID {
        self.write_with(|writer| writer.graph().create_node(kind, name, editor_position))
    }
    pub fn connect(&mut self, from: SlotRef, to: SlotRef) -> Result<(), GraphError> {
        self.write_with(|writer| writer.graph().connect(from, to))
    }
    pub fn disconnect(&mut self, to: SlotRef) -> Result<Option<Connection>, GraphError> {
        self.write_with(|writer| writer.graph().disconnect(to))
    }
    /// Remove a node and all of its connections, as one history entry.
    pub fn remove_node(&mut self, id: NodeID) -> Result<Node, GraphError> {
        self.write_with(|writer| writer.graph().remove_node(id))
    }
    pub fn move_node(&mut self, id: NodeID, position: [f32; 2]) -> Result<(), GraphError> {
        self.write_with(|writer| writer.graph().move_node(id, position))
    }
    pub fn rename_node(&mut self, id: NodeID, name: impl Into<String>) -> Result<(), GraphError> {
        self.write_with(|writer| writer.graph().rename_node(id, name))
    }
    pub fn replace_bitmap(&mut self, id: NodeID, source: PixelBuffer) -> Result<(), GraphError> {
        self.write_with(|writer| writer.graph().replace_bitmap(id, source))
    }
    /// Paint one segment of a stroke into a bitmap node. Recorded as a sub-rect entry, remembering where the
    /// stroke started so undo can put the brush back there.
    pub fn paint_stroke(
        &mut self,
        id: NodeID,
        region: Rect,
        patch: &PixelBuffer,
        stroke_start_uv: [f32; 2],
    ) -> Result<(), GraphError> {
        self.write_with(|writer| {
            writer.set_stroke_start(stroke_start_uv);
            writer.graph().paint_bitmap(id, region, patch)
        })
    }
}
// History navigation
impl Document {
    /// Step back one entry. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, HistoryError> {
        let moved = self.history.undo(&mut self.graph)?;
        self.restore_brush();
        Ok(moved)
    }
    /// Step forward along the most recent branch. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool, HistoryError> {
        let moved = self.history.redo(&mut self.graph)?;
        self.restore_brush();
        Ok(moved)
    }
    /// Jump to any entry, on any branch.
    pub fn goto(&mut self, id: SnapshotId) -> Result<(), HistoryError> {
        self.history.goto(id, &mut self.graph)?;
        self.restore_brush();
        Ok(())
    }
    fn restore_brush(&mut self) {
        self.brush.stroke_anchor = self.history.current_snapshot().stroke_start_uv();
    }
}
// Evaluation
impl Document {
    pub fn evaluate(
        &self,
        output: NodeID,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, EvalError> {
        self.evaluator.evaluate(&self.graph, output, width, height)
    }
    /// Evaluate at the size the canvas currently takes on screen.
    pub fn evaluate_viewport(&self, output: NodeID) -> Result<PixelBuffer, EvalError> {
        let [width, height] = self.viewport.viewport_size();
        self.evaluate(output, width, height)
    }
    /// Evaluate on a worker thread, over the graph as it is right now. Later edits don't affect the result.
    pub fn evaluate_in_background(
        &self,
        output: NodeID,
        width: u32,
        height: u32,
    ) -> PendingEvaluation {
        // Pixel data is shared, so forking the graph only copies the node table.
        let fork = Arc::new(self.graph.clone());
        self.background.request(fork, output, width, height)
    }
    /// Drop cached results of nodes no longer in the graph.
    pub fn trim_cache(&self) {
        self.evaluator.retain_nodes(&self.graph);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::commands::ScopeType;
    use crate::pixels::Rgba8;

    const RED: Rgba8 = Rgba8::new(255, 0, 0, 255);
    const CYAN: Rgba8 = Rgba8::new(0, 255, 255, 255);

    fn bitmap_and_invert(document: &mut Document) -> (NodeID, NodeID) {
        let red = PixelBuffer::filled(4, 4, RED).unwrap();
        let bitmap = document.create_node(NodeKind::bitmap(red), "Base image", [108.0, 158.0]);
        let invert = document.create_node(NodeKind::InvertColor, "Color inversion", [108.0, 108.0]);
        document
            .connect(SlotRef::new(bitmap, 0), SlotRef::new(invert, 0))
            .unwrap();
        (bitmap, invert)
    }

    #[test]
    fn red_through_invert() {
        let mut document = Document::new();
        let (_, invert) = bitmap_and_invert(&mut document);
        let out = document.evaluate(invert, 4, 4).unwrap();
        assert!(out.pixels().iter().all(|px| *px == CYAN));
        assert_eq!(document.history().len(), 4);
    }
    #[test]
    fn round_trip() {
        let mut document = Document::new();
        let mut states = vec![document.graph().clone()];
        let (bitmap, invert) = bitmap_and_invert(&mut document);
        states.push(document.graph().clone());
        document.move_node(invert, [5.0, 5.0]).unwrap();
        states.push(document.graph().clone());
        document.rename_node(bitmap, "Background").unwrap();
        states.push(document.graph().clone());
        document
            .replace_bitmap(bitmap, PixelBuffer::filled(2, 2, Rgba8::WHITE).unwrap())
            .unwrap();
        states.push(document.graph().clone());
        document.remove_node(invert).unwrap();
        states.push(document.graph().clone());

        // Three edits inside `bitmap_and_invert`, only the final state of those was kept.
        for _ in 0..4 {
            document.undo().unwrap();
        }
        assert_eq!(document.graph(), &states[1]);
        for _ in 0..3 {
            document.undo().unwrap();
        }
        assert_eq!(document.graph(), &states[0]);
        assert!(!document.undo().unwrap());

        for _ in 0..3 {
            document.redo().unwrap();
        }
        assert_eq!(document.graph(), &states[1]);
        for expected in &states[2..] {
            assert!(document.redo().unwrap());
            assert_eq!(document.graph(), expected);
        }
        assert!(!document.redo().unwrap());
    }
    #[test]
    fn pixels_follow_history() {
        let mut document = Document::new();
        let (bitmap, invert) = bitmap_and_invert(&mut document);
        let before = document.evaluate(invert, 4, 4).unwrap();
        document
            .replace_bitmap(bitmap, PixelBuffer::filled(4, 4, Rgba8::WHITE).unwrap())
            .unwrap();
        let after = document.evaluate(invert, 4, 4).unwrap();
        assert_ne!(before, after);

        document.undo().unwrap();
        assert_eq!(document.evaluate(invert, 4, 4).unwrap(), before);
        document.redo().unwrap();
        assert_eq!(document.evaluate(invert, 4, 4).unwrap(), after);
    }
    #[test]
    fn branches_are_kept() {
        let mut document = Document::new();
        let (_, invert) = bitmap_and_invert(&mut document);
        document.move_node(invert, [1.0, 1.0]).unwrap();
        let first = document.history().current();
        document.undo().unwrap();
        document.move_node(invert, [2.0, 2.0]).unwrap();
        let second = document.history().current();

        document.undo().unwrap();
        document.redo().unwrap();
        // Redo follows the newest branch.
        assert_eq!(document.history().current(), second);
        assert_eq!(document.graph().get(invert).unwrap().editor_position, [2.0, 2.0]);

        document.goto(first).unwrap();
        assert_eq!(document.graph().get(invert).unwrap().editor_position, [1.0, 1.0]);
        let parent = document.history().parent(first).unwrap();
        assert_eq!(document.history().children(parent), vec![first, second]);
    }
    #[test]
    fn stroke_undo_is_exact() {
        let mut document = Document::new();
        let (bitmap, invert) = bitmap_and_invert(&mut document);
        let before_graph = document.graph().clone();
        let before_pixels = document.evaluate(invert, 4, 4).unwrap();

        let dab = PixelBuffer::filled(2, 2, Rgba8::WHITE).unwrap();
        document
            .paint_stroke(bitmap, Rect::new(1, 1, 2, 2), &dab, [0.25, 0.25])
            .unwrap();
        document
            .paint_stroke(bitmap, Rect::new(2, 2, 2, 2), &dab, [0.25, 0.25])
            .unwrap();
        let current = document.history().current_snapshot();
        assert!(current.is_sub_rect());
        assert_eq!(current.stroke_start_uv(), Some([0.25, 0.25]));
        assert_eq!(
            document.evaluate(invert, 4, 4).unwrap().get(3, 3),
            Some(Rgba8::new(0, 0, 0, 255))
        );

        document.undo().unwrap();
        document.undo().unwrap();
        assert_eq!(document.graph(), &before_graph);
        assert_eq!(document.evaluate(invert, 4, 4).unwrap(), before_pixels);

        // Painting out of bounds records nothing.
        let len = document.history().len();
        assert!(document
            .paint_stroke(bitmap, Rect::new(3, 3, 2, 2), &dab, [0.0, 0.0])
            .is_err());
        assert_eq!(document.history().len(), len);
    }
    #[test]
    fn nan_positions_round_trip() {
        let mut document = Document::new();
        let lost = document.create_node(NodeKind::InvertColor, "Lost", [f32::NAN, 0.0]);
        let other = document.create_node(NodeKind::InvertColor, "Other", [0.0; 2]);
        document.move_node(other, [f32::NAN, 1.0]).unwrap();

        assert!(document.undo().unwrap());
        assert_eq!(document.graph().get(other).unwrap().editor_position, [0.0; 2]);
        assert!(document.undo().unwrap());
        assert!(document.undo().unwrap());
        assert!(document.graph().is_empty());

        assert!(document.redo().unwrap());
        assert!(document.graph().get(lost).unwrap().editor_position[0].is_nan());
        assert!(document.redo().unwrap());
        assert!(document.redo().unwrap());
        assert!(document.graph().get(other).unwrap().editor_position[0].is_nan());
    }
    #[test]
    fn brush_anchor_follows_history() {
        let mut document = Document::new();
        let (bitmap, _) = bitmap_and_invert(&mut document);
        let dab = PixelBuffer::filled(1, 1, Rgba8::WHITE).unwrap();
        document
            .paint_stroke(bitmap, Rect::new(0, 0, 1, 1), &dab, [0.1, 0.1])
            .unwrap();
        document
            .paint_stroke(bitmap, Rect::new(3, 3, 1, 1), &dab, [0.9, 0.9])
            .unwrap();
        assert_eq!(document.brush().stroke_anchor, Some([0.9, 0.9]));

        document.undo().unwrap();
        assert_eq!(document.brush().stroke_anchor, Some([0.1, 0.1]));
        document.undo().unwrap();
        assert_eq!(document.brush().stroke_anchor, None);
        document.redo().unwrap();
        document.redo().unwrap();
        assert_eq!(document.brush().stroke_anchor, Some([0.9, 0.9]));
    }
    #[test]
    fn multiple_writes_are_one_entry() {
        let mut document = Document::new();
        let len = document.history().len();
        let (a, b) = document.write_with(|writer| {
            let mut graph = writer.graph();
            let a = graph.create_node(NodeKind::InvertColor, "A", [0.0; 2]);
            let b = graph.create_node(NodeKind::InvertColor, "B", [0.0; 2]);
            graph
                .connect(SlotRef::new(a, 1), SlotRef::new(b, 0))
                .unwrap();
            (a, b)
        });
        assert_eq!(document.history().len(), len + 1);
        assert!(matches!(
            document.history().current_snapshot().command(),
            Some(Command::Scope(ScopeType::Atoms, commands)) if commands.len() == 3
        ));
        document.undo().unwrap();
        assert!(!document.graph().contains(a));
        assert!(!document.graph().contains(b));

        // A write that changes nothing isn't an entry at all.
        document.write_with(|writer| assert!(!writer.changed()));
        assert_eq!(document.history().len(), len + 1);
    }
    #[test]
    fn panicking_write_is_recorded() {
        let mut document = Document::new();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            document.write_with(|writer| {
                writer
                    .graph()
                    .create_node(NodeKind::InvertColor, "Doomed", [0.0; 2]);
                panic!("oh no");
            });
        }));
        assert!(caught.is_err());
        assert_eq!(document.graph().len(), 1);
        assert!(matches!(
            document.history().current_snapshot().command(),
            Some(Command::Scope(ScopeType::WritePanic, _))
        ));
        document.undo().unwrap();
        assert!(document.graph().is_empty());
    }
    #[test]
    fn background_sees_fork() {
        let mut document = Document::new();
        let (bitmap, invert) = bitmap_and_invert(&mut document);
        let pending = document.evaluate_in_background(invert, 4, 4);
        // Editing after the request doesn't change what it computes.
        document
            .replace_bitmap(bitmap, PixelBuffer::filled(4, 4, Rgba8::WHITE).unwrap())
            .unwrap();
        let out = pending.wait().unwrap();
        assert!(out.pixels().iter().all(|px| *px == CYAN));
    }
    #[test]
    fn viewport_mapping() {
        let viewport = Viewport {
            canvas_size: [100, 50],
            zoom: 2.0,
            pan: [10.0, 20.0],
        };
        assert_eq!(viewport.viewport_size(), [200, 100]);
        assert_eq!(viewport.screen_to_uv([10.0, 20.0]), [0.0, 0.0]);
        // Pixel (25, 10), snapped.
        assert_eq!(viewport.screen_to_uv([61.0, 41.5]), [0.25, 0.2]);

        let mut zoomed = viewport;
        zoomed.zoom_about(1000.0, [110.0, 70.0]);
        assert_eq!(zoomed.zoom, Viewport::MAX_ZOOM);
        // Point under the anchor stays put.
        assert_eq!(zoomed.screen_to_uv([110.0, 70.0]), viewport.screen_to_uv([110.0, 70.0]));

        let mut huge = viewport;
        huge.set_zoom(1e6);
        assert_eq!(huge.zoom, Viewport::MAX_ZOOM);
        assert_eq!(huge.viewport_size(), [3200, 1600]);
        huge.set_zoom(f32::NAN);
        assert_eq!(huge.zoom, Viewport::MAX_ZOOM);
        huge.set_zoom(0.0);
        assert_eq!(huge.zoom, Viewport::MIN_ZOOM);

        let tiny = Viewport {
            zoom: Viewport::MIN_ZOOM,
            ..Viewport::default()
        };
        assert_eq!(tiny.viewport_size(), [11, 11]);
    }
}
