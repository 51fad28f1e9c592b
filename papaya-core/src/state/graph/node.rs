//! Node kinds, their slot layouts, and how each one computes its output.

use crate::pixels::{PixelBuffer, PixelError};

/// The payload type carried over a connection. Connections only link slots of equal kind.
#[derive(
    strum::AsRefStr, strum::EnumIter, PartialEq, Eq, Copy, Clone, Hash, Debug,
)]
pub enum DataKind {
    Bitmap,
}

#[derive(
    strum::AsRefStr, strum::EnumIter, PartialEq, Eq, Copy, Clone, Hash, Debug,
)]
pub enum Direction {
    Input,
    Output,
}

/// Static description of one slot of a node kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub name: &'static str,
    pub direction: Direction,
    pub data_kind: DataKind,
}

impl std::fmt::Display for SlotLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {})",
            self.name,
            self.direction.as_ref(),
            self.data_kind.as_ref()
        )
    }
}

/// What a node kind does. Every kind has exactly one of these.
pub trait Operation {
    /// Slots of this kind, in order. Inputs and outputs may be interleaved.
    fn slots(&self) -> &'static [SlotLayout];
    /// Produce this node's output at the given size.
    ///
    /// `inputs` has one entry per input slot, in slot order, holding the already computed buffer of
    /// whatever feeds it - or `None` if the slot is unconnected.
    fn compute(
        &self,
        inputs: &[Option<&PixelBuffer>],
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, PixelError>;
}

#[derive(Clone, PartialEq, Debug)]
pub enum NodeKind {
    /// An image source. Its pixels never change in place, edits swap in a whole new buffer.
    Bitmap(Bitmap),
    /// Inverts the color channels of its input, keeping alpha.
    InvertColor,
}
impl NodeKind {
    #[must_use]
    pub fn bitmap(source: PixelBuffer) -> Self {
        Self::Bitmap(Bitmap { source })
    }
    #[must_use]
    pub fn operation(&self) -> &dyn Operation {
        match self {
            Self::Bitmap(bitmap) => bitmap,
            Self::InvertColor => &Invert,
        }
    }
    #[must_use]
    pub fn slots(&self) -> &'static [SlotLayout] {
        self.operation().slots()
    }
    #[must_use]
    pub fn as_bitmap(&self) -> Option<&Bitmap> {
        match self {
            Self::Bitmap(bitmap) => Some(bitmap),
            Self::InvertColor => None,
        }
    }
    pub(super) fn as_bitmap_mut(&mut self) -> Option<&mut Bitmap> {
        match self {
            Self::Bitmap(bitmap) => Some(bitmap),
            Self::InvertColor => None,
        }
    }
    /// Human readable kind name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bitmap(_) => "Bitmap",
            Self::InvertColor => "Invert Color",
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Bitmap {
    pub(super) source: PixelBuffer,
}
impl Bitmap {
    #[must_use]
    pub fn source(&self) -> &PixelBuffer {
        &self.source
    }
    /// Size of the source image.
    #[must_use]
    pub fn native_size(&self) -> [u32; 2] {
        self.source.size()
    }
}
impl Operation for Bitmap {
    fn slots(&self) -> &'static [SlotLayout] {
        const SLOTS: &[SlotLayout] = &[SlotLayout {
            name: "Image",
            direction: Direction::Output,
            data_kind: DataKind::Bitmap,
        }];
        SLOTS
    }
    fn compute(
        &self,
        _: &[Option<&PixelBuffer>],
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, PixelError> {
        self.source.resample_bilinear(width, height)
    }
}

/// Operation behind [`NodeKind::InvertColor`].
struct Invert;
impl Operation for Invert {
    fn slots(&self) -> &'static [SlotLayout] {
        const SLOTS: &[SlotLayout] = &[
            SlotLayout {
                name: "Image",
                direction: Direction::Input,
                data_kind: DataKind::Bitmap,
            },
            SlotLayout {
                name: "Result",
                direction: Direction::Output,
                data_kind: DataKind::Bitmap,
            },
        ];
        SLOTS
    }
    fn compute(
        &self,
        inputs: &[Option<&PixelBuffer>],
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, PixelError> {
        // Unconnected is a perfectly fine graph state - show nothing.
        let Some(Some(input)) = inputs.first() else {
            return PixelBuffer::transparent(width, height);
        };
        // Inputs arrive at the requested size already, resample only guards odd callers.
        let input = input.resample_bilinear(width, height)?;
        Ok(input.map_pixels(|mut px| {
            px.r = 255 - px.r;
            px.g = 255 - px.g;
            px.b = 255 - px.b;
            px
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pixels::Rgba8;

    #[test]
    fn layouts() {
        let bitmap = NodeKind::bitmap(PixelBuffer::transparent(2, 2).unwrap());
        assert_eq!(bitmap.slots().len(), 1);
        assert_eq!(bitmap.slots()[0].direction, Direction::Output);

        let invert = NodeKind::InvertColor.slots();
        assert_eq!(
            invert.iter().map(|slot| slot.direction).collect::<Vec<_>>(),
            vec![Direction::Input, Direction::Output]
        );
        assert!(invert.iter().all(|slot| slot.data_kind == DataKind::Bitmap));
    }
    #[test]
    fn layouts_cover_every_direction() {
        use strum::IntoEnumIterator;
        let invert = NodeKind::InvertColor.slots();
        assert!(Direction::iter().all(|dir| invert.iter().any(|slot| slot.direction == dir)));
        assert_eq!(invert[0].to_string(), "Image (Input Bitmap)");
        assert_eq!(DataKind::iter().count(), 1);
    }
    #[test]
    fn invert_keeps_alpha() {
        let source = PixelBuffer::filled(2, 2, Rgba8::new(10, 20, 30, 40)).unwrap();
        let out = Invert.compute(&[Some(&source)], 2, 2).unwrap();
        assert!(out
            .pixels()
            .iter()
            .all(|px| *px == Rgba8::new(245, 235, 225, 40)));
    }
    #[test]
    fn invert_unconnected_is_transparent() {
        let out = Invert.compute(&[None], 3, 5).unwrap();
        assert_eq!(out.size(), [3, 5]);
        assert!(out.pixels().iter().all(|px| *px == Rgba8::TRANSPARENT));
    }
    #[test]
    fn bitmap_resamples_to_request() {
        let source = PixelBuffer::filled(2, 2, Rgba8::WHITE).unwrap();
        let out = NodeKind::bitmap(source)
            .operation()
            .compute(&[], 8, 3)
            .unwrap();
        assert_eq!(out.size(), [8, 3]);
    }
}
