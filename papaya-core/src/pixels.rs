//! # Pixels
//!
//! Straight (non-premultiplied) 8-bit RGBA images, row-major, no padding between rows.
//! Buffers are immutable once built and cheap to clone - the pixel storage is shared.

use std::sync::Arc;

pub type BufferID = crate::PapayaID<PixelBuffer>;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}
impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
    #[must_use]
    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
    #[must_use]
    pub const fn from_array([r, g, b, a]: [u8; 4]) -> Self {
        Self { r, g, b, a }
    }
}

/// An axis-aligned region of an image, in whole pixels.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
    /// Does this rect lie entirely within an image of the given size?
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        // u64 so that huge x + width can't wrap.
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelError {
    #[error("image has zero width or height")]
    ZeroSize,
    #[error("expected {expected} bytes of pixel data, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("region {0:?} is not within the image")]
    OutOfBounds(Rect),
    #[error("patch is {patch:?}, region is {region:?}")]
    PatchSizeMismatch { patch: [u32; 2], region: [u32; 2] },
}

/// An immutable RGBA8 image.
///
/// Each buffer carries a unique [`BufferID`], minted when its pixels are produced. Clones share
/// the ID along with the storage, so the ID doubles as a cheap "have these pixels changed?" stamp.
/// Equality compares size and pixels, never the ID.
#[derive(Clone)]
pub struct PixelBuffer {
    id: BufferID,
    width: u32,
    height: u32,
    pixels: Arc<[Rgba8]>,
}
impl PixelBuffer {
    /// Wrap pixel data. The slice must hold exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, pixels: Vec<Rgba8>) -> Result<Self, PixelError> {
        if width == 0 || height == 0 {
            return Err(PixelError::ZeroSize);
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(PixelError::LengthMismatch {
                expected: expected * 4,
                actual: pixels.len() * 4,
            });
        }
        Ok(Self {
            id: BufferID::new(),
            width,
            height,
            pixels: pixels.into(),
        })
    }
    /// Wrap tightly packed RGBA8 bytes, as handed out by most image decoders.
    pub fn from_rgba8_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, PixelError> {
        if width == 0 || height == 0 {
            return Err(PixelError::ZeroSize);
        }
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(PixelError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        // Rgba8 has alignment 1, so this cast can't fail on alignment.
        let pixels: &[Rgba8] = bytemuck::cast_slice(bytes);
        Self::new(width, height, pixels.to_vec())
    }
    /// An image where every pixel is `color`.
    pub fn filled(width: u32, height: u32, color: Rgba8) -> Result<Self, PixelError> {
        Self::new(width, height, vec![color; width as usize * height as usize])
    }
    /// A fully transparent image.
    pub fn transparent(width: u32, height: u32) -> Result<Self, PixelError> {
        Self::filled(width, height, Rgba8::TRANSPARENT)
    }
    #[must_use]
    pub fn id(&self) -> BufferID {
        self.id
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
    #[must_use]
    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }
    /// View as packed RGBA8 bytes, ready for texture upload or encoding.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.pixels())
    }
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
    /// Build a new image by applying `f` to every pixel.
    #[must_use]
    pub fn map_pixels(&self, f: impl Fn(Rgba8) -> Rgba8) -> Self {
        Self {
            id: BufferID::new(),
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().copied().map(f).collect(),
        }
    }
    /// Copy out a region of this image.
    pub fn extract(&self, rect: Rect) -> Result<Self, PixelError> {
        if rect.is_empty() {
            return Err(PixelError::ZeroSize);
        }
        if !rect.fits_within(self.width, self.height) {
            return Err(PixelError::OutOfBounds(rect));
        }
        let mut pixels = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for row in self.rows(rect) {
            pixels.extend_from_slice(row);
        }
        Self::new(rect.width, rect.height, pixels)
    }
    /// A copy of this image with `patch` written over `rect`. Sizes must agree.
    pub fn patched(&self, rect: Rect, patch: &PixelBuffer) -> Result<Self, PixelError> {
        if !rect.fits_within(self.width, self.height) {
            return Err(PixelError::OutOfBounds(rect));
        }
        if patch.size() != [rect.width, rect.height] {
            return Err(PixelError::PatchSizeMismatch {
                patch: patch.size(),
                region: [rect.width, rect.height],
            });
        }
        let mut pixels = self.pixels.to_vec();
        let stride = self.width as usize;
        for (patch_row, y) in patch
            .pixels
            .chunks_exact(patch.width as usize)
            .zip(rect.y as usize..)
        {
            let start = y * stride + rect.x as usize;
            pixels[start..start + patch_row.len()].copy_from_slice(patch_row);
        }
        Self::new(self.width, self.height, pixels)
    }
    /// Rows of the given (already bounds-checked) region.
    fn rows(&self, rect: Rect) -> impl Iterator<Item = &[Rgba8]> + '_ {
        let stride = self.width as usize;
        (rect.y as usize..(rect.y + rect.height) as usize).map(move |y| {
            let start = y * stride + rect.x as usize;
            &self.pixels[start..start + rect.width as usize]
        })
    }
    /// Resample to a new size with bilinear (triangle) filtering, pixel centers aligned and edges clamped.
    /// Resampling to the current size returns `self` unchanged, sharing its ID.
    pub fn resample_bilinear(&self, width: u32, height: u32) -> Result<Self, PixelError> {
        if width == 0 || height == 0 {
            return Err(PixelError::ZeroSize);
        }
        if [width, height] == self.size() {
            return Ok(self.clone());
        }
        let view = image::ImageBuffer::<image::Rgba<u8>, &[u8]>::from_raw(
            self.width,
            self.height,
            self.as_bytes(),
        )
        .ok_or(PixelError::LengthMismatch {
            expected: self.width as usize * self.height as usize * 4,
            actual: self.as_bytes().len(),
        })?;
        let resized =
            image::imageops::resize(&view, width, height, image::imageops::FilterType::Triangle);
        Self::from_rgba8_bytes(width, height, resized.as_raw())
    }
}
impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size()
            && (Arc::ptr_eq(&self.pixels, &other.pixels) || self.pixels == other.pixels)
    }
}
impl Eq for PixelBuffer {}
impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Dumping every pixel is never what anyone wants.
        f.debug_struct("PixelBuffer")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
