// Plain data shared by every backend: formats, resource states, load ops,
// rectangles, clear values.

use bitflags::bitflags;
use serde::Deserialize;

/// Names in configuration files follow the Vulkan spelling in lower case,
/// e.g. `b8g8r8a8_unorm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum Format {
    #[default]
    #[serde(rename = "undefined")]
    Undefined,
    #[serde(rename = "r8_unorm")]
    R8Unorm,
    #[serde(rename = "r8g8b8a8_unorm")]
    R8G8B8A8Unorm,
    #[serde(rename = "r8g8b8a8_srgb")]
    R8G8B8A8Srgb,
    #[serde(rename = "b8g8r8a8_unorm")]
    B8G8R8A8Unorm,
    #[serde(rename = "b8g8r8a8_srgb")]
    B8G8R8A8Srgb,
    #[serde(rename = "r16g16b16a16_sfloat")]
    R16G16B16A16Float,
    #[serde(rename = "r32g32b32a32_sfloat")]
    R32G32B32A32Float,
    #[serde(rename = "d16_unorm")]
    D16Unorm,
    #[serde(rename = "d32_sfloat")]
    D32Float,
    #[serde(rename = "d24_unorm_s8_uint")]
    D24UnormS8Uint,
    #[serde(rename = "d32_sfloat_s8_uint")]
    D32FloatS8Uint,
}

impl Format {
    pub fn is_undefined(self) -> bool {
        self == Format::Undefined
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D32Float | Format::D24UnormS8Uint | Format::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32FloatS8Uint)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm => 1,
            Format::D16Unorm => 2,
            Format::R8G8B8A8Unorm
            | Format::R8G8B8A8Srgb
            | Format::B8G8R8A8Unorm
            | Format::B8G8R8A8Srgb
            | Format::D32Float
            | Format::D24UnormS8Uint => 4,
            Format::R16G16B16A16Float | Format::D32FloatS8Uint => 8,
            Format::R32G32B32A32Float => 16,
        }
    }
}

/// Logical state of an image. Backends derive layouts and barriers from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Undefined,
    General,
    RenderTarget,
    DepthStencilWrite,
    ShaderResource,
    CopySrc,
    CopyDst,
    Present,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle lies fully inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && (self.x as u64 + self.width as u64) <= width as u64
            && (self.y as u64 + self.height as u64) <= height as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_rect(rect: Rect, min_depth: f32, max_depth: f32) -> Self {
        Self {
            x: rect.x as f32,
            y: rect.y as f32,
            width: rect.width as f32,
            height: rect.height as f32,
            min_depth,
            max_depth,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ClearColor(pub [f32; 4]);

impl ClearColor {
    pub const TRANSPARENT: ClearColor = ClearColor([0.0, 0.0, 0.0, 0.0]);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthStencilClear {
    pub depth: f32,
    pub stencil: u32,
}

impl Default for DepthStencilClear {
    fn default() -> Self {
        Self {
            depth: 1.0,
            stencil: 0xFF,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

/// Region copied by an image-to-image copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ImageCopyRegion {
    pub src_offset: Offset2D,
    pub dst_offset: Offset2D,
    pub extent: Extent2D,
}

impl ImageCopyRegion {
    /// Copy between two rectangles of possibly different sizes without
    /// scaling: the overlapping extent is the smaller side on each axis, and
    /// whichever rectangle is larger on an axis gets its offset moved so the
    /// smaller one sits in its center.
    pub fn centered(src: Rect, dst: Rect) -> Self {
        let (src_x, dst_x, width) = center_axis(src.x, src.width, dst.x, dst.width);
        let (src_y, dst_y, height) = center_axis(src.y, src.height, dst.y, dst.height);
        Self {
            src_offset: Offset2D { x: src_x, y: src_y },
            dst_offset: Offset2D { x: dst_x, y: dst_y },
            extent: Extent2D { width, height },
        }
    }
}

fn center_axis(src_pos: i32, src_len: u32, dst_pos: i32, dst_len: u32) -> (i32, i32, u32) {
    if src_len > dst_len {
        let shift = ((src_len - dst_len) / 2) as i32;
        (src_pos + shift, dst_pos, dst_len)
    } else {
        let shift = ((dst_len - src_len) / 2) as i32;
        (src_pos, dst_pos + shift, src_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_copy_letterboxes_smaller_source() {
        let region = ImageCopyRegion::centered(Rect::from_size(100, 50), Rect::from_size(200, 50));
        assert_eq!(region.src_offset, Offset2D { x: 0, y: 0 });
        assert_eq!(region.dst_offset, Offset2D { x: 50, y: 0 });
        assert_eq!(region.extent, Extent2D { width: 100, height: 50 });
    }

    #[test]
    fn centered_copy_crops_larger_source() {
        let region = ImageCopyRegion::centered(Rect::from_size(300, 300), Rect::from_size(100, 200));
        assert_eq!(region.src_offset, Offset2D { x: 100, y: 50 });
        assert_eq!(region.dst_offset, Offset2D { x: 0, y: 0 });
        assert_eq!(region.extent, Extent2D { width: 100, height: 200 });
    }

    #[test]
    fn rect_bounds() {
        assert!(Rect::new(10, 10, 20, 20).fits_within(30, 30));
        assert!(!Rect::new(10, 10, 21, 20).fits_within(30, 30));
        assert!(!Rect::new(-1, 0, 5, 5).fits_within(30, 30));
        assert!(Rect::new(0, 0, 0, 5).is_empty());
    }
}
