// Images and image views
//
// An image is either allocated by the backend or wraps a native image owned
// elsewhere (swapchain images belong to the presentation engine). Wrapped
// images are never freed by the engine, only forgotten.

use crate::backend::{Backend, ImageViewKind};
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeHandle};
use crate::registry::{lookup, DeviceObject, Objects};
use crate::types::{ClearColor, DepthStencilClear, Format, ImageUsage, MemoryUsage, ResourceState};

#[derive(Clone, Debug)]
pub struct ImageCreateInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: Format,
    pub usage: ImageUsage,
    pub memory_usage: MemoryUsage,
    pub initial_state: ResourceState,
    pub clear_color: ClearColor,
    pub depth_stencil_clear: DepthStencilClear,
    /// Wrap this native image instead of allocating.
    pub native: Option<NativeHandle>,
}

impl ImageCreateInfo {
    pub fn render_target_2d(width: u32, height: u32, format: Format, usage: ImageUsage) -> Self {
        Self {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format,
            usage: usage | ImageUsage::COLOR_ATTACHMENT,
            memory_usage: MemoryUsage::GpuOnly,
            initial_state: ResourceState::RenderTarget,
            clear_color: ClearColor::TRANSPARENT,
            depth_stencil_clear: DepthStencilClear::default(),
            native: None,
        }
    }

    pub fn depth_stencil_target_2d(width: u32, height: u32, format: Format, usage: ImageUsage) -> Self {
        Self {
            usage: usage | ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            initial_state: ResourceState::DepthStencilWrite,
            ..Self::render_target_2d(width, height, format, ImageUsage::empty())
        }
    }

    pub fn wrapping(mut self, native: NativeHandle) -> Self {
        self.native = Some(native);
        self
    }
}

pub struct Image {
    native: NativeHandle,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub usage: ImageUsage,
    pub initial_state: ResourceState,
    pub clear_color: ClearColor,
    pub depth_stencil_clear: DepthStencilClear,
    /// True when the native image is owned outside the engine.
    pub external: bool,
}

impl DeviceObject for Image {
    type CreateInfo = ImageCreateInfo;

    fn allocate(info: &ImageCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(Error::InvalidArgument(format!(
                "image extent {}x{} must be non-zero",
                info.width, info.height
            )));
        }
        if info.format.is_undefined() {
            return Err(Error::InvalidArgument("image format is undefined".into()));
        }
        Ok(Self {
            native: backend.allocate_image(info)?,
            width: info.width,
            height: info.height,
            format: info.format,
            usage: info.usage,
            initial_state: info.initial_state,
            clear_color: info.clear_color,
            depth_stencil_clear: info.depth_stencil_clear,
            external: info.native.is_some(),
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Debug)]
pub struct ImageViewCreateInfo {
    pub image: Handle<Image>,
    /// Undefined means "same as the image".
    pub format: Format,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl ImageViewCreateInfo {
    pub fn new(image: Handle<Image>) -> Self {
        Self {
            image,
            format: Format::Undefined,
            base_mip_level: 0,
            mip_level_count: 1,
            base_array_layer: 0,
            array_layer_count: 1,
        }
    }
}

macro_rules! image_view_kinds {
    ($($(#[$meta:meta])* $name:ident => $kind:ident,)*) => {
        $(
            $(#[$meta])*
            pub struct $name {
                native: NativeHandle,
                pub image: Handle<Image>,
                pub format: Format,
            }

            impl DeviceObject for $name {
                type CreateInfo = ImageViewCreateInfo;

                fn allocate(
                    info: &ImageViewCreateInfo,
                    objects: &Objects,
                    backend: &mut dyn Backend,
                ) -> Result<Self> {
                    let image = lookup(objects, info.image)?;
                    let format = if info.format.is_undefined() { image.format } else { info.format };
                    let native = backend.allocate_image_view(ImageViewKind::$kind, image.native(), info)?;
                    Ok(Self { native, image: info.image, format })
                }

                fn native(&self) -> NativeHandle {
                    self.native
                }
            }
        )*
    };
}

image_view_kinds! {
    /// Color attachment view.
    RenderTargetView => RenderTarget,
    DepthStencilView => DepthStencil,
    SampledImageView => Sampled,
    StorageImageView => Storage,
}

