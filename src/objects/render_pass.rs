// Render passes
//
// A render pass here is bound to concrete images (pass + framebuffer in
// Vulkan terms), so one pass exists per swapchain image and load behavior.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::Image;
use crate::registry::{lookup, DeviceObject, Objects};
use crate::types::{ClearColor, DepthStencilClear, LoadOp, Rect, StoreOp};

#[derive(Clone, Debug)]
pub struct ColorAttachment {
    pub image: Handle<Image>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear: ClearColor,
}

#[derive(Clone, Debug)]
pub struct DepthStencilAttachment {
    pub image: Handle<Image>,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear: DepthStencilClear,
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassCreateInfo {
    pub width: u32,
    pub height: u32,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil: Option<DepthStencilAttachment>,
}

impl RenderPassCreateInfo {
    /// One color attachment with `load_op`, plus an optional depth attachment
    /// that is always cleared.
    pub fn single(
        width: u32,
        height: u32,
        color: Handle<Image>,
        load_op: LoadOp,
        depth: Option<Handle<Image>>,
    ) -> Self {
        Self {
            width,
            height,
            color_attachments: vec![ColorAttachment {
                image: color,
                load_op,
                store_op: StoreOp::Store,
                clear: ClearColor::TRANSPARENT,
            }],
            depth_stencil: depth.map(|image| DepthStencilAttachment {
                image,
                depth_load_op: LoadOp::Clear,
                depth_store_op: StoreOp::Store,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                clear: DepthStencilClear::default(),
            }),
        }
    }
}

pub struct RenderPass {
    native: NativeHandle,
    pub width: u32,
    pub height: u32,
    pub color_images: Vec<Handle<Image>>,
    pub depth_image: Option<Handle<Image>>,
    pub load_ops: Vec<LoadOp>,
}

impl RenderPass {
    pub fn render_area(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }
}

impl DeviceObject for RenderPass {
    type CreateInfo = RenderPassCreateInfo;

    fn allocate(info: &RenderPassCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        if info.color_attachments.is_empty() && info.depth_stencil.is_none() {
            return Err(Error::InvalidArgument("render pass has no attachments".into()));
        }
        if info.width == 0 || info.height == 0 {
            return Err(Error::InvalidArgument("render pass extent must be non-zero".into()));
        }
        let colors = info
            .color_attachments
            .iter()
            .map(|attachment| lookup(objects, attachment.image).map(DeviceObject::native))
            .collect::<Result<Vec<_>>>()?;
        let depth = info
            .depth_stencil
            .as_ref()
            .map(|attachment| lookup(objects, attachment.image).map(DeviceObject::native))
            .transpose()?;

        Ok(Self {
            native: backend.allocate_render_pass(info, &colors, depth)?,
            width: info.width,
            height: info.height,
            color_images: info.color_attachments.iter().map(|a| a.image).collect(),
            depth_image: info.depth_stencil.as_ref().map(|a| a.image),
            load_ops: info.color_attachments.iter().map(|a| a.load_op).collect(),
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
