// Command pools, command buffers and the typed recording front-end
//
// Descriptor budgets are sized per command buffer because the underlying
// APIs commonly allocate descriptor pools/heaps per command buffer.

use crate::backend::{Backend, Command};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::{Image, Queue, RenderPass};
use crate::registry::{lookup, DeviceObject, Objects};
use crate::types::{ClearColor, DepthStencilClear, ImageCopyRegion, Rect, ResourceState, Viewport};

#[derive(Clone, Copy, Debug)]
pub struct CommandPoolCreateInfo {
    pub queue: Handle<Queue>,
}

pub struct CommandPool {
    native: NativeHandle,
    pub queue: Handle<Queue>,
}

impl DeviceObject for CommandPool {
    type CreateInfo = CommandPoolCreateInfo;

    fn allocate(info: &CommandPoolCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let queue = lookup(objects, info.queue)?.native();
        Ok(Self {
            native: backend.allocate_command_pool(queue)?,
            queue: info.queue,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CommandBufferCreateInfo {
    pub pool: Handle<CommandPool>,
    pub resource_descriptor_count: u32,
    pub sampler_descriptor_count: u32,
}

pub struct CommandBuffer {
    native: NativeHandle,
    pub pool: Handle<CommandPool>,
    pub resource_descriptor_count: u32,
    pub sampler_descriptor_count: u32,
}

impl DeviceObject for CommandBuffer {
    type CreateInfo = CommandBufferCreateInfo;

    fn allocate(info: &CommandBufferCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let pool = lookup(objects, info.pool)?.native();
        Ok(Self {
            native: backend.allocate_command_buffer(pool, info)?,
            pool: info.pool,
            resource_descriptor_count: info.resource_descriptor_count,
            sampler_descriptor_count: info.sampler_descriptor_count,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Debug)]
pub struct RenderPassBeginInfo {
    pub render_pass: Handle<RenderPass>,
    pub render_area: Rect,
    pub clear_colors: Vec<ClearColor>,
    pub depth_stencil_clear: DepthStencilClear,
}

impl RenderPassBeginInfo {
    pub fn new(render_pass: Handle<RenderPass>, render_area: Rect) -> Self {
        Self {
            render_pass,
            render_area,
            clear_colors: vec![ClearColor::TRANSPARENT],
            depth_stencil_clear: DepthStencilClear::default(),
        }
    }

    pub fn with_clear_color(mut self, color: ClearColor) -> Self {
        self.clear_colors = vec![color];
        self
    }
}

/// Records commands into one command buffer.
pub struct CommandRecorder<'a> {
    device: &'a Device,
    command_buffer: Handle<CommandBuffer>,
}

impl<'a> CommandRecorder<'a> {
    pub fn new(device: &'a Device, command_buffer: Handle<CommandBuffer>) -> Self {
        Self {
            device,
            command_buffer,
        }
    }

    pub fn device(&self) -> &'a Device {
        self.device
    }

    pub fn command_buffer(&self) -> Handle<CommandBuffer> {
        self.command_buffer
    }

    pub fn begin(&mut self) -> Result<()> {
        self.device.record(self.command_buffer, Command::Begin)
    }

    pub fn end(&mut self) -> Result<()> {
        self.device.record(self.command_buffer, Command::End)
    }

    pub fn transition_image(
        &mut self,
        image: Handle<Image>,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        let image = self.device.native_handle(image)?;
        self.device
            .record(self.command_buffer, Command::TransitionImage { image, before, after })
    }

    pub fn begin_render_pass(&mut self, info: &RenderPassBeginInfo) -> Result<()> {
        let render_pass = self.device.native_handle(info.render_pass)?;
        self.device.record(
            self.command_buffer,
            Command::BeginRenderPass {
                render_pass,
                render_area: info.render_area,
                clear_colors: info.clear_colors.clone(),
                depth_stencil: info.depth_stencil_clear,
            },
        )
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        self.device.record(self.command_buffer, Command::EndRenderPass)
    }

    pub fn copy_image_to_image(
        &mut self,
        src: Handle<Image>,
        dst: Handle<Image>,
        region: &ImageCopyRegion,
    ) -> Result<()> {
        let src = self.device.native_handle(src)?;
        let dst = self.device.native_handle(dst)?;
        self.device.record(
            self.command_buffer,
            Command::CopyImageToImage {
                src,
                dst,
                region: *region,
            },
        )
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<()> {
        if viewports.is_empty() {
            return Err(Error::InvalidArgument("no viewports".into()));
        }
        self.device
            .record(self.command_buffer, Command::SetViewports(viewports.to_vec()))
    }

    pub fn set_scissors(&mut self, scissors: &[Rect]) -> Result<()> {
        if scissors.is_empty() {
            return Err(Error::InvalidArgument("no scissors".into()));
        }
        self.device
            .record(self.command_buffer, Command::SetScissors(scissors.to_vec()))
    }
}
