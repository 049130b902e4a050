// Backend module - the native API seam
//
// The Device never talks to a graphics API directly. It holds one boxed
// `Backend` and calls one allocation entry point per resource kind, plus a
// handful of queue / presentation operations. Everything crossing this seam
// is plain data and opaque `NativeHandle`s.
//
// Backends:
// - null:   software backend, always compiled; used by tests and headless runs
// - vulkan: ash + gpu-allocator (feature "vulkan")

pub mod null;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use crate::device::DeviceCreateInfo;
use crate::error::{Error, PresentStatus, Result};
use crate::handle::NativeHandle;
use crate::objects::*;
use crate::registry::ObjectKind;
use crate::swapchain::SwapchainCreateInfo;
use crate::types::{ClearColor, DepthStencilClear, Format, ImageCopyRegion, Rect, ResourceState, Viewport};

pub use null::{NullBackend, NullController, NullOutcome, PresentRecord, SubmitRecord};
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Api {
    Null,
    Vulkan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AdapterType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    #[default]
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadingRateMode {
    #[default]
    None,
    /// Fragment density map.
    Fdm,
    /// Variable rate shading.
    Vrs,
}

/// Feature support resolved from one adapter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub multi_view: bool,
    pub dynamic_rendering: bool,
    pub index_type_uint8: bool,
    pub pipeline_statistics: bool,
    pub independent_blending: bool,
    pub fragment_stores_and_atomics: bool,
    pub partial_descriptor_bindings: bool,
    pub fragment_density_map: bool,
    pub variable_rate_shading: bool,
}

impl Capabilities {
    pub fn shading_rate(&self, mode: ShadingRateMode) -> bool {
        match mode {
            ShadingRateMode::None => true,
            ShadingRateMode::Fdm => self.fragment_density_map,
            ShadingRateMode::Vrs => self.variable_rate_shading,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Adapter {
    pub name: String,
    pub adapter_type: AdapterType,
    pub vendor_id: u32,
    pub device_id: u32,
    pub max_graphics_queues: u32,
    pub max_compute_queues: u32,
    pub max_transfer_queues: u32,
    pub capabilities: Capabilities,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageViewKind {
    RenderTarget,
    DepthStencil,
    Sampled,
    Storage,
}

/// Backend-neutral command. Handles are already resolved to native objects.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Begin,
    End,
    TransitionImage {
        image: NativeHandle,
        before: ResourceState,
        after: ResourceState,
    },
    BeginRenderPass {
        render_pass: NativeHandle,
        render_area: Rect,
        clear_colors: Vec<ClearColor>,
        depth_stencil: DepthStencilClear,
    },
    EndRenderPass,
    CopyImageToImage {
        src: NativeHandle,
        dst: NativeHandle,
        region: ImageCopyRegion,
    },
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Rect>),
}

/// Queue submission in native terms.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeSubmit<'a> {
    pub command_buffers: &'a [NativeHandle],
    pub wait_semaphores: &'a [NativeHandle],
    pub signal_semaphores: &'a [NativeHandle],
    pub fence: Option<NativeHandle>,
}

/// Images owned by a native swapchain, wrapped (never freed) by the engine.
#[derive(Clone, Debug, Default)]
pub struct SwapchainImages {
    pub color: Vec<NativeHandle>,
    pub depth: Vec<NativeHandle>,
    pub width: u32,
    pub height: u32,
    /// Color format the backend settled on; Undefined keeps the requested one.
    pub format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XrImageKind {
    Color,
    Depth,
}

/// Native API implementation behind a Device.
///
/// All methods run with the device lock held, so implementations see one
/// caller at a time.
pub trait Backend: Send {
    fn api(&self) -> Api;

    fn adapters(&self) -> &[Adapter];

    /// Create the logical device on one adapter. Called once, before any
    /// allocation.
    fn open_device(&mut self, adapter_index: usize, info: &DeviceCreateInfo) -> Result<()>;

    // Allocation seams, one per kind.
    fn allocate_queue(&mut self, info: &QueueCreateInfo) -> Result<NativeHandle>;
    fn allocate_command_pool(&mut self, queue: NativeHandle) -> Result<NativeHandle>;
    fn allocate_command_buffer(
        &mut self,
        pool: NativeHandle,
        info: &CommandBufferCreateInfo,
    ) -> Result<NativeHandle>;
    fn allocate_buffer(&mut self, info: &BufferCreateInfo) -> Result<NativeHandle>;
    fn allocate_image(&mut self, info: &ImageCreateInfo) -> Result<NativeHandle>;
    fn allocate_image_view(
        &mut self,
        kind: ImageViewKind,
        image: NativeHandle,
        info: &ImageViewCreateInfo,
    ) -> Result<NativeHandle>;
    fn allocate_sampler(&mut self, info: &SamplerCreateInfo) -> Result<NativeHandle>;
    fn allocate_shader_module(&mut self, info: &ShaderModuleCreateInfo) -> Result<NativeHandle>;
    fn allocate_descriptor_pool(&mut self, info: &DescriptorPoolCreateInfo) -> Result<NativeHandle>;
    fn allocate_descriptor_set_layout(
        &mut self,
        info: &DescriptorSetLayoutCreateInfo,
    ) -> Result<NativeHandle>;
    fn allocate_descriptor_set(&mut self, pool: NativeHandle, layout: NativeHandle) -> Result<NativeHandle>;
    fn allocate_pipeline_interface(
        &mut self,
        info: &PipelineInterfaceCreateInfo,
        set_layouts: &[NativeHandle],
    ) -> Result<NativeHandle>;
    fn allocate_compute_pipeline(
        &mut self,
        info: &ComputePipelineCreateInfo,
        interface: NativeHandle,
        shader: NativeHandle,
    ) -> Result<NativeHandle>;
    fn allocate_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineCreateInfo,
        natives: &GraphicsPipelineNatives,
    ) -> Result<NativeHandle>;
    fn allocate_render_pass(
        &mut self,
        info: &RenderPassCreateInfo,
        colors: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    ) -> Result<NativeHandle>;
    fn allocate_fence(&mut self, info: &FenceCreateInfo) -> Result<NativeHandle>;
    fn allocate_semaphore(&mut self, info: &SemaphoreCreateInfo) -> Result<NativeHandle>;
    fn allocate_query(&mut self, info: &QueryCreateInfo) -> Result<NativeHandle>;
    fn allocate_surface(&mut self, info: &SurfaceCreateInfo) -> Result<NativeHandle>;
    fn allocate_swapchain(
        &mut self,
        info: &SwapchainCreateInfo,
        queue: NativeHandle,
        surface: Option<NativeHandle>,
    ) -> Result<NativeHandle>;

    /// Free a native object. Wrapped images only drop the wrapper.
    fn release(&mut self, kind: ObjectKind, native: NativeHandle);

    fn record(&mut self, command_buffer: NativeHandle, command: &Command) -> Result<()>;
    fn submit(&mut self, queue: NativeHandle, submit: &NativeSubmit<'_>) -> Result<()>;
    fn queue_wait_idle(&mut self, queue: NativeHandle) -> Result<()>;
    fn wait_idle(&mut self) -> Result<()>;
    fn wait_for_fence(&mut self, fence: NativeHandle, timeout: u64) -> Result<()>;
    fn reset_fence(&mut self, fence: NativeHandle) -> Result<()>;

    fn swapchain_images(&mut self, swapchain: NativeHandle) -> Result<SwapchainImages>;
    fn resize_swapchain(&mut self, swapchain: NativeHandle, width: u32, height: u32) -> Result<()>;
    fn acquire_next_image(
        &mut self,
        swapchain: NativeHandle,
        timeout: u64,
        semaphore: Option<NativeHandle>,
        fence: Option<NativeHandle>,
    ) -> Result<(u32, PresentStatus)>;
    fn present(
        &mut self,
        queue: NativeHandle,
        swapchain: NativeHandle,
        image_index: u32,
        wait_semaphores: &[NativeHandle],
    ) -> Result<PresentStatus>;

    fn acquire_xr_image(&mut self, _swapchain: NativeHandle, _kind: XrImageKind) -> Result<u32> {
        Err(Error::Unsupported(format!("XR swapchains on {:?}", self.api())))
    }

    fn wait_xr_image(&mut self, _swapchain: NativeHandle, _kind: XrImageKind, _timeout: u64) -> Result<()> {
        Err(Error::Unsupported(format!("XR swapchains on {:?}", self.api())))
    }
}
