// Vulkan backend - ash + gpu-allocator
//
// Every native object the engine sees is a key into one slot map of
// `VkObject`s, so stale or mistyped handles are caught before they reach the
// driver. Handles passed in from outside (`native: Some(..)` on buffers and
// images) are raw Vulkan handles and are adopted, never destroyed.
//
// Submodules:
// - instance:  loader, validation layer, adapter discovery
// - device:    logical device, queue plan, allocator
// - resource:  buffers, images, views, samplers
// - pipeline:  shaders, descriptors, pipelines, render passes
// - sync:      fences, semaphores, query pools
// - surface:   window surfaces from raw-window-handle
// - swapchain: VK_KHR_swapchain
// - command:   command recording
// - convert:   engine types to vk enums and flags

mod command;
mod convert;
mod device;
mod instance;
mod pipeline;
mod resource;
mod surface;
mod swapchain;
mod sync;

use super::*;
use ash::vk::{self, Handle};
use device::LogicalDevice;
use gpu_allocator::vulkan::Allocation;
use instance::VulkanInstance;
use slotmap::{DefaultKey, Key, KeyData, SlotMap};
use swapchain::SwapchainRequest;

pub struct QueueEntry {
    pub queue: vk::Queue,
    pub family: u32,
}

pub struct CommandBufferEntry {
    pub buffer: vk::CommandBuffer,
    pub pool: vk::CommandPool,
    /// Descriptor budget reset on every begin.
    pub descriptor_pool: Option<vk::DescriptorPool>,
}

pub struct BufferEntry {
    pub buffer: vk::Buffer,
    /// None for adopted buffers.
    pub allocation: Option<Allocation>,
}

pub struct ImageEntry {
    pub image: vk::Image,
    /// None for adopted images, including swapchain images.
    pub allocation: Option<Allocation>,
    pub format: Format,
    pub array_layers: u32,
    /// Set by the first recorded barrier; until then the layout is UNDEFINED.
    pub initialized: bool,
}

pub struct RenderPassEntry {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub views: Vec<vk::ImageView>,
    pub color_count: usize,
    pub has_depth: bool,
}

pub struct DescriptorSetEntry {
    pub set: vk::DescriptorSet,
    pub pool: vk::DescriptorPool,
}

pub struct SwapchainEntry {
    pub swapchain: vk::SwapchainKHR,
    pub surface: vk::SurfaceKHR,
    pub queue_family: u32,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub request: SwapchainRequest,
}

enum VkObject {
    Queue(QueueEntry),
    CommandPool(vk::CommandPool),
    CommandBuffer(CommandBufferEntry),
    Buffer(BufferEntry),
    Image(ImageEntry),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    ShaderModule(vk::ShaderModule),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorSet(DescriptorSetEntry),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    RenderPass(RenderPassEntry),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    QueryPool(vk::QueryPool),
    Surface(vk::SurfaceKHR),
    Swapchain(SwapchainEntry),
}

impl VkObject {
    /// Teardown position when leftovers are destroyed in bulk.
    fn teardown_rank(&self) -> u8 {
        match self {
            VkObject::CommandBuffer(_) => 0,
            VkObject::CommandPool(_) => 1,
            VkObject::DescriptorSet(_) => 2,
            VkObject::DescriptorPool(_) => 3,
            VkObject::Pipeline(_) => 4,
            VkObject::PipelineLayout(_) => 5,
            VkObject::DescriptorSetLayout(_) => 6,
            VkObject::ShaderModule(_) => 7,
            VkObject::RenderPass(_) => 8,
            VkObject::ImageView(_) => 9,
            VkObject::Image(_) => 10,
            VkObject::Swapchain(_) => 11,
            VkObject::Surface(_) => 12,
            VkObject::Buffer(_) => 13,
            VkObject::Sampler(_) => 14,
            VkObject::QueryPool(_) => 15,
            VkObject::Fence(_) => 16,
            VkObject::Semaphore(_) => 17,
            VkObject::Queue(_) => 18,
        }
    }
}

#[derive(Default)]
struct NativeTable {
    entries: SlotMap<DefaultKey, VkObject>,
}

impl NativeTable {
    fn key(native: NativeHandle) -> DefaultKey {
        KeyData::from_ffi(native.0).into()
    }

    fn insert(&mut self, object: VkObject) -> NativeHandle {
        NativeHandle(self.entries.insert(object).data().as_ffi())
    }

    fn get(&self, native: NativeHandle) -> Option<&VkObject> {
        self.entries.get(Self::key(native))
    }

    fn remove(&mut self, native: NativeHandle) -> Option<VkObject> {
        self.entries.remove(Self::key(native))
    }

    fn image_mut(&mut self, native: NativeHandle) -> Result<&mut ImageEntry> {
        match self.entries.get_mut(Self::key(native)) {
            Some(VkObject::Image(entry)) => Ok(entry),
            _ => Err(Error::InvalidHandle(ObjectKind::Image)),
        }
    }

    fn swapchain_mut(&mut self, native: NativeHandle) -> Result<&mut SwapchainEntry> {
        match self.entries.get_mut(Self::key(native)) {
            Some(VkObject::Swapchain(entry)) => Ok(entry),
            _ => Err(Error::InvalidHandle(ObjectKind::Swapchain)),
        }
    }
}

macro_rules! typed_lookups {
    ($($name:ident: $variant:ident => $ty:ty, $kind:ident;)*) => {
        impl NativeTable {
            $(
                fn $name(&self, native: NativeHandle) -> Result<&$ty> {
                    match self.get(native) {
                        Some(VkObject::$variant(entry)) => Ok(entry),
                        _ => Err(Error::InvalidHandle(ObjectKind::$kind)),
                    }
                }
            )*
        }
    };
}

typed_lookups! {
    queue: Queue => QueueEntry, Queue;
    command_pool: CommandPool => vk::CommandPool, CommandPool;
    command_buffer: CommandBuffer => CommandBufferEntry, CommandBuffer;
    image: Image => ImageEntry, Image;
    shader_module: ShaderModule => vk::ShaderModule, ShaderModule;
    descriptor_pool: DescriptorPool => vk::DescriptorPool, DescriptorPool;
    set_layout: DescriptorSetLayout => vk::DescriptorSetLayout, DescriptorSetLayout;
    pipeline_layout: PipelineLayout => vk::PipelineLayout, PipelineInterface;
    render_pass: RenderPass => RenderPassEntry, RenderPass;
    fence: Fence => vk::Fence, Fence;
    semaphore: Semaphore => vk::Semaphore, Semaphore;
    surface: Surface => vk::SurfaceKHR, Surface;
    swapchain: Swapchain => SwapchainEntry, Swapchain;
}

pub struct VulkanBackend {
    // Field order is drop order: objects go before the device, the device
    // before the instance.
    objects: NativeTable,
    adapters: Vec<Adapter>,
    device: Option<LogicalDevice>,
    instance: VulkanInstance,
}

fn opened(device: &Option<LogicalDevice>) -> Result<&LogicalDevice> {
    device
        .as_ref()
        .ok_or_else(|| Error::InvalidArgument("Vulkan device has not been opened".into()))
}

fn opened_mut(device: &mut Option<LogicalDevice>) -> Result<&mut LogicalDevice> {
    device
        .as_mut()
        .ok_or_else(|| Error::InvalidArgument("Vulkan device has not been opened".into()))
}

impl VulkanBackend {
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Self> {
        let instance = VulkanInstance::new(app_name, enable_validation)?;
        let adapters = instance
            .physical_devices
            .iter()
            .map(|physical| physical.adapter.clone())
            .collect();

        Ok(Self {
            objects: NativeTable::default(),
            adapters,
            device: None,
            instance,
        })
    }

    fn semaphores(&self, natives: &[NativeHandle]) -> Result<Vec<vk::Semaphore>> {
        natives.iter().map(|&native| self.objects.semaphore(native).copied()).collect()
    }
}

fn destroy_object(device: Option<&mut LogicalDevice>, instance: &VulkanInstance, object: VkObject) {
    // Surfaces belong to the instance and may outlive any device
    if let VkObject::Surface(surface) = object {
        surface::destroy_surface(instance, surface);
        return;
    }
    let Some(device) = device else {
        log::warn!("Vulkan object released without a device");
        return;
    };

    unsafe {
        match object {
            VkObject::Queue(_) | VkObject::Surface(_) => {}
            VkObject::CommandPool(pool) => device.device.destroy_command_pool(pool, None),
            VkObject::CommandBuffer(entry) => {
                device.device.free_command_buffers(entry.pool, &[entry.buffer]);
                if let Some(pool) = entry.descriptor_pool {
                    device.device.destroy_descriptor_pool(pool, None);
                }
            }
            VkObject::Buffer(entry) => resource::destroy_buffer(device, entry),
            VkObject::Image(entry) => resource::destroy_image(device, entry),
            VkObject::ImageView(view) => device.device.destroy_image_view(view, None),
            VkObject::Sampler(sampler) => device.device.destroy_sampler(sampler, None),
            VkObject::ShaderModule(module) => device.device.destroy_shader_module(module, None),
            VkObject::DescriptorPool(pool) => device.device.destroy_descriptor_pool(pool, None),
            VkObject::DescriptorSetLayout(layout) => device.device.destroy_descriptor_set_layout(layout, None),
            VkObject::DescriptorSet(entry) => {
                if let Err(e) = device.device.free_descriptor_sets(entry.pool, &[entry.set]) {
                    log::warn!("Failed to free descriptor set: {:?}", e);
                }
            }
            VkObject::PipelineLayout(layout) => device.device.destroy_pipeline_layout(layout, None),
            VkObject::Pipeline(pipeline) => device.device.destroy_pipeline(pipeline, None),
            VkObject::RenderPass(entry) => pipeline::destroy_render_pass(device, entry),
            VkObject::Fence(fence) => device.device.destroy_fence(fence, None),
            VkObject::Semaphore(semaphore) => device.device.destroy_semaphore(semaphore, None),
            VkObject::QueryPool(pool) => device.device.destroy_query_pool(pool, None),
            VkObject::Swapchain(entry) => swapchain::destroy_swapchain(device, entry),
        }
    }
}

impl Backend for VulkanBackend {
    fn api(&self) -> Api {
        Api::Vulkan
    }

    fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    fn open_device(&mut self, adapter_index: usize, info: &DeviceCreateInfo) -> Result<()> {
        if self.device.is_some() {
            return Err(Error::InvalidArgument("Vulkan device is already open".into()));
        }
        if adapter_index >= self.adapters.len() {
            return Err(Error::out_of_range("adapter", adapter_index as u32, self.adapters.len()));
        }
        self.device = Some(LogicalDevice::new(&self.instance, adapter_index, info)?);
        Ok(())
    }

    fn allocate_queue(&mut self, info: &QueueCreateInfo) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let (family, index) = device.queue_plan.locate(info.kind, info.index)?;
        let queue = unsafe { device.device.get_device_queue(family, index) };
        Ok(self.objects.insert(VkObject::Queue(QueueEntry { queue, family })))
    }

    fn allocate_command_pool(&mut self, queue: NativeHandle) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let family = self.objects.queue(queue)?.family;

        // Command buffers are reset individually on every begin
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(family);
        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }?;
        Ok(self.objects.insert(VkObject::CommandPool(pool)))
    }

    fn allocate_command_buffer(
        &mut self,
        pool: NativeHandle,
        info: &CommandBufferCreateInfo,
    ) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let pool = *self.objects.command_pool(pool)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }?;
        let buffer = buffers[0];

        let descriptor_pool = match pipeline::create_transient_descriptor_pool(
            device,
            info.resource_descriptor_count,
            info.sampler_descriptor_count,
        ) {
            Ok(descriptor_pool) => descriptor_pool,
            Err(e) => {
                unsafe { device.device.free_command_buffers(pool, &buffers) };
                return Err(e);
            }
        };

        Ok(self.objects.insert(VkObject::CommandBuffer(CommandBufferEntry {
            buffer,
            pool,
            descriptor_pool,
        })))
    }

    fn allocate_buffer(&mut self, info: &BufferCreateInfo) -> Result<NativeHandle> {
        let entry = resource::create_buffer(opened_mut(&mut self.device)?, info)?;
        Ok(self.objects.insert(VkObject::Buffer(entry)))
    }

    fn allocate_image(&mut self, info: &ImageCreateInfo) -> Result<NativeHandle> {
        let entry = resource::create_image(opened_mut(&mut self.device)?, info)?;
        Ok(self.objects.insert(VkObject::Image(entry)))
    }

    fn allocate_image_view(
        &mut self,
        kind: ImageViewKind,
        image: NativeHandle,
        info: &ImageViewCreateInfo,
    ) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let view = resource::create_image_view(device, self.objects.image(image)?, kind, info)?;
        Ok(self.objects.insert(VkObject::ImageView(view)))
    }

    fn allocate_sampler(&mut self, info: &SamplerCreateInfo) -> Result<NativeHandle> {
        let sampler = resource::create_sampler(opened(&self.device)?, info)?;
        Ok(self.objects.insert(VkObject::Sampler(sampler)))
    }

    fn allocate_shader_module(&mut self, info: &ShaderModuleCreateInfo) -> Result<NativeHandle> {
        let module = pipeline::create_shader_module(opened(&self.device)?, &info.code)?;
        Ok(self.objects.insert(VkObject::ShaderModule(module)))
    }

    fn allocate_descriptor_pool(&mut self, info: &DescriptorPoolCreateInfo) -> Result<NativeHandle> {
        let pool = pipeline::create_descriptor_pool(opened(&self.device)?, info)?;
        Ok(self.objects.insert(VkObject::DescriptorPool(pool)))
    }

    fn allocate_descriptor_set_layout(
        &mut self,
        info: &DescriptorSetLayoutCreateInfo,
    ) -> Result<NativeHandle> {
        let layout = pipeline::create_descriptor_set_layout(opened(&self.device)?, info)?;
        Ok(self.objects.insert(VkObject::DescriptorSetLayout(layout)))
    }

    fn allocate_descriptor_set(&mut self, pool: NativeHandle, layout: NativeHandle) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let pool = *self.objects.descriptor_pool(pool)?;
        let layout = *self.objects.set_layout(layout)?;
        let set = pipeline::allocate_descriptor_set(device, pool, layout)?;
        Ok(self.objects.insert(VkObject::DescriptorSet(DescriptorSetEntry { set, pool })))
    }

    fn allocate_pipeline_interface(
        &mut self,
        info: &PipelineInterfaceCreateInfo,
        set_layouts: &[NativeHandle],
    ) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let set_layouts: Vec<vk::DescriptorSetLayout> = set_layouts
            .iter()
            .map(|&native| self.objects.set_layout(native).copied())
            .collect::<Result<_>>()?;
        let layout = pipeline::create_pipeline_layout(device, info, &set_layouts)?;
        Ok(self.objects.insert(VkObject::PipelineLayout(layout)))
    }

    fn allocate_compute_pipeline(
        &mut self,
        info: &ComputePipelineCreateInfo,
        interface: NativeHandle,
        shader: NativeHandle,
    ) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let layout = *self.objects.pipeline_layout(interface)?;
        let shader = *self.objects.shader_module(shader)?;
        let pipeline = pipeline::create_compute_pipeline(device, info, layout, shader)?;
        Ok(self.objects.insert(VkObject::Pipeline(pipeline)))
    }

    fn allocate_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineCreateInfo,
        natives: &GraphicsPipelineNatives,
    ) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let render_pass = self.objects.render_pass(natives.render_pass)?;
        let targets = pipeline::GraphicsTargets {
            layout: *self.objects.pipeline_layout(natives.interface)?,
            vertex_shader: *self.objects.shader_module(natives.vertex_shader)?,
            fragment_shader: natives
                .fragment_shader
                .map(|native| self.objects.shader_module(native).copied())
                .transpose()?,
            render_pass: render_pass.render_pass,
            color_attachment_count: render_pass.color_count,
        };
        let pipeline = pipeline::create_graphics_pipeline(device, info, &targets)?;
        Ok(self.objects.insert(VkObject::Pipeline(pipeline)))
    }

    fn allocate_render_pass(
        &mut self,
        info: &RenderPassCreateInfo,
        colors: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    ) -> Result<NativeHandle> {
        let device = opened(&self.device)?;
        let color_images: Vec<&ImageEntry> = colors
            .iter()
            .map(|&native| self.objects.image(native))
            .collect::<Result<_>>()?;
        let depth_image = depth_stencil.map(|native| self.objects.image(native)).transpose()?;
        let entry = pipeline::create_render_pass(device, info, &color_images, depth_image)?;
        Ok(self.objects.insert(VkObject::RenderPass(entry)))
    }

    fn allocate_fence(&mut self, info: &FenceCreateInfo) -> Result<NativeHandle> {
        let fence = sync::create_fence(opened(&self.device)?, info)?;
        Ok(self.objects.insert(VkObject::Fence(fence)))
    }

    fn allocate_semaphore(&mut self, info: &SemaphoreCreateInfo) -> Result<NativeHandle> {
        let semaphore = sync::create_semaphore(opened(&self.device)?, info)?;
        Ok(self.objects.insert(VkObject::Semaphore(semaphore)))
    }

    fn allocate_query(&mut self, info: &QueryCreateInfo) -> Result<NativeHandle> {
        let pool = sync::create_query_pool(opened(&self.device)?, info)?;
        Ok(self.objects.insert(VkObject::QueryPool(pool)))
    }

    fn allocate_surface(&mut self, info: &SurfaceCreateInfo) -> Result<NativeHandle> {
        let surface = surface::create_surface(&self.instance, info)?;
        Ok(self.objects.insert(VkObject::Surface(surface)))
    }

    fn allocate_swapchain(
        &mut self,
        info: &SwapchainCreateInfo,
        queue: NativeHandle,
        surface: Option<NativeHandle>,
    ) -> Result<NativeHandle> {
        if info.xr_session.is_some() {
            return Err(Error::Unsupported("XR swapchains on Vulkan".into()));
        }
        let Some(surface) = surface else {
            return Err(Error::InvalidArgument("native swapchain needs a surface".into()));
        };
        let device = opened(&self.device)?;
        let family = self.objects.queue(queue)?.family;
        let surface = *self.objects.surface(surface)?;

        let entry = swapchain::create_swapchain(
            &self.instance,
            device,
            surface,
            family,
            SwapchainRequest::from(info),
            vk::SwapchainKHR::null(),
        )?;
        Ok(self.objects.insert(VkObject::Swapchain(entry)))
    }

    fn release(&mut self, kind: ObjectKind, native: NativeHandle) {
        match self.objects.remove(native) {
            Some(object) => destroy_object(self.device.as_mut(), &self.instance, object),
            None => log::warn!("Vulkan backend: release of unknown {:?} {:?}", kind, native),
        }
    }

    fn record(&mut self, command_buffer: NativeHandle, command: &Command) -> Result<()> {
        let device = opened(&self.device)?;
        let cmd = self.objects.command_buffer(command_buffer)?.buffer;

        match command {
            Command::Begin => command::begin(device, self.objects.command_buffer(command_buffer)?)?,
            Command::End => command::end(device, self.objects.command_buffer(command_buffer)?)?,
            Command::TransitionImage { image, before, after } => {
                let image = self.objects.image_mut(*image)?;
                command::transition_image(device, cmd, image, *before, *after);
            }
            Command::BeginRenderPass {
                render_pass,
                render_area,
                clear_colors,
                depth_stencil,
            } => {
                let pass = self.objects.render_pass(*render_pass)?;
                command::begin_render_pass(device, cmd, pass, *render_area, clear_colors, *depth_stencil);
            }
            Command::EndRenderPass => command::end_render_pass(device, cmd),
            Command::CopyImageToImage { src, dst, region } => {
                let src = self.objects.image(*src)?.image;
                let dst = self.objects.image(*dst)?.image;
                command::copy_image(device, cmd, src, dst, *region);
            }
            Command::SetViewports(viewports) => command::set_viewports(device, cmd, viewports),
            Command::SetScissors(scissors) => command::set_scissors(device, cmd, scissors),
        }
        Ok(())
    }

    fn submit(&mut self, queue: NativeHandle, submit: &NativeSubmit<'_>) -> Result<()> {
        let device = opened(&self.device)?;
        let queue = self.objects.queue(queue)?.queue;
        let command_buffers: Vec<vk::CommandBuffer> = submit
            .command_buffers
            .iter()
            .map(|&native| self.objects.command_buffer(native).map(|entry| entry.buffer))
            .collect::<Result<_>>()?;
        let wait_semaphores = self.semaphores(submit.wait_semaphores)?;
        let signal_semaphores = self.semaphores(submit.signal_semaphores)?;
        let fence = match submit.fence {
            Some(native) => *self.objects.fence(native)?,
            None => vk::Fence::null(),
        };

        // Waits are conservative: the whole pipeline waits on every semaphore
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_semaphores.len()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe { device.device.queue_submit(queue, &[submit_info], fence) }?;
        Ok(())
    }

    fn queue_wait_idle(&mut self, queue: NativeHandle) -> Result<()> {
        let device = opened(&self.device)?;
        let queue = self.objects.queue(queue)?.queue;
        unsafe { device.device.queue_wait_idle(queue) }?;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        match self.device.as_ref() {
            Some(device) => device.wait_idle(),
            None => Ok(()),
        }
    }

    fn wait_for_fence(&mut self, fence: NativeHandle, timeout: u64) -> Result<()> {
        sync::wait_for_fence(opened(&self.device)?, *self.objects.fence(fence)?, timeout)
    }

    fn reset_fence(&mut self, fence: NativeHandle) -> Result<()> {
        sync::reset_fence(opened(&self.device)?, *self.objects.fence(fence)?)
    }

    fn swapchain_images(&mut self, swapchain: NativeHandle) -> Result<SwapchainImages> {
        let entry = self.objects.swapchain(swapchain)?;
        Ok(SwapchainImages {
            color: entry.images.iter().map(|image| NativeHandle(image.as_raw())).collect(),
            depth: Vec::new(),
            width: entry.extent.width,
            height: entry.extent.height,
            format: convert::from_vk_format(entry.format),
        })
    }

    fn resize_swapchain(&mut self, swapchain: NativeHandle, width: u32, height: u32) -> Result<()> {
        let device = opened(&self.device)?;
        let entry = self.objects.swapchain_mut(swapchain)?;
        swapchain::resize_swapchain(&self.instance, device, entry, width, height)
    }

    fn acquire_next_image(
        &mut self,
        swapchain: NativeHandle,
        timeout: u64,
        semaphore: Option<NativeHandle>,
        fence: Option<NativeHandle>,
    ) -> Result<(u32, PresentStatus)> {
        let device = opened(&self.device)?;
        let semaphore = match semaphore {
            Some(native) => *self.objects.semaphore(native)?,
            None => vk::Semaphore::null(),
        };
        let fence = match fence {
            Some(native) => *self.objects.fence(native)?,
            None => vk::Fence::null(),
        };
        let entry = self.objects.swapchain(swapchain)?;
        swapchain::acquire_next_image(device, entry, timeout, semaphore, fence)
    }

    fn present(
        &mut self,
        queue: NativeHandle,
        swapchain: NativeHandle,
        image_index: u32,
        wait_semaphores: &[NativeHandle],
    ) -> Result<PresentStatus> {
        let device = opened(&self.device)?;
        let queue = self.objects.queue(queue)?.queue;
        let wait_semaphores = self.semaphores(wait_semaphores)?;
        let entry = self.objects.swapchain(swapchain)?;
        swapchain::present(device, queue, entry, image_index, &wait_semaphores)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if !self.objects.entries.is_empty() {
            log::warn!(
                "Vulkan backend dropped with {} live native objects",
                self.objects.entries.len()
            );
        }
        if let Some(device) = self.device.as_ref() {
            let _ = device.wait_idle();
        }

        let mut leftovers: Vec<VkObject> = self.objects.entries.drain().map(|(_, object)| object).collect();
        leftovers.sort_by_key(VkObject::teardown_rank);
        for object in leftovers {
            destroy_object(self.device.as_mut(), &self.instance, object);
        }

        // The logical device must go before the instance
        self.device = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_handles_are_typed_and_versioned() {
        let mut table = NativeTable::default();
        let fence = table.insert(VkObject::Fence(vk::Fence::null()));
        assert_ne!(fence, NativeHandle::NULL);

        assert!(table.fence(fence).is_ok());
        assert!(matches!(
            table.semaphore(fence),
            Err(Error::InvalidHandle(ObjectKind::Semaphore))
        ));

        assert!(table.remove(fence).is_some());
        let reused = table.insert(VkObject::Fence(vk::Fence::null()));
        assert_ne!(reused, fence);
        assert!(table.fence(fence).is_err());
    }

    #[test]
    fn leftovers_tear_down_dependents_first() {
        let command_buffer = VkObject::CommandBuffer(CommandBufferEntry {
            buffer: vk::CommandBuffer::null(),
            pool: vk::CommandPool::null(),
            descriptor_pool: None,
        });
        let pool = VkObject::CommandPool(vk::CommandPool::null());
        let surface = VkObject::Surface(vk::SurfaceKHR::null());
        let view = VkObject::ImageView(vk::ImageView::null());

        assert!(command_buffer.teardown_rank() < pool.teardown_rank());
        assert!(view.teardown_rank() < surface.teardown_rank());
    }
}
