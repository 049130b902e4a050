// Null backend - software stand-in for a GPU
//
// Hands out ids, remembers what is alive, validates command buffer state and
// logs every recorded command, submission and present. Presentation is
// simulated: on-screen swapchains rotate through their images, XR swapchains
// rotate color and depth sub-images independently.
//
// A `NullController` shares the state with the backend after it has been
// boxed into a Device, for inspection and fault injection.

use super::*;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Result forced onto the next acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NullOutcome {
    OutOfDate,
    Suboptimal,
    Timeout,
    DeviceLost,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitRecord {
    pub queue: NativeHandle,
    pub command_buffers: Vec<NativeHandle>,
    pub wait_semaphores: Vec<NativeHandle>,
    pub signal_semaphores: Vec<NativeHandle>,
    pub fence: Option<NativeHandle>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PresentRecord {
    pub queue: NativeHandle,
    pub swapchain: NativeHandle,
    pub image_index: u32,
    pub wait_semaphores: Vec<NativeHandle>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordingState {
    Initial,
    Recording,
    Executable,
}

struct NullObject {
    kind: ObjectKind,
}

struct NullSwapchain {
    images: SwapchainImages,
    next_index: u32,
    xr: bool,
    xr_color_index: u32,
    xr_depth_index: u32,
}

struct NullState {
    next_id: u64,
    live: HashMap<NativeHandle, NullObject>,
    release_order: Vec<ObjectKind>,
    pending_failures: HashMap<ObjectKind, u32>,
    min_image_count: u32,
    recordings: HashMap<NativeHandle, (RecordingState, Vec<Command>)>,
    swapchains: HashMap<NativeHandle, NullSwapchain>,
    acquire_outcomes: VecDeque<NullOutcome>,
    present_outcomes: VecDeque<NullOutcome>,
    xr_depth_skew: bool,
    submits: Vec<SubmitRecord>,
    presents: Vec<PresentRecord>,
    queue_wait_idle_calls: u32,
    wait_idle_calls: u32,
}

impl NullState {
    fn alloc(&mut self, kind: ObjectKind) -> Result<NativeHandle> {
        if let Some(remaining) = self.pending_failures.get_mut(&kind) {
            *remaining -= 1;
            if *remaining == 0 {
                self.pending_failures.remove(&kind);
                return Err(Error::AllocationFailed {
                    kind,
                    reason: "injected failure".into(),
                });
            }
        }
        self.next_id += 1;
        let native = NativeHandle(self.next_id);
        self.live.insert(native, NullObject { kind });
        Ok(native)
    }

    fn expect_live(&self, native: NativeHandle, kind: ObjectKind) -> Result<()> {
        match self.live.get(&native) {
            Some(object) if object.kind == kind => Ok(()),
            _ => Err(Error::InvalidHandle(kind)),
        }
    }

    fn next_outcome(queue: &mut VecDeque<NullOutcome>) -> Result<PresentStatus> {
        match queue.pop_front() {
            None => Ok(PresentStatus::Optimal),
            Some(NullOutcome::Suboptimal) => Ok(PresentStatus::Suboptimal),
            Some(NullOutcome::OutOfDate) => Err(Error::OutOfDate),
            Some(NullOutcome::Timeout) => Err(Error::Timeout),
            Some(NullOutcome::DeviceLost) => Err(Error::DeviceLost),
        }
    }

    fn create_swapchain_images(&mut self, count: u32, depth: bool, width: u32, height: u32) -> Result<SwapchainImages> {
        let mut images = SwapchainImages {
            width,
            height,
            ..Default::default()
        };
        for _ in 0..count {
            images.color.push(self.alloc(ObjectKind::Image)?);
            if depth {
                images.depth.push(self.alloc(ObjectKind::Image)?);
            }
        }
        Ok(images)
    }

    fn release_swapchain_images(&mut self, images: &SwapchainImages) {
        for native in images.color.iter().chain(images.depth.iter()) {
            self.live.remove(native);
        }
    }
}

pub struct NullBackend {
    adapters: Vec<Adapter>,
    shared: Arc<Mutex<NullState>>,
}

/// Shared view into a NullBackend for tests and diagnostics.
#[derive(Clone)]
pub struct NullController {
    shared: Arc<Mutex<NullState>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_adapter(Self::default_adapter())
    }

    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapters: vec![adapter],
            shared: Arc::new(Mutex::new(NullState {
                next_id: 0,
                live: HashMap::new(),
                release_order: Vec::new(),
                pending_failures: HashMap::new(),
                min_image_count: 2,
                recordings: HashMap::new(),
                swapchains: HashMap::new(),
                acquire_outcomes: VecDeque::new(),
                present_outcomes: VecDeque::new(),
                xr_depth_skew: false,
                submits: Vec::new(),
                presents: Vec::new(),
                queue_wait_idle_calls: 0,
                wait_idle_calls: 0,
            })),
        }
    }

    /// An adapter that supports everything, with four queues of each kind.
    pub fn default_adapter() -> Adapter {
        Adapter {
            name: "Null Adapter".to_string(),
            adapter_type: AdapterType::Cpu,
            vendor_id: 0,
            device_id: 0,
            max_graphics_queues: 4,
            max_compute_queues: 4,
            max_transfer_queues: 4,
            capabilities: Capabilities {
                multi_view: true,
                dynamic_rendering: true,
                index_type_uint8: true,
                pipeline_statistics: true,
                independent_blending: true,
                fragment_stores_and_atomics: true,
                partial_descriptor_bindings: true,
                fragment_density_map: true,
                variable_rate_shading: true,
            },
        }
    }

    pub fn controller(&self) -> NullController {
        NullController {
            shared: self.shared.clone(),
        }
    }

    /// Surface description for presenting without a real window. The null
    /// backend never dereferences the handles.
    pub fn virtual_surface() -> SurfaceCreateInfo {
        use raw_window_handle::{RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle};
        SurfaceCreateInfo {
            display: RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
            window: RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullController {
    /// Make the `nth` next allocation of `kind` fail (1 = the very next one).
    pub fn fail_allocation(&self, kind: ObjectKind, nth: u32) {
        if nth > 0 {
            self.shared.lock().pending_failures.insert(kind, nth);
        }
    }

    /// Smallest image count the simulated surface accepts.
    pub fn set_min_image_count(&self, count: u32) {
        self.shared.lock().min_image_count = count;
    }

    pub fn push_acquire_outcome(&self, outcome: NullOutcome) {
        self.shared.lock().acquire_outcomes.push_back(outcome);
    }

    pub fn push_present_outcome(&self, outcome: NullOutcome) {
        self.shared.lock().present_outcomes.push_back(outcome);
    }

    /// Make XR depth sub-images run one index ahead of color.
    pub fn skew_xr_depth(&self) {
        self.shared.lock().xr_depth_skew = true;
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.shared.lock().live.values().filter(|o| o.kind == kind).count()
    }

    pub fn live_total(&self) -> usize {
        self.shared.lock().live.len()
    }

    pub fn release_order(&self) -> Vec<ObjectKind> {
        self.shared.lock().release_order.clone()
    }

    pub fn recorded(&self, command_buffer: NativeHandle) -> Vec<Command> {
        self.shared
            .lock()
            .recordings
            .get(&command_buffer)
            .map(|(_, commands)| commands.clone())
            .unwrap_or_default()
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.shared.lock().submits.clone()
    }

    pub fn presents(&self) -> Vec<PresentRecord> {
        self.shared.lock().presents.clone()
    }

    pub fn queue_wait_idle_calls(&self) -> u32 {
        self.shared.lock().queue_wait_idle_calls
    }

    pub fn wait_idle_calls(&self) -> u32 {
        self.shared.lock().wait_idle_calls
    }
}

impl Backend for NullBackend {
    fn api(&self) -> Api {
        Api::Null
    }

    fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    fn open_device(&mut self, adapter_index: usize, _info: &DeviceCreateInfo) -> Result<()> {
        if adapter_index >= self.adapters.len() {
            return Err(Error::out_of_range("adapter", adapter_index as u32, self.adapters.len()));
        }
        log::debug!("Null device opened on adapter {}", adapter_index);
        Ok(())
    }

    fn allocate_queue(&mut self, _info: &QueueCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Queue)
    }

    fn allocate_command_pool(&mut self, queue: NativeHandle) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(queue, ObjectKind::Queue)?;
        state.alloc(ObjectKind::CommandPool)
    }

    fn allocate_command_buffer(
        &mut self,
        pool: NativeHandle,
        _info: &CommandBufferCreateInfo,
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(pool, ObjectKind::CommandPool)?;
        let native = state.alloc(ObjectKind::CommandBuffer)?;
        state.recordings.insert(native, (RecordingState::Initial, Vec::new()));
        Ok(native)
    }

    fn allocate_buffer(&mut self, _info: &BufferCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Buffer)
    }

    fn allocate_image(&mut self, _info: &ImageCreateInfo) -> Result<NativeHandle> {
        // Wrapped images get their own id; the wrapped native stays untouched.
        self.shared.lock().alloc(ObjectKind::Image)
    }

    fn allocate_image_view(
        &mut self,
        kind: ImageViewKind,
        image: NativeHandle,
        _info: &ImageViewCreateInfo,
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(image, ObjectKind::Image)?;
        state.alloc(match kind {
            ImageViewKind::RenderTarget => ObjectKind::RenderTargetView,
            ImageViewKind::DepthStencil => ObjectKind::DepthStencilView,
            ImageViewKind::Sampled => ObjectKind::SampledImageView,
            ImageViewKind::Storage => ObjectKind::StorageImageView,
        })
    }

    fn allocate_sampler(&mut self, _info: &SamplerCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Sampler)
    }

    fn allocate_shader_module(&mut self, _info: &ShaderModuleCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::ShaderModule)
    }

    fn allocate_descriptor_pool(&mut self, _info: &DescriptorPoolCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::DescriptorPool)
    }

    fn allocate_descriptor_set_layout(
        &mut self,
        _info: &DescriptorSetLayoutCreateInfo,
    ) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::DescriptorSetLayout)
    }

    fn allocate_descriptor_set(&mut self, pool: NativeHandle, layout: NativeHandle) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(pool, ObjectKind::DescriptorPool)?;
        state.expect_live(layout, ObjectKind::DescriptorSetLayout)?;
        state.alloc(ObjectKind::DescriptorSet)
    }

    fn allocate_pipeline_interface(
        &mut self,
        _info: &PipelineInterfaceCreateInfo,
        set_layouts: &[NativeHandle],
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        for &layout in set_layouts {
            state.expect_live(layout, ObjectKind::DescriptorSetLayout)?;
        }
        state.alloc(ObjectKind::PipelineInterface)
    }

    fn allocate_compute_pipeline(
        &mut self,
        _info: &ComputePipelineCreateInfo,
        interface: NativeHandle,
        shader: NativeHandle,
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(interface, ObjectKind::PipelineInterface)?;
        state.expect_live(shader, ObjectKind::ShaderModule)?;
        state.alloc(ObjectKind::ComputePipeline)
    }

    fn allocate_graphics_pipeline(
        &mut self,
        _info: &GraphicsPipelineCreateInfo,
        natives: &GraphicsPipelineNatives,
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(natives.interface, ObjectKind::PipelineInterface)?;
        state.expect_live(natives.vertex_shader, ObjectKind::ShaderModule)?;
        state.expect_live(natives.render_pass, ObjectKind::RenderPass)?;
        state.alloc(ObjectKind::GraphicsPipeline)
    }

    fn allocate_render_pass(
        &mut self,
        _info: &RenderPassCreateInfo,
        colors: &[NativeHandle],
        depth_stencil: Option<NativeHandle>,
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        for &image in colors.iter().chain(depth_stencil.iter()) {
            state.expect_live(image, ObjectKind::Image)?;
        }
        state.alloc(ObjectKind::RenderPass)
    }

    fn allocate_fence(&mut self, _info: &FenceCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Fence)
    }

    fn allocate_semaphore(&mut self, _info: &SemaphoreCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Semaphore)
    }

    fn allocate_query(&mut self, _info: &QueryCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Query)
    }

    fn allocate_surface(&mut self, _info: &SurfaceCreateInfo) -> Result<NativeHandle> {
        self.shared.lock().alloc(ObjectKind::Surface)
    }

    fn allocate_swapchain(
        &mut self,
        info: &SwapchainCreateInfo,
        queue: NativeHandle,
        surface: Option<NativeHandle>,
    ) -> Result<NativeHandle> {
        let mut state = self.shared.lock();
        state.expect_live(queue, ObjectKind::Queue)?;
        let xr = info.xr_session.is_some();
        if let Some(surface) = surface {
            state.expect_live(surface, ObjectKind::Surface)?;
        } else if !xr {
            return Err(Error::InvalidArgument("native swapchain needs a surface or an XR session".into()));
        }

        let native = state.alloc(ObjectKind::Swapchain)?;
        let count = if xr {
            info.image_count
        } else {
            info.image_count.max(state.min_image_count)
        };
        let depth = xr && !info.depth_format.is_undefined();
        let images = match state.create_swapchain_images(count, depth, info.width, info.height) {
            Ok(images) => images,
            Err(e) => {
                state.live.remove(&native);
                return Err(e);
            }
        };
        state.swapchains.insert(
            native,
            NullSwapchain {
                images,
                next_index: 0,
                xr,
                xr_color_index: 0,
                xr_depth_index: 0,
            },
        );
        Ok(native)
    }

    fn release(&mut self, kind: ObjectKind, native: NativeHandle) {
        let mut state = self.shared.lock();
        if state.live.remove(&native).is_none() {
            log::warn!("Null backend: release of unknown {:?} {:?}", kind, native);
            return;
        }
        state.release_order.push(kind);
        match kind {
            ObjectKind::CommandBuffer => {
                state.recordings.remove(&native);
            }
            ObjectKind::Swapchain => {
                if let Some(swapchain) = state.swapchains.remove(&native) {
                    state.release_swapchain_images(&swapchain.images);
                }
            }
            _ => {}
        }
    }

    fn record(&mut self, command_buffer: NativeHandle, command: &Command) -> Result<()> {
        let mut state = self.shared.lock();
        let (recording_state, commands) = state
            .recordings
            .get_mut(&command_buffer)
            .ok_or(Error::InvalidHandle(ObjectKind::CommandBuffer))?;
        match command {
            Command::Begin => {
                commands.clear();
                *recording_state = RecordingState::Recording;
            }
            _ if *recording_state != RecordingState::Recording => {
                return Err(Error::InvalidArgument(format!(
                    "{:?} recorded outside begin/end",
                    command
                )));
            }
            Command::End => *recording_state = RecordingState::Executable,
            _ => {}
        }
        commands.push(command.clone());
        Ok(())
    }

    fn submit(&mut self, queue: NativeHandle, submit: &NativeSubmit<'_>) -> Result<()> {
        let mut state = self.shared.lock();
        state.expect_live(queue, ObjectKind::Queue)?;
        for command_buffer in submit.command_buffers {
            match state.recordings.get(command_buffer) {
                Some((RecordingState::Executable, _)) => {}
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "command buffer {:?} is not executable",
                        command_buffer
                    )))
                }
            }
        }
        for &semaphore in submit.wait_semaphores.iter().chain(submit.signal_semaphores) {
            state.expect_live(semaphore, ObjectKind::Semaphore)?;
        }
        if let Some(fence) = submit.fence {
            state.expect_live(fence, ObjectKind::Fence)?;
        }
        state.submits.push(SubmitRecord {
            queue,
            command_buffers: submit.command_buffers.to_vec(),
            wait_semaphores: submit.wait_semaphores.to_vec(),
            signal_semaphores: submit.signal_semaphores.to_vec(),
            fence: submit.fence,
        });
        Ok(())
    }

    fn queue_wait_idle(&mut self, queue: NativeHandle) -> Result<()> {
        let mut state = self.shared.lock();
        state.expect_live(queue, ObjectKind::Queue)?;
        state.queue_wait_idle_calls += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.shared.lock().wait_idle_calls += 1;
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: NativeHandle, _timeout: u64) -> Result<()> {
        self.shared.lock().expect_live(fence, ObjectKind::Fence)
    }

    fn reset_fence(&mut self, fence: NativeHandle) -> Result<()> {
        self.shared.lock().expect_live(fence, ObjectKind::Fence)
    }

    fn swapchain_images(&mut self, swapchain: NativeHandle) -> Result<SwapchainImages> {
        self.shared
            .lock()
            .swapchains
            .get(&swapchain)
            .map(|s| s.images.clone())
            .ok_or(Error::InvalidHandle(ObjectKind::Swapchain))
    }

    fn resize_swapchain(&mut self, swapchain: NativeHandle, width: u32, height: u32) -> Result<()> {
        let mut state = self.shared.lock();
        let (count, xr, old_images) = match state.swapchains.get(&swapchain) {
            Some(s) => (s.images.color.len() as u32, s.xr, s.images.clone()),
            None => return Err(Error::InvalidHandle(ObjectKind::Swapchain)),
        };
        if xr {
            return Err(Error::Unsupported("resizing an XR swapchain".into()));
        }
        state.release_swapchain_images(&old_images);
        let count = count.max(state.min_image_count);
        let images = state.create_swapchain_images(count, false, width, height)?;
        if let Some(s) = state.swapchains.get_mut(&swapchain) {
            s.images = images;
            s.next_index = 0;
        }
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        swapchain: NativeHandle,
        _timeout: u64,
        semaphore: Option<NativeHandle>,
        fence: Option<NativeHandle>,
    ) -> Result<(u32, PresentStatus)> {
        let mut state = self.shared.lock();
        if let Some(semaphore) = semaphore {
            state.expect_live(semaphore, ObjectKind::Semaphore)?;
        }
        if let Some(fence) = fence {
            state.expect_live(fence, ObjectKind::Fence)?;
        }
        let status = NullState::next_outcome(&mut state.acquire_outcomes)?;
        let chain = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or(Error::InvalidHandle(ObjectKind::Swapchain))?;
        let count = chain.images.color.len() as u32;
        let index = chain.next_index;
        chain.next_index = (index + 1) % count.max(1);
        Ok((index, status))
    }

    fn present(
        &mut self,
        queue: NativeHandle,
        swapchain: NativeHandle,
        image_index: u32,
        wait_semaphores: &[NativeHandle],
    ) -> Result<PresentStatus> {
        let mut state = self.shared.lock();
        state.expect_live(queue, ObjectKind::Queue)?;
        let count = state
            .swapchains
            .get(&swapchain)
            .map(|s| s.images.color.len())
            .ok_or(Error::InvalidHandle(ObjectKind::Swapchain))?;
        if image_index as usize >= count {
            return Err(Error::out_of_range("swapchain image", image_index, count));
        }
        state.presents.push(PresentRecord {
            queue,
            swapchain,
            image_index,
            wait_semaphores: wait_semaphores.to_vec(),
        });
        NullState::next_outcome(&mut state.present_outcomes)
    }

    fn acquire_xr_image(&mut self, swapchain: NativeHandle, kind: XrImageKind) -> Result<u32> {
        let mut state = self.shared.lock();
        let skew = state.xr_depth_skew;
        let chain = state
            .swapchains
            .get_mut(&swapchain)
            .filter(|s| s.xr)
            .ok_or(Error::InvalidHandle(ObjectKind::Swapchain))?;
        let count = chain.images.color.len() as u32;
        let index = match kind {
            XrImageKind::Color => &mut chain.xr_color_index,
            XrImageKind::Depth => &mut chain.xr_depth_index,
        };
        let acquired = *index;
        *index = (acquired + 1) % count.max(1);
        if kind == XrImageKind::Depth && skew {
            return Ok((acquired + 1) % count.max(1));
        }
        Ok(acquired)
    }

    fn wait_xr_image(&mut self, swapchain: NativeHandle, _kind: XrImageKind, _timeout: u64) -> Result<()> {
        let state = self.shared.lock();
        match state.swapchains.get(&swapchain) {
            Some(s) if s.xr => Ok(()),
            _ => Err(Error::InvalidHandle(ObjectKind::Swapchain)),
        }
    }
}
