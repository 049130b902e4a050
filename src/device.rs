// Device - owner and factory of every GPU object on one adapter
//
// Responsibilities:
// - Validate the adapter choice, queue counts and feature toggles
// - Create the fixed set of graphics/compute/transfer queues up front
// - Route every create/destroy through the generic registry machinery
// - Answer capability queries resolved at creation time
// - Tear everything down, dependents first, when the last Arc goes away
//
// One thread drives a Device at a time per frame; the internal mutex only
// keeps the registry and backend consistent, it does not order GPU work.

use crate::backend::{Adapter, Api, Backend, Command, NativeSubmit, ShadingRateMode, SwapchainImages, XrImageKind};
use crate::error::{Error, PresentStatus, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::*;
use crate::registry::{self, lookup, resolve, DeviceObject, ObjectKind, Objects, Registered};
use crate::swapchain::{Swapchain, SwapchainCreateInfo};
use parking_lot::Mutex;
use std::sync::Arc;

/// Per-command-buffer descriptor budget used when the caller has no better
/// estimate.
pub const DEFAULT_RESOURCE_DESCRIPTOR_COUNT: u32 = 4096;
pub const DEFAULT_SAMPLER_DESCRIPTOR_COUNT: u32 = 256;

#[derive(Clone, Debug)]
pub struct DeviceCreateInfo {
    pub adapter_index: usize,
    pub graphics_queue_count: u32,
    pub compute_queue_count: u32,
    pub transfer_queue_count: u32,
    pub multi_view: bool,
    pub shading_rate_mode: ShadingRateMode,
    /// Extra native extensions to enable, by name.
    pub extensions: Vec<String>,
}

impl Default for DeviceCreateInfo {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            graphics_queue_count: 1,
            compute_queue_count: 0,
            transfer_queue_count: 0,
            multi_view: false,
            shading_rate_mode: ShadingRateMode::None,
            extensions: Vec::new(),
        }
    }
}

struct DeviceState {
    backend: Box<dyn Backend>,
    objects: Objects,
}

pub struct Device {
    create_info: DeviceCreateInfo,
    adapter: Adapter,
    api: Api,
    graphics_queues: Vec<Handle<Queue>>,
    compute_queues: Vec<Handle<Queue>>,
    transfer_queues: Vec<Handle<Queue>>,
    state: Mutex<DeviceState>,
}

impl Device {
    /// Create a device on `backend`.
    ///
    /// Fails with `OutOfRange` for a bad adapter index, `InvalidArgument` for
    /// impossible queue counts, and `Unsupported` when a requested feature is
    /// missing on the adapter. Nothing is downgraded silently.
    pub fn create(mut backend: Box<dyn Backend>, create_info: DeviceCreateInfo) -> Result<Arc<Self>> {
        // Step 1: Resolve the adapter
        let adapters = backend.adapters();
        let adapter = adapters
            .get(create_info.adapter_index)
            .cloned()
            .ok_or_else(|| Error::out_of_range("adapter", create_info.adapter_index as u32, adapters.len()))?;

        // Step 2: Validate queue counts and feature toggles
        Self::validate(&adapter, &create_info)?;

        log::info!(
            "Creating {:?} device on '{}' ({} graphics, {} compute, {} transfer queues)",
            backend.api(),
            adapter.name,
            create_info.graphics_queue_count,
            create_info.compute_queue_count,
            create_info.transfer_queue_count
        );

        // Step 3: Open the native device
        backend.open_device(create_info.adapter_index, &create_info)?;

        let api = backend.api();
        let mut device = Self {
            create_info,
            adapter,
            api,
            graphics_queues: Vec::new(),
            compute_queues: Vec::new(),
            transfer_queues: Vec::new(),
            state: Mutex::new(DeviceState {
                backend,
                objects: Objects::default(),
            }),
        };

        // Step 4: Queues, each with its own command pool. On failure the
        // partially built device is dropped, which destroys what exists.
        device.graphics_queues = device.create_queues(QueueKind::Graphics, device.create_info.graphics_queue_count)?;
        device.compute_queues = device.create_queues(QueueKind::Compute, device.create_info.compute_queue_count)?;
        device.transfer_queues = device.create_queues(QueueKind::Transfer, device.create_info.transfer_queue_count)?;

        Ok(Arc::new(device))
    }

    fn validate(adapter: &Adapter, info: &DeviceCreateInfo) -> Result<()> {
        let total = info.graphics_queue_count + info.compute_queue_count + info.transfer_queue_count;
        if total == 0 {
            return Err(Error::InvalidArgument("device needs at least one queue".into()));
        }

        let limits = [
            ("graphics", info.graphics_queue_count, adapter.max_graphics_queues),
            ("compute", info.compute_queue_count, adapter.max_compute_queues),
            ("transfer", info.transfer_queue_count, adapter.max_transfer_queues),
        ];
        for (name, requested, available) in limits {
            if requested > available {
                return Err(Error::InvalidArgument(format!(
                    "{} {} queues requested, adapter '{}' exposes {}",
                    requested, name, adapter.name, available
                )));
            }
        }

        if info.multi_view && !adapter.capabilities.multi_view {
            return Err(Error::Unsupported(format!("multi-view on '{}'", adapter.name)));
        }
        if !adapter.capabilities.shading_rate(info.shading_rate_mode) {
            return Err(Error::Unsupported(format!(
                "shading rate mode {:?} on '{}'",
                info.shading_rate_mode, adapter.name
            )));
        }
        Ok(())
    }

    fn create_queues(&self, kind: QueueKind, count: u32) -> Result<Vec<Handle<Queue>>> {
        (0..count)
            .map(|index| {
                let queue = self.create_object::<Queue>(&QueueCreateInfo { kind, index })?;
                let pool = self.create_object::<CommandPool>(&CommandPoolCreateInfo { queue })?;
                self.with_state(|objects, _| {
                    if let Some(queue) = objects.queues.get_mut(queue) {
                        queue.command_pool = pool;
                    }
                });
                Ok(queue)
            })
            .collect()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut Objects, &mut dyn Backend) -> R) -> R {
        let mut state = self.state.lock();
        let DeviceState { backend, objects } = &mut *state;
        f(objects, backend.as_mut())
    }

    pub fn api(&self) -> Api {
        self.api
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn create_info(&self) -> &DeviceCreateInfo {
        &self.create_info
    }

    // =========================================================================
    // Generic object lifecycle
    // =========================================================================

    /// Allocate an object through the backend and register it. Nothing is
    /// registered when allocation fails.
    pub fn create_object<T: DeviceObject>(&self, info: &T::CreateInfo) -> Result<Handle<T>> {
        self.with_state(|objects, backend| registry::create_object::<T>(objects, backend, info))
    }

    /// Destroy an object. Unknown or already destroyed handles are ignored.
    pub fn destroy_object<T: DeviceObject>(&self, handle: Handle<T>) {
        if handle.is_null() {
            return;
        }
        let destroyed = self.with_state(|objects, backend| registry::destroy_object(objects, backend, handle));
        if !destroyed {
            log::trace!("Ignoring destroy of unregistered {:?}", T::KIND);
        }
    }

    /// Destroy every object of one kind.
    pub fn destroy_all_objects<T: DeviceObject>(&self) {
        self.with_state(|objects, backend| registry::destroy_all_objects::<T>(objects, backend));
    }

    pub fn object_count<T: Registered>(&self) -> usize {
        self.with_state(|objects, _| T::registry(objects).len())
    }

    pub fn object_count_of(&self, kind: ObjectKind) -> usize {
        self.with_state(|objects, _| objects.count(kind))
    }

    pub fn total_object_count(&self) -> usize {
        self.with_state(|objects, _| objects.total())
    }

    pub fn contains<T: Registered>(&self, handle: Handle<T>) -> bool {
        self.with_state(|objects, _| T::registry(objects).contains(handle))
    }

    /// Backend object behind a handle.
    pub fn native_handle<T: DeviceObject>(&self, handle: Handle<T>) -> Result<NativeHandle> {
        self.with_state(|objects, _| resolve(objects, handle))
    }

    /// Read an object's engine-side record.
    ///
    /// `f` runs with the device lock held: it must not call back into this
    /// Device, or it deadlocks. Copy what you need out instead.
    pub fn with_object<T: DeviceObject, R>(&self, handle: Handle<T>, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.with_state(|objects, _| lookup(objects, handle).map(f))
    }

    // =========================================================================
    // Command buffers and descriptor sets
    // =========================================================================

    pub fn allocate_command_buffer(
        &self,
        pool: Handle<CommandPool>,
        resource_descriptor_count: u32,
        sampler_descriptor_count: u32,
    ) -> Result<Handle<CommandBuffer>> {
        self.create_object::<CommandBuffer>(&CommandBufferCreateInfo {
            pool,
            resource_descriptor_count,
            sampler_descriptor_count,
        })
    }

    /// Allocate from the pool that belongs to `queue`.
    pub fn create_command_buffer(
        &self,
        queue: Handle<Queue>,
        resource_descriptor_count: u32,
        sampler_descriptor_count: u32,
    ) -> Result<Handle<CommandBuffer>> {
        let pool = self.with_object(queue, |queue| queue.command_pool)?;
        self.allocate_command_buffer(pool, resource_descriptor_count, sampler_descriptor_count)
    }

    pub fn free_command_buffer(&self, command_buffer: Handle<CommandBuffer>) {
        self.destroy_object(command_buffer);
    }

    pub fn allocate_descriptor_set(
        &self,
        pool: Handle<DescriptorPool>,
        layout: Handle<DescriptorSetLayout>,
    ) -> Result<Handle<DescriptorSet>> {
        self.create_object::<DescriptorSet>(&DescriptorSetCreateInfo { pool, layout })
    }

    pub fn free_descriptor_set(&self, set: Handle<DescriptorSet>) {
        self.destroy_object(set);
    }

    // =========================================================================
    // Swapchains
    // =========================================================================

    pub fn create_swapchain(self: &Arc<Self>, info: &SwapchainCreateInfo) -> Result<Swapchain> {
        Swapchain::create(self, info)
    }

    pub fn destroy_swapchain(&self, swapchain: Swapchain) {
        drop(swapchain);
    }

    pub(crate) fn swapchain_images(&self, swapchain: Handle<NativeSwapchain>) -> Result<SwapchainImages> {
        self.with_state(|objects, backend| {
            let native = resolve(objects, swapchain)?;
            backend.swapchain_images(native)
        })
    }

    pub(crate) fn resize_native_swapchain(
        &self,
        swapchain: Handle<NativeSwapchain>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.with_state(|objects, backend| {
            let native = resolve(objects, swapchain)?;
            backend.resize_swapchain(native, width, height)
        })
    }

    pub(crate) fn acquire_native_image(
        &self,
        swapchain: Handle<NativeSwapchain>,
        timeout: u64,
        semaphore: Option<Handle<Semaphore>>,
        fence: Option<Handle<Fence>>,
    ) -> Result<(u32, PresentStatus)> {
        self.with_state(|objects, backend| {
            let native = resolve(objects, swapchain)?;
            let semaphore = semaphore.map(|s| resolve(objects, s)).transpose()?;
            let fence = fence.map(|f| resolve(objects, f)).transpose()?;
            backend.acquire_next_image(native, timeout, semaphore, fence)
        })
    }

    pub(crate) fn present_native_image(
        &self,
        queue: Handle<Queue>,
        swapchain: Handle<NativeSwapchain>,
        image_index: u32,
        wait_semaphores: &[Handle<Semaphore>],
    ) -> Result<PresentStatus> {
        self.with_state(|objects, backend| {
            let queue = resolve(objects, queue)?;
            let native = resolve(objects, swapchain)?;
            let waits = resolve_all(objects, wait_semaphores)?;
            backend.present(queue, native, image_index, &waits)
        })
    }

    pub(crate) fn acquire_xr_image(&self, swapchain: Handle<NativeSwapchain>, kind: XrImageKind) -> Result<u32> {
        self.with_state(|objects, backend| {
            let native = resolve(objects, swapchain)?;
            backend.acquire_xr_image(native, kind)
        })
    }

    pub(crate) fn wait_xr_image(
        &self,
        swapchain: Handle<NativeSwapchain>,
        kind: XrImageKind,
        timeout: u64,
    ) -> Result<()> {
        self.with_state(|objects, backend| {
            let native = resolve(objects, swapchain)?;
            backend.wait_xr_image(native, kind, timeout)
        })
    }

    // =========================================================================
    // Queues
    // =========================================================================

    pub fn graphics_queue_count(&self) -> u32 {
        self.graphics_queues.len() as u32
    }

    pub fn compute_queue_count(&self) -> u32 {
        self.compute_queues.len() as u32
    }

    pub fn transfer_queue_count(&self) -> u32 {
        self.transfer_queues.len() as u32
    }

    pub fn graphics_queue(&self, index: u32) -> Result<Handle<Queue>> {
        queue_at(&self.graphics_queues, "graphics queue", index)
    }

    pub fn compute_queue(&self, index: u32) -> Result<Handle<Queue>> {
        queue_at(&self.compute_queues, "compute queue", index)
    }

    pub fn transfer_queue(&self, index: u32) -> Result<Handle<Queue>> {
        queue_at(&self.transfer_queues, "transfer queue", index)
    }

    /// First queue of any kind, preferring graphics, then compute, then
    /// transfer.
    pub fn any_available_queue(&self) -> Option<Handle<Queue>> {
        self.graphics_queues
            .iter()
            .chain(&self.compute_queues)
            .chain(&self.transfer_queues)
            .next()
            .copied()
    }

    pub fn submit(&self, queue: Handle<Queue>, info: &SubmitInfo) -> Result<()> {
        self.with_state(|objects, backend| {
            let queue = resolve(objects, queue)?;
            let command_buffers = resolve_all(objects, &info.command_buffers)?;
            let wait_semaphores = resolve_all(objects, &info.wait_semaphores)?;
            let signal_semaphores = resolve_all(objects, &info.signal_semaphores)?;
            let fence = info.fence.map(|f| resolve(objects, f)).transpose()?;
            backend.submit(
                queue,
                &NativeSubmit {
                    command_buffers: &command_buffers,
                    wait_semaphores: &wait_semaphores,
                    signal_semaphores: &signal_semaphores,
                    fence,
                },
            )
        })
    }

    pub fn queue_wait_idle(&self, queue: Handle<Queue>) -> Result<()> {
        self.with_state(|objects, backend| {
            let queue = resolve(objects, queue)?;
            backend.queue_wait_idle(queue)
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.with_state(|_, backend| backend.wait_idle())
    }

    pub fn wait_for_fence(&self, fence: Handle<Fence>, timeout: u64) -> Result<()> {
        self.with_state(|objects, backend| {
            let fence = resolve(objects, fence)?;
            backend.wait_for_fence(fence, timeout)
        })
    }

    pub fn reset_fence(&self, fence: Handle<Fence>) -> Result<()> {
        self.with_state(|objects, backend| {
            let fence = resolve(objects, fence)?;
            backend.reset_fence(fence)
        })
    }

    pub(crate) fn record(&self, command_buffer: Handle<CommandBuffer>, command: Command) -> Result<()> {
        self.with_state(|objects, backend| {
            let native = resolve(objects, command_buffer)?;
            backend.record(native, &command)
        })
    }

    // =========================================================================
    // Capability queries
    // =========================================================================

    pub fn multi_view_supported(&self) -> bool {
        self.adapter.capabilities.multi_view
    }

    pub fn dynamic_rendering_supported(&self) -> bool {
        self.adapter.capabilities.dynamic_rendering
    }

    pub fn index_type_uint8_supported(&self) -> bool {
        self.adapter.capabilities.index_type_uint8
    }

    pub fn pipeline_stats_available(&self) -> bool {
        self.adapter.capabilities.pipeline_statistics
    }

    pub fn independent_blending_supported(&self) -> bool {
        self.adapter.capabilities.independent_blending
    }

    pub fn fragment_stores_and_atomics_supported(&self) -> bool {
        self.adapter.capabilities.fragment_stores_and_atomics
    }

    pub fn partial_descriptor_bindings_supported(&self) -> bool {
        self.adapter.capabilities.partial_descriptor_bindings
    }

    pub fn shading_rate_supported(&self, mode: ShadingRateMode) -> bool {
        self.adapter.capabilities.shading_rate(mode)
    }
}

fn queue_at(queues: &[Handle<Queue>], what: &'static str, index: u32) -> Result<Handle<Queue>> {
    queues
        .get(index as usize)
        .copied()
        .ok_or_else(|| Error::out_of_range(what, index, queues.len()))
}

fn resolve_all<T: DeviceObject>(objects: &Objects, handles: &[Handle<T>]) -> Result<Vec<NativeHandle>> {
    handles.iter().map(|&handle| resolve(objects, handle)).collect()
}

/// `create_*` / `destroy_*` pairs for kinds whose create info is all they need.
macro_rules! object_api {
    ($($create:ident / $destroy:ident => $ty:ty,)*) => {
        impl Device {
            $(
                pub fn $create(&self, info: &<$ty as DeviceObject>::CreateInfo) -> Result<Handle<$ty>> {
                    self.create_object::<$ty>(info)
                }

                pub fn $destroy(&self, handle: Handle<$ty>) {
                    self.destroy_object(handle)
                }
            )*
        }
    };
}

object_api! {
    create_buffer / destroy_buffer => Buffer,
    create_image / destroy_image => Image,
    create_render_target_view / destroy_render_target_view => RenderTargetView,
    create_depth_stencil_view / destroy_depth_stencil_view => DepthStencilView,
    create_sampled_image_view / destroy_sampled_image_view => SampledImageView,
    create_storage_image_view / destroy_storage_image_view => StorageImageView,
    create_sampler / destroy_sampler => Sampler,
    create_shader_module / destroy_shader_module => ShaderModule,
    create_descriptor_pool / destroy_descriptor_pool => DescriptorPool,
    create_descriptor_set_layout / destroy_descriptor_set_layout => DescriptorSetLayout,
    create_pipeline_interface / destroy_pipeline_interface => PipelineInterface,
    create_compute_pipeline / destroy_compute_pipeline => ComputePipeline,
    create_graphics_pipeline / destroy_graphics_pipeline => GraphicsPipeline,
    create_render_pass / destroy_render_pass => RenderPass,
    create_command_pool / destroy_command_pool => CommandPool,
    create_fence / destroy_fence => Fence,
    create_semaphore / destroy_semaphore => Semaphore,
    create_query / destroy_query => Query,
    create_surface / destroy_surface => Surface,
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying device ({} objects)...", self.state.get_mut().objects.total());

        let DeviceState { backend, objects } = self.state.get_mut();
        if let Err(e) = backend.wait_idle() {
            log::warn!("wait_idle failed during device teardown: {}", e);
        }
        objects.destroy_all(backend.as_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, NullController};
    use crate::types::{BufferUsage, Format, ImageUsage};

    fn null_device(info: DeviceCreateInfo) -> (Arc<Device>, NullController) {
        let backend = NullBackend::new();
        let controller = backend.controller();
        (Device::create(Box::new(backend), info).unwrap(), controller)
    }

    #[test]
    fn creates_requested_queues_with_pools() {
        let (device, _) = null_device(DeviceCreateInfo {
            graphics_queue_count: 2,
            compute_queue_count: 1,
            ..Default::default()
        });
        assert_eq!(device.graphics_queue_count(), 2);
        assert_eq!(device.compute_queue_count(), 1);
        assert_eq!(device.transfer_queue_count(), 0);
        assert_eq!(device.object_count::<Queue>(), 3);
        assert_eq!(device.object_count::<CommandPool>(), 3);
        assert_eq!(device.any_available_queue(), Some(device.graphics_queue(0).unwrap()));
    }

    #[test]
    fn queue_index_out_of_range() {
        let (device, _) = null_device(DeviceCreateInfo::default());
        assert!(matches!(
            device.graphics_queue(1),
            Err(Error::OutOfRange { index: 1, count: 1, .. })
        ));
        assert!(device.transfer_queue(0).is_err());
    }

    #[test]
    fn any_available_queue_falls_back_across_kinds() {
        let (device, _) = null_device(DeviceCreateInfo {
            graphics_queue_count: 0,
            transfer_queue_count: 1,
            ..Default::default()
        });
        assert_eq!(device.any_available_queue(), Some(device.transfer_queue(0).unwrap()));
    }

    #[test]
    fn rejects_bad_adapter_and_queue_counts() {
        let bad_adapter = Device::create(
            Box::new(NullBackend::new()),
            DeviceCreateInfo {
                adapter_index: 3,
                ..Default::default()
            },
        );
        assert!(matches!(bad_adapter, Err(Error::OutOfRange { .. })));

        let no_queues = Device::create(
            Box::new(NullBackend::new()),
            DeviceCreateInfo {
                graphics_queue_count: 0,
                ..Default::default()
            },
        );
        assert!(matches!(no_queues, Err(Error::InvalidArgument(_))));

        let too_many = Device::create(
            Box::new(NullBackend::new()),
            DeviceCreateInfo {
                graphics_queue_count: 9,
                ..Default::default()
            },
        );
        assert!(matches!(too_many, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn unsupported_features_are_errors() {
        let mut adapter = NullBackend::default_adapter();
        adapter.capabilities.multi_view = false;
        adapter.capabilities.variable_rate_shading = false;

        let multi_view = Device::create(
            Box::new(NullBackend::with_adapter(adapter.clone())),
            DeviceCreateInfo {
                multi_view: true,
                ..Default::default()
            },
        );
        assert!(matches!(multi_view, Err(Error::Unsupported(_))));

        let vrs = Device::create(
            Box::new(NullBackend::with_adapter(adapter)),
            DeviceCreateInfo {
                shading_rate_mode: ShadingRateMode::Vrs,
                ..Default::default()
            },
        );
        assert!(matches!(vrs, Err(Error::Unsupported(_))));
    }

    #[test]
    fn capability_queries_reflect_adapter() {
        let mut adapter = NullBackend::default_adapter();
        adapter.capabilities.index_type_uint8 = false;
        let device = Device::create(Box::new(NullBackend::with_adapter(adapter)), DeviceCreateInfo::default()).unwrap();
        assert!(!device.index_type_uint8_supported());
        assert!(device.multi_view_supported());
        assert!(device.dynamic_rendering_supported());
        assert!(device.shading_rate_supported(ShadingRateMode::None));
    }

    #[test]
    fn queue_creation_failure_rolls_back() {
        let backend = NullBackend::new();
        let controller = backend.controller();
        controller.fail_allocation(ObjectKind::CommandPool, 2);
        let result = Device::create(
            Box::new(backend),
            DeviceCreateInfo {
                graphics_queue_count: 2,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
        assert_eq!(controller.live_total(), 0);
    }

    #[test]
    fn double_destroy_is_a_no_op() {
        let (device, controller) = null_device(DeviceCreateInfo::default());
        let baseline = device.total_object_count();

        let buffer = device
            .create_buffer(&BufferCreateInfo {
                size: 256,
                usage: BufferUsage::UNIFORM,
                ..Default::default()
            })
            .unwrap();
        let image = device
            .create_image(&ImageCreateInfo::render_target_2d(
                32,
                32,
                Format::R8G8B8A8Unorm,
                ImageUsage::SAMPLED,
            ))
            .unwrap();
        let fence = device.create_fence(&FenceCreateInfo { signaled: true }).unwrap();
        let semaphore = device.create_semaphore(&SemaphoreCreateInfo::default()).unwrap();
        let sampler = device.create_sampler(&SamplerCreateInfo::default()).unwrap();

        device.destroy_buffer(buffer);
        device.destroy_buffer(buffer);
        device.destroy_image(image);
        device.destroy_image(image);
        device.destroy_fence(fence);
        device.destroy_fence(fence);
        device.destroy_semaphore(semaphore);
        device.destroy_semaphore(semaphore);
        device.destroy_sampler(sampler);
        device.destroy_sampler(sampler);

        assert_eq!(device.total_object_count(), baseline);
        assert_eq!(controller.live_total(), baseline);

        // Registry still works after double destroys
        let again = device.create_fence(&FenceCreateInfo::default()).unwrap();
        assert!(device.contains(again));
        assert_ne!(again, fence);
    }

    #[test]
    fn command_buffers_come_from_the_queue_pool() {
        let (device, _) = null_device(DeviceCreateInfo::default());
        let queue = device.graphics_queue(0).unwrap();
        let command_buffer = device
            .create_command_buffer(queue, DEFAULT_RESOURCE_DESCRIPTOR_COUNT, DEFAULT_SAMPLER_DESCRIPTOR_COUNT)
            .unwrap();
        let pool = device.with_object(queue, |q| q.command_pool).unwrap();
        let (owner, resources) = device
            .with_object(command_buffer, |cb| (cb.pool, cb.resource_descriptor_count))
            .unwrap();
        assert_eq!(owner, pool);
        assert_eq!(resources, DEFAULT_RESOURCE_DESCRIPTOR_COUNT);
    }

    #[test]
    fn descriptor_sets_resolve_pool_and_layout() {
        let (device, _) = null_device(DeviceCreateInfo::default());
        let pool = device
            .create_descriptor_pool(&DescriptorPoolCreateInfo {
                max_sets: 4,
                uniform_buffers: 4,
                ..Default::default()
            })
            .unwrap();
        let layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutCreateInfo {
                bindings: vec![DescriptorBinding {
                    binding: 0,
                    kind: DescriptorKind::UniformBuffer,
                    count: 1,
                    stages: ShaderStages::ALL_GRAPHICS,
                }],
            })
            .unwrap();
        let set = device.allocate_descriptor_set(pool, layout).unwrap();
        assert!(device.contains(set));

        device.destroy_descriptor_set_layout(layout);
        assert!(matches!(
            device.allocate_descriptor_set(pool, layout),
            Err(Error::InvalidHandle(ObjectKind::DescriptorSetLayout))
        ));
        device.free_descriptor_set(set);
        assert!(!device.contains(set));
    }

    #[test]
    fn submit_requires_ended_command_buffers() {
        let (device, controller) = null_device(DeviceCreateInfo::default());
        let queue = device.graphics_queue(0).unwrap();
        let command_buffer = device.create_command_buffer(queue, 0, 0).unwrap();
        let submit = SubmitInfo {
            command_buffers: vec![command_buffer],
            ..Default::default()
        };
        assert!(device.submit(queue, &submit).is_err());

        let mut recorder = CommandRecorder::new(&device, command_buffer);
        recorder.begin().unwrap();
        recorder.end().unwrap();
        device.submit(queue, &submit).unwrap();
        assert_eq!(controller.submits().len(), 1);
    }

    #[test]
    fn dropping_the_device_releases_everything() {
        let (device, controller) = null_device(DeviceCreateInfo::default());
        let queue = device.graphics_queue(0).unwrap();
        device.create_command_buffer(queue, 0, 0).unwrap();
        device.create_semaphore(&SemaphoreCreateInfo::default()).unwrap();
        assert!(controller.live_total() > 0);

        drop(device);
        assert_eq!(controller.live_total(), 0);
        assert_eq!(controller.wait_idle_calls(), 1);
        let order = controller.release_order();
        let buffer = order.iter().position(|k| *k == ObjectKind::CommandBuffer).unwrap();
        let pool = order.iter().position(|k| *k == ObjectKind::CommandPool).unwrap();
        let queue = order.iter().position(|k| *k == ObjectKind::Queue).unwrap();
        assert!(buffer < pool && pool < queue);
    }
}
