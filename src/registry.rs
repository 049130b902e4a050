// Device object registry
//
// Every GPU resource kind lives in its own slotmap arena inside `Objects`,
// which is owned by exactly one Device. Creation goes through a per-kind
// backend factory seam (`DeviceObject::allocate`); the generic create /
// destroy / destroy-all machinery below is shared by every kind.
//
// Invariants:
// - A failed allocation registers nothing.
// - Destroying an unknown or already destroyed handle is a silent no-op.
// - `Objects::destroy_all` tears kinds down in declaration order, which puts
//   dependents (command buffers, views, passes) before what they reference.

use crate::backend::Backend;
use crate::error::Result;
use crate::handle::{Handle, NativeHandle};
use crate::objects::*;
use slotmap::{DefaultKey, SlotMap};

/// Arena for one object kind.
pub struct Registry<T> {
    entries: SlotMap<DefaultKey, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: SlotMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn insert(&mut self, object: T) -> Handle<T> {
        Handle::from_key(self.entries.insert(object))
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.entries.get(handle.key())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.entries.get_mut(handle.key())
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        self.entries.remove(handle.key())
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.entries.contains_key(handle.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handles(&self) -> Vec<Handle<T>> {
        self.entries.keys().map(Handle::from_key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.entries.iter().map(|(key, object)| (Handle::from_key(key), object))
    }
}

/// Registry lookup for a kind. Implemented by `object_registries!`.
pub trait Registered: Sized {
    const KIND: ObjectKind;

    fn registry(objects: &Objects) -> &Registry<Self>;
    fn registry_mut(objects: &mut Objects) -> &mut Registry<Self>;
}

/// A backend-allocatable resource kind.
pub trait DeviceObject: Registered + Send + 'static {
    type CreateInfo;

    /// Factory seam: resolve the handles the create info refers to and ask
    /// the backend for a native object.
    fn allocate(
        info: &Self::CreateInfo,
        objects: &Objects,
        backend: &mut dyn Backend,
    ) -> Result<Self>;

    fn native(&self) -> NativeHandle;

    fn release(self, backend: &mut dyn Backend) {
        backend.release(Self::KIND, self.native());
    }
}

macro_rules! object_registries {
    ($($field:ident: $ty:ty => $kind:ident,)*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ObjectKind {
            $($kind,)*
        }

        impl ObjectKind {
            pub const ALL: &'static [ObjectKind] = &[$(ObjectKind::$kind,)*];
        }

        /// Per-kind arenas owned by one Device.
        #[derive(Default)]
        pub struct Objects {
            $(pub(crate) $field: Registry<$ty>,)*
        }

        $(
            impl Registered for $ty {
                const KIND: ObjectKind = ObjectKind::$kind;

                fn registry(objects: &Objects) -> &Registry<Self> {
                    &objects.$field
                }

                fn registry_mut(objects: &mut Objects) -> &mut Registry<Self> {
                    &mut objects.$field
                }
            }
        )*

        impl Objects {
            pub fn count(&self, kind: ObjectKind) -> usize {
                match kind {
                    $(ObjectKind::$kind => self.$field.len(),)*
                }
            }

            pub fn total(&self) -> usize {
                0 $(+ self.$field.len())*
            }

            /// Destroy every registered object, dependents first.
            pub(crate) fn destroy_all(&mut self, backend: &mut dyn Backend) {
                $(destroy_all_objects::<$ty>(self, backend);)*
            }
        }
    };
}

// Declaration order is teardown order.
object_registries! {
    command_buffers: CommandBuffer => CommandBuffer,
    command_pools: CommandPool => CommandPool,
    descriptor_sets: DescriptorSet => DescriptorSet,
    descriptor_pools: DescriptorPool => DescriptorPool,
    graphics_pipelines: GraphicsPipeline => GraphicsPipeline,
    compute_pipelines: ComputePipeline => ComputePipeline,
    pipeline_interfaces: PipelineInterface => PipelineInterface,
    descriptor_set_layouts: DescriptorSetLayout => DescriptorSetLayout,
    shader_modules: ShaderModule => ShaderModule,
    render_passes: RenderPass => RenderPass,
    render_target_views: RenderTargetView => RenderTargetView,
    depth_stencil_views: DepthStencilView => DepthStencilView,
    sampled_image_views: SampledImageView => SampledImageView,
    storage_image_views: StorageImageView => StorageImageView,
    images: Image => Image,
    swapchains: NativeSwapchain => Swapchain,
    surfaces: Surface => Surface,
    buffers: Buffer => Buffer,
    samplers: Sampler => Sampler,
    queries: Query => Query,
    fences: Fence => Fence,
    semaphores: Semaphore => Semaphore,
    queues: Queue => Queue,
}

pub(crate) fn create_object<T: DeviceObject>(
    objects: &mut Objects,
    backend: &mut dyn Backend,
    info: &T::CreateInfo,
) -> Result<Handle<T>> {
    let object = T::allocate(info, objects, backend)?;
    Ok(T::registry_mut(objects).insert(object))
}

/// Returns false when the handle was not registered.
pub(crate) fn destroy_object<T: DeviceObject>(
    objects: &mut Objects,
    backend: &mut dyn Backend,
    handle: Handle<T>,
) -> bool {
    match T::registry_mut(objects).remove(handle) {
        Some(object) => {
            object.release(backend);
            true
        }
        None => false,
    }
}

pub(crate) fn destroy_all_objects<T: DeviceObject>(objects: &mut Objects, backend: &mut dyn Backend) {
    let handles = T::registry(objects).handles();
    if !handles.is_empty() {
        log::debug!("Destroying {} {:?} object(s)", handles.len(), T::KIND);
    }
    for handle in handles {
        destroy_object(objects, backend, handle);
    }
}

/// Resolve a handle to its backend object, failing on null or stale handles.
pub(crate) fn resolve<T: DeviceObject>(objects: &Objects, handle: Handle<T>) -> Result<NativeHandle> {
    lookup(objects, handle).map(DeviceObject::native)
}

pub(crate) fn lookup<T: DeviceObject>(objects: &Objects, handle: Handle<T>) -> Result<&T> {
    if handle.is_null() {
        return Err(crate::Error::InvalidHandle(T::KIND));
    }
    T::registry(objects)
        .get(handle)
        .ok_or(crate::Error::InvalidHandle(T::KIND))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullBackend;
    use crate::types::{Format, ImageUsage};

    fn image_info() -> ImageCreateInfo {
        ImageCreateInfo::render_target_2d(64, 64, Format::R8G8B8A8Unorm, ImageUsage::COLOR_ATTACHMENT)
    }

    #[test]
    fn create_registers_and_destroy_is_idempotent() {
        let mut backend = NullBackend::new();
        let controller = backend.controller();
        let mut objects = Objects::default();

        let image = create_object::<Image>(&mut objects, &mut backend, &image_info()).unwrap();
        assert_eq!(objects.count(ObjectKind::Image), 1);
        assert_eq!(controller.live_count(ObjectKind::Image), 1);

        assert!(destroy_object(&mut objects, &mut backend, image));
        assert!(!destroy_object(&mut objects, &mut backend, image));
        assert_eq!(objects.total(), 0);
        assert_eq!(controller.live_count(ObjectKind::Image), 0);
    }

    #[test]
    fn failed_allocation_registers_nothing() {
        let mut backend = NullBackend::new();
        backend.controller().fail_allocation(ObjectKind::Image, 1);
        let mut objects = Objects::default();

        let result = create_object::<Image>(&mut objects, &mut backend, &image_info());
        assert!(matches!(result, Err(crate::Error::AllocationFailed { .. })));
        assert_eq!(objects.count(ObjectKind::Image), 0);
    }

    #[test]
    fn destroy_all_releases_dependents_first() {
        let mut backend = NullBackend::new();
        let controller = backend.controller();
        let mut objects = Objects::default();

        let image = create_object::<Image>(&mut objects, &mut backend, &image_info()).unwrap();
        let view_info = ImageViewCreateInfo::new(image);
        create_object::<RenderTargetView>(&mut objects, &mut backend, &view_info).unwrap();

        objects.destroy_all(&mut backend);
        assert_eq!(objects.total(), 0);
        assert_eq!(controller.live_total(), 0);

        let released = controller.release_order();
        let view_pos = released.iter().position(|k| *k == ObjectKind::RenderTargetView);
        let image_pos = released.iter().position(|k| *k == ObjectKind::Image);
        assert!(view_pos < image_pos);
    }

    #[test]
    fn lookup_rejects_null_handle() {
        let objects = Objects::default();
        assert!(matches!(
            resolve::<Image>(&objects, Handle::null()),
            Err(crate::Error::InvalidHandle(ObjectKind::Image))
        ));
    }
}
