use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::ShaderStages;
use crate::registry::{lookup, DeviceObject, Objects};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
    Sampler,
}

#[derive(Clone, Debug, Default)]
pub struct DescriptorPoolCreateInfo {
    pub max_sets: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub storage_images: u32,
    pub samplers: u32,
}

impl DescriptorPoolCreateInfo {
    pub fn descriptor_count(&self) -> u32 {
        self.uniform_buffers + self.storage_buffers + self.sampled_images + self.storage_images + self.samplers
    }
}

pub struct DescriptorPool {
    native: NativeHandle,
    pub max_sets: u32,
}

impl DeviceObject for DescriptorPool {
    type CreateInfo = DescriptorPoolCreateInfo;

    fn allocate(info: &DescriptorPoolCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        if info.max_sets == 0 || info.descriptor_count() == 0 {
            return Err(Error::InvalidArgument(
                "descriptor pool needs at least one set and one descriptor".into(),
            ));
        }
        Ok(Self {
            native: backend.allocate_descriptor_pool(info)?,
            max_sets: info.max_sets,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub stages: ShaderStages,
}

#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayoutCreateInfo {
    pub bindings: Vec<DescriptorBinding>,
}

pub struct DescriptorSetLayout {
    native: NativeHandle,
    pub bindings: Vec<DescriptorBinding>,
}

impl DeviceObject for DescriptorSetLayout {
    type CreateInfo = DescriptorSetLayoutCreateInfo;

    fn allocate(
        info: &DescriptorSetLayoutCreateInfo,
        _objects: &Objects,
        backend: &mut dyn Backend,
    ) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = info.bindings.iter().find(|b| !seen.insert(b.binding)) {
            return Err(Error::InvalidArgument(format!("duplicate descriptor binding {}", dup.binding)));
        }
        Ok(Self {
            native: backend.allocate_descriptor_set_layout(info)?,
            bindings: info.bindings.clone(),
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorSetCreateInfo {
    pub pool: Handle<DescriptorPool>,
    pub layout: Handle<DescriptorSetLayout>,
}

pub struct DescriptorSet {
    native: NativeHandle,
    pub pool: Handle<DescriptorPool>,
    pub layout: Handle<DescriptorSetLayout>,
}

impl DeviceObject for DescriptorSet {
    type CreateInfo = DescriptorSetCreateInfo;

    fn allocate(info: &DescriptorSetCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let pool = lookup(objects, info.pool)?.native();
        let layout = lookup(objects, info.layout)?.native();
        Ok(Self {
            native: backend.allocate_descriptor_set(pool, layout)?,
            pool: info.pool,
            layout: info.layout,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
