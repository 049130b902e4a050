use crate::backend::Backend;
use crate::error::Result;
use crate::handle::NativeHandle;
use crate::registry::{DeviceObject, Objects};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Debug)]
pub struct SamplerCreateInfo {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode: AddressMode,
    /// 0.0 disables anisotropic filtering.
    pub max_anisotropy: f32,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerCreateInfo {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
            max_anisotropy: 0.0,
            min_lod: 0.0,
            max_lod: 1000.0,
        }
    }
}

pub struct Sampler {
    native: NativeHandle,
}

impl DeviceObject for Sampler {
    type CreateInfo = SamplerCreateInfo;

    fn allocate(info: &SamplerCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        Ok(Self {
            native: backend.allocate_sampler(info)?,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
