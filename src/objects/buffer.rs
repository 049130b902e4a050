use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::registry::{DeviceObject, Objects};
use crate::types::{BufferUsage, MemoryUsage};

#[derive(Clone, Debug, Default)]
pub struct BufferCreateInfo {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_usage: MemoryUsage,
    /// Adopt an existing native buffer instead of allocating one.
    pub native: Option<NativeHandle>,
}

pub struct Buffer {
    native: NativeHandle,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_usage: MemoryUsage,
}

impl DeviceObject for Buffer {
    type CreateInfo = BufferCreateInfo;

    fn allocate(info: &BufferCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        if info.size == 0 {
            return Err(Error::InvalidArgument("buffer size must be non-zero".into()));
        }
        Ok(Self {
            native: backend.allocate_buffer(info)?,
            size: info.size,
            usage: info.usage,
            memory_usage: info.memory_usage,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
