// Fences and semaphores
//
// Fences: CPU-observable completion. Semaphores: GPU-GPU ordering.

use crate::backend::Backend;
use crate::error::Result;
use crate::handle::NativeHandle;
use crate::registry::{DeviceObject, Objects};

#[derive(Clone, Debug, Default)]
pub struct FenceCreateInfo {
    /// Start signaled so the first wait returns immediately.
    pub signaled: bool,
}

pub struct Fence {
    native: NativeHandle,
}

impl DeviceObject for Fence {
    type CreateInfo = FenceCreateInfo;

    fn allocate(info: &FenceCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        Ok(Self {
            native: backend.allocate_fence(info)?,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Debug, Default)]
pub struct SemaphoreCreateInfo {}

pub struct Semaphore {
    native: NativeHandle,
}

impl DeviceObject for Semaphore {
    type CreateInfo = SemaphoreCreateInfo;

    fn allocate(info: &SemaphoreCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        Ok(Self {
            native: backend.allocate_semaphore(info)?,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
