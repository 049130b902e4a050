use crate::backend::Backend;
use crate::error::Result;
use crate::handle::{Handle, NativeHandle};
use crate::objects::{Queue, Surface};
use crate::registry::{lookup, DeviceObject, Objects};
use crate::swapchain::SwapchainCreateInfo;

/// The backend half of a swapchain: the presentable surface images, or the
/// XR runtime's color/depth swapchains. Engine-side state lives in
/// `crate::swapchain::Swapchain`.
pub struct NativeSwapchain {
    native: NativeHandle,
    pub queue: Handle<Queue>,
    pub surface: Option<Handle<Surface>>,
    pub xr: bool,
}

impl DeviceObject for NativeSwapchain {
    type CreateInfo = SwapchainCreateInfo;

    fn allocate(info: &SwapchainCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let queue = lookup(objects, info.queue)?.native();
        let surface = info
            .surface
            .map(|surface| lookup(objects, surface).map(DeviceObject::native))
            .transpose()?;
        Ok(Self {
            native: backend.allocate_swapchain(info, queue, surface)?,
            queue: info.queue,
            surface: info.surface,
            xr: info.xr_session.is_some(),
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
