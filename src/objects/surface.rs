use crate::backend::Backend;
use crate::error::Result;
use crate::handle::NativeHandle;
use crate::registry::{DeviceObject, Objects};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Platform window to present to. Only read during creation.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceCreateInfo {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

impl SurfaceCreateInfo {
    pub fn from_window<W>(window: &W) -> Result<Self>
    where
        W: raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| crate::Error::InvalidArgument(format!("display handle: {e}")))?
            .as_raw();
        let window = window
            .window_handle()
            .map_err(|e| crate::Error::InvalidArgument(format!("window handle: {e}")))?
            .as_raw();
        Ok(Self { display, window })
    }
}

pub struct Surface {
    native: NativeHandle,
}

impl DeviceObject for Surface {
    type CreateInfo = SurfaceCreateInfo;

    fn allocate(info: &SurfaceCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        Ok(Self {
            native: backend.allocate_surface(info)?,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
