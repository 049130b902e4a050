// Surface creation (platform-specific window connection)
//
// Window and display handles come from raw-window-handle. Only platforms
// whose surface extension the instance enabled are accepted.

use super::instance::VulkanInstance;
use crate::error::{Error, Result};
use crate::objects::SurfaceCreateInfo;
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

pub fn create_surface(instance: &VulkanInstance, info: &SurfaceCreateInfo) -> Result<vk::SurfaceKHR> {
    if instance.surface_loader.is_none() {
        return Err(Error::Unsupported("VK_KHR_surface is not available".into()));
    }
    let require = |name: &std::ffi::CStr| {
        if instance.has_extension(name) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!("{:?} is not available", name)))
        }
    };

    let surface = unsafe {
        match (info.display, info.window) {
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                require(khr::Win32Surface::name())?;
                let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
                let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder().hinstance(hinstance).hwnd(hwnd);
                let loader = khr::Win32Surface::new(&instance.entry, &instance.instance);
                loader.create_win32_surface(&create_info, None)?
            }
            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                require(khr::XlibSurface::name())?;
                let dpy = display.display.map_or(std::ptr::null_mut(), |d| d.as_ptr());
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy.cast())
                    .window(window.window);
                let loader = khr::XlibSurface::new(&instance.entry, &instance.instance);
                loader.create_xlib_surface(&create_info, None)?
            }
            (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
                require(khr::XcbSurface::name())?;
                let connection = display.connection.map_or(std::ptr::null_mut(), |c| c.as_ptr());
                let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                    .connection(connection.cast())
                    .window(window.window.get());
                let loader = khr::XcbSurface::new(&instance.entry, &instance.instance);
                loader.create_xcb_surface(&create_info, None)?
            }
            (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
                require(khr::WaylandSurface::name())?;
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display.display.as_ptr().cast())
                    .surface(window.surface.as_ptr().cast());
                let loader = khr::WaylandSurface::new(&instance.entry, &instance.instance);
                loader.create_wayland_surface(&create_info, None)?
            }
            (display, window) => {
                return Err(Error::Unsupported(format!(
                    "window handle {:?} / display handle {:?}",
                    window, display
                )))
            }
        }
    };

    Ok(surface)
}

pub fn destroy_surface(instance: &VulkanInstance, surface: vk::SurfaceKHR) {
    if let Some(loader) = instance.surface_loader.as_ref() {
        unsafe { loader.destroy_surface(surface, None) };
    }
}
