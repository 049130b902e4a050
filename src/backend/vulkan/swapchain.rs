// Swapchain - Window presentation
//
// Manages the chain of images the presentation engine owns. Images are
// handed to the engine as raw handles and wrapped there, never freed.
// OUT_OF_DATE surfaces as Error::OutOfDate, SUBOPTIMAL as PresentStatus.

use super::device::LogicalDevice;
use super::instance::VulkanInstance;
use super::{convert, SwapchainEntry};
use crate::error::{Error, PresentStatus, Result};
use crate::swapchain::{PresentMode, SwapchainCreateInfo};
use crate::types::Format;
use ash::vk;

/// What the engine asked for; kept so resizes rebuild with the same choices.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainRequest {
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub color_format: Format,
    pub present_mode: PresentMode,
}

impl From<&SwapchainCreateInfo> for SwapchainRequest {
    fn from(info: &SwapchainCreateInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            image_count: info.image_count,
            color_format: info.color_format,
            present_mode: info.present_mode,
        }
    }
}

pub fn create_swapchain(
    instance: &VulkanInstance,
    device: &LogicalDevice,
    surface: vk::SurfaceKHR,
    queue_family: u32,
    request: SwapchainRequest,
    old_swapchain: vk::SwapchainKHR,
) -> Result<SwapchainEntry> {
    log::info!("Creating swapchain: {}x{}", request.width, request.height);

    let surface_loader = instance
        .surface_loader
        .as_ref()
        .ok_or_else(|| Error::Unsupported("VK_KHR_surface is not available".into()))?;
    let swapchain_loader = device.swapchain_loader()?;

    // Verify the GPU supports presenting to this surface
    let supported = unsafe {
        surface_loader.get_physical_device_surface_support(device.physical_device, queue_family, surface)
    }?;
    if !supported {
        return Err(Error::Unsupported(format!(
            "presenting from queue family {} to this surface",
            queue_family
        )));
    }

    // Query surface capabilities, formats and present modes
    let surface_caps =
        unsafe { surface_loader.get_physical_device_surface_capabilities(device.physical_device, surface) }?;
    let formats = unsafe { surface_loader.get_physical_device_surface_formats(device.physical_device, surface) }?;
    let present_modes =
        unsafe { surface_loader.get_physical_device_surface_present_modes(device.physical_device, surface) }?;

    let surface_format = choose_surface_format(&formats, convert::format(request.color_format))
        .ok_or_else(|| Error::Unsupported("surface reports no formats".into()))?;
    if surface_format.format != convert::format(request.color_format) {
        log::warn!(
            "Surface format {:?} unavailable, using {:?}",
            request.color_format,
            surface_format.format
        );
    }

    let present_mode = choose_present_mode(&present_modes, convert::present_mode(request.present_mode));
    log::info!("Present mode: {:?}", present_mode);

    let extent = choose_extent(&surface_caps, request.width, request.height);
    if extent.width == 0 || extent.height == 0 {
        // Minimized windows report a zero extent until restored
        return Err(Error::OutOfDate);
    }
    let image_count = choose_image_count(&surface_caps, request.image_count);

    let create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
        )
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(surface_caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }?;

    // Get swapchain images
    let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    log::info!("Created swapchain with {} images", images.len());

    Ok(SwapchainEntry {
        swapchain,
        surface,
        queue_family,
        images,
        format: surface_format.format,
        extent,
        request,
    })
}

/// Rebuild `entry` at a new size, retiring the old swapchain.
pub fn resize_swapchain(
    instance: &VulkanInstance,
    device: &LogicalDevice,
    entry: &mut SwapchainEntry,
    width: u32,
    height: u32,
) -> Result<()> {
    let request = SwapchainRequest {
        width,
        height,
        ..entry.request
    };
    let replacement = create_swapchain(instance, device, entry.surface, entry.queue_family, request, entry.swapchain)?;
    let old = std::mem::replace(entry, replacement);
    destroy_swapchain(device, old);
    Ok(())
}

pub fn destroy_swapchain(device: &LogicalDevice, entry: SwapchainEntry) {
    if let Ok(loader) = device.swapchain_loader() {
        unsafe { loader.destroy_swapchain(entry.swapchain, None) };
    }
}

/// Acquire next image for rendering
pub fn acquire_next_image(
    device: &LogicalDevice,
    entry: &SwapchainEntry,
    timeout: u64,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
) -> Result<(u32, PresentStatus)> {
    let loader = device.swapchain_loader()?;
    let (index, suboptimal) = unsafe { loader.acquire_next_image(entry.swapchain, timeout, semaphore, fence) }?;
    Ok((index, PresentStatus::from_suboptimal(suboptimal)))
}

/// Present rendered image to screen
pub fn present(
    device: &LogicalDevice,
    queue: vk::Queue,
    entry: &SwapchainEntry,
    image_index: u32,
    wait_semaphores: &[vk::Semaphore],
) -> Result<PresentStatus> {
    let loader = device.swapchain_loader()?;
    let swapchains = [entry.swapchain];
    let image_indices = [image_index];

    let present_info = vk::PresentInfoKHR::builder()
        .wait_semaphores(wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    let suboptimal = unsafe { loader.queue_present(queue, &present_info) }?;
    Ok(PresentStatus::from_suboptimal(suboptimal))
}

/// The requested format in sRGB nonlinear space, else B8G8R8A8_SRGB, else
/// whatever the surface lists first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR], requested: vk::Format) -> Option<vk::SurfaceFormatKHR> {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };
    find(requested)
        .or_else(|| find(vk::Format::B8G8R8A8_SRGB))
        .or_else(|| formats.first())
        .copied()
}

// FIFO is always supported
fn choose_present_mode(modes: &[vk::PresentModeKHR], requested: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if modes.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut image_count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn requested_format_wins_when_listed() {
        let formats = [srgb(vk::Format::B8G8R8A8_SRGB), srgb(vk::Format::B8G8R8A8_UNORM)];
        let chosen = choose_surface_format(&formats, vk::Format::B8G8R8A8_UNORM).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);

        let chosen = choose_surface_format(&formats, vk::Format::R16G16B16A16_SFLOAT).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        assert!(choose_surface_format(&[], vk::Format::B8G8R8A8_UNORM).is_none());
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_follows_surface_unless_undefined() {
        assert_eq!(choose_extent(&caps(2, 3, (800, 600)), 1024, 768).width, 800);
        let free = choose_extent(&caps(2, 3, (u32::MAX, u32::MAX)), 8000, 768);
        assert_eq!((free.width, free.height), (4096, 768));
    }

    #[test]
    fn image_count_is_clamped_to_surface_limits() {
        assert_eq!(choose_image_count(&caps(2, 3, (1, 1)), 8), 3);
        assert_eq!(choose_image_count(&caps(3, 0, (1, 1)), 2), 3);
        assert_eq!(choose_image_count(&caps(2, 0, (1, 1)), 5), 5);
    }
}
