// Buffers, images, image views and samplers
//
// Memory comes from gpu-allocator. Objects adopted from outside the engine
// (`native: Some(..)`) carry no allocation and are never destroyed here.

use super::device::LogicalDevice;
use super::{convert, BufferEntry, ImageEntry};
use crate::backend::ImageViewKind;
use crate::error::Result;
use crate::objects::{BufferCreateInfo, ImageCreateInfo, ImageViewCreateInfo, SamplerCreateInfo};
use ash::vk::{self, Handle};
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};

/// Create a GPU buffer and bind freshly allocated memory to it
pub fn create_buffer(device: &mut LogicalDevice, info: &BufferCreateInfo) -> Result<BufferEntry> {
    if let Some(native) = info.native {
        return Ok(BufferEntry {
            buffer: vk::Buffer::from_raw(native.0),
            allocation: None,
        });
    }

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(info.size)
        .usage(convert::buffer_usage(info.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }?;

    // Get memory requirements
    let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let allocation = device.allocator().and_then(|allocator| {
        Ok(allocator.allocate(&AllocationCreateDesc {
            name: "buffer",
            requirements,
            location: convert::memory_location(info.memory_usage),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    // Bind memory to buffer
    let bound = unsafe { device.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) };
    let entry = BufferEntry {
        buffer,
        allocation: Some(allocation),
    };
    if let Err(e) = bound {
        destroy_buffer(device, entry);
        return Err(e.into());
    }
    Ok(entry)
}

pub fn destroy_buffer(device: &mut LogicalDevice, entry: BufferEntry) {
    let Some(allocation) = entry.allocation else {
        return;
    };
    unsafe { device.device.destroy_buffer(entry.buffer, None) };
    if let Ok(allocator) = device.allocator() {
        if let Err(e) = allocator.free(allocation) {
            log::warn!("Failed to free buffer memory: {}", e);
        }
    }
}

/// Create an image (or adopt a native one) with optimal tiling
pub fn create_image(device: &mut LogicalDevice, info: &ImageCreateInfo) -> Result<ImageEntry> {
    let mut entry = ImageEntry {
        image: vk::Image::null(),
        allocation: None,
        format: info.format,
        array_layers: info.array_layers.max(1),
        initialized: false,
    };

    if let Some(native) = info.native {
        entry.image = vk::Image::from_raw(native.0);
        return Ok(entry);
    }

    let image_type = if info.depth > 1 {
        vk::ImageType::TYPE_3D
    } else {
        vk::ImageType::TYPE_2D
    };
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(image_type)
        .extent(vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: info.depth.max(1),
        })
        .mip_levels(info.mip_levels.max(1))
        .array_layers(entry.array_layers)
        .format(convert::format(info.format))
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(convert::image_usage(info.usage))
        .samples(vk::SampleCountFlags::TYPE_1)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe { device.device.create_image(&image_info, None) }?;
    let requirements = unsafe { device.device.get_image_memory_requirements(image) };

    let allocation = device.allocator().and_then(|allocator| {
        Ok(allocator.allocate(&AllocationCreateDesc {
            name: "image",
            requirements,
            location: convert::memory_location(info.memory_usage),
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.device.destroy_image(image, None) };
            return Err(e);
        }
    };

    let bound = unsafe { device.device.bind_image_memory(image, allocation.memory(), allocation.offset()) };
    entry.image = image;
    entry.allocation = Some(allocation);
    if let Err(e) = bound {
        destroy_image(device, entry);
        return Err(e.into());
    }
    Ok(entry)
}

/// Destroy an image the engine allocated. Adopted images are only forgotten.
pub fn destroy_image(device: &mut LogicalDevice, entry: ImageEntry) {
    let Some(allocation) = entry.allocation else {
        return;
    };
    unsafe { device.device.destroy_image(entry.image, None) };
    if let Ok(allocator) = device.allocator() {
        if let Err(e) = allocator.free(allocation) {
            log::warn!("Failed to free image memory: {}", e);
        }
    }
}

pub fn create_image_view(
    device: &LogicalDevice,
    image: &ImageEntry,
    kind: ImageViewKind,
    info: &ImageViewCreateInfo,
) -> Result<vk::ImageView> {
    let format = if info.format.is_undefined() {
        image.format
    } else {
        info.format
    };
    let layer_count = if info.array_layer_count == 0 {
        vk::REMAINING_ARRAY_LAYERS
    } else {
        info.array_layer_count
    };
    let view_type = if (layer_count > 1 && layer_count != vk::REMAINING_ARRAY_LAYERS) || image.array_layers > 1 {
        vk::ImageViewType::TYPE_2D_ARRAY
    } else {
        vk::ImageViewType::TYPE_2D
    };

    // Restrict the view to the usage it is created for
    let mut usage = vk::ImageViewUsageCreateInfo::builder().usage(convert::view_usage(kind));
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image.image)
        .view_type(view_type)
        .format(convert::format(format))
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: convert::aspect(format),
            base_mip_level: info.base_mip_level,
            level_count: if info.mip_level_count == 0 {
                vk::REMAINING_MIP_LEVELS
            } else {
                info.mip_level_count
            },
            base_array_layer: info.base_array_layer,
            layer_count,
        })
        .push_next(&mut usage);

    Ok(unsafe { device.device.create_image_view(&view_info, None) }?)
}

/// View over the whole first layer, used for framebuffer attachments.
pub fn create_attachment_view(device: &LogicalDevice, image: &ImageEntry) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(convert::format(image.format))
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: convert::aspect(image.format),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    Ok(unsafe { device.device.create_image_view(&view_info, None) }?)
}

pub fn create_sampler(device: &LogicalDevice, info: &SamplerCreateInfo) -> Result<vk::Sampler> {
    let anisotropy = device.features.sampler_anisotropy && info.max_anisotropy > 0.0;
    let address_mode = convert::address_mode(info.address_mode);

    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(convert::filter(info.mag_filter))
        .min_filter(convert::filter(info.min_filter))
        .mipmap_mode(convert::mipmap_mode(info.mipmap_filter))
        .address_mode_u(address_mode)
        .address_mode_v(address_mode)
        .address_mode_w(address_mode)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(info.max_anisotropy.min(device.features.max_anisotropy).max(1.0))
        .min_lod(info.min_lod)
        .max_lod(info.max_lod)
        .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);

    Ok(unsafe { device.device.create_sampler(&sampler_info, None) }?)
}
