// Command recording
//
// Translates backend-neutral `Command`s into vkCmd* calls. Barriers are
// derived from the logical resource states; an image that has never been
// transitioned is treated as UNDEFINED so its first barrier is always legal.

use super::device::LogicalDevice;
use super::{convert, CommandBufferEntry, ImageEntry, RenderPassEntry};
use crate::error::Result;
use crate::types::{ClearColor, DepthStencilClear, ImageCopyRegion, Rect, ResourceState, Viewport};
use ash::vk;

/// Reset and begin a one-shot recording. The per-buffer descriptor pool is
/// reset along with it.
pub fn begin(device: &LogicalDevice, entry: &CommandBufferEntry) -> Result<()> {
    unsafe {
        if let Some(pool) = entry.descriptor_pool {
            device.device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        device
            .device
            .reset_command_buffer(entry.buffer, vk::CommandBufferResetFlags::empty())?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.device.begin_command_buffer(entry.buffer, &begin_info)?;
    }
    Ok(())
}

pub fn end(device: &LogicalDevice, entry: &CommandBufferEntry) -> Result<()> {
    unsafe { device.device.end_command_buffer(entry.buffer) }?;
    Ok(())
}

/// Layout the barrier transitions from, given what the engine believes.
fn source_state(image: &ImageEntry, before: ResourceState) -> ResourceState {
    if image.initialized {
        before
    } else {
        ResourceState::Undefined
    }
}

pub fn transition_image(
    device: &LogicalDevice,
    cmd: vk::CommandBuffer,
    image: &mut ImageEntry,
    before: ResourceState,
    after: ResourceState,
) {
    let (old_layout, src_access, src_stage) = convert::resource_state(source_state(image, before));
    let (new_layout, dst_access, dst_stage) = convert::resource_state(after);

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: convert::aspect(image.format),
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: image.array_layers,
        })
        .build();

    unsafe {
        device.device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    image.initialized = true;
}

/// Clear values in attachment order: colors first, then depth/stencil.
/// Missing color clears default to transparent black.
fn clear_values(pass: &RenderPassEntry, colors: &[ClearColor], depth_stencil: DepthStencilClear) -> Vec<vk::ClearValue> {
    let mut values: Vec<vk::ClearValue> = (0..pass.color_count)
        .map(|i| vk::ClearValue {
            color: vk::ClearColorValue {
                float32: colors.get(i).copied().unwrap_or(ClearColor::TRANSPARENT).0,
            },
        })
        .collect();
    if pass.has_depth {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: depth_stencil.depth,
                stencil: depth_stencil.stencil,
            },
        });
    }
    values
}

pub fn begin_render_pass(
    device: &LogicalDevice,
    cmd: vk::CommandBuffer,
    pass: &RenderPassEntry,
    render_area: Rect,
    colors: &[ClearColor],
    depth_stencil: DepthStencilClear,
) {
    let clear_values = clear_values(pass, colors, depth_stencil);
    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(pass.render_pass)
        .framebuffer(pass.framebuffer)
        .render_area(convert::rect(render_area))
        .clear_values(&clear_values);

    unsafe {
        device
            .device
            .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
    }
}

pub fn end_render_pass(device: &LogicalDevice, cmd: vk::CommandBuffer) {
    unsafe { device.device.cmd_end_render_pass(cmd) };
}

/// Unscaled copy of the first color layer. Both images must already be in
/// their transfer layouts.
pub fn copy_image(device: &LogicalDevice, cmd: vk::CommandBuffer, src: vk::Image, dst: vk::Image, region: ImageCopyRegion) {
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let copy = vk::ImageCopy {
        src_subresource: layers,
        src_offset: vk::Offset3D {
            x: region.src_offset.x,
            y: region.src_offset.y,
            z: 0,
        },
        dst_subresource: layers,
        dst_offset: vk::Offset3D {
            x: region.dst_offset.x,
            y: region.dst_offset.y,
            z: 0,
        },
        extent: vk::Extent3D {
            width: region.extent.width,
            height: region.extent.height,
            depth: 1,
        },
    };

    unsafe {
        device.device.cmd_copy_image(
            cmd,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy],
        );
    }
}

pub fn set_viewports(device: &LogicalDevice, cmd: vk::CommandBuffer, viewports: &[Viewport]) {
    let viewports: Vec<vk::Viewport> = viewports.iter().map(convert::viewport).collect();
    unsafe { device.device.cmd_set_viewport(cmd, 0, &viewports) };
}

pub fn set_scissors(device: &LogicalDevice, cmd: vk::CommandBuffer, scissors: &[Rect]) {
    let scissors: Vec<vk::Rect2D> = scissors.iter().copied().map(convert::rect).collect();
    unsafe { device.device.cmd_set_scissor(cmd, 0, &scissors) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Format;

    fn image(initialized: bool) -> ImageEntry {
        ImageEntry {
            image: vk::Image::null(),
            allocation: None,
            format: Format::B8G8R8A8Unorm,
            array_layers: 1,
            initialized,
        }
    }

    #[test]
    fn first_transition_starts_from_undefined() {
        assert_eq!(source_state(&image(false), ResourceState::Present), ResourceState::Undefined);
        assert_eq!(source_state(&image(true), ResourceState::Present), ResourceState::Present);
    }

    #[test]
    fn clear_values_pad_colors_and_append_depth() {
        let pass = RenderPassEntry {
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            views: Vec::new(),
            color_count: 2,
            has_depth: true,
        };
        let values = clear_values(&pass, &[ClearColor([1.0, 0.0, 0.0, 1.0])], DepthStencilClear::default());
        assert_eq!(values.len(), 3);
        unsafe {
            assert_eq!(values[0].color.float32, [1.0, 0.0, 0.0, 1.0]);
            assert_eq!(values[1].color.float32, [0.0; 4]);
            assert_eq!(values[2].depth_stencil.depth, 1.0);
        }
    }
}
