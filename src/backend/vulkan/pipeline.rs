// Shaders, descriptors, pipeline layouts, pipelines and render passes
//
// A render pass owns its framebuffer and the attachment views the
// framebuffer was built from. Viewport and scissor are dynamic state on
// every graphics pipeline.

use super::device::LogicalDevice;
use super::{convert, resource, ImageEntry, RenderPassEntry};
use crate::error::{Error, Result};
use crate::objects::{
    ComputePipelineCreateInfo, DescriptorPoolCreateInfo, DescriptorSetLayoutCreateInfo, GraphicsPipelineCreateInfo,
    PipelineInterfaceCreateInfo, RenderPassCreateInfo,
};
use crate::types::LoadOp;
use ash::vk;
use std::ffi::CString;

/// Load SPIR-V shader from bytes and create a shader module
pub fn create_shader_module(device: &LogicalDevice, code: &[u8]) -> Result<vk::ShaderModule> {
    // SPIR-V uses 4-byte words; read_spv copies into aligned storage
    let words = ash::util::read_spv(&mut std::io::Cursor::new(code))
        .map_err(|e| Error::InvalidArgument(format!("invalid SPIR-V: {}", e)))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    Ok(unsafe { device.device.create_shader_module(&create_info, None) }?)
}

pub fn create_descriptor_pool(device: &LogicalDevice, info: &DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool> {
    let sizes: Vec<vk::DescriptorPoolSize> = [
        (vk::DescriptorType::UNIFORM_BUFFER, info.uniform_buffers),
        (vk::DescriptorType::STORAGE_BUFFER, info.storage_buffers),
        (vk::DescriptorType::SAMPLED_IMAGE, info.sampled_images),
        (vk::DescriptorType::STORAGE_IMAGE, info.storage_images),
        (vk::DescriptorType::SAMPLER, info.samplers),
    ]
    .into_iter()
    .filter(|&(_, count)| count > 0)
    .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
    .collect();

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(info.max_sets)
        .pool_sizes(&sizes);

    Ok(unsafe { device.device.create_descriptor_pool(&pool_info, None) }?)
}

/// Per command buffer descriptor budget. None when both counts are zero.
pub fn create_transient_descriptor_pool(
    device: &LogicalDevice,
    resources: u32,
    samplers: u32,
) -> Result<Option<vk::DescriptorPool>> {
    if resources == 0 && samplers == 0 {
        return Ok(None);
    }
    let info = DescriptorPoolCreateInfo {
        max_sets: resources.max(samplers),
        uniform_buffers: resources,
        storage_buffers: resources,
        sampled_images: resources,
        storage_images: resources,
        samplers,
    };
    create_descriptor_pool(device, &info).map(Some)
}

pub fn create_descriptor_set_layout(
    device: &LogicalDevice,
    info: &DescriptorSetLayoutCreateInfo,
) -> Result<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = info
        .bindings
        .iter()
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding.binding)
                .descriptor_type(convert::descriptor_type(binding.kind))
                .descriptor_count(binding.count)
                .stage_flags(convert::shader_stages(binding.stages))
                .build()
        })
        .collect();

    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    Ok(unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }?)
}

pub fn allocate_descriptor_set(
    device: &LogicalDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }?;
    sets.into_iter()
        .next()
        .ok_or_else(|| Error::Unsupported("descriptor set allocation returned nothing".into()))
}

pub fn create_pipeline_layout(
    device: &LogicalDevice,
    info: &PipelineInterfaceCreateInfo,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout> {
    let push_constant_ranges: Vec<vk::PushConstantRange> = if info.push_constant_size > 0 {
        vec![vk::PushConstantRange::builder()
            .stage_flags(convert::shader_stages(info.push_constant_stages))
            .offset(0)
            .size(info.push_constant_size)
            .build()]
    } else {
        Vec::new()
    };

    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    Ok(unsafe { device.device.create_pipeline_layout(&layout_info, None) }?)
}

pub fn create_compute_pipeline(
    device: &LogicalDevice,
    info: &ComputePipelineCreateInfo,
    layout: vk::PipelineLayout,
    shader: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let entry_point = CString::new(info.entry_point.as_str()).map_err(|e| Error::InvalidArgument(e.to_string()))?;

    let stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader)
        .name(&entry_point)
        .build();

    let pipeline_info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage)
        .layout(layout)
        .build();

    let pipelines = unsafe {
        device
            .device
            .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| e)
    }?;

    Ok(pipelines[0])
}

/// Shader modules and targets a graphics pipeline is built against.
pub struct GraphicsTargets {
    pub layout: vk::PipelineLayout,
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: Option<vk::ShaderModule>,
    pub render_pass: vk::RenderPass,
    pub color_attachment_count: usize,
}

pub fn create_graphics_pipeline(
    device: &LogicalDevice,
    info: &GraphicsPipelineCreateInfo,
    targets: &GraphicsTargets,
) -> Result<vk::Pipeline> {
    // Shader stages
    let entry_point = c"main";

    let mut shader_stages = vec![vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(targets.vertex_shader)
        .name(entry_point)
        .build()];
    if let Some(fragment_shader) = targets.fragment_shader {
        shader_stages.push(
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader)
                .name(entry_point)
                .build(),
        );
    }

    // Vertex input
    let bindings: Vec<vk::VertexInputBindingDescription> = info
        .vertex_bindings
        .iter()
        .map(|binding| {
            vk::VertexInputBindingDescription::builder()
                .binding(binding.binding)
                .stride(binding.stride)
                .input_rate(vk::VertexInputRate::VERTEX)
                .build()
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = info
        .vertex_bindings
        .iter()
        .flat_map(|binding| binding.attributes.iter())
        .map(|attribute| {
            vk::VertexInputAttributeDescription::builder()
                .binding(attribute.binding)
                .location(attribute.location)
                .format(convert::format(attribute.format))
                .offset(attribute.offset)
                .build()
        })
        .collect();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(convert::topology(info.topology))
        .primitive_restart_enable(false);

    // Viewport and scissor are set while recording
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    // Rasterization
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(convert::polygon_mode(info.polygon_mode))
        .line_width(1.0)
        .cull_mode(convert::cull_mode(info.cull_mode))
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(info.depth_test)
        .depth_write_enable(info.depth_write)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    // Color blending: straight alpha when enabled
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(info.blend_enable)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build();
    let color_blend_attachments = vec![color_blend_attachment; targets.color_attachment_count];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    // Create pipeline
    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(targets.layout)
        .render_pass(targets.render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| e)
    }?;

    Ok(pipelines[0])
}

/// Layout an attachment is expected in when a pass with `op` begins.
fn initial_layout(op: LoadOp, attached: vk::ImageLayout) -> vk::ImageLayout {
    match op {
        LoadOp::Load => attached,
        LoadOp::Clear | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
    }
}

/// Create a single-subpass render pass plus the framebuffer over its
/// attachments. Attachments stay in their attachment layouts afterwards.
pub fn create_render_pass(
    device: &LogicalDevice,
    info: &RenderPassCreateInfo,
    colors: &[&ImageEntry],
    depth: Option<&ImageEntry>,
) -> Result<RenderPassEntry> {
    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();

    for (index, (attachment, image)) in info.color_attachments.iter().zip(colors).enumerate() {
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(convert::format(image.format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(convert::load_op(attachment.load_op))
                .store_op(convert::store_op(attachment.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(initial_layout(attachment.load_op, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );
        color_refs.push(
            vk::AttachmentReference::builder()
                .attachment(index as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build(),
        );
    }

    let depth_ref = match (&info.depth_stencil, depth) {
        (Some(attachment), Some(image)) => {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(convert::format(image.format))
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(convert::load_op(attachment.depth_load_op))
                    .store_op(convert::store_op(attachment.depth_store_op))
                    .stencil_load_op(convert::load_op(attachment.stencil_load_op))
                    .stencil_store_op(convert::store_op(attachment.stencil_store_op))
                    .initial_layout(initial_layout(
                        attachment.depth_load_op,
                        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    ))
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            Some(
                vk::AttachmentReference::builder()
                    .attachment(color_refs.len() as u32)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            )
        }
        _ => None,
    };

    // Single subpass with color and optional depth
    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }
    let subpass = subpass.build();

    // Subpass dependency
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .build();

    let subpasses = [subpass];
    let dependencies = [dependency];
    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.device.create_render_pass(&render_pass_info, None) }?;
    let has_depth = depth_ref.is_some();
    let mut entry = RenderPassEntry {
        render_pass,
        framebuffer: vk::Framebuffer::null(),
        views: Vec::new(),
        color_count: colors.len(),
        has_depth,
    };

    // Framebuffer over one view per attachment
    let images = colors.iter().copied().chain(depth.filter(|_| has_depth));
    for image in images {
        match resource::create_attachment_view(device, image) {
            Ok(view) => entry.views.push(view),
            Err(e) => {
                destroy_render_pass(device, entry);
                return Err(e);
            }
        }
    }

    let framebuffer_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&entry.views)
        .width(info.width)
        .height(info.height)
        .layers(1);

    match unsafe { device.device.create_framebuffer(&framebuffer_info, None) } {
        Ok(framebuffer) => {
            entry.framebuffer = framebuffer;
            Ok(entry)
        }
        Err(e) => {
            destroy_render_pass(device, entry);
            Err(e.into())
        }
    }
}

pub fn destroy_render_pass(device: &LogicalDevice, entry: RenderPassEntry) {
    unsafe {
        if entry.framebuffer != vk::Framebuffer::null() {
            device.device.destroy_framebuffer(entry.framebuffer, None);
        }
        for view in entry.views {
            device.device.destroy_image_view(view, None);
        }
        device.device.destroy_render_pass(entry.render_pass, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_loaded_attachments_keep_their_contents() {
        let attached = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        assert_eq!(initial_layout(LoadOp::Load, attached), attached);
        assert_eq!(initial_layout(LoadOp::Clear, attached), vk::ImageLayout::UNDEFINED);
        assert_eq!(initial_layout(LoadOp::DontCare, attached), vk::ImageLayout::UNDEFINED);
    }
}
