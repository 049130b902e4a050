// Plain-data conversions between engine types and Vulkan enums/flags

use crate::backend::{AdapterType, ImageViewKind};
use crate::objects::{
    AddressMode, CullMode, DescriptorKind, Filter, PolygonMode, PrimitiveTopology, QueryKind, ShaderStages,
};
use crate::swapchain::PresentMode;
use crate::types::{BufferUsage, Format, ImageUsage, LoadOp, MemoryUsage, Rect, ResourceState, StoreOp, Viewport};
use ash::vk;
use gpu_allocator::MemoryLocation;

pub fn format(format: Format) -> vk::Format {
    match format {
        Format::Undefined => vk::Format::UNDEFINED,
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        Format::D16Unorm => vk::Format::D16_UNORM,
        Format::D32Float => vk::Format::D32_SFLOAT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Reverse of `format`; formats the engine has no name for map to Undefined.
pub fn from_vk_format(format: vk::Format) -> Format {
    match format {
        vk::Format::R8_UNORM => Format::R8Unorm,
        vk::Format::R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::R8G8B8A8Srgb,
        vk::Format::B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::B8G8R8A8Srgb,
        vk::Format::R16G16B16A16_SFLOAT => Format::R16G16B16A16Float,
        vk::Format::R32G32B32A32_SFLOAT => Format::R32G32B32A32Float,
        vk::Format::D16_UNORM => Format::D16Unorm,
        vk::Format::D32_SFLOAT => Format::D32Float,
        vk::Format::D24_UNORM_S8_UINT => Format::D24UnormS8Uint,
        vk::Format::D32_SFLOAT_S8_UINT => Format::D32FloatS8Uint,
        _ => Format::Undefined,
    }
}

pub fn aspect(format: Format) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn image_usage(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    let pairs = [
        (ImageUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (ImageUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (ImageUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (ImageUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
        (ImageUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
        (ImageUsage::DEPTH_STENCIL_ATTACHMENT, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    ];
    for (engine, native) in pairs {
        if usage.contains(engine) {
            flags |= native;
        }
    }
    flags
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    let pairs = [
        (BufferUsage::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsage::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsage::INDIRECT, vk::BufferUsageFlags::INDIRECT_BUFFER),
    ];
    for (engine, native) in pairs {
        if usage.contains(engine) {
            flags |= native;
        }
    }
    flags
}

pub fn memory_location(usage: MemoryUsage) -> MemoryLocation {
    match usage {
        MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
        MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
    }
}

/// Layout, access mask and pipeline stage an image is in for `state`.
pub fn resource_state(state: ResourceState) -> (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags) {
    match state {
        ResourceState::Undefined => (
            vk::ImageLayout::UNDEFINED,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
        ResourceState::General => (
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        ResourceState::RenderTarget => (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ResourceState::DepthStencilWrite => (
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ResourceState::ShaderResource => (
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
        ),
        ResourceState::CopySrc => (
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ResourceState::CopyDst => (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        // Acquire semaphores are waited on at COLOR_ATTACHMENT_OUTPUT
        ResourceState::Present => (
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
    }
}

pub fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(filter: Filter) -> vk::SamplerMipmapMode {
    match filter {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub fn topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

pub fn descriptor_type(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
    }
}

pub fn view_usage(kind: ImageViewKind) -> vk::ImageUsageFlags {
    match kind {
        ImageViewKind::RenderTarget => vk::ImageUsageFlags::COLOR_ATTACHMENT,
        ImageViewKind::DepthStencil => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        ImageViewKind::Sampled => vk::ImageUsageFlags::SAMPLED,
        ImageViewKind::Storage => vk::ImageUsageFlags::STORAGE,
    }
}

pub fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub fn query_type(kind: QueryKind) -> vk::QueryType {
    match kind {
        QueryKind::Occlusion => vk::QueryType::OCCLUSION,
        QueryKind::Timestamp => vk::QueryType::TIMESTAMP,
        QueryKind::PipelineStatistics => vk::QueryType::PIPELINE_STATISTICS,
    }
}

pub fn adapter_type(device_type: vk::PhysicalDeviceType) -> AdapterType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterType::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterType::Cpu,
        _ => AdapterType::Other,
    }
}

pub fn rect(rect: Rect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D {
            width: rect.width,
            height: rect.height,
        },
    }
}

pub fn viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_format_round_trips() {
        let formats = [
            Format::R8Unorm,
            Format::R8G8B8A8Srgb,
            Format::B8G8R8A8Unorm,
            Format::R32G32B32A32Float,
            Format::D24UnormS8Uint,
        ];
        for engine in formats {
            assert_eq!(from_vk_format(format(engine)), engine);
        }
        assert_eq!(from_vk_format(vk::Format::A2B10G10R10_UNORM_PACK32), Format::Undefined);
    }

    #[test]
    fn depth_formats_pick_depth_aspects() {
        assert_eq!(aspect(Format::B8G8R8A8Srgb), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect(Format::D32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect(Format::D32FloatS8Uint),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn states_map_to_layouts() {
        assert_eq!(resource_state(ResourceState::Present).0, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(resource_state(ResourceState::CopyDst).0, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let (layout, access, _) = resource_state(ResourceState::Undefined);
        assert_eq!(layout, vk::ImageLayout::UNDEFINED);
        assert!(access.is_empty());
    }

    #[test]
    fn usage_flags_translate_bit_by_bit() {
        let usage = image_usage(ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC);
        assert_eq!(
            usage,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        );
        assert_eq!(
            buffer_usage(BufferUsage::VERTEX | BufferUsage::INDEX),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER
        );
    }
}
