// Shader modules, pipeline interfaces (layouts) and pipelines
//
// Pipeline state compilation lives in the backend. The engine only tracks
// what each pipeline was built from.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::handle::{Handle, NativeHandle};
use crate::objects::{DescriptorSetLayout, RenderPass};
use crate::registry::{lookup, DeviceObject, Objects};
use crate::types::Format;
use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

#[derive(Clone, Debug, Default)]
pub struct ShaderModuleCreateInfo {
    /// SPIR-V bytecode.
    pub code: Vec<u8>,
}

pub struct ShaderModule {
    native: NativeHandle,
}

impl DeviceObject for ShaderModule {
    type CreateInfo = ShaderModuleCreateInfo;

    fn allocate(info: &ShaderModuleCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        // SPIR-V is a stream of 4-byte words
        if info.code.is_empty() || info.code.len() % 4 != 0 {
            return Err(Error::InvalidArgument(format!(
                "shader code length {} is not a non-zero multiple of 4",
                info.code.len()
            )));
        }
        Ok(Self {
            native: backend.allocate_shader_module(info)?,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Debug, Default)]
pub struct PipelineInterfaceCreateInfo {
    pub set_layouts: Vec<Handle<DescriptorSetLayout>>,
    pub push_constant_size: u32,
    pub push_constant_stages: ShaderStages,
}

pub struct PipelineInterface {
    native: NativeHandle,
    pub set_layouts: Vec<Handle<DescriptorSetLayout>>,
}

impl DeviceObject for PipelineInterface {
    type CreateInfo = PipelineInterfaceCreateInfo;

    fn allocate(info: &PipelineInterfaceCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let layouts = info
            .set_layouts
            .iter()
            .map(|&layout| lookup(objects, layout).map(DeviceObject::native))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            native: backend.allocate_pipeline_interface(info, &layouts)?,
            set_layouts: info.set_layouts.clone(),
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Debug)]
pub struct ComputePipelineCreateInfo {
    pub interface: Handle<PipelineInterface>,
    pub shader: Handle<ShaderModule>,
    pub entry_point: String,
}

pub struct ComputePipeline {
    native: NativeHandle,
    pub interface: Handle<PipelineInterface>,
}

impl DeviceObject for ComputePipeline {
    type CreateInfo = ComputePipelineCreateInfo;

    fn allocate(info: &ComputePipelineCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let interface = lookup(objects, info.interface)?.native();
        let shader = lookup(objects, info.shader)?.native();
        Ok(Self {
            native: backend.allocate_compute_pipeline(info, interface, shader)?,
            interface: info.interface,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Debug)]
pub struct GraphicsPipelineCreateInfo {
    pub interface: Handle<PipelineInterface>,
    pub vertex_shader: Handle<ShaderModule>,
    pub fragment_shader: Option<Handle<ShaderModule>>,
    /// Pass the pipeline must be compatible with.
    pub render_pass: Handle<RenderPass>,
    pub vertex_bindings: Vec<VertexBinding>,
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend_enable: bool,
}

/// Native objects a graphics pipeline is built from.
#[derive(Clone, Copy, Debug)]
pub struct GraphicsPipelineNatives {
    pub interface: NativeHandle,
    pub vertex_shader: NativeHandle,
    pub fragment_shader: Option<NativeHandle>,
    pub render_pass: NativeHandle,
}

pub struct GraphicsPipeline {
    native: NativeHandle,
    pub interface: Handle<PipelineInterface>,
    pub render_pass: Handle<RenderPass>,
}

impl DeviceObject for GraphicsPipeline {
    type CreateInfo = GraphicsPipelineCreateInfo;

    fn allocate(info: &GraphicsPipelineCreateInfo, objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        let natives = GraphicsPipelineNatives {
            interface: lookup(objects, info.interface)?.native(),
            vertex_shader: lookup(objects, info.vertex_shader)?.native(),
            fragment_shader: info
                .fragment_shader
                .map(|shader| lookup(objects, shader).map(DeviceObject::native))
                .transpose()?,
            render_pass: lookup(objects, info.render_pass)?.native(),
        };
        Ok(Self {
            native: backend.allocate_graphics_pipeline(info, &natives)?,
            interface: info.interface,
            render_pass: info.render_pass,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
