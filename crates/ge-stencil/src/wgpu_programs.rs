//! [`ProgramBackend`] on a real `wgpu::Device`.
//!
//! wgpu bakes the stencil write mask into the render pipeline, so a pipeline handed out by
//! [`ProgramBackend::create_pipeline`] names a *family*; the concrete `wgpu::RenderPipeline` for a
//! given write mask is built on first request by [`WgpuProgramBackend::render_pipeline`].

use std::borrow::Cow;

use hashbrown::HashMap;
use tracing::debug;

use crate::backend::{
    BackendError, DepthStencilMode, PipelineDesc, PipelineId, ProgramBackend, ProgramId,
    ShaderStage,
};
use crate::shaders::{FS_ENTRY, PUSH_CONSTANT_BYTES, VS_ENTRY};

/// Host attachment format holding the rebuilt stencil.
pub const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

struct Program {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct PipelineFamily {
    label: &'static str,
    vertex: usize,
    fragment: usize,
    depth_stencil: DepthStencilMode,
    variants: HashMap<u8, wgpu::RenderPipeline>,
}

pub struct WgpuProgramBackend {
    device: wgpu::Device,
    color_format: wgpu::TextureFormat,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    programs: Vec<Program>,
    families: Vec<PipelineFamily>,
}

impl WgpuProgramBackend {
    /// `color_format` is the format of the color attachment bound alongside the stencil.
    ///
    /// The device must have been created with `Features::PUSH_CONSTANTS` and a push constant
    /// limit of at least [`PUSH_CONSTANT_BYTES`].
    pub fn new(
        device: wgpu::Device,
        color_format: wgpu::TextureFormat,
    ) -> Result<Self, BackendError> {
        if !device.features().contains(wgpu::Features::PUSH_CONSTANTS)
            || device.limits().max_push_constant_size < PUSH_CONSTANT_BYTES
        {
            return Err(BackendError::Unsupported("push constants"));
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ge-stencil.bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(16),
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ge-stencil.pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::FRAGMENT,
                range: 0..PUSH_CONSTANT_BYTES,
            }],
        });

        Ok(Self {
            device,
            color_format,
            bind_group_layout,
            pipeline_layout,
            programs: Vec::new(),
            families: Vec::new(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Layout of the group-0 bindings (source texture, sampler, uv extent).
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Returns the pipeline of family `id` writing only the stencil bits in `write_mask`.
    pub fn render_pipeline(
        &mut self,
        id: PipelineId,
        write_mask: u8,
    ) -> Result<&wgpu::RenderPipeline, BackendError> {
        let index = id.0 as usize;
        let family = self.families.get(index).ok_or(BackendError::Pipeline {
            label: "ge-stencil.replay",
            message: format!("unknown pipeline {id:?}"),
        })?;

        if !family.variants.contains_key(&write_mask) {
            let (label, vertex, fragment, mode) =
                (family.label, family.vertex, family.fragment, family.depth_stencil);
            let pipeline = self.build_pipeline(label, vertex, fragment, mode, write_mask)?;
            debug!(label, write_mask = format_args!("{write_mask:#04x}"), "pipeline variant built");
            self.families[index].variants.insert(write_mask, pipeline);
        }

        self.families[index]
            .variants
            .get(&write_mask)
            .ok_or(BackendError::Pipeline {
                label: "ge-stencil.replay",
                message: "pipeline variant missing after creation".into(),
            })
    }

    fn program(&self, id: ProgramId, stage: ShaderStage) -> Result<usize, BackendError> {
        match self.programs.get(id.0 as usize) {
            Some(program) if program.stage == stage => Ok(id.0 as usize),
            _ => Err(BackendError::UnknownProgram(id)),
        }
    }

    fn build_pipeline(
        &self,
        label: &'static str,
        vertex: usize,
        fragment: usize,
        mode: DepthStencilMode,
        write_mask: u8,
    ) -> Result<wgpu::RenderPipeline, BackendError> {
        let depth_stencil = match mode {
            DepthStencilMode::None => None,
            DepthStencilMode::StencilReplaceAlways => {
                let face = wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                };
                Some(wgpu::DepthStencilState {
                    format: STENCIL_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState {
                        front: face,
                        back: face,
                        read_mask: 0xFF,
                        write_mask: u32::from(write_mask),
                    },
                    bias: Default::default(),
                })
            }
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.programs[vertex].module,
                    entry_point: VS_ENTRY,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.programs[fragment].module,
                    entry_point: FS_ENTRY,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    // Only the stencil is written; color is preserved.
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::empty(),
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil,
                multisample: Default::default(),
                multiview: None,
            });
        self.device.poll(wgpu::Maintain::Wait);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Pipeline {
                label,
                message: err.to_string(),
            });
        }
        Ok(pipeline)
    }
}

impl ProgramBackend for WgpuProgramBackend {
    fn compile_program(
        &mut self,
        stage: ShaderStage,
        label: &'static str,
        wgsl: &str,
    ) -> Result<ProgramId, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(wgsl.to_owned())),
            });
        self.device.poll(wgpu::Maintain::Wait);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Compile {
                stage,
                label,
                message: err.to_string(),
            });
        }

        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(Program { stage, module });
        Ok(id)
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, BackendError> {
        let vertex = self.program(desc.vertex, ShaderStage::Vertex)?;
        let fragment = self.program(desc.fragment, ShaderStage::Fragment)?;

        let id = PipelineId(self.families.len() as u32);
        self.families.push(PipelineFamily {
            label: desc.label,
            vertex,
            fragment,
            depth_stencil: desc.depth_stencil,
            variants: HashMap::new(),
        });
        Ok(id)
    }
}
