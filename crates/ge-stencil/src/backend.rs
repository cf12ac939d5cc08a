//! Host GPU collaborator interface.
//!
//! The stencil upload path never talks to a graphics API directly. It records work through
//! [`StencilBackend`], which the renderer implements on top of its command stream. Commands are
//! executed on the device in submission order; upload-before-sample barriers are the
//! implementation's responsibility.

use bitflags::bitflags;

use crate::format::PixelFormat;
use crate::target::AttachmentId;

/// Lightweight handle to a compiled shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Lightweight handle to a render pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u32);

/// Lightweight handle to a descriptor/bind-group set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingSetId(pub u32);

/// Lightweight handle to a sampleable image staged from guest memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(pub u32);

/// Identifies render-pass compatibility for pipeline creation.
///
/// The value is opaque to this crate; the backend reports it for the currently bound target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderPassKey(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// What happens to an attachment's previous contents when it is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadAction {
    Keep,
    Clear,
}

/// Per-attachment load actions for [`StencilBackend::bind_render_target`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderPassActions {
    pub color: LoadAction,
    /// Applies to the stencil-equivalent channel.
    pub depth_stencil: LoadAction,
}

impl RenderPassActions {
    /// Preserve color, zero the stencil-equivalent channel.
    pub const KEEP_COLOR_CLEAR_STENCIL: Self = Self {
        color: LoadAction::Keep,
        depth_stencil: LoadAction::Clear,
    };
}

/// Depth/stencil behaviour baked into a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthStencilMode {
    None,
    /// Stencil test always passes and writes the reference value through the write mask.
    StencilReplaceAlways,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    /// Stencil bits are read unfiltered.
    Nearest,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Dynamic stencil state for the next draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilParams {
    pub write_mask: u8,
    pub compare_mask: u8,
    pub reference: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    pub label: &'static str,
    pub vertex: ProgramId,
    pub fragment: ProgramId,
    pub render_pass: RenderPassKey,
    pub depth_stencil: DepthStencilMode,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BindingSetDesc {
    pub image: ImageId,
    pub filter: SamplerFilter,
    /// Texture-coordinate extent of the valid region of `image`.
    pub uv_max: [f32; 2],
}

/// CPU-side RGBA8 image ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedImage {
    pub width: u32,
    pub height: u32,
    /// Guest format the pixels were expanded from.
    pub source_format: PixelFormat,
    /// Tightly packed RGBA8 rows, `width * 4` bytes each.
    pub rgba8: Vec<u8>,
    pub u_max: f32,
    pub v_max: f32,
}

bitflags! {
    /// Cached render state that the stencil path leaves in an unknown configuration.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DirtyState: u32 {
        const BLEND = 1 << 0;
        const RASTER = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const VIEWPORT_SCISSOR = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("{stage:?} program {label} failed to compile: {message}")]
    Compile {
        stage: ShaderStage,
        label: &'static str,
        message: String,
    },
    #[error("pipeline {label} could not be created: {message}")]
    Pipeline {
        label: &'static str,
        message: String,
    },
    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),
    #[error("unknown image {0:?}")]
    UnknownImage(ImageId),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("out of resources: {0}")]
    OutOfResources(&'static str),
}

/// Program compilation and pipeline creation.
///
/// Split out of [`StencilBackend`] so a device-only implementation can build the shared programs
/// without owning a command stream.
pub trait ProgramBackend {
    fn compile_program(
        &mut self,
        stage: ShaderStage,
        label: &'static str,
        wgsl: &str,
    ) -> Result<ProgramId, BackendError>;

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, BackendError>;
}

/// Everything the stencil upload path needs from the renderer.
pub trait StencilBackend: ProgramBackend {
    /// Uploads a staged image and returns a sampleable handle.
    fn upload_image(&mut self, image: &StagedImage) -> Result<ImageId, BackendError>;

    fn create_binding_set(&mut self, desc: &BindingSetDesc) -> Result<BindingSetId, BackendError>;

    /// Drops "last bound texture/shader" shortcuts so the next draws rebind everything.
    fn forget_cached_bindings(&mut self);

    fn bind_render_target(&mut self, attachment: AttachmentId, actions: RenderPassActions);

    /// Render pass of whatever target is currently bound.
    fn current_render_pass(&self) -> RenderPassKey;

    fn bind_pipeline(&mut self, pipeline: PipelineId);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, rect: ScissorRect);
    fn set_stencil_params(&mut self, params: StencilParams);
    fn push_constants(&mut self, stage: ShaderStage, offset: u32, data: &[u8]);

    /// Non-indexed draw without vertex buffers, sampling through `bindings`.
    fn draw(&mut self, bindings: BindingSetId, vertex_count: u32);

    fn mark_dirty(&mut self, state: DirtyState);

    /// Rebinds the framebuffer the emulated program is currently drawing to.
    fn rebind_framebuffer(&mut self);
}
