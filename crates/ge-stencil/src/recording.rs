//! Deterministic backend that records every command instead of executing it.
//!
//! Used by tests and by tooling that wants to inspect the replay sequence for a given upload.

use crate::backend::{
    BackendError, BindingSetDesc, BindingSetId, DirtyState, ImageId, PipelineDesc, PipelineId,
    ProgramBackend, ProgramId, RenderPassActions, RenderPassKey, ScissorRect, ShaderStage,
    StagedImage, StencilBackend, StencilParams, Viewport,
};
use crate::target::AttachmentId;

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCmd {
    CompileProgram {
        id: ProgramId,
        stage: ShaderStage,
        label: &'static str,
    },
    CreatePipeline {
        id: PipelineId,
        desc: PipelineDesc,
    },
    UploadImage {
        id: ImageId,
        width: u32,
        height: u32,
    },
    CreateBindingSet {
        id: BindingSetId,
        desc: BindingSetDesc,
    },
    ForgetCachedBindings,
    BindRenderTarget {
        attachment: AttachmentId,
        actions: RenderPassActions,
    },
    BindPipeline(PipelineId),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetStencilParams(StencilParams),
    PushConstants {
        stage: ShaderStage,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        bindings: BindingSetId,
        vertex_count: u32,
    },
    MarkDirty(DirtyState),
    RebindFramebuffer,
}

impl RecordedCmd {
    /// Whether the command changes device-side render state or issues GPU work.
    ///
    /// Resource creation (programs, pipelines) is not counted.
    pub fn touches_gpu(&self) -> bool {
        !matches!(
            self,
            RecordedCmd::CompileProgram { .. } | RecordedCmd::CreatePipeline { .. }
        )
    }
}

/// Injected failures, for exercising degraded paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailurePlan {
    pub compile: Option<ShaderStage>,
    pub pipeline: bool,
    pub upload: bool,
    pub binding_set: bool,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    cmds: Vec<RecordedCmd>,
    images: Vec<StagedImage>,
    failures: FailurePlan,
    bound: Option<(AttachmentId, RenderPassActions)>,
    next_id: u32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(failures: FailurePlan) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn set_failures(&mut self, failures: FailurePlan) {
        self.failures = failures;
    }

    pub fn commands(&self) -> &[RecordedCmd] {
        &self.cmds
    }

    pub fn take_commands(&mut self) -> Vec<RecordedCmd> {
        std::mem::take(&mut self.cmds)
    }

    /// Images uploaded so far, in upload order.
    pub fn images(&self) -> &[StagedImage] {
        &self.images
    }

    /// Commands that touched the device (see [`RecordedCmd::touches_gpu`]).
    pub fn gpu_command_count(&self) -> usize {
        self.cmds.iter().filter(|cmd| cmd.touches_gpu()).count()
    }

    pub fn draw_count(&self) -> usize {
        self.cmds
            .iter()
            .filter(|cmd| matches!(cmd, RecordedCmd::Draw { .. }))
            .count()
    }

    /// Stencil parameters in effect for each recorded draw, in draw order.
    pub fn draw_stencil_params(&self) -> Vec<StencilParams> {
        let mut current = None;
        let mut out = Vec::new();
        for cmd in &self.cmds {
            match cmd {
                RecordedCmd::SetStencilParams(params) => current = Some(*params),
                RecordedCmd::Draw { .. } => {
                    if let Some(params) = current {
                        out.push(params);
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Fragment push-constant words in effect for each recorded draw, in draw order.
    pub fn draw_push_constants(&self) -> Vec<u32> {
        let mut current = None;
        let mut out = Vec::new();
        for cmd in &self.cmds {
            match cmd {
                RecordedCmd::PushConstants {
                    stage: ShaderStage::Fragment,
                    offset: 0,
                    data,
                } if data.len() >= 4 => {
                    current = Some(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]));
                }
                RecordedCmd::Draw { .. } => {
                    if let Some(value) = current {
                        out.push(value);
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl ProgramBackend for RecordingBackend {
    fn compile_program(
        &mut self,
        stage: ShaderStage,
        label: &'static str,
        wgsl: &str,
    ) -> Result<ProgramId, BackendError> {
        if self.failures.compile == Some(stage) || wgsl.trim().is_empty() {
            return Err(BackendError::Compile {
                stage,
                label,
                message: "injected failure".into(),
            });
        }
        let id = ProgramId(self.alloc_id());
        self.cmds
            .push(RecordedCmd::CompileProgram { id, stage, label });
        Ok(id)
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId, BackendError> {
        if self.failures.pipeline {
            return Err(BackendError::Pipeline {
                label: desc.label,
                message: "injected failure".into(),
            });
        }
        let id = PipelineId(self.alloc_id());
        self.cmds.push(RecordedCmd::CreatePipeline {
            id,
            desc: desc.clone(),
        });
        Ok(id)
    }
}

impl StencilBackend for RecordingBackend {
    fn upload_image(&mut self, image: &StagedImage) -> Result<ImageId, BackendError> {
        if self.failures.upload {
            return Err(BackendError::OutOfResources("staging image"));
        }
        let id = ImageId(self.alloc_id());
        self.cmds.push(RecordedCmd::UploadImage {
            id,
            width: image.width,
            height: image.height,
        });
        self.images.push(image.clone());
        Ok(id)
    }

    fn create_binding_set(&mut self, desc: &BindingSetDesc) -> Result<BindingSetId, BackendError> {
        if self.failures.binding_set {
            return Err(BackendError::OutOfResources("binding set"));
        }
        let id = BindingSetId(self.alloc_id());
        self.cmds.push(RecordedCmd::CreateBindingSet { id, desc: *desc });
        Ok(id)
    }

    fn forget_cached_bindings(&mut self) {
        self.cmds.push(RecordedCmd::ForgetCachedBindings);
    }

    fn bind_render_target(&mut self, attachment: AttachmentId, actions: RenderPassActions) {
        self.bound = Some((attachment, actions));
        self.cmds.push(RecordedCmd::BindRenderTarget {
            attachment,
            actions,
        });
    }

    fn current_render_pass(&self) -> RenderPassKey {
        // Compatibility only depends on the load actions here; attachments are all alike.
        match self.bound {
            Some((_, actions)) => {
                RenderPassKey(1 + actions.color as u32 * 4 + actions.depth_stencil as u32)
            }
            None => RenderPassKey(0),
        }
    }

    fn bind_pipeline(&mut self, pipeline: PipelineId) {
        self.cmds.push(RecordedCmd::BindPipeline(pipeline));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.cmds.push(RecordedCmd::SetViewport(viewport));
    }

    fn set_scissor(&mut self, rect: ScissorRect) {
        self.cmds.push(RecordedCmd::SetScissor(rect));
    }

    fn set_stencil_params(&mut self, params: StencilParams) {
        self.cmds.push(RecordedCmd::SetStencilParams(params));
    }

    fn push_constants(&mut self, stage: ShaderStage, offset: u32, data: &[u8]) {
        self.cmds.push(RecordedCmd::PushConstants {
            stage,
            offset,
            data: data.to_vec(),
        });
    }

    fn draw(&mut self, bindings: BindingSetId, vertex_count: u32) {
        self.cmds.push(RecordedCmd::Draw {
            bindings,
            vertex_count,
        });
    }

    fn mark_dirty(&mut self, state: DirtyState) {
        self.cmds.push(RecordedCmd::MarkDirty(state));
    }

    fn rebind_framebuffer(&mut self) {
        self.cmds.push(RecordedCmd::RebindFramebuffer);
    }
}
