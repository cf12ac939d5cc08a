//! Shared replay programs and their pipelines.
//!
//! [`StencilPrograms`] is created once when the renderer initializes. Construction compiles both
//! programs and fails if either does, so no caller can ever reach a replay with an invalid
//! program handle. Pipelines are created on first use for a given [`PipelineKey`] and reused
//! for the lifetime of the cache.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::backend::{
    BackendError, DepthStencilMode, PipelineDesc, PipelineId, ProgramBackend, ProgramId,
    RenderPassKey, ShaderStage,
};
use crate::shaders::{STENCIL_FS_WGSL, STENCIL_VS_WGSL};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("failed to compile stencil replay programs: {0}")]
    Compile(#[source] BackendError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub render_pass: RenderPassKey,
    pub depth_stencil: DepthStencilMode,
}

#[derive(Debug)]
pub struct StencilPrograms {
    vertex: ProgramId,
    fragment: ProgramId,
    pipelines: HashMap<PipelineKey, PipelineId>,
}

impl StencilPrograms {
    pub fn new<B: ProgramBackend + ?Sized>(backend: &mut B) -> Result<Self, ProgramError> {
        let compile = |backend: &mut B, stage: ShaderStage, label: &'static str, source: &str| {
            backend
                .compile_program(stage, label, source)
                .map_err(|err| {
                    warn!(error = %err, "stencil replay program compilation failed");
                    ProgramError::Compile(err)
                })
        };
        let vertex = compile(&mut *backend, ShaderStage::Vertex, "ge-stencil.vs", STENCIL_VS_WGSL)?;
        let fragment = compile(
            backend,
            ShaderStage::Fragment,
            "ge-stencil.fs",
            STENCIL_FS_WGSL,
        )?;
        debug!(?vertex, ?fragment, "stencil replay programs compiled");

        Ok(Self {
            vertex,
            fragment,
            pipelines: HashMap::new(),
        })
    }

    pub fn vertex(&self) -> ProgramId {
        self.vertex
    }

    pub fn fragment(&self) -> ProgramId {
        self.fragment
    }

    /// Returns the pipeline for `key`, creating it on a miss.
    ///
    /// Failed creations are not cached; the next call retries.
    pub fn pipeline<B: ProgramBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: PipelineKey,
    ) -> Result<PipelineId, BackendError> {
        if let Some(id) = self.pipelines.get(&key) {
            return Ok(*id);
        }

        let id = backend.create_pipeline(&PipelineDesc {
            label: "ge-stencil.replay",
            vertex: self.vertex,
            fragment: self.fragment,
            render_pass: key.render_pass,
            depth_stencil: key.depth_stencil,
        })?;
        self.pipelines.insert(key, id);
        Ok(id)
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{FailurePlan, RecordedCmd, RecordingBackend};

    const KEY: PipelineKey = PipelineKey {
        render_pass: RenderPassKey(7),
        depth_stencil: DepthStencilMode::StencilReplaceAlways,
    };

    #[test]
    fn programs_compile_once_and_pipelines_are_cached_per_key() {
        let mut backend = RecordingBackend::new();
        let mut programs = StencilPrograms::new(&mut backend).unwrap();

        let a = programs.pipeline(&mut backend, KEY).unwrap();
        let b = programs.pipeline(&mut backend, KEY).unwrap();
        assert_eq!(a, b);

        let other = PipelineKey {
            render_pass: RenderPassKey(8),
            ..KEY
        };
        assert_ne!(programs.pipeline(&mut backend, other).unwrap(), a);
        assert_eq!(programs.cached_pipelines(), 2);

        let compiles = backend
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, RecordedCmd::CompileProgram { .. }))
            .count();
        assert_eq!(compiles, 2);
    }

    #[test]
    fn compile_failure_is_reported_to_the_owner() {
        let mut backend = RecordingBackend::with_failures(FailurePlan {
            compile: Some(ShaderStage::Fragment),
            ..FailurePlan::default()
        });
        let err = StencilPrograms::new(&mut backend).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Compile(BackendError::Compile {
                stage: ShaderStage::Fragment,
                ..
            })
        ));
    }

    #[test]
    fn failed_pipelines_are_retried() {
        let mut backend = RecordingBackend::new();
        let mut programs = StencilPrograms::new(&mut backend).unwrap();

        backend.set_failures(FailurePlan {
            pipeline: true,
            ..FailurePlan::default()
        });
        assert!(programs.pipeline(&mut backend, KEY).is_err());
        assert_eq!(programs.cached_pipelines(), 0);

        backend.set_failures(FailurePlan::default());
        assert!(programs.pipeline(&mut backend, KEY).is_ok());
    }
}
