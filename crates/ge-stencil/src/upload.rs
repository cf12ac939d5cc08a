//! Entry point: a guest write landed in a framebuffer, rebuild that framebuffer's stencil.

use tracing::{debug, warn};

use crate::alias::{AddressAlias, MirrorMask};
use crate::backend::{ProgramBackend, StencilBackend};
use crate::bitplane::{analyze, UsedBits};
use crate::guest_memory::GuestMemory;
use crate::programs::{ProgramError, StencilPrograms};
use crate::replay::{ReplayEngine, ReplayOptions, ReplayOutcome};
use crate::stats::StencilStats;
use crate::target::{RenderTarget, RenderTargetLocator};
use crate::texture::upload_source;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StencilUploadConfig {
    /// Lowest guest address that can back a render target.
    pub vram_base: u32,
    /// Cleared from addresses before the window pre-filter (cache/kernel segment bits).
    pub segment_mask: u32,
    /// Mask of the default mirror-aware alias predicate.
    pub alias_mask: u32,
    /// Log each replay pass at trace level.
    pub trace_passes: bool,
}

impl Default for StencilUploadConfig {
    fn default() -> Self {
        Self {
            vram_base: 0x0400_0000,
            segment_mask: 0x3FFF_FFFF,
            alias_mask: MirrorMask::DEFAULT.0,
            trace_passes: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilUploadRequest {
    /// Guest address the write started at.
    pub address: u32,
    /// Size of the guest write in bytes. Informational; the whole target is rescanned.
    pub size: u32,
    /// Do nothing at all when no stencil bit is set anywhere.
    pub skip_zero: bool,
}

pub struct StencilUploader<A: AddressAlias = MirrorMask> {
    locator: RenderTargetLocator<A>,
    programs: StencilPrograms,
    options: ReplayOptions,
    stats: StencilStats,
}

impl StencilUploader<MirrorMask> {
    /// Compiles the replay programs on `backend`; fails if either program does not compile.
    pub fn new<B: ProgramBackend + ?Sized>(
        backend: &mut B,
        config: StencilUploadConfig,
    ) -> Result<Self, ProgramError> {
        let alias = MirrorMask(config.alias_mask);
        Self::with_alias(backend, config, alias)
    }
}

impl<A: AddressAlias> StencilUploader<A> {
    /// Like [`StencilUploader::new`] with a caller-supplied alias predicate.
    pub fn with_alias<B: ProgramBackend + ?Sized>(
        backend: &mut B,
        config: StencilUploadConfig,
        alias: A,
    ) -> Result<Self, ProgramError> {
        let programs = StencilPrograms::new(backend)?;
        Ok(Self {
            locator: RenderTargetLocator::new(alias, config.vram_base, config.segment_mask),
            programs,
            options: ReplayOptions {
                trace_passes: config.trace_passes,
            },
            stats: StencilStats::new(),
        })
    }

    pub fn stats(&self) -> &StencilStats {
        &self.stats
    }

    pub fn programs(&self) -> &StencilPrograms {
        &self.programs
    }

    /// Rebuilds the stencil of the render target backing `request.address`.
    ///
    /// `targets` is the tracker's list in registration order. Returns `true` iff GPU state was
    /// modified; every other outcome (untracked address, no stencil bits in the format,
    /// unreadable memory, zero-skip) is a silent no-op.
    pub fn notify_stencil_upload<B, M>(
        &mut self,
        backend: &mut B,
        memory: &M,
        targets: &[RenderTarget],
        request: StencilUploadRequest,
    ) -> bool
    where
        B: StencilBackend + ?Sized,
        M: GuestMemory + ?Sized,
    {
        self.stats.inc_notifications();

        let Some(target) = self.locator.locate(request.address, targets) else {
            self.stats.inc_untracked();
            return false;
        };
        if !target.format.has_stencil() {
            self.stats.inc_unsupported_format();
            return false;
        }

        let src = match memory.read_vec(target.address, target.byte_len()) {
            Ok(src) => src,
            Err(err) => {
                debug!(error = %err, "stencil source not readable");
                self.stats.inc_unreadable();
                return false;
            }
        };
        let used = match analyze(&src, target.pixel_count(), target.format) {
            Ok(used) => used,
            Err(err) => {
                debug!(error = %err, "stencil analysis rejected the source");
                self.stats.inc_unreadable();
                return false;
            }
        };
        debug!(
            addr = format_args!("{:#010x}", request.address),
            target = format_args!("{:#010x}", target.address),
            size = request.size,
            used_bits = format_args!("{:#010b}", used.bits()),
            "stencil upload"
        );

        let outcome = if used.is_empty() {
            ReplayEngine::new(&mut *backend, &mut self.programs, self.options)
                .clear(target, request.skip_zero)
        } else {
            match self.replay(backend, &src, target, used) {
                Some(outcome) => outcome,
                None => return false,
            }
        };

        match outcome {
            ReplayOutcome::Skipped => self.stats.inc_zero_skips(),
            ReplayOutcome::Cleared => self.stats.inc_clears(),
            ReplayOutcome::Replayed { passes } => self.stats.record_replay(passes),
            ReplayOutcome::Aborted => self.stats.inc_aborted_replays(),
        }
        let modified = outcome.modified_gpu_state();
        if modified && target.attachment.is_none() {
            self.stats.inc_missing_attachments();
        }
        modified
    }

    /// Stages `src` and replays it; `None` if the source could not be staged.
    fn replay<B: StencilBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        src: &[u8],
        target: &RenderTarget,
        used: UsedBits,
    ) -> Option<ReplayOutcome> {
        let source = match upload_source(&mut *backend, src, target) {
            Ok(source) => source,
            Err(err) => {
                warn!(error = %err, "failed to stage stencil source image");
                self.stats.inc_upload_failures();
                return None;
            }
        };

        let outcome = ReplayEngine::new(&mut *backend, &mut self.programs, self.options)
            .replay(target, used, &source);
        backend.rebind_framebuffer();
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::guest_memory::VecGuestMemory;
    use crate::recording::RecordingBackend;
    use crate::target::AttachmentId;

    fn target(address: u32) -> RenderTarget {
        RenderTarget {
            address,
            stride: 4,
            format: PixelFormat::Rgba8888,
            width: 4,
            height: 1,
            render_width: 4,
            render_height: 1,
            attachment: Some(AttachmentId(1)),
        }
    }

    #[test]
    fn default_config_matches_guest_memory_map() {
        let config = StencilUploadConfig::default();
        assert_eq!(config.vram_base, 0x0400_0000);
        assert_eq!(config.segment_mask, 0x3FFF_FFFF);
        assert_eq!(config.alias_mask, 0x03FF_FFFF);
        assert!(!config.trace_passes);
    }

    #[test]
    fn uncached_mirror_reaches_the_target() {
        let mut backend = RecordingBackend::new();
        let mut uploader =
            StencilUploader::new(&mut backend, StencilUploadConfig::default()).unwrap();
        let mut memory = VecGuestMemory::new(0x0400_0000, 0x100);
        memory.write_u32s(0x0400_0000, &[0x0100_0000, 0, 0, 0]).unwrap();
        let targets = [target(0x0400_0000)];

        // Same VRAM, uncached segment.
        let request = StencilUploadRequest {
            address: 0x4400_0000,
            size: 16,
            skip_zero: true,
        };
        assert!(uploader.notify_stencil_upload(&mut backend, &memory, &targets, request));
        assert_eq!(backend.draw_count(), 1);
        assert_eq!(uploader.stats().snapshot().replays, 1);
    }

    #[test]
    fn custom_alias_predicate_is_used() {
        let mut backend = RecordingBackend::new();
        let exact = |a: u32, b: u32| a == b;
        let mut uploader =
            StencilUploader::with_alias(&mut backend, StencilUploadConfig::default(), exact)
                .unwrap();
        let memory = VecGuestMemory::new(0x0400_0000, 0x100);
        let targets = [target(0x0400_0000)];

        let request = StencilUploadRequest {
            address: 0x4400_0000,
            size: 4,
            skip_zero: false,
        };
        assert!(!uploader.notify_stencil_upload(&mut backend, &memory, &targets, request));
        assert_eq!(uploader.stats().snapshot().untracked, 1);
    }
}
