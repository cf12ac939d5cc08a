//! Stencil replay: rebuilds the host stencil channel of a render target from guest alpha bits.
//!
//! Host stencil writes go through a single 8-bit write mask per draw, while the guest meaning of
//! a stencil bit depends on where the framebuffer format packs it. Replay therefore issues one
//! full-screen draw per used bitplane:
//!
//! 1. The target is bound with color preserved and stencil cleared, so every bit starts at 0.
//! 2. For each bit value `i` present in the [`UsedBits`] summary, the fragment program discards
//!    pixels whose sampled alpha lacks `i`; surviving pixels get the reference value written
//!    through a format-specific write mask (see [`ReplayPass::for_bit`]).
//!
//! Unused bits are skipped: they are already 0 after the clear, and drawing them would only
//! cost passes.

use tracing::{debug, trace, warn};

use crate::backend::{
    BackendError, BindingSetDesc, DepthStencilMode, DirtyState, RenderPassActions,
    SamplerFilter, ScissorRect, ShaderStage, StencilBackend, StencilParams, Viewport,
};
use crate::bitplane::UsedBits;
use crate::format::PixelFormat;
use crate::programs::{PipelineKey, StencilPrograms};
use crate::texture::StagedSource;
use crate::target::RenderTarget;

/// Vertices of the full-screen triangle.
pub const FULLSCREEN_VERTEX_COUNT: u32 = 3;

/// One masked full-screen draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReplayPass {
    /// Host stencil bits this pass may write.
    pub mask: u8,
    /// Guest stencil value of the bit, placed where the format packs it.
    pub value: u8,
    /// Single-bit guest stencil value pushed to the fragment program.
    pub bit: u32,
}

impl ReplayPass {
    /// Derives the pass for single-bit value `bit` on a target of `format`.
    ///
    /// - 8888: the host byte is the guest byte; `mask = value = bit`.
    /// - 4444: the guest nibble lives in the high nibble of the host byte, with its low-nibble
    ///   mirror covered by the mask; `mask = bit | bit << 4`, `value = bit * 16`.
    /// - 5551: the single bit lives at bit 7; `mask = 0xFF`, `value = bit * 128`.
    ///
    /// Returns `None` for formats without stencil bits.
    pub fn for_bit(format: PixelFormat, bit: u32) -> Option<Self> {
        let (mask, value) = match format {
            PixelFormat::Rgb565 => return None,
            PixelFormat::Rgba5551 => (0xFF, bit * 128),
            PixelFormat::Rgba4444 => (bit | (bit << 4), bit * 16),
            PixelFormat::Rgba8888 => (bit, bit),
        };
        Some(Self {
            mask: mask as u8,
            value: value as u8,
            bit,
        })
    }

    /// Stencil state for this pass.
    ///
    /// The reference is all ones, so the byte landing in the stencil is exactly `mask`: a 4444
    /// nibble bit fills both its high-nibble slot and the low-nibble mirror, and the 5551 bit
    /// fills the whole byte.
    pub fn stencil_params(&self) -> StencilParams {
        StencilParams {
            write_mask: self.mask,
            compare_mask: 0xFF,
            reference: 0xFF,
        }
    }

    /// Stencil bits this pass leaves set where its fragments survive.
    pub fn written_bits(&self) -> u8 {
        let params = self.stencil_params();
        params.reference & params.write_mask
    }
}

/// Passes needed to replay `used` onto a `format` target, lowest bit first.
pub fn plan_passes(format: PixelFormat, used: UsedBits) -> Vec<ReplayPass> {
    used.bit_values()
        .filter(|bit| used.contains(*bit))
        .filter_map(|bit| ReplayPass::for_bit(format, bit))
        .collect()
}

/// What a replay did to GPU state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Nothing was recorded.
    Skipped,
    /// The stencil channel was cleared and nothing else was drawn.
    Cleared,
    /// The full sequence was recorded with `passes` draws.
    Replayed { passes: u32 },
    /// The target was bound and cleared but no pass could be drawn.
    Aborted,
}

impl ReplayOutcome {
    pub fn modified_gpu_state(&self) -> bool {
        !matches!(self, ReplayOutcome::Skipped)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayOptions {
    /// Log every pass at trace level.
    pub trace_passes: bool,
}

/// Records the replay sequence for one render target.
pub struct ReplayEngine<'a, B: StencilBackend + ?Sized> {
    backend: &'a mut B,
    programs: &'a mut StencilPrograms,
    options: ReplayOptions,
}

impl<'a, B: StencilBackend + ?Sized> ReplayEngine<'a, B> {
    pub fn new(
        backend: &'a mut B,
        programs: &'a mut StencilPrograms,
        options: ReplayOptions,
    ) -> Self {
        Self {
            backend,
            programs,
            options,
        }
    }

    /// All-zero summary: skip entirely, or bind with a stencil clear.
    pub fn clear(&mut self, target: &RenderTarget, skip_zero: bool) -> ReplayOutcome {
        if skip_zero {
            return ReplayOutcome::Skipped;
        }
        self.bind_target(target);
        self.backend
            .mark_dirty(DirtyState::BLEND | DirtyState::RASTER | DirtyState::VIEWPORT_SCISSOR);
        ReplayOutcome::Cleared
    }

    /// Records one draw per used bit of `used` against `source`.
    ///
    /// `used` must not be empty; use [`ReplayEngine::clear`] for that case.
    pub fn replay(
        &mut self,
        target: &RenderTarget,
        used: UsedBits,
        source: &StagedSource,
    ) -> ReplayOutcome {
        self.bind_target(target);
        let outcome = match self.draw_passes(target, used, source) {
            Ok(passes) => ReplayOutcome::Replayed { passes },
            Err(err) => {
                warn!(
                    addr = format_args!("{:#010x}", target.address),
                    error = %err,
                    "stencil replay aborted after clearing the target"
                );
                ReplayOutcome::Aborted
            }
        };
        // The staged source must not be picked up by a later, unrelated draw.
        self.backend.forget_cached_bindings();
        self.backend.mark_dirty(DirtyState::all());
        outcome
    }

    fn bind_target(&mut self, target: &RenderTarget) {
        match target.attachment {
            Some(attachment) => self
                .backend
                .bind_render_target(attachment, RenderPassActions::KEEP_COLOR_CLEAR_STENCIL),
            None => warn!(
                addr = format_args!("{:#010x}", target.address),
                "render target has no host attachment; stencil replay draws into whatever is bound"
            ),
        }
    }

    fn draw_passes(
        &mut self,
        target: &RenderTarget,
        used: UsedBits,
        source: &StagedSource,
    ) -> Result<u32, BackendError> {
        let key = PipelineKey {
            render_pass: self.backend.current_render_pass(),
            depth_stencil: DepthStencilMode::StencilReplaceAlways,
        };
        let pipeline = self.programs.pipeline(&mut *self.backend, key)?;
        let bindings = self.backend.create_binding_set(&BindingSetDesc {
            image: source.image,
            filter: SamplerFilter::Nearest,
            uv_max: [source.u_max, source.v_max],
        })?;

        self.backend.bind_pipeline(pipeline);
        // Upscaled surfaces get upscaled geometry.
        let (w, h) = (target.render_width, target.render_height);
        self.backend.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: w as f32,
            height: h as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.backend.set_scissor(ScissorRect {
            x: 0,
            y: 0,
            width: w,
            height: h,
        });

        let passes = plan_passes(target.format, used);
        for pass in &passes {
            if self.options.trace_passes {
                trace!(
                    bit = pass.bit,
                    mask = format_args!("{:#04x}", pass.mask),
                    value = pass.value,
                    "stencil replay pass"
                );
            }
            self.backend.set_stencil_params(pass.stencil_params());
            self.backend
                .push_constants(ShaderStage::Fragment, 0, bytemuck::bytes_of(&pass.bit));
            self.backend.draw(bindings, FULLSCREEN_VERTEX_COUNT);
        }

        debug!(
            addr = format_args!("{:#010x}", target.address),
            format = ?target.format,
            used_bits = format_args!("{:#010b}", used.bits()),
            passes = passes.len(),
            "stencil replayed"
        );
        Ok(passes.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(format: PixelFormat, bits: u8) -> Vec<(u8, u8)> {
        let levels = format.stencil_levels().unwrap();
        plan_passes(format, UsedBits::new(bits, levels))
            .iter()
            .map(|p| (p.mask, p.value))
            .collect()
    }

    #[test]
    fn rgba4444_masks_mirror_the_nibble() {
        for bit in [1u32, 2, 4, 8] {
            let pass = ReplayPass::for_bit(PixelFormat::Rgba4444, bit).unwrap();
            assert_eq!(u32::from(pass.mask), bit | (bit << 4));
            assert_eq!(u32::from(pass.value), bit * 16);
            assert_eq!(pass.bit, bit);
        }
        assert_eq!(
            pairs(PixelFormat::Rgba4444, 0b1011),
            vec![(0x11, 16), (0x22, 32), (0x88, 128)]
        );
    }

    #[test]
    fn rgba5551_has_a_single_full_mask_pass() {
        assert_eq!(pairs(PixelFormat::Rgba5551, 1), vec![(0xFF, 128)]);
        // Bits above the format's range are never replayed.
        assert_eq!(pairs(PixelFormat::Rgba5551, 0xFF), vec![(0xFF, 128)]);
    }

    #[test]
    fn rgba8888_passes_equal_popcount() {
        for bits in [0u8, 0b1011, 0x80, 0xFF, 0x55] {
            let passes = plan_passes(PixelFormat::Rgba8888, UsedBits::new(bits, 256));
            assert_eq!(passes.len() as u32, bits.count_ones());
            for pass in passes {
                assert_eq!(u32::from(pass.mask), pass.bit);
                assert_eq!(u32::from(pass.value), pass.bit);
            }
        }
    }

    #[test]
    fn written_bits_fill_the_mask() {
        let pass = |format, bit| ReplayPass::for_bit(format, bit).unwrap();
        assert_eq!(pass(PixelFormat::Rgba4444, 1).written_bits(), 0x11);
        assert_eq!(pass(PixelFormat::Rgba4444, 8).written_bits(), 0x88);
        assert_eq!(pass(PixelFormat::Rgba5551, 1).written_bits(), 0xFF);
        assert_eq!(pass(PixelFormat::Rgba8888, 0x40).written_bits(), 0x40);

        let params = pass(PixelFormat::Rgba4444, 2).stencil_params();
        assert_eq!(
            params,
            StencilParams {
                write_mask: 0x22,
                compare_mask: 0xFF,
                reference: 0xFF,
            }
        );
    }

    #[test]
    fn rgb565_has_no_passes() {
        assert_eq!(ReplayPass::for_bit(PixelFormat::Rgb565, 1), None);
    }

    #[test]
    fn outcome_reports_modification() {
        assert!(!ReplayOutcome::Skipped.modified_gpu_state());
        assert!(ReplayOutcome::Cleared.modified_gpu_state());
        assert!(ReplayOutcome::Replayed { passes: 1 }.modified_gpu_state());
        assert!(ReplayOutcome::Aborted.modified_gpu_state());
    }
}
