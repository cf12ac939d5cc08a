//! Stages guest framebuffer bytes as a sampleable RGBA8 image.
//!
//! The image keeps the guest row stride (padding columns included); the reported `u_max` tells
//! the sampler where the logical width ends. Guest memory itself is never touched.

use crate::backend::{BackendError, ImageId, StagedImage, StencilBackend};
use crate::format::PixelFormat;
use crate::target::RenderTarget;

/// An uploaded source image plus the texture-coordinate extent of its valid region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StagedSource {
    pub image: ImageId,
    pub u_max: f32,
    pub v_max: f32,
}

/// Expands `target`'s guest pixels from `src` into a CPU-side RGBA8 image.
///
/// `src` must hold at least [`RenderTarget::byte_len`] bytes.
pub fn stage_image(src: &[u8], target: &RenderTarget) -> StagedImage {
    let width = target.stride;
    let height = target.height;
    let pixels = target.pixel_count();
    let bpp = target.format.bytes_per_pixel();

    let mut rgba8 = vec![0u8; pixels * 4];
    for (dst, px) in rgba8.chunks_exact_mut(4).zip(src.chunks_exact(bpp)) {
        dst.copy_from_slice(&expand_pixel(target.format, px));
    }

    let u_max = if width == 0 {
        1.0
    } else {
        target.width.min(width) as f32 / width as f32
    };

    StagedImage {
        width,
        height,
        source_format: target.format,
        rgba8,
        u_max,
        v_max: 1.0,
    }
}

/// Expands and uploads `target`'s pixels, then drops the backend's cached bindings so the
/// upcoming draws cannot be skipped as redundant.
pub fn upload_source<B: StencilBackend + ?Sized>(
    backend: &mut B,
    src: &[u8],
    target: &RenderTarget,
) -> Result<StagedSource, BackendError> {
    let staged = stage_image(src, target);
    let image = backend.upload_image(&staged)?;
    backend.forget_cached_bindings();
    Ok(StagedSource {
        image,
        u_max: staged.u_max,
        v_max: staged.v_max,
    })
}

fn expand_pixel(format: PixelFormat, px: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Rgb565 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            [
                expand5((c & 0x1f) as u8),
                expand6(((c >> 5) & 0x3f) as u8),
                expand5(((c >> 11) & 0x1f) as u8),
                255,
            ]
        }
        PixelFormat::Rgba5551 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            [
                expand5((c & 0x1f) as u8),
                expand5(((c >> 5) & 0x1f) as u8),
                expand5(((c >> 10) & 0x1f) as u8),
                if c & 0x8000 != 0 { 255 } else { 0 },
            ]
        }
        PixelFormat::Rgba4444 => {
            let c = u16::from_le_bytes([px[0], px[1]]);
            [
                expand4((c & 0xf) as u8),
                expand4(((c >> 4) & 0xf) as u8),
                expand4(((c >> 8) & 0xf) as u8),
                expand4(((c >> 12) & 0xf) as u8),
            ]
        }
        PixelFormat::Rgba8888 => [px[0], px[1], px[2], px[3]],
    }
}

// Replicate top bits into low bits to fill 8-bit channels.
fn expand4(v: u8) -> u8 {
    (v << 4) | v
}

fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

fn expand6(v: u8) -> u8 {
    (v << 2) | (v >> 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{RecordedCmd, RecordingBackend};
    use crate::target::AttachmentId;

    fn target(format: PixelFormat, stride: u32, width: u32, height: u32) -> RenderTarget {
        RenderTarget {
            address: 0x0400_0000,
            stride,
            format,
            width,
            height,
            render_width: width * 2,
            render_height: height * 2,
            attachment: Some(AttachmentId(1)),
        }
    }

    fn u16_bytes(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn alpha_expands_so_stencil_bits_survive_sampling() {
        let t = target(PixelFormat::Rgba4444, 4, 4, 1);
        let staged = stage_image(&u16_bytes(&[0x0000, 0x3000, 0x8000, 0xF000]), &t);
        let alphas: Vec<u8> = staged.rgba8.chunks_exact(4).map(|px| px[3]).collect();
        assert_eq!(alphas, vec![0x00, 0x33, 0x88, 0xFF]);

        let t = target(PixelFormat::Rgba5551, 2, 2, 1);
        let staged = stage_image(&u16_bytes(&[0x7FFF, 0x8000]), &t);
        assert_eq!(staged.rgba8, vec![255, 255, 255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn rgb565_channels_use_bit_replication() {
        let t = target(PixelFormat::Rgb565, 1, 1, 1);
        // R=31, G=0, B=16.
        let staged = stage_image(&u16_bytes(&[0x801F]), &t);
        assert_eq!(staged.rgba8, vec![255, 0, 132, 255]);
    }

    #[test]
    fn stride_padding_is_reported_through_u_max() {
        let t = target(PixelFormat::Rgba8888, 512, 480, 2);
        let src = vec![0u8; t.byte_len()];
        let staged = stage_image(&src, &t);
        assert_eq!(staged.width, 512);
        assert_eq!(staged.height, 2);
        assert_eq!(staged.u_max, 480.0 / 512.0);
        assert_eq!(staged.v_max, 1.0);
    }

    #[test]
    fn upload_invalidates_cached_bindings() {
        let mut backend = RecordingBackend::new();
        let t = target(PixelFormat::Rgba8888, 2, 2, 1);
        let staged = upload_source(&mut backend, &[1, 2, 3, 4, 5, 6, 7, 8], &t).unwrap();

        assert!(matches!(
            backend.commands(),
            [
                RecordedCmd::UploadImage { id, width: 2, height: 1 },
                RecordedCmd::ForgetCachedBindings,
            ] if *id == staged.image
        ));
        assert_eq!(backend.images()[0].rgba8, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
