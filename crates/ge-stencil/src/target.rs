//! Tracked render targets and address lookup.

use crate::alias::{AddressAlias, FramebufferWindow};
use crate::format::PixelFormat;

/// Opaque handle to the host-side color/depth-stencil attachment of a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentId(pub u32);

/// One guest framebuffer tracked by the framebuffer manager.
///
/// This crate only reads render targets; they are created and destroyed by the tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    /// Guest address of the first pixel.
    pub address: u32,
    /// Row stride in pixels.
    pub stride: u32,
    pub format: PixelFormat,
    /// Logical (guest-visible) size.
    pub width: u32,
    pub height: u32,
    /// Size of the host surface, which may be upscaled.
    pub render_width: u32,
    pub render_height: u32,
    pub attachment: Option<AttachmentId>,
}

impl RenderTarget {
    /// Pixels covered by the target in guest memory, including stride padding.
    pub fn pixel_count(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.format.bytes_per_pixel()
    }
}

/// Maps guest addresses to the tracked render target they back.
#[derive(Debug, Clone)]
pub struct RenderTargetLocator<A> {
    alias: A,
    vram_base: u32,
    segment_mask: u32,
}

impl<A: AddressAlias> RenderTargetLocator<A> {
    pub fn new(alias: A, vram_base: u32, segment_mask: u32) -> Self {
        Self {
            alias,
            vram_base,
            segment_mask,
        }
    }

    pub fn alias(&self) -> &A {
        &self.alias
    }

    /// Builds the pre-filter window covering every target in `targets`.
    pub fn window<'a, I>(&self, targets: I) -> FramebufferWindow
    where
        I: IntoIterator<Item = &'a RenderTarget>,
    {
        let mut window = FramebufferWindow::new(self.vram_base, self.segment_mask);
        for target in targets {
            let len = u32::try_from(target.byte_len()).unwrap_or(u32::MAX);
            window.extend(target.address, len);
        }
        window
    }

    /// Returns the target backing `addr`, or `None`.
    ///
    /// When several targets alias `addr`, the one added last (latest in `targets`) wins.
    pub fn locate<'a>(&self, addr: u32, targets: &'a [RenderTarget]) -> Option<&'a RenderTarget> {
        if !self.window(targets).may_intersect(addr) {
            return None;
        }
        targets
            .iter()
            .rev()
            .find(|target| self.alias.addresses_alias(target.address, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::MirrorMask;

    fn target(address: u32, attachment: u32) -> RenderTarget {
        RenderTarget {
            address,
            stride: 512,
            format: PixelFormat::Rgba8888,
            width: 480,
            height: 272,
            render_width: 480,
            render_height: 272,
            attachment: Some(AttachmentId(attachment)),
        }
    }

    fn locator() -> RenderTargetLocator<MirrorMask> {
        RenderTargetLocator::new(MirrorMask::DEFAULT, 0x0400_0000, 0x3FFF_FFFF)
    }

    #[test]
    fn last_registered_alias_wins() {
        let targets = [target(0x0400_0000, 1), target(0x4400_0000, 2)];
        let found = locator().locate(0x0400_0000, &targets).unwrap();
        assert_eq!(found.attachment, Some(AttachmentId(2)));
    }

    #[test]
    fn untracked_addresses_are_not_found() {
        let targets = [target(0x0400_0000, 1)];
        // Inside the window but not the base of any target.
        assert!(locator().locate(0x0400_1000, &targets).is_none());
        // Outside VRAM entirely.
        assert!(locator().locate(0x0880_0000, &targets).is_none());
        assert!(locator().locate(0x0400_0000, &[]).is_none());
    }

    #[test]
    fn window_covers_stride_padding() {
        let targets = [target(0x0400_0000, 1)];
        let window = locator().window(&targets);
        assert_eq!(window.range_end(), 0x0400_0000 + 512 * 272 * 4);
    }
}
