//! Guest address aliasing.
//!
//! The same VRAM byte is reachable through several guest addresses (cached/uncached segments,
//! VRAM mirrors). Render targets are therefore matched under an injected equivalence rather
//! than by exact address.

/// Equivalence relation over guest addresses.
pub trait AddressAlias {
    /// Returns `true` if `a` and `b` name the same backing memory.
    fn addresses_alias(&self, a: u32, b: u32) -> bool;
}

impl<F> AddressAlias for F
where
    F: Fn(u32, u32) -> bool,
{
    fn addresses_alias(&self, a: u32, b: u32) -> bool {
        self(a, b)
    }
}

/// Two addresses alias when they agree on every bit of `mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorMask(pub u32);

impl MirrorMask {
    /// Drops the segment and mirror bits above the 64 MiB physical window.
    pub const DEFAULT: Self = Self(0x03FF_FFFF);
}

impl Default for MirrorMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl AddressAlias for MirrorMask {
    fn addresses_alias(&self, a: u32, b: u32) -> bool {
        (a & self.0) == (b & self.0)
    }
}

/// Coarse "could this address touch any framebuffer at all" pre-filter.
///
/// Tracks the half-open window `[vram_base, range_end)` covering every tracked render target.
/// `range_end == 0` means nothing is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferWindow {
    vram_base: u32,
    segment_mask: u32,
    range_end: u32,
}

impl FramebufferWindow {
    pub fn new(vram_base: u32, segment_mask: u32) -> Self {
        Self {
            vram_base,
            segment_mask,
            range_end: 0,
        }
    }

    /// Grows the window so that `[addr, addr + len)` is covered.
    pub fn extend(&mut self, addr: u32, len: u32) {
        let end = (addr & self.segment_mask).saturating_add(len);
        self.range_end = self.range_end.max(end);
    }

    pub fn range_end(&self) -> u32 {
        self.range_end
    }

    pub fn may_intersect(&self, addr: u32) -> bool {
        let addr = addr & self.segment_mask;
        self.range_end > 0 && addr >= self.vram_base && addr < self.range_end
    }
}
