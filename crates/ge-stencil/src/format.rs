//! Guest framebuffer pixel formats.
//!
//! The emulated GE has no separate stencil buffer: whatever "stencil" a program writes lands in
//! the alpha bits of the color buffer. How many bits that is depends on the framebuffer format.

/// Pixel format of a guest framebuffer.
///
/// Discriminants match the raw `FRAMEBUF_PIXFORMAT` register encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// 16-bit `R5G6B5` (R in the low bits). No alpha, so no stencil.
    Rgb565 = 0,
    /// 16-bit `R5G5B5A1`. One stencil bit at bit 15.
    Rgba5551 = 1,
    /// 16-bit `R4G4B4A4`. Four stencil bits in the top nibble.
    Rgba4444 = 2,
    /// 32-bit `R8G8B8A8`. Eight stencil bits in the top byte.
    Rgba8888 = 3,
}

impl PixelFormat {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rgb565),
            1 => Some(Self::Rgba5551),
            2 => Some(Self::Rgba4444),
            3 => Some(Self::Rgba8888),
            _ => None,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 | Self::Rgba5551 | Self::Rgba4444 => 2,
            Self::Rgba8888 => 4,
        }
    }

    /// Number of stencil-equivalent bits stored per pixel.
    pub const fn stencil_bits(self) -> u32 {
        match self {
            Self::Rgb565 => 0,
            Self::Rgba5551 => 1,
            Self::Rgba4444 => 4,
            Self::Rgba8888 => 8,
        }
    }

    /// Number of distinct stencil values the format can hold (2, 16 or 256).
    ///
    /// Returns `None` for formats without stencil bits.
    pub const fn stencil_levels(self) -> Option<u16> {
        match self.stencil_bits() {
            0 => None,
            bits => Some(1 << bits),
        }
    }

    pub const fn has_stencil(self) -> bool {
        self.stencil_bits() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_stencil_bits() {
        assert_eq!(PixelFormat::Rgb565.stencil_levels(), None);
        assert_eq!(PixelFormat::Rgba5551.stencil_levels(), Some(2));
        assert_eq!(PixelFormat::Rgba4444.stencil_levels(), Some(16));
        assert_eq!(PixelFormat::Rgba8888.stencil_levels(), Some(256));
    }

    #[test]
    fn raw_encoding_round_trips() {
        for raw in 0..4 {
            let format = PixelFormat::from_raw(raw).unwrap();
            assert_eq!(format as u32, raw);
        }
        assert_eq!(PixelFormat::from_raw(4), None);
    }
}
