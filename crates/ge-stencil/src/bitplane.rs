//! Stencil bitplane analysis.
//!
//! Scans guest pixels and reports which bit positions of the stencil value are set anywhere in
//! the surface. Replay works one bitplane at a time, so distinct *values* do not matter, only
//! which bits ever occur.

use crate::format::PixelFormat;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("pixel format {0:?} has no stencil bits")]
    UnsupportedFormat(PixelFormat),
    #[error("source holds {available} bytes but {pixels} pixels need {needed}")]
    ShortBuffer {
        pixels: usize,
        needed: usize,
        available: usize,
    },
}

/// Result of a bitplane scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedBits {
    bits: u8,
    levels: u16,
}

impl UsedBits {
    pub fn new(bits: u8, levels: u16) -> Self {
        Self { bits, levels }
    }

    /// Bit `i` is set iff some pixel's stencil value has bit `i` set.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Distinct stencil values of the scanned format (2, 16 or 256).
    pub fn levels(&self) -> u16 {
        self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// `bit` is a single-bit value (1, 2, 4, ...), not a bit index.
    pub fn contains(&self, bit: u32) -> bool {
        bit <= 0xFF && (u32::from(self.bits) & bit) != 0
    }

    pub fn count(&self) -> u32 {
        self.bits.count_ones()
    }

    /// Single-bit values below `levels`, lowest first, whether or not they are used.
    pub fn bit_values(&self) -> impl Iterator<Item = u32> {
        let levels = u32::from(self.levels);
        std::iter::successors(Some(1u32), |bit| Some(bit * 2)).take_while(move |bit| *bit < levels)
    }
}

/// Scans `pixels` pixels of `src` (guest byte order) and returns the used stencil bits.
///
/// Every pixel is visited; there is no early exit because all bit positions must be found.
pub fn analyze(src: &[u8], pixels: usize, format: PixelFormat) -> Result<UsedBits, AnalyzeError> {
    let scan: fn(&[u8]) -> u8 = match format {
        PixelFormat::Rgb565 => return Err(AnalyzeError::UnsupportedFormat(format)),
        PixelFormat::Rgba5551 => stencil_bits_5551,
        PixelFormat::Rgba4444 => stencil_bits_4444,
        PixelFormat::Rgba8888 => stencil_bits_8888,
    };
    let levels = format
        .stencil_levels()
        .ok_or(AnalyzeError::UnsupportedFormat(format))?;

    let needed = pixels.saturating_mul(format.bytes_per_pixel());
    let src = src.get(..needed).ok_or(AnalyzeError::ShortBuffer {
        pixels,
        needed,
        available: src.len(),
    })?;

    Ok(UsedBits::new(scan(src), levels))
}

fn stencil_bits_5551(src: &[u8]) -> u8 {
    let acc = src
        .chunks_exact(2)
        .fold(0u16, |acc, px| acc | u16::from_le_bytes([px[0], px[1]]));
    (acc >> 15) as u8
}

fn stencil_bits_4444(src: &[u8]) -> u8 {
    let acc = src
        .chunks_exact(2)
        .fold(0u16, |acc, px| acc | u16::from_le_bytes([px[0], px[1]]));
    (acc >> 12) as u8
}

fn stencil_bits_8888(src: &[u8]) -> u8 {
    src.chunks_exact(4).fold(0u8, |acc, px| acc | px[3])
}
