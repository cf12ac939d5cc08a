//! Guest memory access used by the stencil upload path.
//!
//! The emulator provides an implementation backed by its memory system; tests use
//! [`VecGuestMemory`].

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuestMemoryError {
    #[error("guest memory read out of bounds (addr=0x{addr:x}, len={len})")]
    OutOfBounds { addr: u32, len: usize },
}

/// Minimal read-by-address interface.
pub trait GuestMemory {
    /// Fails unless `len` bytes starting at `addr` are readable.
    fn check_range(&self, addr: u32, len: usize) -> Result<(), GuestMemoryError>;

    fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError>;

    /// Reads `len` bytes starting at `addr` into a fresh buffer.
    ///
    /// The range is checked before the buffer is allocated.
    fn read_vec(&self, addr: u32, len: usize) -> Result<Vec<u8>, GuestMemoryError> {
        self.check_range(addr, len)?;
        let mut buf = vec![0u8; len];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }
}

/// A simple in-memory guest memory implementation backed by a single `Vec<u8>`.
///
/// The address space starts at `base`; reads below it or past the end fail.
#[derive(Debug, Clone)]
pub struct VecGuestMemory {
    base: u32,
    data: Vec<u8>,
}

impl VecGuestMemory {
    pub fn new(base: u32, size_bytes: usize) -> Self {
        Self {
            base,
            data: vec![0u8; size_bytes],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
        let err = GuestMemoryError::OutOfBounds { addr, len };
        let offset = addr.checked_sub(self.base).ok_or(err.clone())? as usize;
        let end = offset.checked_add(len).ok_or(err.clone())?;
        if end > self.data.len() {
            return Err(err);
        }
        Ok(offset..end)
    }

    pub fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(addr, src.len())?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }

    /// Writes 16-bit pixels in guest (little-endian) byte order.
    pub fn write_u16s(&mut self, addr: u32, values: &[u16]) -> Result<(), GuestMemoryError> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write(addr, &bytes)
    }

    /// Writes 32-bit pixels in guest (little-endian) byte order.
    pub fn write_u32s(&mut self, addr: u32, values: &[u32]) -> Result<(), GuestMemoryError> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write(addr, &bytes)
    }
}

impl GuestMemory for VecGuestMemory {
    fn check_range(&self, addr: u32, len: usize) -> Result<(), GuestMemoryError> {
        self.range(addr, len).map(|_| ())
    }

    fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let range = self.range(addr, dst.len())?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_outside_the_backing_store_fail() {
        let mut mem = VecGuestMemory::new(0x0400_0000, 16);
        mem.write(0x0400_0004, &[1, 2, 3, 4]).unwrap();

        assert_eq!(mem.read_vec(0x0400_0004, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(
            mem.read_vec(0x03FF_FFFF, 2),
            Err(GuestMemoryError::OutOfBounds {
                addr: 0x03FF_FFFF,
                len: 2
            })
        );
        assert!(mem.read_vec(0x0400_000E, 4).is_err());
    }

    #[test]
    fn oversized_reads_fail_before_allocating() {
        let mem = VecGuestMemory::new(0x0400_0000, 16);
        let len = isize::MAX as usize;
        assert_eq!(
            mem.read_vec(0x0400_0000, len),
            Err(GuestMemoryError::OutOfBounds {
                addr: 0x0400_0000,
                len
            })
        );
        assert!(mem.check_range(0x0400_0000, 16).is_ok());
        assert!(mem.check_range(0x0400_0001, 16).is_err());
    }

    #[test]
    fn pixel_writes_are_little_endian() {
        let mut mem = VecGuestMemory::new(0, 8);
        mem.write_u16s(0, &[0xF00D]).unwrap();
        mem.write_u32s(4, &[0xAABB_CCDD]).unwrap();
        assert_eq!(
            mem.read_vec(0, 8).unwrap(),
            vec![0x0D, 0xF0, 0, 0, 0xDD, 0xCC, 0xBB, 0xAA]
        );
    }
}
