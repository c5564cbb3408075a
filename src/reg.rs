//! Abstract register window (component A).
//!
//! `xvc-core` never maps `/dev/mem` itself — that is `xvc-hw`'s job — so the ring and DMA
//! engines below are written against this trait instead of raw pointers. `xvc-hw` supplies
//! the real `tock-registers`-backed implementation over a live mmap; tests here use
//! [`MemoryWindow`], a plain `Vec<u8>` standing in for a device.

/// A contiguous, byte-addressable MMIO region with volatile, strictly-ordered access.
///
/// Implementors must never cache a load across calls and must treat every store as
/// observable immediately to whatever is on the other end of the window.
pub trait RegisterWindow {
    /// Volatile 32-bit load at `offset`.
    fn load32(&self, offset: usize) -> u32;

    /// Volatile 32-bit store at `offset`.
    fn store32(&mut self, offset: usize, value: u32);

    /// Volatile 64-bit store at `offset`, composed from two 32-bit stores when the backing
    /// window doesn't support a native 64-bit access. Optional per spec.md §4.1; the default
    /// implementation composes it from `store32` in little-endian halves.
    fn store64(&mut self, offset: usize, value: u64) {
        self.store32(offset, value as u32);
        self.store32(offset + 4, (value >> 32) as u32);
    }

    /// Full store-store fence: every prior store in program order becomes visible to the
    /// device before any store issued after this call. Called before handing a tail pointer
    /// to hardware (spec.md §4.1, §9 "Volatile vs. atomic MMIO").
    fn barrier(&self);

    /// Stores `bytes` as a run of 32-bit little-endian words starting at `offset`. A short
    /// final chunk is zero-padded in the last word rather than read-modify-written.
    fn store_bytes(&mut self, offset: usize, bytes: &[u8]) {
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.store32(offset + i * 4, u32::from_le_bytes(word));
        }
    }

    /// Loads `len` bytes starting at `offset`, one 32-bit word at a time.
    fn load_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut remaining = len;
        let mut pos = offset;
        while remaining > 0 {
            let word = self.load32(pos).to_le_bytes();
            let take = remaining.min(4);
            out.extend_from_slice(&word[..take]);
            remaining -= take;
            pos += 4;
        }
        out
    }
}

/// A `Vec<u8>`-backed [`RegisterWindow`], used to exercise the ring and DMA engines without a
/// real mmap. Not part of the public API surface any binding should depend on.
#[derive(Debug)]
pub struct MemoryWindow {
    bytes: Vec<u8>,
}

impl MemoryWindow {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl RegisterWindow for MemoryWindow {
    fn load32(&self, offset: usize) -> u32 {
        let bytes = self.bytes[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    fn store32(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn barrier(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips() {
        let mut window = MemoryWindow::new(0x40);
        window.store32(0x18, 0x0C00_0010);
        assert_eq!(window.load32(0x18), 0x0C00_0010);
    }

    #[test]
    fn store64_composes_two_stores() {
        let mut window = MemoryWindow::new(0x10);
        window.store64(0x00, 0x1122_3344_5566_7788);
        assert_eq!(window.load32(0x00), 0x5566_7788);
        assert_eq!(window.load32(0x04), 0x1122_3344);
    }
}
