//! Descriptor ring (component B).
//!
//! A ring region is a quadrant of a single backing allocation: `axi_base` (what the DMA
//! engine sees), `buffer_size`, `packet_size`, and `last` (the most recently produced or
//! consumed slot, absent before first use). The descriptor quadrant and its paired packet
//! quadrant share the same `count`; each descriptor's `BUFF` field points at its paired
//! packet slot.

use crate::reg::RegisterWindow;

/// Descriptor field byte offsets and the stride between descriptors, matching the on-device
/// 0x40-byte record (`hsdp.h`'s `DMA_DESC_SIZE`; spec's narrower "32-byte" language covers
/// only the fields actually in use, not the full stride).
pub mod desc {
    pub const NEXT: usize = 0x00;
    pub const NEXT_MSB: usize = 0x04;
    pub const BUFF: usize = 0x08;
    pub const BUFF_MSB: usize = 0x0C;
    pub const CNTL: usize = 0x18;
    pub const STS: usize = 0x1C;
    pub const APP0: usize = 0x20;
    pub const STRIDE: usize = 0x40;

    /// `STS` bit 31: transfer complete.
    pub const STS_DONE: u32 = 0x8000_0000;
    /// `STS` bits 30:28: hardware error flags.
    pub const STS_ERROR_MASK: u32 = 0x7000_0000;
    /// `STS` low 26 bits: actual transferred byte count.
    pub const STS_SIZE_MASK: u32 = 0x03FF_FFFF;
    /// `CNTL` bits 27:26: end-of-packet markers, always set by this engine.
    pub const CNTL_EOP: u32 = 0x0C00_0000;
    /// `CNTL` low 26 bits: packet byte length.
    pub const CNTL_SIZE_MASK: u32 = 0x03FF_FFFF;
}

/// One quadrant of the ring region: a set of fixed-size slots carved from one allocation.
#[derive(Debug, Clone, Copy)]
pub struct Quadrant {
    pub axi_base: u64,
    pub buffer_size: usize,
    pub packet_size: usize,
    pub last: Option<usize>,
}

impl Quadrant {
    pub fn new(axi_base: u64, buffer_size: usize, packet_size: usize) -> Self {
        Self {
            axi_base,
            buffer_size,
            packet_size,
            last: None,
        }
    }

    pub fn count(&self) -> usize {
        self.buffer_size / self.packet_size
    }

    /// `next = (last+1)*packet_size < buffer_size ? last+1 : 0`, computed without modulo so it
    /// matches the hardware's pointer chain exactly (spec.md §4.2).
    pub fn next(&self) -> usize {
        let last = self.last.map_or(-1i64, |l| l as i64);
        if (last + 1) * self.packet_size as i64 < self.buffer_size as i64 {
            (last + 1) as usize
        } else {
            0
        }
    }

    pub fn axi_addr(&self, index: usize) -> u64 {
        self.axi_base + (index * self.packet_size) as u64
    }
}

/// A descriptor quadrant paired with the packet quadrant its `BUFF` fields point into.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorRing {
    pub descriptors: Quadrant,
    pub packets: Quadrant,
}

impl DescriptorRing {
    pub fn new(desc_axi_base: u64, count: usize, packets: Quadrant) -> Self {
        let descriptors = Quadrant::new(desc_axi_base, count * desc::STRIDE, desc::STRIDE);
        Self {
            descriptors,
            packets,
        }
    }

    fn field_offset(&self, index: usize, field: usize) -> usize {
        index * desc::STRIDE + field
    }

    pub fn sts(&self, window: &dyn RegisterWindow, index: usize) -> u32 {
        window.load32(self.field_offset(index, desc::STS))
    }

    pub fn set_sts(&self, window: &mut dyn RegisterWindow, index: usize, value: u32) {
        window.store32(self.field_offset(index, desc::STS), value);
    }

    pub fn set_cntl(&self, window: &mut dyn RegisterWindow, index: usize, size: u32) {
        window.store32(
            self.field_offset(index, desc::CNTL),
            desc::CNTL_EOP | (size & desc::CNTL_SIZE_MASK),
        );
    }

    pub fn set_buff(&self, window: &mut dyn RegisterWindow, index: usize, axi_addr: u64) {
        window.store64(self.field_offset(index, desc::BUFF), axi_addr);
    }

    pub fn buff(&self, window: &dyn RegisterWindow, index: usize) -> u64 {
        let low = u64::from(window.load32(self.field_offset(index, desc::BUFF)));
        let high = u64::from(window.load32(self.field_offset(index, desc::BUFF_MSB)));
        low | (high << 32)
    }

    /// Zeroes the descriptor buffer, chains each descriptor's `NEXT` to its successor (last
    /// wraps to first), points each `BUFF` at its paired packet slot, and — for the ingress
    /// ring only — marks every slot `done` so the first producer can claim slot 0. The egress
    /// ring instead gets `CNTL` pre-armed with the end-of-packet marker and its full packet
    /// size, and `last` advances to the final slot since every slot is handed to hardware
    /// immediately (spec.md §4.3 step 3).
    pub fn initialize(&mut self, window: &mut dyn RegisterWindow, ingress: bool) {
        let count = self.descriptors.count();
        let total_words = (count * desc::STRIDE) / 4;
        for word in 0..total_words {
            window.store32(word * 4, 0);
        }
        for index in 0..count {
            let next_index = if index + 1 < count { index + 1 } else { 0 };
            let next_axi = self.descriptors.axi_addr(next_index);
            window.store64(self.field_offset(index, desc::NEXT), next_axi);
            self.set_buff(window, index, self.packets.axi_addr(index));
            if ingress {
                self.set_sts(window, index, desc::STS_DONE);
            } else {
                self.set_cntl(window, index, self.packets.packet_size as u32);
            }
        }
        window.barrier();
        if !ingress {
            self.descriptors.last = Some(count - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::MemoryWindow;

    fn small_ring() -> DescriptorRing {
        let packets = Quadrant::new(0x1000, 4 * 0x10, 0x10);
        DescriptorRing::new(0x2000, 4, packets)
    }

    #[test]
    fn next_never_reaches_buffer_size() {
        let ring = small_ring();
        for _ in 0..ring.descriptors.count() * 3 {
            let idx = ring.descriptors.next();
            assert!(idx * ring.descriptors.packet_size < ring.descriptors.buffer_size);
        }
    }

    #[test]
    fn descriptor_next_points_at_successor() {
        let mut ring = small_ring();
        let mut window = MemoryWindow::new(ring.descriptors.count() * desc::STRIDE);
        ring.initialize(&mut window, true);
        for index in 0..ring.descriptors.count() {
            let next_index = (index + 1) % ring.descriptors.count();
            let stored = window.load32(index * desc::STRIDE + desc::NEXT);
            assert_eq!(stored as u64, ring.descriptors.axi_addr(next_index));
        }
    }

    #[test]
    fn ingress_initialize_marks_all_slots_done_and_does_not_advance_last() {
        let mut ring = small_ring();
        let mut window = MemoryWindow::new(ring.descriptors.count() * desc::STRIDE);
        ring.initialize(&mut window, true);
        for index in 0..ring.descriptors.count() {
            assert_eq!(ring.sts(&window, index), desc::STS_DONE);
        }
        assert_eq!(ring.descriptors.last, None);
        assert_eq!(ring.descriptors.next(), 0);
    }

    #[test]
    fn egress_initialize_arms_cntl_and_advances_last_to_final_slot() {
        let mut ring = small_ring();
        let mut window = MemoryWindow::new(ring.descriptors.count() * desc::STRIDE);
        ring.initialize(&mut window, false);
        for index in 0..ring.descriptors.count() {
            let cntl = window.load32(index * desc::STRIDE + desc::CNTL);
            assert_eq!(cntl, desc::CNTL_EOP | ring.packets.packet_size as u32);
        }
        assert_eq!(ring.descriptors.last, Some(ring.descriptors.count() - 1));
    }
}
