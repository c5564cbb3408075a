//! DPC DMA binding (component G, DPC flavor) and its ring carve-out, grounded on `xvc_dpc.c`'s
//! `idpc`/`edpc` and `hsdp.h`'s region layout. Wires [`xvc_core::dma::DmaEngine`] to two live
//! `/dev/mem` mappings: one for the AXI-DMA register block, one for the descriptor/packet
//! buffer region.

use xvc_core::dma::{DmaEngine, PollOutcome, RingLayout};
use xvc_core::error::HandlerError;
use xvc_core::handlers::{CoreOps, DpcOps};
use xvc_core::ring::{desc, Quadrant};

use crate::mmio::MmapWindow;
use crate::physmem::PhysMem;

/// Descriptors per ring (`DMA_PACKET_COUNT` in `hsdp.h`).
pub const DESCRIPTOR_COUNT: usize = 4;
/// Bytes per packet buffer slot (`DMA_PACKET_BUFF_SIZE_DEFAULT` in `hsdp.h`).
pub const PACKET_BUFFER_SIZE: usize = 0x410;
/// Largest packet `idpc:`/`edpc:` will accept, in bytes (`MAX_PACKET_SIZE` in `hsdp_lib.h`).
pub const MAX_PACKET_SIZE: usize = 1032;

const DESC_REGION_SIZE: usize = DESCRIPTOR_COUNT * desc::STRIDE;
const PACKET_REGION_SIZE: usize = DESCRIPTOR_COUNT * PACKET_BUFFER_SIZE;

/// Byte offsets of the four quadrants within the single `buf_addr`/`buf_size` mapping (spec.md
/// §6 "Ring carve-out": four descriptors of 0x40 bytes each for ingress and egress, followed by
/// four 0x410-byte packet buffers each).
pub struct RingCarveOut {
    pub ingress_desc_offset: usize,
    pub egress_desc_offset: usize,
    pub ingress_packets_offset: usize,
    pub egress_packets_offset: usize,
}

impl RingCarveOut {
    pub const DEFAULT: Self = Self {
        ingress_desc_offset: 0,
        egress_desc_offset: DESC_REGION_SIZE,
        ingress_packets_offset: 2 * DESC_REGION_SIZE,
        egress_packets_offset: 2 * DESC_REGION_SIZE + PACKET_REGION_SIZE,
    };

    pub fn total_size(&self) -> usize {
        self.egress_packets_offset + PACKET_REGION_SIZE
    }
}

/// Opens the DMA register block and the ring carve-out, then runs [`DmaEngine::setup`].
///
/// # Errors
/// Propagates `/dev/mem` mmap failures from opening either region.
pub fn open_dma_engine(
    dma_addr: u64,
    dma_size: usize,
    buf_addr: u64,
    buf_size: usize,
) -> std::io::Result<DmaEngine> {
    let carve_out = RingCarveOut::DEFAULT;
    assert!(
        buf_size >= carve_out.total_size(),
        "buf_size {buf_size:#x} too small for the ring carve-out ({:#x} bytes required)",
        carve_out.total_size()
    );

    let regs = PhysMem::open(dma_addr, dma_size)?;
    let buf = PhysMem::open(buf_addr, buf_size)?;

    // Four independent windows into the same `buf` mapping: splitting them at open time (each
    // a fresh `/dev/mem` mapping of its slice) keeps `DmaEngine` ignorant of how the quadrants
    // share a backing allocation, matching `RegisterWindow`'s "just a byte window" contract.
    let ingress_desc = PhysMem::open(buf_addr + carve_out.ingress_desc_offset as u64, DESC_REGION_SIZE)?;
    let egress_desc = PhysMem::open(buf_addr + carve_out.egress_desc_offset as u64, DESC_REGION_SIZE)?;
    let ingress_packets =
        PhysMem::open(buf_addr + carve_out.ingress_packets_offset as u64, PACKET_REGION_SIZE)?;
    let egress_packets =
        PhysMem::open(buf_addr + carve_out.egress_packets_offset as u64, PACKET_REGION_SIZE)?;
    drop(buf);

    let mut engine = DmaEngine::new(
        Box::new(MmapWindow::new(regs)),
        Box::new(MmapWindow::new(ingress_desc)),
        Box::new(MmapWindow::new(ingress_packets)),
        RingLayout {
            descriptor_axi_base: buf_addr + carve_out.ingress_desc_offset as u64,
            descriptor_count: DESCRIPTOR_COUNT,
            packets: Quadrant::new(
                buf_addr + carve_out.ingress_packets_offset as u64,
                PACKET_REGION_SIZE,
                PACKET_BUFFER_SIZE,
            ),
        },
        Box::new(MmapWindow::new(egress_desc)),
        Box::new(MmapWindow::new(egress_packets)),
        RingLayout {
            descriptor_axi_base: buf_addr + carve_out.egress_desc_offset as u64,
            descriptor_count: DESCRIPTOR_COUNT,
            packets: Quadrant::new(
                buf_addr + carve_out.egress_packets_offset as u64,
                PACKET_REGION_SIZE,
                PACKET_BUFFER_SIZE,
            ),
        },
    );
    engine.setup();
    Ok(engine)
}

pub struct DpcBinding {
    engine: DmaEngine,
    /// Number of `receive_fast_packet` polls per `edpc:` (1 normally, 10 under verbose logging
    /// — `hsdp_receive_fast_packet`'s verbose multiplier, spec.md §4.3).
    receive_polls: usize,
}

impl DpcBinding {
    pub fn new(engine: DmaEngine, receive_polls: usize) -> Self {
        Self {
            engine,
            receive_polls,
        }
    }
}

impl CoreOps for DpcBinding {
    fn open_port(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn close_port(&mut self) {}
}

impl DpcOps for DpcBinding {
    fn idpc(&mut self, _flags: u32, data: &[u8]) -> Result<(), HandlerError> {
        if data.len() >= MAX_PACKET_SIZE {
            return Err(HandlerError::new(format!(
                "size of ingress packet ({} words) greater than allowed max packet size of {} words",
                data.len() / 4,
                MAX_PACKET_SIZE / 4
            )));
        }
        self.engine
            .send_packet(data)
            .map_err(|e| HandlerError::new(e.to_string()))
    }

    fn edpc(&mut self, _flags: u32, word_count: u32) -> Result<Vec<u8>, HandlerError> {
        match self.engine.receive_fast_packet(self.receive_polls) {
            PollOutcome::Data(data) => Ok(data),
            PollOutcome::Empty | PollOutcome::HardwareError { .. } => {
                Ok(vec![0u8; word_count as usize * 4])
            }
        }
    }
}
