//! Functions that are used in a NIC initialization procedure.
//!
//! They allocate a queue's descriptor ring and packet buffers, point every
//! descriptor at its buffer, and program the queue's base, length, head and tail registers.

#![no_std]

#[macro_use] extern crate log;

#[cfg(test)]
mod test;

use core::fmt;
use intel_ethernet::{
    DescriptorRing,
    descriptors::{RxDescriptor, TxDescriptor},
};
use memory_structs::TranslateAddress;
use nic_buffers::{BufferPool, DmaError};
use nic_queues::{RxQueue, RxQueueRegisters, TxQueue, TxQueueRegisters};
use zerocopy::{AsBytes, FromBytes};

/// The hardware requires ring lengths to be a multiple of this many descriptors,
/// i.e., a multiple of 128 bytes.
pub const DESCRIPTOR_COUNT_MULTIPLE: u16 = 8;


/// Possible reasons for failing to set up a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NicInitError {
    /// The number of descriptors is zero or not a multiple of [`DESCRIPTOR_COUNT_MULTIPLE`].
    InvalidRingSize(u16),
    /// The ring or its packet buffers couldn't be allocated.
    Dma(DmaError),
}

impl From<DmaError> for NicInitError {
    fn from(error: DmaError) -> Self {
        NicInitError::Dma(error)
    }
}

impl fmt::Display for NicInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NicInitError::InvalidRingSize(n) => write!(f, "invalid ring size {}, must be a non-zero multiple of {}", n, DESCRIPTOR_COUNT_MULTIPLE),
            NicInitError::Dma(e) => write!(f, "{}", e),
        }
    }
}

impl From<NicInitError> for &'static str {
    fn from(error: NicInitError) -> Self {
        match error {
            NicInitError::InvalidRingSize(_) => "invalid number of descriptors in ring",
            NicInitError::Dma(e) => e.into(),
        }
    }
}

fn check_ring_size(num_desc: u16) -> Result<(), NicInitError> {
    if num_desc == 0 || num_desc % DESCRIPTOR_COUNT_MULTIPLE != 0 {
        error!("nic_initialization: invalid ring size {}", num_desc);
        return Err(NicInitError::InvalidRingSize(num_desc));
    }
    Ok(())
}

/// Allocates a ring with one packet buffer per descriptor and points each descriptor at its buffer.
fn allocate_ring<D, T, F>(
    num_desc: u16,
    buffer_size: usize,
    translator: &T,
    init: F,
) -> Result<(DescriptorRing<D>, BufferPool), NicInitError>
    where D: FromBytes + AsBytes + Copy,
          T: TranslateAddress + ?Sized,
          F: Fn(&mut D, &BufferPool, usize),
{
    check_ring_size(num_desc)?;
    let mut ring = DescriptorRing::<D>::new(num_desc, translator)?;
    let buffers = BufferPool::new(num_desc as usize, buffer_size, translator)?;
    for i in 0..num_desc {
        ring.update(i, |desc| init(desc, &buffers, i as usize));
    }
    Ok((ring, buffers))
}

/// Steps to create and initialize a transmit queue.
///
/// Every descriptor starts out done (owned by software), and both head and tail are zero
/// because there are no transmit requests yet.
///
/// # Arguments
/// * `num_desc`: number of descriptors in the ring, a multiple of [`DESCRIPTOR_COUNT_MULTIPLE`]
/// * `buffer_size`: size in bytes of each transmit buffer
/// * `max_packet_size`: packets must be strictly shorter than this
/// * `translator`: virtual to physical address translation for DMA memory
/// * `txq_regs`: registers needed to set up a transmit queue
pub fn init_tx_queue<D, S, T>(
    num_desc: u16,
    buffer_size: usize,
    max_packet_size: usize,
    translator: &T,
    mut txq_regs: S,
) -> Result<TxQueue<S, D>, NicInitError>
    where D: TxDescriptor + FromBytes + AsBytes + Copy,
          S: TxQueueRegisters,
          T: TranslateAddress + ?Sized,
{
    let (ring, buffers) = allocate_ring::<D, T, _>(num_desc, buffer_size, translator, |desc, buffers, i| desc.init(buffers.phys_addr(i)))?;

    let ring_paddr = ring.phys_addr();
    debug!("nic_initialization::init_tx_queue(): {} descriptors at {}", num_desc, ring_paddr);

    // write the physical address of the tx descs array
    txq_regs.set_tdbal(ring_paddr.low_u32());
    txq_regs.set_tdbah(ring_paddr.high_u32());

    // write the length (in total bytes) of the tx descs array
    txq_regs.set_tdlen(ring.size_in_bytes());

    // write the head index and the tail index (both 0 initially because there are no tx requests yet)
    txq_regs.set_tdh(0);
    txq_regs.set_tdt(0);

    Ok(TxQueue::new(txq_regs, ring, buffers, max_packet_size))
}

/// Steps to create and initialize a receive queue.
///
/// Every descriptor is pre-posted with its buffer, and the tail is set to the last
/// descriptor so the device may fill all slots immediately.
///
/// # Arguments
/// * `num_desc`: number of descriptors in the ring, a multiple of [`DESCRIPTOR_COUNT_MULTIPLE`]
/// * `buffer_size`: size in bytes of each receive buffer, which must match the device's configured buffer size
/// * `translator`: virtual to physical address translation for DMA memory
/// * `rxq_regs`: registers needed to set up a receive queue
pub fn init_rx_queue<D, S, T>(
    num_desc: u16,
    buffer_size: usize,
    translator: &T,
    mut rxq_regs: S,
) -> Result<RxQueue<S, D>, NicInitError>
    where D: RxDescriptor + FromBytes + AsBytes + Copy,
          S: RxQueueRegisters,
          T: TranslateAddress + ?Sized,
{
    let (ring, buffers) = allocate_ring::<D, T, _>(num_desc, buffer_size, translator, |desc, buffers, i| desc.init(buffers.phys_addr(i)))?;

    let ring_paddr = ring.phys_addr();
    debug!("nic_initialization::init_rx_queue(): {} descriptors at {}", num_desc, ring_paddr);

    // write the physical address of the rx descs ring
    rxq_regs.set_rdbal(ring_paddr.low_u32());
    rxq_regs.set_rdbah(ring_paddr.high_u32());

    // write the length (in total bytes) of the rx descs array
    rxq_regs.set_rdlen(ring.size_in_bytes());

    // the head starts at the first descriptor and the tail at the last, offering every buffer to the device
    rxq_regs.set_rdh(0);
    rxq_regs.set_rdt(num_desc as u32 - 1);

    Ok(RxQueue::new(rxq_regs, ring, buffers))
}
