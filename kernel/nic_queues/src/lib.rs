//! The transmit and receive queues of a NIC.
//!
//! A queue pairs a [`DescriptorRing`] with a [`BufferPool`] holding one packet
//! buffer per descriptor. Slot ownership alternates between software and the
//! device and is tracked solely through each descriptor's Descriptor Done (DD)
//! bit; the hardware head register is never read at runtime.
//!
//! Neither [`TxQueue::transmit()`] nor [`RxQueue::receive()`] ever blocks.
//! A full or empty ring is reported immediately and the caller decides how to retry.

#![no_std]

#[macro_use] extern crate log;

#[cfg(test)]
mod test;

use core::{
    fmt,
    sync::atomic::{fence, Ordering},
};
use intel_ethernet::{
    DescriptorRing,
    descriptors::{RxDescriptor, TxDescriptor},
};
use nic_buffers::BufferPool;
use zerocopy::{AsBytes, FromBytes};


/// The registers needed to set up and drive a transmit queue.
pub trait TxQueueRegisters {
    /// Sets the lower 32 bits of the transmit ring's physical address.
    fn set_tdbal(&mut self, value: u32);
    /// Sets the upper 32 bits of the transmit ring's physical address.
    fn set_tdbah(&mut self, value: u32);
    /// Sets the length of the transmit ring in bytes.
    fn set_tdlen(&mut self, value: u32);
    /// Sets the transmit head index.
    fn set_tdh(&mut self, value: u32);
    /// Sets the transmit tail index, which notifies the device of newly armed descriptors.
    fn set_tdt(&mut self, value: u32);
    /// Reads the transmit tail index.
    fn tdt(&self) -> u32;
}

/// The registers needed to set up and drive a receive queue.
pub trait RxQueueRegisters {
    /// Sets the lower 32 bits of the receive ring's physical address.
    fn set_rdbal(&mut self, value: u32);
    /// Sets the upper 32 bits of the receive ring's physical address.
    fn set_rdbah(&mut self, value: u32);
    /// Sets the length of the receive ring in bytes.
    fn set_rdlen(&mut self, value: u32);
    /// Sets the receive head index.
    fn set_rdh(&mut self, value: u32);
    /// Sets the receive tail index, which hands descriptors back to the device.
    fn set_rdt(&mut self, value: u32);
    /// Reads the receive tail index.
    fn rdt(&self) -> u32;
}


/// Reasons a packet could not be queued for transmission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxError {
    /// Every free slot is still owned by the device; try again later.
    RingFull,
    /// The packet does not fit in a transmit buffer.
    OversizedPacket {
        length: usize,
        max: usize,
    },
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::RingFull => f.write_str("transmit ring is full"),
            TxError::OversizedPacket { length, max } => write!(f, "packet of {} bytes must be shorter than {} bytes", length, max),
        }
    }
}

impl From<TxError> for &'static str {
    fn from(error: TxError) -> Self {
        match error {
            TxError::RingFull => "transmit ring is full",
            TxError::OversizedPacket { .. } => "packet is too large to transmit",
        }
    }
}

/// Reasons a packet could not be received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxError {
    /// The device has not deposited a new packet.
    RingEmpty,
    /// The destination can't hold a maximum-sized packet.
    BufferTooSmall {
        capacity: usize,
        required: usize,
    },
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxError::RingEmpty => f.write_str("receive ring is empty"),
            RxError::BufferTooSmall { capacity, required } => write!(f, "receive buffer holds {} bytes, but {} are required", capacity, required),
        }
    }
}

impl From<RxError> for &'static str {
    fn from(error: RxError) -> Self {
        match error {
            RxError::RingEmpty => "receive ring is empty",
            RxError::BufferTooSmall { .. } => "receive buffer is too small",
        }
    }
}


/// Running counters for one queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub packets: u64,
    pub bytes: u64,
    /// Receive only: frames the device flagged with receive errors.
    /// They are still delivered to the caller.
    pub errors: u64,
}


/// A struct that holds all information for one transmit queue.
pub struct TxQueue<S: TxQueueRegisters, D: TxDescriptor + FromBytes + AsBytes + Copy> {
    /// Registers for this transmit queue
    regs: S,
    /// Transmit descriptors
    ring: DescriptorRing<D>,
    /// One transmit buffer per descriptor, at the same index
    buffers: BufferPool,
    /// Packets must be strictly shorter than this
    max_packet_size: usize,
    stats: QueueStats,
}

impl<S: TxQueueRegisters, D: TxDescriptor + FromBytes + AsBytes + Copy> TxQueue<S, D> {
    /// Creates a transmit queue from an already-initialized ring and its buffers.
    ///
    /// # Panics
    /// If the ring and pool sizes differ, or a maximum-sized packet wouldn't fit in a buffer.
    pub fn new(regs: S, ring: DescriptorRing<D>, buffers: BufferPool, max_packet_size: usize) -> TxQueue<S, D> {
        assert_eq!(ring.len() as usize, buffers.len(), "each transmit descriptor needs exactly one buffer");
        assert!(max_packet_size <= buffers.buffer_size(), "transmit buffers are smaller than the maximum packet size");
        TxQueue { regs, ring, buffers, max_packet_size, stats: QueueStats::default() }
    }

    /// Copies `packet` into the next free slot and hands that slot to the device.
    ///
    /// Returns [`TxError::RingFull`] without blocking if the device still owns the slot,
    /// or if arming it would let the tail catch up with the device's head.
    pub fn transmit(&mut self, packet: &[u8]) -> Result<(), TxError> {
        if packet.len() >= self.max_packet_size {
            return Err(TxError::OversizedPacket { length: packet.len(), max: self.max_packet_size });
        }

        let num_descs = self.ring.len();
        let tail = (self.regs.tdt() % num_descs as u32) as u16;
        let next = (tail + 1) % num_descs;
        if !self.ring.read(tail).descriptor_done() || !self.ring.read(next).descriptor_done() {
            return Err(TxError::RingFull);
        }

        self.buffers.copy_in(tail as usize, packet);
        self.ring.update(tail, |desc| desc.send(packet.len() as u16));
        // the descriptor and buffer must be visible to the device before the doorbell
        fence(Ordering::Release);
        self.regs.set_tdt(next as u32);

        self.stats.packets += 1;
        self.stats.bytes += packet.len() as u64;
        Ok(())
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// The registers of this queue.
    pub fn regs(&self) -> &S {
        &self.regs
    }
}


/// A struct that holds all information for one receive queue.
pub struct RxQueue<S: RxQueueRegisters, D: RxDescriptor + FromBytes + AsBytes + Copy> {
    /// Registers for this receive queue
    regs: S,
    /// Receive descriptors
    ring: DescriptorRing<D>,
    /// One receive buffer per descriptor, at the same index
    buffers: BufferPool,
    stats: QueueStats,
}

impl<S: RxQueueRegisters, D: RxDescriptor + FromBytes + AsBytes + Copy> RxQueue<S, D> {
    /// Creates a receive queue from an already-initialized ring and its buffers.
    ///
    /// # Panics
    /// If the ring and pool sizes differ.
    pub fn new(regs: S, ring: DescriptorRing<D>, buffers: BufferPool) -> RxQueue<S, D> {
        assert_eq!(ring.len() as usize, buffers.len(), "each receive descriptor needs exactly one buffer");
        RxQueue { regs, ring, buffers, stats: QueueStats::default() }
    }

    /// The index of the slot the device fills next, one past the tail.
    fn next_index(&self) -> u16 {
        let num_descs = self.ring.len() as u32;
        ((self.regs.rdt() + 1) % num_descs) as u16
    }

    /// Copies the next received packet into `dst` and re-offers its buffer to the device.
    ///
    /// Returns the packet length, or [`RxError::RingEmpty`] without blocking if
    /// the device hasn't deposited a packet yet.
    pub fn receive(&mut self, dst: &mut [u8]) -> Result<usize, RxError> {
        let required = self.max_receive_size();
        if dst.len() < required {
            return Err(RxError::BufferTooSmall { capacity: dst.len(), required });
        }

        let index = self.next_index();
        if !self.ring.read(index).descriptor_done() {
            return Err(RxError::RingEmpty);
        }
        // don't read the rest of the descriptor or the buffer before observing DD
        fence(Ordering::Acquire);
        let desc = self.ring.read(index);

        if desc.errors() != 0 {
            warn!("RxQueue::receive(): descriptor {} reported receive errors {:#X}", index, desc.errors());
            self.stats.errors += 1;
        }
        if !desc.end_of_packet() {
            warn!("RxQueue::receive(): frame in descriptor {} is missing EOP, delivering it truncated", index);
        }

        let length = self.buffers.copy_out(index as usize, desc.length() as usize, dst);
        self.ring.update(index, |desc| desc.reset_status());
        fence(Ordering::Release);
        self.regs.set_rdt(index as u32);

        self.stats.packets += 1;
        self.stats.bytes += length as u64;
        Ok(length)
    }

    /// Returns true if the device has not deposited a new packet.
    /// Never modifies the queue.
    pub fn is_empty(&self) -> bool {
        !self.ring.read(self.next_index()).descriptor_done()
    }

    /// The smallest destination buffer accepted by [`RxQueue::receive()`].
    pub fn max_receive_size(&self) -> usize {
        self.buffers.buffer_size()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// The registers of this queue.
    pub fn regs(&self) -> &S {
        &self.regs
    }
}
