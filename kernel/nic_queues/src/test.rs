extern crate std;

use self::std::vec::Vec;
use super::*;
use intel_ethernet::descriptors::{LegacyRxDescriptor, LegacyTxDescriptor, RX_STATUS_DD, RX_STATUS_EOP, TX_CMD_EOP, TX_CMD_RS, TX_STATUS_DD};
use memory_structs::IdentityTranslation;

const NUM_DESCS: u16 = 8;
const BUFFER_SIZE: usize = 2048;
const MAX_PACKET_SIZE: usize = 1518;

/// Queue registers that only remember what was written to them.
#[derive(Default)]
struct FakeQueueRegs {
    tail: u32,
    tail_writes: Vec<u32>,
}

impl TxQueueRegisters for FakeQueueRegs {
    fn set_tdbal(&mut self, _value: u32) { }
    fn set_tdbah(&mut self, _value: u32) { }
    fn set_tdlen(&mut self, _value: u32) { }
    fn set_tdh(&mut self, _value: u32) { }
    fn set_tdt(&mut self, value: u32) {
        self.tail = value;
        self.tail_writes.push(value);
    }
    fn tdt(&self) -> u32 { self.tail }
}

impl RxQueueRegisters for FakeQueueRegs {
    fn set_rdbal(&mut self, _value: u32) { }
    fn set_rdbah(&mut self, _value: u32) { }
    fn set_rdlen(&mut self, _value: u32) { }
    fn set_rdh(&mut self, _value: u32) { }
    fn set_rdt(&mut self, value: u32) {
        self.tail = value;
        self.tail_writes.push(value);
    }
    fn rdt(&self) -> u32 { self.tail }
}

fn tx_queue() -> TxQueue<FakeQueueRegs, LegacyTxDescriptor> {
    let mut ring = DescriptorRing::<LegacyTxDescriptor>::new(NUM_DESCS, &IdentityTranslation).unwrap();
    let buffers = BufferPool::new(NUM_DESCS as usize, BUFFER_SIZE, &IdentityTranslation).unwrap();
    for i in 0..NUM_DESCS {
        ring.update(i, |d| d.init(buffers.phys_addr(i as usize)));
    }
    TxQueue::new(FakeQueueRegs::default(), ring, buffers, MAX_PACKET_SIZE)
}

fn rx_queue() -> RxQueue<FakeQueueRegs, LegacyRxDescriptor> {
    let mut ring = DescriptorRing::<LegacyRxDescriptor>::new(NUM_DESCS, &IdentityTranslation).unwrap();
    let buffers = BufferPool::new(NUM_DESCS as usize, BUFFER_SIZE, &IdentityTranslation).unwrap();
    for i in 0..NUM_DESCS {
        ring.update(i, |d| d.init(buffers.phys_addr(i as usize)));
    }
    let regs = FakeQueueRegs { tail: NUM_DESCS as u32 - 1, tail_writes: Vec::new() };
    RxQueue::new(regs, ring, buffers)
}

/// Acts like the device depositing `data` into the receive slot at `index`.
fn deliver(queue: &mut RxQueue<FakeQueueRegs, LegacyRxDescriptor>, index: u16, data: &[u8], errors: u8) {
    let paddr = queue.ring.read(index).phys_addr.get() as usize;
    let buf = unsafe { core::slice::from_raw_parts_mut(paddr as *mut u8, BUFFER_SIZE) };
    buf[..data.len()].copy_from_slice(data);
    queue.ring.update(index, |d| {
        d.length.set(data.len() as u16);
        d.errors = errors;
        d.status = RX_STATUS_DD | RX_STATUS_EOP;
    });
}

#[test]
fn transmit_fills_all_but_one_slot() {
    let mut queue = tx_queue();
    for i in 0..(NUM_DESCS - 1) {
        assert_eq!(queue.transmit(&[i as u8; 60]), Ok(()));
    }
    assert_eq!(queue.transmit(&[0xFF; 60]), Err(TxError::RingFull));
    assert_eq!(queue.regs.tail, NUM_DESCS as u32 - 1);
    assert_eq!(queue.stats().packets, NUM_DESCS as u64 - 1);
    assert_eq!(queue.stats().bytes, 60 * (NUM_DESCS as u64 - 1));
}

#[test]
fn transmit_arms_descriptor_and_copies_packet() {
    let mut queue = tx_queue();
    let packet: Vec<u8> = (0..100u8).collect();
    queue.transmit(&packet).unwrap();

    let desc = queue.ring.read(0);
    assert_eq!(desc.length.get(), 100);
    assert_eq!(desc.cmd & (TX_CMD_EOP | TX_CMD_RS), TX_CMD_EOP | TX_CMD_RS);
    assert!(!desc.descriptor_done());
    assert_eq!(queue.regs.tail_writes, [1]);

    let buf = unsafe { core::slice::from_raw_parts(desc.phys_addr.get() as usize as *const u8, 100) };
    assert_eq!(buf, &packet[..]);
}

#[test]
fn completed_slot_is_reused() {
    let mut queue = tx_queue();
    for _ in 0..(NUM_DESCS - 1) {
        queue.transmit(&[0; 64]).unwrap();
    }
    assert_eq!(queue.transmit(&[0; 64]), Err(TxError::RingFull));

    // the device finishes the first packet
    queue.ring.update(0, |d| d.status |= TX_STATUS_DD);
    assert_eq!(queue.transmit(&[0; 64]), Ok(()));
    assert_eq!(queue.regs.tail, 0);
    // slot 1 is still in flight, so the tail may not advance past slot 0
    assert_eq!(queue.transmit(&[0; 64]), Err(TxError::RingFull));
}

#[test]
fn oversized_packet_is_rejected_untouched() {
    let mut queue = tx_queue();
    let packet = [0xAB; MAX_PACKET_SIZE];
    assert_eq!(
        queue.transmit(&packet),
        Err(TxError::OversizedPacket { length: MAX_PACKET_SIZE, max: MAX_PACKET_SIZE })
    );
    assert!(queue.regs.tail_writes.is_empty());
    for i in 0..NUM_DESCS {
        assert!(queue.ring.read(i).descriptor_done());
        assert_eq!(queue.ring.read(i).length.get(), 0);
    }
    let buf = unsafe { core::slice::from_raw_parts(queue.buffers.phys_addr(0).value() as *const u8, 16) };
    assert!(buf.iter().all(|&b| b == 0));
    assert_eq!(queue.stats(), QueueStats::default());
}

#[test]
fn fresh_receive_ring_is_empty() {
    let mut queue = rx_queue();
    let mut dst = [0u8; BUFFER_SIZE];
    assert_eq!(queue.receive(&mut dst), Err(RxError::RingEmpty));
    assert!(queue.is_empty());
    assert!(queue.regs.tail_writes.is_empty());
}

#[test]
fn receive_delivers_deposited_frame() {
    let mut queue = rx_queue();
    let frame: Vec<u8> = (0..77u8).map(|b| b.wrapping_mul(3)).collect();
    deliver(&mut queue, 0, &frame, 0);
    assert!(!queue.is_empty());

    let mut dst = [0u8; BUFFER_SIZE];
    assert_eq!(queue.receive(&mut dst), Ok(frame.len()));
    assert_eq!(&dst[..frame.len()], &frame[..]);
    assert!(!queue.ring.read(0).descriptor_done());
    assert_eq!(queue.regs.tail, 0);
    assert_eq!(queue.stats().packets, 1);
    assert_eq!(queue.stats().bytes, 77);

    assert_eq!(queue.receive(&mut dst), Err(RxError::RingEmpty));
}

#[test]
fn receive_wraps_around_the_ring() {
    let mut queue = rx_queue();
    let mut dst = [0u8; BUFFER_SIZE];
    for round in 0..(2 * NUM_DESCS) {
        let index = round % NUM_DESCS;
        deliver(&mut queue, index, &[round as u8; 42], 0);
        assert_eq!(queue.receive(&mut dst), Ok(42));
        assert_eq!(dst[41], round as u8);
        assert_eq!(queue.regs.tail, index as u32);
    }
}

#[test]
fn receive_rejects_small_destination() {
    let mut queue = rx_queue();
    deliver(&mut queue, 0, &[1; 10], 0);
    let mut dst = [0u8; 1500];
    assert_eq!(
        queue.receive(&mut dst),
        Err(RxError::BufferTooSmall { capacity: 1500, required: BUFFER_SIZE })
    );
    // the frame is still there
    assert!(!queue.is_empty());
    assert!(queue.ring.read(0).descriptor_done());
}

#[test]
fn is_empty_does_not_consume() {
    let mut queue = rx_queue();
    deliver(&mut queue, 0, &[9; 20], 0);
    for _ in 0..5 {
        assert!(!queue.is_empty());
    }
    assert!(queue.regs.tail_writes.is_empty());
    assert_eq!(queue.regs.tail, NUM_DESCS as u32 - 1);
}

#[test]
fn errored_frames_are_delivered_and_counted() {
    let mut queue = rx_queue();
    deliver(&mut queue, 0, &[5; 64], 0x01);
    let mut dst = [0u8; BUFFER_SIZE];
    assert_eq!(queue.receive(&mut dst), Ok(64));
    assert_eq!(queue.stats().errors, 1);
}
