extern crate std;

use self::std::vec::Vec;
use super::*;
use intel_ethernet::descriptors::{LegacyRxDescriptor, LegacyTxDescriptor};
use memory_structs::{IdentityTranslation, PhysicalAddress, VirtualAddress};

/// Queue registers that record every write in order.
#[derive(Default)]
struct RecordingRegs {
    writes: Vec<(&'static str, u32)>,
}

impl RecordingRegs {
    fn last(&self, name: &str) -> Option<u32> {
        self.writes.iter().rev().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    fn names(&self) -> Vec<&'static str> {
        self.writes.iter().map(|(n, _)| *n).collect()
    }
}

impl TxQueueRegisters for RecordingRegs {
    fn set_tdbal(&mut self, value: u32) { self.writes.push(("tdbal", value)); }
    fn set_tdbah(&mut self, value: u32) { self.writes.push(("tdbah", value)); }
    fn set_tdlen(&mut self, value: u32) { self.writes.push(("tdlen", value)); }
    fn set_tdh(&mut self, value: u32) { self.writes.push(("tdh", value)); }
    fn set_tdt(&mut self, value: u32) { self.writes.push(("tdt", value)); }
    fn tdt(&self) -> u32 { self.last("tdt").unwrap_or(0) }
}

impl RxQueueRegisters for RecordingRegs {
    fn set_rdbal(&mut self, value: u32) { self.writes.push(("rdbal", value)); }
    fn set_rdbah(&mut self, value: u32) { self.writes.push(("rdbah", value)); }
    fn set_rdlen(&mut self, value: u32) { self.writes.push(("rdlen", value)); }
    fn set_rdh(&mut self, value: u32) { self.writes.push(("rdh", value)); }
    fn set_rdt(&mut self, value: u32) { self.writes.push(("rdt", value)); }
    fn rdt(&self) -> u32 { self.last("rdt").unwrap_or(0) }
}

struct NoTranslation;

impl TranslateAddress for NoTranslation {
    fn translate(&self, _vaddr: VirtualAddress, _size_in_bytes: usize) -> Option<PhysicalAddress> {
        None
    }
}

#[test]
fn tx_queue_registers_are_programmed() {
    let queue = init_tx_queue::<LegacyTxDescriptor, _, _>(16, 2048, 1518, &IdentityTranslation, RecordingRegs::default()).unwrap();
    let regs = queue.regs();
    assert_eq!(regs.names(), ["tdbal", "tdbah", "tdlen", "tdh", "tdt"]);
    assert_eq!(regs.last("tdlen"), Some(16 * 16));
    assert_eq!(regs.last("tdh"), Some(0));
    assert_eq!(regs.last("tdt"), Some(0));

    let base = (regs.last("tdbah").unwrap() as u64) << 32 | regs.last("tdbal").unwrap() as u64;
    assert_eq!(base % 4096, 0);
    assert_ne!(base, 0);
}

#[test]
fn tx_queue_starts_with_every_slot_free() {
    let mut queue = init_tx_queue::<LegacyTxDescriptor, _, _>(8, 2048, 1518, &IdentityTranslation, RecordingRegs::default()).unwrap();
    for _ in 0..7 {
        assert_eq!(queue.transmit(&[0x55; 60]), Ok(()));
    }
    assert_eq!(queue.transmit(&[0x55; 60]), Err(nic_queues::TxError::RingFull));
}

#[test]
fn rx_queue_offers_every_buffer() {
    let queue = init_rx_queue::<LegacyRxDescriptor, _, _>(32, 2048, &IdentityTranslation, RecordingRegs::default()).unwrap();
    let regs = queue.regs();
    assert_eq!(regs.names(), ["rdbal", "rdbah", "rdlen", "rdh", "rdt"]);
    assert_eq!(regs.last("rdlen"), Some(32 * 16));
    assert_eq!(regs.last("rdh"), Some(0));
    assert_eq!(regs.last("rdt"), Some(31));
    assert!(queue.is_empty());
    assert_eq!(queue.max_receive_size(), 2048);
}

#[test]
fn rx_descriptors_point_at_their_buffers() {
    let queue = init_rx_queue::<LegacyRxDescriptor, _, _>(8, 2048, &IdentityTranslation, RecordingRegs::default()).unwrap();
    let regs = queue.regs();
    let base = (regs.last("rdbah").unwrap() as usize) << 32 | regs.last("rdbal").unwrap() as usize;
    let descs = unsafe { core::slice::from_raw_parts(base as *const LegacyRxDescriptor, 8) };
    let mut addrs: Vec<u64> = descs.iter().map(|d| d.phys_addr.get()).collect();
    assert!(addrs.iter().all(|&a| a != 0 && a % 2048 == 0));
    assert!(descs.iter().all(|d| d.status == 0));
    addrs.sort_unstable();
    addrs.dedup();
    assert_eq!(addrs.len(), 8);
}

#[test]
fn invalid_ring_sizes_are_rejected() {
    for n in [0u16, 4, 12] {
        let result = init_tx_queue::<LegacyTxDescriptor, _, _>(n, 2048, 1518, &IdentityTranslation, RecordingRegs::default());
        assert_eq!(result.err(), Some(NicInitError::InvalidRingSize(n)));
    }
    let result = init_rx_queue::<LegacyRxDescriptor, _, _>(10, 2048, &IdentityTranslation, RecordingRegs::default());
    assert_eq!(result.err(), Some(NicInitError::InvalidRingSize(10)));
}

#[test]
fn translation_failure_aborts_setup() {
    let result = init_rx_queue::<LegacyRxDescriptor, _, _>(8, 2048, &NoTranslation, RecordingRegs::default());
    assert!(matches!(result.err(), Some(NicInitError::Dma(DmaError::TranslationFailed(_)))));
}
