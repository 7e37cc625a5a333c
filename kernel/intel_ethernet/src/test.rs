extern crate std;

use super::*;
use super::descriptors::*;
use memory_structs::{IdentityTranslation, PhysicalAddress};
use zerocopy::AsBytes;

#[test]
fn tx_descriptor_wire_layout() {
    let mut desc = LegacyTxDescriptor::default();
    desc.init(PhysicalAddress::new_canonical(0x0003_3344_5566_7788));
    assert!(desc.descriptor_done());
    desc.send(0x0102);

    assert_eq!(desc.as_bytes(), &[
        0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x03, 0x00, // address
        0x02, 0x01,                                     // length
        0x00,                                           // cso
        TX_CMD_EOP | TX_CMD_IFCS | TX_CMD_RS,           // cmd
        0x00,                                           // status
        0x00,                                           // css
        0x00, 0x00,                                     // special
    ]);
    assert!(!desc.descriptor_done());
}

#[test]
fn rx_descriptor_wire_layout() {
    let mut bytes = [0u8; 16];
    bytes[8] = 60;      // length
    bytes[12] = RX_STATUS_DD | RX_STATUS_EOP;
    bytes[13] = 0x04;   // errors
    let mut desc = zerocopy::LayoutVerified::<_, LegacyRxDescriptor>::new(&mut bytes[..]).unwrap();
    assert_eq!(desc.length(), 60);
    assert!(desc.descriptor_done());
    assert!(desc.end_of_packet());
    assert_eq!(desc.errors(), 0x04);

    desc.reset_status();
    assert!(!desc.descriptor_done());
    drop(desc);
    assert_eq!(bytes[12], 0);
}

#[test]
fn rx_descriptor_init_clears_status() {
    let mut desc = LegacyRxDescriptor::default();
    desc.status = RX_STATUS_DD;
    desc.init(PhysicalAddress::new_canonical(0x8000));
    assert!(!desc.descriptor_done());
    assert_eq!(desc.phys_addr.get(), 0x8000);
}

#[test]
fn ring_reads_back_writes() {
    let mut ring = DescriptorRing::<LegacyTxDescriptor>::new(8, &IdentityTranslation).unwrap();
    assert_eq!(ring.len(), 8);
    assert_eq!(ring.size_in_bytes(), 128);
    assert_eq!(ring.phys_addr().value() % 4096, 0);

    ring.update(3, |d| d.init(PhysicalAddress::new_canonical(0x4000)));
    assert!(ring.read(3).descriptor_done());
    assert!(!ring.read(2).descriptor_done());
    assert_eq!(ring.read(3).phys_addr.get(), 0x4000);

    // the descriptor must sit at byte offset 3 * 16 in the shared memory
    let raw = unsafe { core::slice::from_raw_parts(ring.phys_addr().value() as *const u8, 128) };
    assert_eq!(raw[3 * 16 + 1], 0x40);
    assert_eq!(raw[3 * 16 + 12], TX_STATUS_DD);
}
