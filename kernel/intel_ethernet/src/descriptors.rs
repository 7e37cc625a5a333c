use core::fmt;
use bit_field::BitField;
use memory_structs::PhysicalAddress;
use zerocopy::{AsBytes, FromBytes, Unaligned};
use zerocopy::byteorder::{LittleEndian, U16, U64};


/// Transmit command: this descriptor holds the end of the packet.
pub const TX_CMD_EOP:   u8 = 1 << 0;
/// Transmit command: the hardware appends the ethernet CRC.
pub const TX_CMD_IFCS:  u8 = 1 << 1;
/// Transmit command: the hardware reports status (sets DD) once the descriptor is processed.
pub const TX_CMD_RS:    u8 = 1 << 3;
/// Transmit status: descriptor done.
pub const TX_STATUS_DD: u8 = 1 << 0;

/// Receive status: descriptor done.
pub const RX_STATUS_DD:  u8 = 1 << 0;
/// Receive status: this descriptor holds the end of the packet.
pub const RX_STATUS_EOP: u8 = 1 << 1;


/// A trait for functionalities that all transmit descriptors must support.
pub trait TxDescriptor {
    /// Initializes a transmit descriptor to point at its packet buffer.
    /// The descriptor starts out "done", i.e., owned by software and free for use.
    fn init(&mut self, packet_buffer_address: PhysicalAddress);

    /// Arms the descriptor to send one whole packet of `length` bytes
    /// from the packet buffer it was initialized with.
    fn send(&mut self, length: u16);

    /// Returns true if the hardware has finished with this descriptor.
    fn descriptor_done(&self) -> bool;
}

/// A trait for functionalities that all receive descriptors must support.
pub trait RxDescriptor {
    /// Initializes a receive descriptor by clearing its status
    /// and setting the physical address of its packet buffer.
    fn init(&mut self, packet_buffer_address: PhysicalAddress);

    /// Clears the status bits of the descriptor, handing it back to the hardware.
    fn reset_status(&mut self);

    /// Returns true if the descriptor has a received packet copied to its buffer.
    fn descriptor_done(&self) -> bool;

    /// Returns true if the descriptor's packet buffer is the last in a frame.
    fn end_of_packet(&self) -> bool;

    /// The length of the packet in the descriptor's packet buffer.
    fn length(&self) -> u16;

    /// The receive error bits reported by the hardware; zero if the frame is good.
    fn errors(&self) -> u8;
}


/// This struct is a Legacy Transmit Descriptor.
/// There is one instance of this struct per transmit buffer.
///
/// All fields are little-endian and unaligned, so the in-memory layout is
/// exactly the 16-byte layout the hardware expects.
#[derive(Clone, Copy, Default, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct LegacyTxDescriptor {
    /// The starting physical address of the transmit buffer
    pub phys_addr:  U64<LittleEndian>,
    /// Length of the packet in bytes
    pub length:     U16<LittleEndian>,
    /// Checksum offset, unused
    pub cso:        u8,
    /// Command bits
    pub cmd:        u8,
    /// Status bits
    pub status:     u8,
    /// Checksum start, unused
    pub css:        u8,
    /// VLAN tag, unused
    pub special:    U16<LittleEndian>,
}
const_assert_eq!(core::mem::size_of::<LegacyTxDescriptor>(), 16);
const_assert_eq!(core::mem::align_of::<LegacyTxDescriptor>(), 1);

impl TxDescriptor for LegacyTxDescriptor {
    fn init(&mut self, packet_buffer_address: PhysicalAddress) {
        *self = LegacyTxDescriptor::default();
        self.phys_addr.set(packet_buffer_address.value() as u64);
        self.status = TX_STATUS_DD;
    }

    fn send(&mut self, length: u16) {
        self.length.set(length);
        self.cmd = TX_CMD_EOP | TX_CMD_IFCS | TX_CMD_RS;
        self.status = 0;
    }

    fn descriptor_done(&self) -> bool {
        self.status.get_bit(0)
    }
}

impl fmt::Debug for LegacyTxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{addr: {:#X}, length: {}, cso: {}, cmd: {:#X}, status: {:#X}, css: {}, special: {}}}",
            self.phys_addr.get(), self.length.get(), self.cso, self.cmd, self.status, self.css, self.special.get())
    }
}


/// This struct is a Legacy Receive Descriptor.
/// There is one instance of this struct per receive buffer.
#[derive(Clone, Copy, Default, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct LegacyRxDescriptor {
    /// The starting physical address of the receive buffer
    pub phys_addr:  U64<LittleEndian>,
    /// Length of the received packet, written by the hardware
    pub length:     U16<LittleEndian>,
    pub checksum:   U16<LittleEndian>,
    pub status:     u8,
    pub errors:     u8,
    pub special:    U16<LittleEndian>,
}
const_assert_eq!(core::mem::size_of::<LegacyRxDescriptor>(), 16);
const_assert_eq!(core::mem::align_of::<LegacyRxDescriptor>(), 1);

impl RxDescriptor for LegacyRxDescriptor {
    fn init(&mut self, packet_buffer_address: PhysicalAddress) {
        *self = LegacyRxDescriptor::default();
        self.phys_addr.set(packet_buffer_address.value() as u64);
    }

    fn reset_status(&mut self) {
        self.status = 0;
    }

    fn descriptor_done(&self) -> bool {
        self.status.get_bit(0)
    }

    fn end_of_packet(&self) -> bool {
        self.status.get_bit(1)
    }

    fn length(&self) -> u16 {
        self.length.get()
    }

    fn errors(&self) -> u8 {
        self.errors
    }
}

impl fmt::Debug for LegacyRxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{addr: {:#X}, length: {}, checksum: {}, status: {:#X}, errors: {:#X}, special: {}}}",
            self.phys_addr.get(), self.length.get(), self.checksum.get(), self.status, self.errors, self.special.get())
    }
}
