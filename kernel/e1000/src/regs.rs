//! Offsets and bit values of the e1000 registers, and typed access to the memory-mapped register block.
//!
//! The raw register window is abstracted by the [`RegisterAccess`] trait so that the rest of the driver
//! doesn't care whether it talks to real MMIO ([`MmioRegisters`]) or to a model of the device.
//! All register accesses go through a [`RegisterFile`], which validates every offset.

use memory_structs::VirtualAddress;
use volatile::Volatile;
use crate::E1000Error;

/// The e1000 register block spans 128 KiB.
pub const E1000_REGISTER_SPACE_SIZE: usize = 0x20000;

pub const REG_CTRL:                 u32 = 0x0000;
pub const REG_STATUS:               u32 = 0x0008;
/// EEPROM Read
pub const REG_EERD:                 u32 = 0x0014;
/// Interrupt Cause Read, cleared by reading it
pub const REG_ICR:                  u32 = 0x00C0;
/// Interrupt Cause Set
pub const REG_ICS:                  u32 = 0x00C8;
/// Interrupt Mask Set
pub const REG_IMS:                  u32 = 0x00D0;
/// Interrupt Mask Clear
pub const REG_IMC:                  u32 = 0x00D8;
pub const REG_RCTL:                 u32 = 0x0100;
pub const REG_TCTL:                 u32 = 0x0400;
/// Transmit Inter Packet Gap
pub const REG_TIPG:                 u32 = 0x0410;

pub const REG_RDBAL:                u32 = 0x2800;
pub const REG_RDBAH:                u32 = 0x2804;
pub const REG_RDLEN:                u32 = 0x2808;
pub const REG_RDH:                  u32 = 0x2810;
pub const REG_RDT:                  u32 = 0x2818;

pub const REG_TDBAL:                u32 = 0x3800;
pub const REG_TDBAH:                u32 = 0x3804;
pub const REG_TDLEN:                u32 = 0x3808;
pub const REG_TDH:                  u32 = 0x3810;
pub const REG_TDT:                  u32 = 0x3818;

/// Multicast Table Array
pub const REG_MTA:                  u32 = 0x5200;
pub const MTA_NUM_ENTRIES:          u32 = 128;
/// Receive Address Low, for receive address 0
pub const REG_RAL0:                 u32 = 0x5400;
/// Receive Address High, for receive address 0
pub const REG_RAH0:                 u32 = 0x5404;
/// Address Valid
pub const RAH_AV:                   u32 = 1 << 31;

// CTRL commands
/// Set Link Up
pub const CTRL_SLU:                 u32 = 1 << 6;
pub const CTRL_LRST:                u32 = 1 << 3;
pub const CTRL_ILOS:                u32 = 1 << 7;
pub const CTRL_VME:                 u32 = 1 << 30;
pub const CTRL_PHY_RST:             u32 = 1 << 31;

/// STATUS: Link Up
pub const STATUS_LU_BIT:            usize = 1;

// EERD fields
pub const EERD_START:               u32 = 1 << 0;
pub const EERD_DONE_BIT:            usize = 4;
pub const EERD_ADDR_SHIFT:          u32 = 8;

// RCTL commands
/// Receiver Enable
pub const RCTL_EN:                  u32 = 1 << 1;
/// No Loopback
pub const RCTL_LBM_NONE:            u32 = 0 << 6;
/// Free Buffer Threshold is 1/2 of RDLEN
pub const RCTL_RDMTS_HALF:          u32 = 0 << 8;
/// Broadcast Accept Mode
pub const RCTL_BAM:                 u32 = 1 << 15;
/// Receive buffers are 2048 bytes
pub const RCTL_BSIZE_2048:          u32 = 0 << 16;
/// Strip Ethernet CRC
pub const RCTL_SECRC:               u32 = 1 << 26;

// TCTL commands
/// Transmit Enable
pub const TCTL_EN:                  u32 = 1 << 1;
/// Pad Short Packets
pub const TCTL_PSP:                 u32 = 1 << 3;
/// Collision Threshold
pub const TCTL_CT_SHIFT:            u32 = 4;
pub const TCTL_CT_MASK:             u32 = 0xFF;
pub const TCTL_CT_FULL_DUPLEX:      u32 = 0x10;
/// Collision Distance
pub const TCTL_COLD_SHIFT:          u32 = 12;
pub const TCTL_COLD_MASK:           u32 = 0x3FF;
pub const TCTL_COLD_FULL_DUPLEX:    u32 = 0x40;

// TIPG values for IEEE 802.3 full duplex
pub const TIPG_IPGT:                u32 = 10;
pub const TIPG_IPGR1:               u32 = 4;
pub const TIPG_IPGR1_SHIFT:         u32 = 10;
pub const TIPG_IPGR2:               u32 = 6;
pub const TIPG_IPGR2_SHIFT:         u32 = 20;
pub const TIPG_FIELD_MASK:          u32 = 0x3FF;

/// Interrupt type: Receive Timer Interrupt
pub const INT_RXT0:                 u32 = 0x80;


/// Raw 32-bit access to a window of device registers.
///
/// Implementations must perform every access exactly once and in program order,
/// i.e., with volatile semantics. Callers guarantee `offset` is 4-byte aligned and
/// below [`RegisterAccess::len()`].
pub trait RegisterAccess: Clone {
    /// The size in bytes of the register window.
    fn len(&self) -> usize;
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

/// A register window that has been memory-mapped into the current address space.
#[derive(Clone, Debug)]
pub struct MmioRegisters {
    base: VirtualAddress,
    len: usize,
}

impl MmioRegisters {
    /// Creates an accessor for the `len` bytes of registers mapped at `base`.
    ///
    /// # Safety
    /// The whole range must be mapped as uncached device memory for as long as
    /// this object or any of its clones exist, and nothing else may access it.
    pub unsafe fn new(base: VirtualAddress, len: usize) -> MmioRegisters {
        MmioRegisters { base, len }
    }

    fn register(&self, offset: usize) -> *mut Volatile<u32> {
        (self.base.value() + offset) as *mut Volatile<u32>
    }
}

impl RegisterAccess for MmioRegisters {
    fn len(&self) -> usize {
        self.len
    }

    fn read32(&self, offset: usize) -> u32 {
        unsafe { (*self.register(offset)).read() }
    }

    fn write32(&self, offset: usize, value: u32) {
        unsafe { (*self.register(offset)).write(value) }
    }
}


/// Typed access to the e1000 register block.
///
/// An offset that is misaligned or outside the window is a bug in the driver,
/// so every accessor panics on one instead of returning an error.
#[derive(Clone)]
pub struct RegisterFile<A: RegisterAccess> {
    access: A,
}

impl<A: RegisterAccess> RegisterFile<A> {
    /// Wraps a register window, which must cover the entire e1000 register block.
    pub fn new(access: A) -> Result<RegisterFile<A>, E1000Error> {
        if access.len() < E1000_REGISTER_SPACE_SIZE {
            error!("e1000: register window of {:#X} bytes is smaller than the {:#X}-byte register block",
                access.len(), E1000_REGISTER_SPACE_SIZE
            );
            return Err(E1000Error::DeviceMappingFailure);
        }
        Ok(RegisterFile { access })
    }

    fn checked_offset(&self, offset: u32) -> usize {
        let offset = offset as usize;
        assert!(offset % 4 == 0, "e1000: misaligned register offset {:#X}", offset);
        assert!(offset < self.access.len(), "e1000: register offset {:#X} is outside the register window", offset);
        offset
    }

    pub fn read(&self, offset: u32) -> u32 {
        self.access.read32(self.checked_offset(offset))
    }

    pub fn write(&self, offset: u32, value: u32) {
        self.access.write32(self.checked_offset(offset), value)
    }

    /// Sets the bits of `mask` in the register, leaving the others unchanged.
    pub fn set_bits(&self, offset: u32, mask: u32) {
        let value = self.read(offset);
        self.write(offset, value | mask);
    }

    /// Clears the bits of `mask` in the register, leaving the others unchanged.
    pub fn clear_bits(&self, offset: u32, mask: u32) {
        let value = self.read(offset);
        self.write(offset, value & !mask);
    }

    /// Replaces the field `mask << shift` of the register with `value`.
    /// Bits of `value` outside of `mask` are ignored.
    pub fn write_field(&self, offset: u32, mask: u32, shift: u32, value: u32) {
        let old = self.read(offset);
        self.write(offset, (old & !(mask << shift)) | ((value & mask) << shift));
    }

    /// The underlying register window.
    pub fn access(&self) -> &A {
        &self.access
    }
}
