//! Sizing and timing knobs for the e1000 driver.

/// Number of transmit descriptors. Must be a multiple of 8 so that the ring's
/// length in bytes is a multiple of 128, as the hardware requires.
pub const CONFIG_E1000_NUM_TX_DESC: u16 = 64;

/// Number of receive descriptors. Same alignment rule as the transmit ring.
pub const CONFIG_E1000_NUM_RX_DESC: u16 = 128;

/// Size in bytes of every transmit and receive packet buffer.
/// This must agree with the `RCTL.BSIZE` value programmed into the device.
pub const CONFIG_E1000_BUFFER_SIZE_IN_BYTES: u16 = 2048;

/// A transmitted packet must be strictly shorter than this many bytes.
/// This is the largest standard Ethernet frame; jumbo frames are unsupported.
pub const CONFIG_E1000_MAX_TX_PACKET_SIZE: usize = 1518;

/// How many times the EEPROM read register is polled for its done bit
/// before the device is declared unresponsive.
pub const CONFIG_E1000_EEPROM_MAX_POLLS: usize = 100_000;
