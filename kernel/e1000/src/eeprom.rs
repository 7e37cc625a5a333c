//! Reads the station (MAC) address burned into the e1000's EEPROM.
//!
//! Each read is a request/poll/response exchange over the EERD register,
//! so this is only used during initialization, never from interrupt context.

use bit_field::BitField;
use kernel_config::network::CONFIG_E1000_EEPROM_MAX_POLLS;
use crate::E1000Error;
use crate::regs::*;

/// The EEPROM words that hold the station address, in byte order.
const STATION_ADDRESS_WORDS: [u8; 3] = [0, 1, 2];

/// Reads one 16-bit word from the EEPROM at the given word address.
///
/// Returns [`E1000Error::DeviceNotResponding`] if the device doesn't finish
/// the read within `CONFIG_E1000_EEPROM_MAX_POLLS` polls.
pub fn read_word<A: RegisterAccess>(regs: &RegisterFile<A>, address: u8) -> Result<u16, E1000Error> {
    regs.write(REG_EERD, EERD_START | ((address as u32) << EERD_ADDR_SHIFT));

    for _ in 0..CONFIG_E1000_EEPROM_MAX_POLLS {
        let eerd = regs.read(REG_EERD);
        if eerd.get_bit(EERD_DONE_BIT) {
            return Ok(eerd.get_bits(16..32) as u16);
        }
        core::hint::spin_loop();
    }

    error!("e1000: EEPROM read of word {} never completed", address);
    Err(E1000Error::DeviceNotResponding)
}

/// Reads the 48-bit station address from EEPROM words 0, 1 and 2.
///
/// Each word is little-endian: word `k` supplies address bytes `2k` and `2k + 1`.
pub fn read_station_address<A: RegisterAccess>(regs: &RegisterFile<A>) -> Result<[u8; 6], E1000Error> {
    let mut mac_addr = [0u8; 6];
    for (chunk, &word_address) in mac_addr.chunks_exact_mut(2).zip(STATION_ADDRESS_WORDS.iter()) {
        let word = read_word(regs, word_address)?;
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    debug!("e1000: read hardware MAC address from EEPROM: {:02x?}", mac_addr);
    Ok(mac_addr)
}
