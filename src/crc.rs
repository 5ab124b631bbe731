//! CRC-8 used by the chip when bus integrity checking is enabled.
//!
//! x^8 + x^2 + x + 1, zero init, no reflection and no final xor - which is
//! exactly the SMBus PEC flavour.

use ::crc::{Crc, Digest, CRC_8_SMBUS};

static SMBUS: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Computes the checksum over an arbitrary byte span
pub fn calculate_crc(data: &[u8]) -> u8 {
    SMBUS.checksum(data)
}

/// The CRC of a bus frame covers the address byte (with the R/W bit in the LSB)
/// which never physically passes through our buffers, so start from it
pub(crate) fn frame_digest(addr: u8, read: bool) -> Digest<'static, u8> {
    let mut digest = SMBUS.digest();
    digest.update(&[(addr << 1) | read as u8]);
    digest
}
