//! Bus access. The driver never talks to the I2C peripheral directly - it goes
//! through [`Transport`], which bounds every transaction with a deadline.

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{self, Error as _, ErrorKind};

/// Longest read phase the bus can do in one go (payload + CRC)
pub const MAX_TRANSFER: usize = 32;

/// Why a single bus transaction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The chip did not acknowledge the address or a data byte
    Nack,
    /// The transaction did not complete before the deadline
    Timeout,
    /// Arbitration loss, bus fault or anything else reported by the peripheral
    Bus,
    /// Read phase longer than [`MAX_TRANSFER`], nothing was put on the bus
    Overflow,
}

impl TransportError {
    fn from_i2c<E: i2c::Error>(e: E) -> Self {
        match e.kind() {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            _ => Self::Bus,
        }
    }
}

/// Write-then-read and write-only cycles against a 7-bit address
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Write phase, repeated start, then fill `read` completely
    async fn write_read(
        &mut self,
        addr: u8,
        write: &[u8],
        read: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), TransportError>;

    /// Write phase followed by a stop condition
    async fn write(&mut self, addr: u8, write: &[u8], timeout_ms: u32)
        -> Result<(), TransportError>;

    /// Waits with the bus idle, used to pace polling of the chip
    async fn delay_ms(&mut self, ms: u32);
}

/// [`Transport`] over any async I2C bus. The deadline is enforced by racing
/// the transfer against the delay provider
pub struct I2cTransport<I, D> {
    i2c: I,
    delay: D,
}

impl<I, D> I2cTransport<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self { i2c, delay }
    }

    /// Gives the bus and the delay back
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I, D> Transport for I2cTransport<I, D>
where
    I: i2c::I2c,
    D: DelayNs,
{
    async fn write_read(
        &mut self,
        addr: u8,
        write: &[u8],
        read: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), TransportError> {
        if read.len() > MAX_TRANSFER {
            return Err(TransportError::Overflow);
        }

        let transfer = self.i2c.write_read(addr, write, read);
        let deadline = self.delay.delay_ms(timeout_ms);

        match select(transfer, deadline).await {
            Either::First(result) => result.map_err(TransportError::from_i2c),
            Either::Second(()) => Err(TransportError::Timeout),
        }
    }

    async fn write(
        &mut self,
        addr: u8,
        write: &[u8],
        timeout_ms: u32,
    ) -> Result<(), TransportError> {
        let transfer = self.i2c.write(addr, write);
        let deadline = self.delay.delay_ms(timeout_ms);

        match select(transfer, deadline).await {
            Either::First(result) => result.map_err(TransportError::from_i2c),
            Either::Second(()) => Err(TransportError::Timeout),
        }
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await
    }
}
