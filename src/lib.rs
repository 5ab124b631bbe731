#![cfg_attr(not(test), no_std)]

//! A small driver for the Texas Instruments BQ77307 battery monitor and protector
//!
//! The chip can optionally protect every bus transaction with a CRC-8. Whether
//! that is on is tracked by the handle and every read and write is framed
//! accordingly, so the status readers and commands never have to care.

pub(crate) mod fmt;

pub mod crc;
pub mod registers;
pub mod status;
pub mod transport;

pub(crate) mod memory;

#[cfg(test)]
pub(crate) mod sim;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use embedded_hal_async::{delay, i2c};
#[allow(unused_imports)]
use fmt::*;

pub use registers::{
    AlarmFlags, BatteryStatusFlags, Command, FetControl, SafetyAlertA, SafetyB, SafetyFaultA,
};
pub use status::{
    BatteryStatus, DeviceMode, RegoutControl, RegoutVoltage, SafetySummary, SecurityLevel,
};
pub use transport::{I2cTransport, Transport, TransportError, MAX_TRANSFER};

use registers::{commands, subcommands};

/// Factory default 7-bit address
pub const DEFAULT_ADDRESS: u8 = 0x08;

/// Default per-transaction deadline
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Highest 7-bit bus address
const MAX_ADDRESS: u8 = 0x7F;

/// Widest register that can be read as a single integer
const MAX_SCALAR_WIDTH: usize = 4;

/// Chip error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipError {
    /// Width or length out of range for the requested access
    Argument,
    /// The bus transaction itself failed, see [`TransportError`]
    Transport(TransportError),
    /// CRC of a protected read did not match the data
    Integrity,
    /// The chip did not finish a data memory transfer in time
    PollTimeout,
}

impl From<TransportError> for ChipError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Driver settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit bus address
    pub address: u8,
    /// Deadline for every single bus transaction
    pub timeout_ms: u32,
}

impl Config {
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub const fn with_timeout_ms(self, timeout_ms: u32) -> Self {
        Self { timeout_ms, ..self }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

/// How a transaction is put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Framing {
    Plain,
    /// Every transaction carries a trailing CRC-8
    Protected,
}

/// Chip handle
pub struct Bq77307<T> {
    bus: T,
    addr: u8,
    timeout_ms: u32,
    integrity: bool,
}

impl<I, D> Bq77307<I2cTransport<I, D>>
where
    I: i2c::I2c,
    D: delay::DelayNs,
{
    /// Creates the driver instance on top of an I2C bus. The delay provider
    /// paces polling and enforces transaction deadlines
    pub fn new(i2c: I, delay: D, config: Config) -> Result<Self, ChipError> {
        Self::with_transport(I2cTransport::new(i2c, delay), config)
    }
}

impl<T> Bq77307<T>
where
    T: Transport,
{
    /// Creates the driver instance on top of any transport. The chip is
    /// assumed to have CRC framing disabled, which is the reset default.
    /// Addresses that do not fit in 7 bits are refused
    pub fn with_transport(bus: T, config: Config) -> Result<Self, ChipError> {
        if config.address > MAX_ADDRESS {
            return Err(ChipError::Argument);
        }

        Ok(Self {
            bus,
            addr: config.address,
            timeout_ms: config.timeout_ms,
            integrity: false,
        })
    }

    /// Destroys the driver, returning the transport
    pub fn free(self) -> T {
        self.bus
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    /// Whether transactions are currently CRC protected
    pub fn integrity_enabled(&self) -> bool {
        self.integrity
    }

    pub(crate) fn framing(&self) -> Framing {
        if self.integrity {
            Framing::Protected
        } else {
            Framing::Plain
        }
    }

    /// Reads a register of `width` bytes (1 to 4). The first byte on the
    /// wire is the most significant one
    pub async fn read_scalar(&mut self, command: u8, width: usize) -> Result<u32, ChipError> {
        if width == 0 || width > MAX_SCALAR_WIDTH {
            return Err(ChipError::Argument);
        }

        let mut raw = [0u8; MAX_SCALAR_WIDTH];
        self.read_buffer(command, &mut raw[..width]).await?;

        Ok(BigEndian::read_uint(&raw[..width], width) as u32)
    }

    /// Reads `buffer.len()` consecutive bytes starting at `command`
    pub async fn read_buffer(&mut self, command: u8, buffer: &mut [u8]) -> Result<(), ChipError> {
        self.read_buffer_with(self.framing(), command, buffer).await
    }

    pub(crate) async fn read_buffer_with(
        &mut self,
        framing: Framing,
        command: u8,
        buffer: &mut [u8],
    ) -> Result<(), ChipError> {
        let len = buffer.len();

        match framing {
            Framing::Plain => {
                if len == 0 || len > MAX_TRANSFER {
                    return Err(ChipError::Argument);
                }

                debug!("read {:#x}, {} bytes", command, len);

                self.bus
                    .write_read(self.addr, &[command], buffer, self.timeout_ms)
                    .await?;
            }

            Framing::Protected => {
                // The CRC takes one byte of the transfer
                if len == 0 || len >= MAX_TRANSFER {
                    return Err(ChipError::Argument);
                }

                debug!("read {:#x}, {} bytes + crc", command, len);

                let mut frame = [0u8; MAX_TRANSFER];
                self.bus
                    .write_read(self.addr, &[command], &mut frame[..len + 1], self.timeout_ms)
                    .await?;

                let mut digest = crate::crc::frame_digest(self.addr, true);
                digest.update(&frame[..len]);
                let expected = digest.finalize();
                let received = frame[len];

                if received != expected {
                    warn!(
                        "crc mismatch reading {:#x}: got {:#x}, expected {:#x}",
                        command, received, expected
                    );
                    return Err(ChipError::Integrity);
                }

                buffer.copy_from_slice(&frame[..len]);
            }
        }

        Ok(())
    }

    /// Writes a single byte register
    pub async fn write_register(&mut self, command: u8, value: u8) -> Result<(), ChipError> {
        self.write_block(command, &[value]).await
    }

    /// Writes a word register, most significant byte first
    pub(crate) async fn write_word(&mut self, command: u8, value: u16) -> Result<(), ChipError> {
        let mut raw = [0u8; 2];
        BigEndian::write_u16(&mut raw, value);
        self.write_block(command, &raw).await
    }

    pub(crate) async fn write_block(&mut self, command: u8, data: &[u8]) -> Result<(), ChipError> {
        self.write_block_with(self.framing(), command, data).await
    }

    /// Writes consecutive registers starting at `command`. A plain write goes out
    /// as a single transaction, the chip auto-increments the register address.
    /// With CRC framing each byte is its own transaction with its own checksum
    pub(crate) async fn write_block_with(
        &mut self,
        framing: Framing,
        command: u8,
        data: &[u8],
    ) -> Result<(), ChipError> {
        if data.is_empty() || data.len() >= MAX_TRANSFER {
            return Err(ChipError::Argument);
        }

        match framing {
            Framing::Plain => {
                debug!("write {:#x}, {} bytes", command, data.len());

                let mut frame = [0u8; MAX_TRANSFER];
                frame[0] = command;
                frame[1..=data.len()].copy_from_slice(data);

                self.bus
                    .write(self.addr, &frame[..=data.len()], self.timeout_ms)
                    .await?;
            }

            Framing::Protected => {
                for (offset, value) in data.iter().enumerate() {
                    let register = command.wrapping_add(offset as u8);

                    debug!("write {:#x} + crc", register);

                    let mut digest = crate::crc::frame_digest(self.addr, false);
                    digest.update(&[register, *value]);
                    let frame = [register, *value, digest.finalize()];

                    self.bus.write(self.addr, &frame, self.timeout_ms).await?;
                }
            }
        }

        Ok(())
    }

    /// Fire-and-forget command, nothing is read back
    pub async fn send_command(&mut self, command: Command) -> Result<(), ChipError> {
        match command {
            Command::Direct(opcode) => {
                debug!("command {:#x}", opcode);
                self.bus.write(self.addr, &[opcode], self.timeout_ms).await?;
                Ok(())
            }

            Command::Subcommand(opcode) => {
                debug!("subcommand {:#x}", opcode);
                let mut raw = [0u8; 2];
                LittleEndian::write_u16(&mut raw, opcode);
                self.write_block(commands::SUBCOMMAND, &raw).await
            }
        }
    }

    /// Resets the chip. RAM configuration is lost
    pub async fn reset(&mut self) -> Result<(), ChipError> {
        info!("performing reset...");
        self.send_command(Command::Subcommand(subcommands::RESET))
            .await
    }

    /// Hands FET control over to the host (or back to the protection logic).
    /// The current owner is reported by [`BatteryStatus::manual_fet_control`]
    pub async fn toggle_fet_control(&mut self) -> Result<(), ChipError> {
        info!("toggling fet control...");
        self.send_command(Command::Subcommand(subcommands::FET_ENABLE))
            .await
    }

    /// Moves the chip to SEALED mode. There is no way back without the unseal key
    pub async fn seal(&mut self) -> Result<(), ChipError> {
        info!("sealing...");
        self.send_command(Command::Subcommand(subcommands::SEAL))
            .await
    }

    /// Moves the chip to CONFIG_UPDATE mode. The chip needs some time before
    /// it answers again, the caller is responsible for waiting
    pub async fn enter_config_update(&mut self) -> Result<(), ChipError> {
        info!("entering cfgupdate mode...");
        self.send_command(Command::Subcommand(subcommands::SET_CFGUPDATE))
            .await
    }

    pub async fn exit_config_update(&mut self) -> Result<(), ChipError> {
        info!("exiting cfgupdate mode...");
        self.send_command(Command::Subcommand(subcommands::EXIT_CFGUPDATE))
            .await
    }

    /// Turns on CRC framing for all further transactions
    pub async fn enable_integrity(&mut self) -> Result<(), ChipError> {
        self.set_integrity(true).await
    }

    /// Turns off CRC framing for all further transactions
    pub async fn disable_integrity(&mut self) -> Result<(), ChipError> {
        self.set_integrity(false).await
    }

    /// The switch itself has to be framed the way the chip currently expects,
    /// and only once the chip took it do we start framing the other way
    async fn set_integrity(&mut self, enable: bool) -> Result<(), ChipError> {
        if self.integrity == enable {
            return Ok(());
        }

        info!("switching bus crc: {}", enable);

        let framing = self.framing();
        self.update_data_memory_u16(framing, registers::data_memory::CONFIGURATION, |value| {
            if enable {
                value | registers::data_memory::CONFIGURATION_CRC_EN
            } else {
                value & !registers::data_memory::CONFIGURATION_CRC_EN
            }
        })
        .await?;

        self.integrity = enable;
        Ok(())
    }
}
