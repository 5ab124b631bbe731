//! Besides direct registers there is also data memory, reached through the
//! subcommand window: the address goes to the subcommand register and the
//! contents show up in (or are taken from) the transfer buffer.
//! Some settings (e.g bus CRC) are available exclusively through this interface.

use byteorder::{ByteOrder, LittleEndian};

#[allow(unused_imports)]
use crate::fmt::*;
use crate::registers::{commands, data_memory};
use crate::transport::Transport;
use crate::{Bq77307, ChipError, Framing};

/// How many times the address echo is checked before giving up
const TRANSFER_POLL_RETRIES: usize = 10;

/// Bus idle time before each look at the address echo
const TRANSFER_POLL_DELAY_MS: u32 = 2;

/// Address bytes in front of the data, as written to the subcommand register
const ADDRESS_SIZE: usize = 2;

/// Simple checksum used by the chip for data memory writes
fn transfer_checksum(block: &[u8]) -> u8 {
    let mut csum: u8 = 0;

    for b in block.iter() {
        csum = csum.wrapping_add(*b);
    }

    255 - csum
}

impl<T> Bq77307<T>
where
    T: Transport,
{
    /// Reads `buffer.len()` bytes of data memory starting at `address`
    pub async fn read_data_memory(
        &mut self,
        address: u16,
        buffer: &mut [u8],
    ) -> Result<(), ChipError> {
        self.read_data_memory_with(self.framing(), address, buffer)
            .await
    }

    pub(crate) async fn read_data_memory_with(
        &mut self,
        framing: Framing,
        address: u16,
        buffer: &mut [u8],
    ) -> Result<(), ChipError> {
        if address < data_memory::START {
            return Err(ChipError::Argument);
        }

        let mut raw = [0u8; ADDRESS_SIZE];
        LittleEndian::write_u16(&mut raw, address);

        self.write_block_with(framing, commands::SUBCOMMAND, &raw)
            .await?;
        self.wait_transfer_ready(framing, address).await?;

        self.read_buffer_with(framing, commands::TRANSFER_BUFFER, buffer)
            .await
    }

    /// The subcommand register reads back the address once the transfer buffer is filled
    async fn wait_transfer_ready(
        &mut self,
        framing: Framing,
        address: u16,
    ) -> Result<(), ChipError> {
        for _ in 0..TRANSFER_POLL_RETRIES {
            let mut echo = [0u8; ADDRESS_SIZE];

            self.bus.delay_ms(TRANSFER_POLL_DELAY_MS).await;
            self.read_buffer_with(framing, commands::SUBCOMMAND, &mut echo)
                .await?;

            if LittleEndian::read_u16(&echo) == address {
                return Ok(());
            }
        }

        warn!("data memory {:#x} never became ready", address);
        Err(ChipError::PollTimeout)
    }

    /// Writes data memory. The chip only takes it while in CONFIG_UPDATE mode
    pub(crate) async fn write_data_memory_with(
        &mut self,
        framing: Framing,
        address: u16,
        data: &[u8],
    ) -> Result<(), ChipError> {
        const MAX_DATA: usize = crate::MAX_TRANSFER - ADDRESS_SIZE - 1;

        if address < data_memory::START || data.is_empty() || data.len() > MAX_DATA {
            return Err(ChipError::Argument);
        }

        let len = ADDRESS_SIZE + data.len();
        let mut block = [0u8; crate::MAX_TRANSFER];
        LittleEndian::write_u16(&mut block[..ADDRESS_SIZE], address);
        block[ADDRESS_SIZE..len].copy_from_slice(data);

        debug!("writing {} bytes of data memory at {:#x}", data.len(), address);

        self.write_block_with(framing, commands::SUBCOMMAND, &block[..len])
            .await?;

        // The length counts the address, the checksum and itself. Writing it commits the block
        let checksum = transfer_checksum(&block[..len]);
        let length = (len + 2) as u8;

        self.write_block_with(framing, commands::TRANSFER_CHECKSUM, &[checksum, length])
            .await
    }

    /// Read-modify-write of a 16-bit data memory word, all on the given framing
    pub(crate) async fn update_data_memory_u16<F>(
        &mut self,
        framing: Framing,
        address: u16,
        update: F,
    ) -> Result<(), ChipError>
    where
        F: FnOnce(u16) -> u16,
    {
        let mut raw = [0u8; 2];

        self.read_data_memory_with(framing, address, &mut raw)
            .await?;

        let value = update(LittleEndian::read_u16(&raw));
        LittleEndian::write_u16(&mut raw, value);

        self.write_data_memory_with(framing, address, &raw).await
    }
}
