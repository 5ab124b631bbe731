//! A simulated chip on a simulated bus, for unit tests.
//!
//! Models the direct register file, the subcommand register, the data memory
//! transfer buffer and CRC framing on the chip side. Every successful
//! transaction is logged so tests can check what went out on the wire.

use std::collections::BTreeMap;
use std::vec::Vec;

use crate::crc::calculate_crc;
use crate::registers::data_memory;
use crate::transport::{Transport, TransportError};

const SUBCOMMAND_LO: usize = 0x3E;
const SUBCOMMAND_HI: usize = 0x3F;
const TRANSFER_BUFFER: usize = 0x40;
const TRANSFER_SIZE: usize = 32;
const TRANSFER_CHECKSUM: usize = 0x60;
const TRANSFER_LENGTH: usize = 0x61;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transaction {
    Write(Vec<u8>),
    WriteRead { write: Vec<u8>, read_len: usize },
    /// Bus left idle for this many milliseconds
    Delay(u32),
}

pub(crate) struct SimBus {
    addr: u8,
    pub regs: [u8; 256],
    pub data_memory: BTreeMap<u16, u8>,
    /// Chip side CRC framing, follows bit 0 of the configuration word
    pub crc_enabled: bool,
    /// Flip a bit of every CRC sent back
    pub corrupt_crc: bool,
    /// Never finish loading the transfer buffer
    pub busy: bool,
    /// Fail the next transaction without touching the chip
    pub fail_next: Option<TransportError>,
    pub log: Vec<Transaction>,
    /// Deadline handed in with every transaction, in order
    pub timeouts: Vec<u32>,
    /// Subcommands executed, in order
    pub subcommands: Vec<u16>,
    /// Correct CRC of the last protected read
    pub last_crc: Option<u8>,
    pub crc_errors: usize,
    pub checksum_errors: usize,
}

impl SimBus {
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            regs: [0; 256],
            data_memory: BTreeMap::new(),
            crc_enabled: false,
            corrupt_crc: false,
            busy: false,
            fail_next: None,
            log: Vec::new(),
            timeouts: Vec::new(),
            subcommands: Vec::new(),
            last_crc: None,
            crc_errors: 0,
            checksum_errors: 0,
        }
    }

    pub fn set_data_memory_u16(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.data_memory.insert(address, lo);
        self.data_memory.insert(address + 1, hi);
    }

    pub fn data_memory_u16(&self, address: u16) -> u16 {
        let lo = self.data_memory.get(&address).copied().unwrap_or(0);
        let hi = self.data_memory.get(&(address + 1)).copied().unwrap_or(0);
        u16::from_le_bytes([lo, hi])
    }

    fn subcommand_address(&self) -> u16 {
        u16::from_le_bytes([self.regs[SUBCOMMAND_LO], self.regs[SUBCOMMAND_HI]])
    }

    fn check_address(&self, addr: u8) -> Result<(), TransportError> {
        if addr == self.addr {
            Ok(())
        } else {
            Err(TransportError::Nack)
        }
    }

    /// Applies data bytes to consecutive registers, then reacts like the chip would
    fn store(&mut self, register: u8, data: &[u8]) {
        let first = register as usize;
        let last = first + data.len() - 1;

        for (i, value) in data.iter().enumerate() {
            self.regs[(first + i) & 0xFF] = *value;
        }

        let touches = |r: usize| first <= r && r <= last;

        if touches(SUBCOMMAND_HI) && !touches(TRANSFER_BUFFER) {
            self.run_subcommand();
        }

        if touches(TRANSFER_LENGTH) {
            self.commit_transfer();
        }
    }

    fn run_subcommand(&mut self) {
        let address = self.subcommand_address();

        if address < data_memory::START {
            self.subcommands.push(address);
            return;
        }

        if self.busy {
            self.regs[SUBCOMMAND_LO] = 0xFF;
            self.regs[SUBCOMMAND_HI] = 0xFF;
            return;
        }

        for i in 0..TRANSFER_SIZE {
            let byte = self
                .data_memory
                .get(&(address + i as u16))
                .copied()
                .unwrap_or(0);
            self.regs[TRANSFER_BUFFER + i] = byte;
        }
    }

    fn commit_transfer(&mut self) {
        let address = self.subcommand_address();
        let length = self.regs[TRANSFER_LENGTH] as usize;

        if length < 5 || length - 4 > TRANSFER_SIZE {
            self.checksum_errors += 1;
            return;
        }

        let data_len = length - 4;
        let covered = &self.regs[SUBCOMMAND_LO..TRANSFER_BUFFER + data_len];
        let sum = covered.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));

        if 255 - sum != self.regs[TRANSFER_CHECKSUM] {
            self.checksum_errors += 1;
            return;
        }

        for i in 0..data_len {
            let value = self.regs[TRANSFER_BUFFER + i];
            self.data_memory.insert(address + i as u16, value);
        }

        let config = self.data_memory_u16(data_memory::CONFIGURATION);
        self.crc_enabled = config & data_memory::CONFIGURATION_CRC_EN != 0;
    }
}

impl Transport for SimBus {
    async fn write_read(
        &mut self,
        addr: u8,
        write: &[u8],
        read: &mut [u8],
        timeout_ms: u32,
    ) -> Result<(), TransportError> {
        self.timeouts.push(timeout_ms);

        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }

        self.check_address(addr)?;

        let register = write[0] as usize;
        let data_len = if self.crc_enabled {
            read.len() - 1
        } else {
            read.len()
        };

        for i in 0..data_len {
            read[i] = self.regs[(register + i) & 0xFF];
        }

        if self.crc_enabled {
            let mut frame = Vec::with_capacity(data_len + 1);
            frame.push((self.addr << 1) | 1);
            frame.extend_from_slice(&read[..data_len]);

            let crc = calculate_crc(&frame);
            self.last_crc = Some(crc);
            read[data_len] = if self.corrupt_crc { crc ^ 0x01 } else { crc };
        }

        self.log.push(Transaction::WriteRead {
            write: write.to_vec(),
            read_len: read.len(),
        });

        Ok(())
    }

    async fn write(&mut self, addr: u8, write: &[u8], timeout_ms: u32) -> Result<(), TransportError> {
        self.timeouts.push(timeout_ms);

        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }

        self.check_address(addr)?;
        self.log.push(Transaction::Write(write.to_vec()));

        let register = write[0];
        let data = &write[1..];

        if data.is_empty() {
            return Ok(());
        }

        if self.crc_enabled {
            let mut frame = Vec::with_capacity(3);
            frame.push(self.addr << 1);
            frame.push(register);
            frame.extend_from_slice(&data[..data.len().min(1)]);

            if data.len() != 2 || calculate_crc(&frame) != data[1] {
                self.crc_errors += 1;
                return Ok(());
            }

            self.store(register, &data[..1]);
        } else {
            self.store(register, data);
        }

        Ok(())
    }
    async fn delay_ms(&mut self, ms: u32) {
        self.log.push(Transaction::Delay(ms));
    }
}
