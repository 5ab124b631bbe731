//! These are low-level definitions for BQ77307

use crate::fmt::bitflags;

/// This is a list of direct commands (i.e *registers*) supported by the chip
pub mod commands {
    #![allow(dead_code)]
    pub const SAFETY_ALERT_A: u8 = 0x02;
    pub const SAFETY_FAULT_A: u8 = 0x03;
    pub const SAFETY_ALERT_B: u8 = 0x04;
    pub const SAFETY_FAULT_B: u8 = 0x05;
    pub const BATTERY_STATUS: u8 = 0x12;
    pub const ALARM_STATUS: u8 = 0x62;
    pub const ALARM_RAW_STATUS: u8 = 0x64;
    pub const ALARM_ENABLE: u8 = 0x66;
    pub const FET_CONTROL: u8 = 0x68;
    pub const REGOUT_CONTROL: u8 = 0x69;

    // Subcommand / data memory transfer window
    pub const SUBCOMMAND: u8 = 0x3E;
    pub const TRANSFER_BUFFER: u8 = 0x40;
    pub const TRANSFER_CHECKSUM: u8 = 0x60;
}

/// Subcommands are 16-bit opcodes written (low byte first) to the subcommand register
pub mod subcommands {
    pub const RESET: u16 = 0x0012;
    pub const FET_ENABLE: u16 = 0x0022;
    pub const SEAL: u16 = 0x0030;
    pub const SET_CFGUPDATE: u16 = 0x0090;
    pub const EXIT_CFGUPDATE: u16 = 0x0092;
}

/// Data memory lives behind the subcommand window, starting at 0x9000
pub mod data_memory {
    pub const START: u16 = 0x9000;

    /// Communication configuration. Bit 0 turns on CRC framing on the bus
    pub const CONFIGURATION: u16 = 0x9017;
    pub const CONFIGURATION_CRC_EN: u16 = 1 << 0;
}

/// Anything that may be written to the chip without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// A bare 8-bit opcode
    Direct(u8),
    /// A 16-bit opcode, sent to the subcommand register
    Subcommand(u16),
}

bitflags! {
    /// Safety Alert A: protections that crossed their threshold but did not latch yet
    pub struct SafetyAlertA: u8 {
        const COV = 1 << 7;
        const CUV = 1 << 6;
        const SCD = 1 << 5;
        const OCD1 = 1 << 4;
        const OCD2 = 1 << 3;
        const OCC = 1 << 2;
    }
}

bitflags! {
    /// Safety Fault A: latched protections
    pub struct SafetyFaultA: u8 {
        const COV = 1 << 7;
        const CUV = 1 << 6;
        const SCD = 1 << 5;
        const OCD1 = 1 << 4;
        const OCD2 = 1 << 3;
        const OCC = 1 << 2;
        const CURLATCH = 1 << 1;
        const REGOUT = 1 << 0;
    }
}

bitflags! {
    /// Safety Alert B and Safety Fault B share the same layout
    pub struct SafetyB: u8 {
        const OTD = 1 << 7;
        const OTC = 1 << 6;
        const UTD = 1 << 5;
        const UTC = 1 << 4;
        const OTINT = 1 << 3;
        const VREF = 1 << 1;
        const VSS = 1 << 0;
    }
}

bitflags! {
    /// Flag part of the Battery Status word. The mode and security fields
    /// are decoded separately, see `BatteryStatus`
    pub struct BatteryStatusFlags: u16 {
        const NORMAL = 1 << 15;
        const SAFETY_ALERT = 1 << 13;
        const SAFETY_FAULT = 1 << 12;
        const FET_CTRL = 1 << 8;
        const RAM_RESET = 1 << 7;
        const CONFIG_MODE = 1 << 5;
        const ALERT_PIN = 1 << 4;
        const CHG_DRV = 1 << 3;
        const DSG_DRV = 1 << 2;
        const CHG_DET = 1 << 1;
    }
}

bitflags! {
    /// Layout shared by Alarm Status (latched), Alarm Raw Status and Alarm Enable
    pub struct AlarmFlags: u16 {
        const SSA = 1 << 15;
        const SSB = 1 << 14;
        const SAA = 1 << 13;
        const SAB = 1 << 12;
        const XCHG = 1 << 11;
        const XDSG = 1 << 10;
        const SHUTV = 1 << 9;
        const CHECK1 = 1 << 7;
        const CHECK2 = 1 << 6;
        const INITCOMP = 1 << 2;
        const CDTOGGLE = 1 << 1;
        const POR = 1 << 0;
    }
}

bitflags! {
    /// Host overrides of the protection FETs
    pub struct FetControl: u8 {
        const CHG_OFF = 1 << 3;
        const DSG_OFF = 1 << 2;
        const CHG_ON = 1 << 1;
        const DSG_ON = 1 << 0;
    }
}

pub(crate) const SECURITY_SHIFT: u16 = 10;
pub(crate) const SECURITY_MASK: u16 = 0x03;

pub(crate) const REGOUT_TS_ON: u8 = 1 << 4;
pub(crate) const REGOUT_REG_EN: u8 = 1 << 3;
pub(crate) const REGOUT_VOLTAGE_MASK: u8 = 0x07;

impl From<u8> for SafetyAlertA {
    fn from(value: u8) -> Self {
        SafetyAlertA::from_bits_truncate(value)
    }
}

impl From<u8> for SafetyFaultA {
    fn from(value: u8) -> Self {
        SafetyFaultA::from_bits_truncate(value)
    }
}

impl From<u8> for SafetyB {
    fn from(value: u8) -> Self {
        SafetyB::from_bits_truncate(value)
    }
}

impl From<u16> for BatteryStatusFlags {
    fn from(value: u16) -> Self {
        BatteryStatusFlags::from_bits_truncate(value)
    }
}

impl From<u16> for AlarmFlags {
    fn from(value: u16) -> Self {
        AlarmFlags::from_bits_truncate(value)
    }
}

impl From<u8> for FetControl {
    fn from(value: u8) -> Self {
        FetControl::from_bits_truncate(value)
    }
}
