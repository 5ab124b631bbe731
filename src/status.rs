//! Decoded status and control registers.
//!
//! Every record can be built from its raw value with `From`, which never fails:
//! reserved bits are dropped and unassigned codes map to a fallback.
//! The `read_*` methods fetch the register first; an `Err` there is the
//! "read failed" outcome, whether the bus failed or the CRC did not match.

use crate::registers::*;
use crate::transport::Transport;
use crate::{Bq77307, ChipError};

/// Operating mode, derived from the NORMAL and CONFIG_MODE bits of Battery Status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceMode {
    Normal,
    Configure,
    Shutdown,
    Unknown,
}

/// Security state, bits [11:10] of Battery Status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityLevel {
    Uninitialized,
    FullAccess,
    Error,
    Sealed,
}

impl From<u16> for SecurityLevel {
    fn from(code: u16) -> Self {
        match code & SECURITY_MASK {
            0 => Self::Uninitialized,
            1 => Self::FullAccess,
            2 => Self::Error,
            _ => Self::Sealed,
        }
    }
}

/// Battery Status (0x12)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryStatus {
    pub mode: DeviceMode,
    pub security: SecurityLevel,
    pub flags: BatteryStatusFlags,
}

impl BatteryStatus {
    /// FETs are driven by the host rather than by the protection logic
    pub fn manual_fet_control(&self) -> bool {
        self.flags.contains(BatteryStatusFlags::FET_CTRL)
    }

    /// RAM settings were lost to a reset and have to be programmed again
    pub fn needs_configuration(&self) -> bool {
        self.flags.contains(BatteryStatusFlags::RAM_RESET)
    }
}

impl From<u16> for BatteryStatus {
    fn from(raw: u16) -> Self {
        let flags = BatteryStatusFlags::from(raw);

        let mode = match (
            flags.contains(BatteryStatusFlags::NORMAL),
            flags.contains(BatteryStatusFlags::CONFIG_MODE),
        ) {
            (true, false) => DeviceMode::Normal,
            (true, true) => DeviceMode::Configure,
            (false, _) => DeviceMode::Shutdown,
        };

        Self {
            mode,
            security: SecurityLevel::from(raw >> SECURITY_SHIFT),
            flags,
        }
    }
}

/// REGOUT LDO output setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegoutVoltage {
    V1_8,
    V2_5,
    V3_0,
    V3_3,
    V5_0,
}

impl RegoutVoltage {
    pub fn millivolts(&self) -> u16 {
        match self {
            Self::V1_8 => 1800,
            Self::V2_5 => 2500,
            Self::V3_0 => 3000,
            Self::V3_3 => 3300,
            Self::V5_0 => 5000,
        }
    }

    /// Selector code written back to the chip. 1.8V has four aliases, 0 is canonical
    pub(crate) fn code(&self) -> u8 {
        match self {
            Self::V1_8 => 0,
            Self::V2_5 => 4,
            Self::V3_0 => 5,
            Self::V3_3 => 6,
            Self::V5_0 => 7,
        }
    }
}

impl From<u8> for RegoutVoltage {
    fn from(code: u8) -> Self {
        match code & REGOUT_VOLTAGE_MASK {
            4 => Self::V2_5,
            5 => Self::V3_0,
            6 => Self::V3_3,
            7 => Self::V5_0,
            _ => Self::V1_8,
        }
    }
}

/// REGOUT Control (0x69)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegoutControl {
    /// TS pin biased for thermistor measurement
    pub ts_on: bool,
    /// REGOUT LDO enabled
    pub reg_en: bool,
    pub voltage: RegoutVoltage,
}

impl From<u8> for RegoutControl {
    fn from(raw: u8) -> Self {
        Self {
            ts_on: raw & REGOUT_TS_ON != 0,
            reg_en: raw & REGOUT_REG_EN != 0,
            voltage: RegoutVoltage::from(raw),
        }
    }
}

impl From<RegoutControl> for u8 {
    fn from(control: RegoutControl) -> Self {
        let mut raw = control.voltage.code();

        if control.ts_on {
            raw |= REGOUT_TS_ON;
        }

        if control.reg_en {
            raw |= REGOUT_REG_EN;
        }

        raw
    }
}

/// Snapshot of all four safety registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetySummary {
    pub alert_a: SafetyAlertA,
    pub fault_a: SafetyFaultA,
    pub alert_b: SafetyB,
    pub fault_b: SafetyB,
}

impl SafetySummary {
    /// Nothing is tripped, neither alerts nor faults
    pub fn is_clear(&self) -> bool {
        self.alert_a.is_empty()
            && self.fault_a.is_empty()
            && self.alert_b.is_empty()
            && self.fault_b.is_empty()
    }
}

impl<T> Bq77307<T>
where
    T: Transport,
{
    async fn read_u8(&mut self, command: u8) -> Result<u8, ChipError> {
        Ok(self.read_scalar(command, 1).await? as u8)
    }

    async fn read_u16(&mut self, command: u8) -> Result<u16, ChipError> {
        Ok(self.read_scalar(command, 2).await? as u16)
    }

    pub async fn read_safety_alert_a(&mut self) -> Result<SafetyAlertA, ChipError> {
        let raw = self.read_u8(commands::SAFETY_ALERT_A).await?;
        Ok(SafetyAlertA::from(raw))
    }

    pub async fn read_safety_fault_a(&mut self) -> Result<SafetyFaultA, ChipError> {
        let raw = self.read_u8(commands::SAFETY_FAULT_A).await?;
        Ok(SafetyFaultA::from(raw))
    }

    pub async fn read_safety_alert_b(&mut self) -> Result<SafetyB, ChipError> {
        let raw = self.read_u8(commands::SAFETY_ALERT_B).await?;
        Ok(SafetyB::from(raw))
    }

    pub async fn read_safety_fault_b(&mut self) -> Result<SafetyB, ChipError> {
        let raw = self.read_u8(commands::SAFETY_FAULT_B).await?;
        Ok(SafetyB::from(raw))
    }

    /// Reads all safety registers, alerts first
    pub async fn read_safety_summary(&mut self) -> Result<SafetySummary, ChipError> {
        Ok(SafetySummary {
            alert_a: self.read_safety_alert_a().await?,
            fault_a: self.read_safety_fault_a().await?,
            alert_b: self.read_safety_alert_b().await?,
            fault_b: self.read_safety_fault_b().await?,
        })
    }

    pub async fn read_battery_status(&mut self) -> Result<BatteryStatus, ChipError> {
        let raw = self.read_u16(commands::BATTERY_STATUS).await?;
        Ok(BatteryStatus::from(raw))
    }

    /// Latched alarms. Bits stay set until cleared with [`Self::clear_alarm_status`]
    pub async fn read_alarm_status(&mut self) -> Result<AlarmFlags, ChipError> {
        let raw = self.read_u16(commands::ALARM_STATUS).await?;
        Ok(AlarmFlags::from(raw))
    }

    /// Live, unlatched alarm state
    pub async fn read_alarm_raw_status(&mut self) -> Result<AlarmFlags, ChipError> {
        let raw = self.read_u16(commands::ALARM_RAW_STATUS).await?;
        Ok(AlarmFlags::from(raw))
    }

    /// Alarms allowed to latch into Alarm Status and pull the ALERT pin
    pub async fn read_alarm_enable(&mut self) -> Result<AlarmFlags, ChipError> {
        let raw = self.read_u16(commands::ALARM_ENABLE).await?;
        Ok(AlarmFlags::from(raw))
    }

    pub async fn read_fet_control(&mut self) -> Result<FetControl, ChipError> {
        let raw = self.read_u8(commands::FET_CONTROL).await?;
        Ok(FetControl::from(raw))
    }

    pub async fn read_regout_control(&mut self) -> Result<RegoutControl, ChipError> {
        let raw = self.read_u8(commands::REGOUT_CONTROL).await?;
        Ok(RegoutControl::from(raw))
    }

    /// Write-1-to-clear on the latched alarms
    pub async fn clear_alarm_status(&mut self, alarms: AlarmFlags) -> Result<(), ChipError> {
        self.write_word(commands::ALARM_STATUS, alarms.bits()).await
    }

    pub async fn set_alarm_enable(&mut self, alarms: AlarmFlags) -> Result<(), ChipError> {
        self.write_word(commands::ALARM_ENABLE, alarms.bits()).await
    }

    /// Only has an effect once the host owns the FETs, see [`Self::toggle_fet_control`]
    pub async fn set_fet_control(&mut self, control: FetControl) -> Result<(), ChipError> {
        self.write_register(commands::FET_CONTROL, control.bits())
            .await
    }

    pub async fn set_regout_control(&mut self, control: RegoutControl) -> Result<(), ChipError> {
        self.write_register(commands::REGOUT_CONTROL, control.into())
            .await
    }
}
