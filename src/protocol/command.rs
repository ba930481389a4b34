//! Requests understood by the RGM-3800.
//!
//! Every request is a `PROYnnn` line, optionally followed by comma separated
//! integers. The device answers with `LOGnnn` lines.

use bytes::Bytes;

use crate::types::{MemoryFullPolicy, WaypointFormat};

/// A request sent to the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Current GPS time (`PROY003`).
    GetTime,
    /// Firmware banner (`PROY005`), five `PSRFTXT` lines.
    FirmwareVersion,
    /// Time span of the stored waypoints (`PROY006`).
    MemoryTimeframe,
    /// Memory geometry (`PROY100`).
    MemoryInfo,
    /// Metadata of one track (`PROY101`).
    TrackInfo { index: u32 },
    /// Read raw waypoint records (`PROY102`).
    ReadWaypoints {
        address: u32,
        format: WaypointFormat,
        count: u32,
    },
    /// Switch live NMEA output on or off (`PROY103`).
    SetGpsMouse { enabled: bool },
    /// Write the logging configuration (`PROY104`).
    SetConfig {
        interval: u32,
        format: WaypointFormat,
        memory_full: MemoryFullPolicy,
    },
    /// Logger configuration and usage (`PROY108`).
    DeviceInfo,
    /// Erase all tracks (`PROY109`).
    Erase,
}

impl Command {
    /// Returns the line payload, without framing.
    #[must_use]
    pub fn payload(&self) -> Bytes {
        let text = match *self {
            Self::GetTime => "PROY003".to_string(),
            Self::FirmwareVersion => "PROY005".to_string(),
            Self::MemoryTimeframe => "PROY006".to_string(),
            Self::MemoryInfo => "PROY100".to_string(),
            Self::TrackInfo { index } => format!("PROY101,{index}"),
            Self::ReadWaypoints {
                address,
                format,
                count,
            } => format!("PROY102,{address},{},{count}", format.code()),
            Self::SetGpsMouse { enabled } => format!("PROY103,0,{}", u8::from(enabled)),
            Self::SetConfig {
                interval,
                format,
                memory_full,
            } => format!(
                "PROY104,0,{interval},{},{}",
                format.code(),
                memory_full.code()
            ),
            Self::DeviceInfo => "PROY108".to_string(),
            Self::Erase => "PROY109,-1".to_string(),
        };
        Bytes::from(text)
    }

    /// Prefix of the reply lines to keep, `None` keeps every line.
    ///
    /// `GetTime` matches `LOG00` since the device answers `LOG002` instead
    /// of `LOG003` while it has no time fix.
    #[must_use]
    pub const fn reply_prefix(&self) -> Option<&'static [u8]> {
        match self {
            Self::GetTime => Some(b"LOG00"),
            Self::FirmwareVersion => None,
            Self::MemoryTimeframe => Some(b"LOG006,"),
            Self::MemoryInfo => Some(b"LOG100,"),
            Self::TrackInfo { .. } => Some(b"LOG101,"),
            Self::ReadWaypoints { .. } => Some(b"LOG102,"),
            Self::SetGpsMouse { .. } => Some(b"LOG103"),
            Self::SetConfig { .. } => Some(b"LOG104"),
            Self::DeviceInfo => Some(b"LOG108,"),
            Self::Erase => Some(b"LOG109"),
        }
    }

    /// Number of reply lines to wait for.
    #[must_use]
    pub const fn expected_lines(&self) -> usize {
        match self {
            Self::FirmwareVersion => 5,
            _ => 1,
        }
    }
}
