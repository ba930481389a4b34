//! Device and track information types.

use chrono::{NaiveDate, NaiveDateTime};

use crate::types::waypoint::{Waypoint, WaypointFormat};

/// What the logger does once its memory is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemoryFullPolicy {
    /// Overwrite the oldest sector.
    Overwrite = 0,
    /// Stop logging.
    Stop = 1,
}

impl MemoryFullPolicy {
    /// Parses the policy code reported by the device.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Overwrite),
            1 => Some(Self::Stop),
            _ => None,
        }
    }

    /// Returns the code sent to the device.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Logger configuration and usage, as returned by `PROY108`.
///
/// The reply carries 9 integers, not all of them understood:
/// ```text
/// format, ?, ?, memory full, ?, interval, ?, tracks, waypoints in last track
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Raw logging format code.
    pub format: u8,
    /// Raw memory-full policy code.
    pub memory_full: u8,
    /// Seconds between waypoints.
    pub interval: u32,
    /// Number of stored tracks.
    pub track_count: u32,
    /// Number of waypoints in the last track.
    pub last_track_waypoints: u32,
    /// All 9 values as reported.
    pub raw: [i64; 9],
}

impl DeviceInfo {
    /// Returns the logging format, if it is a known one.
    #[must_use]
    pub fn waypoint_format(&self) -> Option<WaypointFormat> {
        WaypointFormat::try_from(self.format).ok()
    }

    /// Returns the memory-full policy, if it is a known one.
    #[must_use]
    pub const fn memory_full_policy(&self) -> Option<MemoryFullPolicy> {
        MemoryFullPolicy::from_code(self.memory_full)
    }
}

/// Memory geometry, as returned by `PROY100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Total memory in bytes.
    pub total_bytes: u32,
    /// Sector size in bytes.
    pub sector_size: u32,
    /// Number of sectors.
    pub sector_count: u32,
}

/// Time span covered by the stored waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTimeframe {
    /// Oldest waypoint.
    pub from: NaiveDateTime,
    /// Newest waypoint.
    pub to: NaiveDateTime,
}

/// Metadata of one stored track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track number.
    pub index: u32,
    /// Date the track was recorded on.
    pub date: NaiveDate,
    /// Record format of the track.
    pub format: WaypointFormat,
    /// Number of stored waypoints.
    pub waypoint_count: u32,
    /// Memory address of the first record.
    pub address: u32,
}

impl TrackInfo {
    /// Bytes occupied by the track.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.waypoint_count) * self.format.record_len() as u64
    }

    /// Address of the last record.
    #[must_use]
    pub fn last_address(&self) -> u32 {
        let len = self.format.record_len() as u32;
        let offset = len.wrapping_mul(self.waypoint_count.saturating_sub(1));
        self.address.wrapping_add(offset)
    }
}

/// First and last waypoint of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackBounds {
    /// Track metadata.
    pub info: TrackInfo,
    /// First waypoint, `None` if the track is empty or the record is broken.
    pub first: Option<Waypoint>,
    /// Last waypoint, `None` if the track is empty or the record is broken.
    pub last: Option<Waypoint>,
}

/// Memory usage summed over all tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Number of tracks.
    pub track_count: u32,
    /// Waypoints over all tracks.
    pub total_waypoints: u64,
    /// Bytes used by all tracks.
    pub used_bytes: u64,
    /// Total memory in bytes.
    pub capacity_bytes: u64,
}

impl MemoryUsage {
    /// Used memory in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_used(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 * 100.0 / self.capacity_bytes as f64
    }

    /// Hours of logging left at the given interval and format.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hours_until_full(&self, interval_secs: u32, format: WaypointFormat) -> f64 {
        if interval_secs == 0 {
            return 0.0;
        }
        let waypoints_per_hour = 3600.0 / f64::from(interval_secs);
        let bytes_per_hour = waypoints_per_hour * format.record_len() as f64;
        let free = self.capacity_bytes.saturating_sub(self.used_bytes) as f64;
        free / bytes_per_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_full_policy_codes() {
        assert_eq!(
            MemoryFullPolicy::from_code(0),
            Some(MemoryFullPolicy::Overwrite)
        );
        assert_eq!(MemoryFullPolicy::from_code(1), Some(MemoryFullPolicy::Stop));
        assert_eq!(MemoryFullPolicy::from_code(2), None);
        assert_eq!(MemoryFullPolicy::Stop.code(), 1);
    }

    #[test]
    fn test_track_size_and_last_address() {
        let info = TrackInfo {
            index: 13,
            date: NaiveDate::from_ymd_opt(2009, 3, 11).unwrap(),
            format: WaypointFormat::Full,
            waypoint_count: 28,
            address: 288_484,
        };
        assert_eq!(info.size_bytes(), 28 * 60);
        assert_eq!(info.last_address(), 288_484 + 27 * 60);
    }

    #[test]
    fn test_last_address_wraps_on_corrupt_header() {
        let info = TrackInfo {
            index: 0,
            date: NaiveDate::from_ymd_opt(2009, 3, 11).unwrap(),
            format: WaypointFormat::Full,
            waypoint_count: u32::MAX,
            address: u32::MAX,
        };
        let expected = u32::MAX.wrapping_add(60u32.wrapping_mul(u32::MAX - 1));
        assert_eq!(info.last_address(), expected);
    }

    #[test]
    fn test_memory_usage() {
        let usage = MemoryUsage {
            track_count: 2,
            total_waypoints: 100,
            used_bytes: 1024,
            capacity_bytes: 4096,
        };
        assert!((usage.percent_used() - 25.0).abs() < f64::EPSILON);
        // 1 waypoint per second, 12 bytes each: 43200 bytes per hour
        let hours = usage.hours_until_full(1, WaypointFormat::Position);
        assert!((hours - 3072.0 / 43_200.0).abs() < 1e-9);
        let never = usage.hours_until_full(0, WaypointFormat::Position);
        assert!(never.abs() < f64::EPSILON);
    }
}
