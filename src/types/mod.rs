//! Data types reported by the logger.
//!
//! - Waypoint records and formats
//! - Device configuration, memory and track information

pub mod device;
pub mod waypoint;

pub use device::{
    DeviceInfo, MemoryFullPolicy, MemoryInfo, MemoryTimeframe, MemoryUsage, TrackBounds, TrackInfo,
};
pub use waypoint::{
    DegreesMinutes, Dilution, SATELLITE_SLOTS, SatelliteSignal, Waypoint, WaypointFormat,
};
