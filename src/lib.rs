//! # rgm3800
//!
//! A Rust driver for RoyalTek RGM-3800 GPS data loggers.
//!
//! This library talks to the logger over its USB serial port and downloads
//! the recorded tracks.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Checksummed line protocol with automatic retries
//! - Decoding of all five waypoint record formats
//! - Paginated track download with progress events
//!
//! ## Quick Start
//!
//! ```no_run
//! use rgm3800::Rgm3800;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rgm3800::Error> {
//!     let mut logger = Rgm3800::open("/dev/ttyUSB0")?;
//!
//!     let info = logger.get_info().await?;
//!     println!("{} tracks, interval {} s", info.track_count, info.interval);
//!
//!     for track in logger.get_all_track_info().await? {
//!         let waypoints = logger.retrieve_track(track.index).await?;
//!         println!("track {}: {} waypoints", track.index, waypoints.len());
//!     }
//!
//!     logger.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`transport`] - Port access with a background reader
//! - [`protocol`] - Line framing, requests and reply parsing
//! - [`commands`] - Request/response engine and waypoint download
//! - [`types`] - Waypoints, device and track information
//! - [`event`] - Progress and retry notifications
//! - [`client`] - High-level [`Rgm3800`] session

pub mod client;
pub mod commands;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{DEFAULT_PAGE_BYTES, Rgm3800};
pub use error::{Error, RecordError, Result};
pub use event::{Event, EventDispatcher, EventFilter, EventKind, Subscription};
pub use protocol::Command;
pub use transport::{SerialConfig, Transport, serial::list_ports};
pub use types::{
    DegreesMinutes, DeviceInfo, Dilution, MemoryFullPolicy, MemoryInfo, MemoryTimeframe,
    MemoryUsage, SatelliteSignal, TrackBounds, TrackInfo, Waypoint, WaypointFormat,
};
