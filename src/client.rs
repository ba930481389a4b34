//! Main [`Rgm3800`] client implementation.
//!
//! This module provides the high-level [`Rgm3800`] session that combines
//! transport, event handling and commands into a unified interface.

use std::time::Duration;

use bytes::Bytes;
use chrono::NaiveDateTime;
use tokio::time::Instant;

use crate::commands::CommandHandler;
use crate::commands::waypoints::plan_pages;
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, EventFilter, Subscription};
use crate::protocol::Command;
use crate::protocol::parser::{
    parse_ack, parse_device_info, parse_erase_report, parse_firmware_version, parse_memory_info,
    parse_memory_timeframe, parse_timestamp, parse_track_info,
};
use crate::transport::{SerialConfig, Transport, serial};
use crate::types::{
    DeviceInfo, MemoryFullPolicy, MemoryInfo, MemoryTimeframe, MemoryUsage, TrackBounds,
    TrackInfo, Waypoint, WaypointFormat,
};

/// Bytes requested per bulk read.
pub const DEFAULT_PAGE_BYTES: usize = 4800;

/// Erasing is done once the device stayed silent this long.
pub const ERASE_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Valid logging intervals in seconds.
pub const INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 1..=60;

const EVENT_CAPACITY: usize = 256;

/// Session with an RGM-3800 logger.
///
/// All operations take `&mut self`, so requests never overlap.
#[derive(Debug)]
pub struct Rgm3800 {
    commands: CommandHandler,
    dispatcher: EventDispatcher,
    info: Option<DeviceInfo>,
    page_bytes: usize,
    closed: bool,
}

impl Rgm3800 {
    /// Opens a session on a serial port.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0")
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(port: impl Into<String>) -> Result<Self> {
        Self::with_serial_config(&SerialConfig::new(port))
    }

    /// Opens a session with custom serial configuration.
    pub fn with_serial_config(config: &SerialConfig) -> Result<Self> {
        let transport = serial::open(config)?;
        Ok(Self::new(transport))
    }

    /// Creates a session on an already open transport.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        let dispatcher = EventDispatcher::new(EVENT_CAPACITY);
        let commands = CommandHandler::new(transport, dispatcher.clone());
        dispatcher.dispatch(Event::Connected);

        Self {
            commands,
            dispatcher,
            info: None,
            page_bytes: DEFAULT_PAGE_BYTES,
            closed: false,
        }
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        self.dispatcher.subscribe(filter)
    }

    /// Returns the event dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Sets how many bytes are requested per bulk read.
    pub fn set_page_bytes(&mut self, bytes: usize) {
        self.page_bytes = bytes;
    }

    /// Returns the bytes requested per bulk read.
    #[must_use]
    pub const fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Returns true while the port is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.closed && self.commands.is_connected()
    }

    /// Sends a command and returns its single reply line.
    async fn query(&mut self, command: &Command) -> Result<Bytes> {
        self.commands
            .execute(command)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Communication {
                message: "empty reply".into(),
            })
    }

    // ==================== Device Commands ====================

    /// Gets the current GPS time.
    ///
    /// Returns `None` while the device has no satellite lock.
    pub async fn get_timestamp(&mut self) -> Result<Option<NaiveDateTime>> {
        let line = self.query(&Command::GetTime).await?;
        parse_timestamp(&line)
    }

    /// Gets the time span of the stored waypoints, `None` if there are none.
    pub async fn get_memory_timeframe(&mut self) -> Result<Option<MemoryTimeframe>> {
        let line = self.query(&Command::MemoryTimeframe).await?;
        parse_memory_timeframe(&line)
    }

    /// Switches live NMEA output ("GPS mouse" mode) on or off.
    pub async fn set_gps_mouse(&mut self, enabled: bool) -> Result<bool> {
        let line = self.query(&Command::SetGpsMouse { enabled }).await?;
        Ok(parse_ack(&line))
    }

    /// Gets the logger configuration and usage.
    ///
    /// The result is cached for the lifetime of the session.
    pub async fn get_info(&mut self) -> Result<DeviceInfo> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }
        let line = self.query(&Command::DeviceInfo).await?;
        let info = parse_device_info(&line)?;
        self.info = Some(info.clone());
        Ok(info)
    }

    /// Drops the cached device info.
    pub fn invalidate_info(&mut self) {
        self.info = None;
    }

    /// Sets the logging interval in seconds, 1 to 60.
    pub async fn set_interval(&mut self, interval: u32) -> Result<bool> {
        if !INTERVAL_RANGE.contains(&interval) {
            return Err(Error::InvalidSetting {
                reason: format!(
                    "interval {interval} outside {}..={} seconds",
                    INTERVAL_RANGE.start(),
                    INTERVAL_RANGE.end()
                ),
            });
        }
        let (_, format, memory_full) = self.current_config().await?;
        self.write_config(interval, format, memory_full).await
    }

    /// Sets the waypoint format used for new tracks.
    pub async fn set_format(&mut self, format: WaypointFormat) -> Result<bool> {
        let (interval, _, memory_full) = self.current_config().await?;
        self.write_config(interval, format, memory_full).await
    }

    /// Sets what happens once the memory is full.
    pub async fn set_memory_full(&mut self, policy: MemoryFullPolicy) -> Result<bool> {
        let (interval, format, _) = self.current_config().await?;
        self.write_config(interval, format, policy).await
    }

    async fn current_config(&mut self) -> Result<(u32, WaypointFormat, MemoryFullPolicy)> {
        let info = self.get_info().await?;
        let format = info
            .waypoint_format()
            .ok_or(Error::UnsupportedFormat(info.format))?;
        let Some(policy) = info.memory_full_policy() else {
            return Err(Error::Protocol {
                message: format!("unknown memory full setting {}", info.memory_full),
            });
        };
        Ok((info.interval, format, policy))
    }

    async fn write_config(
        &mut self,
        interval: u32,
        format: WaypointFormat,
        memory_full: MemoryFullPolicy,
    ) -> Result<bool> {
        let command = Command::SetConfig {
            interval,
            format,
            memory_full,
        };
        let line = self.query(&command).await?;
        let accepted = parse_ack(&line);

        if !accepted {
            self.info = None;
        } else if let Some(info) = &mut self.info {
            info.interval = interval;
            info.format = format.code();
            info.memory_full = memory_full.code();
            info.raw[0] = i64::from(info.format);
            info.raw[3] = i64::from(info.memory_full);
            info.raw[5] = i64::from(interval);
        }

        tracing::debug!(
            "config {} s, format {}, memory full {}: {}",
            interval,
            format.code(),
            memory_full.code(),
            if accepted { "accepted" } else { "rejected" }
        );
        Ok(accepted)
    }

    /// Gets the memory geometry.
    pub async fn get_memory_info(&mut self) -> Result<MemoryInfo> {
        let line = self.query(&Command::MemoryInfo).await?;
        parse_memory_info(&line)
    }

    /// Gets the metadata of one track.
    pub async fn get_track_info(&mut self, index: u32) -> Result<TrackInfo> {
        let line = self.query(&Command::TrackInfo { index }).await?;
        parse_track_info(index, &line)
    }

    /// Gets the metadata of all tracks.
    pub async fn get_all_track_info(&mut self) -> Result<Vec<TrackInfo>> {
        let info = self.get_info().await?;
        let mut tracks = Vec::new();
        for index in 0..info.track_count {
            tracks.push(self.get_track_info(index).await?);
        }
        Ok(tracks)
    }

    /// Gets the firmware version, if the device reports one.
    pub async fn get_firmware_version(&mut self) -> Result<Option<String>> {
        let lines = self.commands.execute(&Command::FirmwareVersion).await?;
        Ok(parse_firmware_version(&lines))
    }

    /// Erases all tracks.
    ///
    /// The device reports its progress roughly once a second; each report is
    /// dispatched as [`Event::EraseReport`]. Returns once the reports stopped
    /// for [`ERASE_QUIET_PERIOD`], or `false` if the device refused.
    pub async fn erase(&mut self) -> Result<bool> {
        let line = self.query(&Command::Erase).await?;
        if !parse_ack(&line) {
            return Ok(false);
        }
        self.info = None;

        let mut last_report = Instant::now();
        while last_report.elapsed() < ERASE_QUIET_PERIOD {
            let Some(line) = self.commands.recv_line().await? else {
                continue;
            };
            if let Some(text) = parse_erase_report(&line) {
                tracing::debug!("erase: {}", text);
                last_report = Instant::now();
                self.dispatcher.dispatch(Event::EraseReport(text));
            }
        }

        tracing::info!("memory erased");
        Ok(true)
    }

    /// Gets the first and last waypoint of a track.
    pub async fn track_bounds(&mut self, index: u32) -> Result<TrackBounds> {
        let info = self.get_track_info(index).await?;
        if info.waypoint_count == 0 {
            return Ok(TrackBounds {
                info,
                first: None,
                last: None,
            });
        }

        let first = self.read_one(info.address, &info).await?;
        let last = self.read_one(info.last_address(), &info).await?;
        Ok(TrackBounds { info, first, last })
    }

    async fn read_one(&mut self, at: u32, info: &TrackInfo) -> Result<Option<Waypoint>> {
        let mut waypoints = self.commands.read_waypoints(at, info.format, 1).await?;
        Ok(waypoints.pop().map(|wp| wp.with_date(info.date)))
    }

    /// Sums up memory usage over all tracks.
    ///
    /// Dispatches [`Event::Progress`] after each track.
    pub async fn memory_usage(&mut self) -> Result<MemoryUsage> {
        let info = self.get_info().await?;
        let memory = self.get_memory_info().await?;

        let mut usage = MemoryUsage {
            track_count: info.track_count,
            total_waypoints: 0,
            used_bytes: 0,
            capacity_bytes: u64::from(memory.total_bytes),
        };
        for index in 0..info.track_count {
            let track = self.get_track_info(index).await?;
            usage.total_waypoints += u64::from(track.waypoint_count);
            usage.used_bytes += track.size_bytes();
            self.progress(u64::from(index) + 1, u64::from(info.track_count));
        }
        Ok(usage)
    }

    // ==================== Waypoints ====================

    /// Downloads `count` records of `format` starting at `address`.
    ///
    /// The range is read in pages of [`page_bytes`](Self::page_bytes).
    /// [`Event::Progress`] is dispatched after each page. The waypoints have
    /// no date.
    pub async fn retrieve_waypoints(
        &mut self,
        address: u32,
        format: WaypointFormat,
        count: u32,
    ) -> Result<Vec<Waypoint>> {
        let mut waypoints = Vec::new();
        let mut done = 0u64;

        for page in plan_pages(address, format, count, self.page_bytes) {
            tracing::debug!("reading {} waypoints at {}", page.count, page.address);
            let mut chunk = self
                .commands
                .read_waypoints(page.address, format, page.count)
                .await?;
            waypoints.append(&mut chunk);
            done += u64::from(page.count);
            self.progress(done, u64::from(count));
        }

        Ok(waypoints)
    }

    /// Downloads all waypoints of a track, dated with the track date.
    pub async fn retrieve_track(&mut self, index: u32) -> Result<Vec<Waypoint>> {
        let info = self.get_track_info(index).await?;
        let mut waypoints = self
            .retrieve_waypoints(info.address, info.format, info.waypoint_count)
            .await?;
        for waypoint in &mut waypoints {
            waypoint.set_date(info.date);
        }
        Ok(waypoints)
    }

    fn progress(&self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = u8::try_from(done * 100 / total).unwrap_or(100);
        self.dispatcher.dispatch(Event::Progress { percent });
    }

    /// Receives the next line the device sends, `None` after a second of
    /// silence.
    pub async fn next_line(&mut self) -> Result<Option<Bytes>> {
        self.commands.recv_line().await
    }

    /// Closes the session and releases the port.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.commands.close().await;
        self.closed = true;
        self.dispatcher.dispatch(Event::Disconnected);
    }
}
