//! Reply parsing for the RGM-3800 protocol.
//!
//! Replies are ASCII, comma separated, with the tag as first field. The only
//! exception is `LOG102`, which carries binary waypoint records.

use bytes::Buf;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::types::{DeviceInfo, MemoryInfo, MemoryTimeframe, TrackInfo, WaypointFormat};

/// Prefix of the progress lines sent while erasing.
pub const ERASE_REPORT_PREFIX: &[u8] = b"PSRFTXTSFAM Test Report:";

/// Prefix of the firmware banner line in the `PROY005` reply.
pub const FIRMWARE_PREFIX: &[u8] = b"PSRFTXT,[ONOFFLOG]";

/// Length of `LOG102,` plus the part and length header.
const WAYPOINT_HEADER_LEN: usize = 10;

fn protocol_error(message: impl Into<String>) -> Error {
    Error::Protocol {
        message: message.into(),
    }
}

/// Splits a reply into its fields, dropping the tag.
fn fields(line: &[u8]) -> Result<Vec<&str>> {
    let text = std::str::from_utf8(line)
        .map_err(|_| protocol_error(format!("reply is not ASCII: {line:?}")))?;
    Ok(text.split(',').skip(1).collect())
}

fn parse_int<T: std::str::FromStr>(field: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| protocol_error(format!("invalid number {field:?}")))
}

fn digits(field: &str, range: std::ops::Range<usize>) -> Result<u32> {
    field
        .get(range)
        .ok_or_else(|| protocol_error(format!("field too short: {field:?}")))
        .and_then(parse_int)
}

/// Parses a `YYYYMMDD` date.
pub fn parse_date(field: &str) -> Result<NaiveDate> {
    if field.len() != 8 {
        return Err(protocol_error(format!("invalid date {field:?}")));
    }
    let year = i32::try_from(digits(field, 0..4)?)
        .map_err(|_| protocol_error(format!("invalid date {field:?}")))?;
    NaiveDate::from_ymd_opt(year, digits(field, 4..6)?, digits(field, 6..8)?)
        .ok_or_else(|| protocol_error(format!("invalid date {field:?}")))
}

/// Parses a `YYYYMMDD`, `hhmmss` pair.
pub fn parse_datetime(date: &str, time: &str) -> Result<NaiveDateTime> {
    if time.len() != 6 {
        return Err(protocol_error(format!("invalid time {time:?}")));
    }
    let date = parse_date(date)?;
    let hour = digits(time, 0..2)?;
    let min = digits(time, 2..4)?;
    let sec = digits(time, 4..6)?;
    let time = NaiveTime::from_hms_opt(hour, min, sec)
        .ok_or_else(|| protocol_error(format!("invalid time {time:?}")))?;
    Ok(date.and_time(time))
}

/// Parses the `PROY003` reply.
///
/// Returns `None` for anything but `LOG003`: without a satellite lock the
/// firmware answers `LOG002`.
pub fn parse_timestamp(line: &[u8]) -> Result<Option<NaiveDateTime>> {
    if !line.starts_with(b"LOG003,") {
        return Ok(None);
    }
    match fields(line)?.as_slice() {
        [date, time, ..] => parse_datetime(date, time).map(Some),
        _ => Err(protocol_error("LOG003 reply too short")),
    }
}

/// Parses the `LOG006` reply, `None` on a device without waypoints.
///
/// Format: `LOG006,from_date,from_time,to_date,to_time`
pub fn parse_memory_timeframe(line: &[u8]) -> Result<Option<MemoryTimeframe>> {
    match fields(line)?.as_slice() {
        [from_date, from_time, to_date, to_time] => Ok(Some(MemoryTimeframe {
            from: parse_datetime(from_date, from_time)?,
            to: parse_datetime(to_date, to_time)?,
        })),
        _ => Ok(None),
    }
}

/// Parses the `LOG100` reply: `LOG100,total,sector_size,sectors`.
pub fn parse_memory_info(line: &[u8]) -> Result<MemoryInfo> {
    match fields(line)?.as_slice() {
        [total, sector_size, sectors, ..] => Ok(MemoryInfo {
            total_bytes: parse_int(total)?,
            sector_size: parse_int(sector_size)?,
            sector_count: parse_int(sectors)?,
        }),
        _ => Err(protocol_error("LOG100 reply too short")),
    }
}

/// Parses the `LOG101` reply: `LOG101,date,format,waypoints,address`.
pub fn parse_track_info(index: u32, line: &[u8]) -> Result<TrackInfo> {
    match fields(line)?.as_slice() {
        [date, format, count, address, ..] => Ok(TrackInfo {
            index,
            date: parse_date(date)?,
            format: WaypointFormat::try_from(parse_int::<u8>(format)?)?,
            waypoint_count: parse_int(count)?,
            address: parse_int(address)?,
        }),
        _ => Err(protocol_error("LOG101 reply too short")),
    }
}

/// Parses the `LOG108` reply, 9 integers.
pub fn parse_device_info(line: &[u8]) -> Result<DeviceInfo> {
    let values = fields(line)?
        .into_iter()
        .map(parse_int::<i64>)
        .collect::<Result<Vec<_>>>()?;
    let count = values.len();
    let raw: [i64; 9] = values
        .try_into()
        .map_err(|_| protocol_error(format!("LOG108 has {count} values, expected 9")))?;

    let named = |i: usize| {
        u32::try_from(raw[i])
            .map_err(|_| protocol_error(format!("LOG108 value {i} out of range: {}", raw[i])))
    };
    let small = |i: usize| {
        u8::try_from(raw[i])
            .map_err(|_| protocol_error(format!("LOG108 value {i} out of range: {}", raw[i])))
    };

    Ok(DeviceInfo {
        format: small(0)?,
        memory_full: small(3)?,
        interval: named(5)?,
        track_count: named(7)?,
        last_track_waypoints: named(8)?,
        raw,
    })
}

/// Parses an acknowledgement such as `LOG104,1`.
#[must_use]
pub fn parse_ack(line: &[u8]) -> bool {
    line.split(|&b| b == b',').nth(1) == Some(&b"1"[..])
}

/// Extracts the firmware version from the `PROY005` reply lines.
#[must_use]
pub fn parse_firmware_version(lines: &[bytes::Bytes]) -> Option<String> {
    lines.iter().find_map(|line| {
        if !line.starts_with(FIRMWARE_PREFIX) {
            return None;
        }
        // version text follows the first `]`, the one closing the tag
        let pos = line.iter().position(|&b| b == b']')?;
        let version = String::from_utf8_lossy(&line[pos + 1..]);
        Some(version.trim().to_string())
    })
}

/// Returns the text of an erase progress line.
#[must_use]
pub fn parse_erase_report(line: &[u8]) -> Option<String> {
    line.strip_prefix(ERASE_REPORT_PREFIX)
        .map(|rest| String::from_utf8_lossy(rest).trim().to_string())
}

/// One `LOG102` reply line.
///
/// ```text
/// LOG102, [part:2LE] [length:1] [records...]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaypointChunk<'a> {
    /// Sequence number of the line.
    pub part: u16,
    /// Length byte as reported, not used for framing.
    pub length: u8,
    /// Concatenated raw records.
    pub records: &'a [u8],
}

/// Splits a `LOG102` line into header and records, `None` if it is too
/// short to hold the header.
#[must_use]
pub fn parse_waypoint_chunk(line: &[u8]) -> Option<WaypointChunk<'_>> {
    if line.len() < WAYPOINT_HEADER_LEN {
        return None;
    }
    let mut header = &line[7..WAYPOINT_HEADER_LEN];
    Some(WaypointChunk {
        part: header.get_u16_le(),
        length: header.get_u8(),
        records: &line[WAYPOINT_HEADER_LEN..],
    })
}
