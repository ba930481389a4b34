//! Waypoint records as stored by the logger.
//!
//! Every record starts with the same 12 byte block, later formats append
//! more fields:
//! ```text
//! ┌─────┬──────┬─────┬─────┬──────────┬──────────┐
//! │ fix │ hour │ min │ sec │ lat f32  │ lon f32  │   format 0, 12 bytes
//! └─────┴──────┴─────┴─────┴──────────┴──────────┘
//!   + alt f32                                          format 1, 16 bytes
//!   + velocity f32 (km/h)                              format 2, 20 bytes
//!   + distance u32 (m)                                 format 3, 24 bytes
//!   + 2 unknown, hdop/pdop/vdop u16, 12 x (id, snr),
//!     4 unknown                                        format 4, 60 bytes
//! ```
//! All multi-byte values are little-endian, positions are radians.

use std::f64::consts::PI;

use bytes::Buf;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, RecordError};

/// Number of satellite slots in a format 4 record.
pub const SATELLITE_SLOTS: usize = 12;

/// What the logger stores per waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WaypointFormat {
    /// Latitude and longitude.
    Position = 0,
    /// Position and altitude.
    Altitude = 1,
    /// Position, altitude and velocity.
    Velocity = 2,
    /// Position, altitude, velocity and distance travelled.
    Distance = 3,
    /// Everything above plus dilution of precision and satellite signals.
    Full = 4,
}

impl WaypointFormat {
    /// All known formats, in code order.
    pub const ALL: [Self; 5] = [
        Self::Position,
        Self::Altitude,
        Self::Velocity,
        Self::Distance,
        Self::Full,
    ];

    /// Returns the numeric code used on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns the size of one record in bytes.
    #[must_use]
    pub const fn record_len(self) -> usize {
        match self {
            Self::Position => 12,
            Self::Altitude => 16,
            Self::Velocity => 20,
            Self::Distance => 24,
            Self::Full => 60,
        }
    }

    /// Returns a short description of the logged fields.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Position => "Lat,Lon",
            Self::Altitude => "Lat,Lon,Alt",
            Self::Velocity => "Lat,Lon,Alt,Vel",
            Self::Distance => "Lat,Lon,Alt,Vel,Dist",
            Self::Full => "Lat,Lon,Alt,Vel,Dist,Stat",
        }
    }
}

impl TryFrom<u8> for WaypointFormat {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|format| format.code() == code)
            .ok_or(Error::UnsupportedFormat(code))
    }
}

impl From<WaypointFormat> for u8 {
    fn from(format: WaypointFormat) -> Self {
        format.code()
    }
}

/// Dilution of precision values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dilution {
    /// Horizontal dilution of precision.
    pub hdop: f32,
    /// Vertical dilution of precision.
    pub vdop: f32,
    /// Position dilution of precision.
    pub pdop: f32,
}

/// Signal strength of one tracked satellite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SatelliteSignal {
    /// Satellite PRN.
    pub id: u8,
    /// Signal to noise ratio, 0 if not received.
    pub snr: u8,
}

/// One logged GPS fix.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    /// Record format this waypoint was decoded from.
    pub format: WaypointFormat,
    /// Track date, assigned after retrieval.
    pub date: Option<NaiveDate>,
    /// UTC time of day.
    pub time: NaiveTime,
    /// Latitude in radians.
    pub latitude: f32,
    /// Longitude in radians.
    pub longitude: f32,
    /// Altitude in meters (format 1 and up).
    pub altitude: Option<f32>,
    /// Velocity in km/h (format 2 and up).
    pub velocity: Option<f32>,
    /// Distance travelled since track start in meters (format 3 and up).
    pub distance: Option<u32>,
    /// Dilution of precision (format 4).
    pub dilution: Option<Dilution>,
    /// Satellite signals (format 4).
    pub satellites: Option<[SatelliteSignal; SATELLITE_SLOTS]>,
}

impl Waypoint {
    /// Decodes one raw record.
    ///
    /// A record whose fix flag is not 1 is rejected. Such records are
    /// stored broken on the device and must be skipped by the caller.
    pub fn decode(format: WaypointFormat, raw: &[u8]) -> Result<Self, RecordError> {
        if raw.len() != format.record_len() {
            return Err(RecordError::WrongLength {
                format: format.code(),
                expected: format.record_len(),
                got: raw.len(),
            });
        }

        let mut cursor = raw;

        let fix = cursor.get_u8();
        if fix != 1 {
            return Err(RecordError::FixNotOk(fix));
        }
        let hour = cursor.get_u8();
        let minute = cursor.get_u8();
        let second = cursor.get_u8();
        let time = NaiveTime::from_hms_opt(hour.into(), minute.into(), second.into());
        let time = time.ok_or(RecordError::InvalidTime {
            hour,
            minute,
            second,
        })?;

        let latitude = cursor.get_f32_le();
        let longitude = cursor.get_f32_le();

        let code = format.code();
        let altitude = (code >= 1).then(|| cursor.get_f32_le());
        let velocity = (code >= 2).then(|| cursor.get_f32_le());
        let distance = (code >= 3).then(|| cursor.get_u32_le());

        let (dilution, satellites) = if format == WaypointFormat::Full {
            // Two bytes of unknown flags, possibly 2D/3D lock.
            cursor.advance(2);
            let hdop = f32::from(cursor.get_u16_le()) / 100.0;
            let pdop = f32::from(cursor.get_u16_le()) / 100.0;
            let vdop = f32::from(cursor.get_u16_le()) / 100.0;

            let mut satellites = [SatelliteSignal::default(); SATELLITE_SLOTS];
            for slot in &mut satellites {
                slot.id = cursor.get_u8();
                slot.snr = cursor.get_u8();
            }
            // Trailing 4 bytes are unknown.
            (Some(Dilution { hdop, vdop, pdop }), Some(satellites))
        } else {
            (None, None)
        };

        Ok(Self {
            format,
            date: None,
            time,
            latitude,
            longitude,
            altitude,
            velocity,
            distance,
            dilution,
            satellites,
        })
    }

    /// Sets the track date.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    /// Returns the waypoint with the given track date.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.set_date(date);
        self
    }

    /// Returns date and time, if the date has been assigned.
    #[must_use]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.date.map(|date| date.and_time(self.time))
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub fn latitude_degrees(&self) -> f64 {
        f64::from(self.latitude).to_degrees()
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub fn longitude_degrees(&self) -> f64 {
        f64::from(self.longitude).to_degrees()
    }

    /// Number of satellites with a non-zero signal, 0 below format 4.
    #[must_use]
    pub fn satellites_in_use(&self) -> usize {
        let sats = self.satellites.unwrap_or_default();
        sats.iter().filter(|s| s.snr > 0).count()
    }
}

/// An angle split into hemisphere, whole degrees and minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreesMinutes {
    /// North resp. east of zero.
    pub positive: bool,
    /// Whole degrees.
    pub degrees: u32,
    /// Minutes, including the fraction.
    pub minutes: f64,
}

impl DegreesMinutes {
    /// Converts a latitude or longitude given in radians.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn from_radians(value: f64) -> Self {
        let value = value * 180.0 / PI;
        let positive = value >= 0.0;
        let value = value.abs();
        let degrees = value.trunc();
        Self {
            positive,
            degrees: degrees as u32,
            minutes: (value - degrees) * 60.0,
        }
    }
}
