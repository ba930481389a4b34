//! Waypoint download.
//!
//! `PROY102,address,format,count` makes the logger dump `count` raw records
//! starting at `address`, spread over as many `LOG102` lines as it likes.
//! Larger ranges are split into pages that are requested one at a time.

use crate::commands::{CommandHandler, MAX_ATTEMPTS};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::protocol::Command;
use crate::protocol::parser::parse_waypoint_chunk;
use crate::types::{Waypoint, WaypointFormat};

/// Noise tolerated while downloading, exceeding it aborts the download.
pub const NOISE_LIMIT: usize = 100;

/// Noise added by a `LOG102` line too short for its header.
pub const BAD_HEADER_PENALTY: usize = 20;

const REPLY_PREFIX: &[u8] = b"LOG102,";

/// One bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Address of the first record.
    pub address: u32,
    /// Number of records.
    pub count: u32,
}

/// Splits `count` records starting at `address` into pages of at most
/// `page_bytes` bytes, at least one record each.
#[must_use]
pub fn plan_pages(
    address: u32,
    format: WaypointFormat,
    count: u32,
    page_bytes: usize,
) -> Vec<Page> {
    let record_len = format.record_len() as u32;
    let per_page = (page_bytes / format.record_len()).max(1);
    let per_page = u32::try_from(per_page).unwrap_or(u32::MAX);

    let mut pages = Vec::new();
    let mut address = address;
    let mut remaining = count;
    while remaining > 0 {
        let count = remaining.min(per_page);
        pages.push(Page { address, count });
        address = address.wrapping_add(count.wrapping_mul(record_len));
        remaining -= count;
    }
    pages
}

/// Decodes up to `wanted` records into `out`, returns how many were consumed.
///
/// A payload that is not a whole number of records is dropped entirely.
fn take_records(
    format: WaypointFormat,
    records: &[u8],
    wanted: u32,
    out: &mut Vec<Waypoint>,
) -> u32 {
    let record_len = format.record_len();
    if records.len() % record_len != 0 {
        tracing::debug!(
            "dropping {} bytes, not a multiple of {}",
            records.len(),
            record_len
        );
        return 0;
    }

    let mut taken = 0;
    for raw in records.chunks_exact(record_len).take(wanted as usize) {
        taken += 1;
        match Waypoint::decode(format, raw) {
            Ok(waypoint) => out.push(waypoint),
            Err(e) => tracing::trace!("dropping record: {}", e),
        }
    }
    taken
}

impl CommandHandler {
    /// Downloads `count` records starting at `address`.
    ///
    /// Records the device stored broken are skipped, so fewer than `count`
    /// waypoints may be returned. The whole request is repeated if the
    /// device stops sending early.
    pub async fn read_waypoints(
        &mut self,
        address: u32,
        format: WaypointFormat,
        count: u32,
    ) -> Result<Vec<Waypoint>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let payload = Command::ReadWaypoints {
            address,
            format,
            count,
        }
        .payload();

        for attempt in 1..=MAX_ATTEMPTS {
            self.send(&payload).await?;

            let mut received = 0u32;
            let mut noise = 0usize;
            let mut waypoints = Vec::new();

            while received < count {
                let Some(line) = self.recv_line().await? else {
                    break;
                };

                if !line.starts_with(REPLY_PREFIX) {
                    noise += 1;
                } else if let Some(chunk) = parse_waypoint_chunk(&line) {
                    received +=
                        take_records(format, chunk.records, count - received, &mut waypoints);
                    continue;
                } else {
                    tracing::debug!("LOG102 line too short: {} bytes", line.len());
                    noise += BAD_HEADER_PENALTY;
                }

                if noise > NOISE_LIMIT {
                    tracing::warn!("too much noise while reading waypoints");
                    return Err(Error::Communication {
                        message: "too much noise".into(),
                    });
                }
            }

            if received == count {
                return Ok(waypoints);
            }

            tracing::debug!(
                "attempt {}/{}: received {} of {} records",
                attempt,
                MAX_ATTEMPTS,
                received,
                count
            );
            if attempt < MAX_ATTEMPTS {
                self.dispatcher.dispatch(Event::Retry {
                    attempt,
                    reason: format!("received {received} of {count} waypoints"),
                });
            }
        }

        tracing::warn!("giving up reading {} waypoints at {}", count, address);
        Err(Error::Communication {
            message: "can not retrieve waypoints".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventDispatcher, EventFilter, EventKind};
    use crate::transport::mock::{MockDevice, init_tracing, position_record, waypoint_reply};
    use tokio::task::JoinHandle;

    fn handler(
        device: MockDevice,
    ) -> (CommandHandler, JoinHandle<std::result::Result<(), String>>) {
        init_tracing();
        let (transport, handle) = device.start();
        (CommandHandler::new(transport, EventDispatcher::new(256)), handle)
    }

    async fn finish(
        mut handler: CommandHandler,
        handle: JoinHandle<std::result::Result<(), String>>,
    ) {
        handler.close().await;
        handle.await.unwrap().unwrap();
    }

    fn records(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| position_record(1, i, 0.5, 0.25)).collect()
    }

    #[test]
    fn test_plan_pages() {
        assert_eq!(
            plan_pages(1000, WaypointFormat::Position, 10, 84),
            vec![
                Page {
                    address: 1000,
                    count: 7,
                },
                Page {
                    address: 1084,
                    count: 3,
                },
            ]
        );

        let pages = plan_pages(288_484, WaypointFormat::Full, 285, 4800);
        assert_eq!(pages.len(), 4);
        assert!(pages[..3].iter().all(|p| p.count == 80));
        assert_eq!(pages[3].count, 45);
        assert_eq!(pages[3].address, 288_484 + 240 * 60);

        assert!(plan_pages(0, WaypointFormat::Full, 0, 4800).is_empty());
    }

    #[test]
    fn test_plan_pages_small_page() {
        let pages = plan_pages(0, WaypointFormat::Distance, 3, 10);
        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages[2],
            Page {
                address: 48,
                count: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_waypoints() {
        let all = records(5);
        let device = MockDevice::new()
            .expect("PROY102,100,0,5")
            .provide(b"GPGGA,noise")
            .provide(&waypoint_reply(0, &all[..3]))
            .provide(&waypoint_reply(1, &all[3..]));
        let (mut handler, handle) = handler(device);

        let waypoints = handler
            .read_waypoints(100, WaypointFormat::Position, 5)
            .await
            .unwrap();
        assert_eq!(waypoints.len(), 5);
        assert_eq!(waypoints[4].time.to_string(), "10:00:04");
        assert!((waypoints[0].latitude - 0.5).abs() < f32::EPSILON);

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_record_skipped() {
        let mut all = records(3);
        all[1][0] = 0;
        let device = MockDevice::new()
            .expect("PROY102,0,0,3")
            .provide(&waypoint_reply(0, &all));
        let (mut handler, handle) = handler(device);

        let waypoints = handler
            .read_waypoints(0, WaypointFormat::Position, 3)
            .await
            .unwrap();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[1].time.to_string(), "10:00:02");

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_records_truncated() {
        let device = MockDevice::new()
            .expect("PROY102,0,0,2")
            .provide(&waypoint_reply(0, &records(3)));
        let (mut handler, handle) = handler(device);

        let waypoints = handler
            .read_waypoints(0, WaypointFormat::Position, 2)
            .await
            .unwrap();
        assert_eq!(waypoints.len(), 2);

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_length_line_dropped() {
        let mut bad = waypoint_reply(0, &records(1));
        bad.push(0x42);
        let device = MockDevice::new()
            .expect("PROY102,0,0,1")
            .provide(&bad)
            .provide(&waypoint_reply(1, &records(1)));
        let (mut handler, handle) = handler(device);

        let waypoints = handler
            .read_waypoints(0, WaypointFormat::Position, 1)
            .await
            .unwrap();
        assert_eq!(waypoints.len(), 1);

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_much_noise() {
        let mut device = MockDevice::new().expect("PROY102,100,0,1");
        for _ in 0..=NOISE_LIMIT {
            device = device.provide(b"GPGSV,noise");
        }
        let (mut handler, handle) = handler(device);

        let result = handler
            .read_waypoints(100, WaypointFormat::Position, 1)
            .await;
        assert!(matches!(result, Err(Error::Communication { .. })));

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_headers_count_as_noise() {
        let mut device = MockDevice::new().expect("PROY102,100,0,1");
        for _ in 0..=NOISE_LIMIT / BAD_HEADER_PENALTY {
            device = device.provide(b"LOG102,\x01");
        }
        let (mut handler, handle) = handler(device);

        let result = handler
            .read_waypoints(100, WaypointFormat::Position, 1)
            .await;
        assert!(matches!(result, Err(Error::Communication { .. })));

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_short_page() {
        let all = records(3);
        let device = MockDevice::new()
            .expect("PROY102,0,0,3")
            .provide(&waypoint_reply(0, &all[..2]))
            .expect("PROY102,0,0,3")
            .provide(&waypoint_reply(0, &all));
        let (mut handler, handle) = handler(device);
        let mut retries = handler
            .dispatcher()
            .subscribe(Some(EventFilter::kinds(vec![EventKind::Retry])));

        let waypoints = handler
            .read_waypoints(0, WaypointFormat::Position, 3)
            .await
            .unwrap();
        assert_eq!(waypoints.len(), 3);
        assert_eq!(waypoints[0].time.to_string(), "10:00:00");
        assert_eq!(
            retries.try_recv(),
            Some(Event::Retry {
                attempt: 1,
                reason: "received 2 of 3 waypoints".into(),
            })
        );

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let all = records(3);
        let mut device = MockDevice::new();
        for _ in 0..MAX_ATTEMPTS {
            device = device
                .expect("PROY102,100,0,3")
                .provide(&waypoint_reply(0, &all[..2]));
        }
        let (mut handler, handle) = handler(device);
        let mut requests = handler
            .dispatcher()
            .subscribe(Some(EventFilter::kinds(vec![EventKind::Request])));
        let mut retries = handler
            .dispatcher()
            .subscribe(Some(EventFilter::kinds(vec![EventKind::Retry])));

        let result = handler
            .read_waypoints(100, WaypointFormat::Position, 3)
            .await;
        assert!(matches!(result, Err(Error::Communication { .. })));

        let mut sent = 0;
        while let Some(event) = requests.try_recv() {
            assert_eq!(
                event,
                Event::Request {
                    command: "PROY102".into(),
                }
            );
            sent += 1;
        }
        assert_eq!(sent, MAX_ATTEMPTS);

        let mut retried = 0;
        while retries.try_recv().is_some() {
            retried += 1;
        }
        assert_eq!(retried, MAX_ATTEMPTS - 1);

        finish(handler, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_records_sends_nothing() {
        let (mut handler, handle) = handler(MockDevice::new());
        let waypoints = handler
            .read_waypoints(0, WaypointFormat::Full, 0)
            .await
            .unwrap();
        assert!(waypoints.is_empty());
        finish(handler, handle).await;
    }
}
