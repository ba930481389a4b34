//! Request/response engine.
//!
//! The logger answers requests with one or more lines, mixed with whatever
//! else it happens to output (live NMEA sentences, status text). Requests
//! are therefore retried until the expected reply lines were seen.

pub mod waypoints;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher};
use crate::protocol::Command;
use crate::protocol::frame::{LineParser, MAX_LINE_LEN, encode};
use crate::transport::Transport;

/// Attempts per request before giving up.
pub const MAX_ATTEMPTS: usize = 5;

/// Lines read per attempt regardless of the expected reply size.
pub const BASE_LINE_BUDGET: usize = 20;

/// Additional lines read per expected reply line.
pub const LINES_PER_EXPECTED: usize = 5;

/// Bytes [`CommandHandler::recv_line`] consumes before giving up.
const MAX_GARBAGE_BYTES: usize = MAX_LINE_LEN * 8;

/// Sends requests and collects their replies.
#[derive(Debug)]
pub struct CommandHandler {
    transport: Transport,
    dispatcher: EventDispatcher,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(transport: Transport, dispatcher: EventDispatcher) -> Self {
        Self {
            transport,
            dispatcher,
        }
    }

    /// Returns the event dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Returns true while the transport is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Frames and sends one request line.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        tracing::trace!(">> {:?}", String::from_utf8_lossy(payload));
        self.transport.write(&encode(payload)).await?;

        let name = &payload[..payload.len().min(7)];
        let command = String::from_utf8_lossy(name).into_owned();
        self.dispatcher.dispatch(Event::Request { command });
        Ok(())
    }

    /// Receives the next line with a valid checksum.
    ///
    /// Returns `None` if no byte arrives within the read deadline. A partial
    /// line is thrown away in that case.
    pub async fn recv_line(&mut self) -> Result<Option<Bytes>> {
        let mut parser = LineParser::new();

        for _ in 0..MAX_GARBAGE_BYTES {
            let data = self.transport.read(1).await?;
            let Some(&byte) = data.first() else {
                return Ok(None);
            };
            if let Some(line) = parser.push(byte) {
                return Ok(Some(line));
            }
        }

        tracing::debug!("no valid line within {} bytes", MAX_GARBAGE_BYTES);
        Ok(None)
    }

    /// Sends a request and collects the reply lines starting with `prefix`.
    ///
    /// With `expected` set to 0 every matching line up to the first read
    /// timeout is returned, otherwise exactly `expected` lines.
    pub async fn send_recv(
        &mut self,
        payload: &[u8],
        prefix: Option<&[u8]>,
        expected: usize,
    ) -> Result<Vec<Bytes>> {
        for attempt in 1..=MAX_ATTEMPTS {
            self.send(payload).await?;

            let mut budget = BASE_LINE_BUDGET + LINES_PER_EXPECTED * expected;
            let mut lines = Vec::new();
            while budget > 0 {
                let Some(line) = self.recv_line().await? else {
                    break;
                };
                budget -= 1;

                if prefix.is_none_or(|prefix| line.starts_with(prefix)) {
                    lines.push(line);
                }
                if expected > 0 && lines.len() == expected {
                    break;
                }
            }

            let reason = if lines.is_empty() {
                "timeout talking to device"
            } else if expected > 0 && lines.len() != expected {
                "incomplete results"
            } else {
                return Ok(lines);
            };

            tracing::debug!("attempt {}/{}: {}", attempt, MAX_ATTEMPTS, reason);
            if attempt < MAX_ATTEMPTS {
                self.dispatcher.dispatch(Event::Retry {
                    attempt,
                    reason: reason.to_string(),
                });
            }
        }

        tracing::warn!("no reply after {} attempts", MAX_ATTEMPTS);
        Err(Error::Communication {
            message: "can not talk to device".into(),
        })
    }

    /// Sends a command and collects its reply lines.
    pub async fn execute(&mut self, command: &Command) -> Result<Vec<Bytes>> {
        self.send_recv(
            &command.payload(),
            command.reply_prefix(),
            command.expected_lines(),
        )
        .await
    }

    /// Closes the transport.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}
