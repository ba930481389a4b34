//! Line framing for the RGM-3800 protocol.
//!
//! Every message in both directions is one line:
//! ```text
//! ┌─────┬────────────────────────┬─────┬──────────┬──────────┐
//! │  $  │  payload (TAG,fields)  │  *  │  HH hex  │  \r \n   │
//! └─────┴────────────────────────┴─────┴──────────┴──────────┘
//! ```
//! `HH` is the XOR of all payload bytes as two uppercase hex digits. The
//! payload starts with at least three uppercase letters. `LOG102` replies
//! carry raw binary after their header, so `*`, `\r` and `\n` may appear
//! inside a payload.

use bytes::{BufMut, Bytes, BytesMut};

/// Longest line the parser accepts, larger lines are dropped as noise.
pub const MAX_LINE_LEN: usize = 8192;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// XOR checksum over a payload.
#[must_use]
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

/// Checksum of a payload as two uppercase hex digits.
#[must_use]
pub fn checksum_hex(payload: &[u8]) -> [u8; 2] {
    let sum = checksum(payload);
    [
        HEX_DIGITS[usize::from(sum >> 4)],
        HEX_DIGITS[usize::from(sum & 0x0F)],
    ]
}

/// Wraps a payload into a complete line.
#[must_use]
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 6);
    buf.put_u8(b'$');
    buf.put_slice(payload);
    buf.put_u8(b'*');
    buf.put_slice(&checksum_hex(payload));
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Parser states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineState {
    /// Waiting for `$`.
    #[default]
    Start,
    /// Expecting the first tag letter.
    Start1,
    /// Expecting the second tag letter.
    Start2,
    /// Expecting the third tag letter.
    Start3,
    /// Inside the payload.
    Line,
    /// After `*`, expecting the first checksum digit.
    Checksum,
    /// Expecting the second checksum digit.
    Checksum1,
    /// Expecting `\r`.
    Eol,
    /// Expecting `\n`.
    Eol1,
    /// Discarding a non-conforming line up to `\r`.
    Skip,
    /// Discarding, expecting `\n`.
    Skip1,
}

/// What to do with the byte that caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Append the byte to the current line.
    Keep,
    /// Throw away the byte and everything collected so far.
    Drop,
    /// Append the byte, the line is complete.
    Complete,
}

fn is_hex(byte: u8) -> bool {
    HEX_DIGITS.contains(&byte)
}

fn skip(byte: u8) -> (LineState, Action) {
    if byte == b'\r' {
        (LineState::Skip1, Action::Drop)
    } else {
        (LineState::Skip, Action::Drop)
    }
}

fn payload(byte: u8) -> (LineState, Action) {
    if byte == b'*' {
        (LineState::Checksum, Action::Keep)
    } else {
        (LineState::Line, Action::Keep)
    }
}

/// The transition function of the line parser.
#[must_use]
pub fn step(state: LineState, byte: u8) -> (LineState, Action) {
    match state {
        LineState::Start if byte == b'$' => (LineState::Start1, Action::Keep),
        LineState::Start => skip(byte),
        LineState::Start1 if byte.is_ascii_uppercase() => (LineState::Start2, Action::Keep),
        LineState::Start2 if byte.is_ascii_uppercase() => (LineState::Start3, Action::Keep),
        LineState::Start3 if byte.is_ascii_uppercase() => (LineState::Line, Action::Keep),
        LineState::Start1 | LineState::Start2 | LineState::Start3 => skip(byte),
        LineState::Line => payload(byte),
        LineState::Checksum if is_hex(byte) => (LineState::Checksum1, Action::Keep),
        LineState::Checksum1 if is_hex(byte) => (LineState::Eol, Action::Keep),
        LineState::Eol if byte == b'\r' => (LineState::Eol1, Action::Keep),
        LineState::Eol1 if byte == b'\n' => (LineState::Start, Action::Complete),
        LineState::Checksum | LineState::Checksum1 | LineState::Eol | LineState::Eol1 => {
            payload(byte)
        }
        LineState::Skip => skip(byte),
        LineState::Skip1 => match byte {
            b'\n' => (LineState::Start, Action::Drop),
            b'\r' => (LineState::Skip1, Action::Drop),
            _ => (LineState::Skip, Action::Drop),
        },
    }
}

/// Reassembles checksum-validated lines from a byte stream.
#[derive(Debug, Default)]
pub struct LineParser {
    state: LineState,
    buffer: BytesMut,
}

impl LineParser {
    /// Creates a new line parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> LineState {
        self.state
    }

    /// Feeds one byte.
    ///
    /// Returns the payload once a line with a valid checksum is complete.
    /// Lines with a wrong checksum are silently dropped.
    pub fn push(&mut self, byte: u8) -> Option<Bytes> {
        let (next, action) = step(self.state, byte);
        self.state = next;

        match action {
            Action::Keep => {
                self.buffer.put_u8(byte);
                if self.buffer.len() > MAX_LINE_LEN {
                    tracing::debug!("line exceeds {} bytes, skipping", MAX_LINE_LEN);
                    self.buffer.clear();
                    self.state = LineState::Skip;
                }
                None
            }
            Action::Drop => {
                self.buffer.clear();
                None
            }
            Action::Complete => {
                self.buffer.put_u8(byte);
                let line = self.buffer.split().freeze();
                verify(line)
            }
        }
    }

    /// Feeds a slice, returning all completed payloads.
    pub fn push_slice(&mut self, data: &[u8]) -> Vec<Bytes> {
        data.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Discards any partial line.
    pub fn reset(&mut self) {
        self.state = LineState::Start;
        self.buffer.clear();
    }
}

/// Checks a complete `$...*HH\r\n` line and strips the framing.
fn verify(line: Bytes) -> Option<Bytes> {
    // `$`, `*`, two digits, CR, LF
    let len = line.len();
    debug_assert!(len >= 6 && line[0] == b'$' && &line[len - 2..] == b"\r\n");

    let received = [line[len - 4], line[len - 3]];
    let payload = line.slice(1..len - 5);
    let expected = checksum_hex(&payload);
    if received == expected {
        tracing::trace!("<< {:?}", String::from_utf8_lossy(&payload));
        Some(payload)
    } else {
        tracing::debug!(
            "checksum failed: {} != {}",
            String::from_utf8_lossy(&received),
            String::from_utf8_lossy(&expected)
        );
        None
    }
}
