//! Wire protocol of the RGM-3800 logger.
//!
//! - Line framing and checksums
//! - Request payloads
//! - Reply parsing

pub mod command;
pub mod frame;
pub mod parser;

pub use command::Command;
pub use frame::{LineParser, LineState, MAX_LINE_LEN, checksum, encode as encode_line};
pub use parser::{WaypointChunk, parse_waypoint_chunk};
