//! Scripted device used by the tests.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::protocol::frame::encode;
use crate::transport::Transport;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug)]
enum Step {
    Expect(Bytes),
    Provide(Bytes),
    Wait(Duration),
}

/// Plays back a fixed conversation on the device side of a pipe.
///
/// The script fails if the host sends anything other than the expected
/// lines, or hangs up before the script ran to the end.
#[derive(Debug, Default)]
pub(crate) struct MockDevice {
    steps: Vec<Step>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Expects the host to send one framed line with this payload.
    pub(crate) fn expect(self, payload: &str) -> Self {
        self.expect_raw(&encode(payload.as_bytes()))
    }

    /// Expects these exact bytes from the host.
    pub(crate) fn expect_raw(mut self, data: &[u8]) -> Self {
        self.steps.push(Step::Expect(Bytes::copy_from_slice(data)));
        self
    }

    /// Sends one framed line with this payload.
    pub(crate) fn provide(self, payload: &[u8]) -> Self {
        self.provide_raw(&encode(payload))
    }

    /// Sends these exact bytes.
    pub(crate) fn provide_raw(mut self, data: &[u8]) -> Self {
        self.steps.push(Step::Provide(Bytes::copy_from_slice(data)));
        self
    }

    /// Stays silent for a while.
    pub(crate) fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Wait(duration));
        self
    }

    /// Starts the device and returns the host side transport.
    ///
    /// The handle resolves once the host closed the transport.
    pub(crate) fn start(self) -> (Transport, JoinHandle<Result<(), String>>) {
        let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
        let handle = tokio::spawn(self.run(device));
        (Transport::new(host), handle)
    }

    async fn run(self, mut device: DuplexStream) -> Result<(), String> {
        for (i, step) in self.steps.into_iter().enumerate() {
            match step {
                Step::Expect(expected) => {
                    let mut buf = vec![0u8; expected.len()];
                    if let Err(e) = device.read_exact(&mut buf).await {
                        return Err(format!("step {i}: host hung up before {expected:?}: {e}"));
                    }
                    if buf != expected {
                        return Err(format!(
                            "step {i}: expected {expected:?}, got {:?}",
                            Bytes::from(buf)
                        ));
                    }
                }
                Step::Provide(data) => device
                    .write_all(&data)
                    .await
                    .map_err(|e| format!("step {i}: write failed: {e}"))?,
                Step::Wait(duration) => tokio::time::sleep(duration).await,
            }
        }

        let mut rest = Vec::new();
        device
            .read_to_end(&mut rest)
            .await
            .map_err(|e| format!("read after script failed: {e}"))?;
        if rest.is_empty() {
            Ok(())
        } else {
            Err(format!("unexpected bytes after script: {:?}", Bytes::from(rest)))
        }
    }
}

/// Raw format 0 record logged at 10:00:`second`.
pub(crate) fn position_record(fix: u8, second: u8, latitude: f32, longitude: f32) -> Vec<u8> {
    let mut record = vec![fix, 10, 0, second];
    record.extend_from_slice(&latitude.to_le_bytes());
    record.extend_from_slice(&longitude.to_le_bytes());
    record
}

/// Payload of one `LOG102` reply line carrying the given records.
pub(crate) fn waypoint_reply(part: u16, records: &[Vec<u8>]) -> Vec<u8> {
    let data = records.concat();
    let mut line = b"LOG102,".to_vec();
    line.extend_from_slice(&part.to_le_bytes());
    line.push(data.len() as u8);
    line.extend_from_slice(&data);
    line
}

/// Routes `tracing` output of the library to the test harness.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
