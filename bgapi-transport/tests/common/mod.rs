//! In-memory serial link for handler tests.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bgapi_protocol::{BgapiCommand, BgapiEvent, BgapiPacket, BgapiResponse, FrameReader, FrameStatus, PacketRegistry};
use bgapi_transport::{BgapiHandler, HandlerConfig};
use bytes::Bytes;

const READ_TIMEOUT: Duration = Duration::from_millis(20);

enum Chunk {
    Data(u8),
    Error(io::ErrorKind),
}

/// Device-to-host half. Reads time out like a serial port with a read
/// timeout; dropping the `Device` ends the stream.
pub struct MockInput {
    rx: Receiver<Chunk>,
}

impl Read for MockInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.rx.recv_timeout(READ_TIMEOUT) {
            Ok(Chunk::Data(b)) => {
                buf[0] = b;
                Ok(1)
            }
            Ok(Chunk::Error(kind)) => Err(io::Error::new(kind, "injected")),
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout")),
            Err(RecvTimeoutError::Disconnected) => Ok(0),
        }
    }
}

/// Host-to-device half. Every write is forwarded to the `Device`.
pub struct MockOutput {
    tx: Sender<Vec<u8>>,
    fail: Arc<AtomicBool>,
}

impl Write for MockOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        let _ = self.tx.send(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The far end of the mock link.
pub struct Device {
    tx: Sender<Chunk>,
    written: Receiver<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
    framer: FrameReader,
    pending_frames: Vec<Bytes>,
}

impl Device {
    pub fn send_bytes(&self, bytes: &[u8]) {
        for b in bytes {
            let _ = self.tx.send(Chunk::Data(*b));
        }
    }

    pub fn send_response(&self, response: &BgapiResponse) {
        self.send_bytes(&response.serialize().unwrap());
    }

    pub fn send_event(&self, event: &BgapiEvent) {
        self.send_bytes(&event.serialize().unwrap());
    }

    pub fn inject_error(&self, kind: io::ErrorKind) {
        let _ = self.tx.send(Chunk::Error(kind));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Next complete frame written by the host.
    pub fn next_frame(&mut self, timeout: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.pending_frames.is_empty() {
                return Some(self.pending_frames.remove(0));
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let chunk = self.written.recv_timeout(remaining).ok()?;
            for b in chunk {
                if let FrameStatus::Frame(frame) = self.framer.push(b) {
                    self.pending_frames.push(frame);
                }
            }
        }
    }

    /// Next command written by the host, as its raw frame and decoded key.
    pub fn expect_command(&mut self, expected: &BgapiCommand) {
        let frame = self
            .next_frame(Duration::from_secs(2))
            .unwrap_or_else(|| panic!("no frame written for {:?}", expected));
        assert_eq!(frame, expected.serialize().unwrap(), "unexpected frame for {:?}", expected);
    }
}

pub fn link() -> (MockInput, MockOutput, Device) {
    let (tx, rx) = mpsc::channel();
    let (written_tx, written) = mpsc::channel();
    let fail = Arc::new(AtomicBool::new(false));
    (
        MockInput { rx },
        MockOutput {
            tx: written_tx,
            fail: Arc::clone(&fail),
        },
        Device {
            tx,
            written,
            fail_writes: fail,
            framer: FrameReader::new(),
            pending_frames: Vec::new(),
        },
    )
}

pub fn test_config() -> HandlerConfig {
    HandlerConfig {
        transaction_timeout: Some(Duration::from_secs(2)),
        close_timeout: Duration::from_millis(500),
        ..HandlerConfig::default()
    }
}

pub fn connect_with(registry: PacketRegistry, config: HandlerConfig) -> (BgapiHandler, Device) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (input, output, device) = link();
    let handler = BgapiHandler::connect(input, output, Arc::new(registry), config).unwrap();
    (handler, device)
}

pub fn connect() -> (BgapiHandler, Device) {
    connect_with(PacketRegistry::ble112(), test_config())
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn decode(frame: &[u8]) -> BgapiPacket {
    PacketRegistry::ble112().decode(frame).unwrap()
}
