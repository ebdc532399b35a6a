//! Serialized access to the output stream.

use std::io::Write;

use bgapi_protocol::BgapiCommand;
use log::trace;
use parking_lot::Mutex;

use crate::error::TransportError;

/// Writes whole command frames, one caller at a time.
///
/// Frames from concurrent callers never interleave: each frame is written
/// and flushed while the lock is held.
pub struct FrameWriter {
    output: Mutex<Box<dyn Write + Send>>,
}

impl FrameWriter {
    pub fn new<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Serialize and write one command. Returns the number of bytes written.
    ///
    /// A command that does not fit in one frame fails with
    /// `TransportError::Protocol` before anything reaches the output.
    pub fn write_command(&self, command: &BgapiCommand) -> Result<usize, TransportError> {
        let frame = command.serialize()?;
        let mut output = self.output.lock();
        output.write_all(&frame)?;
        output.flush()?;
        trace!("TX {} [{}]", command.key(), hex(&frame));
        Ok(frame.len())
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
