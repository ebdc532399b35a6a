//! Byte-at-a-time frame extraction with resynchronization.
//!
//! The serial link has no delimiters and no checksums, so the only way to
//! find a frame boundary is to validate each header byte against the
//! positional masks in [`HEADER_CHECK_MASKS`](crate::types::HEADER_CHECK_MASKS).
//! A byte failing its mask, or a complete header announcing an oversized
//! frame, makes the reader slide its window forward one byte at a time
//! until the bytes it still holds form a valid header prefix again. Only
//! leading bytes are ever dropped, so a frame that starts inside a
//! rejected header is still found.

use bytes::Bytes;
use log::{debug, trace};

use crate::error::ProtocolError;
use crate::types::{FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE};

/// Where the reader is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Fewer than four header bytes collected.
    SeekHeader,
    /// Header validated, frame length known, no payload byte yet.
    HeaderComplete,
    /// Collecting payload bytes.
    Accumulating,
}

/// Outcome of pushing one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// More bytes are needed.
    Pending,
    /// A complete frame, header included.
    Frame(Bytes),
    /// Leading bytes of a rejected header were dropped.
    Resync {
        discarded: usize,
        error: ProtocolError,
    },
}

/// Frame resynchronizer. One per connection.
#[derive(Debug)]
pub struct FrameReader {
    buf: [u8; MAX_FRAME_SIZE],
    count: usize,
    frame_len: usize,
    frames: u64,
    resyncs: u64,
    discarded: u64,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_FRAME_SIZE],
            count: 0,
            frame_len: 0,
            frames: 0,
            resyncs: 0,
            discarded: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        if self.count < HEADER_SIZE {
            FrameState::SeekHeader
        } else if self.count == HEADER_SIZE {
            FrameState::HeaderComplete
        } else {
            FrameState::Accumulating
        }
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.count = 0;
        self.frame_len = 0;
    }

    /// Complete frames produced so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of times a partial header was dropped.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Total bytes dropped while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn push(&mut self, byte: u8) -> FrameStatus {
        if self.count < HEADER_SIZE {
            return self.push_header(byte);
        }

        self.buf[self.count] = byte;
        self.count += 1;
        if self.count == self.frame_len {
            return self.complete();
        }
        FrameStatus::Pending
    }

    fn push_header(&mut self, byte: u8) -> FrameStatus {
        self.buf[self.count] = byte;
        self.count += 1;
        match self.check_header() {
            Ok(status) => status,
            Err(error) => {
                let discarded = self.slide();
                self.resync(discarded, error)
            }
        }
    }

    /// Validate the byte just added. The bytes before it already form a
    /// valid header prefix.
    fn check_header(&mut self) -> Result<FrameStatus, ProtocolError> {
        let position = self.count - 1;
        FrameHeader::check_byte(position, self.buf[position])?;
        if self.count < HEADER_SIZE {
            return Ok(FrameStatus::Pending);
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&self.buf[..HEADER_SIZE]);
        let parsed = FrameHeader::parse(&header)?;
        self.frame_len = parsed.frame_len();
        trace!("Header {}: frame length {}", parsed.key, self.frame_len);
        if self.frame_len == HEADER_SIZE {
            return Ok(self.complete());
        }
        Ok(FrameStatus::Pending)
    }

    /// Drop leading bytes until the rest is a valid header prefix.
    /// Returns how many were dropped.
    fn slide(&mut self) -> usize {
        let mut dropped = 0;
        loop {
            self.buf.copy_within(1..self.count, 0);
            self.count -= 1;
            dropped += 1;
            let valid = (0..self.count).all(|i| FrameHeader::check_byte(i, self.buf[i]).is_ok());
            if valid {
                return dropped;
            }
        }
    }

    fn resync(&mut self, discarded: usize, error: ProtocolError) -> FrameStatus {
        self.resyncs += 1;
        self.discarded += discarded as u64;
        debug!("Resynchronizing after {}: dropped {} bytes", error, discarded);
        FrameStatus::Resync { discarded, error }
    }

    fn complete(&mut self) -> FrameStatus {
        let frame = Bytes::copy_from_slice(&self.buf[..self.frame_len]);
        self.frames += 1;
        self.reset();
        FrameStatus::Frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frames_of(reader: &mut FrameReader, bytes: &[u8]) -> Vec<Bytes> {
        bytes
            .iter()
            .filter_map(|b| match reader.push(*b) {
                FrameStatus::Frame(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_frame_states() {
        let mut reader = FrameReader::new();
        assert_eq!(reader.state(), FrameState::SeekHeader);
        for b in [0x00, 0x02, 0x00] {
            assert_eq!(reader.push(b), FrameStatus::Pending);
            assert_eq!(reader.state(), FrameState::SeekHeader);
        }
        assert_eq!(reader.push(0x00), FrameStatus::Pending);
        assert_eq!(reader.state(), FrameState::HeaderComplete);
        assert_eq!(reader.push(0xAA), FrameStatus::Pending);
        assert_eq!(reader.state(), FrameState::Accumulating);
        assert_eq!(
            reader.push(0xBB),
            FrameStatus::Frame(Bytes::from_static(&[0x00, 0x02, 0x00, 0x00, 0xAA, 0xBB]))
        );
        assert_eq!(reader.state(), FrameState::SeekHeader);
        assert_eq!(reader.frames(), 1);
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut reader = FrameReader::new();
        let frames = frames_of(&mut reader, &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(frames, vec![Bytes::from_static(&[0x00, 0x00, 0x00, 0x01])]);
    }

    #[test]
    fn test_frame_then_bad_header() {
        let mut reader = FrameReader::new();
        let input = [0x00, 0x02, 0x00, 0x00, 0xAA, 0xBB, 0x00, 0xFF];
        let mut statuses: Vec<FrameStatus> = input.iter().map(|b| reader.push(*b)).collect();

        let last = statuses.pop().unwrap();
        assert_eq!(
            last,
            FrameStatus::Resync {
                discarded: 2,
                error: ProtocolError::HeaderCheck {
                    position: 1,
                    value: 0xFF
                },
            }
        );
        assert_eq!(
            statuses[5],
            FrameStatus::Frame(Bytes::from_static(&[0x00, 0x02, 0x00, 0x00, 0xAA, 0xBB]))
        );
        assert_eq!(reader.state(), FrameState::SeekHeader);
        assert_eq!(reader.resyncs(), 1);
        assert_eq!(reader.discarded(), 2);
    }

    #[test]
    fn test_failing_byte_restarts_header() {
        let mut reader = FrameReader::new();
        // 0x80 fails at position 1 but is a valid event flag byte.
        let input = [0x00, 0x80, 0x00, 0x06, 0x00];
        let frames = frames_of(&mut reader, &input);
        assert_eq!(frames, vec![Bytes::from_static(&[0x80, 0x00, 0x06, 0x00])]);
        assert_eq!(reader.discarded(), 1);
    }

    #[test]
    fn test_oversized_frame_resyncs() {
        let mut reader = FrameReader::new();
        let status = [0x00, 0x7F, 0x00, 0x00]
            .iter()
            .map(|b| reader.push(*b))
            .last()
            .unwrap();
        // 0x7F cannot start a header; the trailing 00 00 are kept.
        assert!(matches!(
            status,
            FrameStatus::Resync {
                discarded: 2,
                error: ProtocolError::FrameTooLarge(131, MAX_FRAME_SIZE)
            }
        ));
        assert_eq!(reader.state(), FrameState::SeekHeader);
        let frames = frames_of(&mut reader, &[0x80, 0x00, 0x00, 0x00]);
        assert_eq!(frames, vec![Bytes::from_static(&[0x80, 0x00, 0x00, 0x00])]);
    }

    #[test]
    fn test_frame_inside_oversized_header() {
        let mut reader = FrameReader::new();
        // 01 passes the byte 0 mask but announces a 256 byte payload.
        let input = [0x01, 0x00, 0x02, 0x00, 0x00, 0xAA, 0xBB];
        let statuses: Vec<FrameStatus> = input.iter().map(|b| reader.push(*b)).collect();
        assert_eq!(
            statuses[3],
            FrameStatus::Resync {
                discarded: 1,
                error: ProtocolError::FrameTooLarge(260, MAX_FRAME_SIZE),
            }
        );
        assert_eq!(
            statuses[6],
            FrameStatus::Frame(Bytes::from_static(&[0x00, 0x02, 0x00, 0x00, 0xAA, 0xBB]))
        );
        assert_eq!(reader.resyncs(), 1);
        assert_eq!(reader.discarded(), 1);
    }

    #[test]
    fn test_slide_reports_one_resync() {
        let mut reader = FrameReader::new();
        // 00 00 then 80: the window slides over both zeros at once.
        for b in [0x00, 0x00] {
            assert_eq!(reader.push(b), FrameStatus::Pending);
        }
        assert_eq!(
            reader.push(0x80),
            FrameStatus::Resync {
                discarded: 2,
                error: ProtocolError::HeaderCheck {
                    position: 2,
                    value: 0x80
                },
            }
        );
        assert_eq!(reader.resyncs(), 1);
        let frames = frames_of(&mut reader, &[0x00, 0x00, 0x00]);
        assert_eq!(frames, vec![Bytes::from_static(&[0x80, 0x00, 0x00, 0x00])]);
    }

    #[test]
    fn test_maximum_frame() {
        let mut reader = FrameReader::new();
        let mut input = vec![0x80, (MAX_FRAME_SIZE - HEADER_SIZE) as u8, 0x04, 0x05];
        input.extend(std::iter::repeat(0x5A).take(MAX_FRAME_SIZE - HEADER_SIZE));
        let frames = frames_of(&mut reader, &input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MAX_FRAME_SIZE);
    }

    fn bad_first_byte() -> impl Strategy<Value = u8> {
        any::<u8>().prop_filter("must fail the byte 0 mask", |b| {
            FrameHeader::check_byte(0, *b).is_err()
        })
    }

    proptest! {
        #[test]
        fn corruption_prefix_never_hides_next_frame(
            prefix in proptest::collection::vec(bad_first_byte(), 0..32),
            payload in proptest::collection::vec(any::<u8>(), 0..=(MAX_FRAME_SIZE - HEADER_SIZE)),
            class in 0u8..8,
            method in 0u8..32,
            event in any::<bool>(),
        ) {
            let flags = if event { 0x80 } else { 0x00 };
            let mut frame = vec![flags, payload.len() as u8, class, method];
            frame.extend_from_slice(&payload);

            let mut input = prefix.clone();
            input.extend_from_slice(&frame);

            let mut reader = FrameReader::new();
            let frames = frames_of(&mut reader, &input);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0][..], &frame[..]);
            prop_assert_eq!(reader.discarded(), prefix.len() as u64);
        }

        #[test]
        fn oversized_header_never_hides_next_frame(
            lead in 1u8..8,
            lead_event in any::<bool>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=(MAX_FRAME_SIZE - HEADER_SIZE)),
            class in 0u8..8,
            method in 0u8..32,
            event in any::<bool>(),
        ) {
            // Passes the byte 0 mask, but any header it starts is oversized.
            let lead = if lead_event { lead | 0x80 } else { lead };
            let flags = if event { 0x80 } else { 0x00 };
            let mut frame = vec![flags, payload.len() as u8, class, method];
            frame.extend_from_slice(&payload);

            let mut input = vec![lead];
            input.extend_from_slice(&frame);

            let mut reader = FrameReader::new();
            let frames = frames_of(&mut reader, &input);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0][..], &frame[..]);
            prop_assert_eq!(reader.discarded(), 1);
        }

        #[test]
        fn arbitrary_bytes_never_panic(input in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut reader = FrameReader::new();
            let frames = frames_of(&mut reader, &input);
            let framed: usize = frames.iter().map(|f| f.len()).sum();
            for frame in &frames {
                prop_assert!(frame.len() >= HEADER_SIZE && frame.len() <= MAX_FRAME_SIZE);
            }
            prop_assert!(framed as u64 + reader.discarded() <= input.len() as u64);
        }
    }
}
