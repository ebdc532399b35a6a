//! Link statistics.
//!
//! Counters are updated by the reader thread and the writer; `snapshot`
//! may be taken from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the handler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandlerStats {
    /// Complete frames pulled off the input stream.
    pub frames_received: u64,
    /// Partial headers dropped while resynchronizing.
    pub resyncs: u64,
    /// Bytes dropped while resynchronizing.
    pub bytes_discarded: u64,
    /// Frames that did not decode to a known packet.
    pub decode_failures: u64,
    /// Events handed to the dispatcher.
    pub events_dispatched: u64,
    /// Responses that completed a transaction.
    pub responses_matched: u64,
    /// Responses with no waiting transaction.
    pub responses_unmatched: u64,
    /// Command frames written.
    pub commands_written: u64,
    /// Event listener invocations that panicked.
    pub listener_panics: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub frames_received: AtomicU64,
    pub resyncs: AtomicU64,
    pub bytes_discarded: AtomicU64,
    pub decode_failures: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub responses_matched: AtomicU64,
    pub responses_unmatched: AtomicU64,
    pub commands_written: AtomicU64,
    pub listener_panics: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HandlerStats {
        HandlerStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            responses_unmatched: self.responses_unmatched.load(Ordering::Relaxed),
            commands_written: self.commands_written.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }
}
