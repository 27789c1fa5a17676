//! Pacing of file replay against the wall clock.
//!
//! A file poll may return a very large range. It is split into sub-buffers
//! about the size of a live camera buffer, and after each one the pump
//! sleeps until the wall clock has advanced as much as the decoded
//! timestamps have.

use crate::types::Timestamp;
use std::time::{Duration, Instant};

/// Raw events per sub-buffer at 1x speed.
pub(crate) const EVENTS_PER_SUB_BUFFER: usize = 1024;

/// Lower bound on the sub-buffer size.
pub(crate) const MIN_EVENTS_PER_SUB_BUFFER: usize = 128;

/// Bytes handed to the decoder at a time for a given raw event size.
pub(crate) fn sub_buffer_bytes(raw_event_size_bytes: usize) -> usize {
    MIN_EVENTS_PER_SUB_BUFFER.max(raw_event_size_bytes * EVENTS_PER_SUB_BUFFER)
}

/// Maps decoded timestamps 1:1 onto wall-clock microseconds.
#[derive(Debug)]
pub(crate) struct RealTimeEmulator {
    first_decoded_timestamp: Timestamp,
    first_wallclock: Option<Instant>,
}

impl RealTimeEmulator {
    /// `initial_timestamp` is the decoder's timestamp when the replay run begins.
    pub(crate) fn new(initial_timestamp: Timestamp) -> Self {
        Self {
            first_decoded_timestamp: initial_timestamp,
            first_wallclock: None,
        }
    }

    /// How long to sleep after a sub-buffer that left the decoder at
    /// `decoded`, observed at `now`. `None` when already late.
    ///
    /// The anchor is taken on the first call where the decoded timestamp
    /// differs from the initial one, not on the first call.
    pub(crate) fn delay(&mut self, decoded: Timestamp, now: Instant) -> Option<Duration> {
        if self.first_wallclock.is_none() && decoded != self.first_decoded_timestamp {
            self.first_wallclock = Some(now);
            self.first_decoded_timestamp = decoded;
        }

        let anchor = self.first_wallclock?;
        let progress = decoded.saturating_sub(self.first_decoded_timestamp);
        let expected = anchor + Duration::from_micros(progress);
        expected
            .checked_duration_since(now)
            .filter(|d| !d.is_zero())
    }
}
