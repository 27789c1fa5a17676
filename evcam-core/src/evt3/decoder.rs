//! Stateful EVT 3.0 decoder.
//!
//! Tracks timestamp, coordinates and polarity across words so that a raw
//! stream may be fed in arbitrarily sized pieces.

use super::word::{RawEventType, RawWord};
use crate::facility::{Decoder, EventSink};
use crate::types::{CdEvent, Timestamp, TriggerEvent};
use byteorder::{ByteOrder, LittleEndian};

const MAX_TIMESTAMP_BASE: u64 = ((1u64 << 12) - 1) << 12; // 16773120us
const TIME_LOOP: u64 = MAX_TIMESTAMP_BASE + (1 << 12); // 16777216us
const LOOP_THRESHOLD: u64 = 10 << 12;

/// Size of one EVT 3.0 word.
pub const RAW_EVENT_SIZE_BYTES: usize = 2;

#[derive(Debug, Default)]
pub struct Evt3Decoder {
    time_base: u64,
    current_time: u64,
    n_time_high_loops: u64,
    first_time_base_set: bool,

    current_y: u16,
    current_base_x: u16,
    current_polarity: u8,

    // low byte of a word split across two decode calls
    pending_byte: Option<u8>,

    words: Vec<u16>,
    cd_events: Vec<CdEvent>,
    trigger_events: Vec<TriggerEvent>,
}

impl Evt3Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets all stream state, as if nothing had been decoded.
    pub fn reset(&mut self) {
        *self = Self {
            words: std::mem::take(&mut self.words),
            cd_events: std::mem::take(&mut self.cd_events),
            trigger_events: std::mem::take(&mut self.trigger_events),
            ..Self::default()
        };
    }

    /// Decodes 16-bit words, appending events to the output vectors.
    ///
    /// Words preceding the first TIME_HIGH of the stream are skipped since
    /// their timestamps cannot be reconstructed.
    pub fn decode_words(
        &mut self,
        words: &[u16],
        cd_events: &mut Vec<CdEvent>,
        trigger_events: &mut Vec<TriggerEvent>,
    ) {
        let mut iter = words.iter().map(|&w| RawWord(w));

        if !self.first_time_base_set {
            for word in iter.by_ref() {
                if word.kind() == Some(RawEventType::TimeHigh) {
                    self.time_base = word.time() << 12;
                    self.current_time = self.time_base;
                    self.first_time_base_set = true;
                    break;
                }
            }
        }

        for word in iter {
            match word.kind() {
                Some(RawEventType::AddrX) => cd_events.push(CdEvent::new(
                    word.coord(),
                    self.current_y,
                    word.polarity(),
                    self.current_time,
                )),
                Some(RawEventType::Vect12) => self.push_vector(word.valid_12(), 12, cd_events),
                Some(RawEventType::Vect8) => self.push_vector(word.valid_8(), 8, cd_events),
                Some(RawEventType::AddrY) => self.current_y = word.coord(),
                Some(RawEventType::VectBaseX) => {
                    self.current_base_x = word.coord();
                    self.current_polarity = word.polarity();
                }
                Some(RawEventType::TimeHigh) => self.advance_time_high(word),
                Some(RawEventType::TimeLow) => {
                    self.current_time = self.time_base + word.time();
                }
                Some(RawEventType::ExtTrigger) => trigger_events.push(TriggerEvent::new(
                    word.trigger_value(),
                    word.trigger_id(),
                    self.current_time,
                )),
                // continued and extension words carry no CD or trigger data
                Some(RawEventType::Continued4)
                | Some(RawEventType::Continued12)
                | Some(RawEventType::Others)
                | None => {}
            }
        }
    }

    /// Applies a TIME_HIGH word, detecting the 24-bit counter wrapping around.
    #[inline]
    fn advance_time_high(&mut self, word: RawWord) {
        let mut new_time_base = (word.time() << 12) + self.n_time_high_loops * TIME_LOOP;

        if self.time_base > new_time_base
            && (self.time_base - new_time_base) >= (MAX_TIMESTAMP_BASE - LOOP_THRESHOLD)
        {
            new_time_base += TIME_LOOP;
            self.n_time_high_loops += 1;
        }

        self.time_base = new_time_base;
        self.current_time = self.time_base;
    }

    #[inline]
    fn push_vector(&mut self, mut valid: u32, count: u16, cd_events: &mut Vec<CdEvent>) {
        let end_x = self.current_base_x.saturating_add(count);

        for x in self.current_base_x..end_x {
            if valid & 0x1 != 0 {
                cd_events.push(CdEvent::new(
                    x,
                    self.current_y,
                    self.current_polarity,
                    self.current_time,
                ));
            }
            valid >>= 1;
        }

        self.current_base_x = end_x;
    }

    /// Converts `raw` to words, carrying an odd trailing byte to the next call.
    fn fill_words(&mut self, mut raw: &[u8]) {
        self.words.clear();

        if let Some(low) = self.pending_byte.take() {
            match raw.split_first() {
                Some((&high, rest)) => {
                    self.words.push(u16::from_le_bytes([low, high]));
                    raw = rest;
                }
                None => self.pending_byte = Some(low),
            }
        }

        let even = raw.len() & !1;
        let start = self.words.len();
        self.words.resize(start + even / RAW_EVENT_SIZE_BYTES, 0);
        LittleEndian::read_u16_into(&raw[..even], &mut self.words[start..]);

        if even < raw.len() {
            self.pending_byte = Some(raw[even]);
        }
    }
}

impl Decoder for Evt3Decoder {
    fn decode(&mut self, raw: &[u8], sink: &mut dyn EventSink) {
        self.fill_words(raw);

        let words = std::mem::take(&mut self.words);
        let mut cd_events = std::mem::take(&mut self.cd_events);
        let mut trigger_events = std::mem::take(&mut self.trigger_events);

        self.decode_words(&words, &mut cd_events, &mut trigger_events);

        if !cd_events.is_empty() {
            sink.on_cd_events(&cd_events);
        }
        if !trigger_events.is_empty() {
            sink.on_trigger_events(&trigger_events);
        }

        cd_events.clear();
        trigger_events.clear();
        self.words = words;
        self.cd_events = cd_events;
        self.trigger_events = trigger_events;
    }

    fn last_timestamp(&self) -> Timestamp {
        self.current_time
    }

    fn raw_event_size_bytes(&self) -> usize {
        RAW_EVENT_SIZE_BYTES
    }
}
