//! EVT 3.0 raw format: word layout, decoder and RAW file header.

pub mod decoder;
pub mod header;
pub mod word;

pub use decoder::{Evt3Decoder, RAW_EVENT_SIZE_BYTES};
pub use header::RawFileHeader;
