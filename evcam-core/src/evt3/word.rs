#![allow(clippy::unusual_byte_groupings)]
//! Field access on EVT 3.0 raw 16-bit words.
//!
//! Every word carries a 4-bit type in bits [15:12] and a 12-bit payload.

/// EVT 3.0 raw event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RawEventType {
    /// Y coordinate and system type
    AddrY = 0x0,
    /// Single event with X coordinate and polarity
    AddrX = 0x2,
    /// Base X coordinate for subsequent vector events
    VectBaseX = 0x3,
    /// Vector event with 12 validity bits
    Vect12 = 0x4,
    /// Vector event with 8 validity bits
    Vect8 = 0x5,
    /// Lower 12 bits of timestamp
    TimeLow = 0x6,
    Continued4 = 0x7,
    /// Upper 12 bits of timestamp
    TimeHigh = 0x8,
    /// External trigger edge
    ExtTrigger = 0xA,
    Others = 0xE,
    Continued12 = 0xF,
}

impl RawEventType {
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x0 => Self::AddrY,
            0x2 => Self::AddrX,
            0x3 => Self::VectBaseX,
            0x4 => Self::Vect12,
            0x5 => Self::Vect8,
            0x6 => Self::TimeLow,
            0x7 => Self::Continued4,
            0x8 => Self::TimeHigh,
            0xA => Self::ExtTrigger,
            0xE => Self::Others,
            0xF => Self::Continued12,
            _ => return None,
        })
    }
}

/// One little-endian EVT 3.0 word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawWord(pub u16);

impl RawWord {
    #[inline]
    pub fn type_bits(self) -> u8 {
        (self.0 >> 12) as u8
    }

    /// `None` for reserved types.
    #[inline]
    pub fn kind(self) -> Option<RawEventType> {
        RawEventType::from_u8(self.type_bits())
    }

    /// 11-bit coordinate of ADDR_Y, ADDR_X and VECT_BASE_X words.
    #[inline]
    pub fn coord(self) -> u16 {
        self.0 & 0x07FF
    }

    /// Bit 11 of ADDR_X and VECT_BASE_X words (system type for ADDR_Y).
    #[inline]
    pub fn polarity(self) -> u8 {
        ((self.0 >> 11) & 0x1) as u8
    }

    #[inline]
    pub fn valid_12(self) -> u32 {
        u32::from(self.0 & 0x0FFF)
    }

    #[inline]
    pub fn valid_8(self) -> u32 {
        u32::from(self.0 & 0x00FF)
    }

    /// 12-bit time field of TIME_LOW and TIME_HIGH words.
    #[inline]
    pub fn time(self) -> u64 {
        u64::from(self.0 & 0x0FFF)
    }

    #[inline]
    pub fn trigger_id(self) -> u8 {
        ((self.0 >> 8) & 0x0F) as u8
    }

    #[inline]
    pub fn trigger_value(self) -> u8 {
        (self.0 & 0x01) as u8
    }
}
