//! Payload codecs
//!
//! The 16-bit payload of a frame is interpreted differently per data id. All
//! of the decoders here are total: every payload decodes to some value.

use crate::boiler::HvacState;

/// High byte as `u8`
#[inline]
pub const fn u8_high(payload: u16) -> u8 {
    (payload >> 8) as u8
}

/// Low byte as `u8`
#[inline]
pub const fn u8_low(payload: u16) -> u8 {
    payload as u8
}

/// High byte as two's complement `s8`
#[inline]
pub const fn s8_high(payload: u16) -> i8 {
    u8_high(payload) as i8
}

/// Low byte as two's complement `s8`
#[inline]
pub const fn s8_low(payload: u16) -> i8 {
    u8_low(payload) as i8
}

/// The payload as `u16`
#[inline]
pub const fn u16(payload: u16) -> u16 {
    payload
}

/// The payload as two's complement `s16`
#[inline]
pub const fn s16(payload: u16) -> i16 {
    payload as i16
}

/// Combine two bytes into a payload
#[inline]
pub const fn from_u8_pair(high: u8, low: u8) -> u16 {
    ((high as u16) << 8) | (low as u16)
}

/// Decode signed fixed point with 8 integer and 8 fractional bits
///
/// `0x0100` is `1.0`, `0xFF00` is `-1.0`, `0x0080` is `0.5`.
pub fn f88_decode(payload: u16) -> f32 {
    if payload & 0x8000 != 0 {
        -((0x1_0000 - payload as u32) as f32) / 256.0
    } else {
        payload as f32 / 256.0
    }
}

/// Encode signed fixed point with 8 integer and 8 fractional bits
///
/// The scaled value is truncated toward zero and wrapped to 16 bits.
pub fn f88_encode(value: f32) -> u16 {
    (value * 256.0) as i32 as u16
}

/// A decoded payload value, as handed to a [Sink][crate::poller::Sink]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Value {
    /// A single flag bit
    Bool(bool),
    /// Any of the integer encodings
    Int(i32),
    /// f8.8 fixed point
    Float(f32),
    /// Heating and hot water state, derived from the slave status
    Hvac(HvacState),
}

/// Which byte of the payload a byte-wide codec reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Byte {
    /// Bits 15..8
    High,
    /// Bits 7..0
    Low,
}

/// The encoding of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum Codec {
    /// One byte, unsigned
    U8(Byte),
    /// One byte, signed
    S8(Byte),
    /// All 16 bits, unsigned
    U16,
    /// All 16 bits, signed
    S16,
    /// Fixed point 8.8
    F88,
    /// A single bit of one byte, e.g. the flame flag of the status response
    Flag {
        /// Byte holding the flag
        byte: Byte,
        /// Bit index within the byte, `0..=7`
        bit: u8,
    },
}

impl Codec {
    /// Decode a payload
    pub fn decode(self, payload: u16) -> Value {
        match self {
            Codec::U8(Byte::High) => Value::Int(u8_high(payload).into()),
            Codec::U8(Byte::Low) => Value::Int(u8_low(payload).into()),
            Codec::S8(Byte::High) => Value::Int(s8_high(payload).into()),
            Codec::S8(Byte::Low) => Value::Int(s8_low(payload).into()),
            Codec::U16 => Value::Int(u16(payload).into()),
            Codec::S16 => Value::Int(s16(payload).into()),
            Codec::F88 => Value::Float(f88_decode(payload)),
            Codec::Flag { byte, bit } => {
                let b = match byte {
                    Byte::High => u8_high(payload),
                    Byte::Low => u8_low(payload),
                };
                Value::Bool(b & (1 << (bit & 0b111)) != 0)
            }
        }
    }

    /// Encode a value for a write request
    ///
    /// Byte-wide codecs place the value in their byte and leave the other byte
    /// zero. Values are converted the way `as` casts do, so out-of-range values
    /// wrap instead of failing.
    pub fn encode(self, value: Value) -> u16 {
        let int = match value {
            Value::Bool(b) => b as i32,
            Value::Int(i) => i,
            Value::Float(f) => f as i32,
            // Derived state, there is nothing to write
            Value::Hvac(_) => 0,
        };
        match self {
            Codec::U8(Byte::High) | Codec::S8(Byte::High) => from_u8_pair(int as u8, 0),
            Codec::U8(Byte::Low) | Codec::S8(Byte::Low) => from_u8_pair(0, int as u8),
            Codec::U16 | Codec::S16 => int as u16,
            Codec::F88 => match value {
                Value::Float(f) => f88_encode(f),
                _ => f88_encode(int as f32),
            },
            Codec::Flag { byte, bit } => {
                let b = if int != 0 { 1u8 << (bit & 0b111) } else { 0 };
                match byte {
                    Byte::High => from_u8_pair(b, 0),
                    Byte::Low => from_u8_pair(0, b),
                }
            }
        }
    }
}
