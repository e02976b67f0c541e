// IEEE-754 floating point values from raw bit patterns

use super::int::{uint_from_bytes, uint_to_bytes, Endian};
use crate::error::Result;

/// Supported floating point encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    /// 32-bit single precision
    Single,
    /// 64-bit double precision
    Double,
    /// 80-bit x87 extended precision (explicit integer bit), as used by AIFF
    Extended,
}

impl FloatWidth {
    pub fn byte_len(self) -> usize {
        match self {
            FloatWidth::Single => 4,
            FloatWidth::Double => 8,
            FloatWidth::Extended => 10,
        }
    }
}

const EXTENDED_BIAS: i32 = 16383;

/// Decode a float from the first bytes of `span`.
///
/// Zero, subnormal, infinite and NaN encodings all follow IEEE-754. A span
/// shorter than the width yields `0.0`.
pub fn float_from_bytes(span: &[u8], endian: Endian, width: FloatWidth) -> f64 {
    let Some(bytes) = span.get(..width.byte_len()) else {
        return 0.0;
    };
    match width {
        FloatWidth::Single => {
            let raw = uint_from_bytes(bytes, endian, 4, false).unwrap_or(0) as u32;
            f64::from(f32::from_bits(raw))
        }
        FloatWidth::Double => f64::from_bits(uint_from_bytes(bytes, endian, 8, false).unwrap_or(0)),
        FloatWidth::Extended => {
            let mut raw = [0u8; 10];
            raw.copy_from_slice(bytes);
            if endian == Endian::Little {
                raw.reverse();
            }
            extended_from_be(&raw)
        }
    }
}

fn extended_from_be(raw: &[u8; 10]) -> f64 {
    let negative = raw[0] & 0x80 != 0;
    let exponent = (i32::from(raw[0] & 0x7F) << 8) | i32::from(raw[1]);
    let mantissa = uint_from_bytes(&raw[2..], Endian::Big, 8, false).unwrap_or(0);

    let magnitude = if exponent == 0x7FFF {
        // Integer bit is ignored for the special values
        if mantissa << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else if mantissa == 0 {
        0.0
    } else {
        let exponent = if exponent == 0 { 1 } else { exponent };
        // mantissa carries 63 fractional bits after the integer bit
        (mantissa as f64) * pow2(-63) * pow2(exponent - EXTENDED_BIAS)
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Exact power of two, saturating to infinity or zero outside the f64 range.
fn pow2(exponent: i32) -> f64 {
    match exponent {
        e if e > 1023 => f64::INFINITY,
        e if e >= -1022 => f64::from_bits(((e + 1023) as u64) << 52),
        e if e >= -1074 => f64::from_bits(1u64 << (e + 1074)),
        _ => 0.0,
    }
}

/// Encode `value` into the requested float width.
pub fn float_to_bytes(value: f64, endian: Endian, width: FloatWidth) -> Result<Vec<u8>> {
    match width {
        FloatWidth::Single => uint_to_bytes(u64::from((value as f32).to_bits()), endian, 4, false),
        FloatWidth::Double => uint_to_bytes(value.to_bits(), endian, 8, false),
        FloatWidth::Extended => {
            let mut raw = extended_to_be(value);
            if endian == Endian::Little {
                raw.reverse();
            }
            Ok(raw.to_vec())
        }
    }
}

fn extended_to_be(value: f64) -> [u8; 10] {
    let sign: u16 = if value.is_sign_negative() { 0x8000 } else { 0 };
    let (exponent, mantissa): (u16, u64) = if value.is_nan() {
        (0x7FFF, 0xC000_0000_0000_0000)
    } else if value.is_infinite() {
        (0x7FFF, 0x8000_0000_0000_0000)
    } else if value == 0.0 {
        (0, 0)
    } else {
        let bits = value.to_bits();
        let biased = ((bits >> 52) & 0x7FF) as i32;
        let fraction = bits & 0x000F_FFFF_FFFF_FFFF;
        if biased == 0 {
            // f64 subnormal: normalise so the integer bit is set
            let shift = fraction.leading_zeros();
            let exponent = 63 - 1074 - shift as i32 + EXTENDED_BIAS;
            (exponent as u16, fraction << shift)
        } else {
            let exponent = biased - 1023 + EXTENDED_BIAS;
            (exponent as u16, (1 << 63) | (fraction << 11))
        }
    };

    let mut out = [0u8; 10];
    out[..2].copy_from_slice(&(sign | exponent).to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}
