// Integer decoding and encoding over in-memory byte spans

use crate::error::{Error, Result};

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

const MAX_UNSIGNED_WIDTH: usize = 8;
const MAX_SIGNED_WIDTH: usize = 4;

fn unit(synchsafe: bool) -> (u32, u64) {
    if synchsafe {
        (7, 0x7F)
    } else {
        (8, 0xFF)
    }
}

/// Decode an unsigned integer from the first `width` bytes of `span`.
///
/// In synchsafe mode every byte contributes only its low 7 bits. A span
/// shorter than `width` yields `0`; nothing past the span is ever read.
pub fn uint_from_bytes(span: &[u8], endian: Endian, width: usize, synchsafe: bool) -> Result<u64> {
    if width > MAX_UNSIGNED_WIDTH {
        return Err(Error::UnsupportedWidth { width, signed: false });
    }
    let Some(bytes) = span.get(..width) else {
        return Ok(0);
    };

    let (shift, mask) = unit(synchsafe);
    let fold = |acc: u64, byte: &u8| (acc << shift) | (u64::from(*byte) & mask);
    Ok(match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    })
}

/// Decode a two's-complement signed integer of 1 to 4 bytes.
pub fn sint_from_bytes(span: &[u8], endian: Endian, width: usize) -> Result<i64> {
    if width == 0 || width > MAX_SIGNED_WIDTH {
        return Err(Error::UnsupportedWidth { width, signed: true });
    }
    let raw = uint_from_bytes(span, endian, width, false)? as i64;
    let bits = width as u32 * 8;
    let sign_bit = 1i64 << (bits - 1);
    Ok(if raw & sign_bit != 0 { raw - (1i64 << bits) } else { raw })
}

/// General integer decoder.
///
/// `signed` and `synchsafe` are mutually exclusive. Unsigned values that do
/// not fit an `i64` (8-byte fields with the top bit set) are rejected; use
/// [`uint_from_bytes`] for those.
pub fn int_from_bytes(
    span: &[u8],
    endian: Endian,
    width: usize,
    signed: bool,
    synchsafe: bool,
) -> Result<i64> {
    match (signed, synchsafe) {
        (true, true) => Err(Error::SignedSynchsafe),
        (true, false) => sint_from_bytes(span, endian, width),
        (false, _) => {
            let value = uint_from_bytes(span, endian, width, synchsafe)?;
            i64::try_from(value).map_err(|_| Error::ValueOutOfRange {
                value: value.into(),
                width,
            })
        }
    }
}

/// Encode an unsigned integer into exactly `width` bytes.
pub fn uint_to_bytes(value: u64, endian: Endian, width: usize, synchsafe: bool) -> Result<Vec<u8>> {
    if width > MAX_UNSIGNED_WIDTH {
        return Err(Error::UnsupportedWidth { width, signed: false });
    }
    let (shift, mask) = unit(synchsafe);
    let capacity = shift * width as u32;
    if capacity < 64 && value >> capacity != 0 {
        return Err(Error::ValueOutOfRange {
            value: value.into(),
            width,
        });
    }

    let mut out: Vec<u8> = (0..width as u32)
        .map(|i| ((value >> (shift * i)) & mask) as u8)
        .collect();
    if endian == Endian::Big {
        out.reverse();
    }
    Ok(out)
}

/// Encode a two's-complement signed integer into 1 to 4 bytes.
pub fn sint_to_bytes(value: i64, endian: Endian, width: usize) -> Result<Vec<u8>> {
    if width == 0 || width > MAX_SIGNED_WIDTH {
        return Err(Error::UnsupportedWidth { width, signed: true });
    }
    let bits = width as u32 * 8;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    if value < min || value > max {
        return Err(Error::ValueOutOfRange {
            value: value.into(),
            width,
        });
    }
    let raw = (value as u64) & ((1u64 << bits) - 1);
    uint_to_bytes(raw, endian, width, false)
}

/// Inverse of [`int_from_bytes`].
pub fn int_to_bytes(
    value: i64,
    endian: Endian,
    width: usize,
    signed: bool,
    synchsafe: bool,
) -> Result<Vec<u8>> {
    match (signed, synchsafe) {
        (true, true) => Err(Error::SignedSynchsafe),
        (true, false) => sint_to_bytes(value, endian, width),
        (false, _) if value < 0 => Err(Error::ValueOutOfRange {
            value: value.into(),
            width,
        }),
        (false, _) => uint_to_bytes(value as u64, endian, width, synchsafe),
    }
}

/// Big-endian unsigned field at `offset`; `0` when out of range.
pub fn be_uint(span: &[u8], offset: usize, width: usize) -> u64 {
    field(span, offset, width, Endian::Big)
}

/// Little-endian unsigned field at `offset`; `0` when out of range.
pub fn le_uint(span: &[u8], offset: usize, width: usize) -> u64 {
    field(span, offset, width, Endian::Little)
}

fn field(span: &[u8], offset: usize, width: usize, endian: Endian) -> u64 {
    span.get(offset..)
        .and_then(|rest| uint_from_bytes(rest, endian, width.min(MAX_UNSIGNED_WIDTH), false).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_big_and_little_endian() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(uint_from_bytes(&data, Endian::Big, 4, false).unwrap(), 0x1234_5678);
        assert_eq!(uint_from_bytes(&data, Endian::Little, 4, false).unwrap(), 0x7856_3412);
        assert_eq!(uint_from_bytes(&data, Endian::Big, 3, false).unwrap(), 0x12_3456);
    }

    #[test]
    fn test_synchsafe() {
        // ID3v2 size field: 0x00 0x00 0x02 0x01 -> 257
        let data = [0x00, 0x00, 0x02, 0x01];
        assert_eq!(uint_from_bytes(&data, Endian::Big, 4, true).unwrap(), 257);
        // High bits are ignored
        let data = [0x80, 0x80, 0x82, 0x81];
        assert_eq!(uint_from_bytes(&data, Endian::Big, 4, true).unwrap(), 257);
        assert_eq!(uint_to_bytes(257, Endian::Big, 4, true).unwrap(), vec![0, 0, 2, 1]);
    }

    #[test]
    fn test_signed_synchsafe_rejected() {
        assert!(matches!(
            int_from_bytes(&[0, 0], Endian::Big, 2, true, true),
            Err(Error::SignedSynchsafe)
        ));
    }

    #[test]
    fn test_signed_width_limits() {
        assert!(matches!(
            sint_from_bytes(&[0; 8], Endian::Big, 5),
            Err(Error::UnsupportedWidth { width: 5, signed: true })
        ));
        assert!(matches!(
            uint_from_bytes(&[0; 16], Endian::Big, 9, false),
            Err(Error::UnsupportedWidth { width: 9, signed: false })
        ));
    }

    #[test]
    fn test_signed_values() {
        assert_eq!(sint_from_bytes(&[0xFF], Endian::Big, 1).unwrap(), -1);
        assert_eq!(sint_from_bytes(&[0x80, 0x00], Endian::Big, 2).unwrap(), -32768);
        assert_eq!(sint_from_bytes(&[0xFF, 0x7F], Endian::Little, 2).unwrap(), 32767);
        assert_eq!(sint_from_bytes(&[0xFF, 0xFF, 0xFF], Endian::Big, 3).unwrap(), -1);
    }

    #[test]
    fn test_truncated_span_returns_zero() {
        assert_eq!(uint_from_bytes(&[0xFF, 0xFF], Endian::Big, 4, false).unwrap(), 0);
        assert_eq!(sint_from_bytes(&[0xFF], Endian::Big, 2).unwrap(), 0);
        assert_eq!(be_uint(&[1, 2, 3], 2, 4), 0);
    }

    #[test]
    fn test_field_helpers() {
        let data = [0xAA, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(be_uint(&data, 1, 2), 0x0102);
        assert_eq!(le_uint(&data, 1, 4), 0x0403_0201);
    }

    #[test]
    fn test_edge_values_roundtrip() {
        for width in 1..=4usize {
            let bits = width as u32 * 8;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            for value in [0, 1, -1, min, max] {
                let encoded = int_to_bytes(value, Endian::Big, width, true, false).unwrap();
                assert_eq!(int_from_bytes(&encoded, Endian::Big, width, true, false).unwrap(), value);
            }
            let umax = (1i64 << bits) - 1;
            for value in [0, 1, umax] {
                let encoded = int_to_bytes(value, Endian::Little, width, false, false).unwrap();
                assert_eq!(int_from_bytes(&encoded, Endian::Little, width, false, false).unwrap(), value);
            }
        }
    }

    #[test]
    fn test_out_of_range_encode() {
        assert!(uint_to_bytes(256, Endian::Big, 1, false).is_err());
        assert!(uint_to_bytes(128, Endian::Big, 1, true).is_err());
        assert!(sint_to_bytes(128, Endian::Big, 1).is_err());
        assert!(int_to_bytes(-1, Endian::Big, 2, false, false).is_err());
    }

    fn width_and_signed_value() -> impl Strategy<Value = (usize, i64)> {
        (1usize..=4).prop_flat_map(|width| {
            let bits = width as u32 * 8;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            (Just(width), min..=max)
        })
    }

    fn width_and_unsigned_value() -> impl Strategy<Value = (usize, u64)> {
        (1usize..=4).prop_flat_map(|width| {
            let max = (1u64 << (width as u32 * 8)) - 1;
            (Just(width), 0..=max)
        })
    }

    proptest! {
        #[test]
        fn prop_signed_roundtrip((width, value) in width_and_signed_value(), big in any::<bool>()) {
            let endian = if big { Endian::Big } else { Endian::Little };
            let encoded = sint_to_bytes(value, endian, width).unwrap();
            prop_assert_eq!(encoded.len(), width);
            prop_assert_eq!(sint_from_bytes(&encoded, endian, width).unwrap(), value);
        }

        #[test]
        fn prop_unsigned_roundtrip((width, value) in width_and_unsigned_value(), big in any::<bool>()) {
            let endian = if big { Endian::Big } else { Endian::Little };
            let encoded = uint_to_bytes(value, endian, width, false).unwrap();
            prop_assert_eq!(uint_from_bytes(&encoded, endian, width, false).unwrap(), value);
        }

        #[test]
        fn prop_synchsafe_roundtrip(value in 0u64..(1 << 28)) {
            let encoded = uint_to_bytes(value, Endian::Big, 4, true).unwrap();
            prop_assert!(encoded.iter().all(|b| b & 0x80 == 0));
            prop_assert_eq!(uint_from_bytes(&encoded, Endian::Big, 4, true).unwrap(), value);
        }
    }
}
