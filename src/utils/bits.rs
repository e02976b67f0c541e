// Bit strings for packed sub-byte fields
//
// Callers slice the string at the bit offsets of their own fields; nothing
// here knows about field layouts.

/// Render `span` as a string of `'0'`/`'1'`, most significant bit first.
pub fn bits_from_bytes(span: &[u8]) -> String {
    span.iter().map(|byte| format!("{byte:08b}")).collect()
}

/// Parse a bit string into an integer.
///
/// With `signed` the leading bit is a two's-complement sign bit. Empty
/// strings, strings longer than 64 bits and strings containing anything but
/// `0`/`1` yield `0`.
pub fn bits_to_int(bits: &str, signed: bool) -> i64 {
    let len = bits.len();
    if len == 0 || len > 64 {
        return 0;
    }
    let Ok(value) = u64::from_str_radix(bits, 2) else {
        return 0;
    };
    // from_str_radix accepts a leading '+'
    if bits.starts_with('+') {
        return 0;
    }

    let negative = signed && bits.starts_with('1');
    match (negative, len) {
        (true, 64) => value as i64,
        (true, _) => value as i64 - (1i64 << len),
        (false, _) => i64::try_from(value).unwrap_or(0),
    }
}
