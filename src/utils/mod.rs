// Primitive codec library shared by every format handler

pub mod bits;
pub mod encoding;
pub mod float;
pub mod int;
pub mod io;

pub use bits::{bits_from_bytes, bits_to_int};
pub use encoding::Charset;
pub use float::{float_from_bytes, float_to_bytes, FloatWidth};
pub use int::{
    be_uint, int_from_bytes, int_to_bytes, le_uint, sint_from_bytes, sint_to_bytes,
    uint_from_bytes, uint_to_bytes, Endian,
};
