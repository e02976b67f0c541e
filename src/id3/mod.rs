// ID3 tags around the data region
//
// A leading ID3v2 tag and a trailing ID3v1 tag are found before format
// detection; both are excluded from the data region handed to the format
// handler.
pub mod frames;
pub mod v1;
pub mod v2;

pub use v1::{Id3v1Tag, ID3V1_TAG_LEN};
pub use v2::{Id3v2Header, Id3v2Tag, ID3V2_HEADER_LEN};
