// STREAMINFO block

use serde::Serialize;

use crate::error::{Error, Result};
use crate::utils::{be_uint, bits_from_bytes, bits_to_int};

pub const STREAMINFO_LEN: usize = 34;

/// Decoded STREAMINFO block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// 0 when the encoder did not know the length
    pub total_samples: u64,
    /// MD5 of the decoded audio as lowercase hex, `None` when left unset
    pub md5: Option<String>,
}

impl StreamInfo {
    /// Parse the 34-byte block payload
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < STREAMINFO_LEN {
            return Err(Error::truncated("STREAMINFO block", STREAMINFO_LEN, data.len()));
        }

        // 20 bits sample rate, 3 bits channels-1, 5 bits bps-1, 36 bits total samples
        let packed = bits_from_bytes(&data[10..18]);
        let sample_rate = bits_to_int(&packed[0..20], false) as u32;
        let channels = bits_to_int(&packed[20..23], false) as u8 + 1;
        let bits_per_sample = bits_to_int(&packed[23..28], false) as u8 + 1;
        let total_samples = bits_to_int(&packed[28..64], false) as u64;

        let signature = &data[18..34];
        let md5 = signature
            .iter()
            .any(|&b| b != 0)
            .then(|| signature.iter().map(|b| format!("{b:02x}")).collect());

        Ok(StreamInfo {
            min_block_size: be_uint(data, 0, 2) as u16,
            max_block_size: be_uint(data, 2, 2) as u16,
            min_frame_size: be_uint(data, 4, 3) as u32,
            max_frame_size: be_uint(data, 7, 3) as u32,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5,
        })
    }

    /// Duration in seconds, when both the rate and the sample count are known
    pub fn duration(&self) -> Option<f64> {
        (self.sample_rate > 0 && self.total_samples > 0)
            .then(|| self.total_samples as f64 / f64::from(self.sample_rate))
    }
}
