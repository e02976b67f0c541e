// SEEKTABLE block

use serde::Serialize;

use crate::utils::be_uint;

pub const SEEKPOINT_LEN: usize = 18;

/// Sample number marking an unused seek point
pub const PLACEHOLDER: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeekPoint {
    pub sample_number: u64,
    /// Byte offset from the first frame header
    pub offset: u64,
    pub samples: u16,
}

/// Seek table with placeholder points counted separately
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
    pub placeholders: usize,
    /// Bytes left over after the last whole seek point
    #[serde(skip_serializing_if = "is_zero")]
    pub trailing_bytes: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl SeekTable {
    pub fn parse(data: &[u8]) -> Self {
        let mut table = SeekTable {
            trailing_bytes: data.len() % SEEKPOINT_LEN,
            ..Default::default()
        };
        for chunk in data.chunks_exact(SEEKPOINT_LEN) {
            let sample_number = be_uint(chunk, 0, 8);
            if sample_number == PLACEHOLDER {
                table.placeholders += 1;
                continue;
            }
            table.points.push(SeekPoint {
                sample_number,
                offset: be_uint(chunk, 8, 8),
                samples: be_uint(chunk, 16, 2) as u16,
            });
        }
        table
    }

    /// Number of points that are not placeholders
    pub fn real_entries(&self) -> usize {
        self.points.len()
    }

    pub fn total_entries(&self) -> usize {
        self.points.len() + self.placeholders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(sample: u64, offset: u64, samples: u16) -> Vec<u8> {
        let mut out = sample.to_be_bytes().to_vec();
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&samples.to_be_bytes());
        out
    }

    #[test]
    fn test_placeholders_interleaved() {
        let mut data = point(0, 0, 4096);
        data.extend(point(PLACEHOLDER, 0, 0));
        data.extend(point(44100, 8000, 4096));
        data.extend(point(PLACEHOLDER, 0, 0));
        let table = SeekTable::parse(&data);
        assert_eq!(table.placeholders, 2);
        assert_eq!(table.real_entries(), 2);
        assert_eq!(table.total_entries(), 4);
        assert_eq!(table.points[1], SeekPoint { sample_number: 44100, offset: 8000, samples: 4096 });
    }

    #[test]
    fn test_trailing_partial_point() {
        let mut data = point(1, 2, 3);
        data.extend_from_slice(&[0xFF; 5]);
        let table = SeekTable::parse(&data);
        assert_eq!(table.real_entries(), 1);
        assert_eq!(table.trailing_bytes, 5);
    }
}
