// Ogg page checksum
//
// CRC-32 with polynomial 0x04C11DB7, zero initial value, no reflection and
// no final xor. Computed over the whole page with the checksum field zeroed.

const POLYNOMIAL: u32 = 0x04C1_1DB7;

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = make_table();

/// Continue a checksum over `data`
pub fn update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &byte| {
        (crc << 8) ^ CRC_TABLE[usize::from((crc >> 24) as u8 ^ byte)]
    })
}

pub fn crc32(data: &[u8]) -> u32 {
    update(0, data)
}

/// Checksum of a page given its raw header (segment table included) and payload
pub fn page_checksum(header: &[u8], payload: &[u8]) -> u32 {
    let mut crc = 0;
    for (index, &byte) in header.iter().enumerate() {
        let byte = if (22..26).contains(&index) { 0 } else { byte };
        crc = update(crc, &[byte]);
    }
    update(crc, payload)
}
