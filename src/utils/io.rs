// Read helpers for fixed-layout fields over any reader

use std::io::{self, Read};

/// Read a single byte
pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buffer = [0u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

/// Read big-endian 32-bit integer
pub fn read_be_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

/// Read big-endian 64-bit integer
pub fn read_be_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_be_bytes(buffer))
}

/// Read little-endian 32-bit integer
pub fn read_le_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

/// Read exactly `len` bytes.
///
/// The buffer grows with the data actually read, so a bogus declared length
/// fails with `UnexpectedEof` instead of allocating it up front.
pub fn read_bytes<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.take(len as u64).read_to_end(&mut buffer)?;
    if buffer.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, got {}", buffer.len()),
        ));
    }
    Ok(buffer)
}

/// Read a string prefixed by its 32-bit big-endian byte length
pub fn read_be_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_be_u32(reader)? as usize;
    let bytes = read_bytes(reader, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a string prefixed by its 32-bit little-endian byte length
pub fn read_le_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_le_u32(reader)? as usize;
    let bytes = read_bytes(reader, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_fixed_reads() {
        let mut cursor = Cursor::new(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(read_u8(&mut cursor).unwrap(), 0x01);
        assert_eq!(read_be_u32(&mut cursor).unwrap(), 0x0203_0405);
        assert_eq!(read_le_u32(&mut cursor).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_bytes_short() {
        let mut cursor = Cursor::new(vec![1, 2, 3]);
        let err = read_bytes(&mut cursor, 1 << 30).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_length_prefixed_strings() {
        let mut data = 7u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"testenc");
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(b"ok");
        let mut cursor = Cursor::new(data);
        assert_eq!(read_le_string(&mut cursor).unwrap(), "testenc");
        assert_eq!(read_be_string(&mut cursor).unwrap(), "ok");
    }
}
