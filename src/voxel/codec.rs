//! Binary primitives shared by the compact encodings.
//!
//! Integers use LEB128-style varints (7 bits per byte, high bit set on every
//! byte but the last). Signed values are zigzag-mapped first.

use std::io::{self, Read, Write};

/// Longest accepted string in a compact stream.
pub const MAX_STRING_LEN: usize = 32 * 1024;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub fn write_var_u64(writer: &mut impl Write, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            writer.write_all(&[byte])?;
            return Ok(());
        }
        writer.write_all(&[byte | 0x80])?;
    }
}

pub fn read_var_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut result = 0u64;
    let mut buf = [0u8; 1];
    for shift in (0..64).step_by(7) {
        reader.read_exact(&mut buf)?;
        let byte = buf[0];
        let bits = (byte & 0x7F) as u64;
        if shift == 63 && bits > 1 {
            return Err(invalid("varint overflows u64"));
        }
        result |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(invalid("varint too long"))
}

pub fn write_var_u32(writer: &mut impl Write, value: u32) -> io::Result<()> {
    write_var_u64(writer, value as u64)
}

pub fn read_var_u32(reader: &mut impl Read) -> io::Result<u32> {
    let value = read_var_u64(reader)?;
    u32::try_from(value).map_err(|_| invalid(format!("varint {} overflows u32", value)))
}

pub fn write_var_i64(writer: &mut impl Write, value: i64) -> io::Result<()> {
    write_var_u64(writer, ((value << 1) ^ (value >> 63)) as u64)
}

pub fn read_var_i64(reader: &mut impl Read) -> io::Result<i64> {
    let raw = read_var_u64(reader)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

/// Read a length prefix and reject anything above `max`.
pub fn read_len(reader: &mut impl Read, max: usize) -> io::Result<usize> {
    let len = read_var_u64(reader)?;
    if len > max as u64 {
        return Err(invalid(format!("length {} exceeds limit {}", len, max)));
    }
    Ok(len as usize)
}

pub fn write_string(writer: &mut impl Write, value: &str) -> io::Result<()> {
    write_var_u64(writer, value.len() as u64)?;
    writer.write_all(value.as_bytes())
}

pub fn read_string(reader: &mut impl Read) -> io::Result<String> {
    let len = read_len(reader, MAX_STRING_LEN)?;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))
}

pub fn write_u8(writer: &mut impl Write, value: u8) -> io::Result<()> {
    writer.write_all(&[value])
}

pub fn read_u8(reader: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u64(writer: &mut impl Write, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_varint_small_values_use_one_byte() {
        let mut buf = Vec::new();
        write_var_u32(&mut buf, 0).unwrap();
        write_var_u32(&mut buf, 127).unwrap();
        assert_eq!(buf, vec![0, 127]);

        buf.clear();
        write_var_u32(&mut buf, 128).unwrap();
        assert_eq!(buf, vec![0x80, 0x01]);
    }

    #[test]
    fn test_varint_extremes() {
        let mut buf = Vec::new();
        write_var_u64(&mut buf, u64::MAX).unwrap();
        write_var_i64(&mut buf, i64::MIN).unwrap();
        write_var_i64(&mut buf, -1).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_var_u64(&mut cursor).unwrap(), u64::MAX);
        assert_eq!(read_var_i64(&mut cursor).unwrap(), i64::MIN);
        assert_eq!(read_var_i64(&mut cursor).unwrap(), -1);
    }

    #[test]
    fn test_u32_overflow_rejected() {
        let mut buf = Vec::new();
        write_var_u64(&mut buf, u32::MAX as u64 + 1).unwrap();
        let err = read_var_u32(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_unterminated_varint_is_eof() {
        let err = read_var_u64(&mut Cursor::new(vec![0x80, 0x80])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_string_rejected() {
        let mut buf = Vec::new();
        write_var_u64(&mut buf, (MAX_STRING_LEN + 1) as u64).unwrap();
        assert!(read_string(&mut Cursor::new(buf)).is_err());
    }
}
