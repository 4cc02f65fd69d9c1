// Big-endian field access for host buffers; every read is bounds-checked.
use crate::core::error::{Error, ErrorKind};

pub const BLANK: u8 = b' ';

pub fn read_bytes(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    let end = offset.checked_add(len).ok_or_else(|| overrun(offset))?;
    buf.get(offset..end).ok_or_else(|| overrun(offset))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, Error> {
    Ok(u32::from_be_bytes(read_4(buf, offset)?))
}

pub fn read_i32(buf: &[u8], offset: usize) -> Result<i32, Error> {
    Ok(i32::from_be_bytes(read_4(buf, offset)?))
}

pub fn read_i64(buf: &[u8], offset: usize) -> Result<i64, Error> {
    let mut out = [0u8; 8];
    out.copy_from_slice(read_bytes(buf, offset, 8)?);
    Ok(i64::from_be_bytes(out))
}

/// Offsets and counts are unsigned on the wire; widen them for indexing.
pub fn read_offset(buf: &[u8], offset: usize) -> Result<usize, Error> {
    Ok(read_u32(buf, offset)? as usize)
}

pub fn read_4(buf: &[u8], offset: usize) -> Result<[u8; 4], Error> {
    let mut out = [0u8; 4];
    out.copy_from_slice(read_bytes(buf, offset, 4)?);
    Ok(out)
}

/// Reads a blank-padded character field and drops the padding.
pub fn read_text(buf: &[u8], offset: usize, len: usize) -> Result<String, Error> {
    let raw = read_bytes(buf, offset, len)?;
    Ok(text_from_bytes(raw))
}

pub fn text_from_bytes(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Writes `text` blank-padded (or truncated) to exactly `width` bytes.
pub fn write_text(buf: &mut [u8], offset: usize, width: usize, text: &str) {
    buf[offset..offset + width].copy_from_slice(&padded(text, width));
}

pub fn padded(text: &str, width: usize) -> Vec<u8> {
    let mut out = vec![BLANK; width];
    let bytes = text.as_bytes();
    let len = bytes.len().min(width);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

pub fn to_u32(value: usize) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| {
        Error::new(ErrorKind::Internal).with_message(format!("length {value} exceeds 4-byte field"))
    })
}

fn overrun(offset: usize) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message("read past end of host buffer")
        .with_offset(offset)
}
