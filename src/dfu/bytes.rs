//! Bounds-checked readers shared by the binary codecs.

use super::error::{DfuError, DfuResult};

fn window(data: &[u8], offset: usize, needed: usize) -> DfuResult<&[u8]> {
    offset
        .checked_add(needed)
        .and_then(|end| data.get(offset..end))
        .ok_or(DfuError::TruncatedInput {
            offset,
            needed,
            available: data.len(),
        })
}

/// Read a big-endian `u32` at `offset`.
pub fn read_u32_be(data: &[u8], offset: usize) -> DfuResult<u32> {
    let bytes = window(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a little-endian `u32` at `offset`.
pub fn read_u32_le(data: &[u8], offset: usize) -> DfuResult<u32> {
    let bytes = window(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a little-endian `u16` at `offset`.
pub fn read_u16_le(data: &[u8], offset: usize) -> DfuResult<u16> {
    let bytes = window(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a fixed-width field holding a null-terminated string.
///
/// The whole field must be present; the string stops at the first null
/// byte or at `max_len`.
pub fn read_fixed_string(data: &[u8], offset: usize, max_len: usize) -> DfuResult<String> {
    let field = window(data, offset, max_len)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    Ok(latin1_decode(&field[..end]))
}

/// Read a null-terminated string of at most `max_len` characters.
///
/// Returns the string and the number of bytes it occupied, terminator
/// included (`max_len + 1` when no terminator was found).
pub fn read_c_string(data: &[u8], offset: usize, max_len: usize) -> DfuResult<(String, usize)> {
    let available = data.len().saturating_sub(offset).min(max_len);
    let field = window(data, offset, available)?;
    match field.iter().position(|&b| b == 0) {
        Some(end) => Ok((latin1_decode(&field[..end]), end + 1)),
        None if available == max_len => Ok((latin1_decode(field), max_len + 1)),
        None => Err(DfuError::TruncatedInput {
            offset,
            needed: available + 1,
            available: data.len(),
        }),
    }
}

/// Decode bytes one character per byte.
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text for the device.
///
/// Text that fits Latin-1 is written one byte per character so that
/// decoded records re-encode to identical bytes. Anything else is written
/// as UTF-8.
pub fn encode_text(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) <= 0xFF) {
        text.chars().map(|c| c as u8).collect()
    } else {
        text.as_bytes().to_vec()
    }
}
