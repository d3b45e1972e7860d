//! Decoding of intake characteristic notifications.
//!
//! The bottle notifies a 4-byte little-endian unsigned integer holding the
//! cumulative milliliters since its own counter was last reset.

/// Payload length the bottle always sends
pub const PAYLOAD_LEN: usize = 4;

/// The notification was not exactly [`PAYLOAD_LEN`] bytes long
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed intake payload: expected 4 bytes, got {len}")]
pub struct MalformedPayload {
    pub len: usize,
}

/// Decode one notification into cumulative milliliters.
///
/// Any 32-bit value is accepted, including zero or a value below an earlier
/// reading (the bottle's counter may have been reset).
pub fn decode(payload: &[u8]) -> Result<u32, MalformedPayload> {
    let bytes: [u8; PAYLOAD_LEN] = payload
        .try_into()
        .map_err(|_| MalformedPayload { len: payload.len() })?;
    Ok(u32::from_le_bytes(bytes))
}
