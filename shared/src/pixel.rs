//! BGRX8 pixel codec.
//!
//! Pixels are four bytes in memory order `B, G, R, X`. Packed into a `u32`
//! they are little-endian, so the same value reads back correctly through a
//! byte view of a `&[u32]` buffer. Consumers must ignore the `X` byte.

/// Pack an RGB color into a BGRX8 pixel value (`X` = 0xFF).
pub const fn pack_bgrx(r: u8, g: u8, b: u8) -> u32 {
    u32::from_le_bytes([b, g, r, 0xFF])
}

/// Unpack a BGRX8 pixel value into `(r, g, b)`.
pub const fn unpack_bgrx(pixel: u32) -> (u8, u8, u8) {
    let [b, g, r, _] = pixel.to_le_bytes();
    (r, g, b)
}

/// Decode the pixel starting at `bytes[0]`.
///
/// Returns `None` if fewer than four bytes are available.
pub fn decode_bgrx(bytes: &[u8]) -> Option<(u8, u8, u8)> {
    match bytes {
        [b, g, r, _, ..] => Some((*r, *g, *b)),
        _ => None,
    }
}
