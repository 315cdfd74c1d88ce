//! Cell link tokens.
//!
//! A token packs a board id and a cell coordinate into three bytes
//! (`id << 8 | x << 4 | y`, big endian) and prints them as four characters of
//! URL-safe base64, so a token always fits in a single path segment.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use thiserror::Error;

pub const TOKEN_LEN: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token must be {TOKEN_LEN} characters, got {0}")]
    WrongLength(usize),
    #[error("token is not valid base64")]
    InvalidEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub board_id: u16,
    pub x: u8,
    pub y: u8,
}

/// Encodes a board id and cell coordinate. Coordinates must be below 16; only
/// their low nibble is kept.
pub fn encode(board_id: u16, x: u8, y: u8) -> String {
    debug_assert!(x < 16 && y < 16, "coordinate ({x}, {y}) does not fit a nibble");
    let packed = (board_id as u32) << 8 | ((x & 0xF) as u32) << 4 | (y & 0xF) as u32;
    let bytes = packed.to_be_bytes();
    URL_SAFE_NO_PAD.encode(&bytes[1..])
}

pub fn decode(token: &str) -> Result<CellRef, TokenError> {
    if token.len() != TOKEN_LEN {
        return Err(TokenError::WrongLength(token.len()));
    }

    let mut bytes = [0u8; 3];
    let written = URL_SAFE_NO_PAD
        .decode_slice(token, &mut bytes)
        .map_err(|_| TokenError::InvalidEncoding)?;
    if written != bytes.len() {
        return Err(TokenError::InvalidEncoding);
    }

    let packed = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
    Ok(CellRef {
        board_id: (packed >> 8) as u16,
        x: ((packed >> 4) & 0xF) as u8,
        y: (packed & 0xF) as u8,
    })
}
