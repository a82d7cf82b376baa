// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Secret token generation.
//!
//! Session and JWT signing secrets are 256 bits drawn from the operating
//! system's CSPRNG, hex encoded into 64 lowercase characters.

use rand::{rngs::OsRng, RngCore};

const TOKEN_BYTES: usize = 32;

/// Length of a hex encoded token.
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Generate fresh secret token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);

    hex::encode(bytes)
}

/// Check if string has the shape of a generated token.
pub fn is_token(candidate: &str) -> bool {
    candidate.len() == TOKEN_LEN
        && candidate
            .bytes()
            .all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
}
