//! Decoding of Solidity revert payloads.
//!
//! Two standard shapes are understood: `Error(string)` raised by
//! `require`/`revert("...")`, and `Panic(uint256)` raised by failed asserts
//! and arithmetic checks.

use alloy_sol_types::{Panic, Revert, SolError};

/// Decode a raw revert payload into a message.
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    if let Ok(revert) = Revert::abi_decode(data) {
        return Some(revert.reason);
    }
    let panic = Panic::abi_decode(data).ok()?;
    Some(match u64::try_from(panic.code) {
        Ok(code) => format!("panic code {:#04x}: {}", code, panic_description(code)),
        Err(_) => format!("panic code {}: unknown panic", panic.code),
    })
}

/// Decode a `0x`-prefixed hex revert payload.
pub fn decode_revert_hex(data: &str) -> Option<String> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(digits).ok()?;
    decode_revert_data(&bytes)
}

fn panic_description(code: u64) -> &'static str {
    match code {
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum value",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to uninitialized function",
        _ => "unknown panic",
    }
}
