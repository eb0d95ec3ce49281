//! Conversions between chain-native types and their persisted encodings.
//!
//! Persisted byte-ish fields are lowercase `0x`-prefixed hex strings
//! (addresses length 42, hashes and topics length 66); 256-bit unsigned
//! integers travel through `NUMERIC(78, 0)` columns as [`BigDecimal`].
//! The helpers here are the single place those encodings are produced
//! and parsed.

use alloy::primitives::{Address, B64, B256, Bytes, U256};
use bigdecimal::BigDecimal;
use std::str::FromStr;

use crate::error::{DomainError, InfraError};

// ═══════════════════════════════════════════════════════════════════════════════
// HEX ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Render arbitrary bytes as a lowercase `0x`-prefixed hex string.
#[must_use]
pub fn hex_bytes(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes.as_ref()))
}

/// Render an address as 42-character lowercase hex.
///
/// `Address` displays checksummed; storage always uses lowercase.
#[must_use]
pub fn hex_address(address: &Address) -> String {
    hex_bytes(address.as_slice())
}

/// Render a 32-byte word as 66-character lowercase hex.
#[must_use]
pub fn hex_b256(word: &B256) -> String {
    hex_bytes(word.as_slice())
}

/// Render an 8-byte nonce as lowercase hex.
#[must_use]
pub fn hex_b64(word: &B64) -> String {
    hex_bytes(word.as_slice())
}

/// The derived log identifier handed to downstream consumers:
/// `{blockHash}-{hex(logIndex)}`, all lowercase, no leading zeros on the
/// index part.
#[must_use]
pub fn log_event_id(block_hash: &B256, log_index: u64) -> String {
    format!("{}-0x{log_index:x}", hex_b256(block_hash))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEX DECODING
// ═══════════════════════════════════════════════════════════════════════════════

fn decode_fixed<const N: usize>(s: &str, field: &'static str) -> Result<[u8; N], DomainError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let invalid = || DomainError::InvalidHex {
        field,
        value: s.to_owned(),
    };
    if stripped.len() != N * 2 {
        return Err(invalid());
    }
    let bytes = hex::decode(stripped).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

/// Parse a 42-character hex string into an address.
///
/// # Errors
/// Returns [`DomainError::InvalidHex`] on wrong length or bad digits.
pub fn parse_address(s: &str) -> Result<Address, DomainError> {
    decode_fixed::<20>(s, "address").map(Address::from)
}

/// Parse a 66-character hex string into a 32-byte word.
///
/// # Errors
/// Returns [`DomainError::InvalidHex`] on wrong length or bad digits.
pub fn parse_b256(s: &str) -> Result<B256, DomainError> {
    decode_fixed::<32>(s, "word").map(B256::from)
}

/// Parse an 8-byte hex string.
///
/// # Errors
/// Returns [`DomainError::InvalidHex`] on wrong length or bad digits.
pub fn parse_b64(s: &str) -> Result<B64, DomainError> {
    decode_fixed::<8>(s, "nonce").map(B64::from)
}

/// Parse a variable-length `0x`-prefixed hex string.
///
/// # Errors
/// Returns [`DomainError::InvalidHex`] on bad digits or odd length.
pub fn parse_bytes(s: &str) -> Result<Bytes, DomainError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|_| DomainError::InvalidHex {
            field: "bytes",
            value: s.to_owned(),
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NUMERIC ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Convert a 256-bit unsigned integer into a database numeric.
///
/// Goes through the decimal string form, which `U256` always renders
/// exactly.
#[must_use]
pub fn u256_to_numeric(value: U256) -> BigDecimal {
    // U256::to_string is always a valid decimal integer
    BigDecimal::from_str(&value.to_string()).unwrap_or_default()
}

/// Convert a `u64` (timestamps, indexes) into a database numeric.
#[must_use]
pub fn u64_to_numeric(value: u64) -> BigDecimal {
    BigDecimal::from(value)
}

/// Decode a database numeric back into a 256-bit unsigned integer.
///
/// # Errors
/// Returns [`InfraError::Internal`] if the column holds a fractional or
/// negative value, which only happens on a corrupt row.
pub fn numeric_to_u256(value: &BigDecimal) -> Result<U256, InfraError> {
    let rendered = value.with_scale(0).to_string();
    U256::from_str_radix(&rendered, 10)
        .map_err(|_| InfraError::Internal(format!("invalid numeric in DB: {value}")))
}

/// Decode a database numeric back into a `u64`.
///
/// # Errors
/// Returns [`InfraError::Internal`] if the value does not fit.
pub fn numeric_to_u64(value: &BigDecimal) -> Result<u64, InfraError> {
    value
        .with_scale(0)
        .to_string()
        .parse()
        .map_err(|_| InfraError::Internal(format!("invalid numeric in DB: {value}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
