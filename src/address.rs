//! Signer address parsing and EIP-55 normalization

use alloy::primitives::Address;

use crate::error::{DocError, Result};

const ADDRESS_HEX_LEN: usize = 40;

/// Parse a user-supplied address and return it in canonical form.
///
/// Accepts all-lowercase or all-uppercase hex with or without the `0x`
/// prefix. Mixed-case input is treated as an EIP-55 checksum and must
/// match it.
pub fn normalize(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if body.len() != ADDRESS_HEX_LEN || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DocError::Validation(format!(
            "invalid signer address: '{}'",
            trimmed
        )));
    }

    let bytes = hex::decode(body)
        .map_err(|e| DocError::Validation(format!("invalid signer address: {}", e)))?;
    let address = Address::from_slice(&bytes);

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && &checksum(&address)[2..] != body {
        return Err(DocError::Validation(format!(
            "bad address checksum: '{}'",
            trimmed
        )));
    }

    Ok(address)
}

/// Canonical EIP-55 string form.
pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Normalize and render in one step: `normalize(normalize(a)) == normalize(a)`.
pub fn normalize_str(input: &str) -> Result<String> {
    normalize(input).map(|a| checksum(&a))
}

/// Addresses are not case-sensitive identifiers; compare the lowercase
/// hex of both sides.
pub fn same_address(a: &Address, b: &Address) -> bool {
    hex::encode(a.as_slice()) == hex::encode(b.as_slice())
}
