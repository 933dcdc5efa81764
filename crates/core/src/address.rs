//! Address resolution: turn an `SCV_ADDRESS` into a canonical strkey.
//!
//! Resolution never fails for address-shaped input. The cascade is:
//! account key → contract id → raw bytes re-encoded as an account →
//! hashed pseudo-identity (`X` + hex SHA-256 of the raw bytes).
//!
//! The returned identity keeps strkey casing; consumers compare ids
//! case-insensitively and lowercase before using them as entity keys.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{DecodeError, Result};
use crate::strkey::{self, StrkeyKind};
use crate::wire::{ScAddress, WireValue};

/// Prefix of identities derived by hashing unrecognized address bytes.
pub const PSEUDO_IDENTITY_PREFIX: char = 'X';

/// Resolve an address-typed wire value.
///
/// Returns `MalformedPayload` when the value is not an address at all.
pub fn resolve(value: &WireValue) -> Result<String> {
    match value {
        WireValue::Address(addr) => Ok(resolve_address(addr)),
        other => Err(DecodeError::malformed(format!(
            "expected an address, found {}",
            other.sc_type()
        ))),
    }
}

/// Resolve an address payload. Never fails.
pub fn resolve_address(addr: &ScAddress) -> String {
    match addr {
        ScAddress::Account(key) => strkey::encode(StrkeyKind::Account, key),
        ScAddress::Contract(id) => strkey::encode(StrkeyKind::Contract, id),
        ScAddress::Encoded(text) => match strkey::decode(text) {
            Ok((kind, payload)) => strkey::encode(kind, &payload),
            Err(e) => {
                warn!(address = %text, error = %e, "Address text is not a valid strkey, hashing it");
                pseudo_identity(text.as_bytes())
            }
        },
        ScAddress::Raw(bytes) => match <[u8; 32]>::try_from(bytes.as_slice()) {
            Ok(key) => strkey::encode(StrkeyKind::Account, &key),
            Err(_) => {
                warn!(
                    len = bytes.len(),
                    "Address bytes have no strkey form, deriving pseudo-identity"
                );
                pseudo_identity(bytes)
            }
        },
    }
}

/// Deterministic identity for bytes that cannot be strkey-encoded.
pub fn pseudo_identity(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{}{}", PSEUDO_IDENTITY_PREFIX, hex::encode(digest))
}

/// Resolve and lowercase, producing the form used in entity ids.
pub fn resolve_id(value: &WireValue) -> Result<String> {
    resolve(value).map(|id| id.to_lowercase())
}
