//! Stellar strkey encoding (`G...` accounts, `C...` contracts).

use stellar_strkey::{ed25519, Contract, Strkey};

use crate::error::{DecodeError, Result};

/// Kind of identity a strkey carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrkeyKind {
    /// Ed25519 account public key.
    Account,
    /// Contract id.
    Contract,
}

/// Encode a 32-byte payload as a strkey.
pub fn encode(kind: StrkeyKind, payload: &[u8; 32]) -> String {
    match kind {
        StrkeyKind::Account => ed25519::PublicKey(*payload).to_string(),
        StrkeyKind::Contract => Contract(*payload).to_string(),
    }
}

/// Decode a strkey into its kind and payload, verifying the checksum.
///
/// Only account and contract strkeys are accepted.
pub fn decode(input: &str) -> Result<(StrkeyKind, [u8; 32])> {
    match Strkey::from_string(input) {
        Ok(Strkey::PublicKeyEd25519(ed25519::PublicKey(key))) => Ok((StrkeyKind::Account, key)),
        Ok(Strkey::Contract(Contract(id))) => Ok((StrkeyKind::Contract, id)),
        Ok(_) => Err(DecodeError::malformed(format!(
            "strkey '{}' is neither an account nor a contract",
            input
        ))),
        Err(e) => Err(DecodeError::malformed(format!("invalid strkey: {}", e))),
    }
}
