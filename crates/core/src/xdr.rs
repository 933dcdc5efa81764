//! Binary XDR front-end for `ScVal`.
//!
//! Soroban RPC hands out event topics and values as base64 XDR. Parsing is
//! done by `stellar-xdr`; this module maps its `ScVal` tree onto
//! [`WireValue`] and back.

use stellar_xdr::curr::{
    self as stellar, AccountId, ClaimableBalanceId, ContractId, Hash, Int128Parts,
    Int256Parts, Limits, MuxedEd25519Account, PoolId, PublicKey, ReadXdr, ScBytes,
    ScError, ScErrorCode, ScErrorType, ScMap, ScMapEntry, ScString, ScSymbol, ScVal, ScVec,
    UInt128Parts, UInt256Parts, Uint256, WriteXdr,
};

use crate::error::{DecodeError, Result};
use crate::strkey::{self, StrkeyKind};
use crate::wire::{ScAddress, ScType, WireValue, MAX_DEPTH};

/// Depth budget handed to the XDR reader. Every `ScVal` level spends
/// several units, so this sits well above [`MAX_DEPTH`].
const XDR_DEPTH_LIMIT: u32 = 500;

fn read_limits(input_len: usize) -> Limits {
    Limits {
        depth: XDR_DEPTH_LIMIT,
        len: input_len,
    }
}

fn invalid(e: stellar::Error) -> DecodeError {
    DecodeError::malformed(format!("invalid XDR: {}", e))
}

/// Decode a base64-encoded `ScVal`.
pub fn from_base64(input: &str) -> Result<WireValue> {
    let input = input.trim();
    let val = ScVal::from_xdr_base64(input, read_limits(input.len())).map_err(invalid)?;
    from_sc_val(&val, 0)
}

/// Decode a single `ScVal` that must span the whole input.
pub fn from_bytes(bytes: &[u8]) -> Result<WireValue> {
    let val = ScVal::from_xdr(bytes, read_limits(bytes.len())).map_err(invalid)?;
    from_sc_val(&val, 0)
}

/// Encode a value to XDR bytes.
///
/// Fails for addresses that only exist as unresolved raw bytes, since they
/// have no wire representation.
pub fn to_bytes(value: &WireValue) -> Result<Vec<u8>> {
    to_sc_val(value)?.to_xdr(Limits::none()).map_err(invalid)
}

/// Encode a value to base64 XDR.
pub fn to_base64(value: &WireValue) -> Result<String> {
    to_sc_val(value)?
        .to_xdr_base64(Limits::none())
        .map_err(invalid)
}

fn from_sc_val(val: &ScVal, depth: usize) -> Result<WireValue> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::malformed("ScVal nesting too deep"));
    }

    let value = match val {
        ScVal::Bool(b) => WireValue::Bool(*b),
        ScVal::Void => WireValue::Void,
        ScVal::Error(err) => error_parts(err),
        ScVal::U32(v) => WireValue::U32(*v),
        ScVal::I32(v) => WireValue::I32(*v),
        ScVal::U64(v) => WireValue::U64(*v),
        ScVal::I64(v) => WireValue::I64(*v),
        ScVal::Timepoint(t) => WireValue::Timepoint(t.0),
        ScVal::Duration(d) => WireValue::Duration(d.0),
        ScVal::U128(UInt128Parts { hi, lo }) => {
            WireValue::U128((u128::from(*hi) << 64) | u128::from(*lo))
        }
        ScVal::I128(Int128Parts { hi, lo }) => {
            WireValue::I128((i128::from(*hi) << 64) | i128::from(*lo))
        }
        ScVal::U256(UInt256Parts {
            hi_hi,
            hi_lo,
            lo_hi,
            lo_lo,
        }) => WireValue::U256(pack256(hi_hi.to_be_bytes(), [*hi_lo, *lo_hi, *lo_lo])),
        ScVal::I256(Int256Parts {
            hi_hi,
            hi_lo,
            lo_hi,
            lo_lo,
        }) => WireValue::I256(pack256(hi_hi.to_be_bytes(), [*hi_lo, *lo_hi, *lo_lo])),
        ScVal::Bytes(ScBytes(body)) => WireValue::Bytes(body.to_vec()),
        ScVal::String(ScString(body)) => WireValue::String(utf8(body.to_vec())?),
        ScVal::Symbol(ScSymbol(body)) => WireValue::Symbol(utf8(body.to_vec())?),
        ScVal::Vec(items) => WireValue::Vec(match items {
            Some(ScVec(items)) => items
                .iter()
                .map(|item| from_sc_val(item, depth + 1))
                .collect::<Result<_>>()?,
            None => Vec::new(),
        }),
        ScVal::Map(entries) => WireValue::Map(match entries {
            Some(ScMap(entries)) => entries
                .iter()
                .map(|entry| {
                    Ok((
                        from_sc_val(&entry.key, depth + 1)?,
                        from_sc_val(&entry.val, depth + 1)?,
                    ))
                })
                .collect::<Result<_>>()?,
            None => Vec::new(),
        }),
        ScVal::Address(addr) => WireValue::Address(address(addr)),
        ScVal::ContractInstance(_) => return Err(not_in_event(ScType::ContractInstance)),
        ScVal::LedgerKeyContractInstance => {
            return Err(not_in_event(ScType::LedgerKeyContractInstance))
        }
        ScVal::LedgerKeyNonce(_) => return Err(not_in_event(ScType::LedgerKeyNonce)),
    };

    Ok(value)
}

fn not_in_event(ty: ScType) -> DecodeError {
    DecodeError::malformed(format!("{} is not valid in an event payload", ty))
}

fn pack256(high: [u8; 8], rest: [u64; 3]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..8].copy_from_slice(&high);
    for (chunk, part) in out[8..].chunks_exact_mut(8).zip(rest) {
        chunk.copy_from_slice(&part.to_be_bytes());
    }
    out
}

fn split256(bytes: &[u8; 32]) -> ([u8; 8], [u64; 3]) {
    let mut high = [0u8; 8];
    high.copy_from_slice(&bytes[..8]);
    let mut rest = [0u64; 3];
    for (part, chunk) in rest.iter_mut().zip(bytes[8..].chunks_exact(8)) {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        *part = u64::from_be_bytes(word);
    }
    (high, rest)
}

fn utf8(body: Vec<u8>) -> Result<String> {
    String::from_utf8(body).map_err(|_| DecodeError::malformed("string is not valid UTF-8"))
}

fn error_parts(err: &ScError) -> WireValue {
    let kind = err.discriminant() as i32;
    let code = match err {
        ScError::Contract(code) => *code,
        ScError::WasmVm(code)
        | ScError::Context(code)
        | ScError::Storage(code)
        | ScError::Object(code)
        | ScError::Crypto(code)
        | ScError::Events(code)
        | ScError::Budget(code)
        | ScError::Value(code)
        | ScError::Auth(code) => *code as u32,
    };
    WireValue::Error(kind, code)
}

fn address(addr: &stellar::ScAddress) -> ScAddress {
    match addr {
        stellar::ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key)))) => {
            ScAddress::Account(*key)
        }
        stellar::ScAddress::Contract(ContractId(Hash(id))) => ScAddress::Contract(*id),
        stellar::ScAddress::MuxedAccount(MuxedEd25519Account {
            ed25519: Uint256(key),
            ..
        }) => ScAddress::Account(*key),
        stellar::ScAddress::ClaimableBalance(ClaimableBalanceId::ClaimableBalanceIdTypeV0(
            Hash(id),
        )) => ScAddress::Raw(id.to_vec()),
        stellar::ScAddress::LiquidityPool(PoolId(Hash(id))) => ScAddress::Raw(id.to_vec()),
    }
}

fn to_sc_address(addr: &ScAddress) -> Result<stellar::ScAddress> {
    match addr {
        ScAddress::Account(key) => Ok(stellar::ScAddress::Account(AccountId(
            PublicKey::PublicKeyTypeEd25519(Uint256(*key)),
        ))),
        ScAddress::Contract(id) => Ok(stellar::ScAddress::Contract(ContractId(Hash(*id)))),
        ScAddress::Encoded(text) => {
            let (kind, payload) = strkey::decode(text)?;
            to_sc_address(&match kind {
                StrkeyKind::Account => ScAddress::Account(payload),
                StrkeyKind::Contract => ScAddress::Contract(payload),
            })
        }
        ScAddress::Raw(_) => Err(DecodeError::malformed(
            "raw address bytes have no XDR encoding",
        )),
    }
}

fn error_code(code: u32) -> Result<ScErrorCode> {
    let code = i32::try_from(code)
        .map_err(|_| DecodeError::malformed(format!("error code {} out of range", code)))?;
    ScErrorCode::try_from(code).map_err(invalid)
}

fn to_sc_error(kind: i32, code: u32) -> Result<ScError> {
    Ok(match ScErrorType::try_from(kind).map_err(invalid)? {
        ScErrorType::Contract => ScError::Contract(code),
        ScErrorType::WasmVm => ScError::WasmVm(error_code(code)?),
        ScErrorType::Context => ScError::Context(error_code(code)?),
        ScErrorType::Storage => ScError::Storage(error_code(code)?),
        ScErrorType::Object => ScError::Object(error_code(code)?),
        ScErrorType::Crypto => ScError::Crypto(error_code(code)?),
        ScErrorType::Events => ScError::Events(error_code(code)?),
        ScErrorType::Budget => ScError::Budget(error_code(code)?),
        ScErrorType::Value => ScError::Value(error_code(code)?),
        ScErrorType::Auth => ScError::Auth(error_code(code)?),
    })
}

fn to_sc_val(value: &WireValue) -> Result<ScVal> {
    let val = match value {
        WireValue::Bool(b) => ScVal::Bool(*b),
        WireValue::Void => ScVal::Void,
        WireValue::Error(kind, code) => ScVal::Error(to_sc_error(*kind, *code)?),
        WireValue::U32(v) => ScVal::U32(*v),
        WireValue::I32(v) => ScVal::I32(*v),
        WireValue::U64(v) => ScVal::U64(*v),
        WireValue::I64(v) => ScVal::I64(*v),
        WireValue::Timepoint(v) => ScVal::Timepoint(stellar::TimePoint(*v)),
        WireValue::Duration(v) => ScVal::Duration(stellar::Duration(*v)),
        WireValue::U128(v) => ScVal::U128(UInt128Parts {
            hi: (v >> 64) as u64,
            lo: *v as u64,
        }),
        WireValue::I128(v) => ScVal::I128(Int128Parts {
            hi: (v >> 64) as i64,
            lo: *v as u64,
        }),
        WireValue::U256(bytes) => {
            let (high, [hi_lo, lo_hi, lo_lo]) = split256(bytes);
            ScVal::U256(UInt256Parts {
                hi_hi: u64::from_be_bytes(high),
                hi_lo,
                lo_hi,
                lo_lo,
            })
        }
        WireValue::I256(bytes) => {
            let (high, [hi_lo, lo_hi, lo_lo]) = split256(bytes);
            ScVal::I256(Int256Parts {
                hi_hi: i64::from_be_bytes(high),
                hi_lo,
                lo_hi,
                lo_lo,
            })
        }
        WireValue::Bytes(body) => ScVal::Bytes(ScBytes(body.clone().try_into().map_err(invalid)?)),
        WireValue::String(s) => {
            ScVal::String(ScString(s.clone().into_bytes().try_into().map_err(invalid)?))
        }
        WireValue::Symbol(s) => {
            ScVal::Symbol(ScSymbol(s.clone().into_bytes().try_into().map_err(invalid)?))
        }
        WireValue::Vec(items) => ScVal::Vec(Some(ScVec(
            items
                .iter()
                .map(to_sc_val)
                .collect::<Result<Vec<_>>>()?
                .try_into()
                .map_err(invalid)?,
        ))),
        WireValue::Map(entries) => ScVal::Map(Some(ScMap(
            entries
                .iter()
                .map(|(key, val)| {
                    Ok(ScMapEntry {
                        key: to_sc_val(key)?,
                        val: to_sc_val(val)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?
                .try_into()
                .map_err(invalid)?,
        ))),
        WireValue::Address(addr) => ScVal::Address(to_sc_address(addr)?),
    };
    Ok(val)
}
