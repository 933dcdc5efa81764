//! Normalized representation of Soroban `ScVal` wire values.
//!
//! Both decoder front-ends ([`crate::xdr`] and [`crate::json`]) produce a
//! [`WireValue`]. Event interpreters only ever pattern-match on this type and
//! never learn which encoding a payload arrived in.

use std::fmt;

use crate::error::{DecodeError, Result};

/// Maximum nesting of vectors and maps accepted by the decoders.
pub const MAX_DEPTH: usize = 64;

/// `ScVal` type discriminants, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScType {
    /// `SCV_BOOL`
    Bool,
    /// `SCV_VOID`
    Void,
    /// `SCV_ERROR`
    Error,
    /// `SCV_U32`
    U32,
    /// `SCV_I32`
    I32,
    /// `SCV_U64`
    U64,
    /// `SCV_I64`
    I64,
    /// `SCV_TIMEPOINT`
    Timepoint,
    /// `SCV_DURATION`
    Duration,
    /// `SCV_U128`
    U128,
    /// `SCV_I128`
    I128,
    /// `SCV_U256`
    U256,
    /// `SCV_I256`
    I256,
    /// `SCV_BYTES`
    Bytes,
    /// `SCV_STRING`
    String,
    /// `SCV_SYMBOL`
    Symbol,
    /// `SCV_VEC`
    Vec,
    /// `SCV_MAP`
    Map,
    /// `SCV_ADDRESS`
    Address,
    /// `SCV_CONTRACT_INSTANCE`
    ContractInstance,
    /// `SCV_LEDGER_KEY_CONTRACT_INSTANCE`
    LedgerKeyContractInstance,
    /// `SCV_LEDGER_KEY_NONCE`
    LedgerKeyNonce,
}

const SC_TYPES: [(ScType, &str, &str); 22] = [
    (ScType::Bool, "scvBool", "b"),
    (ScType::Void, "scvVoid", "void"),
    (ScType::Error, "scvError", "error"),
    (ScType::U32, "scvU32", "u32"),
    (ScType::I32, "scvI32", "i32"),
    (ScType::U64, "scvU64", "u64"),
    (ScType::I64, "scvI64", "i64"),
    (ScType::Timepoint, "scvTimepoint", "timepoint"),
    (ScType::Duration, "scvDuration", "duration"),
    (ScType::U128, "scvU128", "u128"),
    (ScType::I128, "scvI128", "i128"),
    (ScType::U256, "scvU256", "u256"),
    (ScType::I256, "scvI256", "i256"),
    (ScType::Bytes, "scvBytes", "bytes"),
    (ScType::String, "scvString", "str"),
    (ScType::Symbol, "scvSymbol", "sym"),
    (ScType::Vec, "scvVec", "vec"),
    (ScType::Map, "scvMap", "map"),
    (ScType::Address, "scvAddress", "address"),
    (ScType::ContractInstance, "scvContractInstance", "instance"),
    (
        ScType::LedgerKeyContractInstance,
        "scvLedgerKeyContractInstance",
        "ledgerKeyContractInstance",
    ),
    (ScType::LedgerKeyNonce, "scvLedgerKeyNonce", "nonceKey"),
];

impl ScType {
    /// Map a numeric wire discriminant to its type.
    pub fn from_discriminant(value: i64) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| SC_TYPES.get(idx))
            .map(|(ty, _, _)| *ty)
    }

    /// Numeric wire discriminant.
    pub fn discriminant(self) -> i32 {
        SC_TYPES
            .iter()
            .position(|(ty, _, _)| *ty == self)
            .map(|idx| idx as i32)
            .unwrap_or(-1)
    }

    /// Map a switch name (`scvU32`) or arm name (`u32`) to its type.
    ///
    /// Matching is case-insensitive; both naming schemes appear in
    /// serialized payloads.
    pub fn from_name(name: &str) -> Option<Self> {
        SC_TYPES
            .iter()
            .find(|(_, switch, arm)| {
                switch.eq_ignore_ascii_case(name) || arm.eq_ignore_ascii_case(name)
            })
            .map(|(ty, _, _)| *ty)
    }

    /// Canonical switch name.
    pub fn name(self) -> &'static str {
        SC_TYPES
            .iter()
            .find(|(ty, _, _)| *ty == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("scvUnknown")
    }
}

impl fmt::Display for ScType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Address payload carried by an `SCV_ADDRESS` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScAddress {
    /// Ed25519 account public key.
    Account([u8; 32]),
    /// Contract id.
    Contract([u8; 32]),
    /// Bytes recovered from an address shape the front-end did not
    /// recognize (legacy serializations, pool or balance ids).
    Raw(Vec<u8>),
    /// Address that arrived already encoded as text.
    Encoded(String),
}

/// A decoded `ScVal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    /// Boolean.
    Bool(bool),
    /// Unit value.
    Void,
    /// Contract error: error type and code.
    Error(i32, u32),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Signed 32-bit integer.
    I32(i32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unix timestamp in seconds.
    Timepoint(u64),
    /// Duration in seconds.
    Duration(u64),
    /// Unsigned 128-bit integer.
    U128(u128),
    /// Signed 128-bit integer.
    I128(i128),
    /// Unsigned 256-bit integer, big-endian.
    U256([u8; 32]),
    /// Signed 256-bit integer, big-endian two's complement.
    I256([u8; 32]),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// UTF-8 string.
    String(String),
    /// Symbol (restricted identifier string).
    Symbol(String),
    /// Ordered sequence.
    Vec(Vec<WireValue>),
    /// Ordered key/value entries.
    Map(Vec<(WireValue, WireValue)>),
    /// Account or contract address.
    Address(ScAddress),
}

impl WireValue {
    /// The type tag of this value.
    pub fn sc_type(&self) -> ScType {
        match self {
            WireValue::Bool(_) => ScType::Bool,
            WireValue::Void => ScType::Void,
            WireValue::Error(..) => ScType::Error,
            WireValue::U32(_) => ScType::U32,
            WireValue::I32(_) => ScType::I32,
            WireValue::U64(_) => ScType::U64,
            WireValue::I64(_) => ScType::I64,
            WireValue::Timepoint(_) => ScType::Timepoint,
            WireValue::Duration(_) => ScType::Duration,
            WireValue::U128(_) => ScType::U128,
            WireValue::I128(_) => ScType::I128,
            WireValue::U256(_) => ScType::U256,
            WireValue::I256(_) => ScType::I256,
            WireValue::Bytes(_) => ScType::Bytes,
            WireValue::String(_) => ScType::String,
            WireValue::Symbol(_) => ScType::Symbol,
            WireValue::Vec(_) => ScType::Vec,
            WireValue::Map(_) => ScType::Map,
            WireValue::Address(_) => ScType::Address,
        }
    }

    fn mismatch(&self, expected: ScType) -> DecodeError {
        DecodeError::TypeMismatch {
            expected,
            found: self.sc_type(),
        }
    }

    /// Borrow the address payload.
    pub fn as_address(&self) -> Result<&ScAddress> {
        match self {
            WireValue::Address(addr) => Ok(addr),
            other => Err(other.mismatch(ScType::Address)),
        }
    }

    /// Borrow the text of a string or symbol.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            WireValue::String(s) | WireValue::Symbol(s) => Ok(s),
            other => Err(other.mismatch(ScType::String)),
        }
    }

    /// Read an unsigned 32-bit integer.
    pub fn as_u32(&self) -> Result<u32> {
        match self {
            WireValue::U32(v) => Ok(*v),
            other => Err(other.mismatch(ScType::U32)),
        }
    }

    /// Read any integer that fits in an `i128`.
    pub fn as_i128(&self) -> Result<i128> {
        match self {
            WireValue::U32(v) => Ok(i128::from(*v)),
            WireValue::I32(v) => Ok(i128::from(*v)),
            WireValue::U64(v) => Ok(i128::from(*v)),
            WireValue::I64(v) => Ok(i128::from(*v)),
            WireValue::I128(v) => Ok(*v),
            WireValue::U128(v) => i128::try_from(*v)
                .map_err(|_| DecodeError::malformed(format!("u128 {} overflows i128", v))),
            other => Err(other.mismatch(ScType::I128)),
        }
    }

    /// Borrow the elements of a vector.
    pub fn as_vec(&self) -> Result<&[WireValue]> {
        match self {
            WireValue::Vec(items) => Ok(items),
            other => Err(other.mismatch(ScType::Vec)),
        }
    }

    /// Borrow the entries of a map.
    pub fn as_map(&self) -> Result<&[(WireValue, WireValue)]> {
        match self {
            WireValue::Map(entries) => Ok(entries),
            other => Err(other.mismatch(ScType::Map)),
        }
    }

    /// Look up a map entry whose key is the given symbol or string.
    ///
    /// Returns `Ok(None)` when the map has no such key.
    pub fn get(&self, key: &str) -> Result<Option<&WireValue>> {
        Ok(self
            .as_map()?
            .iter()
            .find(|(k, _)| matches!(k.as_str(), Ok(name) if name == key))
            .map(|(_, v)| v))
    }

    /// Like [`WireValue::get`] but a missing key is a malformed payload.
    pub fn field(&self, key: &str) -> Result<&WireValue> {
        self.get(key)?
            .ok_or_else(|| DecodeError::malformed(format!("missing map field '{}'", key)))
    }

    /// View this value as a positional argument list.
    ///
    /// A vector yields its elements, void yields nothing and any other value
    /// is a single-element list. Older contract revisions published bare
    /// values where newer ones publish a vector.
    pub fn positional(&self) -> &[WireValue] {
        match self {
            WireValue::Vec(items) => items,
            WireValue::Void => &[],
            other => std::slice::from_ref(other),
        }
    }
}

impl From<ScAddress> for WireValue {
    fn from(addr: ScAddress) -> Self {
        WireValue::Address(addr)
    }
}
