//! JSON front-end for the nested-attribute `ScVal` shape.
//!
//! Some ingestion paths hand over the XDR object graph serialized as JSON
//! rather than XDR bytes. Unions appear as
//! `{"_switch": {"name": "scvU32", "value": 3}, "_arm": "u32", "_value": 7}`,
//! structs as `{"_attributes": {...}}` and byte bodies as Node buffers
//! (`{"type": "Buffer", "data": [..]}`). The switch may also be a bare number
//! or name, and the arm alone is enough to identify the case.

use serde_json::{Map, Value};

use crate::error::{DecodeError, Result};
use crate::wire::{ScAddress, ScType, WireValue, MAX_DEPTH};

/// Decode a JSON document in the nested-attribute shape.
pub fn from_json(value: &Value) -> Result<WireValue> {
    decode(value, 0)
}

/// Parse and decode a JSON string in the nested-attribute shape.
pub fn from_json_str(input: &str) -> Result<WireValue> {
    let value: Value = serde_json::from_str(input)
        .map_err(|e| DecodeError::malformed(format!("invalid JSON: {}", e)))?;
    from_json(&value)
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| DecodeError::malformed(format!("{} must be an object", what)))
}

/// Unwrap `{"_attributes": {...}}` to its inner object.
fn attributes(value: &Value) -> Option<&Map<String, Value>> {
    let obj = value.as_object()?;
    match obj.get("_attributes") {
        Some(inner) => inner.as_object(),
        None => Some(obj),
    }
}

fn switch_name(obj: &Map<String, Value>) -> Option<&str> {
    match obj.get("_switch")? {
        Value::String(name) => Some(name),
        Value::Object(sw) => sw.get("name").and_then(Value::as_str),
        _ => None,
    }
}

fn switch_number(obj: &Map<String, Value>) -> Option<i64> {
    match obj.get("_switch")? {
        Value::Number(n) => n.as_i64(),
        Value::Object(sw) => sw.get("value").and_then(Value::as_i64),
        _ => None,
    }
}

fn sc_type_of(obj: &Map<String, Value>) -> Result<ScType> {
    if let Some(ty) = switch_name(obj).and_then(ScType::from_name) {
        return Ok(ty);
    }
    if let Some(ty) = switch_number(obj).and_then(ScType::from_discriminant) {
        return Ok(ty);
    }
    if let Some(ty) = obj
        .get("_arm")
        .and_then(Value::as_str)
        .and_then(ScType::from_name)
    {
        return Ok(ty);
    }
    if obj.contains_key("_switch") || obj.contains_key("_arm") {
        return Err(DecodeError::malformed(format!(
            "unknown ScVal discriminant {}",
            obj.get("_switch").or_else(|| obj.get("_arm")).unwrap_or(&Value::Null)
        )));
    }
    Err(DecodeError::malformed("missing ScVal discriminant"))
}

fn body<'a>(obj: &'a Map<String, Value>, ty: ScType) -> Result<&'a Value> {
    obj.get("_value")
        .ok_or_else(|| DecodeError::malformed(format!("{} is missing its _value", ty)))
}

fn decode(value: &Value, depth: usize) -> Result<WireValue> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::malformed("ScVal nesting too deep"));
    }

    let obj = as_object(value, "ScVal")?;
    let ty = sc_type_of(obj)?;

    let decoded = match ty {
        ScType::Void => WireValue::Void,
        ScType::Bool => WireValue::Bool(
            body(obj, ty)?
                .as_bool()
                .ok_or_else(|| DecodeError::malformed("scvBool body must be a boolean"))?,
        ),
        ScType::Error => {
            let inner = attributes(body(obj, ty)?)
                .ok_or_else(|| DecodeError::malformed("scvError body must be an object"))?;
            let kind = inner
                .get("type")
                .or_else(|| inner.get("_switch"))
                .and_then(|v| v.as_i64().or_else(|| v.get("value").and_then(Value::as_i64)))
                .ok_or_else(|| DecodeError::malformed("scvError body is missing its type"))?;
            let code = inner
                .get("code")
                .or_else(|| inner.get("_value"))
                .and_then(Value::as_u64)
                .ok_or_else(|| DecodeError::malformed("scvError body is missing its code"))?;
            WireValue::Error(
                i32::try_from(kind)
                    .map_err(|_| DecodeError::malformed("scvError type out of range"))?,
                u32::try_from(code)
                    .map_err(|_| DecodeError::malformed("scvError code out of range"))?,
            )
        }
        ScType::U32 => WireValue::U32(
            u32::try_from(integer(body(obj, ty)?)?)
                .map_err(|_| DecodeError::malformed("scvU32 out of range"))?,
        ),
        ScType::I32 => WireValue::I32(
            i32::try_from(integer(body(obj, ty)?)?)
                .map_err(|_| DecodeError::malformed("scvI32 out of range"))?,
        ),
        ScType::U64 | ScType::Timepoint | ScType::Duration => {
            let v = u64::try_from(integer(body(obj, ty)?)?)
                .map_err(|_| DecodeError::malformed(format!("{} out of range", ty)))?;
            match ty {
                ScType::U64 => WireValue::U64(v),
                ScType::Timepoint => WireValue::Timepoint(v),
                _ => WireValue::Duration(v),
            }
        }
        ScType::I64 => WireValue::I64(
            i64::try_from(integer(body(obj, ty)?)?)
                .map_err(|_| DecodeError::malformed("scvI64 out of range"))?,
        ),
        ScType::U128 => {
            let (hi, lo) = parts(body(obj, ty)?)?;
            let hi = u64::try_from(hi).map_err(|_| DecodeError::malformed("u128 hi out of range"))?;
            WireValue::U128((u128::from(hi) << 64) | u128::from(lo))
        }
        ScType::I128 => {
            let (hi, lo) = parts(body(obj, ty)?)?;
            let hi = i64::try_from(hi).map_err(|_| DecodeError::malformed("i128 hi out of range"))?;
            WireValue::I128((i128::from(hi) << 64) | i128::from(lo))
        }
        ScType::U256 => WireValue::U256(wide(body(obj, ty)?, ty)?),
        ScType::I256 => WireValue::I256(wide(body(obj, ty)?, ty)?),
        ScType::Bytes => WireValue::Bytes(bytes(body(obj, ty)?)?),
        ScType::String => WireValue::String(text(body(obj, ty)?)?),
        ScType::Symbol => WireValue::Symbol(text(body(obj, ty)?)?),
        ScType::Vec => match obj.get("_value") {
            None | Some(Value::Null) => WireValue::Vec(Vec::new()),
            Some(Value::Array(items)) => WireValue::Vec(
                items
                    .iter()
                    .map(|item| decode(item, depth + 1))
                    .collect::<Result<_>>()?,
            ),
            Some(_) => return Err(DecodeError::malformed("scvVec body must be an array")),
        },
        ScType::Map => match obj.get("_value") {
            None | Some(Value::Null) => WireValue::Map(Vec::new()),
            Some(Value::Array(entries)) => WireValue::Map(
                entries
                    .iter()
                    .map(|entry| map_entry(entry, depth + 1))
                    .collect::<Result<_>>()?,
            ),
            Some(_) => return Err(DecodeError::malformed("scvMap body must be an array")),
        },
        ScType::Address => WireValue::Address(address(body(obj, ty)?)?),
        ScType::ContractInstance | ScType::LedgerKeyContractInstance | ScType::LedgerKeyNonce => {
            return Err(DecodeError::malformed(format!(
                "{} is not valid in an event payload",
                ty
            )));
        }
    };

    Ok(decoded)
}

fn map_entry(entry: &Value, depth: usize) -> Result<(WireValue, WireValue)> {
    let attrs =
        attributes(entry).ok_or_else(|| DecodeError::malformed("map entry must be an object"))?;
    let key = attrs
        .get("key")
        .ok_or_else(|| DecodeError::malformed("map entry is missing key"))?;
    let val = attrs
        .get("val")
        .ok_or_else(|| DecodeError::malformed("map entry is missing val"))?;
    Ok((decode(key, depth)?, decode(val, depth)?))
}

/// Integers arrive as numbers, decimal strings, or `{low, high}` longs.
fn integer(value: &Value) -> Result<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| DecodeError::malformed(format!("non-integer number {}", n))),
        Value::String(s) => s
            .parse::<i128>()
            .map_err(|_| DecodeError::malformed(format!("non-integer string '{}'", s))),
        Value::Object(obj) if obj.contains_key("low") && obj.contains_key("high") => {
            let word = |name: &str| {
                obj.get(name)
                    .and_then(Value::as_i64)
                    .map(|v| v as u32)
                    .ok_or_else(|| DecodeError::malformed(format!("long has a non-integer {}", name)))
            };
            let low = word("low")?;
            let high = word("high")?;
            let unsigned = obj
                .get("unsigned")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let joined = (u64::from(high) << 32) | u64::from(low);
            if unsigned {
                Ok(i128::from(joined))
            } else {
                Ok(i128::from(joined as i64))
            }
        }
        Value::Object(obj) => match obj.get("_value") {
            Some(inner) => integer(inner),
            None => Err(DecodeError::malformed("integer object has no value")),
        },
        other => Err(DecodeError::malformed(format!("expected integer, got {}", other))),
    }
}

/// 128-bit integers are `{hi, lo}` structs.
fn parts(value: &Value) -> Result<(i128, u64)> {
    let attrs =
        attributes(value).ok_or_else(|| DecodeError::malformed("128-bit body must be an object"))?;
    let hi = integer(
        attrs
            .get("hi")
            .ok_or_else(|| DecodeError::malformed("128-bit body is missing hi"))?,
    )?;
    let lo = integer(
        attrs
            .get("lo")
            .ok_or_else(|| DecodeError::malformed("128-bit body is missing lo"))?,
    )?;
    let lo = u64::try_from(lo).map_err(|_| DecodeError::malformed("128-bit lo out of range"))?;
    Ok((hi, lo))
}

const WIDE_PARTS: [&str; 4] = ["hiHi", "hiLo", "loHi", "loLo"];

/// 256-bit integers are `{hiHi, hiLo, loHi, loLo}` structs or 32 raw bytes.
/// Parts are packed big-endian; only `hiHi` of an `i256` is signed.
fn wide(value: &Value, ty: ScType) -> Result<[u8; 32]> {
    if let Some(attrs) = attributes(value).filter(|a| a.contains_key(WIDE_PARTS[0])) {
        let mut out = [0u8; 32];
        for (chunk, name) in out.chunks_exact_mut(8).zip(WIDE_PARTS) {
            let part = integer(attrs.get(name).ok_or_else(|| {
                DecodeError::malformed(format!("{} body is missing {}", ty, name))
            })?)?;
            let word = if ty == ScType::I256 && name == WIDE_PARTS[0] {
                i64::try_from(part).map(i64::to_be_bytes).ok()
            } else {
                u64::try_from(part).map(u64::to_be_bytes).ok()
            };
            let word = word.ok_or_else(|| {
                DecodeError::malformed(format!("{} {} out of range", ty, name))
            })?;
            chunk.copy_from_slice(&word);
        }
        return Ok(out);
    }
    bytes(value)?
        .try_into()
        .map_err(|_| DecodeError::malformed(format!("{} must be 32 bytes", ty)))
}

fn bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| DecodeError::malformed("byte array element out of range"))
            })
            .collect(),
        Value::Object(obj) => match obj.get("data").or_else(|| obj.get("_value")) {
            Some(inner) => bytes(inner),
            None => Err(DecodeError::malformed("byte body has no data")),
        },
        other => Err(DecodeError::malformed(format!("expected bytes, got {}", other))),
    }
}

fn text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => String::from_utf8(bytes(other)?)
            .map_err(|_| DecodeError::malformed("string is not valid UTF-8")),
    }
}

fn fixed32(value: &Value) -> Option<[u8; 32]> {
    bytes(value).ok()?.try_into().ok()
}

/// Decode the body of an `scvAddress`.
///
/// Recognized shapes become `Account`/`Contract`; text becomes `Encoded`;
/// anything else that still yields bytes becomes `Raw` so the resolver can
/// fall back on it.
fn address(value: &Value) -> Result<ScAddress> {
    if let Value::String(s) = value {
        return Ok(ScAddress::Encoded(s.clone()));
    }

    let obj = as_object(value, "scvAddress body")?;
    let arm = obj.get("_arm").and_then(Value::as_str).unwrap_or_default();
    let kind = switch_name(obj).unwrap_or_default();
    let number = switch_number(obj);

    let is_account = arm == "accountId" || kind == "scAddressTypeAccount" || number == Some(0);
    let is_contract = arm == "contractId" || kind == "scAddressTypeContract" || number == Some(1);

    if let Some(inner) = obj.get("_value") {
        if is_account {
            // AccountId is a PublicKey union whose ed25519 arm holds the key.
            let key = inner
                .as_object()
                .and_then(|pk| pk.get("_value"))
                .unwrap_or(inner);
            if let Some(key) = fixed32(key) {
                return Ok(ScAddress::Account(key));
            }
        } else if is_contract {
            if let Some(id) = fixed32(inner) {
                return Ok(ScAddress::Contract(id));
            }
        }

        if let Value::String(s) = inner {
            return Ok(ScAddress::Encoded(s.clone()));
        }
        if let Ok(raw) = bytes(inner) {
            return Ok(ScAddress::Raw(raw));
        }
        if let Some(raw) = inner
            .as_object()
            .and_then(|o| o.get("_value"))
            .and_then(|v| bytes(v).ok())
        {
            return Ok(ScAddress::Raw(raw));
        }
    }

    if let Ok(raw) = bytes(value) {
        return Ok(ScAddress::Raw(raw));
    }

    Err(DecodeError::malformed("scvAddress body is not address-shaped"))
}
