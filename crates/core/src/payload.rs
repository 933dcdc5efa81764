//! Boundary type for raw event payloads.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::wire::WireValue;
use crate::{json, xdr};

/// A raw payload as delivered by the ingestion pipeline.
///
/// A JSON string is base64 XDR; a JSON object is the nested-attribute
/// shape. Decoding normalizes either into a [`WireValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Base64-encoded `ScVal` XDR.
    Xdr(String),
    /// Nested-attribute JSON object.
    Attributes(serde_json::Value),
}

impl Payload {
    /// Decode into the normalized wire value.
    pub fn decode(&self) -> Result<WireValue> {
        match self {
            Payload::Xdr(b64) => xdr::from_base64(b64),
            Payload::Attributes(value) => json::from_json(value),
        }
    }

    /// Build an XDR payload from a wire value.
    pub fn from_wire(value: &WireValue) -> Result<Self> {
        xdr::to_base64(value).map(Payload::Xdr)
    }
}
