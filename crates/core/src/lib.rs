//! # Scorer Core
//!
//! Wire decoding for the scorer/community Soroban protocol.
//!
//! This crate turns contract event payloads into typed values. It performs
//! no I/O and holds no state.
//!
//! ## Features
//!
//! - **Wire values**: [`WireValue`], the normalized `ScVal` tree
//! - **XDR front-end**: base64/binary `ScVal` decoding and encoding
//! - **JSON front-end**: the nested-attribute (`_switch`/`_arm`/`_value`) shape
//! - **Addresses**: strkey encoding and a resolver that never fails on
//!   address-shaped input
//! - **Constants**: event topic symbols and canonical tags

#![warn(missing_docs)]

pub mod address;
pub mod constants;
pub mod error;
pub mod json;
pub mod payload;
pub mod strkey;
pub mod wire;
pub mod xdr;

// Re-export commonly used items
pub use address::{resolve, resolve_id};
pub use error::{DecodeError, Result};
pub use payload::Payload;
pub use wire::{ScAddress, ScType, WireValue};
