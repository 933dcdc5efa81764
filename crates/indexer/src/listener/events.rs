//! Record types delivered by the ingestion pipeline.
//!
//! One record per JSON line, tagged by `"kind"`. Contract events follow the
//! Soroban RPC `getEvents` field names; payments and effects follow Horizon.

use chrono::{DateTime, Utc};
use scorer_core::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::handlers::EventContext;

/// A Soroban contract event with its raw payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvent {
    /// Stable event id
    pub id: String,

    /// Emitting contract (`C...` strkey)
    pub contract_id: String,

    /// Ledger sequence
    pub ledger: u32,

    /// Ledger close time (ISO-8601)
    pub ledger_closed_at: DateTime<Utc>,

    /// Transaction hash, when the source provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,

    /// Topic payloads
    #[serde(alias = "topic")]
    pub topics: Vec<Payload>,

    /// Value payload
    pub value: Payload,
}

impl ContractEvent {
    /// Ledger metadata handed to the handlers.
    pub fn context(&self) -> EventContext {
        EventContext {
            event_id: self.id.clone(),
            contract_id: self.contract_id.clone(),
            ledger: self.ledger,
            closed_at: self.ledger_closed_at,
        }
    }
}

/// A Horizon payment operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOperation {
    /// Operation id
    pub id: String,

    /// Ledger sequence
    pub ledger: u32,

    /// Sending account (`G...`)
    pub from: String,

    /// Receiving account (`G...`)
    pub to: String,

    /// Amount as published
    pub amount: String,

    /// Transaction hash
    pub transaction_hash: String,
}

/// Kind of balance effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// `account_credited`
    AccountCredited,
    /// `account_debited`
    AccountDebited,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::AccountCredited => f.write_str("account_credited"),
            EffectKind::AccountDebited => f.write_str("account_debited"),
        }
    }
}

/// A Horizon account credited/debited effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEffect {
    /// Effect id
    pub id: String,

    /// Ledger sequence
    pub ledger: u32,

    /// Effect type
    #[serde(rename = "type")]
    pub kind: EffectKind,

    /// Affected account (`G...`)
    pub account: String,

    /// Amount as published
    pub amount: String,
}

/// Any record the sync engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexedRecord {
    /// Soroban contract event
    ContractEvent(ContractEvent),
    /// Payment operation
    Payment(PaymentOperation),
    /// Balance effect
    Effect(LedgerEffect),
}

impl IndexedRecord {
    /// Stable id of the record.
    pub fn id(&self) -> &str {
        match self {
            IndexedRecord::ContractEvent(e) => &e.id,
            IndexedRecord::Payment(p) => &p.id,
            IndexedRecord::Effect(e) => &e.id,
        }
    }

    /// Ledger the record belongs to.
    pub fn ledger(&self) -> u32 {
        match self {
            IndexedRecord::ContractEvent(e) => e.ledger,
            IndexedRecord::Payment(p) => p.ledger,
            IndexedRecord::Effect(e) => e.ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorer_core::WireValue;

    #[test]
    fn test_parse_contract_event_line() {
        let line = r#"{"kind":"contract_event","id":"0000000429496733696-0000000001","contractId":"CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4","ledger":100,"ledgerClosedAt":"2024-05-01T12:00:00Z","topic":["AAAADwAAAAViYWRnZQAAAA==",{"_arm":"sym","_value":"add"}],"value":"AAAAAwAAACo="}"#;
        let record: IndexedRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.ledger(), 100);
        assert_eq!(record.id(), "0000000429496733696-0000000001");

        let IndexedRecord::ContractEvent(event) = record else {
            panic!("expected a contract event");
        };
        assert_eq!(event.topics.len(), 2);
        assert_eq!(
            event.topics[0].decode().unwrap(),
            WireValue::Symbol("badge".into())
        );
        assert_eq!(
            event.topics[1].decode().unwrap(),
            WireValue::Symbol("add".into())
        );
        assert_eq!(event.value.decode().unwrap(), WireValue::U32(42));
        assert_eq!(event.tx_hash, None);

        let ctx = event.context();
        assert_eq!(ctx.closed_at.timestamp(), 1_714_564_800);
        assert_eq!(
            ctx.community_id(),
            "caaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabsc4"
        );
    }

    #[test]
    fn test_parse_ledger_records() {
        let payment: IndexedRecord = serde_json::from_str(
            r#"{"kind":"payment","id":"op-1","ledger":7,"from":"GA","to":"GB","amount":"1.0","transaction_hash":"ab"}"#,
        )
        .unwrap();
        assert!(matches!(payment, IndexedRecord::Payment(ref p) if p.to == "GB"));

        let effect: IndexedRecord = serde_json::from_str(
            r#"{"kind":"effect","id":"eff-1","ledger":8,"type":"account_credited","account":"GA","amount":"2.0"}"#,
        )
        .unwrap();
        let IndexedRecord::Effect(effect) = effect else {
            panic!("expected an effect");
        };
        assert_eq!(effect.kind, EffectKind::AccountCredited);
        assert_eq!(effect.kind.to_string(), "account_credited");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(serde_json::from_str::<IndexedRecord>(r#"{"kind":"trade","id":"x"}"#).is_err());
    }
}
