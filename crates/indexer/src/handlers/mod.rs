//! Event interpreters.
//!
//! Each handler takes the decoded positional arguments of one event and
//! stages entity writes on a [`Session`]. Handlers check arity and resolve
//! the owning community before staging anything, so a skipped event leaves
//! the session empty.

use chrono::{DateTime, Utc};
use scorer_core::{address, WireValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

use crate::reconciler::Session;
use crate::storage::{Community, EntityKind, EntityStore};

pub mod badge;
pub mod community;
pub mod ledger;
pub mod membership;

pub use crate::error::{HandlerError, Result};

/// Ledger metadata of the event being applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Stable event id
    pub event_id: String,

    /// Emitting contract, as published
    pub contract_id: String,

    /// Ledger sequence
    pub ledger: u32,

    /// Ledger close time
    pub closed_at: DateTime<Utc>,
}

impl EventContext {
    /// Id of the community owned by the emitting contract.
    pub fn community_id(&self) -> String {
        self.contract_id.to_lowercase()
    }
}

/// Logical kind of a contract event, selected by its topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `user`, `add`
    UserAdd,
    /// `user`, `remove`
    UserRemove,
    /// `manager`, `add`
    ManagerAdd,
    /// `manager`, `remove`
    ManagerRemove,
    /// `badge`, `add`
    BadgeAdd,
    /// `badge`, `remove`
    BadgeRemove,
    /// `init`, `contract`
    CommunityInit,
    /// `scorer`, `create` (factory)
    CommunityCreate,
    /// `scorer`, `remove` (factory)
    CommunityRemove,
    /// `transfer`, from, to (token contract)
    Transfer,
}

impl EventKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserAdd => "user_add",
            EventKind::UserRemove => "user_remove",
            EventKind::ManagerAdd => "manager_add",
            EventKind::ManagerRemove => "manager_remove",
            EventKind::BadgeAdd => "badge_add",
            EventKind::BadgeRemove => "badge_remove",
            EventKind::CommunityInit => "community_init",
            EventKind::CommunityCreate => "community_create",
            EventKind::CommunityRemove => "community_remove",
            EventKind::Transfer => "transfer",
        }
    }

    /// Whether only the configured factory may emit this kind.
    pub fn is_factory_event(&self) -> bool {
        matches!(self, EventKind::CommunityCreate | EventKind::CommunityRemove)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Writes were staged (possibly none, for idempotent re-delivery).
    Applied,
    /// The event was dropped without any write.
    Skipped(SkipReason),
}

/// Why an event was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer positional arguments than the handler requires.
    Arity {
        /// Minimum argument count
        required: usize,
        /// Argument count received
        found: usize,
    },

    /// A referenced entity does not exist (yet).
    UnresolvedReference {
        /// Kind of the missing entity
        kind: EntityKind,
        /// Id of the missing entity
        id: String,
    },

    /// Topics do not name an event this indexer handles.
    Unrecognized,

    /// The emitting contract is not one this event kind is accepted from.
    ForeignContract,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Arity { required, found } => {
                write!(f, "needs {} arguments, got {}", required, found)
            }
            SkipReason::UnresolvedReference { kind, id } => {
                write!(f, "unresolved {} '{}'", kind, id)
            }
            SkipReason::Unrecognized => f.write_str("unrecognized topics"),
            SkipReason::ForeignContract => f.write_str("foreign contract"),
        }
    }
}

/// What the user-remove handler does to the membership row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Clear `is_member`, keep the row and its flags.
    #[default]
    Soft,
    /// Delete the row.
    Hard,
}

/// Fail closed on an arity shortfall.
pub(crate) fn check_arity(
    kind: EventKind,
    ctx: &EventContext,
    args: &[WireValue],
    required: usize,
) -> Option<Outcome> {
    if args.len() >= required {
        return None;
    }
    error!(
        "{} event {} at ledger {} has {} arguments, needs {}",
        kind,
        ctx.event_id,
        ctx.ledger,
        args.len(),
        required
    );
    Some(Outcome::Skipped(SkipReason::Arity {
        required,
        found: args.len(),
    }))
}

/// Drop an event whose referenced entity is missing.
pub(crate) fn unresolved(
    kind: EventKind,
    ctx: &EventContext,
    entity: EntityKind,
    id: &str,
) -> Outcome {
    warn!(
        "{} event {} from {} references missing {} '{}', skipping",
        kind, ctx.event_id, ctx.contract_id, entity, id
    );
    Outcome::Skipped(SkipReason::UnresolvedReference {
        kind: entity,
        id: id.to_string(),
    })
}

/// Load the community owned by the emitting contract.
pub(crate) async fn owning_community<S: EntityStore + ?Sized>(
    session: &Session<'_, S>,
    ctx: &EventContext,
) -> Result<Option<Community>> {
    Ok(session.get::<Community>(&ctx.community_id()).await?)
}

/// Resolve a required address argument to its entity-id form.
pub(crate) fn address_arg(value: &WireValue, field: &str) -> Result<String> {
    address::resolve_id(value).map_err(|e| HandlerError::from(e.required(field)))
}

/// Read a required string argument.
pub(crate) fn text_arg(value: &WireValue, field: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .map_err(|e| HandlerError::from(e.required(field)))
}

/// Read a required u32 argument.
pub(crate) fn u32_arg(value: &WireValue, field: &str) -> Result<u32> {
    value
        .as_u32()
        .map_err(|e| HandlerError::from(e.required(field)))
}

/// Read a cosmetic string, falling back to empty on a wrong tag.
pub(crate) fn cosmetic_text(value: Option<&WireValue>, field: &str) -> String {
    match value.map(WireValue::as_str) {
        Some(Ok(text)) => text.to_string(),
        Some(Err(e)) => {
            warn!("Ignoring {}: {}", field, e);
            String::new()
        }
        None => String::new(),
    }
}

/// Badge identity fields carried by badge events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BadgeId {
    pub name: String,
    pub issuer: String,
}

impl BadgeId {
    /// Parse a `{name, issuer}` map.
    pub fn parse(value: &WireValue) -> Result<Self> {
        use scorer_core::constants::{BADGE_FIELD_ISSUER, BADGE_FIELD_NAME};

        let name = value
            .field(BADGE_FIELD_NAME)
            .map_err(|e| e.required("badge id"))?;
        let issuer = value
            .field(BADGE_FIELD_ISSUER)
            .map_err(|e| e.required("badge id"))?;
        Ok(Self {
            name: text_arg(name, "badge name")?,
            issuer: address_arg(issuer, "badge issuer")?,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_removal_policy_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: RemovalPolicy,
        }
        let w: Wrapper = toml::from_str(r#"policy = "hard""#).unwrap();
        assert_eq!(w.policy, RemovalPolicy::Hard);
        assert_eq!(RemovalPolicy::default(), RemovalPolicy::Soft);
    }

    #[test]
    fn test_badge_id_parse() {
        let id = BadgeId::parse(&badge_id("Early", 3)).unwrap();
        assert_eq!(id.name, "Early");
        assert_eq!(id.issuer, account_id(3));

        let err = BadgeId::parse(&WireValue::Map(vec![(sym("name"), text("x"))])).unwrap_err();
        assert!(err.is_malformed());

        // Wrong tag on a required field escalates.
        let err = BadgeId::parse(&WireValue::Map(vec![
            (sym("name"), WireValue::U32(1)),
            (sym("issuer"), account(3)),
        ]))
        .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_cosmetic_text_defaults() {
        assert_eq!(cosmetic_text(Some(&text("Alpha")), "name"), "Alpha");
        assert_eq!(cosmetic_text(Some(&WireValue::U32(5)), "name"), "");
        assert_eq!(cosmetic_text(None, "icon"), "");
    }

    #[test]
    fn test_arity_check() {
        let ctx = ctx(1, 10);
        assert_eq!(check_arity(EventKind::BadgeAdd, &ctx, &vec![account(1); 3], 3), None);
        assert_eq!(
            check_arity(EventKind::BadgeAdd, &ctx, &[account(1)], 3),
            Some(Outcome::Skipped(SkipReason::Arity {
                required: 3,
                found: 1
            }))
        );
    }
}
