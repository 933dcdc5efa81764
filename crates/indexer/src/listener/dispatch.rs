//! Routes delivered records to their handlers.
//!
//! Contract events are classified by their first two topics. Every record
//! runs in its own [`Session`]; the session is committed only when the
//! handler applied the record, so skipped and failed records write nothing.

use anyhow::{Context, Result};
use scorer_core::constants::{
    ACTION_ADD, ACTION_CREATE, ACTION_REMOVE, TOPIC_BADGE, TOPIC_CONTRACT, TOPIC_INIT,
    TOPIC_MANAGER, TOPIC_SCORER, TOPIC_TRANSFER, TOPIC_USER,
};
use scorer_core::{Payload, WireValue};
use tracing::{debug, error};

use super::events::{ContractEvent, IndexedRecord};
use crate::config::Config;
use crate::handlers::{
    self, badge, community, ledger, membership, EventKind, Outcome, RemovalPolicy, SkipReason,
};
use crate::reconciler::Session;
use crate::storage::EntityStore;

/// Routing rules that depend on deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Factory contract allowed to emit `scorer` events. Any contract when unset.
    pub factory: Option<String>,

    /// Token contracts whose `transfer` events are indexed.
    pub token_contracts: Vec<String>,

    /// What `user`/`remove` does to the membership row.
    pub member_removal: RemovalPolicy,
}

impl DispatchOptions {
    /// Build from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            factory: config.contracts.scorer_factory.clone(),
            token_contracts: config.contracts.token_contracts.clone(),
            member_removal: config.indexer.member_removal,
        }
    }

    fn accepts(&self, kind: EventKind, contract_id: &str) -> bool {
        if kind.is_factory_event() {
            return self
                .factory
                .as_deref()
                .map_or(true, |f| f.eq_ignore_ascii_case(contract_id));
        }
        if kind == EventKind::Transfer {
            return self
                .token_contracts
                .iter()
                .any(|t| t.eq_ignore_ascii_case(contract_id));
        }
        true
    }
}

/// Applies records to an entity store.
pub struct Dispatcher<S: EntityStore> {
    store: S,
    options: DispatchOptions,
}

impl<S: EntityStore> Dispatcher<S> {
    /// Create a dispatcher writing to `store`.
    pub fn new(store: S, options: DispatchOptions) -> Self {
        Self { store, options }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Select the event kind named by decoded topics.
    pub fn classify(topics: &[WireValue]) -> Option<EventKind> {
        let name = topics.first()?.as_str().ok()?;
        if name == TOPIC_TRANSFER {
            return Some(EventKind::Transfer);
        }

        let action = topics.get(1)?.as_str().ok()?;
        let kind = match (name, action) {
            (TOPIC_USER, ACTION_ADD) => EventKind::UserAdd,
            (TOPIC_USER, ACTION_REMOVE) => EventKind::UserRemove,
            (TOPIC_MANAGER, ACTION_ADD) => EventKind::ManagerAdd,
            (TOPIC_MANAGER, ACTION_REMOVE) => EventKind::ManagerRemove,
            (TOPIC_BADGE, ACTION_ADD) => EventKind::BadgeAdd,
            (TOPIC_BADGE, ACTION_REMOVE) => EventKind::BadgeRemove,
            (TOPIC_INIT, TOPIC_CONTRACT) => EventKind::CommunityInit,
            (TOPIC_SCORER, ACTION_CREATE) => EventKind::CommunityCreate,
            (TOPIC_SCORER, ACTION_REMOVE) => EventKind::CommunityRemove,
            _ => return None,
        };
        Some(kind)
    }

    /// Apply one record and commit its writes as a single batch.
    ///
    /// Handler failures are returned as [`handlers::HandlerError`] inside
    /// the `anyhow::Error`.
    pub async fn dispatch(&self, record: &IndexedRecord) -> Result<Outcome> {
        let mut session = Session::new(&self.store);

        let result = match record {
            IndexedRecord::ContractEvent(event) => self.route(&mut session, event).await,
            IndexedRecord::Payment(op) => ledger::payment(&mut session, op).await,
            IndexedRecord::Effect(effect) => ledger::effect(&mut session, effect).await,
        };

        match result {
            Ok(Outcome::Applied) => {
                let writes = session
                    .commit()
                    .await
                    .with_context(|| format!("Failed to commit record {}", record.id()))?;
                debug!("Record {} applied with {} writes", record.id(), writes);
                Ok(Outcome::Applied)
            }
            Ok(skipped) => Ok(skipped),
            Err(e) => {
                error!(
                    "Failed to apply record {} at ledger {}: {}",
                    record.id(),
                    record.ledger(),
                    e
                );
                Err(e.into())
            }
        }
    }

    async fn route(
        &self,
        session: &mut Session<'_, S>,
        event: &ContractEvent,
    ) -> handlers::Result<Outcome> {
        let ctx = event.context();
        // Only the leading topics name the event. A topic that fails to
        // decode there cannot name one of ours.
        let head = event
            .topics
            .iter()
            .take(2)
            .map_while(|topic| match topic.decode() {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!("Event {} has an undecodable topic: {}", ctx.event_id, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        let Some(kind) = Self::classify(&head) else {
            debug!(
                "Ignoring event {} from {}: unrecognized topics",
                ctx.event_id, ctx.contract_id
            );
            return Ok(Outcome::Skipped(SkipReason::Unrecognized));
        };

        if !self.options.accepts(kind, &ctx.contract_id) {
            debug!(
                "Ignoring {} event {} from foreign contract {}",
                kind, ctx.event_id, ctx.contract_id
            );
            return Ok(Outcome::Skipped(SkipReason::ForeignContract));
        }

        let value = event.value.decode()?;
        let args = value.positional();

        match kind {
            EventKind::UserAdd => membership::user_add(session, &ctx, args).await,
            EventKind::UserRemove => {
                membership::user_remove(session, &ctx, args, self.options.member_removal).await
            }
            EventKind::ManagerAdd => membership::manager_add(session, &ctx, args).await,
            EventKind::ManagerRemove => membership::manager_remove(session, &ctx, args).await,
            EventKind::BadgeAdd => badge::add(session, &ctx, args).await,
            EventKind::BadgeRemove => badge::remove(session, &ctx, args).await,
            EventKind::CommunityInit => community::init(session, &ctx, args).await,
            EventKind::CommunityCreate => community::create(session, &ctx, args).await,
            EventKind::CommunityRemove => community::remove(session, &ctx, args).await,
            EventKind::Transfer => {
                let topics = event
                    .topics
                    .iter()
                    .map(Payload::decode)
                    .collect::<scorer_core::Result<Vec<_>>>()?;
                ledger::transfer(session, &ctx, &topics, &value).await
            }
        }
    }
}
