//! Entity types for the indexer storage layer.

use chrono::{DateTime, Utc};

/// A protocol participant.
///
/// Keyed by the lowercased canonical address. Created once, never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Lowercased canonical address
    pub id: String,

    /// Close time of the ledger that first referenced this user
    pub created_at: DateTime<Utc>,
}

/// A scorer contract instance.
///
/// Keyed by the lowercased scorer contract address. Created by whichever of
/// the factory-create or init events arrives first; the other backfills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    /// Lowercased scorer contract address
    pub id: String,

    /// Lowercased creator (deployer) address
    pub creator_address: String,

    /// Lowercased factory contract address (empty until a factory event arrives)
    pub factory_address: String,

    /// Display name
    pub name: String,

    /// Description
    pub description: String,

    /// Icon reference
    pub icon: String,

    /// Set when the factory removes the scorer
    pub is_hidden: bool,

    /// Close time of the creating ledger
    pub created_at: DateTime<Utc>,

    /// Number of badges that have not been removed
    pub total_badges: u32,

    /// Close time of the last ledger that modified this community
    pub last_modified_at: DateTime<Utc>,
}

/// Membership of a user in a community.
///
/// Keyed by `{community_id}-{user_id}`; at most one row per pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityMember {
    /// `{community_id}-{user_id}`
    pub id: String,

    /// Owning community id
    pub community_id: String,

    /// Member user id
    pub user_id: String,

    /// Manager flag
    pub is_manager: bool,

    /// Creator flag
    pub is_creator: bool,

    /// Active membership flag (cleared by a soft remove)
    pub is_member: bool,

    /// Accumulated points
    pub points: i64,

    /// Close time of the last ledger that touched this membership
    pub last_indexed_at: DateTime<Utc>,
}

impl CommunityMember {
    /// Entity id for a (community, user) pair.
    pub fn key(community_id: &str, user_id: &str) -> String {
        format!("{}-{}", community_id, user_id)
    }
}

/// A badge defined in a community.
///
/// Keyed by `{issuer}-{community_id}-{name}`. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    /// `{issuer}-{community_id}-{name}`
    pub id: String,

    /// Lowercased issuer address
    pub issuer: String,

    /// Owning community id
    pub community_id: String,

    /// Badge name as published
    pub name: String,

    /// Points awarded by the badge
    pub score: u32,

    /// Type tag
    pub badge_type: String,

    /// Close time of the creating ledger
    pub created_at: DateTime<Utc>,

    /// Set once on removal, never cleared
    pub removed_at: Option<DateTime<Utc>>,
}

impl Badge {
    /// Entity id for an (issuer, community, name) triple.
    pub fn key(issuer: &str, community_id: &str, name: &str) -> String {
        format!("{}-{}-{}", issuer, community_id, name)
    }

    /// Whether the badge is still active.
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

/// A ledger account seen by the ledger-variant handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Lowercased account address
    pub id: String,

    /// First ledger this account appeared in
    pub first_seen_ledger: u32,

    /// Most recent ledger this account appeared in
    pub last_seen_ledger: Option<u32>,
}

/// Payment operation (append-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Operation id
    pub id: String,
    /// Sending account id
    pub from_id: String,
    /// Receiving account id
    pub to_id: String,
    /// Transaction hash
    pub tx_hash: String,
    /// Amount as published (decimal string)
    pub amount: String,
}

/// Account credited effect (append-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    /// Effect id
    pub id: String,
    /// Credited account id
    pub account_id: String,
    /// Amount as published (decimal string)
    pub amount: String,
}

/// Account debited effect (append-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debit {
    /// Effect id
    pub id: String,
    /// Debited account id
    pub account_id: String,
    /// Amount as published (decimal string)
    pub amount: String,
}

/// Token transfer contract event (append-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Event id
    pub id: String,
    /// Ledger sequence
    pub ledger: u32,
    /// Ledger close time
    pub date: DateTime<Utc>,
    /// Token contract address
    pub contract: String,
    /// Sending account id
    pub from_id: String,
    /// Receiving account id
    pub to_id: String,
    /// Transferred amount
    pub value: i128,
}

/// Record of a user-add event (append-only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAddition {
    /// Event id
    pub id: String,
    /// Ledger sequence
    pub ledger: u32,
    /// Ledger close time
    pub timestamp: DateTime<Utc>,
    /// Account that added the user (empty for single-argument revisions)
    pub sender_id: String,
    /// Added user's account id
    pub user_id: String,
    /// Emitting scorer contract
    pub contract: String,
}

/// Sync state record (singleton).
///
/// Tracks the indexer's progress through the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Ledger of the last fully processed record
    pub last_ledger: u32,

    /// Id of the last fully processed record
    pub last_event_id: Option<String>,

    /// Unix timestamp of last update
    pub updated_at: i64,
}

/// Kind of entity, used to key lookups and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// [`User`]
    User,
    /// [`Community`]
    Community,
    /// [`CommunityMember`]
    CommunityMember,
    /// [`Badge`]
    Badge,
    /// [`Account`]
    Account,
    /// [`Payment`]
    Payment,
    /// [`Credit`]
    Credit,
    /// [`Debit`]
    Debit,
    /// [`Transfer`]
    Transfer,
    /// [`UserAddition`]
    UserAddition,
}

impl EntityKind {
    /// Convert to the table name holding this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Community => "communities",
            EntityKind::CommunityMember => "community_members",
            EntityKind::Badge => "badges",
            EntityKind::Account => "accounts",
            EntityKind::Payment => "payments",
            EntityKind::Credit => "credits",
            EntityKind::Debit => "debits",
            EntityKind::Transfer => "transfers",
            EntityKind::UserAddition => "user_additions",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(EntityKind::User),
            "communities" => Ok(EntityKind::Community),
            "community_members" => Ok(EntityKind::CommunityMember),
            "badges" => Ok(EntityKind::Badge),
            "accounts" => Ok(EntityKind::Account),
            "payments" => Ok(EntityKind::Payment),
            "credits" => Ok(EntityKind::Credit),
            "debits" => Ok(EntityKind::Debit),
            "transfers" => Ok(EntityKind::Transfer),
            "user_additions" => Ok(EntityKind::UserAddition),
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

/// Any stored entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// [`User`]
    User(User),
    /// [`Community`]
    Community(Community),
    /// [`CommunityMember`]
    CommunityMember(CommunityMember),
    /// [`Badge`]
    Badge(Badge),
    /// [`Account`]
    Account(Account),
    /// [`Payment`]
    Payment(Payment),
    /// [`Credit`]
    Credit(Credit),
    /// [`Debit`]
    Debit(Debit),
    /// [`Transfer`]
    Transfer(Transfer),
    /// [`UserAddition`]
    UserAddition(UserAddition),
}

impl Entity {
    /// Kind of this entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Community(_) => EntityKind::Community,
            Entity::CommunityMember(_) => EntityKind::CommunityMember,
            Entity::Badge(_) => EntityKind::Badge,
            Entity::Account(_) => EntityKind::Account,
            Entity::Payment(_) => EntityKind::Payment,
            Entity::Credit(_) => EntityKind::Credit,
            Entity::Debit(_) => EntityKind::Debit,
            Entity::Transfer(_) => EntityKind::Transfer,
            Entity::UserAddition(_) => EntityKind::UserAddition,
        }
    }

    /// Identity of this entity.
    pub fn id(&self) -> &str {
        match self {
            Entity::User(e) => &e.id,
            Entity::Community(e) => &e.id,
            Entity::CommunityMember(e) => &e.id,
            Entity::Badge(e) => &e.id,
            Entity::Account(e) => &e.id,
            Entity::Payment(e) => &e.id,
            Entity::Credit(e) => &e.id,
            Entity::Debit(e) => &e.id,
            Entity::Transfer(e) => &e.id,
            Entity::UserAddition(e) => &e.id,
        }
    }
}

/// Conversion between concrete entity types and [`Entity`].
pub trait StoredEntity: Clone + Send + Sync + Sized {
    /// Kind tag for this type.
    const KIND: EntityKind;

    /// Identity of this entity.
    fn id(&self) -> &str;

    /// Wrap into [`Entity`].
    fn into_entity(self) -> Entity;

    /// Unwrap from [`Entity`], if the variant matches.
    fn from_entity(entity: Entity) -> Option<Self>;
}

macro_rules! stored_entity {
    ($($ty:ident),* $(,)?) => {
        $(
            impl StoredEntity for $ty {
                const KIND: EntityKind = EntityKind::$ty;

                fn id(&self) -> &str {
                    &self.id
                }

                fn into_entity(self) -> Entity {
                    Entity::$ty(self)
                }

                fn from_entity(entity: Entity) -> Option<Self> {
                    match entity {
                        Entity::$ty(e) => Some(e),
                        _ => None,
                    }
                }
            }
        )*
    };
}

stored_entity!(
    User,
    Community,
    CommunityMember,
    Badge,
    Account,
    Payment,
    Credit,
    Debit,
    Transfer,
    UserAddition,
);

/// A single staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace by id.
    Save(Entity),
    /// Delete by id.
    Remove(EntityKind, String),
}

/// The writes produced by processing one event, committed as one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    mutations: Vec<Mutation>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write.
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Borrow the staged writes in order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Consume into the staged writes in order.
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}
