//! Entity reconciliation for one event.
//!
//! A [`Session`] is the unit of work for a single event: reads go through
//! the pending writes first, every write is buffered, and [`Session::commit`]
//! hands the whole batch to the store at once. Dropping a session without
//! committing discards everything it staged.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::storage::{
    Account, ChangeSet, Community, CommunityMember, EntityKind, EntityStore, Mutation,
    StoredEntity, User,
};

type Key = (EntityKind, String);

/// Per-event read-your-writes overlay over an [`EntityStore`].
pub struct Session<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    pending: HashMap<Key, Mutation>,
    order: Vec<Key>,
}

impl<'a, S: EntityStore + ?Sized> Session<'a, S> {
    /// Start an empty session.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            pending: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Fetch an entity, seeing this session's own writes.
    pub async fn get<E: StoredEntity>(&self, id: &str) -> Result<Option<E>> {
        match self.pending.get(&(E::KIND, id.to_string())) {
            Some(Mutation::Save(entity)) => Ok(E::from_entity(entity.clone())),
            Some(Mutation::Remove(..)) => Ok(None),
            None => Ok(self.store.load(E::KIND, id).await?.and_then(E::from_entity)),
        }
    }

    /// Return the existing entity unchanged, or a new one built by `defaults`.
    ///
    /// The flag is true when the entity was created. Nothing is staged; the
    /// caller saves once it has applied its changes.
    pub async fn get_or_create<E, F>(&self, id: &str, defaults: F) -> Result<(E, bool)>
    where
        E: StoredEntity,
        F: FnOnce() -> E,
    {
        match self.get::<E>(id).await? {
            Some(existing) => Ok((existing, false)),
            None => Ok((defaults(), true)),
        }
    }

    /// Stage an upsert.
    pub fn save<E: StoredEntity>(&mut self, entity: E) {
        let key = (E::KIND, entity.id().to_string());
        self.stage(key, Mutation::Save(entity.into_entity()));
    }

    /// Stage a removal.
    pub fn remove(&mut self, kind: EntityKind, id: &str) {
        let key = (kind, id.to_string());
        self.stage(key.clone(), Mutation::Remove(key.0, key.1));
    }

    fn stage(&mut self, key: Key, mutation: Mutation) {
        if self.pending.insert(key.clone(), mutation).is_none() {
            self.order.push(key);
        }
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Staged writes in first-touched order, one per entity.
    pub fn into_changes(mut self) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for key in self.order.drain(..) {
            if let Some(mutation) = self.pending.remove(&key) {
                changes.push(mutation);
            }
        }
        changes
    }

    /// Commit every staged write as one batch. Returns the batch size.
    pub async fn commit(self) -> Result<usize> {
        let store = self.store;
        let changes = self.into_changes();
        let count = changes.len();
        if count > 0 {
            store.commit(changes).await?;
        }
        Ok(count)
    }

    /// Get or create a user, stamping `created_at` on creation.
    pub async fn ensure_user(&mut self, id: &str, at: DateTime<Utc>) -> Result<User> {
        let (user, created) = self
            .get_or_create(id, || User {
                id: id.to_string(),
                created_at: at,
            })
            .await?;
        if created {
            debug!("Creating user {}", id);
            self.save(user.clone());
        }
        Ok(user)
    }

    /// Get or create a ledger account and mark it seen at `ledger`.
    pub async fn touch_account(&mut self, id: &str, ledger: u32) -> Result<Account> {
        let (mut account, _) = self
            .get_or_create(id, || Account {
                id: id.to_string(),
                first_seen_ledger: ledger,
                last_seen_ledger: None,
            })
            .await?;
        account.last_seen_ledger = Some(ledger);
        self.save(account.clone());
        Ok(account)
    }

    /// Get or create a membership and make it active.
    ///
    /// An inactive membership is flipped back rather than duplicated.
    /// Manager and creator flags of an existing membership are untouched.
    pub async fn activate_member(
        &mut self,
        community_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<CommunityMember> {
        let id = CommunityMember::key(community_id, user_id);
        let (mut member, created) = self
            .get_or_create(&id, || new_member(community_id, user_id, at))
            .await?;
        if !created && !member.is_member {
            debug!("Reactivating member {}", id);
        }
        member.is_member = true;
        member.last_indexed_at = at;
        self.save(member.clone());
        Ok(member)
    }

    /// Get or create a membership flagged as manager (and creator, if asked).
    pub async fn promote_member(
        &mut self,
        community_id: &str,
        user_id: &str,
        creator: bool,
        at: DateTime<Utc>,
    ) -> Result<CommunityMember> {
        let id = CommunityMember::key(community_id, user_id);
        let (mut member, _) = self
            .get_or_create(&id, || new_member(community_id, user_id, at))
            .await?;
        member.is_manager = true;
        member.is_creator |= creator;
        member.is_member = true;
        member.last_indexed_at = at;
        self.save(member.clone());
        Ok(member)
    }
}

fn new_member(community_id: &str, user_id: &str, at: DateTime<Utc>) -> CommunityMember {
    CommunityMember {
        id: CommunityMember::key(community_id, user_id),
        community_id: community_id.to_string(),
        user_id: user_id.to_string(),
        is_manager: false,
        is_creator: false,
        is_member: true,
        points: 0,
        last_indexed_at: at,
    }
}

/// Incoming community fields. `None` and empty strings leave the stored
/// value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityPatch {
    /// Creator (deployer) address
    pub creator_address: Option<String>,
    /// Factory contract address
    pub factory_address: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Icon reference
    pub icon: Option<String>,
}

impl CommunityPatch {
    /// Build the community a first event would create.
    pub fn create(self, id: &str, at: DateTime<Utc>) -> Community {
        let mut community = Community {
            id: id.to_string(),
            creator_address: String::new(),
            factory_address: String::new(),
            name: String::new(),
            description: String::new(),
            icon: String::new(),
            is_hidden: false,
            created_at: at,
            total_badges: 0,
            last_modified_at: at,
        };
        self.apply(&mut community);
        community
    }

    /// Merge into an existing community. Returns true if anything changed.
    pub fn apply(self, community: &mut Community) -> bool {
        let mut changed = false;
        for (slot, incoming) in [
            (&mut community.creator_address, self.creator_address),
            (&mut community.factory_address, self.factory_address),
            (&mut community.name, self.name),
            (&mut community.description, self.description),
            (&mut community.icon, self.icon),
        ] {
            if let Some(value) = incoming.filter(|v| !v.is_empty()) {
                if *slot != value {
                    *slot = value;
                    changed = true;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_reads_see_pending_writes() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);

        assert!(session.get::<User>("ga").await.unwrap().is_none());
        session.ensure_user("ga", at(10)).await.unwrap();
        assert!(session.get::<User>("ga").await.unwrap().is_some());

        // Nothing reaches the store until commit.
        assert_eq!(store.count(EntityKind::User).await, 0);
        assert_eq!(session.commit().await.unwrap(), 1);
        assert_eq!(store.count(EntityKind::User).await, 1);
    }

    #[tokio::test]
    async fn test_dropped_session_commits_nothing() {
        let store = MemoryStore::new();
        {
            let mut session = Session::new(&store);
            session.ensure_user("ga", at(10)).await.unwrap();
            session.touch_account("ga", 7).await.unwrap();
        }
        assert_eq!(store.count(EntityKind::User).await, 0);
        assert_eq!(store.count(EntityKind::Account).await, 0);
    }

    #[tokio::test]
    async fn test_ensure_user_keeps_first_timestamp() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);
        session.ensure_user("ga", at(10)).await.unwrap();
        session.commit().await.unwrap();

        let mut session = Session::new(&store);
        let user = session.ensure_user("ga", at(99)).await.unwrap();
        assert_eq!(user.created_at, at(10));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_touch_account_tracks_ledgers() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);
        session.touch_account("ga", 5).await.unwrap();
        session.commit().await.unwrap();

        let mut session = Session::new(&store);
        let account = session.touch_account("ga", 9).await.unwrap();
        assert_eq!(account.first_seen_ledger, 5);
        assert_eq!(account.last_seen_ledger, Some(9));
    }

    #[tokio::test]
    async fn test_remove_then_get_is_none() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);
        session.ensure_user("ga", at(1)).await.unwrap();
        session.commit().await.unwrap();

        let mut session = Session::new(&store);
        session.remove(EntityKind::User, "ga");
        assert!(session.get::<User>("ga").await.unwrap().is_none());
        let changes = session.into_changes();
        assert_eq!(
            changes.mutations(),
            &[Mutation::Remove(EntityKind::User, "ga".to_string())]
        );
    }

    #[tokio::test]
    async fn test_member_reactivation_keeps_flags() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);
        let mut member = session.promote_member("cs", "gu", true, at(1)).await.unwrap();
        member.is_member = false;
        session.save(member);
        session.commit().await.unwrap();

        let mut session = Session::new(&store);
        let member = session.activate_member("cs", "gu", at(2)).await.unwrap();
        assert!(member.is_member);
        assert!(member.is_manager);
        assert!(member.is_creator);
        assert_eq!(member.last_indexed_at, at(2));
        session.commit().await.unwrap();
        assert_eq!(store.count(EntityKind::CommunityMember).await, 1);
    }

    #[test]
    fn test_patch_is_non_destructive() {
        let mut community = CommunityPatch {
            creator_address: Some("gd".into()),
            name: Some("Alpha".into()),
            ..Default::default()
        }
        .create("cs", at(1));
        assert_eq!(community.name, "Alpha");
        assert_eq!(community.total_badges, 0);

        let changed = CommunityPatch {
            name: Some(String::new()),
            description: Some("desc".into()),
            icon: None,
            ..Default::default()
        }
        .apply(&mut community);
        assert!(changed);
        assert_eq!(community.name, "Alpha");
        assert_eq!(community.description, "desc");
        assert_eq!(community.creator_address, "gd");

        let unchanged = CommunityPatch {
            name: Some("Alpha".into()),
            ..Default::default()
        }
        .apply(&mut community);
        assert!(!unchanged);
    }
}
