//! Badge events: `badge`/`add` and `badge`/`remove`.
//!
//! Payload: `[badge id {name, issuer}, score, sender]`.

use scorer_core::constants::BADGE_TYPE;
use scorer_core::WireValue;
use tracing::{debug, info};

use super::{
    address_arg, check_arity, owning_community, u32_arg, unresolved, BadgeId, EventContext,
    EventKind, Outcome, Result,
};
use crate::reconciler::Session;
use crate::storage::{Badge, EntityKind, EntityStore};

/// Add a badge. Re-adding an existing badge id changes nothing.
pub async fn add<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::BadgeAdd, ctx, args, 3) {
        return Ok(skip);
    }

    let badge_id = BadgeId::parse(&args[0])?;
    let score = u32_arg(&args[1], "score")?;
    let sender = address_arg(&args[2], "sender")?;

    let Some(mut community) = owning_community(session, ctx).await? else {
        return Ok(unresolved(
            EventKind::BadgeAdd,
            ctx,
            EntityKind::Community,
            &ctx.community_id(),
        ));
    };

    let id = Badge::key(&badge_id.issuer, &community.id, &badge_id.name);
    if session.get::<Badge>(&id).await?.is_some() {
        debug!("Badge {} already exists, ignoring re-add", id);
        return Ok(Outcome::Applied);
    }

    session.save(Badge {
        id: id.clone(),
        issuer: badge_id.issuer,
        community_id: community.id.clone(),
        name: badge_id.name,
        score,
        badge_type: BADGE_TYPE.to_string(),
        created_at: ctx.closed_at,
        removed_at: None,
    });

    community.total_badges += 1;
    community.last_modified_at = ctx.closed_at;
    let total = community.total_badges;
    session.save(community);

    info!("Badge {} added by {} ({} active)", id, sender, total);

    Ok(Outcome::Applied)
}

/// Remove a badge: stamp `removed_at`, keep the row.
///
/// Removing an unknown badge creates nothing; removing an already removed
/// badge changes nothing.
pub async fn remove<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::BadgeRemove, ctx, args, 3) {
        return Ok(skip);
    }

    let badge_id = BadgeId::parse(&args[0])?;
    let sender = address_arg(&args[2], "sender")?;

    let Some(mut community) = owning_community(session, ctx).await? else {
        return Ok(unresolved(
            EventKind::BadgeRemove,
            ctx,
            EntityKind::Community,
            &ctx.community_id(),
        ));
    };

    let id = Badge::key(&badge_id.issuer, &community.id, &badge_id.name);
    let Some(mut badge) = session.get::<Badge>(&id).await? else {
        return Ok(unresolved(EventKind::BadgeRemove, ctx, EntityKind::Badge, &id));
    };

    if !badge.is_active() {
        debug!("Badge {} already removed", id);
        return Ok(Outcome::Applied);
    }

    badge.removed_at = Some(ctx.closed_at);
    session.save(badge);

    community.total_badges = community.total_badges.saturating_sub(1);
    community.last_modified_at = ctx.closed_at;
    let total = community.total_badges;
    session.save(community);

    info!("Badge {} removed by {} ({} active)", id, sender, total);

    Ok(Outcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::reconciler::CommunityPatch;
    use crate::storage::{Community, MemoryStore};

    async fn seed_community(store: &MemoryStore) -> String {
        let id = contract_strkey(0x5).to_lowercase();
        let mut session = Session::new(store);
        session.save(CommunityPatch::default().create(&id, at(1)));
        session.commit().await.unwrap();
        id
    }

    fn args(name: &str, score: u32) -> Vec<WireValue> {
        vec![badge_id(name, 0x9), WireValue::U32(score), account(0x1)]
    }

    async fn apply(
        store: &MemoryStore,
        ledger: u32,
        args: &[WireValue],
        removing: bool,
    ) -> Outcome {
        let mut session = Session::new(store);
        let ctx = ctx(0x5, ledger);
        let outcome = if removing {
            remove(&mut session, &ctx, args).await.unwrap()
        } else {
            add(&mut session, &ctx, args).await.unwrap()
        };
        session.commit().await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = MemoryStore::new();
        let s = seed_community(&store).await;

        apply(&store, 10, &args("Early", 10), false).await;
        let badge_id = Badge::key(&account_id(0x9), &s, "Early");
        let first = store.get::<Badge>(&badge_id).await.unwrap();

        apply(&store, 11, &args("Early", 10), false).await;
        let community = store.get::<Community>(&s).await.unwrap();
        assert_eq!(community.total_badges, 1);
        assert_eq!(community.last_modified_at, at(1_700_000_010));
        assert_eq!(store.get::<Badge>(&badge_id).await.unwrap(), first);
        assert_eq!(first.badge_type, "custom");
        assert_eq!(first.score, 10);
    }

    #[tokio::test]
    async fn test_remove_before_add_changes_nothing() {
        let store = MemoryStore::new();
        let s = seed_community(&store).await;

        let outcome = apply(&store, 10, &args("Early", 10), true).await;
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert_eq!(store.count(EntityKind::Badge).await, 0);
        assert_eq!(store.get::<Community>(&s).await.unwrap().total_badges, 0);
    }

    #[tokio::test]
    async fn test_remove_stamps_and_decrements_once() {
        let store = MemoryStore::new();
        let s = seed_community(&store).await;

        apply(&store, 10, &args("Early", 10), false).await;
        apply(&store, 11, &args("Donor", 5), false).await;
        apply(&store, 12, &args("Early", 10), true).await;
        apply(&store, 13, &args("Early", 10), true).await;

        let badge = store
            .get::<Badge>(&Badge::key(&account_id(0x9), &s, "Early"))
            .await
            .unwrap();
        assert_eq!(badge.removed_at, Some(at(1_700_000_012)));
        assert_eq!(store.get::<Community>(&s).await.unwrap().total_badges, 1);
        assert_eq!(store.count(EntityKind::Badge).await, 2);

        // A removed badge stays removed on re-add.
        apply(&store, 14, &args("Early", 10), false).await;
        let badge = store
            .get::<Badge>(&Badge::key(&account_id(0x9), &s, "Early"))
            .await
            .unwrap();
        assert_eq!(badge.removed_at, Some(at(1_700_000_012)));
        assert_eq!(store.get::<Community>(&s).await.unwrap().total_badges, 1);
    }

    #[tokio::test]
    async fn test_counter_never_goes_negative() {
        let store = MemoryStore::new();
        let s = seed_community(&store).await;

        // Badge row exists but the counter was never incremented.
        let mut session = Session::new(&store);
        session.save(Badge {
            id: Badge::key(&account_id(0x9), &s, "Early"),
            issuer: account_id(0x9),
            community_id: s.clone(),
            name: "Early".into(),
            score: 1,
            badge_type: "custom".into(),
            created_at: at(1),
            removed_at: None,
        });
        session.commit().await.unwrap();

        apply(&store, 10, &args("Early", 1), true).await;
        assert_eq!(store.get::<Community>(&s).await.unwrap().total_badges, 0);
    }

    #[tokio::test]
    async fn test_badge_without_community_is_skipped() {
        let store = MemoryStore::new();
        let outcome = apply(&store, 10, &args("Early", 10), false).await;
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert_eq!(store.count(EntityKind::Badge).await, 0);
    }

    #[tokio::test]
    async fn test_score_must_be_u32() {
        let store = MemoryStore::new();
        seed_community(&store).await;
        let mut session = Session::new(&store);
        let bad = vec![badge_id("Early", 0x9), text("ten"), account(0x1)];
        let err = add(&mut session, &ctx(0x5, 10), &bad).await.unwrap_err();
        assert!(err.is_malformed());
        assert!(session.is_empty());
    }
}
