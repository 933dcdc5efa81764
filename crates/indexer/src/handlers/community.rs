//! Community lifecycle: factory create/remove and scorer init.

use scorer_core::constants::{BADGE_FIELD_SCORE, BADGE_TYPE};
use scorer_core::{DecodeError, ScType, WireValue};
use tracing::{debug, info};

use super::{
    address_arg, check_arity, cosmetic_text, u32_arg, unresolved, BadgeId, EventContext,
    EventKind, Outcome, Result,
};
use crate::reconciler::{CommunityPatch, Session};
use crate::storage::{Badge, Community, EntityKind, EntityStore};

/// Factory `scorer`/`create`: `[deployer, scorer, name, description]`.
///
/// Creates the community or backfills one an init event already created.
pub async fn create<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::CommunityCreate, ctx, args, 4) {
        return Ok(skip);
    }

    let deployer = address_arg(&args[0], "deployer")?;
    let community_id = address_arg(&args[1], "scorer")?;
    let patch = CommunityPatch {
        creator_address: Some(deployer.clone()),
        factory_address: Some(ctx.contract_id.to_lowercase()),
        name: Some(cosmetic_text(args.get(2), "name")),
        description: Some(cosmetic_text(args.get(3), "description")),
        icon: None,
    };

    upsert_community(session, ctx, &community_id, patch).await?;
    session.ensure_user(&deployer, ctx.closed_at).await?;
    session
        .promote_member(&community_id, &deployer, true, ctx.closed_at)
        .await?;

    info!(
        "Community {} created by {} at ledger {}",
        community_id, deployer, ctx.ledger
    );

    Ok(Outcome::Applied)
}

/// Factory `scorer`/`remove`: `[_, scorer]`. Hides the community.
pub async fn remove<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::CommunityRemove, ctx, args, 2) {
        return Ok(skip);
    }

    let community_id = address_arg(&args[1], "scorer")?;
    let Some(mut community) = session.get::<Community>(&community_id).await? else {
        return Ok(unresolved(
            EventKind::CommunityRemove,
            ctx,
            EntityKind::Community,
            &community_id,
        ));
    };

    community.is_hidden = true;
    community.last_modified_at = ctx.closed_at;
    session.save(community);

    info!("Community {} hidden at ledger {}", community_id, ctx.ledger);

    Ok(Outcome::Applied)
}

/// Scorer `init`/`contract`:
/// `[creator, managers, badges, name, description(, icon)]`.
///
/// `badges` is either a map `{badge id => score}` or a vector of
/// `{name, issuer, score}` records.
pub async fn init<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::CommunityInit, ctx, args, 5) {
        return Ok(skip);
    }

    let community_id = ctx.community_id();
    let creator = address_arg(&args[0], "creator")?;
    let managers = args[1]
        .as_vec()
        .map_err(|e| e.required("managers"))?
        .iter()
        .map(|m| address_arg(m, "manager"))
        .collect::<Result<Vec<_>>>()?;
    let badges = parse_badges(&args[2])?;

    let patch = CommunityPatch {
        creator_address: Some(creator.clone()),
        factory_address: None,
        name: Some(cosmetic_text(args.get(3), "name")),
        description: Some(cosmetic_text(args.get(4), "description")),
        icon: Some(cosmetic_text(args.get(5), "icon")),
    };
    let mut community = upsert_community(session, ctx, &community_id, patch).await?;

    session.ensure_user(&creator, ctx.closed_at).await?;
    session
        .promote_member(&community_id, &creator, true, ctx.closed_at)
        .await?;

    for manager in &managers {
        session.ensure_user(manager, ctx.closed_at).await?;
        session
            .promote_member(&community_id, manager, false, ctx.closed_at)
            .await?;
    }

    let mut added = 0u32;
    for (badge_id, score) in badges {
        let id = Badge::key(&badge_id.issuer, &community_id, &badge_id.name);
        if session.get::<Badge>(&id).await?.is_some() {
            debug!("Badge {} already exists, skipping", id);
            continue;
        }
        session.save(Badge {
            id,
            issuer: badge_id.issuer,
            community_id: community_id.clone(),
            name: badge_id.name,
            score,
            badge_type: BADGE_TYPE.to_string(),
            created_at: ctx.closed_at,
            removed_at: None,
        });
        added += 1;
    }

    if added > 0 {
        community.total_badges += added;
        session.save(community);
    }

    info!(
        "Community {} initialized: {} managers, {} new badges",
        community_id,
        managers.len(),
        added
    );

    Ok(Outcome::Applied)
}

/// Create the community, or merge the patch into the existing one.
async fn upsert_community<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    community_id: &str,
    patch: CommunityPatch,
) -> Result<Community> {
    let community = match session.get::<Community>(community_id).await? {
        Some(mut existing) => {
            if patch.apply(&mut existing) {
                debug!("Backfilled community {}", community_id);
            }
            existing.last_modified_at = ctx.closed_at;
            existing
        }
        None => patch.create(community_id, ctx.closed_at),
    };
    session.save(community.clone());
    Ok(community)
}

fn parse_badges(value: &WireValue) -> Result<Vec<(BadgeId, u32)>> {
    match value {
        WireValue::Map(entries) => entries
            .iter()
            .map(|(id, score)| -> Result<(BadgeId, u32)> {
                Ok((BadgeId::parse(id)?, u32_arg(score, "badge score")?))
            })
            .collect(),
        WireValue::Vec(records) => records
            .iter()
            .map(|record| -> Result<(BadgeId, u32)> {
                let score = record
                    .field(BADGE_FIELD_SCORE)
                    .map_err(|e| e.required("badge record"))?;
                Ok((BadgeId::parse(record)?, u32_arg(score, "badge score")?))
            })
            .collect(),
        WireValue::Void => Ok(Vec::new()),
        other => Err(DecodeError::TypeMismatch {
            expected: ScType::Map,
            found: other.sc_type(),
        }
        .required("badges")
        .into()),
    }
}
