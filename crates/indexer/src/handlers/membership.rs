//! Membership events: user and manager add/remove.

use scorer_core::{DecodeError, WireValue};
use tracing::info;

use super::{
    address_arg, check_arity, owning_community, unresolved, EventContext, EventKind, Outcome,
    RemovalPolicy, Result,
};
use crate::reconciler::Session;
use crate::storage::{CommunityMember, EntityKind, EntityStore, UserAddition};

/// Split `[sender,] user` into its parts.
///
/// Single-argument revisions carry only the user.
fn sender_and_user(args: &[WireValue]) -> Result<(Option<String>, String)> {
    match args {
        [user] => Ok((None, address_arg(user, "user")?)),
        [sender, user, ..] => Ok((
            Some(address_arg(sender, "sender")?),
            address_arg(user, "user")?,
        )),
        [] => Err(DecodeError::malformed("missing user argument").into()),
    }
}

/// `user`/`add`: `[sender,] user`.
pub async fn user_add<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::UserAdd, ctx, args, 1) {
        return Ok(skip);
    }

    let (sender, user) = sender_and_user(args)?;
    let Some(community) = owning_community(session, ctx).await? else {
        return Ok(unresolved(
            EventKind::UserAdd,
            ctx,
            EntityKind::Community,
            &ctx.community_id(),
        ));
    };

    session.ensure_user(&user, ctx.closed_at).await?;
    session
        .activate_member(&community.id, &user, ctx.closed_at)
        .await?;

    if let Some(sender) = &sender {
        session.touch_account(sender, ctx.ledger).await?;
    }
    session.touch_account(&user, ctx.ledger).await?;
    session.save(UserAddition {
        id: ctx.event_id.clone(),
        ledger: ctx.ledger,
        timestamp: ctx.closed_at,
        sender_id: sender.unwrap_or_default(),
        user_id: user.clone(),
        contract: ctx.contract_id.clone(),
    });

    info!(
        "User {} joined community {} at ledger {}",
        user, community.id, ctx.ledger
    );

    Ok(Outcome::Applied)
}

/// `user`/`remove`: `[sender,] user`.
pub async fn user_remove<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
    policy: RemovalPolicy,
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::UserRemove, ctx, args, 1) {
        return Ok(skip);
    }

    let (_, user) = sender_and_user(args)?;
    let Some(community) = owning_community(session, ctx).await? else {
        return Ok(unresolved(
            EventKind::UserRemove,
            ctx,
            EntityKind::Community,
            &ctx.community_id(),
        ));
    };

    let member_id = CommunityMember::key(&community.id, &user);
    let Some(mut member) = session.get::<CommunityMember>(&member_id).await? else {
        return Ok(unresolved(
            EventKind::UserRemove,
            ctx,
            EntityKind::CommunityMember,
            &member_id,
        ));
    };

    match policy {
        RemovalPolicy::Soft => {
            member.is_member = false;
            member.last_indexed_at = ctx.closed_at;
            session.save(member);
        }
        RemovalPolicy::Hard => session.remove(EntityKind::CommunityMember, &member_id),
    }

    info!(
        "User {} left community {} at ledger {}",
        user, community.id, ctx.ledger
    );

    Ok(Outcome::Applied)
}

/// `manager`/`add`: `[sender, manager]`.
pub async fn manager_add<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::ManagerAdd, ctx, args, 2) {
        return Ok(skip);
    }

    let manager = address_arg(&args[1], "manager")?;
    let Some(community) = owning_community(session, ctx).await? else {
        return Ok(unresolved(
            EventKind::ManagerAdd,
            ctx,
            EntityKind::Community,
            &ctx.community_id(),
        ));
    };

    session.ensure_user(&manager, ctx.closed_at).await?;
    session
        .promote_member(&community.id, &manager, false, ctx.closed_at)
        .await?;

    info!("Manager {} added to community {}", manager, community.id);

    Ok(Outcome::Applied)
}

/// `manager`/`remove`: `[sender, manager]`. Clears the manager flag only.
pub async fn manager_remove<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    args: &[WireValue],
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::ManagerRemove, ctx, args, 2) {
        return Ok(skip);
    }

    let manager = address_arg(&args[1], "manager")?;
    let Some(community) = owning_community(session, ctx).await? else {
        return Ok(unresolved(
            EventKind::ManagerRemove,
            ctx,
            EntityKind::Community,
            &ctx.community_id(),
        ));
    };

    let member_id = CommunityMember::key(&community.id, &manager);
    let Some(mut member) = session.get::<CommunityMember>(&member_id).await? else {
        return Ok(unresolved(
            EventKind::ManagerRemove,
            ctx,
            EntityKind::CommunityMember,
            &member_id,
        ));
    };

    member.is_manager = false;
    member.last_indexed_at = ctx.closed_at;
    session.save(member);

    info!("Manager {} removed from community {}", manager, community.id);

    Ok(Outcome::Applied)
}
