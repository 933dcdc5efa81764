//! Ledger facts: token transfers, payments and balance effects.
//!
//! Each fact is appended once under its event or operation id, and every
//! account it mentions is marked seen at the fact's ledger.

use scorer_core::address::resolve_address;
use scorer_core::{ScAddress, WireValue};
use tracing::{debug, info};

use super::{address_arg, check_arity, EventContext, EventKind, HandlerError, Outcome, Result};
use crate::listener::events::{EffectKind, LedgerEffect, PaymentOperation};
use crate::reconciler::Session;
use crate::storage::{Credit, Debit, EntityStore, Payment, Transfer};

/// Account id for a strkey published by Horizon.
fn horizon_account_id(strkey: &str) -> String {
    resolve_address(&ScAddress::Encoded(strkey.to_string())).to_lowercase()
}

/// Token `transfer` event: topics `[transfer, from, to, ..]`, value = amount.
pub async fn transfer<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    ctx: &EventContext,
    topics: &[WireValue],
    value: &WireValue,
) -> Result<Outcome> {
    if let Some(skip) = check_arity(EventKind::Transfer, ctx, topics, 3) {
        return Ok(skip);
    }

    let from = address_arg(&topics[1], "from")?;
    let to = address_arg(&topics[2], "to")?;
    let amount = value
        .as_i128()
        .map_err(|e| HandlerError::from(e.required("amount")))?;

    session.touch_account(&from, ctx.ledger).await?;
    session.touch_account(&to, ctx.ledger).await?;
    session.save(Transfer {
        id: ctx.event_id.clone(),
        ledger: ctx.ledger,
        date: ctx.closed_at,
        contract: ctx.contract_id.clone(),
        from_id: from.clone(),
        to_id: to.clone(),
        value: amount,
    });

    debug!("Transfer {} from {} to {}: {}", ctx.event_id, from, to, amount);

    Ok(Outcome::Applied)
}

/// Payment operation.
pub async fn payment<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    op: &PaymentOperation,
) -> Result<Outcome> {
    info!("Indexing operation {}, type: payment", op.id);

    let from = session
        .touch_account(&horizon_account_id(&op.from), op.ledger)
        .await?;
    let to = session.touch_account(&horizon_account_id(&op.to), op.ledger).await?;
    session.save(Payment {
        id: op.id.clone(),
        from_id: from.id,
        to_id: to.id,
        tx_hash: op.transaction_hash.clone(),
        amount: op.amount.clone(),
    });

    Ok(Outcome::Applied)
}

/// Account credited or debited effect.
pub async fn effect<S: EntityStore + ?Sized>(
    session: &mut Session<'_, S>,
    effect: &LedgerEffect,
) -> Result<Outcome> {
    info!("Indexing effect {}, type: {}", effect.id, effect.kind);

    let account = session
        .touch_account(&horizon_account_id(&effect.account), effect.ledger)
        .await?;
    match effect.kind {
        EffectKind::AccountCredited => session.save(Credit {
            id: effect.id.clone(),
            account_id: account.id,
            amount: effect.amount.clone(),
        }),
        EffectKind::AccountDebited => session.save(Debit {
            id: effect.id.clone(),
            account_id: account.id,
            amount: effect.amount.clone(),
        }),
    }

    Ok(Outcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::storage::{Account, EntityKind, MemoryStore};
    use scorer_core::strkey::{self, StrkeyKind};

    #[tokio::test]
    async fn test_transfer_records_fact_and_accounts() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);
        let topics = vec![sym("transfer"), account(0x1), contract(0x2), text("native")];
        let outcome = transfer(&mut session, &ctx(0x7, 50), &topics, &WireValue::I128(-5))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Applied);
        session.commit().await.unwrap();

        let t = store.get::<Transfer>("evt-50").await.unwrap();
        assert_eq!(t.from_id, account_id(0x1));
        assert_eq!(t.to_id, contract_strkey(0x2).to_lowercase());
        assert_eq!(t.value, -5);
        assert_eq!(t.contract, contract_strkey(0x7));
        assert_eq!(store.count(EntityKind::Account).await, 2);
    }

    #[tokio::test]
    async fn test_transfer_needs_three_topics() {
        let store = MemoryStore::new();
        let mut session = Session::new(&store);
        let outcome = transfer(
            &mut session,
            &ctx(0x7, 50),
            &[sym("transfer"), account(0x1)],
            &WireValue::I128(1),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_payment_and_effects_share_accounts() {
        let store = MemoryStore::new();
        let alice = strkey::encode(StrkeyKind::Account, &[0xa; 32]);
        let bob = strkey::encode(StrkeyKind::Account, &[0xb; 32]);

        let mut session = Session::new(&store);
        payment(
            &mut session,
            &PaymentOperation {
                id: "op-1".into(),
                ledger: 7,
                from: alice.clone(),
                to: bob.clone(),
                amount: "12.5000000".into(),
                transaction_hash: "abc".into(),
            },
        )
        .await
        .unwrap();
        session.commit().await.unwrap();

        let mut session = Session::new(&store);
        effect(
            &mut session,
            &LedgerEffect {
                id: "eff-1".into(),
                ledger: 9,
                kind: EffectKind::AccountDebited,
                account: alice.clone(),
                amount: "12.5000000".into(),
            },
        )
        .await
        .unwrap();
        session.commit().await.unwrap();

        let payment = store.get::<Payment>("op-1").await.unwrap();
        assert_eq!(payment.from_id, alice.to_lowercase());
        assert_eq!(payment.tx_hash, "abc");

        let account = store.get::<Account>(&alice.to_lowercase()).await.unwrap();
        assert_eq!(account.first_seen_ledger, 7);
        assert_eq!(account.last_seen_ledger, Some(9));
        assert!(store.get::<Debit>("eff-1").await.is_some());
        assert_eq!(store.count(EntityKind::Credit).await, 0);
    }
}
