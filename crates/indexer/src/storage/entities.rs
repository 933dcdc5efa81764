//! Entity storage operations.
//!
//! Every entity table is keyed by `id`; writes are upserts so that
//! re-delivered events converge on the same rows.

use super::{from_unix, Account, Badge, ChangeSet, Community, CommunityMember, Credit, Debit};
use super::{Entity, EntityKind, Mutation, Payment, Storage, Transfer, User, UserAddition};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

impl Storage {
    /// Fetch one entity by kind and id.
    pub async fn load_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let sql = match kind {
            EntityKind::User => "SELECT id, created_at FROM users WHERE id = ?",
            EntityKind::Community => {
                r#"
                SELECT id, creator_address, factory_address, name, description, icon,
                       is_hidden, created_at, total_badges, last_modified_at
                FROM communities WHERE id = ?
                "#
            }
            EntityKind::CommunityMember => {
                r#"
                SELECT id, community_id, user_id, is_manager, is_creator, is_member,
                       points, last_indexed_at
                FROM community_members WHERE id = ?
                "#
            }
            EntityKind::Badge => {
                r#"
                SELECT id, issuer, community_id, name, score, badge_type, created_at, removed_at
                FROM badges WHERE id = ?
                "#
            }
            EntityKind::Account => {
                "SELECT id, first_seen_ledger, last_seen_ledger FROM accounts WHERE id = ?"
            }
            EntityKind::Payment => {
                "SELECT id, from_id, to_id, tx_hash, amount FROM payments WHERE id = ?"
            }
            EntityKind::Credit => "SELECT id, account_id, amount FROM credits WHERE id = ?",
            EntityKind::Debit => "SELECT id, account_id, amount FROM debits WHERE id = ?",
            EntityKind::Transfer => {
                "SELECT id, ledger, date, contract, from_id, to_id, value FROM transfers WHERE id = ?"
            }
            EntityKind::UserAddition => {
                r#"
                SELECT id, ledger, timestamp, sender_id, user_id, contract
                FROM user_additions WHERE id = ?
                "#
            }
        };

        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {} '{}'", kind, id))?;

        row.map(|row| entity_from_row(kind, &row)).transpose()
    }

    /// Apply a change set inside a single transaction.
    ///
    /// Any failing write rolls back the whole batch.
    pub async fn commit_changes(&self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let count = changes.len();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for mutation in changes.into_mutations() {
            match mutation {
                Mutation::Save(entity) => {
                    let (kind, id) = (entity.kind(), entity.id().to_string());
                    upsert_entity(&mut *tx, &entity)
                        .await
                        .with_context(|| format!("Failed to save {} '{}'", kind, id))?;
                }
                Mutation::Remove(kind, id) => {
                    let sql = format!("DELETE FROM {} WHERE id = ?", kind.as_str());
                    sqlx::query(&sql)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to remove {} '{}'", kind, id))?;
                }
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;

        debug!("Committed {} entity writes", count);

        Ok(())
    }
}

fn entity_from_row(kind: EntityKind, row: &SqliteRow) -> Result<Entity> {
    let entity = match kind {
        EntityKind::User => Entity::User(User {
            id: row.get("id"),
            created_at: from_unix(row.get("created_at")),
        }),
        EntityKind::Community => Entity::Community(Community {
            id: row.get("id"),
            creator_address: row.get("creator_address"),
            factory_address: row.get("factory_address"),
            name: row.get("name"),
            description: row.get("description"),
            icon: row.get("icon"),
            is_hidden: row.get("is_hidden"),
            created_at: from_unix(row.get("created_at")),
            total_badges: row.get::<i64, _>("total_badges") as u32,
            last_modified_at: from_unix(row.get("last_modified_at")),
        }),
        EntityKind::CommunityMember => Entity::CommunityMember(CommunityMember {
            id: row.get("id"),
            community_id: row.get("community_id"),
            user_id: row.get("user_id"),
            is_manager: row.get("is_manager"),
            is_creator: row.get("is_creator"),
            is_member: row.get("is_member"),
            points: row.get("points"),
            last_indexed_at: from_unix(row.get("last_indexed_at")),
        }),
        EntityKind::Badge => Entity::Badge(Badge {
            id: row.get("id"),
            issuer: row.get("issuer"),
            community_id: row.get("community_id"),
            name: row.get("name"),
            score: row.get::<i64, _>("score") as u32,
            badge_type: row.get("badge_type"),
            created_at: from_unix(row.get("created_at")),
            removed_at: row.get::<Option<i64>, _>("removed_at").map(from_unix),
        }),
        EntityKind::Account => Entity::Account(Account {
            id: row.get("id"),
            first_seen_ledger: row.get::<i64, _>("first_seen_ledger") as u32,
            last_seen_ledger: row
                .get::<Option<i64>, _>("last_seen_ledger")
                .map(|v| v as u32),
        }),
        EntityKind::Payment => Entity::Payment(Payment {
            id: row.get("id"),
            from_id: row.get("from_id"),
            to_id: row.get("to_id"),
            tx_hash: row.get("tx_hash"),
            amount: row.get("amount"),
        }),
        EntityKind::Credit => Entity::Credit(Credit {
            id: row.get("id"),
            account_id: row.get("account_id"),
            amount: row.get("amount"),
        }),
        EntityKind::Debit => Entity::Debit(Debit {
            id: row.get("id"),
            account_id: row.get("account_id"),
            amount: row.get("amount"),
        }),
        EntityKind::Transfer => {
            let value: String = row.get("value");
            Entity::Transfer(Transfer {
                id: row.get("id"),
                ledger: row.get::<i64, _>("ledger") as u32,
                date: from_unix(row.get("date")),
                contract: row.get("contract"),
                from_id: row.get("from_id"),
                to_id: row.get("to_id"),
                value: value
                    .parse()
                    .with_context(|| format!("Invalid transfer value '{}'", value))?,
            })
        }
        EntityKind::UserAddition => Entity::UserAddition(UserAddition {
            id: row.get("id"),
            ledger: row.get::<i64, _>("ledger") as u32,
            timestamp: from_unix(row.get("timestamp")),
            sender_id: row.get("sender_id"),
            user_id: row.get("user_id"),
            contract: row.get("contract"),
        }),
    };

    Ok(entity)
}

async fn upsert_entity(conn: &mut SqliteConnection, entity: &Entity) -> Result<()> {
    match entity {
        Entity::User(user) => {
            sqlx::query(
                r#"
                INSERT INTO users (id, created_at) VALUES (?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&user.id)
            .bind(user.created_at.timestamp())
            .execute(&mut *conn)
            .await?;
        }
        Entity::Community(c) => {
            sqlx::query(
                r#"
                INSERT INTO communities (
                    id, creator_address, factory_address, name, description, icon,
                    is_hidden, created_at, total_badges, last_modified_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    creator_address = excluded.creator_address,
                    factory_address = excluded.factory_address,
                    name = excluded.name,
                    description = excluded.description,
                    icon = excluded.icon,
                    is_hidden = excluded.is_hidden,
                    total_badges = excluded.total_badges,
                    last_modified_at = excluded.last_modified_at
                "#,
            )
            .bind(&c.id)
            .bind(&c.creator_address)
            .bind(&c.factory_address)
            .bind(&c.name)
            .bind(&c.description)
            .bind(&c.icon)
            .bind(c.is_hidden)
            .bind(c.created_at.timestamp())
            .bind(i64::from(c.total_badges))
            .bind(c.last_modified_at.timestamp())
            .execute(&mut *conn)
            .await?;
        }
        Entity::CommunityMember(m) => {
            sqlx::query(
                r#"
                INSERT INTO community_members (
                    id, community_id, user_id, is_manager, is_creator, is_member,
                    points, last_indexed_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    is_manager = excluded.is_manager,
                    is_creator = excluded.is_creator,
                    is_member = excluded.is_member,
                    points = excluded.points,
                    last_indexed_at = excluded.last_indexed_at
                "#,
            )
            .bind(&m.id)
            .bind(&m.community_id)
            .bind(&m.user_id)
            .bind(m.is_manager)
            .bind(m.is_creator)
            .bind(m.is_member)
            .bind(m.points)
            .bind(m.last_indexed_at.timestamp())
            .execute(&mut *conn)
            .await?;
        }
        Entity::Badge(b) => {
            sqlx::query(
                r#"
                INSERT INTO badges (
                    id, issuer, community_id, name, score, badge_type, created_at, removed_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    score = excluded.score,
                    badge_type = excluded.badge_type,
                    removed_at = excluded.removed_at
                "#,
            )
            .bind(&b.id)
            .bind(&b.issuer)
            .bind(&b.community_id)
            .bind(&b.name)
            .bind(i64::from(b.score))
            .bind(&b.badge_type)
            .bind(b.created_at.timestamp())
            .bind(b.removed_at.map(|t| t.timestamp()))
            .execute(&mut *conn)
            .await?;
        }
        Entity::Account(a) => {
            sqlx::query(
                r#"
                INSERT INTO accounts (id, first_seen_ledger, last_seen_ledger)
                VALUES (?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    last_seen_ledger = excluded.last_seen_ledger
                "#,
            )
            .bind(&a.id)
            .bind(i64::from(a.first_seen_ledger))
            .bind(a.last_seen_ledger.map(i64::from))
            .execute(&mut *conn)
            .await?;
        }
        Entity::Payment(p) => {
            sqlx::query(
                r#"
                INSERT INTO payments (id, from_id, to_id, tx_hash, amount)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&p.id)
            .bind(&p.from_id)
            .bind(&p.to_id)
            .bind(&p.tx_hash)
            .bind(&p.amount)
            .execute(&mut *conn)
            .await?;
        }
        Entity::Credit(c) => {
            sqlx::query(
                "INSERT INTO credits (id, account_id, amount) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
            )
            .bind(&c.id)
            .bind(&c.account_id)
            .bind(&c.amount)
            .execute(&mut *conn)
            .await?;
        }
        Entity::Debit(d) => {
            sqlx::query(
                "INSERT INTO debits (id, account_id, amount) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
            )
            .bind(&d.id)
            .bind(&d.account_id)
            .bind(&d.amount)
            .execute(&mut *conn)
            .await?;
        }
        Entity::Transfer(t) => {
            sqlx::query(
                r#"
                INSERT INTO transfers (id, ledger, date, contract, from_id, to_id, value)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&t.id)
            .bind(i64::from(t.ledger))
            .bind(t.date.timestamp())
            .bind(&t.contract)
            .bind(&t.from_id)
            .bind(&t.to_id)
            .bind(t.value.to_string())
            .execute(&mut *conn)
            .await?;
        }
        Entity::UserAddition(u) => {
            sqlx::query(
                r#"
                INSERT INTO user_additions (id, ledger, timestamp, sender_id, user_id, contract)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&u.id)
            .bind(i64::from(u.ledger))
            .bind(u.timestamp.timestamp())
            .bind(&u.sender_id)
            .bind(&u.user_id)
            .bind(&u.contract)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}
