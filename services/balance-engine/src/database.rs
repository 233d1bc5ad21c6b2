use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    BalanceMap, Group, GroupId, GroupStore, LedgerStore, LoanRecord, NewLoan, UserId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

fn storage_error(err: sqlx::Error) -> ledger_core::Error {
    ledger_core::Error::Storage(err.to_string())
}

fn group_from_row(row: &PgRow) -> std::result::Result<Group, sqlx::Error> {
    Ok(Group {
        id: GroupId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        owner_id: UserId::from_uuid(row.try_get("owner_id")?),
        created_at: row.try_get("created_at")?,
    })
}

/// Postgres-backed loan ledger and group directory
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    /// Apply embedded schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Check connectivity
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for Database {
    async fn append(&self, loans: &[NewLoan]) -> ledger_core::Result<Vec<LoanRecord>> {
        for loan in loans {
            loan.validate()?;
        }

        let created_at: DateTime<Utc> = Utc::now();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut records = Vec::with_capacity(loans.len());

        for loan in loans {
            let id = Uuid::now_v7();

            sqlx::query(
                r#"
                INSERT INTO loans (id, lender_id, debtor_id, amount, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(loan.lender.as_uuid())
            .bind(loan.debtor.as_uuid())
            .bind(loan.amount)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            records.push(LoanRecord {
                id,
                lender: loan.lender,
                debtor: loan.debtor,
                amount: loan.amount,
                created_at,
            });
        }

        tx.commit().await.map_err(storage_error)?;

        debug!(count = records.len(), "Inserted loan records");
        Ok(records)
    }

    async fn compute_balance(&self, user: UserId) -> ledger_core::Result<BalanceMap> {
        let rows = sqlx::query(
            r#"
            SELECT counterparty, SUM(amount)::BIGINT AS balance
            FROM (
                SELECT debtor_id AS counterparty, amount
                FROM loans
                WHERE lender_id = $1
                UNION ALL
                SELECT lender_id AS counterparty, -amount
                FROM loans
                WHERE debtor_id = $1
            ) AS contributions
            GROUP BY counterparty
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut balance = BalanceMap::with_capacity(rows.len());
        for row in rows {
            let counterparty: Uuid = row.try_get("counterparty").map_err(storage_error)?;
            let amount: i64 = row.try_get("balance").map_err(storage_error)?;
            balance.insert(UserId::from_uuid(counterparty), amount);
        }

        Ok(balance)
    }
}

#[async_trait]
impl GroupStore for Database {
    async fn create_group(&self, name: &str, owner: UserId) -> ledger_core::Result<Group> {
        let row = sqlx::query(
            r#"
            INSERT INTO groups (id, name, owner_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner.as_uuid())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        group_from_row(&row).map_err(storage_error)
    }

    async fn group_by_id(&self, group: GroupId) -> ledger_core::Result<Option<Group>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, owner_id, created_at FROM groups WHERE id = $1
            "#,
        )
        .bind(group.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref()
            .map(group_from_row)
            .transpose()
            .map_err(storage_error)
    }

    async fn delete_group(&self, group: GroupId) -> ledger_core::Result<bool> {
        // Memberships go with the group through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_members(&self, group: GroupId, members: &[UserId]) -> ledger_core::Result<()> {
        let ids: Vec<Uuid> = members.iter().map(|m| m.as_uuid()).collect();

        sqlx::query(
            r#"
            INSERT INTO group_membership (group_id, member_id)
            SELECT $1, member_id FROM UNNEST($2::uuid[]) AS member_id
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group.as_uuid())
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn remove_member(&self, group: GroupId, member: UserId) -> ledger_core::Result<bool> {
        let result = sqlx::query(
            "DELETE FROM group_membership WHERE group_id = $1 AND member_id = $2",
        )
        .bind(group.as_uuid())
        .bind(member.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn members(&self, group: GroupId) -> ledger_core::Result<Vec<UserId>> {
        let rows = sqlx::query(
            r#"
            SELECT member_id FROM group_membership
            WHERE group_id = $1
            ORDER BY member_id
            "#,
        )
        .bind(group.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("member_id").map(UserId::from_uuid))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_error)
    }

    async fn groups_by_user(&self, user: UserId) -> ledger_core::Result<Vec<Group>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT g.id, g.name, g.owner_id, g.created_at
            FROM groups g
            LEFT JOIN group_membership m ON m.group_id = g.id
            WHERE g.owner_id = $1 OR m.member_id = $1
            ORDER BY g.created_at
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(group_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_error)
    }
}
