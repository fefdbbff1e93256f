//! Cash ledger: one income entry per completion event.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::{
    auth::new_id,
    error::{ApiError, ApiResult},
    models::{AppointmentRow, Money, TransactionRow},
};

/// Values copied from an appointment at the moment it completes.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub appointment_id: String,
    pub customer_name: String,
    pub service_name: String,
    pub amount: Money,
    pub date: String,
}

impl From<&AppointmentRow> for LedgerSnapshot {
    fn from(row: &AppointmentRow) -> Self {
        Self {
            appointment_id: row.id.clone(),
            customer_name: row.customer_name.clone(),
            service_name: row.service_name.clone(),
            amount: row.service_price,
            date: row.appointment_date.clone(),
        }
    }
}

/// Inclusive date window; an open bound is unrestricted.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Appends an entry stamped `posted_at`. No dedup: the caller posts once per
/// completion.
pub async fn post_entry<'e, E>(
    executor: E,
    snapshot: &LedgerSnapshot,
    posted_at: DateTime<Utc>,
) -> Result<TransactionRow, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = TransactionRow {
        id: new_id(),
        appointment_id: snapshot.appointment_id.clone(),
        customer_name: snapshot.customer_name.clone(),
        service_name: snapshot.service_name.clone(),
        amount: snapshot.amount,
        date: snapshot.date.clone(),
        created_at: posted_at.to_rfc3339(),
    };

    sqlx::query(
        r#"INSERT INTO transactions (id, appointment_id, customer_name, service_name, amount, date, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.appointment_id)
    .bind(&row.customer_name)
    .bind(&row.service_name)
    .bind(row.amount.to_db())
    .bind(&row.date)
    .bind(&row.created_at)
    .execute(executor)
    .await?;

    Ok(row)
}

/// Entries inside `range`, newest date first.
pub async fn query(pool: &SqlitePool, range: &DateRange) -> ApiResult<Vec<TransactionRow>> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"SELECT id, appointment_id, customer_name, service_name, amount, date, created_at
           FROM transactions
           WHERE (?1 IS NULL OR date >= ?1)
             AND (?2 IS NULL OR date <= ?2)
           ORDER BY date DESC, created_at DESC
           LIMIT 1000"#,
    )
    .bind(range.start_date.as_deref())
    .bind(range.end_date.as_deref())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Sum of amounts inside `range`.
pub async fn total(pool: &SqlitePool, range: &DateRange) -> ApiResult<Money> {
    let amounts = sqlx::query_scalar::<_, String>(
        r#"SELECT amount FROM transactions
           WHERE (?1 IS NULL OR date >= ?1)
             AND (?2 IS NULL OR date <= ?2)"#,
    )
    .bind(range.start_date.as_deref())
    .bind(range.end_date.as_deref())
    .fetch_all(pool)
    .await?;

    amounts
        .into_iter()
        .map(|raw| {
            Money::try_from(raw)
                .map_err(|err| ApiError::Internal(format!("corrupt ledger amount: {err}")))
        })
        .sum()
}

pub async fn find(pool: &SqlitePool, id: &str) -> ApiResult<Option<TransactionRow>> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"SELECT id, appointment_id, customer_name, service_name, amount, date, created_at
           FROM transactions WHERE id = ? LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Overwrites the amount only.
pub async fn update_amount(pool: &SqlitePool, id: &str, amount: Money) -> ApiResult<TransactionRow> {
    let result = sqlx::query("UPDATE transactions SET amount = ? WHERE id = ?")
        .bind(amount.to_db())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Transaction"));
    }

    find(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction"))
}

pub async fn delete(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Transaction"));
    }
    Ok(())
}
