//! Read-side aggregates for the dashboard and the customer card.

use chrono::{Datelike, Duration};
use sqlx::SqlitePool;

use crate::{
    clock::BusinessTime,
    error::ApiResult,
    ledger::{self, DateRange},
    models::{AppointmentRow, AppointmentStatus, CustomerHistory, DashboardStats},
};

const DAY: &str = "%Y-%m-%d";
const HISTORY_LIMIT: i64 = 1000;

/// Recomputed on every call.
pub async fn dashboard(pool: &SqlitePool, time: &BusinessTime) -> ApiResult<DashboardStats> {
    let today = time.today();
    let today_key = today.format(DAY).to_string();
    let week_start = (today - Duration::days(7)).format(DAY).to_string();
    let month_start = today
        .with_day(1)
        .unwrap_or(today)
        .format(DAY)
        .to_string();

    let today_appointments =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM appointments WHERE appointment_date = ?")
            .bind(&today_key)
            .fetch_one(pool)
            .await?;

    let today_completed = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM appointments WHERE appointment_date = ? AND status = ?",
    )
    .bind(&today_key)
    .bind(AppointmentStatus::Completed)
    .fetch_one(pool)
    .await?;

    let today_income = ledger::total(
        pool,
        &DateRange {
            start_date: Some(today_key.clone()),
            end_date: Some(today_key),
        },
    )
    .await?;
    let week_income = ledger::total(
        pool,
        &DateRange {
            start_date: Some(week_start),
            end_date: None,
        },
    )
    .await?;
    let month_income = ledger::total(
        pool,
        &DateRange {
            start_date: Some(month_start),
            end_date: None,
        },
    )
    .await?;

    Ok(DashboardStats {
        today_appointments,
        today_completed,
        today_income,
        week_income,
        month_income,
    })
}

/// Every appointment booked under exactly `phone`, newest first.
pub async fn customer_history(pool: &SqlitePool, phone: &str) -> ApiResult<CustomerHistory> {
    let appointments = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, customer_name, phone, address, service_id, service_name, service_price,
                  appointment_date, appointment_time, notes, status, created_at, completed_at
           FROM appointments
           WHERE phone = ?
           ORDER BY appointment_date DESC, appointment_time DESC
           LIMIT ?"#,
    )
    .bind(phone)
    .bind(HISTORY_LIMIT)
    .fetch_all(pool)
    .await?;

    let completed_appointments = appointments
        .iter()
        .filter(|row| row.status == AppointmentStatus::Completed)
        .count();

    Ok(CustomerHistory {
        phone: phone.to_string(),
        total_appointments: appointments.len(),
        completed_appointments,
        appointments,
    })
}
