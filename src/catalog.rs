//! Services and the settings singleton.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    cache::ResponseCache,
    error::{ApiError, ApiResult},
    models::{Money, ServiceInput, ServicePatch, ServiceRow, Settings, SETTINGS_ID},
};

const SERVICES: &str = "services";
const SETTINGS: &str = "settings";

fn validate_service(name: Option<&str>, price: Option<&Money>) -> ApiResult<()> {
    if name.is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::Validation("Service name is required.".to_string()));
    }
    if price.is_some_and(|price| price.is_negative()) {
        return Err(ApiError::Validation("Service price cannot be negative.".to_string()));
    }
    Ok(())
}

pub async fn create_service(
    pool: &SqlitePool,
    cache: &ResponseCache,
    input: ServiceInput,
    now: DateTime<Utc>,
) -> ApiResult<ServiceRow> {
    validate_service(Some(&input.name), Some(&input.price))?;

    let row = ServiceRow {
        id: new_id(),
        name: input.name.trim().to_string(),
        price: input.price,
        created_at: now.to_rfc3339(),
    };

    sqlx::query("INSERT INTO services (id, name, price, created_at) VALUES (?, ?, ?, ?)")
        .bind(&row.id)
        .bind(&row.name)
        .bind(row.price.to_db())
        .bind(&row.created_at)
        .execute(pool)
        .await?;

    cache.invalidate(SERVICES).await;
    Ok(row)
}

pub async fn list_services(pool: &SqlitePool, cache: &ResponseCache) -> ApiResult<Vec<ServiceRow>> {
    cache
        .get_or_load(ResponseCache::key(SERVICES, "list", ""), || async {
            let rows = sqlx::query_as::<_, ServiceRow>(
                "SELECT id, name, price, created_at FROM services ORDER BY created_at LIMIT 1000",
            )
            .fetch_all(pool)
            .await?;
            Ok::<_, ApiError>(rows)
        })
        .await
}

/// Uncached lookup; the scheduler snapshots from this.
pub async fn find_service(pool: &SqlitePool, id: &str) -> ApiResult<Option<ServiceRow>> {
    let row = sqlx::query_as::<_, ServiceRow>(
        "SELECT id, name, price, created_at FROM services WHERE id = ? LIMIT 1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_service(pool: &SqlitePool, cache: &ResponseCache, id: &str) -> ApiResult<ServiceRow> {
    cache
        .get_or_load(ResponseCache::key(SERVICES, "get", id), || async {
            find_service(pool, id)
                .await?
                .ok_or_else(|| ApiError::not_found("Service"))
        })
        .await
}

pub async fn update_service(
    pool: &SqlitePool,
    cache: &ResponseCache,
    id: &str,
    patch: ServicePatch,
) -> ApiResult<ServiceRow> {
    validate_service(patch.name.as_deref(), patch.price.as_ref())?;

    let mut service = find_service(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service"))?;
    if let Some(name) = patch.name {
        service.name = name.trim().to_string();
    }
    if let Some(price) = patch.price {
        service.price = price;
    }

    sqlx::query("UPDATE services SET name = ?, price = ? WHERE id = ?")
        .bind(&service.name)
        .bind(service.price.to_db())
        .bind(id)
        .execute(pool)
        .await?;

    cache.invalidate(SERVICES).await;
    Ok(service)
}

/// Appointments keep their snapshot; nothing cascades.
pub async fn delete_service(pool: &SqlitePool, cache: &ResponseCache, id: &str) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Service"));
    }
    cache.invalidate(SERVICES).await;
    Ok(())
}

/// Reads the singleton, materializing defaults on first access.
pub async fn get_settings(pool: &SqlitePool, cache: &ResponseCache) -> ApiResult<Settings> {
    cache
        .get_or_load(ResponseCache::key(SETTINGS, "get", SETTINGS_ID), || async {
            let existing = sqlx::query_as::<_, Settings>(
                "SELECT work_start_hour, work_end_hour, appointment_interval FROM settings WHERE id = ?",
            )
            .bind(SETTINGS_ID)
            .fetch_optional(pool)
            .await?;

            if let Some(settings) = existing {
                return Ok(settings);
            }

            let defaults = Settings::default();
            sqlx::query(
                r#"INSERT INTO settings (id, work_start_hour, work_end_hour, appointment_interval)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT(id) DO NOTHING"#,
            )
            .bind(SETTINGS_ID)
            .bind(defaults.work_start_hour)
            .bind(defaults.work_end_hour)
            .bind(defaults.appointment_interval)
            .execute(pool)
            .await?;
            Ok::<_, ApiError>(defaults)
        })
        .await
}

pub async fn put_settings(pool: &SqlitePool, cache: &ResponseCache, settings: Settings) -> ApiResult<Settings> {
    sqlx::query(
        r#"INSERT INTO settings (id, work_start_hour, work_end_hour, appointment_interval)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
             work_start_hour = excluded.work_start_hour,
             work_end_hour = excluded.work_end_hour,
             appointment_interval = excluded.appointment_interval"#,
    )
    .bind(SETTINGS_ID)
    .bind(settings.work_start_hour)
    .bind(settings.work_end_hour)
    .bind(settings.appointment_interval)
    .execute(pool)
    .await?;

    cache.invalidate(SETTINGS).await;
    Ok(settings)
}
