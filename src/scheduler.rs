//! Appointment lifecycle: slot conflicts, initial status, the read-time
//! completion sweep and the ledger/notification side effects of status changes.

use sqlx::{Executor, Sqlite, SqlitePool, Transaction};

use crate::{
    auth::new_id,
    catalog,
    clock::BusinessTime,
    error::{ApiError, ApiResult},
    ledger::{self, LedgerSnapshot},
    models::{AppointmentFilter, AppointmentInput, AppointmentPatch, AppointmentRow, AppointmentStatus},
    sms::{Delivery, MessageTemplates, Notifier},
};

const LIST_LIMIT: usize = 1000;

// Take the write lock before the slot check so racing bookings queue on the
// busy timeout instead of failing the lock upgrade.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

/// A committed record plus the outcome of the notification it triggered, if
/// any. A failed delivery never turns the operation into an error.
#[derive(Debug)]
pub struct Notified<T> {
    pub record: T,
    pub delivery: Option<Delivery>,
}

pub struct Scheduler<'a> {
    db: &'a SqlitePool,
    time: &'a BusinessTime,
    notifier: &'a dyn Notifier,
    messages: &'a MessageTemplates,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        db: &'a SqlitePool,
        time: &'a BusinessTime,
        notifier: &'a dyn Notifier,
        messages: &'a MessageTemplates,
    ) -> Self {
        Self {
            db,
            time,
            notifier,
            messages,
        }
    }

    pub async fn create(&self, input: AppointmentInput) -> ApiResult<Notified<AppointmentRow>> {
        let service = catalog::find_service(self.db, &input.service_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Service"))?;

        let (status, completed_at) = match self
            .time
            .is_past_completion(&input.appointment_date, &input.appointment_time)
        {
            Ok(true) => (AppointmentStatus::Completed, Some(self.time.now_utc().to_rfc3339())),
            Ok(false) => (AppointmentStatus::Pending, None),
            Err(err) => {
                log::warn!("Could not resolve appointment status, keeping it pending: {err}");
                (AppointmentStatus::Pending, None)
            }
        };

        let row = AppointmentRow {
            id: new_id(),
            customer_name: input.customer_name,
            phone: input.phone,
            address: input.address,
            service_id: service.id,
            service_name: service.name,
            service_price: service.price,
            appointment_date: input.appointment_date,
            appointment_time: input.appointment_time,
            notes: input.notes,
            status,
            created_at: self.time.now_utc().to_rfc3339(),
            completed_at,
        };

        let mut tx = self.begin_write().await?;
        if slot_taken(&mut *tx, &row.appointment_date, &row.appointment_time, None)
            .await
            .map_err(write_error)?
        {
            return Err(ApiError::slot_taken(&row.appointment_date, &row.appointment_time));
        }
        insert_appointment(&mut *tx, &row)
            .await
            .map_err(|err| slot_error(err, &row))?;
        if row.status == AppointmentStatus::Completed {
            ledger::post_entry(&mut *tx, &LedgerSnapshot::from(&row), self.time.now_utc())
                .await
                .map_err(write_error)?;
        }
        tx.commit().await.map_err(write_error)?;

        let message = self.messages.booking_confirmed(
            &row.customer_name,
            &row.appointment_date,
            &row.appointment_time,
        );
        let delivery = self.notify(&row.phone, &message).await;

        Ok(Notified {
            record: row,
            delivery: Some(delivery),
        })
    }

    /// Filtered listing. Overdue pending rows in the result are completed and
    /// posted to the ledger before returning; no notification is sent for them.
    pub async fn list(&self, filter: &AppointmentFilter) -> ApiResult<Vec<AppointmentRow>> {
        let mut rows = sqlx::query_as::<_, AppointmentRow>(
            r#"SELECT id, customer_name, phone, address, service_id, service_name, service_price,
                      appointment_date, appointment_time, notes, status, created_at, completed_at
               FROM appointments
               WHERE (?1 IS NULL OR appointment_date = ?1)
                 AND (?2 IS NULL OR status = ?2)
               ORDER BY appointment_date DESC, appointment_time DESC"#,
        )
        .bind(filter.date.as_deref())
        .bind(filter.status)
        .fetch_all(self.db)
        .await?;

        if let Some(needle) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
        {
            let needle = needle.to_lowercase();
            rows.retain(|row| {
                row.customer_name.to_lowercase().contains(&needle)
                    || row.phone.to_lowercase().contains(&needle)
            });
        }
        rows.truncate(LIST_LIMIT);

        self.sweep(&mut rows).await?;
        Ok(rows)
    }

    /// Completes every pending row whose threshold has passed, in one batch.
    /// Each transition is conditional on the row still being pending, so a
    /// concurrent sweep never posts a second ledger entry.
    async fn sweep(&self, rows: &mut [AppointmentRow]) -> ApiResult<usize> {
        let due: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status == AppointmentStatus::Pending)
            .filter_map(|(index, row)| {
                match self
                    .time
                    .is_past_completion(&row.appointment_date, &row.appointment_time)
                {
                    Ok(true) => Some(index),
                    Ok(false) => None,
                    Err(err) => {
                        log::warn!("Skipping appointment {} during sweep: {err}", row.id);
                        None
                    }
                }
            })
            .collect();

        if due.is_empty() {
            return Ok(0);
        }

        let completed_at = self.time.now_utc().to_rfc3339();
        let mut applied = Vec::with_capacity(due.len());
        let mut stale = Vec::new();

        let mut tx = self.begin_write().await?;
        for &index in &due {
            let row = &rows[index];
            let result = sqlx::query(
                "UPDATE appointments SET status = ?, completed_at = ? WHERE id = ? AND status = ?",
            )
            .bind(AppointmentStatus::Completed)
            .bind(&completed_at)
            .bind(&row.id)
            .bind(AppointmentStatus::Pending)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

            if result.rows_affected() == 1 {
                ledger::post_entry(&mut *tx, &LedgerSnapshot::from(row), self.time.now_utc())
                    .await
                    .map_err(write_error)?;
                applied.push(index);
            } else {
                stale.push(index);
            }
        }
        tx.commit().await.map_err(write_error)?;

        for &index in &applied {
            rows[index].status = AppointmentStatus::Completed;
            rows[index].completed_at = Some(completed_at.clone());
        }
        // Someone else moved these first; show what is stored now.
        for &index in &stale {
            if let Some(current) = self.find(&rows[index].id).await? {
                rows[index] = current;
            }
        }

        if !applied.is_empty() {
            log::info!("Sweep completed {} overdue appointment(s).", applied.len());
        }
        Ok(applied.len())
    }

    pub async fn find(&self, id: &str) -> ApiResult<Option<AppointmentRow>> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            r#"SELECT id, customer_name, phone, address, service_id, service_name, service_price,
                      appointment_date, appointment_time, notes, status, created_at, completed_at
               FROM appointments
               WHERE id = ?
               LIMIT 1"#,
        )
        .bind(id)
        .fetch_optional(self.db)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: &str) -> ApiResult<AppointmentRow> {
        self.find(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Appointment"))
    }

    pub async fn update(&self, id: &str, patch: AppointmentPatch) -> ApiResult<Notified<AppointmentRow>> {
        let existing = self.get(id).await?;
        self.apply(existing, patch).await
    }

    /// Applies `patch` on top of `existing`, the state read by the caller.
    /// The write only lands if the stored status still matches it.
    async fn apply(
        &self,
        existing: AppointmentRow,
        patch: AppointmentPatch,
    ) -> ApiResult<Notified<AppointmentRow>> {
        let id = existing.id.as_str();
        let mut updated = existing.clone();

        if let Some(customer_name) = patch.customer_name {
            updated.customer_name = customer_name;
        }
        if let Some(phone) = patch.phone {
            updated.phone = phone;
        }
        if let Some(address) = patch.address {
            updated.address = address;
        }
        if let Some(notes) = patch.notes {
            updated.notes = notes;
        }

        let slot_changed = patch.appointment_date.is_some() || patch.appointment_time.is_some();
        if let Some(date) = patch.appointment_date {
            updated.appointment_date = date;
        }
        if let Some(time) = patch.appointment_time {
            updated.appointment_time = time;
        }

        if let Some(service_id) = patch.service_id {
            match catalog::find_service(self.db, &service_id).await? {
                Some(service) => {
                    updated.service_name = service.name;
                    updated.service_price = service.price;
                }
                None => log::warn!(
                    "Service {service_id} not found; appointment {id} keeps its previous service snapshot"
                ),
            }
            updated.service_id = service_id;
        }

        let transition = patch.status.filter(|status| *status != existing.status);
        if let Some(status) = transition {
            updated.status = status;
            if status == AppointmentStatus::Completed {
                updated.completed_at = Some(self.time.now_utc().to_rfc3339());
            }
        }

        let mut tx = self.begin_write().await?;
        if slot_changed
            && slot_taken(
                &mut *tx,
                &updated.appointment_date,
                &updated.appointment_time,
                Some(id),
            )
            .await
            .map_err(write_error)?
        {
            return Err(ApiError::slot_taken(
                &updated.appointment_date,
                &updated.appointment_time,
            ));
        }

        let written = write_appointment(&mut *tx, &updated, existing.status)
            .await
            .map_err(|err| slot_error(err, &updated))?;
        if !written {
            return Err(ApiError::Conflict(
                "Appointment was changed by another request. Please retry.".to_string(),
            ));
        }

        if transition == Some(AppointmentStatus::Completed) {
            ledger::post_entry(&mut *tx, &LedgerSnapshot::from(&existing), self.time.now_utc())
                .await
                .map_err(write_error)?;
        }
        tx.commit().await.map_err(write_error)?;

        let delivery = match transition {
            Some(AppointmentStatus::Completed) => {
                let message = self.messages.service_completed(&existing.customer_name);
                Some(self.notify(&existing.phone, &message).await)
            }
            Some(AppointmentStatus::Cancelled) => {
                let message = self.messages.booking_cancelled(&existing.customer_name);
                Some(self.notify(&existing.phone, &message).await)
            }
            _ => None,
        };

        Ok(Notified {
            record: updated,
            delivery,
        })
    }

    /// Hard delete. Ledger entries of the appointment are left in place.
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Appointment"));
        }
        Ok(())
    }

    async fn begin_write(&self) -> ApiResult<Transaction<'static, Sqlite>> {
        self.db.begin_with(BEGIN_WRITE).await.map_err(write_error)
    }

    async fn notify(&self, phone: &str, message: &str) -> Delivery {
        let delivery = self.notifier.send(phone, message).await;
        if !delivery.is_ok() {
            log::warn!("Notification to {phone} was not delivered: {delivery:?}");
        }
        delivery
    }
}

async fn slot_taken<'e, E>(
    executor: E,
    date: &str,
    time: &str,
    exclude_id: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found = sqlx::query_scalar::<_, String>(
        r#"SELECT id FROM appointments
           WHERE appointment_date = ?1
             AND appointment_time = ?2
             AND status <> 'cancelled'
             AND (?3 IS NULL OR id <> ?3)
           LIMIT 1"#,
    )
    .bind(date)
    .bind(time)
    .bind(exclude_id)
    .fetch_optional(executor)
    .await?;
    Ok(found.is_some())
}

fn write_error(err: sqlx::Error) -> ApiError {
    if ApiError::is_busy(&err) {
        log::warn!("Write lock contention: {err}");
        ApiError::busy()
    } else {
        ApiError::Database(err)
    }
}

fn slot_error(err: sqlx::Error, row: &AppointmentRow) -> ApiError {
    if ApiError::is_unique_violation(&err) {
        ApiError::slot_taken(&row.appointment_date, &row.appointment_time)
    } else {
        write_error(err)
    }
}

async fn insert_appointment<'e, E>(executor: E, row: &AppointmentRow) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO appointments
           (id, customer_name, phone, address, service_id, service_name, service_price,
            appointment_date, appointment_time, notes, status, created_at, completed_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.customer_name)
    .bind(&row.phone)
    .bind(&row.address)
    .bind(&row.service_id)
    .bind(&row.service_name)
    .bind(row.service_price.to_db())
    .bind(&row.appointment_date)
    .bind(&row.appointment_time)
    .bind(&row.notes)
    .bind(row.status)
    .bind(&row.created_at)
    .bind(&row.completed_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Writes every mutable column, provided the stored status is still
/// `expected_status`. Returns false when the row moved underneath us.
async fn write_appointment<'e, E>(
    executor: E,
    row: &AppointmentRow,
    expected_status: AppointmentStatus,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"UPDATE appointments
           SET customer_name = ?, phone = ?, address = ?, service_id = ?, service_name = ?,
               service_price = ?, appointment_date = ?, appointment_time = ?, notes = ?,
               status = ?, completed_at = ?
           WHERE id = ? AND status = ?"#,
    )
    .bind(&row.customer_name)
    .bind(&row.phone)
    .bind(&row.address)
    .bind(&row.service_id)
    .bind(&row.service_name)
    .bind(row.service_price.to_db())
    .bind(&row.appointment_date)
    .bind(&row.appointment_time)
    .bind(&row.notes)
    .bind(row.status)
    .bind(&row.completed_at)
    .bind(&row.id)
    .bind(expected_status)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::{
        clock::testing::FixedClock,
        db::testing::{file_pool, memory_pool},
        ledger::DateRange,
        models::{Money, ServiceRow},
        sms::testing::{templates, RecordingNotifier},
    };

    // 12:00 in Istanbul
    const START: &str = "2025-06-01T09:00:00Z";
    const PHONE: &str = "+90 545 123 45 67";

    struct Fixture {
        pool: SqlitePool,
        clock: Arc<FixedClock>,
        time: BusinessTime,
        notifier: RecordingNotifier,
        messages: MessageTemplates,
        service: ServiceRow,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_notifier(RecordingNotifier::new()).await
        }

        async fn with_notifier(notifier: RecordingNotifier) -> Self {
            Self::on_pool(memory_pool().await, notifier).await
        }

        async fn on_pool(pool: SqlitePool, notifier: RecordingNotifier) -> Self {
            let now = DateTime::parse_from_rfc3339(START).unwrap().with_timezone(&Utc);
            let clock = Arc::new(FixedClock::new(now));
            let time = BusinessTime::new(chrono_tz::Europe::Istanbul, clock.clone());
            let service = catalog::create_service(
                &pool,
                &crate::cache::ResponseCache::disabled(),
                crate::models::ServiceInput {
                    name: "Koltuk Yıkama".to_string(),
                    price: Money::from(500),
                },
                now,
            )
            .await
            .unwrap();
            Self {
                pool,
                clock,
                time,
                notifier,
                messages: templates(),
                service,
            }
        }

        fn scheduler(&self) -> Scheduler<'_> {
            Scheduler::new(&self.pool, &self.time, &self.notifier, &self.messages)
        }

        fn booking(&self, date: &str, time: &str) -> AppointmentInput {
            AppointmentInput {
                customer_name: "Ayşe Yılmaz".to_string(),
                phone: PHONE.to_string(),
                address: "Nevşehir Merkez".to_string(),
                service_id: self.service.id.clone(),
                appointment_date: date.to_string(),
                appointment_time: time.to_string(),
                notes: String::new(),
            }
        }

        async fn ledger(&self) -> Vec<crate::models::TransactionRow> {
            ledger::query(&self.pool, &DateRange::default()).await.unwrap()
        }
    }

    fn status_patch(status: AppointmentStatus) -> AppointmentPatch {
        AppointmentPatch {
            status: Some(status),
            ..AppointmentPatch::default()
        }
    }

    #[actix_web::test]
    async fn future_booking_stays_pending_until_swept() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();

        let created = scheduler.create(fx.booking("2025-06-01", "15:00")).await.unwrap();
        assert_eq!(created.record.status, AppointmentStatus::Pending);
        assert_eq!(created.record.completed_at, None);
        assert_eq!(created.delivery, Some(Delivery::Sent));
        assert!(fx.ledger().await.is_empty());

        // threshold is 16:00 local
        fx.clock.advance(Duration::hours(4));
        let listed = scheduler.list(&AppointmentFilter::default()).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, AppointmentStatus::Completed);
        assert!(listed[0].completed_at.is_some());
        let ledger = fx.ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].amount, Money::from(500));
        assert_eq!(ledger[0].appointment_id, created.record.id);

        let stored = scheduler.get(&created.record.id).await.unwrap();
        assert_eq!(stored.status, AppointmentStatus::Completed);
        // only the booking confirmation
        assert_eq!(fx.notifier.sent().len(), 1);
    }

    #[actix_web::test]
    async fn sweep_is_idempotent() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        scheduler.create(fx.booking("2025-06-01", "15:00")).await.unwrap();
        fx.clock.advance(Duration::hours(5));

        let first = scheduler.list(&AppointmentFilter::default()).await.unwrap();
        let second = scheduler.list(&AppointmentFilter::default()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.ledger().await.len(), 1);
    }

    #[actix_web::test]
    async fn past_booking_is_completed_at_creation() {
        let fx = Fixture::new().await;
        let created = fx
            .scheduler()
            .create(fx.booking("2025-06-01", "10:00"))
            .await
            .unwrap();

        assert_eq!(created.record.status, AppointmentStatus::Completed);
        assert!(created.record.completed_at.is_some());
        let ledger = fx.ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].amount, Money::from(500));
        assert_eq!(ledger[0].date, "2025-06-01");
    }

    #[actix_web::test]
    async fn threshold_boundary_counts_as_completed() {
        let fx = Fixture::new().await;
        // exactly one hour ago
        let created = fx
            .scheduler()
            .create(fx.booking("2025-06-01", "11:00"))
            .await
            .unwrap();
        assert_eq!(created.record.status, AppointmentStatus::Completed);

        let pending = fx
            .scheduler()
            .create(fx.booking("2025-06-01", "11:01"))
            .await
            .unwrap();
        assert_eq!(pending.record.status, AppointmentStatus::Pending);
    }

    #[actix_web::test]
    async fn double_booking_is_a_conflict() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        scheduler.create(fx.booking("2025-06-01", "14:00")).await.unwrap();

        let second = scheduler.create(fx.booking("2025-06-01", "14:00")).await;

        match second {
            Err(ApiError::Conflict(message)) => {
                assert!(message.contains("2025-06-01"));
                assert!(message.contains("14:00"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // the rejected call sends nothing
        assert_eq!(fx.notifier.sent().len(), 1);
    }

    #[actix_web::test]
    async fn cancelled_booking_releases_its_slot() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let first = scheduler.create(fx.booking("2025-06-01", "14:00")).await.unwrap();
        scheduler
            .update(&first.record.id, status_patch(AppointmentStatus::Cancelled))
            .await
            .unwrap();

        let second = scheduler.create(fx.booking("2025-06-01", "14:00")).await;
        assert!(second.is_ok());
    }

    #[actix_web::test]
    async fn storage_rejects_double_booking_without_the_check() {
        let fx = Fixture::new().await;
        let created = fx
            .scheduler()
            .create(fx.booking("2025-06-01", "14:00"))
            .await
            .unwrap();
        let mut twin = created.record.clone();
        twin.id = new_id();

        let err = insert_appointment(&fx.pool, &twin).await.unwrap_err();
        assert!(ApiError::is_unique_violation(&err));
        assert!(matches!(slot_error(err, &twin), ApiError::Conflict(_)));
    }

    #[actix_web::test]
    async fn unknown_service_is_not_found() {
        let fx = Fixture::new().await;
        let mut input = fx.booking("2025-06-01", "14:00");
        input.service_id = "missing".to_string();

        let result = fx.scheduler().create(input).await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert!(fx.notifier.sent().is_empty());
    }

    #[actix_web::test]
    async fn unparseable_slot_fails_open_to_pending() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("01.06.2025", "14:00")).await.unwrap();
        assert_eq!(created.record.status, AppointmentStatus::Pending);

        fx.clock.advance(Duration::days(30));
        let listed = scheduler.list(&AppointmentFilter::default()).await.unwrap();

        assert_eq!(listed[0].status, AppointmentStatus::Pending);
        assert!(fx.ledger().await.is_empty());
    }

    #[actix_web::test]
    async fn notification_failure_does_not_fail_create() {
        let fx = Fixture::with_notifier(RecordingNotifier::answering(Delivery::Failed(
            "timeout".to_string(),
        )))
        .await;

        let created = fx
            .scheduler()
            .create(fx.booking("2025-06-01", "15:00"))
            .await
            .unwrap();

        assert_eq!(created.delivery, Some(Delivery::Failed("timeout".to_string())));
        assert!(fx.scheduler().find(&created.record.id).await.unwrap().is_some());
    }

    #[actix_web::test]
    async fn manual_completion_posts_once_and_notifies_once() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-01", "15:00")).await.unwrap();

        let completed = scheduler
            .update(&created.record.id, status_patch(AppointmentStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.record.status, AppointmentStatus::Completed);
        assert!(completed.record.completed_at.is_some());
        assert_eq!(fx.ledger().await.len(), 1);
        assert_eq!(fx.notifier.sent().len(), 2);
        assert!(fx.notifier.sent()[1].1.contains("https://example.com/feedback"));

        let again = scheduler
            .update(&created.record.id, status_patch(AppointmentStatus::Completed))
            .await
            .unwrap();
        assert_eq!(again.delivery, None);
        assert_eq!(again.record.completed_at, completed.record.completed_at);
        assert_eq!(fx.ledger().await.len(), 1);
        assert_eq!(fx.notifier.sent().len(), 2);
    }

    #[actix_web::test]
    async fn completion_posts_pre_update_snapshot() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-01", "15:00")).await.unwrap();

        let patch = AppointmentPatch {
            customer_name: Some("Mehmet Kaya".to_string()),
            status: Some(AppointmentStatus::Completed),
            ..AppointmentPatch::default()
        };
        let updated = scheduler.update(&created.record.id, patch).await.unwrap();

        assert_eq!(updated.record.customer_name, "Mehmet Kaya");
        assert_eq!(fx.ledger().await[0].customer_name, "Ayşe Yılmaz");
    }

    #[actix_web::test]
    async fn cancellation_notifies_without_ledger_effect() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-01", "15:00")).await.unwrap();

        let cancelled = scheduler
            .update(&created.record.id, status_patch(AppointmentStatus::Cancelled))
            .await
            .unwrap();

        assert_eq!(cancelled.record.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.delivery, Some(Delivery::Sent));
        assert!(fx.ledger().await.is_empty());
        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, PHONE);
        assert!(sent[1].1.contains("0545 000 0000"));
    }

    #[actix_web::test]
    async fn cancelling_completed_keeps_its_ledger_entry() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-01", "10:00")).await.unwrap();
        assert_eq!(created.record.status, AppointmentStatus::Completed);

        scheduler
            .update(&created.record.id, status_patch(AppointmentStatus::Cancelled))
            .await
            .unwrap();

        let stored = scheduler.get(&created.record.id).await.unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert!(stored.completed_at.is_some());
        assert_eq!(fx.ledger().await.len(), 1);
    }

    #[actix_web::test]
    async fn moving_into_a_taken_slot_is_a_conflict() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        scheduler.create(fx.booking("2025-06-02", "10:00")).await.unwrap();
        let other = scheduler.create(fx.booking("2025-06-02", "11:00")).await.unwrap();

        let clash = AppointmentPatch {
            appointment_time: Some("10:00".to_string()),
            ..AppointmentPatch::default()
        };
        assert!(matches!(
            scheduler.update(&other.record.id, clash).await,
            Err(ApiError::Conflict(_))
        ));

        // re-saving its own slot is fine
        let same = AppointmentPatch {
            appointment_date: Some("2025-06-02".to_string()),
            appointment_time: Some("11:00".to_string()),
            ..AppointmentPatch::default()
        };
        assert!(scheduler.update(&other.record.id, same).await.is_ok());
    }

    #[actix_web::test]
    async fn service_change_resnapshots_or_keeps_previous() {
        let fx = Fixture::new().await;
        let cache = crate::cache::ResponseCache::disabled();
        let premium = catalog::create_service(
            &fx.pool,
            &cache,
            crate::models::ServiceInput {
                name: "Yatak Yıkama".to_string(),
                price: Money::from(800),
            },
            fx.time.now_utc(),
        )
        .await
        .unwrap();
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-02", "10:00")).await.unwrap();

        let switched = scheduler
            .update(
                &created.record.id,
                AppointmentPatch {
                    service_id: Some(premium.id.clone()),
                    ..AppointmentPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(switched.record.service_name, "Yatak Yıkama");
        assert_eq!(switched.record.service_price, Money::from(800));

        let dangling = scheduler
            .update(
                &created.record.id,
                AppointmentPatch {
                    service_id: Some("gone".to_string()),
                    ..AppointmentPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(dangling.record.service_id, "gone");
        assert_eq!(dangling.record.service_name, "Yatak Yıkama");
        assert_eq!(dangling.record.service_price, Money::from(800));
    }

    #[actix_web::test]
    async fn service_edits_do_not_touch_existing_snapshots() {
        let fx = Fixture::new().await;
        let cache = crate::cache::ResponseCache::disabled();
        let created = fx
            .scheduler()
            .create(fx.booking("2025-06-02", "10:00"))
            .await
            .unwrap();

        catalog::update_service(
            &fx.pool,
            &cache,
            &fx.service.id,
            crate::models::ServicePatch {
                name: None,
                price: Some(Money::from(999)),
            },
        )
        .await
        .unwrap();

        let stored = fx.scheduler().get(&created.record.id).await.unwrap();
        assert_eq!(stored.service_price, Money::from(500));
    }

    #[actix_web::test]
    async fn list_filters_by_date_status_and_search() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        scheduler.create(fx.booking("2025-06-02", "10:00")).await.unwrap();
        let mut other = fx.booking("2025-06-03", "10:00");
        other.customer_name = "Mehmet Kaya".to_string();
        other.phone = "0532 111 22 33".to_string();
        scheduler.create(other).await.unwrap();

        let by_date = scheduler
            .list(&AppointmentFilter {
                date: Some("2025-06-03".to_string()),
                ..AppointmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].customer_name, "Mehmet Kaya");

        let by_name = scheduler
            .list(&AppointmentFilter {
                search: Some("ayşe".to_string()),
                ..AppointmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let by_phone = scheduler
            .list(&AppointmentFilter {
                search: Some("111 22".to_string()),
                ..AppointmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_phone.len(), 1);

        let completed = scheduler
            .list(&AppointmentFilter {
                status: Some(AppointmentStatus::Completed),
                ..AppointmentFilter::default()
            })
            .await
            .unwrap();
        assert!(completed.is_empty());

        let all = scheduler.list(&AppointmentFilter::default()).await.unwrap();
        assert_eq!(all[0].appointment_date, "2025-06-03");
    }

    #[actix_web::test]
    async fn delete_leaves_ledger_entry_behind() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-01", "10:00")).await.unwrap();

        scheduler.delete(&created.record.id).await.unwrap();

        assert!(matches!(
            scheduler.get(&created.record.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            scheduler.delete(&created.record.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert_eq!(fx.ledger().await.len(), 1);
    }

    #[actix_web::test]
    async fn update_of_missing_appointment_is_not_found() {
        let fx = Fixture::new().await;
        let result = fx
            .scheduler()
            .update("missing", status_patch(AppointmentStatus::Completed))
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert!(fx.ledger().await.is_empty());
    }

    #[actix_web::test]
    async fn racing_bookings_for_one_slot_yield_one_winner() {
        let (pool, _dir) = file_pool().await;
        let fx = Fixture::on_pool(pool, RecordingNotifier::new()).await;
        let scheduler = fx.scheduler();

        for hour in 10..15 {
            let time = format!("{hour}:00");
            let (a, b, c, d) = tokio::join!(
                scheduler.create(fx.booking("2025-06-02", &time)),
                scheduler.create(fx.booking("2025-06-02", &time)),
                scheduler.create(fx.booking("2025-06-02", &time)),
                scheduler.create(fx.booking("2025-06-02", &time)),
            );
            let results = [a, b, c, d];
            let winners = results.iter().filter(|result| result.is_ok()).count();
            assert_eq!(winners, 1, "slot {time}");
            for result in &results {
                if let Err(err) = result {
                    assert!(matches!(err, ApiError::Conflict(_)), "slot {time}: {err:?}");
                }
            }
        }

        let stored = scheduler.list(&AppointmentFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 5);
        assert!(fx.ledger().await.is_empty());
    }

    #[actix_web::test]
    async fn sweep_skips_rows_moved_by_someone_else() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-01", "15:00")).await.unwrap();
        let mut rows = vec![scheduler.get(&created.record.id).await.unwrap()];
        fx.clock.advance(Duration::hours(5));

        sqlx::query("UPDATE appointments SET status = 'cancelled' WHERE id = ?")
            .bind(&created.record.id)
            .execute(&fx.pool)
            .await
            .unwrap();

        let completed = scheduler.sweep(&mut rows).await.unwrap();

        assert_eq!(completed, 0);
        assert_eq!(rows[0].status, AppointmentStatus::Cancelled);
        assert_eq!(rows[0].completed_at, None);
        assert!(fx.ledger().await.is_empty());
        assert_eq!(fx.notifier.sent().len(), 1);
    }

    #[actix_web::test]
    async fn update_from_stale_state_is_a_conflict() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-02", "10:00")).await.unwrap();
        let stale = scheduler.get(&created.record.id).await.unwrap();

        sqlx::query("UPDATE appointments SET status = 'cancelled' WHERE id = ?")
            .bind(&created.record.id)
            .execute(&fx.pool)
            .await
            .unwrap();

        let result = scheduler
            .apply(stale, status_patch(AppointmentStatus::Completed))
            .await;

        assert!(matches!(result, Err(ApiError::Conflict(_))));
        assert!(fx.ledger().await.is_empty());
        // only the booking confirmation
        assert_eq!(fx.notifier.sent().len(), 1);
        let stored = scheduler.get(&created.record.id).await.unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert_eq!(stored.completed_at, None);
    }

    #[actix_web::test]
    async fn ledger_entries_carry_business_clock_time() {
        let fx = Fixture::new().await;
        let scheduler = fx.scheduler();
        let created = scheduler.create(fx.booking("2025-06-02", "10:00")).await.unwrap();
        fx.clock.advance(Duration::minutes(30));

        scheduler
            .update(&created.record.id, status_patch(AppointmentStatus::Completed))
            .await
            .unwrap();

        let ledger = fx.ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].created_at, fx.time.now_utc().to_rfc3339());
        let start = DateTime::parse_from_rfc3339(START).unwrap().with_timezone(&Utc);
        assert_eq!(fx.service.created_at, start.to_rfc3339());
    }
}
