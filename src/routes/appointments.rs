use actix_web::{web, HttpResponse, HttpResponseBuilder};
use serde_json::json;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    models::{AppointmentFilter, AppointmentInput, AppointmentPatch},
    scheduler::Notified,
    state::AppState,
};

/// Outcome of the customer SMS for a write, when one was attempted.
pub const NOTIFICATION_HEADER: &str = "X-Notification";

fn respond<T: serde::Serialize>(mut builder: HttpResponseBuilder, notified: Notified<T>) -> HttpResponse {
    if let Some(delivery) = notified.delivery {
        builder.insert_header((NOTIFICATION_HEADER, delivery.label()));
    }
    builder.json(notified.record)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/appointments")
            .route(web::get().to(list_appointments))
            .route(web::post().to(create_appointment)),
    )
    .service(
        web::resource("/appointments/{id}")
            .route(web::get().to(get_appointment))
            .route(web::put().to(update_appointment))
            .route(web::delete().to(delete_appointment)),
    );
}

async fn create_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<AppointmentInput>,
) -> ApiResult<HttpResponse> {
    let created = state.scheduler().create(payload.into_inner()).await?;
    log::info!(
        "Appointment {} booked for {} {} ({}) by {}, sms {}",
        created.record.id,
        created.record.appointment_date,
        created.record.appointment_time,
        created.record.status,
        auth.username,
        created.delivery.as_ref().map_or("skipped", |delivery| delivery.label())
    );
    Ok(respond(HttpResponse::Ok(), created))
}

async fn list_appointments(
    state: web::Data<AppState>,
    filter: web::Query<AppointmentFilter>,
) -> ApiResult<HttpResponse> {
    let rows = state.scheduler().list(&filter).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn get_appointment(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let row = state.scheduler().get(&path).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn update_appointment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AppointmentPatch>,
) -> ApiResult<HttpResponse> {
    let updated = state.scheduler().update(&path, payload.into_inner()).await?;
    if let Some(delivery) = &updated.delivery {
        log::info!("Appointment {} now {}, sms {}", updated.record.id, updated.record.status, delivery.label());
    }
    Ok(respond(HttpResponse::Ok(), updated))
}

async fn delete_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    state.scheduler().delete(&path).await?;
    log::info!("Appointment {} deleted by {} ({})", path, auth.username, auth.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Appointment deleted" })))
}
