use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::{
    catalog,
    error::ApiResult,
    models::{ServiceInput, ServicePatch, Settings},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/services")
            .route(web::get().to(list_services))
            .route(web::post().to(create_service)),
    )
    .service(
        web::resource("/services/{id}")
            .route(web::get().to(get_service))
            .route(web::put().to(update_service))
            .route(web::delete().to(delete_service)),
    )
    .service(
        web::resource("/settings")
            .route(web::get().to(get_settings))
            .route(web::put().to(put_settings)),
    );
}

async fn create_service(state: web::Data<AppState>, payload: web::Json<ServiceInput>) -> ApiResult<HttpResponse> {
    let service = catalog::create_service(&state.db, &state.cache, payload.into_inner(), state.time.now_utc()).await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn list_services(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let services = catalog::list_services(&state.db, &state.cache).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn get_service(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let service = catalog::get_service(&state.db, &state.cache, &path).await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn update_service(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ServicePatch>,
) -> ApiResult<HttpResponse> {
    let service = catalog::update_service(&state.db, &state.cache, &path, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn delete_service(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    catalog::delete_service(&state.db, &state.cache, &path).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Service deleted" })))
}

async fn get_settings(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let settings = catalog::get_settings(&state.db, &state.cache).await?;
    Ok(HttpResponse::Ok().json(settings))
}

async fn put_settings(state: web::Data<AppState>, payload: web::Json<Settings>) -> ApiResult<HttpResponse> {
    let settings = catalog::put_settings(&state.db, &state.cache, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settings))
}
