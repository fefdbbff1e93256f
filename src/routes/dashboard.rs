use actix_web::{web, HttpResponse};

use crate::{error::ApiResult, state::AppState, stats};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/stats/dashboard").route(web::get().to(dashboard)))
        .service(web::resource("/customers/{phone}/history").route(web::get().to(customer_history)));
}

async fn dashboard(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let stats = stats::dashboard(&state.db, &state.time).await?;
    Ok(HttpResponse::Ok().json(stats))
}

async fn customer_history(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let history = stats::customer_history(&state.db, &path).await?;
    Ok(HttpResponse::Ok().json(history))
}
