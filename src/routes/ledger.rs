use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::{
    error::ApiResult,
    ledger::{self, DateRange},
    models::TransactionAmount,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/transactions").route(web::get().to(list_transactions)))
        .service(
            web::resource("/transactions/{id}")
                .route(web::put().to(update_transaction))
                .route(web::delete().to(delete_transaction)),
        );
}

async fn list_transactions(state: web::Data<AppState>, range: web::Query<DateRange>) -> ApiResult<HttpResponse> {
    let rows = ledger::query(&state.db, &range).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn update_transaction(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<TransactionAmount>,
) -> ApiResult<HttpResponse> {
    let row = ledger::update_amount(&state.db, &path, payload.amount).await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete_transaction(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    ledger::delete(&state.db, &path).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Transaction deleted" })))
}
