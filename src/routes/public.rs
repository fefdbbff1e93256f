use actix_web::{middleware::from_fn, web, HttpResponse};
use chrono::Utc;

use crate::{
    auth::{self, LoginForm, RegisterInput},
    error::ApiResult,
    rate_limit::{limit_login, limit_register},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::resource("/api/register")
                .wrap(from_fn(limit_register))
                .route(web::post().to(register)),
        )
        .service(
            web::resource("/api/token")
                .wrap(from_fn(limit_login))
                .route(web::post().to(login)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterInput>,
) -> ApiResult<HttpResponse> {
    let user = auth::register(&state.db, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn login(state: web::Data<AppState>, form: web::Form<LoginForm>) -> ApiResult<HttpResponse> {
    let user = auth::authenticate(&state.db, &form.username, &form.password).await?;
    let token = state.tokens.issue(&user.username, Utc::now())?;
    log::info!("User '{}' logged in.", user.username);
    Ok(HttpResponse::Ok().json(token))
}
