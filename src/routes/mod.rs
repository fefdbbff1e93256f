pub mod appointments;
pub mod catalog;
pub mod dashboard;
pub mod ledger;
pub mod public;

use actix_web::{middleware::from_fn, web};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{auth::bearer_validator, error::ApiError, rate_limit::limit_api};

/// Mounts every route. Register and token stay public; the rest of `/api`
/// needs a bearer token.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::FormConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .configure(public::configure)
    .service(
        web::scope("/api")
            .wrap(HttpAuthentication::bearer(bearer_validator))
            .wrap(from_fn(limit_api))
            .configure(appointments::configure)
            .configure(catalog::configure)
            .configure(ledger::configure)
            .configure(dashboard::configure),
    );
}
