mod auth;
mod cache;
mod catalog;
mod clock;
mod config;
mod db;
mod error;
mod ledger;
mod models;
mod rate_limit;
mod routes;
mod scheduler;
mod sms;
mod state;
mod stats;

use std::{str::FromStr, sync::Arc};

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{
    auth::TokenIssuer,
    cache::ResponseCache,
    clock::{BusinessTime, SystemClock},
    config::AppConfig,
    rate_limit::RateLimits,
    sms::SmsGateway,
    state::AppState,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

fn cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600);
    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_any_origin();
    }
    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = AppConfig::from_env();
    db::ensure_sqlite_dir(&config.database_url)?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;
    db::seed_admin(&pool, &config.admin).await?;

    let cache = match config.cache_ttl {
        Some(ttl) => ResponseCache::new(ttl),
        None => {
            log::info!("Cache disabled");
            ResponseCache::disabled()
        }
    };

    let state = AppState {
        db: pool.clone(),
        time: BusinessTime::new(config.timezone, Arc::new(SystemClock)),
        notifier: Arc::new(SmsGateway::new(config.sms.clone())?),
        messages: config.messages.clone(),
        cache,
        tokens: TokenIssuer::new(&config.jwt_secret, config.token_ttl),
        limits: RateLimits::new(&config.rate_limits),
    };

    let address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting Royal Koltuk API on http://{address} ({})", config.timezone);

    let origins = config.cors_origins.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors(&origins))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
