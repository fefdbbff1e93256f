use actix_web::{dev::ServiceRequest, web, Error, HttpMessage};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{UserRow, UserView},
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Signs and checks HS256 access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> ApiResult<AccessToken> {
        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| ApiError::Internal(format!("token signing failed: {err}")))?;
        Ok(AccessToken {
            access_token,
            token_type: "bearer",
        })
    }

    /// Subject of a valid, unexpired token.
    pub fn verify(&self, token: &str) -> ApiResult<String> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|err| {
                log::debug!("Rejected token: {err}");
                ApiError::unauthorized()
            })?;
        Ok(data.claims.sub)
    }
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

async fn find_user(pool: &SqlitePool, username: &str) -> ApiResult<Option<UserRow>> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, full_name, password_hash, created_at
           FROM users
           WHERE username = ?
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn register(pool: &SqlitePool, input: RegisterInput) -> ApiResult<UserView> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("Username is required.".to_string()));
    }
    if input.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters."
        )));
    }
    if find_user(pool, username).await?.is_some() {
        return Err(ApiError::Validation("Username already registered".to_string()));
    }

    let password_hash = hash_password(&input.password)
        .map_err(|err| ApiError::Internal(format!("password hash failed: {err}")))?;
    let user = UserRow {
        id: new_id(),
        username: username.to_string(),
        full_name: input.full_name.filter(|name| !name.trim().is_empty()),
        password_hash,
        created_at: Utc::now().to_rfc3339(),
    };

    let inserted = sqlx::query(
        r#"INSERT INTO users (id, username, full_name, password_hash, created_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.full_name)
    .bind(&user.password_hash)
    .bind(&user.created_at)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => {
            log::info!("Registered user '{}'.", user.username);
            Ok(user.into())
        }
        Err(err) if ApiError::is_unique_violation(&err) => {
            Err(ApiError::Validation("Username already registered".to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Checks a username/password pair.
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> ApiResult<UserRow> {
    let rejected = || ApiError::Unauthorized("Incorrect username or password".to_string());
    let user = find_user(pool, username).await?.ok_or_else(rejected)?;
    if !verify_password(password, &user.password_hash) {
        return Err(rejected());
    }
    Ok(user)
}

async fn resolve_bearer(req: &ServiceRequest, credentials: &BearerAuth) -> ApiResult<AuthUser> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(ApiError::unauthorized)?;
    let username = state.tokens.verify(credentials.token())?;
    let user = find_user(&state.db, &username)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    Ok(AuthUser {
        id: user.id,
        username: user.username,
    })
}

pub async fn bearer_validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match resolve_bearer(&req, &credentials).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err.into(), req)),
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
