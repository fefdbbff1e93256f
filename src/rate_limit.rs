//! Per-client request limits for the login, register and API route families.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    num::NonZeroU32,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, Error,
};
use governor::{DefaultKeyedRateLimiter, RateLimiter};

use crate::{config::RateLimitConfig, error::ApiError, state::AppState};

// Prune idle client buckets past this many keys.
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
}

impl Period {
    fn as_duration(self) -> Duration {
        match self {
            Period::Second => Duration::from_secs(1),
            Period::Minute => Duration::from_secs(60),
            Period::Hour => Duration::from_secs(60 * 60),
            Period::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// `N` requests per `period`, written `N/second|minute|hour|day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub requests: NonZeroU32,
    pub period: Period,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            requests: NonZeroU32::MIN.saturating_add(99),
            period: Period::Minute,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QuotaParseError {
    #[error("expected N/unit, got '{0}'")]
    Shape(String),
    #[error("request count must be a positive integer, got '{0}'")]
    Count(String),
    #[error("unknown period '{0}'")]
    Period(String),
}

impl FromStr for Quota {
    type Err = QuotaParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (count, unit) = raw
            .trim()
            .split_once('/')
            .ok_or_else(|| QuotaParseError::Shape(raw.to_string()))?;
        let requests = count
            .trim()
            .parse::<NonZeroU32>()
            .map_err(|_| QuotaParseError::Count(count.to_string()))?;
        let period = match unit.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" => Period::Second,
            "minute" | "minutes" | "m" => Period::Minute,
            "hour" | "hours" | "h" => Period::Hour,
            "day" | "days" | "d" => Period::Day,
            other => return Err(QuotaParseError::Period(other.to_string())),
        };
        Ok(Self { requests, period })
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.period {
            Period::Second => "second",
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
        };
        write!(f, "{}/{unit}", self.requests)
    }
}

impl Quota {
    /// Full burst up front, refilled evenly across the period.
    fn to_governor(self) -> governor::Quota {
        let interval = self.period.as_duration() / self.requests.get();
        governor::Quota::with_period(interval)
            .unwrap_or_else(|| governor::Quota::per_second(self.requests))
            .allow_burst(self.requests)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Login,
    Register,
    Api,
}

struct Limiters {
    login: DefaultKeyedRateLimiter<IpAddr>,
    register: DefaultKeyedRateLimiter<IpAddr>,
    api: DefaultKeyedRateLimiter<IpAddr>,
}

#[derive(Clone)]
pub struct RateLimits {
    inner: Option<Arc<Limiters>>,
}

impl RateLimits {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        log::info!(
            "Rate limits: login {}, register {}, api {}",
            config.login,
            config.register,
            config.api
        );
        Self {
            inner: Some(Arc::new(Limiters {
                login: RateLimiter::keyed(config.login.to_governor()),
                register: RateLimiter::keyed(config.register.to_governor()),
                api: RateLimiter::keyed(config.api.to_governor()),
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn check(&self, family: Family, client: IpAddr) -> Result<(), ApiError> {
        let Some(limiters) = self.inner.as_ref() else {
            return Ok(());
        };
        let limiter = match family {
            Family::Login => &limiters.login,
            Family::Register => &limiters.register,
            Family::Api => &limiters.api,
        };
        if limiter.len() > MAX_TRACKED_CLIENTS {
            limiter.retain_recent();
        }
        limiter.check_key(&client).map_err(|_| {
            log::warn!("Rate limit exceeded for {client} on {family:?}");
            ApiError::RateLimited
        })
    }
}

/// Rejected requests are answered here so the 429 reaches the client as a
/// response instead of a service error.
async fn limit<B: MessageBody>(
    family: Family,
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let client = req
        .peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let verdict = match req.app_data::<web::Data<AppState>>() {
        Some(state) => state.limits.check(family, client),
        None => Ok(()),
    };
    if let Err(err) = verdict {
        return Ok(req.error_response(err).map_into_right_body());
    }
    next.call(req).await.map(ServiceResponse::map_into_left_body)
}

pub async fn limit_login<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    limit(Family::Login, req, next).await
}

pub async fn limit_register<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    limit(Family::Register, req, next).await
}

pub async fn limit_api<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    limit(Family::Api, req, next).await
}
