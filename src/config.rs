use std::{env, str::FromStr, time::Duration};

use chrono_tz::Tz;

use crate::{
    rate_limit::Quota,
    sms::{MessageTemplates, SmsConfig},
};

const DEFAULT_SECRET: &str = "change-this-secret-key-in-production";
const DEFAULT_SMS_URL: &str = "https://api.iletimerkezi.com/v1/send-sms/get/";

#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub login: Quota,
    pub register: Quota,
    pub api: Quota,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub timezone: Tz,
    pub sms: SmsConfig,
    pub messages: MessageTemplates,
    pub cache_ttl: Option<Duration>,
    pub rate_limits: RateLimitConfig,
    pub cors_origins: Vec<String>,
    pub admin: AdminSeed,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn number<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn quota(name: &str, default: &str) -> Quota {
    let raw = var_or(name, default);
    match raw.parse() {
        Ok(quota) => quota,
        Err(err) => {
            log::warn!("{name}={raw} is not a valid rate ({err}); using {default}");
            default.parse().unwrap_or_default()
        }
    }
}

/// Unknown names fall back to Istanbul.
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse().unwrap_or_else(|_| {
        log::warn!("Unknown BUSINESS_TIMEZONE '{name}'; using Europe/Istanbul");
        chrono_tz::Europe::Istanbul
    })
}

impl AppConfig {
    pub fn from_env() -> Self {
        let jwt_secret = var_or("JWT_SECRET_KEY", DEFAULT_SECRET);
        if jwt_secret == DEFAULT_SECRET {
            log::warn!("JWT_SECRET_KEY not set. Using an insecure default secret.");
        }

        let sms = SmsConfig {
            enabled: flag("SMS_ENABLED", true),
            api_url: var_or("SMS_API_URL", DEFAULT_SMS_URL),
            api_key: var_or("ILETIMERKEZI_API_KEY", ""),
            api_hash: var_or("ILETIMERKEZI_HASH", ""),
            sender: var_or("ILETIMERKEZI_SENDER", "ROYALKOLTUK"),
        };
        if sms.enabled && (sms.api_key.is_empty() || sms.api_hash.is_empty()) {
            log::warn!("SMS is enabled but ILETIMERKEZI_API_KEY / ILETIMERKEZI_HASH are empty.");
        }

        let cache_ttl = flag("CACHE_ENABLED", true)
            .then(|| Duration::from_secs(number("CACHE_TTL_SECONDS", 300)));

        let cors_origins = var_or("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let admin = AdminSeed {
            username: var_or("ADMIN_USER", "admin"),
            password: var_or("ADMIN_PASSWORD", "admin"),
            full_name: env::var("ADMIN_FULL_NAME").ok().filter(|name| !name.trim().is_empty()),
        };

        Self {
            database_url: var_or("DATABASE_URL", "sqlite://./data/royal_koltuk.db"),
            port: number("PORT", 8080),
            jwt_secret,
            token_ttl: chrono::Duration::minutes(number("ACCESS_TOKEN_EXPIRE_MINUTES", 1440)),
            timezone: parse_timezone(&var_or("BUSINESS_TIMEZONE", "Europe/Istanbul")),
            sms,
            messages: MessageTemplates {
                support_phone: var_or("SUPPORT_PHONE", "0545 000 00 00"),
                feedback_url: var_or("FEEDBACK_URL", "https://g.page/r/royalkoltuk/review"),
                signature: var_or("COMPANY_SIGNATURE", "Royal Premium Care"),
            },
            cache_ttl,
            rate_limits: RateLimitConfig {
                enabled: flag("RATE_LIMIT_ENABLED", true),
                login: quota("RATE_LIMIT_LOGIN", "5/minute"),
                register: quota("RATE_LIMIT_REGISTER", "3/hour"),
                api: quota("RATE_LIMIT_API", "100/minute"),
            },
            cors_origins,
            admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_timezone_falls_back_to_istanbul() {
        assert_eq!(parse_timezone("Mars/Olympus"), chrono_tz::Europe::Istanbul);
        assert_eq!(parse_timezone("Europe/Berlin"), chrono_tz::Europe::Berlin);
    }
}
