use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Upper bound for a (multi-part) text message body.
pub const MAX_MESSAGE_CHARS: usize = 480;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a single send attempt. Never escalated into a request failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Sending is switched off; treated as success.
    Disabled,
    /// Phone did not normalize to a local mobile number; no request was made.
    InvalidPhone,
    Failed(String),
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        matches!(self, Delivery::Sent | Delivery::Disabled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::Disabled => "disabled",
            Delivery::InvalidPhone => "invalid-phone",
            Delivery::Failed(_) => "failed",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Delivery;
}

/// Reduces a phone number to its 10-digit local mobile form (`5XXXXXXXXX`).
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.strip_prefix("90").unwrap_or(digits.as_str());
    let digits = digits.strip_prefix('0').unwrap_or(digits);
    if digits.len() == 10 && digits.starts_with('5') {
        Some(digits.to_string())
    } else {
        None
    }
}

/// Collapses whitespace and caps the body length.
pub fn sanitize_message(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_MESSAGE_CHARS)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
    pub api_hash: String,
    pub sender: String,
}

/// HTTP gateway client. The provider answers with an XML envelope whose
/// `status/code` is `200` on success.
pub struct SmsGateway {
    config: SmsConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    status: GatewayStatus,
}

#[derive(Debug, Deserialize)]
struct GatewayStatus {
    code: String,
    #[serde(default)]
    message: String,
}

impl SmsGateway {
    pub fn new(config: SmsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    async fn deliver(&self, phone: &str, text: &str) -> Result<(), String> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("hash", self.config.api_hash.as_str()),
                ("text", text),
                ("receipents", phone),
                ("sender", self.config.sender.as_str()),
                ("iys", "1"),
                ("iysList", "BIREYSEL"),
            ])
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;

        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| format!("unreadable response ({http_status}): {err}"))?;

        let reply: GatewayReply = quick_xml::de::from_str(&body)
            .map_err(|err| format!("unparseable response ({http_status}): {body} | {err}"))?;

        if reply.status.code.trim() == "200" {
            Ok(())
        } else {
            Err(format!(
                "code {}, message {}",
                reply.status.code.trim(),
                reply.status.message.trim()
            ))
        }
    }
}

#[async_trait]
impl Notifier for SmsGateway {
    async fn send(&self, phone: &str, message: &str) -> Delivery {
        if !self.config.enabled {
            log::info!("SMS sending is disabled. Skipping message.");
            return Delivery::Disabled;
        }

        let Some(local) = normalize_phone(phone) else {
            log::error!("Invalid phone number format: {phone}");
            return Delivery::InvalidPhone;
        };

        let text = sanitize_message(message);
        match self.deliver(&local, &text).await {
            Ok(()) => {
                log::info!("SMS sent successfully to {local}.");
                Delivery::Sent
            }
            Err(reason) => {
                log::error!("SMS to {local} failed: {reason}");
                Delivery::Failed(reason)
            }
        }
    }
}

/// Customer-facing message bodies.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    pub support_phone: String,
    pub feedback_url: String,
    pub signature: String,
}

impl MessageTemplates {
    pub fn booking_confirmed(&self, customer: &str, date: &str, time: &str) -> String {
        format!(
            "Sayın {customer},\n\n\
             Royal Koltuk Yıkama randevunuz onaylanmıştır.\n\n\
             Tarih: {date}\nSaat: {time}\n\n\
             Ekibimiz belirtilen adreste zamanında hizmet verecektir.\n\n\
             Bilgi veya değişiklik için: {}\n\n— {}",
            self.support_phone, self.signature
        )
    }

    pub fn service_completed(&self, customer: &str) -> String {
        format!(
            "Sayın {customer},\n\n\
             Royal Koltuk Yıkama hizmetiniz tamamlanmıştır.\n\n\
             Geri bildiriminiz bizim için değerlidir: {}\n\n— {}",
            self.feedback_url, self.signature
        )
    }

    pub fn booking_cancelled(&self, customer: &str) -> String {
        format!(
            "Sayın {customer},\n\n\
             Royal Koltuk Yıkama randevunuz iptal edilmiştir.\n\n\
             Yeni bir tarih planlamak için: {}\n\n— {}",
            self.support_phone, self.signature
        )
    }
}
