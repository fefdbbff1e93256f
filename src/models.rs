use std::{fmt, iter::Sum, ops::Add, str::FromStr};

use rust_decimal::Decimal;
use serde::{de::IntoDeserializer, Deserialize, Deserializer, Serialize};

pub const SETTINGS_ID: &str = "app_settings";

/// Decimal amount persisted as TEXT and rendered as a JSON number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Canonical text form written to the database.
    pub fn to_db(&self) -> String {
        self.0.normalize().to_string()
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl TryFrom<String> for Money {
    type Error = rust_decimal::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Decimal::from_str(value.trim()).map(Self)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::default(), Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Appointment lifecycle. Stored lowercase, shown to clients with the
/// business labels used by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[serde(rename = "Bekliyor", alias = "pending")]
    Pending,
    #[serde(rename = "Tamamlandı", alias = "completed")]
    Completed,
    #[serde(rename = "İptal", alias = "cancelled")]
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub username: String,
    pub full_name: Option<String>,
}

impl From<UserRow> for UserView {
    fn from(row: UserRow) -> Self {
        Self {
            username: row.username,
            full_name: row.full_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub price: Money,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub price: Money,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub service_id: String,
    pub service_name: String,
    #[sqlx(try_from = "String")]
    pub service_price: Money,
    pub appointment_date: String,
    pub appointment_time: String,
    pub notes: String,
    pub status: AppointmentStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub service_id: String,
    pub appointment_date: String,
    pub appointment_time: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub service_id: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

/// Empty query values (`?date=`) mean "no filter".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub search: Option<String>,
}

fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let Some(value) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    T::deserialize(value.to_string().into_deserializer()).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub appointment_id: String,
    pub customer_name: String,
    pub service_name: String,
    #[sqlx(try_from = "String")]
    pub amount: Money,
    pub date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionAmount {
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct Settings {
    pub work_start_hour: i64,
    pub work_end_hour: i64,
    pub appointment_interval: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_start_hour: 7,
            work_end_hour: 3,
            appointment_interval: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub today_appointments: i64,
    pub today_completed: i64,
    pub today_income: Money,
    pub week_income: Money,
    pub month_income: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerHistory {
    pub phone: String,
    pub total_appointments: usize,
    pub completed_appointments: usize,
    pub appointments: Vec<AppointmentRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_parses_db_text_and_sums() {
        let a = Money::try_from("500".to_string()).unwrap();
        let b = Money::try_from(" 249.50 ".to_string()).unwrap();
        let total: Money = vec![a, b].into_iter().sum();
        assert_eq!(total.to_db(), "749.5");
        assert!(Money::try_from("abc".to_string()).is_err());
        assert!(Money::from(-1).is_negative());
        assert!(!Money::from(0).is_negative());
    }

    #[test]
    fn blank_filter_values_are_absent() {
        let filter: AppointmentFilter =
            serde_json::from_str(r#"{"date": "", "status": "  ", "search": ""}"#).unwrap();
        assert!(filter.date.is_none());
        assert!(filter.status.is_none());
        assert!(filter.search.is_none());

        let filter: AppointmentFilter =
            serde_json::from_str(r#"{"date": "2025-06-02", "status": "Bekliyor", "search": " Ayşe "}"#).unwrap();
        assert_eq!(filter.date.as_deref(), Some("2025-06-02"));
        assert_eq!(filter.status, Some(AppointmentStatus::Pending));
        assert_eq!(filter.search.as_deref(), Some("Ayşe"));

        assert!(serde_json::from_str::<AppointmentFilter>(r#"{"status": "unknown"}"#).is_err());
    }

    #[test]
    fn status_uses_business_labels_on_the_wire() {
        let json = serde_json::to_string(&AppointmentStatus::Completed).unwrap();
        assert_eq!(json, "\"Tamamlandı\"");
        let parsed: AppointmentStatus = serde_json::from_str("\"İptal\"").unwrap();
        assert_eq!(parsed, AppointmentStatus::Cancelled);
        let alias: AppointmentStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(alias, AppointmentStatus::Pending);
    }
}
