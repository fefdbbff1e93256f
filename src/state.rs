use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    auth::TokenIssuer,
    cache::ResponseCache,
    clock::BusinessTime,
    rate_limit::RateLimits,
    scheduler::Scheduler,
    sms::{MessageTemplates, Notifier},
};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub time: BusinessTime,
    pub notifier: Arc<dyn Notifier>,
    pub messages: MessageTemplates,
    pub cache: ResponseCache,
    pub tokens: TokenIssuer,
    pub limits: RateLimits,
}

impl AppState {
    pub fn scheduler(&self) -> Scheduler<'_> {
        Scheduler::new(&self.db, &self.time, self.notifier.as_ref(), &self.messages)
    }
}
