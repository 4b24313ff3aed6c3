use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::messaging::MessagingProvider;
use crate::services::notifications::Notifier;
use crate::services::pricing::RateTable;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub rates: RateTable,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, messaging: Arc<dyn MessagingProvider>) -> Self {
        let dispatch_phone = Some(config.dispatch_phone.clone());
        let notifier = Notifier::new(messaging, config.notify_concurrency, dispatch_phone);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            rates: RateTable::standard(),
            notifier,
        }
    }

    /// Every write path goes through this one connection, which is what
    /// serialises driver assignment.
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("database mutex poisoned")))
    }
}
