//! Application state shared across routes

use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::mail::MailClient;
use crate::payments::Reconciler;
use crate::store::{Database, FirebaseClient, Ledger, MemoryDatabase, UserStore};
use crate::util::rate_limit::{create_limiter, Limiter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn Database>,
    pub users: UserStore,
    pub reconciler: Reconciler,
    pub mail: Option<MailClient>,
    pub limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let db: Arc<dyn Database> = match config.store_backend {
            StoreBackend::Firebase => Arc::new(FirebaseClient::new(&config)),
            StoreBackend::Memory => Arc::new(MemoryDatabase::new()),
        };
        Self::with_database(config, db)
    }

    /// Build state over an existing store
    pub fn with_database(config: Config, db: Arc<dyn Database>) -> Self {
        let config = Arc::new(config);

        let users = UserStore::new(db.clone());
        let reconciler = Reconciler::new(
            users.clone(),
            Ledger::new(db.clone()),
            config.network_fee_email.clone(),
        );

        let mail = config.mail.as_ref().map(MailClient::new);
        let limiter = create_limiter(config.rate_limit_rps);

        Self {
            config,
            db,
            users,
            reconciler,
            mail,
            limiter,
        }
    }
}
