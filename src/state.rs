use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::mail::MailService;
use crate::permission::PermissionEnforcer;
use crate::ws::Hub;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Casbin permission enforcer
    pub perm: PermissionEnforcer,
    /// Application configuration
    pub config: Arc<Config>,
    /// Outgoing mail queue
    pub mail: MailService,
    /// Connected chat clients
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        perm: PermissionEnforcer,
        config: Config,
        mail: MailService,
    ) -> Self {
        Self {
            db,
            perm,
            config: Arc::new(config),
            mail,
            hub: Arc::new(Hub::new()),
        }
    }
}
