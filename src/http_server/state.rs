//! Shared state injected into every handler.

use std::io;
use std::sync::Arc;

use crate::access::{strategy_for, AccessGuard, AllowList};
use crate::alert::{AlertDispatcher, MailSender};
use crate::config::ServiceConfig;
use crate::file_store::{FileStore, PathConfiner};
use crate::observability::AuditLog;
use crate::variable::ServerVariable;

/// Everything a request may touch, constructed once at startup.
pub struct AppState {
    pub guard: AccessGuard,
    pub store: FileStore,
    pub variable: ServerVariable,
    pub audit: Arc<AuditLog>,
}

impl AppState {
    /// Wire the components for `config`. Creates the storage root if absent.
    pub fn new(
        config: &ServiceConfig,
        audit: Arc<AuditLog>,
        sender: Arc<dyn MailSender>,
    ) -> io::Result<Self> {
        let alerts = Arc::new(AlertDispatcher::new(
            sender,
            config.alert_recipient(),
            audit.clone(),
        ));

        let guard = AccessGuard::new(
            config.api_key.clone(),
            AllowList::new(config.identity.allow_list.iter().cloned()),
            strategy_for(config.identity.mode),
            alerts,
            audit.clone(),
        );

        let confiner = PathConfiner::new(&config.storage_root)?;
        let store = FileStore::new(confiner, audit.clone(), config.list_mode());

        Ok(Self {
            guard,
            store,
            variable: ServerVariable::new(audit.clone()),
            audit,
        })
    }
}
