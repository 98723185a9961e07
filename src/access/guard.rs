//! # Access Guard
//!
//! Runs before every route:
//! 1. Shared secret (constant-time); a mismatch short-circuits everything else.
//! 2. Caller identity present (token deployments).
//! 3. Caller identity on the allow-list; otherwise one alert per request.
//!
//! Every rejection is recorded as a WARNING. Success records nothing; the
//! route logs its own outcome.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use super::errors::{AccessError, AccessResult};
use super::identity::{AllowList, CallerIdentity, IdentityStrategy, RequestCredentials};
use crate::alert::AlertDispatcher;
use crate::observability::AuditLog;

pub struct AccessGuard {
    api_key: String,
    allow_list: AllowList,
    strategy: Box<dyn IdentityStrategy>,
    alerts: Arc<AlertDispatcher>,
    audit: Arc<AuditLog>,
}

impl AccessGuard {
    pub fn new(
        api_key: impl Into<String>,
        allow_list: AllowList,
        strategy: Box<dyn IdentityStrategy>,
        alerts: Arc<AlertDispatcher>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            allow_list,
            strategy,
            alerts,
            audit,
        }
    }

    pub fn strategy(&self) -> &dyn IdentityStrategy {
        self.strategy.as_ref()
    }

    fn secret_matches(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(key) => key.as_bytes().ct_eq(self.api_key.as_bytes()).into(),
            None => false,
        }
    }

    /// Authorize one request, returning the recognized caller.
    pub async fn authorize(&self, credentials: &RequestCredentials) -> AccessResult<CallerIdentity> {
        if !self.secret_matches(credentials.api_key.as_deref()) {
            self.audit.warning(format!(
                "Unauthorized access attempt from {}",
                self.strategy.describe(credentials)
            ));
            return Err(AccessError::Unauthorized);
        }

        let identity = match self.strategy.identify(credentials) {
            Some(identity) => identity,
            None => {
                self.audit.warning(format!(
                    "Missing device identity from {}",
                    credentials.peer_label()
                ));
                return Err(AccessError::MissingIdentity);
            }
        };

        if !self.allow_list.contains(&identity) {
            // Not deduplicated: every unknown request alerts.
            self.alerts.notify(identity.as_str()).await;
            self.audit.warning(format!(
                "Unknown {} access: {}",
                identity.kind_label(),
                identity
            ));
            return Err(AccessError::UnknownCaller(identity));
        }

        Ok(identity)
    }
}
