//! # Server Variable
//!
//! One named, process-wide string value. Reads and writes are atomic with
//! respect to each other.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::observability::AuditLog;

const DEFAULT_VALUE: &str = "Default Value";

#[derive(Debug, Clone, Error)]
pub enum VariableError {
    #[error("No new value provided")]
    MissingValue,
}

impl VariableError {
    pub fn status_code(&self) -> u16 {
        match self {
            VariableError::MissingValue => 400,
        }
    }
}

pub struct ServerVariable {
    value: RwLock<String>,
    audit: Arc<AuditLog>,
}

impl ServerVariable {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self::with_value(DEFAULT_VALUE, audit)
    }

    pub fn with_value(value: impl Into<String>, audit: Arc<AuditLog>) -> Self {
        Self {
            value: RwLock::new(value.into()),
            audit,
        }
    }

    pub fn get(&self) -> String {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value. An absent or empty value is rejected.
    pub fn set(&self, new_value: Option<&str>) -> Result<String, VariableError> {
        let new_value = match new_value.filter(|v| !v.is_empty()) {
            Some(v) => v.to_string(),
            None => {
                self.audit.warning("No new value provided");
                return Err(VariableError::MissingValue);
            }
        };

        *self.value.write().unwrap_or_else(PoisonError::into_inner) = new_value.clone();

        self.audit
            .info(format!("Server variable updated to: {}", new_value));
        Ok(new_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn variable() -> (TempDir, Arc<AuditLog>, Arc<ServerVariable>) {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.txt")).unwrap());
        let var = Arc::new(ServerVariable::new(audit.clone()));
        (dir, audit, var)
    }

    #[test]
    fn test_default_value() {
        let (_dir, _audit, var) = variable();
        assert_eq!(var.get(), "Default Value");
    }

    #[test]
    fn test_set_and_get() {
        let (_dir, audit, var) = variable();
        var.set(Some("maintenance")).unwrap();
        assert_eq!(var.get(), "maintenance");
        assert_eq!(
            audit.snapshot()[0].message(),
            "Server variable updated to: maintenance"
        );
    }

    #[test]
    fn test_empty_value_rejected() {
        let (_dir, _audit, var) = variable();
        assert!(matches!(var.set(Some("")), Err(VariableError::MissingValue)));
        assert!(matches!(var.set(None), Err(VariableError::MissingValue)));
        assert_eq!(var.get(), "Default Value");
    }

    #[test]
    fn test_concurrent_writers_leave_a_written_value() {
        let (_dir, _audit, var) = variable();
        let values: Vec<String> = (0..16).map(|i| format!("value-{}-{}", i, "x".repeat(i * 64))).collect();

        let handles: Vec<_> = values
            .iter()
            .cloned()
            .map(|v| {
                let var = Arc::clone(&var);
                std::thread::spawn(move || {
                    var.set(Some(&v)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(values.contains(&var.get()));
    }
}
