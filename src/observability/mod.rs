//! Observability for filekeep
//!
//! - `logger`: structured JSON lines on the console
//! - `audit`: the append-only audit log served back by `GET /get_logs`
//!
//! Console output is best-effort. Audit appends never fail the caller.

mod logger;
pub mod audit;

pub use audit::{load_from_durable_store, AuditLog, DurableLog, FileDurableLog, LogEvent};
pub use logger::{Logger, Severity};
