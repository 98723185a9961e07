//! # File Storage
//!
//! Plain-filesystem storage under a single confined root.

pub mod confine;
pub mod errors;
pub mod store;

pub use confine::{resolve, resolve_entry, PathConfiner};
pub use errors::{StoreError, StoreResult};
pub use store::{FileStore, ListMode};
