//! # Access Control
//!
//! Shared-secret check plus a caller allow-list, with one operator alert per
//! unrecognized request.

pub mod errors;
pub mod guard;
pub mod identity;

pub use errors::{AccessError, AccessResult};
pub use guard::AccessGuard;
pub use identity::{
    strategy_for, AddressIdentity, AllowList, CallerIdentity, IdentityMode, IdentityStrategy,
    RequestCredentials, TokenIdentity,
};
