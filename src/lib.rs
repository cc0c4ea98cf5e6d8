//! Tollgate - Store-Backed Rate Limiting
//!
//! This crate makes rate limiting decisions against a shared key-value store.
//! Every process pointing at the same store sees the same counters, so limits
//! hold across a fleet without any coordination beyond the store's atomic
//! increment.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{Result, TollgateError};
pub use ratelimit::{
    Analytics, Decision, IdentifiedDecision, Policy, PolicyKind, RateLimiter, RateLimiterBuilder,
};
pub use store::{MemoryStore, Store, StoreError};

#[cfg(feature = "redis")]
pub use store::RedisStore;
