//! Rate limiting algorithms and the limiter facade.

mod clock;
mod decision;
pub mod fixed_window;
mod key;
mod limiter;
mod policy;
pub mod sliding_window;
pub mod token_bucket;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Analytics, Decision, IdentifiedDecision};
pub use key::LimitKey;
pub use limiter::{LimitExceededHook, RateLimiter, RateLimiterBuilder, DEFAULT_PREFIX};
pub use policy::{Policy, PolicyKind, MAX_WINDOW, MIN_REFILL_RATE};
