//! Short-lived reply caching with TTL expiry and LRU eviction.

pub mod clock;
pub mod response_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use response_cache::{CacheStats, ResponseCache};
