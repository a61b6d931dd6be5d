pub mod archive;
pub mod backfill;
pub mod extract;
pub mod fetch;
pub mod listing;
pub mod orchestrator;
pub mod progress;
pub mod rate_limiter;
pub mod sink;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod util;
pub mod validate;
