use chrono::{DateTime, Utc};

/// Single source of "now" for the engine. Injectable so scheduler interval,
/// jitter, and staleness math can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
