pub mod logger;

pub use logger::init_logger;

use std::time::{Duration, SystemTime};

/// Milliseconds since the Unix epoch, 0 if the clock is before it
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}
