//! Test helper utilities

use crate::module::ModuleUrn;
use std::time::{Duration, Instant};

/// Parse a URN known to be valid
///
/// # Panics
/// On malformed input; meant for test fixtures only.
pub fn urn(text: &str) -> ModuleUrn {
    ModuleUrn::parse(text).unwrap_or_else(|e| panic!("invalid test URN '{text}': {e}"))
}

/// Measure the latency of one operation
pub fn measure_latency<F, R>(operation: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = operation();
    (result, start.elapsed())
}

/// Assert that an operation took at least `min` (blocking semantics)
pub fn assert_blocks_for_at_least<F, R>(min: Duration, operation: F, operation_name: &str) -> R
where
    F: FnOnce() -> R,
{
    let (result, elapsed) = measure_latency(operation);
    assert!(
        elapsed >= min,
        "{} returned after {:?}, expected at least {:?}",
        operation_name,
        elapsed,
        min
    );
    result
}
