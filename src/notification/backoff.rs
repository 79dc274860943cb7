//! Exponential retry backoff for failed deliveries

use std::time::Duration;

/// Ceiling on the exponent, keeps the delay finite for absurd attempt counts
const MAX_EXPONENT: u32 = 20;

/// Delay before the next attempt after `attempts` failed ones: `base^attempts` seconds.
///
/// Past [`MAX_EXPONENT`] attempts the delay stays at `base^MAX_EXPONENT`.
pub fn backoff_delay(base_secs: u64, attempts: u32) -> Duration {
    let secs = base_secs
        .max(1)
        .saturating_pow(attempts.min(MAX_EXPONENT));
    Duration::from_secs(secs)
}
