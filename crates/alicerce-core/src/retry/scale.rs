//! Backoff scaling functions.
//!
//! A [`Scale`] turns a base delay and the number of retries made so far into
//! the delay of the next retry. These helpers cover the common curves; any
//! `Fn(Duration, usize) -> Duration` closure works as well.
//!
//! # Mathematical Formula
//!
//! For `n` retries made so far:
//! ```text
//! exponential:  base * multiplier^n
//! jittered:     base * multiplier^n + random(-jitter, +jitter) * base * multiplier^n
//! linear:       base * (n + 1)
//! ```
//!
//! Results saturate at `Duration::MAX` instead of overflowing.

use super::policy::Scale;
use std::sync::Arc;
use std::time::Duration;

/// Exponential scaling: `base * multiplier^retries`.
///
/// # Examples
///
/// ```rust
/// use alicerce_core::retry::scale;
/// use std::time::Duration;
///
/// let doubling = scale::exponential(2.0);
///
/// assert_eq!(doubling(Duration::from_millis(100), 0), Duration::from_millis(100));
/// assert_eq!(doubling(Duration::from_millis(100), 3), Duration::from_millis(800));
/// ```
pub fn exponential(multiplier: f64) -> Scale {
    Arc::new(move |base, retries| scaled(base, multiplier, retries))
}

/// Exponential scaling with proportional jitter.
///
/// Jitter is applied as `delay * jitter * random(-1.0, +1.0)`, giving a range
/// of `[delay * (1 - jitter), delay * (1 + jitter)]`. The jitter factor is
/// clamped to `[0.0, 1.0]`.
pub fn exponential_with_jitter(multiplier: f64, jitter: f64) -> Scale {
    let jitter = jitter.clamp(0.0, 1.0);

    Arc::new(move |base, retries| {
        let delay = scaled(base, multiplier, retries).as_secs_f64();

        if jitter == 0.0 {
            return from_secs_saturating(delay);
        }

        let jitter_amount = delay * jitter * (rand::random::<f64>() - 0.5) * 2.0;
        from_secs_saturating(delay + jitter_amount)
    })
}

/// Linear scaling: `base * (retries + 1)`.
pub fn linear() -> Scale {
    Arc::new(|base: Duration, retries: usize| {
        let factor = u32::try_from(retries.saturating_add(1)).unwrap_or(u32::MAX);
        base.saturating_mul(factor)
    })
}

fn scaled(base: Duration, multiplier: f64, retries: usize) -> Duration {
    let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
    from_secs_saturating(base.as_secs_f64() * multiplier.powi(exponent))
}

fn from_secs_saturating(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
