//! Logging setup.
//!
//! Every crate in the workspace logs through `tracing`: the store reports
//! fetch state changes and persistence failures, the network stack reports
//! requests, responses and retries. This module installs a subscriber for
//! applications that don't bring their own.

#[cfg(feature = "trace")]
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to [`DEFAULT_DIRECTIVE`]. Fails if a global subscriber is
/// already installed.
#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing_with(DEFAULT_DIRECTIVE)
}

/// Install a global `fmt` subscriber, using `default_directive` when
/// `RUST_LOG` is unset or invalid.
///
/// ```rust,no_run
/// alicerce::observability::init_tracing_with("alicerce=debug,alicerce_network=debug")
///     .expect("subscriber already installed");
/// ```
#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub fn init_tracing_with(
    default_directive: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}
