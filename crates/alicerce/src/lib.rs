//! # Alicerce
//!
//! Fetch orchestration for applications that talk to remote APIs and keep
//! a local copy of what they fetched:
//!
//! - Network-first or cache-first fetching via [`Store`] and [`FetchStrategy`]
//! - Persisted payload fallback when the network fails
//! - Background refresh of cache hits
//! - Retry policies with backoff, from [`alicerce_core::retry`]
//! - Cooperative cancellation through [`CancelableBag`](alicerce_core::CancelableBag)
//! - Decode instrumentation through [`alicerce_core::metrics`]
//!
//! The network and persistence layers live in [`alicerce_network`] and
//! [`alicerce_persistence`]; this crate combines them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alicerce::prelude::*;
//! use alicerce::network::{Endpoint, HttpNetworkStack, HttpResource, NetworkConfig};
//! use alicerce::persistence::{DiskMemoryConfig, DiskMemoryPersistenceStack};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetworkConfig::new("https://api.example.com".parse()?);
//!     let persistence = DiskMemoryPersistenceStack::new(DiskMemoryConfig::new("/tmp/alicerce"))?;
//!     let store = Store::new(HttpNetworkStack::from_config(config)?, persistence);
//!
//!     let resource = Resource::json(HttpResource::new(Endpoint::get("users/42")), "users/42")
//!         .with_strategy(FetchStrategy::PersistenceThenNetwork);
//!
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!     let _bag = store.fetch(resource, move |result| {
//!         let _ = tx.send(result);
//!     });
//!
//!     let user: User = rx.await?.map(FetchValue::into_value)?;
//!     println!("{}", user.name);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use config::StoreConfig;
pub use error::FetchError;
pub use resource::{FetchStrategy, Resource};
pub use store::{FetchResult, Store};
pub use value::FetchValue;

pub mod config;
pub mod error;
pub mod observability;
pub mod resource;
pub mod store;
pub mod value;

// Re-export the layers this crate is assembled from
pub use alicerce_network as network;
pub use alicerce_persistence as persistence;

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use alicerce::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        FetchError, FetchResult, FetchStrategy, FetchValue, Resource, Store, StoreConfig,
    };
    pub use alicerce_core::prelude::*;
    pub use alicerce_network::{NetworkStack, NetworkValue};
    pub use alicerce_persistence::PersistenceStack;
}

/// Crate version, automatically updated from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
