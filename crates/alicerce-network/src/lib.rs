//! Network layer for Alicerce
//!
//! Provides the [`NetworkStack`] contract the fetch orchestrator talks to,
//! and an HTTP implementation of it.
//!
//! # Architecture
//!
//! - **NetworkStack trait**: Callback-based, cancelable fetch of a resource
//! - **HTTP stack**: Retries failed attempts according to the resource's
//!   retry policies, on top of any [`HttpClient`]
//! - **HttpClient trait**: A single request/response exchange, implemented
//!   with reqwest by [`ReqwestClient`]
//! - **Error handling**: [`NetworkError`] covers request building, HTTP
//!   statuses, transport failures, refused retries and cancellation

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Usage
//!
//! ```no_run
//! use alicerce_network::http::{retry, Endpoint, HttpNetworkStack, HttpResource};
//! use alicerce_network::{NetworkConfig, NetworkStack};
//! use url::Url;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NetworkConfig::new(Url::parse("https://api.example.com/")?);
//! let stack = HttpNetworkStack::from_config(config)?;
//!
//! let resource = HttpResource::new(Endpoint::get("users/42"))
//!     .with_retry_policies(retry::default_policies());
//!
//! let _handle = stack.fetch(resource, Box::new(|result| match result {
//!     Ok(value) => println!("{} bytes", value.value.len()),
//!     Err(error) => eprintln!("fetch failed: {error}"),
//! }));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod stack;
pub mod traits;

// Re-export commonly used types
pub use config::NetworkConfig;
pub use error::{NetworkError, Result, TransportError};
pub use http::{
    Authenticator, Endpoint, HttpNetworkStack, HttpResource, Interceptor, ReqwestClient,
    RetryMetadata,
};
pub use stack::{NetworkCompletion, NetworkStack, NetworkValue};
pub use traits::{HttpClient, HttpRequest, HttpResponse};
