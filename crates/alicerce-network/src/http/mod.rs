//! HTTP network stack
//!
//! Fetches [`HttpResource`]s through an [`HttpClient`](crate::traits::HttpClient),
//! retrying failed attempts as the resource's retry policies decide.
//! Requests can be authenticated and intercepted on their way out, see
//! [`interceptor`].

pub mod client;
pub mod interceptor;
pub mod resource;
pub mod retry;
pub mod stack;

pub use client::ReqwestClient;
pub use interceptor::{Authenticator, BearerAuthenticator, Interceptor};
pub use resource::{ApiErrorDecoding, Endpoint, HttpResource, RetryMetadata};
pub use stack::HttpNetworkStack;
