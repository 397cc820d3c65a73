//! Request authentication and interception.
//!
//! An [`HttpNetworkStack`](super::HttpNetworkStack) runs every attempt
//! through an optional [`Authenticator`] and a chain of [`Interceptor`]s:
//!
//! 1. the endpoint builds the request
//! 2. the authenticator signs it
//! 3. each interceptor may rewrite it, in the order they were added
//! 4. the request is sent
//! 5. a valid response is shown to every interceptor, while a failed attempt
//!    is evaluated by the authenticator and every interceptor, next to the
//!    resource's retry policies
//!
//! Failure evaluations are combined with the resource's action priority, so
//! an authenticator can ask for a retry after refreshing its credentials
//! even when no retry policy would.

use super::resource::RetryMetadata;
use crate::error::{NetworkError, Result};
use crate::stack::NetworkValue;
use crate::traits::{HttpRequest, HttpResponse};
use alicerce_core::retry::{Action, RetryState, SharedError};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Authenticates requests before they are sent.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns `request` with its credentials attached.
    ///
    /// A failure aborts the fetch with [`NetworkError::Authentication`].
    async fn authenticate(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpRequest, SharedError>;

    /// Evaluates a failed attempt, e.g. retrying once credentials expired.
    ///
    /// `state` doesn't include the current error yet.
    fn evaluate_failure(
        &self,
        _error: &NetworkError,
        _metadata: &RetryMetadata,
        _state: &RetryState,
    ) -> Action {
        Action::None
    }
}

/// Observes and rewrites the requests of a stack.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Rewrites an authenticated request before it's sent.
    ///
    /// A failure aborts the fetch with [`NetworkError::NoRequest`].
    async fn intercept_request(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpRequest, SharedError> {
        Ok(request)
    }

    /// Called right before `request` is sent.
    fn intercept_scheduled(&self, _request: &HttpRequest) {}

    /// Called with every valid response.
    fn intercept_success(
        &self,
        _request: &HttpRequest,
        _value: &NetworkValue<Bytes, HttpResponse>,
    ) {
    }

    /// Evaluates a failed attempt. `state` doesn't include the current error yet.
    fn intercept_failure(
        &self,
        _error: &NetworkError,
        _metadata: &RetryMetadata,
        _state: &RetryState,
    ) -> Action {
        Action::None
    }
}

/// Authenticates requests with a static bearer token.
#[derive(Clone)]
pub struct BearerAuthenticator {
    token: String,
}

impl BearerAuthenticator {
    /// Creates an authenticator sending `token` on every request.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthenticator")
            .field("token", &"***")
            .finish()
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn authenticate(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<HttpRequest, SharedError> {
        Ok(request.with_header("Authorization", format!("Bearer {}", self.token)))
    }
}

/// The authenticator and interceptors of a stack.
#[derive(Clone, Default)]
pub(crate) struct RequestPipeline {
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
}

impl RequestPipeline {
    /// Authenticates and intercepts a request built by an endpoint.
    pub(crate) async fn prepare(&self, request: HttpRequest) -> Result<HttpRequest> {
        let mut request = match &self.authenticator {
            Some(authenticator) => authenticator
                .authenticate(request)
                .await
                .map_err(NetworkError::Authentication)?,
            None => request,
        };

        for interceptor in &self.interceptors {
            request = interceptor
                .intercept_request(request)
                .await
                .map_err(NetworkError::NoRequest)?;
        }

        Ok(request)
    }

    pub(crate) fn scheduled(&self, request: &HttpRequest) {
        for interceptor in &self.interceptors {
            interceptor.intercept_scheduled(request);
        }
    }

    pub(crate) fn succeeded(
        &self,
        request: &HttpRequest,
        value: &NetworkValue<Bytes, HttpResponse>,
    ) {
        for interceptor in &self.interceptors {
            interceptor.intercept_success(request, value);
        }
    }

    /// The actions the authenticator and interceptors ask for after a failure.
    pub(crate) fn failure_actions(
        &self,
        error: &NetworkError,
        metadata: &RetryMetadata,
        state: &RetryState,
    ) -> Vec<Action> {
        let authenticator = self
            .authenticator
            .iter()
            .map(|authenticator| authenticator.evaluate_failure(error, metadata, state));
        let interceptors = self
            .interceptors
            .iter()
            .map(|interceptor| interceptor.intercept_failure(error, metadata, state));

        authenticator.chain(interceptors).collect()
    }
}
