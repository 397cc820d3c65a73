//! HTTP resources: what to request, how to read API errors, when to retry.

use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::traits::{HttpRequest, HttpResponse};
use alicerce_core::decoding::ErrorDecoding;
use alicerce_core::retry::{
    Action, ActionPriority, RetryPolicy, RetryState, RetryableResource, SharedError,
};
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// The request half of an HTTP resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// HTTP method
    pub method: Method,
    /// Path relative to the configured base URL, or an absolute URL
    pub path: String,
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body
    pub body: Option<Bytes>,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// A `GET` endpoint.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` endpoint with a body.
    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// Add a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body, along with its `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if `body` can't be encoded.
    pub fn with_json_body<T: Serialize + ?Sized>(self, body: &T) -> serde_json::Result<Self> {
        let payload = serde_json::to_vec(body)?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(payload))
    }

    /// Builds the request for this endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::NoRequest`] when the URL can't be formed.
    pub fn make_request(&self, config: &NetworkConfig) -> Result<HttpRequest> {
        let mut url = match (&config.base_url, Url::parse(&self.path)) {
            (_, Ok(absolute)) => absolute,
            (Some(base), Err(url::ParseError::RelativeUrlWithoutBase)) => base
                .join(&self.path)
                .map_err(|e| NetworkError::NoRequest(Arc::new(e)))?,
            (_, Err(error)) => return Err(NetworkError::NoRequest(Arc::new(error))),
        };

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let mut headers = config.default_headers.clone();
        headers.extend(self.headers.clone());

        Ok(HttpRequest {
            method: self.method.clone(),
            url,
            headers,
            body: self.body.clone(),
        })
    }
}

/// What a retry rule gets to see about a failed HTTP attempt.
#[derive(Debug, Clone)]
pub struct RetryMetadata {
    /// The request that failed
    pub request: HttpRequest,
    /// The response payload, if a response was received
    pub payload: Option<Bytes>,
    /// The response, if one was received
    pub response: Option<HttpResponse>,
}

/// Decodes API errors out of failed HTTP responses.
pub type ApiErrorDecoding = ErrorDecoding<SharedError, Bytes, HttpResponse>;

/// A fetchable HTTP resource.
///
/// The resource carries its own retry state, which the HTTP network stack
/// grows after every failed attempt. Cloning a fresh resource for each fetch
/// keeps attempts of different fetches apart.
#[derive(Clone)]
pub struct HttpResource {
    /// The request to make
    pub endpoint: Endpoint,
    /// Extracts an API error from non-successful responses
    pub error_decoding: ApiErrorDecoding,
    /// The retry policies evaluated on each failure
    pub retry_policies: Vec<RetryPolicy<RetryMetadata>>,
    /// Errors and delay accumulated by previous attempts
    pub retry_state: RetryState,
    /// Picks the prevailing action among the policies' actions
    pub retry_priority: ActionPriority,
}

impl HttpResource {
    /// A resource without retry policies nor API error decoding.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            error_decoding: ErrorDecoding::none(),
            retry_policies: Vec::new(),
            retry_state: RetryState::empty(),
            retry_priority: Action::most_prioritary,
        }
    }

    /// Set the API error decoding
    pub fn with_error_decoding(mut self, decoding: ApiErrorDecoding) -> Self {
        self.error_decoding = decoding;
        self
    }

    /// Decode API errors as JSON bodies of type `E`.
    pub fn with_json_api_error<E>(self) -> Self
    where
        E: DeserializeOwned + std::error::Error + Send + Sync + 'static,
    {
        let json = ErrorDecoding::<E, Bytes, HttpResponse>::json();
        self.with_error_decoding(ErrorDecoding::new(move |payload, response| {
            json.decode(payload, response)
                .map(|error| Arc::new(error) as SharedError)
        }))
    }

    /// Add a retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy<RetryMetadata>) -> Self {
        self.retry_policies.push(policy);
        self
    }

    /// Replace the retry policies
    pub fn with_retry_policies(
        mut self,
        policies: impl IntoIterator<Item = RetryPolicy<RetryMetadata>>,
    ) -> Self {
        self.retry_policies = policies.into_iter().collect();
        self
    }

    /// Set the action priority function
    pub fn with_retry_priority(mut self, priority: ActionPriority) -> Self {
        self.retry_priority = priority;
        self
    }
}

impl RetryableResource for HttpResource {
    type RetryMetadata = RetryMetadata;

    fn retry_policies(&self) -> &[RetryPolicy<RetryMetadata>] {
        &self.retry_policies
    }

    fn retry_state(&self) -> &RetryState {
        &self.retry_state
    }

    fn retry_state_mut(&mut self) -> &mut RetryState {
        &mut self.retry_state
    }

    fn retry_action_priority(&self) -> ActionPriority {
        self.retry_priority
    }
}

impl fmt::Debug for HttpResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResource")
            .field("endpoint", &self.endpoint)
            .field("retry_policies", &self.retry_policies)
            .field("retry_state", &self.retry_state)
            .finish_non_exhaustive()
    }
}
