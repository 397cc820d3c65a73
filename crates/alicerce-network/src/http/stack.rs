//! The retrying HTTP network stack.

use super::client::ReqwestClient;
use super::interceptor::{Authenticator, Interceptor, RequestPipeline};
use super::resource::{HttpResource, RetryMetadata};
use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::observability::{self, RequestMetadata, RequestTimer, ResponseMetadata};
use crate::stack::{NetworkCompletion, NetworkStack, NetworkValue};
use crate::traits::{HttpClient, HttpResponse};
use alicerce_core::Cancelable;
use alicerce_core::retry::{Action, RetryableResource};
use bytes::Bytes;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// A [`NetworkStack`] fetching [`HttpResource`]s.
///
/// Each fetch runs as a task on the stack's tokio runtime. Every attempt's
/// request goes through the stack's [`Authenticator`] and [`Interceptor`]s
/// before being sent. A failed attempt is evaluated against the resource's
/// retry policies (and by the authenticator and interceptors) before being
/// recorded in its retry state, and then either retried (possibly after a
/// delay) or reported:
///
/// - `Action::None` reports the attempt's error as is
/// - `Action::NoRetry` reports [`NetworkError::Retry`] with the retry state
/// - `Action::Retry` and `Action::RetryAfter` start a new attempt
///
/// Cancelling a fetch interrupts the attempt or delay in progress.
pub struct HttpNetworkStack<C = ReqwestClient> {
    client: Arc<C>,
    config: Arc<NetworkConfig>,
    pipeline: RequestPipeline,
    runtime: Handle,
}

impl<C: HttpClient> HttpNetworkStack<C> {
    /// Creates a stack running its fetches on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(client: C, config: NetworkConfig) -> Self {
        Self::with_runtime(client, config, Handle::current())
    }

    /// Creates a stack running its fetches on `runtime`.
    pub fn with_runtime(client: C, config: NetworkConfig, runtime: Handle) -> Self {
        Self {
            client: Arc::new(client),
            config: Arc::new(config),
            pipeline: RequestPipeline::default(),
            runtime,
        }
    }

    /// Authenticate every request with `authenticator`.
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.pipeline.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Add an interceptor, run after the ones already added.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.pipeline.interceptors.push(Arc::new(interceptor));
        self
    }

    /// The stack's configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

impl HttpNetworkStack<ReqwestClient> {
    /// Creates a stack with a [`ReqwestClient`] built from `config`, on the
    /// current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the client can't be built.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn from_config(config: NetworkConfig) -> Result<Self> {
        let client = ReqwestClient::with_config(&config)?;
        Ok(Self::new(client, config))
    }
}

impl<C> Clone for HttpNetworkStack<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            config: Arc::clone(&self.config),
            pipeline: self.pipeline.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<C: HttpClient> NetworkStack for HttpNetworkStack<C> {
    type Resource = HttpResource;
    type Remote = Bytes;
    type Response = HttpResponse;
    type Error = NetworkError;

    fn fetch(
        &self,
        resource: HttpResource,
        completion: NetworkCompletion<Bytes, HttpResponse, NetworkError>,
    ) -> Box<dyn Cancelable> {
        let (cancel, cancelled) = watch::channel(false);
        let client = Arc::clone(&self.client);
        let config = Arc::clone(&self.config);
        let pipeline = self.pipeline.clone();

        self.runtime.spawn(async move {
            let mut signal = cancelled.clone();

            let attempt = perform(client.as_ref(), &config, &pipeline, resource, &cancelled);

            let result = tokio::select! {
                biased;
                () = wait_for_cancel(&mut signal) => Err(NetworkError::Cancelled),
                result = attempt => result,
            };

            completion(result);
        });

        Box::new(FetchHandle { cancel })
    }
}

/// Cancels a running fetch.
struct FetchHandle {
    cancel: watch::Sender<bool>,
}

impl Cancelable for FetchHandle {
    fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

/// Resolves once the fetch is cancelled.
///
/// Dropping the handle without cancelling lets the fetch run to completion.
async fn wait_for_cancel(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn perform<C: HttpClient + ?Sized>(
    client: &C,
    config: &NetworkConfig,
    pipeline: &RequestPipeline,
    mut resource: HttpResource,
    cancelled: &watch::Receiver<bool>,
) -> Result<NetworkValue<Bytes, HttpResponse>> {
    loop {
        let request = pipeline.prepare(resource.endpoint.make_request(config)?).await?;
        let log = RequestMetadata::new(request.method.as_str(), request.url.as_str())
            .with_body_size(request.body.as_ref().map_or(0, Bytes::len))
            .with_attempt(resource.retry_state().attempt_count());

        log.log_request();
        pipeline.scheduled(&request);
        let timer = RequestTimer::start();

        let (error, metadata) = match client.send(request.clone()).await {
            Ok(response) => {
                let outcome = ResponseMetadata::new(Some(response.status), timer.elapsed())
                    .with_body_size(response.body.len());

                match validate(&resource, response) {
                    Ok(value) => {
                        outcome.log_success(&log);
                        pipeline.succeeded(&request, &value);
                        return Ok(value);
                    }
                    Err((error, response)) => {
                        outcome.log_error(&log, &error.to_string());
                        let metadata = RetryMetadata {
                            request,
                            payload: Some(response.body.clone()),
                            response: Some(response),
                        };
                        (error, metadata)
                    }
                }
            }
            Err(error) => {
                let error = NetworkError::from(error);
                ResponseMetadata::new(None, timer.elapsed()).log_error(&log, &error.to_string());
                let metadata = RetryMetadata {
                    request,
                    payload: None,
                    response: None,
                };
                (error, metadata)
            }
        };

        // the policies see the state without the current error
        let action = pipeline
            .failure_actions(&error, &metadata, resource.retry_state())
            .into_iter()
            .fold(
                resource.should_retry(&error, &metadata),
                resource.retry_action_priority(),
            );
        let scheduled = match action {
            Action::RetryAfter(delay) if !delay.is_zero() => Some(delay),
            _ => None,
        };
        resource
            .retry_state_mut()
            .record(Arc::new(error.clone()), scheduled);

        match action {
            Action::None => return Err(error),
            Action::NoRetry(reason) => {
                return Err(NetworkError::Retry {
                    error: reason,
                    state: resource.retry_state().clone(),
                });
            }
            Action::Retry | Action::RetryAfter(_) => {}
        }

        if *cancelled.borrow() {
            return Err(NetworkError::Cancelled);
        }

        observability::log_retry(&log, scheduled);

        if let Some(delay) = scheduled {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Splits a response into a value or an error.
///
/// `204 No Content` and `205 Reset Content` succeed without a body. Any other
/// successful status without a body is [`NetworkError::NoData`].
fn validate(
    resource: &HttpResource,
    response: HttpResponse,
) -> std::result::Result<NetworkValue<Bytes, HttpResponse>, (NetworkError, HttpResponse)> {
    if response.is_success() {
        if response.body.is_empty() && !matches!(response.status, 204 | 205) {
            let error = NetworkError::NoData {
                response: response.clone(),
            };
            return Err((error, response));
        }

        return Ok(NetworkValue {
            value: response.body.clone(),
            response,
        });
    }

    let payload = (!response.body.is_empty()).then_some(&response.body);
    let api_error = resource.error_decoding.decode(payload, &response);

    let error = NetworkError::Http {
        status: response.status,
        api_error,
        response: response.clone(),
    };
    Err((error, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::interceptor::BearerAuthenticator;
    use crate::http::resource::Endpoint;
    use crate::traits::HttpRequest;
    use alicerce_core::retry::{
        Backoff, RetryError, RetryPolicy, RetryState, SharedError, Truncation,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use url::Url;

    type Reply = std::result::Result<HttpResponse, TransportError>;

    /// Replies with a script of responses, recording every request.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<HttpRequest>>,
        latency: Duration,
    }

    impl ScriptedClient {
        fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                ..Self::default()
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: HttpRequest) -> Reply {
            self.requests.lock().unwrap().push(request);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Connection("script exhausted".into())))
        }
    }

    fn response(status: u16, body: &'static [u8]) -> Reply {
        Ok(HttpResponse::new(status, HashMap::new(), Bytes::from_static(body)))
    }

    fn stack(client: Arc<ScriptedClient>) -> HttpNetworkStack<Arc<ScriptedClient>> {
        let config = NetworkConfig::new(Url::parse("https://api.example.com/").unwrap());
        HttpNetworkStack::new(client, config)
    }

    fn resource() -> HttpResource {
        HttpResource::new(Endpoint::get("items"))
    }

    async fn fetch(
        stack: &HttpNetworkStack<Arc<ScriptedClient>>,
        resource: HttpResource,
    ) -> Result<NetworkValue<Bytes, HttpResponse>> {
        let (tx, rx) = oneshot::channel();
        let _handle = stack.fetch(
            resource,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_body_and_response() {
        let client = Arc::new(ScriptedClient::new([response(200, b"[1,2]")]));

        let value = fetch(&stack(client.clone()), resource()).await.unwrap();

        assert_eq!(value.value, Bytes::from_static(b"[1,2]"));
        assert_eq!(value.response.status, 200);
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].url.as_str(), "https://api.example.com/items");
    }

    #[rstest]
    #[case(204)]
    #[case(205)]
    #[tokio::test]
    async fn test_empty_body_allowed_for_no_content(#[case] status: u16) {
        let client = Arc::new(ScriptedClient::new([response(status, b"")]));

        let value = fetch(&stack(client), resource()).await.unwrap();

        assert!(value.value.is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_on_ok_is_no_data() {
        let client = Arc::new(ScriptedClient::new([response(200, b"")]));

        let result = fetch(&stack(client), resource()).await;

        assert!(matches!(result, Err(NetworkError::NoData { .. })));
    }

    #[derive(Debug, serde::Deserialize, thiserror::Error)]
    #[error("{message}")]
    struct ApiError {
        message: String,
    }

    #[tokio::test]
    async fn test_http_error_carries_decoded_api_error() {
        let client = Arc::new(ScriptedClient::new([response(
            422,
            br#"{"message":"name is required"}"#,
        )]));
        let resource = resource().with_json_api_error::<ApiError>();

        let result = fetch(&stack(client), resource).await;

        let Err(NetworkError::Http {
            status, api_error, ..
        }) = result
        else {
            panic!("expected an HTTP error, got {result:?}");
        };
        assert_eq!(status, 422);
        assert_eq!(api_error.unwrap().to_string(), "name is required");
    }

    #[tokio::test]
    async fn test_no_policies_fails_on_first_error() {
        let client = Arc::new(ScriptedClient::new([response(503, b"")]));

        let result = fetch(&stack(client.clone()), resource()).await;

        assert!(matches!(result, Err(NetworkError::Http { status: 503, .. })));
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let client = Arc::new(ScriptedClient::new([
            Err(TransportError::Timeout),
            response(500, b""),
            response(200, b"ok"),
        ]));
        let resource = resource().with_retry_policy(RetryPolicy::MaxRetries(3));

        let value = fetch(&stack(client.clone()), resource).await.unwrap();

        assert_eq!(value.value, Bytes::from_static(b"ok"));
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_state() {
        let client = Arc::new(ScriptedClient::new([
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]));
        let resource = resource().with_retry_policy(RetryPolicy::MaxRetries(2));

        let result = fetch(&stack(client.clone()), resource).await;

        let Err(NetworkError::Retry { error, state }) = result else {
            panic!("expected a retry error, got {result:?}");
        };
        assert_eq!(error, RetryError::Retries(2));
        // the refused attempt is recorded too
        assert_eq!(state.errors.len(), 3);
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_are_accumulated() {
        let client = Arc::new(ScriptedClient::new([
            response(503, b""),
            response(503, b""),
            response(503, b""),
        ]));
        let resource = resource().with_retry_policy(RetryPolicy::Backoff(Backoff::constant(
            Duration::from_secs(2),
            Truncation::MaxRetries(2),
        )));
        let started = tokio::time::Instant::now();

        let result = fetch(&stack(client), resource).await;

        let Err(NetworkError::Retry { error, state }) = result else {
            panic!("expected a retry error, got {result:?}");
        };
        assert_eq!(error, RetryError::Retries(2));
        assert_eq!(state.total_delay, Duration::from_secs(4));
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_zero_delay_retries_immediately_without_accounting() {
        let client = Arc::new(ScriptedClient::new([response(503, b""), response(200, b"ok")]));
        let resource = resource()
            .with_retry_policy(RetryPolicy::custom(|_, _, _| Action::RetryAfter(Duration::ZERO)));

        let value = fetch(&stack(client.clone()), resource).await.unwrap();

        assert_eq!(value.value, Bytes::from_static(b"ok"));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_custom_rule_sees_state_without_current_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let client = Arc::new(ScriptedClient::new([
            response(500, b""),
            response(500, b""),
            response(200, b"ok"),
        ]));
        let resource = resource().with_retry_policy(RetryPolicy::custom(
            move |_, state, metadata: &RetryMetadata| {
                recorded
                    .lock()
                    .unwrap()
                    .push((state.retry_count(), metadata.response.as_ref().map(|r| r.status)));
                Action::Retry
            },
        ));

        fetch(&stack(client), resource).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(0, Some(500)), (1, Some(500))]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_attempt() {
        let client = Arc::new(
            ScriptedClient::new([response(200, b"late")]).with_latency(Duration::from_secs(30)),
        );
        let stack = stack(client);
        let (tx, rx) = oneshot::channel();

        let handle = stack.fetch(
            resource(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(NetworkError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropping_handle_does_not_cancel() {
        let client = Arc::new(
            ScriptedClient::new([response(200, b"ok")]).with_latency(Duration::from_millis(20)),
        );
        let stack = stack(client);
        let (tx, rx) = oneshot::channel();

        drop(stack.fetch(
            resource(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        ));

        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_without_request() {
        let client = Arc::new(ScriptedClient::new([]));
        let stack = HttpNetworkStack::new(client.clone(), NetworkConfig::default());

        let result = fetch(&stack, resource()).await;

        assert!(matches!(result, Err(NetworkError::NoRequest(_))));
        assert_eq!(client.request_count(), 0);
    }

    fn authorization(request: &HttpRequest) -> Option<&str> {
        request.headers.get("Authorization").map(String::as_str)
    }

    /// Hands out a new token whenever the server answers 401.
    #[derive(Default)]
    struct RefreshingAuthenticator {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for RefreshingAuthenticator {
        async fn authenticate(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpRequest, SharedError> {
            let token = format!("token-{}", self.refreshes.load(Ordering::SeqCst));
            Ok(request.with_header("Authorization", token))
        }

        fn evaluate_failure(
            &self,
            error: &NetworkError,
            _metadata: &RetryMetadata,
            state: &RetryState,
        ) -> Action {
            if error.status() == Some(401) && state.retry_count() == 0 {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                Action::Retry
            } else {
                Action::None
            }
        }
    }

    struct FailingAuthenticator;

    #[async_trait]
    impl Authenticator for FailingAuthenticator {
        async fn authenticate(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpRequest, SharedError> {
            let error: SharedError = Arc::new(std::io::Error::other("no credentials"));
            Err(error)
        }
    }

    #[derive(Default)]
    struct RecordingInterceptor {
        scheduled: Mutex<Vec<String>>,
        succeeded: AtomicUsize,
        refuse_retries: bool,
    }

    #[async_trait]
    impl Interceptor for Arc<RecordingInterceptor> {
        async fn intercept_request(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpRequest, SharedError> {
            Ok(request.with_header("X-Request-Id", "42"))
        }

        fn intercept_scheduled(&self, request: &HttpRequest) {
            self.scheduled
                .lock()
                .unwrap()
                .push(authorization(request).unwrap_or_default().to_string());
        }

        fn intercept_success(
            &self,
            _request: &HttpRequest,
            _value: &NetworkValue<Bytes, HttpResponse>,
        ) {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }

        fn intercept_failure(
            &self,
            _error: &NetworkError,
            _metadata: &RetryMetadata,
            _state: &RetryState,
        ) -> Action {
            if self.refuse_retries {
                Action::NoRetry(RetryError::Retries(0))
            } else {
                Action::None
            }
        }
    }

    #[tokio::test]
    async fn test_every_attempt_is_authenticated() {
        let client = Arc::new(ScriptedClient::new([response(500, b""), response(200, b"ok")]));
        let stack = stack(client.clone()).with_authenticator(BearerAuthenticator::new("abc"));
        let resource = resource().with_retry_policy(RetryPolicy::MaxRetries(1));

        fetch(&stack, resource).await.unwrap();

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| authorization(r) == Some("Bearer abc")));
    }

    #[tokio::test]
    async fn test_authentication_failure_sends_nothing() {
        let client = Arc::new(ScriptedClient::new([response(200, b"ok")]));
        let stack = stack(client.clone()).with_authenticator(FailingAuthenticator);

        let result = fetch(&stack, resource()).await;

        let Err(NetworkError::Authentication(error)) = result else {
            panic!("expected an authentication error, got {result:?}");
        };
        assert_eq!(error.to_string(), "no credentials");
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_authenticator_retries_with_refreshed_credentials() {
        let client = Arc::new(ScriptedClient::new([response(401, b""), response(200, b"ok")]));
        let stack = stack(client.clone()).with_authenticator(RefreshingAuthenticator::default());

        // no retry policy: the retry is the authenticator's call
        let value = fetch(&stack, resource()).await.unwrap();

        assert_eq!(value.value, Bytes::from_static(b"ok"));
        let requests = client.requests.lock().unwrap();
        let tokens: Vec<_> = requests.iter().map(authorization).collect();
        assert_eq!(tokens, vec![Some("token-0"), Some("token-1")]);
    }

    #[tokio::test]
    async fn test_interceptor_sees_every_attempt() {
        let interceptor = Arc::new(RecordingInterceptor::default());
        let client = Arc::new(ScriptedClient::new([response(503, b""), response(200, b"ok")]));
        let stack = stack(client.clone())
            .with_authenticator(BearerAuthenticator::new("abc"))
            .with_interceptor(interceptor.clone());
        let resource = resource().with_retry_policy(RetryPolicy::MaxRetries(1));

        fetch(&stack, resource).await.unwrap();

        // interceptors run after the authenticator
        assert_eq!(*interceptor.scheduled.lock().unwrap(), vec!["Bearer abc", "Bearer abc"]);
        assert_eq!(interceptor.succeeded.load(Ordering::SeqCst), 1);
        let requests = client.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.headers.get("X-Request-Id").is_some()));
    }

    #[tokio::test]
    async fn test_interceptor_can_refuse_retries() {
        let interceptor = Arc::new(RecordingInterceptor {
            refuse_retries: true,
            ..RecordingInterceptor::default()
        });
        let client = Arc::new(ScriptedClient::new([response(503, b""), response(200, b"ok")]));
        let stack = stack(client.clone()).with_interceptor(interceptor.clone());
        let resource = resource().with_retry_policy(RetryPolicy::MaxRetries(3));

        let result = fetch(&stack, resource).await;

        let Err(NetworkError::Retry { error, state }) = result else {
            panic!("expected a retry error, got {result:?}");
        };
        assert_eq!(error, RetryError::Retries(0));
        assert_eq!(state.errors.len(), 1);
        assert_eq!(client.request_count(), 1);
        assert_eq!(interceptor.succeeded.load(Ordering::SeqCst), 0);
    }
}
