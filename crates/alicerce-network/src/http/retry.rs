//! Retry policies for HTTP resources
//!
//! The generic policies live in `alicerce_core::retry`. This module adds the
//! HTTP-aware rules that need to inspect a [`NetworkError`] or a response.

use super::resource::RetryMetadata;
use crate::error::{NetworkError, TransportError};
use alicerce_core::retry::{scale, Action, Backoff, RetryError, RetryPolicy, Truncation};
use std::time::Duration;

/// Check if a network error is worth retrying.
///
/// # HTTP Retry Logic
///
/// Retryable errors:
/// - Timeout errors
/// - Connection errors (network failures)
/// - `408 Request Timeout`, `429 Too Many Requests` and any `5xx` status
///
/// Everything else will fail again the same way and is not retryable.
pub fn is_retryable(error: &NetworkError) -> bool {
    match error {
        NetworkError::Transport(TransportError::Timeout) => true,
        NetworkError::Transport(TransportError::Connection(_)) => true,
        NetworkError::Transport(TransportError::Http(_)) => false,

        NetworkError::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),

        NetworkError::NoRequest(_)
        | NetworkError::Authentication(_)
        | NetworkError::NoData { .. }
        | NetworkError::Retry { .. }
        | NetworkError::Cancelled => false,
    }
}

/// A rule that refuses to retry errors for which [`is_retryable`] is false.
///
/// Errors that aren't [`NetworkError`]s get no opinion.
pub fn transient_errors_only() -> RetryPolicy<RetryMetadata> {
    RetryPolicy::custom(|error, _, _| match error.downcast_ref::<NetworkError>() {
        Some(error) if !is_retryable(error) => Action::NoRetry(RetryError::custom(error.clone())),
        _ => Action::None,
    })
}

/// A rule that waits for the delay a `Retry-After` header asks for.
///
/// Only the delay-seconds form of the header is understood. Delays above
/// `max_delay` refuse the retry.
pub fn retry_after_header(max_delay: Duration) -> RetryPolicy<RetryMetadata> {
    RetryPolicy::custom(move |_, _, metadata: &RetryMetadata| {
        let delay = metadata
            .response
            .as_ref()
            .and_then(|response| response.get_header("retry-after"))
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        match delay {
            Some(delay) if delay > max_delay => Action::NoRetry(RetryError::Delay(max_delay)),
            Some(delay) => Action::RetryAfter(delay),
            None => Action::None,
        }
    })
}

/// HTTP retry policies with sensible defaults for network operations.
///
/// # Default Configuration
///
/// - At most 3 retries
/// - Exponential backoff from 500ms, doubling with 10% jitter
/// - At most 60s of total scheduled delay
/// - Only transient errors are retried
/// - `Retry-After` headers of up to 60s are honored
pub fn default_policies() -> Vec<RetryPolicy<RetryMetadata>> {
    vec![
        RetryPolicy::MaxRetries(3),
        RetryPolicy::Backoff(Backoff::Exponential(
            Duration::from_millis(500),
            scale::exponential_with_jitter(2.0, 0.1),
            Truncation::MaxDelay(Duration::from_secs(60)),
        )),
        transient_errors_only(),
        retry_after_header(Duration::from_secs(60)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{HttpRequest, HttpResponse};
    use alicerce_core::retry::RetryState;
    use rstest::rstest;
    use std::collections::HashMap;
    use url::Url;

    fn metadata(response: Option<HttpResponse>) -> RetryMetadata {
        RetryMetadata {
            request: HttpRequest::new(
                http::Method::GET,
                Url::parse("https://example.com").unwrap(),
            ),
            payload: response.as_ref().map(|r| r.body.clone()),
            response,
        }
    }

    fn http_error(status: u16) -> NetworkError {
        NetworkError::Http {
            status,
            api_error: None,
            response: HttpResponse::new(status, HashMap::new(), Vec::new()),
        }
    }

    #[rstest]
    #[case(NetworkError::Transport(TransportError::Timeout), true)]
    #[case(NetworkError::Transport(TransportError::Connection("reset".into())), true)]
    #[case(NetworkError::Transport(TransportError::Http("bad".into())), false)]
    #[case(http_error(408), true)]
    #[case(http_error(429), true)]
    #[case(http_error(503), true)]
    #[case(http_error(400), false)]
    #[case(http_error(404), false)]
    #[case(NetworkError::Cancelled, false)]
    fn test_is_retryable(#[case] error: NetworkError, #[case] expected: bool) {
        assert_eq!(is_retryable(&error), expected);
    }

    #[test]
    fn test_transient_errors_only_vetoes_client_errors() {
        let policy = transient_errors_only();
        let state = RetryState::empty();

        let action = policy.should_retry(&http_error(404), &state, &metadata(None));
        assert!(matches!(action, Action::NoRetry(RetryError::Custom(_))));

        let action = policy.should_retry(&http_error(503), &state, &metadata(None));
        assert_eq!(action, Action::None);

        let other = std::io::Error::other("not a network error");
        assert_eq!(policy.should_retry(&other, &state, &metadata(None)), Action::None);
    }

    #[rstest]
    #[case(Some("3"), Action::RetryAfter(Duration::from_secs(3)))]
    #[case(Some(" 0 "), Action::RetryAfter(Duration::ZERO))]
    #[case(Some("120"), Action::NoRetry(RetryError::Delay(Duration::from_secs(60))))]
    #[case(Some("Wed, 21 Oct 2015 07:28:00 GMT"), Action::None)]
    #[case(None, Action::None)]
    fn test_retry_after_header(#[case] header: Option<&str>, #[case] expected: Action) {
        let mut headers = HashMap::new();
        if let Some(value) = header {
            headers.insert("Retry-After".to_string(), value.to_string());
        }
        let response = HttpResponse::new(429, headers, Vec::new());
        let policy = retry_after_header(Duration::from_secs(60));

        let action =
            policy.should_retry(&http_error(429), &RetryState::empty(), &metadata(Some(response)));

        assert_eq!(action, expected);
    }

    #[test]
    fn test_default_policies_stop_after_three_retries() {
        let policies = default_policies();
        let mut state = RetryState::empty();
        let error = NetworkError::Transport(TransportError::Timeout);

        for _ in 0..3 {
            let action = Action::fold(
                policies
                    .iter()
                    .map(|policy| policy.should_retry(&error, &state, &metadata(None))),
            );
            let Action::RetryAfter(delay) = action else {
                panic!("expected a delayed retry, got {action:?}");
            };
            state.record(std::sync::Arc::new(error.clone()), Some(delay));
        }

        let action = Action::fold(
            policies
                .iter()
                .map(|policy| policy.should_retry(&error, &state, &metadata(None))),
        );
        assert_eq!(action, Action::NoRetry(RetryError::Retries(3)));
    }
}
