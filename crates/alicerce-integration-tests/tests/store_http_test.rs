//! End-to-end fetches through the HTTP network stack and disk persistence

use alicerce::{FetchStrategy, FetchValue, Resource, Store};
use alicerce_core::retry::{Backoff, RetryPolicy, Truncation};
use alicerce_integration_tests::{HttpStore, fetch};
use alicerce_network::http::retry;
use alicerce_network::{Endpoint, HttpNetworkStack, HttpResource, NetworkConfig};
use alicerce_persistence::{DiskMemoryConfig, DiskMemoryPersistenceStack, PersistenceStack};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, PartialEq, serde::Deserialize)]
struct User {
    name: String,
}

fn user(name: &str) -> User {
    User { name: name.to_string() }
}

fn store(server: &MockServer, cache: &Path) -> HttpStore {
    let config =
        NetworkConfig::new(server.uri().parse().unwrap()).with_timeout(Duration::from_secs(5));
    let network = HttpNetworkStack::from_config(config).unwrap();
    let persistence = DiskMemoryPersistenceStack::new(DiskMemoryConfig::new(cache)).unwrap();
    Store::new(network, persistence)
}

fn user_resource() -> Resource<HttpNetworkStack, User> {
    Resource::json(HttpResource::new(Endpoint::get("users/42")), "user-42")
}

async fn persisted(stack: &DiskMemoryPersistenceStack, key: &str) -> Option<Bytes> {
    let (tx, rx) = oneshot::channel();
    stack.object(key, Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.await.unwrap().unwrap()
}

async fn persist(stack: &DiskMemoryPersistenceStack, key: &str, payload: &'static str) {
    let (tx, rx) = oneshot::channel();
    stack.set_object(Bytes::from_static(payload.as_bytes()), key, Box::new(move |result| {
        let _ = tx.send(result);
    }));
    rx.await.unwrap().unwrap();
}

/// Polls the persisted payload of `key` until it equals `expected`.
async fn wait_for_persisted(stack: &DiskMemoryPersistenceStack, key: &str, expected: &str) {
    for _ in 0..100 {
        if persisted(stack, key).await.as_deref() == Some(expected.as_bytes()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{key} was never persisted as {expected}");
}

async fn wait_for_file(path: &Path) {
    for _ in 0..100 {
        if path.is_file() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} was never written", path.display());
}

#[tokio::test]
async fn test_network_value_is_persisted_to_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"ana"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let cache = tempfile::tempdir().unwrap();
    let store = store(&server, cache.path());

    let value = fetch(&store, user_resource()).await.unwrap();

    assert!(value.is_network());
    assert_eq!(value.response().map(|r| r.status), Some(200));
    assert_eq!(value.into_value(), user("ana"));

    wait_for_file(&cache.path().join("user-42")).await;
    let reopened = DiskMemoryPersistenceStack::new(DiskMemoryConfig::new(cache.path())).unwrap();
    wait_for_persisted(&reopened, "user-42", r#"{"name":"ana"}"#).await;
}

#[rstest]
#[case::server_error(500)]
#[case::not_found(404)]
#[case::unauthorized(401)]
#[tokio::test]
async fn test_failed_request_falls_back_to_disk(#[case] status: u16) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(&server)
        .await;
    let cache = tempfile::tempdir().unwrap();
    let store = store(&server, cache.path());
    persist(store.persistence(), "user-42", r#"{"name":"cached"}"#).await;

    let value = fetch(&store, user_resource()).await.unwrap();

    assert_eq!(value, FetchValue::Persistence(user("cached")));
}

#[tokio::test]
async fn test_server_error_without_cache_is_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let cache = tempfile::tempdir().unwrap();
    let store = store(&server, cache.path());

    let error = fetch(&store, user_resource()).await.unwrap_err();

    assert!(matches!(error, alicerce::FetchError::Network(_)));
}

#[tokio::test]
async fn test_cache_hit_is_refreshed_in_background() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"fresh"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let cache = tempfile::tempdir().unwrap();
    let store = store(&server, cache.path());
    persist(store.persistence(), "user-42", r#"{"name":"cached"}"#).await;

    let resource = user_resource().with_strategy(FetchStrategy::PersistenceThenNetwork);
    let value = fetch(&store, resource).await.unwrap();

    assert_eq!(value, FetchValue::Persistence(user("cached")));
    wait_for_persisted(store.persistence(), "user-42", r#"{"name":"fresh"}"#).await;
}

#[tokio::test]
async fn test_transient_failures_are_retried_before_persisting() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"ana"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let cache = tempfile::tempdir().unwrap();
    let store = store(&server, cache.path());

    let network_resource = HttpResource::new(Endpoint::get("users/42")).with_retry_policies([
        RetryPolicy::MaxRetries(3),
        RetryPolicy::Backoff(Backoff::constant(
            Duration::from_millis(10),
            Truncation::MaxDelay(Duration::from_secs(1)),
        )),
        retry::transient_errors_only(),
    ]);
    let resource = Resource::<_, User>::json(network_resource, "user-42");
    let value = fetch(&store, resource).await.unwrap();

    assert_eq!(value.into_value(), user("ana"));
    wait_for_persisted(store.persistence(), "user-42", r#"{"name":"ana"}"#).await;
}

#[tokio::test]
async fn test_cancelled_fetch_reports_cancellation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"name":"slow"}"#)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let cache = tempfile::tempdir().unwrap();
    let store = store(&server, cache.path());

    let (tx, rx) = oneshot::channel();
    let bag = store.fetch(user_resource(), move |result| {
        let _ = tx.send(result);
    });
    bag.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("cancellation not reported")
        .unwrap();

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(persisted(store.persistence(), "user-42").await, None);
}
