mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use assert_matches::assert_matches;
use relaygate_net::Limits;
use relaygate_proxy::{
    Body, FilterContext, ProxyConfig, ProxyError, ProxyRequest, ProxyState, RelayFilter,
    RelayScheme,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use url::Url;

use common::{read_response, spawn_proxy, spawn_relay, test_config};

fn relay_config(port: u16, ids: &[&str]) -> ProxyConfig {
    let mut config = test_config();
    config.relay.app_ids = ids.iter().map(|id| id.to_string()).collect();
    config.relay.scheme = RelayScheme::Insecure;
    config.relay.endpoint = format!("{{scheme}}://{{id}}.relay.test:{port}/_gh/");
    config.relay.sites = vec!["blocked.example.com".to_string()];
    config.resolver.cnames = BTreeMap::from([(".relay.test".to_string(), "127.0.0.1".to_string())]);
    config
}

fn relay_filter(config: &ProxyConfig) -> RelayFilter {
    let ca = relaygate_net::generate_ca("Relay Test Root").unwrap();
    let state = ProxyState::from_config(config, Arc::new(ca)).unwrap();
    RelayFilter::new(
        Arc::clone(&state.policy),
        Arc::clone(&state.relay_pool),
        Arc::clone(&state.dialer),
        &config.relay,
        state.timeouts,
        Limits::default(),
    )
}

fn first_labels(seen: &common::Seen) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|host| host.split('.').next().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn client_sees_reply_from_second_identity_after_first_fails() {
    let (port, seen) = spawn_relay().await;
    let config = relay_config(port, &["bad", "good"]);
    let ca = relaygate_net::generate_ca("Relay Test Root").unwrap();
    let state = ProxyState::from_config(&config, Arc::new(ca)).unwrap();
    let proxy = spawn_proxy(state).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(
            b"GET http://blocked.example.com/page HTTP/1.1\r\nHost: blocked.example.com\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    let response = read_response(&mut client, "GET").await;

    assert_eq!(response.line.status_code, 200);
    assert_eq!(response.header("x-test"), Some("1"));
    assert_eq!(response.body, b"GET http://blocked.example.com/page");
    assert_eq!(first_labels(&seen), vec!["bad", "good"]);
}

#[tokio::test]
async fn every_identity_failing_is_bounded_by_pool_size() {
    let (port, seen) = spawn_relay().await;
    let config = relay_config(port, &["bad1", "bad2", "bad3"]);
    let filter = relay_filter(&config);
    let ctx = FilterContext::new(None, None);
    let mut request = ProxyRequest::new(
        "GET",
        Url::parse("http://blocked.example.com/").unwrap(),
    );

    let result = filter.relay(&ctx, &mut request).await;

    assert_matches!(result, Err(ProxyError::RelayExhausted { attempts: 3, .. }));
    assert_eq!(first_labels(&seen), vec!["bad1", "bad2", "bad3"]);
}

#[tokio::test]
async fn unreachable_identities_are_skipped_without_sending() {
    let (port, seen) = spawn_relay().await;
    let mut config = relay_config(port, &["down", "good"]);
    // Nothing listens on 127.0.0.2.
    config
        .resolver
        .hosts
        .insert("down.relay.test".to_string(), vec!["127.0.0.2".to_string()]);
    let filter = relay_filter(&config);
    let ctx = FilterContext::new(None, None);
    let mut request = ProxyRequest::new("POST", Url::parse("http://blocked.example.com/form").unwrap());
    request.body = Body::new(b"a=1".to_vec(), 1024);

    let result = filter.relay(&ctx, &mut request).await;

    let response = result.unwrap();
    assert_eq!(response.line.status_code, 200);
    assert_eq!(first_labels(&seen), vec!["good"]);
}

#[tokio::test]
async fn non_replayable_method_stops_after_first_sent_failure() {
    let (port, seen) = spawn_relay().await;
    let config = relay_config(port, &["bad", "good"]);
    let filter = relay_filter(&config);
    let ctx = FilterContext::new(None, None);
    let mut request = ProxyRequest::new("POST", Url::parse("http://blocked.example.com/submit").unwrap());
    request.body = Body::new(b"payload".to_vec(), 1024);

    let result = filter.relay(&ctx, &mut request).await;

    assert_matches!(result, Err(ProxyError::NonRetryable { .. }));
    assert_eq!(first_labels(&seen), vec!["bad"]);
}

#[tokio::test]
async fn single_use_body_is_never_sent_twice() {
    let (port, seen) = spawn_relay().await;
    let config = relay_config(port, &["bad", "good"]);
    let filter = relay_filter(&config);
    let ctx = FilterContext::new(None, None);
    let mut request = ProxyRequest::new("PUT", Url::parse("http://blocked.example.com/blob").unwrap());
    request.body = Body::new(vec![7u8; 64], 16);

    let result = filter.relay(&ctx, &mut request).await;

    assert_matches!(result, Err(ProxyError::NonRetryable { .. }));
    assert_eq!(first_labels(&seen), vec!["bad"]);
    assert!(request.body.is_consumed());
}

#[tokio::test]
async fn quota_failure_rotates_the_pool_start() {
    let (port, seen) = spawn_relay().await;
    let config = relay_config(port, &["quota", "good"]);
    let filter = relay_filter(&config);
    let ctx = FilterContext::new(None, None);

    let mut first = ProxyRequest::new("GET", Url::parse("http://blocked.example.com/a").unwrap());
    let response = filter.relay(&ctx, &mut first).await.unwrap();
    assert_eq!(response.header("x-test"), Some("1"));
    assert_eq!(filter.pool().attempt_order(), vec![1, 0]);

    let mut second = ProxyRequest::new("GET", Url::parse("http://blocked.example.com/b").unwrap());
    filter.relay(&ctx, &mut second).await.unwrap();
    assert_eq!(first_labels(&seen), vec!["quota", "good", "good"]);
}
