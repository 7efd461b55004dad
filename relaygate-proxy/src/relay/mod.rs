mod codec;
mod pool;

use std::sync::Arc;

use async_trait::async_trait;
use relaygate_net::{Dialer, Header, HttpVersion, Limits, Request, RequestLine, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use url::Url;

pub use codec::{RelayedRequest, decode_request, decode_response, encode_request, encode_response};
pub use pool::{RelayIdentity, RelayPool};

use crate::config::{RelayConfig, Timeouts};
use crate::envelope::ProxyRequest;
use crate::error::{ProxyError, TimeoutKind};
use crate::filter::{FilterContext, FilterOutcome, RequestFilter};
use crate::rules::Policy;
use crate::upstream::exchange;

const REPLAY_SAFE_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS", "TRACE", "PUT", "DELETE"];

enum AttemptError {
    /// Nothing reached the relay.
    NotSent(ProxyError),
    Sent { error: ProxyError, quota: bool },
    Fatal(ProxyError),
}

/// Delivers requests for relay sites through the identity pool instead of
/// dialing the origin.
pub struct RelayFilter {
    policy: Arc<Policy>,
    pool: Arc<RelayPool>,
    dialer: Arc<Dialer>,
    password: Option<String>,
    retryable_methods: Vec<String>,
    timeouts: Timeouts,
    limits: Limits,
}

impl RelayFilter {
    pub fn new(
        policy: Arc<Policy>,
        pool: Arc<RelayPool>,
        dialer: Arc<Dialer>,
        config: &RelayConfig,
        timeouts: Timeouts,
        limits: Limits,
    ) -> Self {
        Self {
            policy,
            pool,
            dialer,
            password: config.password.clone(),
            retryable_methods: config
                .retryable_methods
                .iter()
                .map(|method| method.to_ascii_uppercase())
                .collect(),
            timeouts,
            limits,
        }
    }

    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    fn may_replay(&self, method: &str) -> bool {
        REPLAY_SAFE_METHODS.contains(&method)
            || self.retryable_methods.iter().any(|allowed| allowed == method)
    }

    /// Tries identities in pool order until one returns a decodable reply.
    pub async fn relay(
        &self,
        ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<Response, ProxyError> {
        let order = self.pool.attempt_order();
        let attempts = order.len();
        let replayable = self.may_replay(&request.method);
        let mut last = String::from("no relay identities configured");

        for (attempt, index) in order.into_iter().enumerate() {
            let identity = &self.pool.identity(index).id;
            match self.attempt(index, request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(request_id = %ctx.id, %identity, attempt = attempt + 1, "relay failover succeeded");
                    }
                    return Ok(response);
                }
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::NotSent(error)) => {
                    tracing::warn!(request_id = %ctx.id, %identity, %error, "relay identity unreachable");
                    last = error.to_string();
                }
                Err(AttemptError::Sent { error, quota }) => {
                    tracing::warn!(request_id = %ctx.id, %identity, %error, quota, "relay identity failed");
                    if quota {
                        self.pool.rotate_past(index);
                    } else if !replayable {
                        return Err(ProxyError::NonRetryable {
                            url: request.url.to_string(),
                        });
                    }
                    last = error.to_string();
                }
            }
        }

        Err(ProxyError::RelayExhausted { attempts, last })
    }

    async fn attempt(
        &self,
        index: usize,
        request: &mut ProxyRequest,
    ) -> Result<Response, AttemptError> {
        if request.body.is_consumed() {
            return Err(AttemptError::Fatal(ProxyError::NonRetryable {
                url: request.url.to_string(),
            }));
        }
        let endpoint = &self.pool.identity(index).endpoint;
        let host = endpoint.host_str().unwrap_or_default().to_string();
        let port = endpoint.port_or_known_default().unwrap_or(443);

        if endpoint.scheme() == "https" {
            let mut stream = self
                .dialer
                .dial_tls(&host, port)
                .await
                .map_err(|err| AttemptError::NotSent(ProxyError::from_dial(err)))?;
            self.send(&mut stream, endpoint, &host, request).await
        } else {
            let mut stream = self
                .dialer
                .dial_plain(&host, port)
                .await
                .map_err(|err| AttemptError::NotSent(ProxyError::from_dial(err)))?;
            self.send(&mut stream, endpoint, &host, request).await
        }
    }

    async fn send<S>(
        &self,
        stream: &mut S,
        endpoint: &Url,
        host: &str,
        request: &mut ProxyRequest,
    ) -> Result<Response, AttemptError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let body = request.body.take_for_send().ok_or_else(|| {
            AttemptError::Fatal(ProxyError::NonRetryable {
                url: request.url.to_string(),
            })
        })?;
        let payload = encode_request(
            &request.method,
            &request.url,
            &request.headers,
            &body,
            self.password.as_deref(),
        )
        .map_err(AttemptError::Fatal)?;
        let bytes = relay_request_bytes(endpoint, payload);

        let reply = match timeout(
            self.timeouts.relay_attempt,
            exchange(stream, host, &bytes, "POST", &self.timeouts, self.limits),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(error)) => return Err(AttemptError::Sent { error, quota: false }),
            Err(_) => {
                return Err(AttemptError::Sent {
                    error: ProxyError::Timeout(TimeoutKind::ReadWrite),
                    quota: false,
                });
            }
        };

        let status = reply.line.status_code;
        if status != 200 {
            return Err(AttemptError::Sent {
                error: ProxyError::Upstream {
                    host: host.to_string(),
                    message: format!("relay answered {status} {}", reply.line.reason),
                },
                quota: status == 503,
            });
        }
        decode_response(&reply, self.limits).map_err(|error| AttemptError::Sent {
            error,
            quota: false,
        })
    }
}

fn relay_request_bytes(endpoint: &Url, payload: Vec<u8>) -> Vec<u8> {
    let target = match endpoint.query() {
        Some(query) => format!("{}?{query}", endpoint.path()),
        None => endpoint.path().to_string(),
    };
    let authority = match endpoint.port() {
        Some(port) => format!("{}:{port}", endpoint.host_str().unwrap_or_default()),
        None => endpoint.host_str().unwrap_or_default().to_string(),
    };
    relaygate_net::serialize_request(&Request {
        line: RequestLine {
            method: "POST".to_string(),
            target,
            version: HttpVersion::Http11,
        },
        headers: vec![
            Header::new("Host", authority),
            Header::new("Content-Type", "application/octet-stream"),
            Header::new("Content-Length", payload.len().to_string()),
            Header::new("Connection", "close"),
        ],
        body: payload,
    })
}

#[async_trait]
impl RequestFilter for RelayFilter {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn filter(
        &self,
        ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<FilterOutcome, ProxyError> {
        if request.is_connect()
            || self.pool.is_empty()
            || !self.policy.decide(request.host()).relay
        {
            return Ok(FilterOutcome::Continue);
        }
        self.relay(ctx, request).await.map(FilterOutcome::Respond)
    }
}
