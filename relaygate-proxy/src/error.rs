use std::fmt;

use relaygate_net::{DialError, ResolveError, Response};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Connect,
    Handshake,
    ResponseHeader,
    ReadWrite,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutKind::Connect => "connect",
            TimeoutKind::Handshake => "tls handshake",
            TimeoutKind::ResponseHeader => "response header wait",
            TimeoutKind::ReadWrite => "read/write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("connect to {host} failed: {message}")]
    Connect { host: String, message: String },
    #[error("tls handshake with {host} failed: {message}")]
    Handshake { host: String, message: String },
    #[error("certificate for {host} could not be issued: {message}")]
    CertIssue { host: String, message: String },
    #[error("all {attempts} relay identities failed, last: {last}")]
    RelayExhausted { attempts: usize, last: String },
    #[error("request body for {url} was already sent and cannot be replayed")]
    NonRetryable { url: String },
    #[error("malformed relay response: {0}")]
    Decode(String),
    #[error("upstream {host} failed: {message}")]
    Upstream { host: String, message: String },
    #[error("{0} timed out")]
    Timeout(TimeoutKind),
    #[error("client connection error: {0}")]
    ClientIo(#[source] std::io::Error),
    #[error("malformed request: {0}")]
    Parse(String),
    #[error("proxy configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Status of the response synthesized for the client, or `None` when the
    /// connection is closed without one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProxyError::Connect { .. }
            | ProxyError::Handshake { .. }
            | ProxyError::CertIssue { .. }
            | ProxyError::RelayExhausted { .. }
            | ProxyError::NonRetryable { .. }
            | ProxyError::Decode(_)
            | ProxyError::Upstream { .. } => Some(502),
            ProxyError::Timeout(_) => Some(504),
            ProxyError::Parse(_) => Some(400),
            ProxyError::Config(_) => Some(500),
            ProxyError::ClientIo(_) => None,
        }
    }

    pub fn to_response(&self) -> Option<Response> {
        let status = self.status_code()?;
        let reason = match status {
            400 => "Bad Request",
            500 => "Internal Server Error",
            504 => "Gateway Timeout",
            _ => "Bad Gateway",
        };
        let mut response = Response::new(status, reason);
        response.set_header("Content-Type", "text/plain; charset=utf-8");
        response.body = format!("{status} {reason}: {self}\n").into_bytes();
        Some(response)
    }

    pub(crate) fn from_dial(err: DialError) -> Self {
        match err {
            DialError::ConnectTimeout { .. } => ProxyError::Timeout(TimeoutKind::Connect),
            DialError::HandshakeTimeout { .. } => ProxyError::Timeout(TimeoutKind::Handshake),
            DialError::Handshake { host, message } => ProxyError::Handshake { host, message },
            DialError::Connect { host, source } => ProxyError::Connect {
                host,
                message: source.to_string(),
            },
            DialError::Resolve(err) => {
                let host = match &err {
                    ResolveError::NotFound(host) | ResolveError::Lookup { host, .. } => {
                        host.clone()
                    }
                };
                ProxyError::Connect {
                    host,
                    message: err.to_string(),
                }
            }
        }
    }
}
