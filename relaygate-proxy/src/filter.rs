use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use relaygate_net::Response;
use uuid::Uuid;

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;

/// Per-request facts every filter may consult.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub id: Uuid,
    pub peer: Option<SocketAddr>,
    pub started: Instant,
    /// `host:port` of the intercepted tunnel this request was decrypted from.
    pub tunnel: Option<String>,
}

impl FilterContext {
    pub fn new(peer: Option<SocketAddr>, tunnel: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            started: Instant::now(),
            tunnel,
        }
    }

    pub fn is_tunneled(&self) -> bool {
        self.tunnel.is_some()
    }
}

/// A CONNECT taken over by a filter; the server stops parsing HTTP on the
/// client connection and hands it to the claimed handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionClaim {
    Mitm { host: String, port: u16 },
    RawRelay { host: String, port: u16 },
}

#[derive(Debug)]
pub enum FilterOutcome {
    /// Pass the (possibly rewritten) request to the next filter.
    Continue,
    /// Terminal response; later request filters are skipped.
    Respond(Response),
    Claim(ConnectionClaim),
}

#[async_trait]
pub trait RequestFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn filter(
        &self,
        ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<FilterOutcome, ProxyError>;
}

#[async_trait]
pub trait ResponseFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn filter(
        &self,
        ctx: &FilterContext,
        request: &ProxyRequest,
        response: &mut Response,
    ) -> Result<(), ProxyError>;
}
