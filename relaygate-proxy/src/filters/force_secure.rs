use std::sync::Arc;

use async_trait::async_trait;
use relaygate_net::Response;

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;
use crate::filter::{FilterContext, FilterOutcome, RequestFilter};
use crate::rules::{Policy, SecureRewrite};

/// Steers sites toward or away from TLS: plain requests for force-secure
/// hosts get a permanent redirect, absolute `https://` requests for
/// no-force-secure hosts are rewritten to `http://`.
pub struct ForceSecureFilter {
    policy: Arc<Policy>,
}

impl ForceSecureFilter {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RequestFilter for ForceSecureFilter {
    fn name(&self) -> &'static str {
        "force-secure"
    }

    async fn filter(
        &self,
        ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<FilterOutcome, ProxyError> {
        if request.is_connect() || ctx.is_tunneled() {
            return Ok(FilterOutcome::Continue);
        }
        match (self.policy.decide(request.host()).secure, request.url.scheme()) {
            (SecureRewrite::Upgrade, "http") => {
                let mut location = request.url.clone();
                if location.port() == Some(80) {
                    let _ = location.set_port(None);
                }
                let _ = location.set_scheme("https");
                let mut response = Response::new(301, "Moved Permanently");
                response.set_header("Location", location.as_str());
                response.set_header("Content-Length", "0");
                Ok(FilterOutcome::Respond(response))
            }
            (SecureRewrite::Downgrade, "https") => {
                let mut target = request.url.clone();
                if target.port() == Some(443) {
                    let _ = target.set_port(None);
                }
                let _ = target.set_scheme("http");
                tracing::debug!(request_id = %ctx.id, from = %request.url, to = %target, "downgraded");
                request.url = target;
                Ok(FilterOutcome::Continue)
            }
            _ => Ok(FilterOutcome::Continue),
        }
    }
}
