use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;
use crate::filter::{ConnectionClaim, FilterContext, FilterOutcome, RequestFilter};
use crate::rules::Policy;

/// Claims CONNECT tunnels to hosts that must not be intercepted; the
/// server relays their bytes unchanged.
pub struct StripFilter {
    policy: Arc<Policy>,
}

impl StripFilter {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RequestFilter for StripFilter {
    fn name(&self) -> &'static str {
        "strip"
    }

    async fn filter(
        &self,
        _ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<FilterOutcome, ProxyError> {
        if request.is_connect() && self.policy.decide(request.host()).strip {
            return Ok(FilterOutcome::Claim(ConnectionClaim::RawRelay {
                host: request.host().to_string(),
                port: request.port(),
            }));
        }
        Ok(FilterOutcome::Continue)
    }
}
