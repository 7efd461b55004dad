use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;
use crate::filter::{ConnectionClaim, FilterContext, FilterOutcome, RequestFilter};
use crate::rules::Policy;

/// Claims CONNECT tunnels to intercepted hosts for a forged handshake.
pub struct InterceptFilter {
    policy: Arc<Policy>,
}

impl InterceptFilter {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RequestFilter for InterceptFilter {
    fn name(&self) -> &'static str {
        "intercept"
    }

    async fn filter(
        &self,
        _ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<FilterOutcome, ProxyError> {
        if request.is_connect() && self.policy.decide(request.host()).intercept {
            return Ok(FilterOutcome::Claim(ConnectionClaim::Mitm {
                host: request.host().to_string(),
                port: request.port(),
            }));
        }
        Ok(FilterOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use url::Url;

    use super::InterceptFilter;
    use crate::envelope::ProxyRequest;
    use crate::filter::{ConnectionClaim, FilterContext, FilterOutcome, RequestFilter};
    use crate::filters::StripFilter;
    use crate::rules::{Policy, SiteRules};

    fn policy() -> Arc<Policy> {
        Arc::new(Policy {
            intercept: SiteRules::new(&["example.com"]).unwrap(),
            strip: SiteRules::new(&["raw.example.com"]).unwrap(),
            ..Policy::default()
        })
    }

    fn connect(authority: &str) -> ProxyRequest {
        ProxyRequest::new(
            "CONNECT",
            Url::parse(&format!("https://{authority}/")).unwrap(),
        )
    }

    #[tokio::test]
    async fn intercept_list_claims_for_mitm() {
        let ctx = FilterContext::new(None, None);
        let outcome = InterceptFilter::new(policy())
            .filter(&ctx, &mut connect("example.com:443"))
            .await
            .unwrap();
        assert_matches!(
            outcome,
            FilterOutcome::Claim(ConnectionClaim::Mitm { host, port: 443 }) if host == "example.com"
        );
    }

    #[tokio::test]
    async fn ipv6_literal_is_claimed_without_brackets() {
        let ctx = FilterContext::new(None, None);
        let policy = Arc::new(Policy {
            intercept_by_default: true,
            ..Policy::default()
        });
        let outcome = InterceptFilter::new(policy)
            .filter(&ctx, &mut connect("[::1]:8443"))
            .await
            .unwrap();
        assert_matches!(
            outcome,
            FilterOutcome::Claim(ConnectionClaim::Mitm { host, port: 8443 }) if host == "::1"
        );
    }

    #[tokio::test]
    async fn strip_list_claims_raw_relay() {
        let ctx = FilterContext::new(None, None);
        let policy = policy();
        let mut request = connect("raw.example.com:443");

        let outcome = StripFilter::new(Arc::clone(&policy))
            .filter(&ctx, &mut request)
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Claim(ConnectionClaim::RawRelay { .. }));

        let outcome = InterceptFilter::new(policy)
            .filter(&ctx, &mut request)
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Continue);
    }

    #[tokio::test]
    async fn plain_requests_pass() {
        let ctx = FilterContext::new(None, None);
        let mut request = ProxyRequest::new("GET", Url::parse("http://example.com/").unwrap());
        let outcome = InterceptFilter::new(policy())
            .filter(&ctx, &mut request)
            .await
            .unwrap();
        assert_matches!(outcome, FilterOutcome::Continue);
    }
}
