use async_trait::async_trait;
use relaygate_net::Response;

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;
use crate::filter::{FilterContext, ResponseFilter};

/// One `info` line per completed exchange.
pub struct AccessLogFilter;

#[async_trait]
impl ResponseFilter for AccessLogFilter {
    fn name(&self) -> &'static str {
        "access-log"
    }

    async fn filter(
        &self,
        ctx: &FilterContext,
        request: &ProxyRequest,
        response: &mut Response,
    ) -> Result<(), ProxyError> {
        tracing::info!(
            request_id = %ctx.id,
            peer = ?ctx.peer,
            method = %request.method,
            url = %request.url,
            status = response.line.status_code,
            bytes = response.body.len(),
            elapsed_ms = ctx.started.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(())
    }
}
