use std::sync::Arc;

use relaygate_net::Response;

use crate::envelope::ProxyRequest;
use crate::error::ProxyError;
use crate::filter::{ConnectionClaim, FilterContext, FilterOutcome, RequestFilter, ResponseFilter};

#[derive(Debug)]
pub enum PipelineOutcome {
    /// No filter answered; the request goes to the origin.
    Forward,
    Respond(Response),
    Claim(ConnectionClaim),
}

#[derive(Default, Clone)]
pub struct Pipeline {
    request_filters: Vec<Arc<dyn RequestFilter>>,
    response_filters: Vec<Arc<dyn ResponseFilter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&mut self, filter: Arc<dyn RequestFilter>) {
        self.request_filters.push(filter);
    }

    pub fn push_response(&mut self, filter: Arc<dyn ResponseFilter>) {
        self.response_filters.push(filter);
    }

    pub fn request_filter_names(&self) -> Vec<&'static str> {
        self.request_filters.iter().map(|filter| filter.name()).collect()
    }

    pub fn response_filter_names(&self) -> Vec<&'static str> {
        self.response_filters
            .iter()
            .map(|filter| filter.name())
            .collect()
    }

    pub async fn run_request(
        &self,
        ctx: &FilterContext,
        request: &mut ProxyRequest,
    ) -> Result<PipelineOutcome, ProxyError> {
        for filter in &self.request_filters {
            match filter.filter(ctx, request).await? {
                FilterOutcome::Continue => continue,
                FilterOutcome::Respond(response) => {
                    tracing::debug!(request_id = %ctx.id, filter = filter.name(), "answered");
                    return Ok(PipelineOutcome::Respond(response));
                }
                FilterOutcome::Claim(claim) => {
                    tracing::debug!(request_id = %ctx.id, filter = filter.name(), ?claim, "claimed");
                    return Ok(PipelineOutcome::Claim(claim));
                }
            }
        }
        Ok(PipelineOutcome::Forward)
    }

    pub async fn run_response(
        &self,
        ctx: &FilterContext,
        request: &ProxyRequest,
        response: &mut Response,
    ) -> Result<(), ProxyError> {
        for filter in &self.response_filters {
            filter.filter(ctx, request, response).await?;
        }
        Ok(())
    }
}
