mod config;
mod envelope;
mod error;
mod filter;
mod filters;
mod pipeline;
mod relay;
mod rules;
mod server;
mod upstream;

pub use config::{
    ListenConfig, NetworkConfig, ProxyConfig, RelayConfig, RelayScheme, ResolverConfig,
    SitesConfig, Timeouts, TimeoutsConfig, TlsMitmConfig,
};
pub use envelope::{Body, ProxyRequest};
pub use error::{ProxyError, TimeoutKind};
pub use filter::{ConnectionClaim, FilterContext, FilterOutcome, RequestFilter, ResponseFilter};
pub use filters::{
    AccessLogFilter, ForceSecureFilter, HopByHopFilter, InterceptFilter, StripFilter,
    strip_hop_by_hop,
};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use relay::{
    RelayFilter, RelayIdentity, RelayPool, RelayedRequest, decode_request, decode_response,
    encode_request, encode_response,
};
pub use rules::{Policy, SecureRewrite, SiteDecision, SiteRules};
pub use server::{ProxyServer, ProxyState};
pub use upstream::{exchange, fetch_direct, origin_request_bytes};
