mod access_log;
mod force_secure;
mod hop_by_hop;
mod intercept;
mod strip;

pub use access_log::AccessLogFilter;
pub use force_secure::ForceSecureFilter;
pub use hop_by_hop::{HopByHopFilter, strip_hop_by_hop};
pub use intercept::InterceptFilter;
pub use strip::StripFilter;
