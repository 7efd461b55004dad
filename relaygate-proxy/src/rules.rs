use relaygate_net::{HostPattern, PatternError, normalize_host};

use crate::config::ProxyConfig;
use crate::error::ProxyError;

/// An unordered set of host patterns for one policy.
#[derive(Debug, Clone, Default)]
pub struct SiteRules {
    patterns: Vec<HostPattern>,
}

impl SiteRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|raw| HostPattern::parse(raw.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.patterns.iter().any(|pattern| pattern.matches(&host))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureRewrite {
    /// Plain requests are redirected to `https://`.
    Upgrade,
    /// Absolute `https://` requests are sent as `http://`.
    Downgrade,
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteDecision {
    pub intercept: bool,
    /// CONNECT tunnels are relayed byte-for-byte.
    pub strip: bool,
    pub relay: bool,
    pub secure: SecureRewrite,
}

/// Every site rule set, built once at startup. Deny lists win over the
/// allow list of the same pair.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub force_secure: SiteRules,
    pub no_force_secure: SiteRules,
    pub intercept: SiteRules,
    pub no_intercept: SiteRules,
    pub strip: SiteRules,
    pub relay: SiteRules,
    pub direct: SiteRules,
    pub intercept_by_default: bool,
}

impl Policy {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            force_secure: site_rules(&config.sites.force_secure)?,
            no_force_secure: site_rules(&config.sites.no_force_secure)?,
            intercept: site_rules(&config.sites.intercept)?,
            no_intercept: site_rules(&config.sites.no_intercept)?,
            strip: site_rules(&config.sites.strip)?,
            relay: site_rules(&config.relay.sites)?,
            direct: site_rules(&config.relay.direct_sites)?,
            intercept_by_default: config.tls.intercept_by_default,
        })
    }

    pub fn decide(&self, host: &str) -> SiteDecision {
        let strip = self.strip.matches(host) || self.no_intercept.matches(host);
        let relay = self.relay.matches(host) && !self.direct.matches(host);
        let intercept = !strip
            && (self.intercept.matches(host) || relay || self.intercept_by_default);
        let secure = if self.no_force_secure.matches(host) {
            SecureRewrite::Downgrade
        } else if self.force_secure.matches(host) {
            SecureRewrite::Upgrade
        } else {
            SecureRewrite::Keep
        };
        SiteDecision {
            intercept,
            strip,
            relay,
            secure,
        }
    }
}

fn site_rules(list: &[String]) -> Result<SiteRules, ProxyError> {
    SiteRules::new(list).map_err(|err| ProxyError::Config(err.to_string()))
}
