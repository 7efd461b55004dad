use std::collections::HashMap;
use std::net::IpAddr;

use crate::pattern::{HostPattern, PatternError, normalize_host};

/// Address families a lookup may return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Network {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    fn accepts(self, ip: &IpAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => ip.is_ipv4(),
            Network::Tcp6 => ip.is_ipv6(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no addresses found for {0}")]
    NotFound(String),
    #[error("lookup of {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

/// DNS override table consulted before the system resolver.
///
/// Registration happens while the proxy is being assembled; afterwards the
/// table is shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct Resolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    cnames: HashMap<String, String>,
    cname_patterns: Vec<(HostPattern, String)>,
    network: Network,
}

impl Resolver {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Registers the addresses for `name`. Order is preference order.
    pub fn set_host(&mut self, name: &str, ips: impl IntoIterator<Item = IpAddr>) {
        let mut ordered: Vec<IpAddr> = Vec::new();
        for ip in ips {
            if !ordered.contains(&ip) {
                ordered.push(ip);
            }
        }
        self.hosts.insert(normalize_host(name), ordered);
    }

    /// Aliases hosts matching `pattern` to `alias`, which is resolved in
    /// place of the original name.
    pub fn set_cname(&mut self, pattern: &str, alias: &str) -> Result<(), PatternError> {
        let parsed = HostPattern::parse(pattern)?;
        let alias = normalize_host(alias);
        match parsed {
            HostPattern::Exact(host) => {
                self.cnames.insert(host, alias);
            }
            other => self.cname_patterns.push((other, alias)),
        }
        Ok(())
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn cname_count(&self) -> usize {
        self.cnames.len() + self.cname_patterns.len()
    }

    pub fn alias_of(&self, host: &str) -> Option<&str> {
        let host = normalize_host(host);
        if let Some(alias) = self.cnames.get(&host) {
            return Some(alias.as_str());
        }
        self.cname_patterns
            .iter()
            .find(|(pattern, _)| pattern.matches(&host))
            .map(|(_, alias)| alias.as_str())
    }

    /// Resolves `host` to an ordered list of addresses.
    ///
    /// Registered addresses win, then a single alias hop, then the system
    /// resolver. The alias target's own alias is never followed.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let host = normalize_host(host);
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.filtered(&host, vec![ip]);
        }
        if let Some(ips) = self.hosts.get(&host) {
            return self.filtered(&host, ips.clone());
        }
        let name = match self.alias_of(&host) {
            Some(alias) => {
                tracing::trace!(%host, %alias, "resolving through alias");
                alias.to_string()
            }
            None => host,
        };
        if let Ok(ip) = name.parse::<IpAddr>() {
            return self.filtered(&name, vec![ip]);
        }
        if let Some(ips) = self.hosts.get(&name) {
            return self.filtered(&name, ips.clone());
        }
        let ips = system_lookup(&name).await?;
        self.filtered(&name, ips)
    }

    fn filtered(&self, host: &str, ips: Vec<IpAddr>) -> Result<Vec<IpAddr>, ResolveError> {
        let ips: Vec<IpAddr> = ips
            .into_iter()
            .filter(|ip| self.network.accepts(ip))
            .collect();
        if ips.is_empty() {
            return Err(ResolveError::NotFound(host.to_string()));
        }
        Ok(ips)
    }
}

async fn system_lookup(host: &str) -> Result<Vec<IpAddr>, ResolveError> {
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| ResolveError::Lookup {
            host: host.to_string(),
            source,
        })?;
    let mut ips = Vec::new();
    for addr in addrs {
        let ip = addr.ip();
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    Ok(ips)
}
