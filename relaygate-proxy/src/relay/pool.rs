use std::sync::atomic::{AtomicUsize, Ordering};

use url::Url;

use crate::config::{RelayConfig, RelayScheme};
use crate::error::ProxyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayIdentity {
    pub id: String,
    pub endpoint: Url,
}

/// Relay identities in configured order. The list never changes; a shared
/// cursor picks where the next request starts.
#[derive(Debug)]
pub struct RelayPool {
    identities: Vec<RelayIdentity>,
    scheme: RelayScheme,
    cursor: AtomicUsize,
}

impl RelayPool {
    pub fn new(ids: &[String], scheme: RelayScheme, template: &str) -> Result<Self, ProxyError> {
        let identities = ids
            .iter()
            .map(|id| {
                let raw = template
                    .replace("{scheme}", scheme.as_str())
                    .replace("{id}", id);
                Url::parse(&raw)
                    .map(|endpoint| RelayIdentity {
                        id: id.clone(),
                        endpoint,
                    })
                    .map_err(|err| ProxyError::Config(format!("relay endpoint {raw}: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            identities,
            scheme,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, ProxyError> {
        Self::new(&config.app_ids, config.scheme, &config.endpoint)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn scheme(&self) -> RelayScheme {
        self.scheme
    }

    pub fn identity(&self, index: usize) -> &RelayIdentity {
        &self.identities[index]
    }

    pub fn identities(&self) -> &[RelayIdentity] {
        &self.identities
    }

    /// Every identity exactly once, starting at the cursor and wrapping.
    pub fn attempt_order(&self) -> Vec<usize> {
        let len = self.identities.len();
        if len == 0 {
            return Vec::new();
        }
        let start = self.cursor.load(Ordering::Relaxed) % len;
        (0..len).map(|offset| (start + offset) % len).collect()
    }

    /// Moves the cursor past `index` after it ran out of quota. A cursor that
    /// another request already moved is left alone.
    pub fn rotate_past(&self, index: usize) {
        let len = self.identities.len();
        if len == 0 {
            return;
        }
        let _ = self.cursor.compare_exchange(
            index,
            (index + 1) % len,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}
