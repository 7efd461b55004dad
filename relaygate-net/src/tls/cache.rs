use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};

use super::ca::LeafIssuer;
use super::types::{LeafCertificate, TlsError, TlsErrorKind};

type Slot = Arc<OnceCell<LeafCertificate>>;

/// Per-host leaf certificates. Concurrent callers for the same host share a
/// single issuance; an expired entry is replaced on the next lookup.
pub struct LeafCache {
    issuer: Arc<dyn LeafIssuer>,
    validity: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl LeafCache {
    pub fn new(issuer: Arc<dyn LeafIssuer>, validity: Duration) -> Self {
        Self {
            issuer,
            validity,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    pub async fn leaf_for(&self, host: &str) -> Result<LeafCertificate, TlsError> {
        let key = host.to_ascii_lowercase();
        let slot = {
            let mut slots = self.slots.lock().await;
            let stale = slots
                .get(&key)
                .and_then(|slot| slot.get())
                .is_some_and(LeafCertificate::is_expired);
            if stale {
                tracing::debug!(host = %key, "leaf expired, reissuing");
                slots.remove(&key);
            }
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let leaf = slot
            .get_or_try_init(|| async {
                let issuer = Arc::clone(&self.issuer);
                let validity = self.validity;
                let name = key.clone();
                let leaf = tokio::task::spawn_blocking(move || issuer.issue_leaf(&name, validity))
                    .await
                    .map_err(|err| TlsError::new(TlsErrorKind::Issuer, err.to_string()))??;
                tracing::debug!(host = %key, not_after = %leaf.not_after, "issued leaf");
                Ok::<_, TlsError>(leaf)
            })
            .await?;
        Ok(leaf.clone())
    }
}
