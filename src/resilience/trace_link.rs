//! Trace-link persistence.
//!
//! Remembers, per command, the span that last failed unexpectedly so that a
//! later short-circuited call can link its diagnostic span to it. Entries
//! expire on their own after one open/half-open cycle.
//!
//! Every operation is best effort: cache failures are logged at debug level
//! and surface as "no link".

use std::sync::Arc;
use std::time::Duration;

use crate::domain::ports::{get_json, set_json, Cache, CacheError};
use crate::observability::tracing::TraceLink;

#[derive(Clone)]
pub struct TraceLinkStore {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl TraceLinkStore {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Store `link` under `command`. Empty links are not stored.
    pub async fn record(&self, command: &str, link: TraceLink) {
        if link.is_empty() {
            return;
        }
        if let Err(err) = set_json(self.cache.as_ref(), command, &link, self.ttl).await {
            tracing::debug!(command, error = %err, "trace link not stored");
        }
    }

    /// Link recorded for `command`, if one is still live.
    pub async fn fetch(&self, command: &str) -> Option<TraceLink> {
        match get_json::<TraceLink>(self.cache.as_ref(), command).await {
            Ok(link) => link.non_empty(),
            Err(CacheError::KeyNotFound(_)) => None,
            Err(err) => {
                tracing::debug!(command, error = %err, "trace link not readable");
                None
            }
        }
    }
}

impl std::fmt::Debug for TraceLinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLinkStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
