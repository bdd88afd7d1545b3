//! Cross-rig bead queries.
//!
//! [`Aggregator::list_all`] fans one list query out to every distinct beads
//! directory in the [`SourceRegistry`] and concatenates what comes back.
//! Sources are independent: a rig whose tool fails, times out, or prints
//! something other than a JSON array simply contributes nothing.
//!
//! ```text
//!                    ┌── hq/.beads ──────┐
//! list_all(filter) ──┼── rigradar/.beads ┼──▶ concat ──▶ Vec<Value>
//!                    └── gastown/.beads ─┘
//!                  (one task each, own timeout)
//! ```
//!
//! [`Aggregator::detail`] is the single-source counterpart. It routes by
//! identifier prefix and, having no redundancy to fall back on, surfaces
//! the tool's failure to the caller.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::registry::SourceRegistry;
use crate::tool::{BeadSource, ListFilter, ToolError, DEFAULT_TIMEOUT};

/// Failure of a single-bead lookup.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The caller did not supply an identifier.
    #[error("missing bead id")]
    MissingId,

    /// The owning source could not answer.
    #[error(transparent)]
    Source(#[from] ToolError),
}

/// Fans queries out across all registered sources.
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    source: Arc<dyn BeadSource>,
    source_timeout: Duration,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, source: Arc<dyn BeadSource>) -> Self {
        Self {
            registry,
            source,
            source_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound on how long any one source may take during [`list_all`](Self::list_all).
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// List beads from every source, merged into one sequence.
    ///
    /// Never fails. Each distinct location is queried exactly once, all of
    /// them concurrently, so the call takes as long as the slowest source
    /// (capped by the per-source timeout). Contributions are concatenated in
    /// location order; within a source, the tool's order is kept.
    pub async fn list_all(&self, filter: &ListFilter) -> Vec<Value> {
        let locations: Vec<PathBuf> = self.registry.locations().into_iter().collect();
        let mut tasks = JoinSet::new();

        for (index, location) in locations.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            let filter = filter.clone();
            let timeout = self.source_timeout;
            tasks.spawn(async move {
                let result = tokio::time::timeout(timeout, source.list(&location, &filter)).await;
                (index, location, result)
            });
        }

        let mut per_source: Vec<Vec<Value>> = vec![Vec::new(); locations.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, location, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!(error = %e, "bead list task failed");
                    continue;
                }
            };
            match result {
                Ok(Ok(Value::Array(beads))) => per_source[index] = beads,
                Ok(Ok(other)) => {
                    tracing::warn!(
                        location = %location.display(),
                        kind = json_kind(&other),
                        "bead list did not return an array"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(location = %location.display(), error = %e, "bead list failed");
                }
                Err(_) => {
                    tracing::warn!(
                        location = %location.display(),
                        timeout_secs = self.source_timeout.as_secs_f64(),
                        "bead list timed out"
                    );
                }
            }
        }

        per_source.into_iter().flatten().collect()
    }

    /// Fetch one bead from the source that owns its prefix.
    pub async fn detail(&self, bead_id: &str) -> Result<Value, QueryError> {
        if bead_id.is_empty() {
            return Err(QueryError::MissingId);
        }
        let location = self.registry.location_for(bead_id);
        Ok(self.source.show(location, bead_id).await?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
