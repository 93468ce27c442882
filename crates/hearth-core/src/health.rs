//! Startup health checks.
//!
//! `spec.md §3` invariant: a mismatch between the configured embedding dimension `D`
//! and the persisted vector index dimension is an unrecoverable health error at
//! startup (surfaced by `GET /health` per `spec.md §6.1`/§7).

use crate::error::{CoreError, Result};

/// Verify the process-wide embedding dimension matches the vector index's dimension.
///
/// # Errors
///
/// Returns [`CoreError::DimensionMismatch`] when the two disagree.
pub fn check_embedding_dimension(configured: usize, indexed: usize) -> Result<()> {
    if configured == indexed {
        Ok(())
    } else {
        Err(CoreError::DimensionMismatch { configured, indexed })
    }
}

/// Outcome of a single named health probe, suitable for aggregation into the
/// `/health` response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthProbe {
    /// Probe name (e.g. `"embedding_dimension"`).
    pub name: String,
    /// Whether the probe passed.
    pub healthy: bool,
    /// Human-readable detail, populated on failure.
    pub detail: Option<String>,
}

impl HealthProbe {
    /// Build a passing probe.
    #[must_use]
    pub fn ok(name: impl Into<String>) -> Self {
        Self { name: name.into(), healthy: true, detail: None }
    }

    /// Build a failing probe with a detail message.
    #[must_use]
    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { name: name.into(), healthy: false, detail: Some(detail.into()) }
    }
}
