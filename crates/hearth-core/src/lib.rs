//! Shared domain types, error taxonomy, and startup health checks for the Hearth
//! RAG bridge — a conversation-aware retrieval pipeline for a home-automation
//! controller (`spec.md §1-3`).

pub mod error;
pub mod health;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{
    Area, AttributeMap, Cluster, ClusterMember, ClusterType, Device, Document, Entity,
    EntityState, Intent, Scope,
};
