//! Axum HTTP surface, configuration, and process wiring for the Hearth RAG
//! bridge (`spec.md §6`). Split into a library so integration tests can drive
//! the router directly with [`tower::ServiceExt::oneshot`].

pub mod adapters;
pub mod bootstrap;
pub mod config;
pub mod dto;
pub mod error;
pub mod meta_task;
pub mod routes;
pub mod state;
