//! Shared wire types for the conductor workspace.
//!
//! Keep inventory entities and API payloads here so the service, its HTTP client
//! and test harnesses agree on one JSON shape.

#![warn(missing_docs)]

/// Shared API DTOs for cross-crate use.
pub mod api;
