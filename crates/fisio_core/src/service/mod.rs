//! Use-case services spanning several collections.
//!
//! # Responsibility
//! - Orchestrate multi-collection operations on top of the store handle.
//! - Keep callers decoupled from staging keys and lock ordering.

pub mod snapshot_service;
