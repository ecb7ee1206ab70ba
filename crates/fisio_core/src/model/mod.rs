//! Domain records persisted by the local store.
//!
//! # Responsibility
//! - Define the JSON shapes of every persisted record.
//! - Bind list-stored records to their collection through [`entity::Entity`].
//!
//! # Invariants
//! - Every record carries a unique opaque `id`.
//! - Field names are camelCase in persisted JSON.

pub mod assessment;
pub mod clinical;
pub mod entity;
pub mod reference;
