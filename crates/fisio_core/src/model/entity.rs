//! Contract shared by every list-stored record type.
//!
//! # Responsibility
//! - Bind a record type to its collection name and canonical list key.
//! - Describe how drafts become records and how updates touch timestamps.
//!
//! # Invariants
//! - `id` is generated once and never changes for the record lifetime.
//! - The modification timestamp strictly advances on every update.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// RFC 3339 timestamp persisted on records.
pub type Timestamp = DateTime<Utc>;

/// Opaque record identifier. No ordering may be inferred from it.
pub type RecordId = String;

/// Generates a fresh record id (UUID v4 text).
pub fn new_record_id() -> RecordId {
    Uuid::new_v4().to_string()
}

/// Returns `now` when it is later than `previous`, otherwise `previous`
/// plus one millisecond.
pub fn advance_timestamp(previous: Timestamp, now: Timestamp) -> Timestamp {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// A record type persisted as one ordered list under one collection key.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Caller-provided fields for `add`.
    type Draft: Send + 'static;
    /// Partial fields for `update`; `None` fields must serialize as absent.
    type Patch: Serialize + Send + Sync + 'static;

    /// Collection the list lives in.
    const COLLECTION: &'static str;
    /// Canonical key holding the full list inside [`Entity::COLLECTION`].
    const LIST_KEY: &'static str;
    /// Embedded JSON array written when the collection was never populated.
    const SEED_JSON: &'static str = "[]";

    fn id(&self) -> &str;

    fn from_draft(id: RecordId, now: Timestamp, draft: Self::Draft) -> Self;

    /// Refreshes the modification timestamp after a mutation.
    fn touch(&mut self, now: Timestamp);

    /// Rejects records that cannot be persisted faithfully.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn validate_patch(_patch: &Self::Patch) -> Result<(), String> {
        Ok(())
    }
}
