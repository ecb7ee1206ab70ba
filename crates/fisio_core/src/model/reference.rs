//! Reference material records: protocol favorites, glossary, links, study
//! notes and record templates.
//!
//! Study notes keep the `dateCreated`/`dateModified` field names used by
//! their persisted shape; every other record uses `createdAt`/`updatedAt`.

use super::entity::{advance_timestamp, Entity, RecordId, Timestamp};
use crate::seed::data;
use serde::{Deserialize, Serialize};

/// Bookmark of one treatment protocol from the built-in catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFavorite {
    pub id: RecordId,
    pub protocol_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolFavoriteDraft {
    pub protocol_id: String,
    pub title: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFavoritePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Entity for ProtocolFavorite {
    type Draft = ProtocolFavoriteDraft;
    type Patch = ProtocolFavoritePatch;

    const COLLECTION: &'static str = "favorites";
    const LIST_KEY: &'static str = "favorites";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: ProtocolFavoriteDraft) -> Self {
        Self {
            id,
            protocol_id: draft.protocol_id,
            title: draft.title,
            category: draft.category,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryTerm {
    pub id: RecordId,
    pub term: String,
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlossaryTermDraft {
    pub term: String,
    pub definition: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryTermPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Entity for GlossaryTerm {
    type Draft = GlossaryTermDraft;
    type Patch = GlossaryTermPatch;

    const COLLECTION: &'static str = "glossary";
    const LIST_KEY: &'static str = "glossary";
    const SEED_JSON: &'static str = data::GLOSSARY;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: GlossaryTermDraft) -> Self {
        Self {
            id,
            term: draft.term,
            definition: draft.definition,
            category: draft.category,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: RecordId,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDraft {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl Entity for Link {
    type Draft = LinkDraft;
    type Patch = LinkPatch;

    const COLLECTION: &'static str = "links";
    const LIST_KEY: &'static str = "links";
    const SEED_JSON: &'static str = data::LINKS;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: LinkDraft) -> Self {
        Self {
            id,
            title: draft.title,
            url: draft.url,
            description: draft.description,
            category: draft.category,
            is_favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyNote {
    pub id: RecordId,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_important: bool,
    pub date_created: Timestamp,
    pub date_modified: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyNoteDraft {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyNotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
}

impl Entity for StudyNote {
    type Draft = StudyNoteDraft;
    type Patch = StudyNotePatch;

    const COLLECTION: &'static str = "studyNotes";
    const LIST_KEY: &'static str = "notes";
    const SEED_JSON: &'static str = data::STUDY_NOTES;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: StudyNoteDraft) -> Self {
        Self {
            id,
            title: draft.title,
            content: draft.content,
            category: draft.category,
            tags: draft.tags,
            is_important: false,
            date_created: now,
            date_modified: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.date_modified = advance_timestamp(self.date_modified, now);
    }
}

/// Reusable clinical record body (assessment forms, discharge letters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTemplate {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTemplateDraft {
    pub name: String,
    pub category: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTemplatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Entity for RecordTemplate {
    type Draft = RecordTemplateDraft;
    type Patch = RecordTemplatePatch;

    const COLLECTION: &'static str = "templates";
    const LIST_KEY: &'static str = "templates";
    const SEED_JSON: &'static str = data::TEMPLATES;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: RecordId, now: Timestamp, draft: RecordTemplateDraft) -> Self {
        Self {
            id,
            name: draft.name,
            category: draft.category,
            content: draft.content,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = advance_timestamp(self.updated_at, now);
    }
}
