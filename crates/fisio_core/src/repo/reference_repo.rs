//! Reference material repositories.

use crate::model::entity::{new_record_id, Entity};
use crate::model::reference::{
    GlossaryTerm, Link, ProtocolFavorite, ProtocolFavoriteDraft, RecordTemplate, StudyNote,
};
use crate::repo::list_repo::{ListChange, ListRepository};
use crate::repo::RepoResult;
use chrono::Utc;

pub type ProtocolFavoriteRepository = ListRepository<ProtocolFavorite>;
pub type GlossaryRepository = ListRepository<GlossaryTerm>;
pub type LinkRepository = ListRepository<Link>;
pub type StudyNoteRepository = ListRepository<StudyNote>;
pub type RecordTemplateRepository = ListRepository<RecordTemplate>;

impl ListRepository<ProtocolFavorite> {
    pub async fn is_favorite(&self, protocol_id: &str) -> RepoResult<bool> {
        Ok(self
            .get_all()
            .await?
            .iter()
            .any(|favorite| favorite.protocol_id == protocol_id))
    }

    /// Adds the protocol to favorites, or removes it when already present.
    ///
    /// Returns the new favorite state.
    pub async fn toggle_protocol(&self, draft: ProtocolFavoriteDraft) -> RepoResult<bool> {
        let candidate = ProtocolFavorite::from_draft(new_record_id(), Utc::now(), draft);
        self.rewrite("toggle_protocol", move |favorites| {
            let before = favorites.len();
            favorites.retain(|favorite| favorite.protocol_id != candidate.protocol_id);
            if favorites.len() < before {
                return Ok(ListChange::Changed(false));
            }
            favorites.push(candidate);
            Ok(ListChange::Changed(true))
        })
        .await
    }
}

impl ListRepository<GlossaryTerm> {
    /// Exact term lookup, ignoring case and surrounding whitespace.
    pub async fn find_by_term(&self, term: &str) -> RepoResult<Option<GlossaryTerm>> {
        let wanted = term.trim().to_lowercase();
        Ok(self
            .find_all(|entry| entry.term.trim().to_lowercase() == wanted)
            .await?
            .into_iter()
            .next())
    }

    /// Substring search over term and definition.
    pub async fn search(&self, query: &str) -> RepoResult<Vec<GlossaryTerm>> {
        let needle = query.trim().to_lowercase();
        self.find_all(|entry| {
            needle.is_empty()
                || entry.term.to_lowercase().contains(&needle)
                || entry.definition.to_lowercase().contains(&needle)
        })
        .await
    }
}

impl ListRepository<Link> {
    /// Flips `is_favorite`. Returns `None` when the link is missing.
    pub async fn toggle_favorite(&self, id: &str) -> RepoResult<Option<Link>> {
        self.modify(id, |link| link.is_favorite = !link.is_favorite)
            .await
    }

    pub async fn list_favorites(&self) -> RepoResult<Vec<Link>> {
        self.find_all(|link| link.is_favorite).await
    }
}

impl ListRepository<StudyNote> {
    /// Flips `is_important`. Returns `None` when the note is missing.
    pub async fn toggle_important(&self, id: &str) -> RepoResult<Option<StudyNote>> {
        self.modify(id, |note| note.is_important = !note.is_important)
            .await
    }

    pub async fn list_by_category(&self, category: &str) -> RepoResult<Vec<StudyNote>> {
        self.find_all(|note| note.category.as_deref() == Some(category))
            .await
    }
}

impl ListRepository<RecordTemplate> {
    pub async fn list_by_category(&self, category: &str) -> RepoResult<Vec<RecordTemplate>> {
        self.find_all(|template| template.category.as_deref() == Some(category))
            .await
    }
}
