//! Embedded default record sets.

pub const GLOSSARY: &str = include_str!("data/glossary.json");
pub const LINKS: &str = include_str!("data/links.json");
pub const STUDY_NOTES: &str = include_str!("data/study_notes.json");
pub const TEMPLATES: &str = include_str!("data/templates.json");
