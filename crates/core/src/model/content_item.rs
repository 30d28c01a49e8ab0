use serde::{Deserialize, Serialize};

use crate::model::ids::{ContentId, ModuleId};

//
// ─── CONTENT TYPE ──────────────────────────────────────────────────────────────
//

/// Kind of learning unit a content item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Lab,
    Game,
    #[default]
    Document,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [Self::Video, Self::Lab, Self::Game, Self::Document];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Lab => "lab",
            ContentType::Game => "game",
            ContentType::Document => "document",
        }
    }

    /// Parses a stored type string. Unknown values yield `None` rather than an
    /// error so that a catalog entry with a new type still counts toward progress.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "video" => Some(Self::Video),
            "lab" => Some(Self::Lab),
            "game" => Some(Self::Game),
            "document" => Some(Self::Document),
            _ => None,
        }
    }
}

//
// ─── CONTENT ITEM ──────────────────────────────────────────────────────────────
//

/// A single video/lab/game/document unit as supplied by the content catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub module_id: ModuleId,
    /// `None` when the catalog has no type or one this crate does not know.
    pub content_type: Option<ContentType>,
    pub section: String,
    /// Expected time to finish, in minutes.
    pub duration: u32,
    pub title: String,
    pub active: bool,
}

impl ContentItem {
    #[must_use]
    pub fn new(
        id: ContentId,
        module_id: ModuleId,
        content_type: ContentType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            module_id,
            content_type: Some(content_type),
            section: String::new(),
            duration: 0,
            title: title.into(),
            active: true,
        }
    }

    #[must_use]
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = minutes;
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Bucket used for per-type breakdowns; missing types fall back to `Document`.
    #[must_use]
    pub fn bucket(&self) -> ContentType {
        self.content_type.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(ContentType::parse(" Video "), Some(ContentType::Video));
        assert_eq!(ContentType::parse("LAB"), Some(ContentType::Lab));
        assert_eq!(ContentType::parse("quiz"), None);
    }

    #[test]
    fn untyped_item_buckets_as_document() {
        let mut item = ContentItem::new(ContentId::new(1), ModuleId::new(1), ContentType::Game, "g");
        item.content_type = None;
        assert_eq!(item.bucket(), ContentType::Document);
    }
}
