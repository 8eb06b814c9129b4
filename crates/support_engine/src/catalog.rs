//! Response catalog - canned bot answers keyed by question category

use support_core::{normalize, CatalogEntry, Category, EngineConfig, KeywordSet, SessionTexts};

/// Static lookup of category to canned answer.
///
/// Entries are matched in declaration order, so the first matching entry
/// wins when a message mentions several categories.
#[derive(Debug, Clone)]
pub struct ResponseCatalog {
    entries: Vec<(KeywordSet, CatalogEntry)>,
    fallback: String,
}

impl Default for ResponseCatalog {
    fn default() -> Self {
        Self::new(support_core::default_catalog(), SessionTexts::default().fallback)
    }
}

impl ResponseCatalog {
    pub fn new(entries: Vec<CatalogEntry>, fallback: impl Into<String>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (KeywordSet::new(entry.category, entry.keywords.clone()), entry))
            .collect();
        Self {
            entries,
            fallback: fallback.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.catalog.clone(), config.texts.fallback.clone())
    }

    /// Canned answer for a category, if the catalog has one.
    pub fn lookup(&self, category: Category) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.category == category)
            .map(|(_, entry)| entry.answer.as_str())
    }

    /// First category whose keywords appear in `text`.
    pub fn match_category(&self, text: &str) -> Option<Category> {
        let normalized = normalize(text);
        self.entries
            .iter()
            .find(|(keywords, _)| keywords.matches_normalized(&normalized))
            .map(|(_, entry)| entry.category)
    }

    /// Matched category and the reply to send: the canned answer or the fallback.
    pub fn reply_for(&self, text: &str) -> (Option<Category>, &str) {
        match self.match_category(text) {
            Some(category) => (
                Some(category),
                self.lookup(category).unwrap_or(self.fallback.as_str()),
            ),
            None => (None, self.fallback.as_str()),
        }
    }

    /// Quick-reply labels for the welcome menu, in declaration order.
    pub fn menu_options(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(_, entry)| entry.label.clone())
            .collect()
    }
}
