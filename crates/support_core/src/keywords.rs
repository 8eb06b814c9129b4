use serde::{Deserialize, Serialize};

/// Question category used by the response catalog and the escalation rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Account,
    Payment,
    Order,
    Technical,
    /// Requests that always need a human (refunds, compromised accounts).
    Complex,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Account,
        Category::Payment,
        Category::Order,
        Category::Technical,
        Category::Complex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Account => "ACCOUNT",
            Category::Payment => "PAYMENT",
            Category::Order => "ORDER",
            Category::Technical => "TECHNICAL",
            Category::Complex => "COMPLEX",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase and trim text before keyword matching or repeat detection.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A group of keywords belonging to one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordSet {
    pub category: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new<I, S>(category: Category, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive substring match against already normalized text.
    pub fn matches_normalized(&self, normalized: &str) -> bool {
        if normalized.is_empty() {
            return false;
        }
        self.keywords
            .iter()
            .filter(|keyword| !keyword.trim().is_empty())
            .any(|keyword| normalized.contains(&normalize(keyword)))
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matches_normalized(&normalize(text))
    }
}
