//! Classification: the per-attempt taxonomy assignment for a record
//!
//! Produced by the extraction step and consumed once by the reconciler.
//! It is never persisted itself; only its effect on the graph is.

use super::node::NodeCollection;
use serde::{Deserialize, Serialize};

/// Semantic classification of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub primary_category: Option<String>,
    #[serde(default)]
    pub sub_category1: Option<String>,
    #[serde(default)]
    pub sub_category2: Option<String>,
    #[serde(default)]
    pub sub_category3: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl Classification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_departments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.departments = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.primary_category = Some(name.into());
        self
    }

    /// Set subcategory `level` (1..=3). Other levels are ignored.
    pub fn with_subcategory(mut self, level: u8, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match level {
            1 => self.sub_category1 = name,
            2 => self.sub_category2 = name,
            3 => self.sub_category3 = name,
            _ => {}
        }
        self
    }

    pub fn with_languages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_topics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn department_names(&self) -> Vec<String> {
        normalize_names(&self.departments)
    }

    pub fn language_names(&self) -> Vec<String> {
        normalize_names(&self.languages)
    }

    pub fn topic_names(&self) -> Vec<String> {
        normalize_names(&self.topics)
    }

    /// The category chain, top-down, truncated at the first missing level.
    ///
    /// A level is only included when every level above it is present:
    /// supplying level 2 without level 1 yields just the primary category.
    pub fn category_chain(&self) -> Vec<(NodeCollection, String)> {
        let levels = [
            (NodeCollection::Categories, &self.primary_category),
            (NodeCollection::SubCategories1, &self.sub_category1),
            (NodeCollection::SubCategories2, &self.sub_category2),
            (NodeCollection::SubCategories3, &self.sub_category3),
        ];

        let mut chain = Vec::new();
        for (collection, name) in levels {
            match name.as_deref().and_then(normalize_name) {
                Some(name) => chain.push((collection, name.to_string())),
                None => break,
            }
        }
        chain
    }
}

fn normalize_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Trim, drop empties, and dedup while keeping first-seen order
fn normalize_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter().filter_map(|n| normalize_name(n)) {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_deduplicated() {
        let c = Classification::new().with_topics(["  Tax ", "Tax", "", "Audit"]);
        assert_eq!(c.topic_names(), vec!["Tax", "Audit"]);
    }

    #[test]
    fn full_chain_is_returned_in_order() {
        let c = Classification::new()
            .with_category("Legal")
            .with_subcategory(1, "Contracts")
            .with_subcategory(2, "NDA")
            .with_subcategory(3, "Mutual");
        let chain = c.category_chain();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0], (NodeCollection::Categories, "Legal".to_string()));
        assert_eq!(chain[3], (NodeCollection::SubCategories3, "Mutual".to_string()));
    }

    #[test]
    fn level_two_without_level_one_is_dropped() {
        let c = Classification::new().with_category("Legal").with_subcategory(2, "NDA");
        assert_eq!(c.category_chain(), vec![(NodeCollection::Categories, "Legal".to_string())]);
    }

    #[test]
    fn blank_primary_category_yields_empty_chain() {
        let c = Classification::new().with_category("   ").with_subcategory(1, "Contracts");
        assert!(c.category_chain().is_empty());
    }

    #[test]
    fn deserializes_wire_field_names() {
        let c: Classification = serde_json::from_str(
            r#"{"departments":["Legal"],"primaryCategory":"Legal","subCategory1":"Contracts","languages":["en"],"topics":[],"summary":"s"}"#,
        )
        .unwrap();
        assert_eq!(c.sub_category1.as_deref(), Some("Contracts"));
        assert_eq!(c.sub_category2, None);
        assert_eq!(c.language_names(), vec!["en"]);
    }
}
