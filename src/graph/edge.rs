//! Directed edges between records and taxonomy nodes

use super::node::{NodeCollection, NodeId, TaxonomyNode};
use super::record::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fully-qualified edge endpoint: `<collection>/<key>`
///
/// Qualifying by collection keeps a category and a subcategory that share a
/// name distinct inside the flattened category edge collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(String);

impl VertexId {
    pub fn record(id: &RecordId) -> Self {
        Self(format!("records/{}", id))
    }

    pub fn node(collection: NodeCollection, id: &NodeId) -> Self {
        Self(format!("{}/{}", collection.as_str(), id))
    }

    pub fn of(node: &TaxonomyNode) -> Self {
        Self::node(node.collection, &node.id)
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The collection part of the identifier
    pub fn collection(&self) -> &str {
        self.0.split_once('/').map(|(c, _)| c).unwrap_or("")
    }
}

impl std::fmt::Display for VertexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Edge collections written by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeCollection {
    /// record → department
    BelongsToDepartment,
    /// record → category or subcategory (one flattened target set)
    BelongsToCategory,
    /// record → language
    BelongsToLanguage,
    /// record → topic
    BelongsToTopic,
    /// subcategory(n) → subcategory(n-1) | category
    InterCategoryRelations,
}

impl EdgeCollection {
    pub const ALL: [EdgeCollection; 5] = [
        Self::BelongsToDepartment,
        Self::BelongsToCategory,
        Self::BelongsToLanguage,
        Self::BelongsToTopic,
        Self::InterCategoryRelations,
    ];

    /// The four record-membership collections
    pub const MEMBERSHIP: [EdgeCollection; 4] = [
        Self::BelongsToDepartment,
        Self::BelongsToCategory,
        Self::BelongsToLanguage,
        Self::BelongsToTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsToDepartment => "belongsToDepartment",
            Self::BelongsToCategory => "belongsToCategory",
            Self::BelongsToLanguage => "belongsToLanguage",
            Self::BelongsToTopic => "belongsToTopic",
            Self::InterCategoryRelations => "interCategoryRelations",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for EdgeCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge. Identity within a collection is the `(from, to)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: VertexId,
    pub to: VertexId,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(from: VertexId, to: VertexId) -> Self {
        Self {
            from,
            to,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> (&VertexId, &VertexId) {
        (&self.from, &self.to)
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Edge {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_ids_are_collection_qualified() {
        let node = TaxonomyNode::new(NodeCollection::Categories, "Contracts");
        let v = VertexId::of(&node);
        assert_eq!(v.collection(), "categories");
        assert!(v.as_str().ends_with(node.id.as_str()));

        let r = VertexId::record(&RecordId::from("rec-1"));
        assert_eq!(r.as_str(), "records/rec-1");
    }

    #[test]
    fn edge_equality_ignores_timestamp() {
        let from = VertexId::from_string("records/a");
        let to = VertexId::from_string("topics/b");
        let mut e1 = Edge::new(from.clone(), to.clone());
        let e2 = Edge::new(from, to);
        e1.created_at = e1.created_at - chrono::Duration::hours(1);
        assert_eq!(e1, e2);
    }

    #[test]
    fn membership_excludes_hierarchy() {
        assert!(!EdgeCollection::MEMBERSHIP.contains(&EdgeCollection::InterCategoryRelations));
        for c in EdgeCollection::ALL {
            assert_eq!(EdgeCollection::parse(c.as_str()), Some(c));
        }
    }
}
