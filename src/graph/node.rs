//! Taxonomy node representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a taxonomy node
///
/// Serializes as a plain string. Freshly created nodes get a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a NodeId from an existing identifier
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The collection a taxonomy node lives in.
///
/// Node identity is `(collection, name)`: a name is unique within its
/// collection, but "Contracts" may exist both as a category and as a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeCollection {
    Departments,
    Categories,
    SubCategories1,
    SubCategories2,
    SubCategories3,
    Languages,
    Topics,
}

impl NodeCollection {
    pub const ALL: [NodeCollection; 7] = [
        Self::Departments,
        Self::Categories,
        Self::SubCategories1,
        Self::SubCategories2,
        Self::SubCategories3,
        Self::Languages,
        Self::Topics,
    ];

    /// Storage name of the collection
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Departments => "departments",
            Self::Categories => "categories",
            Self::SubCategories1 => "subcategories1",
            Self::SubCategories2 => "subcategories2",
            Self::SubCategories3 => "subcategories3",
            Self::Languages => "languages",
            Self::Topics => "topics",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Parent collection in the category hierarchy, if any
    pub fn hierarchy_parent(&self) -> Option<NodeCollection> {
        match self {
            Self::SubCategories1 => Some(Self::Categories),
            Self::SubCategories2 => Some(Self::SubCategories1),
            Self::SubCategories3 => Some(Self::SubCategories2),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named node in one of the taxonomy collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub id: NodeId,
    pub collection: NodeCollection,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl TaxonomyNode {
    /// Create a new node with a freshly generated identifier
    pub fn new(collection: NodeCollection, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            collection,
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    /// Set a specific identifier (pre-seeded departments, fixtures)
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }
}
