use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// The persisted node/link document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(deserialize_with = "deserialize_id")]
    pub source: u64,
    #[serde(deserialize_with = "deserialize_id")]
    pub target: u64,
    #[serde(default)]
    pub label: String,
}

impl Node {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            node_type: None,
        }
    }
}

impl Link {
    pub fn new(source: u64, target: u64, label: impl Into<String>) -> Self {
        Self {
            source,
            target,
            label: label.into(),
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn node(&self, id: u64) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Next id to allocate: one past the largest id present, 1 for an empty graph.
    /// `None` once the largest id is `u64::MAX`.
    pub fn next_id(&self) -> Option<u64> {
        self.nodes.iter().map(|n| n.id).max().unwrap_or(0).checked_add(1)
    }

    pub fn has_link(&self, source: u64, target: u64) -> bool {
        self.links
            .iter()
            .any(|l| l.source == source && l.target == target)
    }
}

/// Documents written by older tooling may carry ids as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(u64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| de::Error::custom(format!("invalid node id '{}'", s))),
    }
}
