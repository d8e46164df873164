pub mod config;
pub mod error;
pub mod graph;
pub mod ipc;
pub mod links;
pub mod models;
pub mod store;
pub mod wikipedia;

pub use config::WikigraphConfig;
pub use error::GraphError;
pub use graph::{
    add_or_get_node, expand_topic, merge_central_and_related, truncate, validate, MergeReport,
    NodeAttrs,
};
pub use links::{filter_links, LinkFilter};
pub use models::{Graph, Link, Node};
pub use store::{
    AddNodeOutcome, ExpandOutcome, FileBackend, GraphBackend, GraphStore, MemoryBackend,
    StoreStats,
};
pub use wikipedia::{TopicSource, WikipediaClient, WikipediaError};
