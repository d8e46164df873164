//! Incremental graph-merge engine
//!
//! Pure, synchronous transformations over an in-memory [`Graph`]:
//! - Merge = fold a central title and its related titles into the graph
//! - Add-or-get = resolve a single topic node, creating it when absent
//! - Truncate = drop every node whose id exceeds the size bound
//! - Validate = check id, reference and link-uniqueness invariants
//!
//! One policy applies everywhere: names compare trimmed and case-insensitively,
//! and new ids are `max(existing ids) + 1`.

use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::models::{Graph, Link, Node};

/// Label carried by links created through the topic-expansion flow.
pub const RELATED_LABEL: &str = "related to";

/// `type` tag given to nodes created through the topic flows.
pub const TOPIC_TYPE: &str = "topic";

/// Optional attributes attached to a node when it is created.
#[derive(Debug, Clone, Default)]
pub struct NodeAttrs {
    pub description: Option<String>,
    pub node_type: Option<String>,
}

impl NodeAttrs {
    pub fn topic(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            node_type: Some(TOPIC_TYPE.to_string()),
        }
    }
}

/// Summary of what a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub central_id: u64,
    pub nodes_added: usize,
    pub links_added: usize,
}

/// Canonical form used for every name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lookup tables built once per operation over the graph being mutated.
struct GraphIndex {
    names: HashMap<String, u64>,
    links: HashSet<(u64, u64)>,
    next_id: Option<u64>,
}

impl GraphIndex {
    fn build(graph: &Graph) -> Self {
        let mut names = HashMap::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            names.entry(normalize_name(&node.name)).or_insert(node.id);
        }
        let links = graph.links.iter().map(|l| (l.source, l.target)).collect();

        Self {
            names,
            links,
            next_id: graph.next_id(),
        }
    }

    /// Returns the id for `name`, appending a new node when none matches.
    fn resolve_or_insert(
        &mut self,
        graph: &mut Graph,
        name: &str,
        attrs: NodeAttrs,
    ) -> Result<(u64, bool), GraphError> {
        let key = normalize_name(name);
        if let Some(&id) = self.names.get(&key) {
            return Ok((id, false));
        }

        let id = self.next_id.ok_or_else(|| {
            GraphError::Integrity(format!("no node id left to allocate for '{}'", name.trim()))
        })?;
        self.next_id = id.checked_add(1);
        graph.nodes.push(Node {
            id,
            name: name.trim().to_string(),
            description: attrs.description,
            node_type: attrs.node_type,
        });
        self.names.insert(key, id);
        Ok((id, true))
    }

    /// Appends `source -> target` unless that directed pair is already present.
    fn link(&mut self, graph: &mut Graph, source: u64, target: u64, label: &str) -> bool {
        if !self.links.insert((source, target)) {
            return false;
        }
        graph.links.push(Link::new(source, target, label));
        true
    }
}

fn require_name<'a>(name: &'a str, what: &str) -> Result<&'a str, GraphError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GraphError::InvalidInput(format!("{} is required", what)));
    }
    Ok(trimmed)
}

/// Merge `related_titles` into `graph` as links out of `central_title`.
///
/// Existing nodes are reused and existing directed links are never duplicated,
/// so repeating a merge with the same input leaves the graph unchanged.
/// Blank related titles are skipped.
pub fn merge_central_and_related<S: AsRef<str>>(
    graph: &mut Graph,
    central_title: &str,
    related_titles: &[S],
) -> Result<MergeReport, GraphError> {
    let central_title = require_name(central_title, "central title")?;
    let mut index = GraphIndex::build(graph);
    let mut report = MergeReport::default();

    let (central_id, created) = index.resolve_or_insert(graph, central_title, NodeAttrs::default())?;
    report.central_id = central_id;
    if created {
        report.nodes_added += 1;
    }

    for title in related_titles {
        let title = title.as_ref().trim();
        if title.is_empty() {
            continue;
        }
        let (related_id, created) = index.resolve_or_insert(graph, title, NodeAttrs::default())?;
        if created {
            report.nodes_added += 1;
        }
        if index.link(graph, central_id, related_id, "") {
            report.links_added += 1;
        }
    }

    Ok(report)
}

/// Resolve `name` to a node id, creating the node with `attrs` when absent.
///
/// Returns `(id, created)`. An existing node is left untouched; callers update
/// mutable fields such as `description` themselves.
pub fn add_or_get_node(
    graph: &mut Graph,
    name: &str,
    attrs: NodeAttrs,
) -> Result<(u64, bool), GraphError> {
    let name = require_name(name, "topic")?;
    let mut index = GraphIndex::build(graph);
    index.resolve_or_insert(graph, name, attrs)
}

/// Expand a topic node with its related titles.
///
/// The topic node is added or reused and its description replaced. Each related
/// title is added or reused as a topic node and linked from the topic with the
/// [`RELATED_LABEL`] label, unless that directed link already exists.
pub fn expand_topic<S: AsRef<str>>(
    graph: &mut Graph,
    topic: &str,
    related_titles: &[S],
    description: &str,
) -> Result<MergeReport, GraphError> {
    let topic = require_name(topic, "topic")?;
    let mut index = GraphIndex::build(graph);
    let mut report = MergeReport::default();

    let (topic_id, created) = index.resolve_or_insert(graph, topic, NodeAttrs::topic(description))?;
    report.central_id = topic_id;
    if created {
        report.nodes_added += 1;
    } else if let Some(node) = graph.nodes.iter_mut().find(|n| n.id == topic_id) {
        node.description = Some(description.to_string());
    }

    for title in related_titles {
        let title = title.as_ref().trim();
        if title.is_empty() {
            continue;
        }
        let attrs = NodeAttrs::topic(format!("Related to {}", topic));
        let (related_id, created) = index.resolve_or_insert(graph, title, attrs)?;
        if created {
            report.nodes_added += 1;
        }
        if index.link(graph, topic_id, related_id, RELATED_LABEL) {
            report.links_added += 1;
        }
    }

    Ok(report)
}

/// Bound the graph by id value: when it holds more than `max_nodes` nodes, keep
/// only nodes with `id <= max_nodes` and links between surviving ids.
///
/// Returns the number of nodes dropped. Dropped nodes and links are not recorded.
pub fn truncate(graph: &mut Graph, max_nodes: u64) -> usize {
    if graph.nodes.len() as u64 <= max_nodes {
        return 0;
    }

    let before = graph.nodes.len();
    graph.nodes.retain(|n| n.id <= max_nodes);
    graph
        .links
        .retain(|l| l.source <= max_nodes && l.target <= max_nodes);
    before - graph.nodes.len()
}

/// Check the document invariants: positive unique ids, links that resolve to
/// existing nodes, and at most one link per directed pair.
pub fn validate(graph: &Graph) -> Result<(), GraphError> {
    let mut ids = HashSet::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        if node.id == 0 {
            return Err(GraphError::Integrity(format!(
                "node '{}' has non-positive id 0",
                node.name
            )));
        }
        if !ids.insert(node.id) {
            return Err(GraphError::Integrity(format!("duplicate node id {}", node.id)));
        }
    }

    let mut pairs = HashSet::with_capacity(graph.links.len());
    for link in &graph.links {
        for endpoint in [link.source, link.target] {
            if !ids.contains(&endpoint) {
                return Err(GraphError::Integrity(format!(
                    "link {} -> {} references missing node {}",
                    link.source, link.target, endpoint
                )));
            }
        }
        if !pairs.insert((link.source, link.target)) {
            return Err(GraphError::Integrity(format!(
                "duplicate link {} -> {}",
                link.source, link.target
            )));
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &Graph) -> Vec<(u64, &str)> {
        graph.nodes.iter().map(|n| (n.id, n.name.as_str())).collect()
    }

    fn pairs(graph: &Graph) -> Vec<(u64, u64)> {
        graph.links.iter().map(|l| (l.source, l.target)).collect()
    }

    fn chain(count: u64) -> Graph {
        let nodes = (1..=count).map(|id| Node::new(id, format!("Article {}", id))).collect();
        let links = (1..count).map(|id| Link::new(id, id + 1, "")).collect();
        Graph { nodes, links }
    }

    // ========================================================================
    // TEST 1: Merge into an empty graph creates central, related and links
    // ========================================================================
    #[test]
    fn test_merge_into_empty_graph() {
        let mut graph = Graph::new();
        let report =
            merge_central_and_related(&mut graph, "Analytic Philosophy", &["Logic", "Metaphysics"])
                .unwrap();

        assert_eq!(
            names(&graph),
            vec![(1, "Analytic Philosophy"), (2, "Logic"), (3, "Metaphysics")]
        );
        assert_eq!(graph.links, vec![Link::new(1, 2, ""), Link::new(1, 3, "")]);
        assert_eq!(
            report,
            MergeReport {
                central_id: 1,
                nodes_added: 3,
                links_added: 2
            }
        );
    }

    // ========================================================================
    // TEST 2: Repeating a merge changes nothing
    // ========================================================================
    #[test]
    fn test_merge_is_idempotent() {
        let mut graph = Graph::new();
        let related = ["Logic", "Metaphysics"];
        merge_central_and_related(&mut graph, "Analytic Philosophy", &related).unwrap();
        let once = graph.clone();

        let report = merge_central_and_related(&mut graph, "Analytic Philosophy", &related).unwrap();

        assert_eq!(graph, once);
        assert_eq!(report.nodes_added, 0);
        assert_eq!(report.links_added, 0);
    }

    // ========================================================================
    // TEST 3: Reverse direction link coexists with the forward link
    // ========================================================================
    #[test]
    fn test_merge_adds_reverse_link_between_existing_nodes() {
        let mut graph = Graph::new();
        merge_central_and_related(&mut graph, "Analytic Philosophy", &["Logic", "Metaphysics"])
            .unwrap();

        let report = merge_central_and_related(&mut graph, "Logic", &["Analytic Philosophy"]).unwrap();

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(pairs(&graph), vec![(1, 2), (1, 3), (2, 1)]);
        assert_eq!(graph.links[2].label, "");
        assert_eq!(report.central_id, 2);
        assert_eq!(report.links_added, 1);
    }

    // ========================================================================
    // TEST 4: Name lookup is trimmed and case-insensitive
    // ========================================================================
    #[test]
    fn test_merge_matches_names_case_insensitively() {
        let mut graph = Graph::new();
        merge_central_and_related(&mut graph, "Analytic Philosophy", &["Logic"]).unwrap();

        merge_central_and_related(&mut graph, "  analytic philosophy ", &["LOGIC", "logic "]).unwrap();

        assert_eq!(names(&graph), vec![(1, "Analytic Philosophy"), (2, "Logic")]);
        assert_eq!(pairs(&graph), vec![(1, 2)]);
    }

    // ========================================================================
    // TEST 5: Ids continue from the max id, not the node count
    // ========================================================================
    #[test]
    fn test_merge_allocates_after_max_id() {
        let mut graph = Graph {
            nodes: vec![Node::new(4, "Plato"), Node::new(9, "Aristotle")],
            links: vec![],
        };

        merge_central_and_related(&mut graph, "Plato", &["Socrates"]).unwrap();

        assert_eq!(graph.nodes.last().unwrap().id, 10);
        assert_eq!(pairs(&graph), vec![(4, 10)]);
    }

    // ========================================================================
    // TEST 6: Blank titles are skipped, blank central is rejected
    // ========================================================================
    #[test]
    fn test_merge_blank_titles() {
        let mut graph = Graph::new();
        merge_central_and_related(&mut graph, "Ethics", &["", "   ", "Virtue"]).unwrap();
        assert_eq!(names(&graph), vec![(1, "Ethics"), (2, "Virtue")]);

        let before = graph.clone();
        let err = merge_central_and_related(&mut graph, "  ", &["Virtue"]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput(_)));
        assert_eq!(graph, before, "rejected merge must not mutate");
    }

    // ========================================================================
    // TEST 7: Duplicates within one batch collapse to one node and one link
    // ========================================================================
    #[test]
    fn test_merge_duplicate_titles_in_batch() {
        let mut graph = Graph::new();
        merge_central_and_related(&mut graph, "Ethics", &["Virtue", "Virtue", "virtue"]).unwrap();

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(pairs(&graph), vec![(1, 2)]);
    }

    // ========================================================================
    // TEST 8: Truncation keeps ids <= bound and drops touching links
    // ========================================================================
    #[test]
    fn test_truncate_sixty_to_fifty() {
        let mut graph = chain(60);
        graph.links.push(Link::new(1, 55, ""));
        graph.links.push(Link::new(58, 2, ""));

        let dropped = truncate(&mut graph, 50);

        assert_eq!(dropped, 10);
        assert_eq!(graph.nodes.len(), 50);
        assert!(graph.nodes.iter().all(|n| n.id <= 50));
        assert!(graph.links.iter().all(|l| l.source <= 50 && l.target <= 50));
        assert_eq!(graph.links.len(), 49);
        validate(&graph).unwrap();
    }

    // ========================================================================
    // TEST 9: Truncation bounds by id value, not insertion order
    // ========================================================================
    #[test]
    fn test_truncate_uses_id_value() {
        let mut graph = Graph {
            nodes: vec![
                Node::new(7, "Late"),
                Node::new(1, "Early"),
                Node::new(3, "Middle"),
            ],
            links: vec![Link::new(7, 1, ""), Link::new(1, 3, "")],
        };

        truncate(&mut graph, 2);

        assert_eq!(names(&graph), vec![(1, "Early")]);
        assert!(graph.links.is_empty());
    }

    // ========================================================================
    // TEST 10: Graph within the bound is untouched
    // ========================================================================
    #[test]
    fn test_truncate_noop_within_bound() {
        let mut graph = Graph {
            nodes: vec![Node::new(70, "High id"), Node::new(1, "Low id")],
            links: vec![Link::new(70, 1, "")],
        };
        let before = graph.clone();

        assert_eq!(truncate(&mut graph, 50), 0);
        assert_eq!(graph, before);
    }

    // ========================================================================
    // TEST 11: add_or_get_node creates once, then returns the same id
    // ========================================================================
    #[test]
    fn test_add_or_get_node() {
        let mut graph = Graph::new();
        let (id, created) = add_or_get_node(&mut graph, "Ethics", NodeAttrs::topic("Topic: Ethics")).unwrap();
        assert_eq!((id, created), (1, true));
        assert_eq!(graph.nodes[0].node_type.as_deref(), Some(TOPIC_TYPE));
        assert_eq!(graph.nodes[0].description.as_deref(), Some("Topic: Ethics"));

        let (again, created) = add_or_get_node(&mut graph, "ETHICS", NodeAttrs::topic("other")).unwrap();
        assert_eq!((again, created), (1, false));
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].description.as_deref(), Some("Topic: Ethics"));
    }

    // ========================================================================
    // TEST 12: add_or_get_node does not collide after truncation gaps
    // ========================================================================
    #[test]
    fn test_add_or_get_node_after_gap() {
        let mut graph = Graph {
            nodes: vec![Node::new(1, "A"), Node::new(5, "B")],
            links: vec![],
        };

        let (id, created) = add_or_get_node(&mut graph, "C", NodeAttrs::default()).unwrap();

        assert!(created);
        assert_eq!(id, 6, "count + 1 would have produced 3");
        validate(&graph).unwrap();
    }

    // ========================================================================
    // TEST 13: expand_topic sets description and labels links
    // ========================================================================
    #[test]
    fn test_expand_topic() {
        let mut graph = Graph::new();
        add_or_get_node(&mut graph, "Ethics", NodeAttrs::topic("Topic: Ethics")).unwrap();
        merge_central_and_related(&mut graph, "Virtue", &Vec::<String>::new()).unwrap();

        let report = expand_topic(&mut graph, "ethics", &["virtue", "Justice"], "Moral philosophy").unwrap();

        assert_eq!(report.central_id, 1);
        assert_eq!(report.nodes_added, 1);
        assert_eq!(graph.nodes[0].description.as_deref(), Some("Moral philosophy"));

        let justice = graph.nodes.iter().find(|n| n.name == "Justice").unwrap();
        assert_eq!(justice.id, 3);
        assert_eq!(justice.description.as_deref(), Some("Related to ethics"));
        assert_eq!(justice.node_type.as_deref(), Some(TOPIC_TYPE));

        assert_eq!(
            graph.links,
            vec![Link::new(1, 2, RELATED_LABEL), Link::new(1, 3, RELATED_LABEL)]
        );
    }

    // ========================================================================
    // TEST 14: expand_topic never duplicates links on repeat
    // ========================================================================
    #[test]
    fn test_expand_topic_repeat() {
        let mut graph = Graph::new();
        expand_topic(&mut graph, "Ethics", &["Virtue"], "first").unwrap();
        let report = expand_topic(&mut graph, "Ethics", &["Virtue"], "second").unwrap();

        assert_eq!(report.links_added, 0);
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.nodes[0].description.as_deref(), Some("second"));
    }

    // ========================================================================
    // TEST 15: validate reports each class of violation
    // ========================================================================
    #[test]
    fn test_validate_violations() {
        let dangling = Graph {
            nodes: vec![Node::new(1, "A")],
            links: vec![Link::new(1, 2, "")],
        };
        assert!(matches!(validate(&dangling), Err(GraphError::Integrity(_))));

        let duplicate_id = Graph {
            nodes: vec![Node::new(1, "A"), Node::new(1, "B")],
            links: vec![],
        };
        assert!(matches!(validate(&duplicate_id), Err(GraphError::Integrity(_))));

        let duplicate_link = Graph {
            nodes: vec![Node::new(1, "A"), Node::new(2, "B")],
            links: vec![Link::new(1, 2, ""), Link::new(1, 2, "again")],
        };
        assert!(matches!(validate(&duplicate_link), Err(GraphError::Integrity(_))));

        let zero_id = Graph {
            nodes: vec![Node::new(0, "Zero")],
            links: vec![],
        };
        assert!(matches!(validate(&zero_id), Err(GraphError::Integrity(_))));

        let self_link = Graph {
            nodes: vec![Node::new(3, "X")],
            links: vec![Link::new(3, 3, "")],
        };
        assert!(validate(&self_link).is_ok());
    }

    // ========================================================================
    // TEST 16: id space exhaustion is an error, not an overflow
    // ========================================================================
    #[test]
    fn test_exhausted_id_space_is_integrity_error() {
        let mut graph = Graph {
            nodes: vec![Node::new(u64::MAX, "Huge")],
            links: vec![],
        };
        validate(&graph).unwrap();

        let err = merge_central_and_related(&mut graph, "Other", &["Fresh"]).unwrap_err();
        assert!(matches!(err, GraphError::Integrity(_)));

        // Reusing existing names still works
        let report = merge_central_and_related(&mut graph, "huge", &["Huge"]).unwrap();
        assert_eq!(report.central_id, u64::MAX);
        assert_eq!(report.nodes_added, 0);

        let err = add_or_get_node(&mut graph, "New", NodeAttrs::default()).unwrap_err();
        assert!(matches!(err, GraphError::Integrity(_)));
    }

    #[test]
    fn test_last_id_below_max_is_still_allocated() {
        let mut graph = Graph {
            nodes: vec![Node::new(u64::MAX - 1, "Almost")],
            links: vec![],
        };
        let (id, created) = add_or_get_node(&mut graph, "Last", NodeAttrs::default()).unwrap();
        assert!(created);
        assert_eq!(id, u64::MAX);

        let err = add_or_get_node(&mut graph, "One more", NodeAttrs::default()).unwrap_err();
        assert!(matches!(err, GraphError::Integrity(_)));
    }
}
