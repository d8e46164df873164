use wikigraph_core::ipc::{GraphRequest, GraphResponse};
use wikigraph_core::{filter_links, GraphError, GraphStore, TopicSource};

/// Handle a request and wrap the outcome for the IPC wire format.
pub async fn handle_request(
    request: GraphRequest,
    store: &GraphStore,
    source: &dyn TopicSource,
) -> GraphResponse {
    match dispatch(request, store, source).await {
        Ok(data) => GraphResponse::ok(data),
        Err(e) => GraphResponse::err(e.to_string()),
    }
}

/// Route a request to the store, fetching from the producer where needed.
pub async fn dispatch(
    request: GraphRequest,
    store: &GraphStore,
    source: &dyn TopicSource,
) -> Result<serde_json::Value, GraphError> {
    match request {
        GraphRequest::Ping => Ok(serde_json::json!({"pong": true})),
        GraphRequest::Health => {
            let stats = store.stats().await?;
            Ok(serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "graph_key": stats.key,
                "backend": stats.backend,
                "nodes": stats.nodes,
                "links": stats.links,
                "max_nodes": stats.max_nodes,
                "last_saved": stats.last_saved,
            }))
        }
        GraphRequest::GetGraph => Ok(serde_json::to_value(store.get_graph().await)?),
        GraphRequest::AddNode { topic } => {
            let topic = require(&topic, "topic")?;
            let outcome = store.add_topic_node(topic).await?;
            let message = if outcome.created {
                "Node added successfully"
            } else {
                "Node already exists"
            };
            Ok(serde_json::json!({
                "message": message,
                "created": outcome.created,
                "nodeId": outcome.node_id,
                "graph": outcome.graph,
            }))
        }
        GraphRequest::ExpandNode { topic } => {
            let topic = require(&topic, "topic")?;
            expand_from_source(store, source, topic).await
        }
        GraphRequest::MergeLinks { title, related } => {
            let title = require(&title, "title")?;
            let related = match related {
                Some(related) => related,
                None => fetch_related(source, title).await?,
            };
            let graph = store.merge_links(title, &related).await?;
            Ok(serde_json::to_value(graph)?)
        }
    }
}

fn require<'a>(value: &'a str, field: &str) -> Result<&'a str, GraphError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GraphError::InvalidInput(format!("No {} provided", field)));
    }
    Ok(trimmed)
}

/// Linked titles of `title`, with self-references, dated and namespaced pages removed.
async fn fetch_related(source: &dyn TopicSource, title: &str) -> Result<Vec<String>, GraphError> {
    let links = source.related_titles(title).await?;
    let fetched = links.len();
    let related = filter_links(title, links)?;
    tracing::info!(
        title,
        source = source.name(),
        fetched,
        kept = related.len(),
        "Fetched related titles"
    );
    Ok(related)
}

/// Expand `topic` with its related titles and summary from the producer.
/// The producer runs before the store's writer lock is taken.
async fn expand_from_source(
    store: &GraphStore,
    source: &dyn TopicSource,
    topic: &str,
) -> Result<serde_json::Value, GraphError> {
    let (related, summary) = futures::try_join!(fetch_related(source, topic), source.summary(topic))?;

    let outcome = store.expand_node(topic, &related, &summary).await?;
    Ok(serde_json::json!({
        "message": "Node expanded successfully",
        "nodeId": outcome.node_id,
        "nodeInfo": summary,
        "graph": outcome.graph,
    }))
}
