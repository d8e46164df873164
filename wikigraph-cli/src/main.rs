//! wikigraph-cli: command-line client for the wikigraph HTTP API
//!
//! Talks to a running `wikigraph-server` over its REST surface and prints
//! either a human-readable outline of the graph or the raw JSON document.
//!
//! # Subcommands
//! - `graph [--json]`: show the current graph
//! - `add <topic> [--json]`: add a topic node
//! - `expand <topic> [--json]`: expand a topic from Wikipedia
//! - `merge <title> [related...]`: merge links (fetched from Wikipedia when none given)
//! - `status`: show server health

use std::collections::HashMap;
use std::fmt::Write as _;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "wikigraph-cli",
    version,
    about = "Command-line client for the wikigraph knowledge graph service"
)]
struct Cli {
    /// wikigraph HTTP server URL (overrides WIKIGRAPH_HTTP_URL env var)
    #[arg(long, env = "WIKIGRAPH_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the current graph
    Graph {
        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },

    /// Add a topic node (no-op when a node with that name exists)
    Add {
        topic: String,

        #[arg(long)]
        json: bool,
    },

    /// Expand a topic with its Wikipedia links and summary
    Expand {
        topic: String,

        #[arg(long)]
        json: bool,
    },

    /// Link a central title to related titles
    Merge {
        /// Central title
        title: String,

        /// Related titles; fetched from Wikipedia when omitted
        related: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show wikigraph server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeView {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LinkView {
    pub source: u64,
    pub target: u64,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GraphView {
    #[serde(default)]
    pub nodes: Vec<NodeView>,
    #[serde(default)]
    pub links: Vec<LinkView>,
}

/// Response of POST /api/add-node and POST /api/expand-node
#[derive(Debug, Deserialize)]
pub struct NodeChangeResponse {
    pub message: String,
    #[serde(rename = "nodeId")]
    pub node_id: u64,
    #[serde(default)]
    pub created: Option<bool>,
    #[serde(rename = "nodeInfo", default)]
    pub node_info: Option<String>,
    pub graph: GraphView,
}

// ============================================================================
// Rendering
// ============================================================================

/// Render a graph as an outline: one line per node followed by its outgoing links.
pub fn render_graph(graph: &GraphView) -> String {
    if graph.nodes.is_empty() {
        return "(empty graph)\n".to_string();
    }

    let names: HashMap<u64, &str> = graph.nodes.iter().map(|n| (n.id, n.name.as_str())).collect();
    let mut out = String::new();

    for node in &graph.nodes {
        let _ = write!(out, "[{}] {}", node.id, node.name);
        if let Some(kind) = &node.node_type {
            let _ = write!(out, " ({})", kind);
        }
        out.push('\n');

        for link in graph.links.iter().filter(|l| l.source == node.id) {
            let target = names.get(&link.target).copied().unwrap_or("?");
            if link.label.is_empty() {
                let _ = writeln!(out, "    -> [{}] {}", link.target, target);
            } else {
                let _ = writeln!(out, "    -{}-> [{}] {}", link.label, link.target, target);
            }
        }
    }

    let _ = writeln!(out, "{} nodes, {} links", graph.nodes.len(), graph.links.len());
    out
}

/// Request body for POST /api/merge-links; `related` is left out when empty so
/// the server fetches it.
pub fn merge_body(title: &str, related: &[String]) -> serde_json::Value {
    if related.is_empty() {
        serde_json::json!({ "title": title })
    } else {
        serde_json::json!({ "title": title, "related": related })
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request and return the JSON body, exiting on transport or HTTP failure.
fn send(request: reqwest::blocking::RequestBuilder, url: &str) -> anyhow::Result<serde_json::Value> {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("wikigraph-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body: serde_json::Value = resp.json().unwrap_or_default();
        let message = body["error"].as_str().unwrap_or("no error message");
        eprintln!("wikigraph-cli: server returned {}: {}", status, message);
        std::process::exit(1);
    }

    Ok(resp.json()?)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn do_graph(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/get-graph", server);
    let body = send(client(30)?.get(&url), &url)?;

    if json_output {
        return print_json(&body);
    }
    let graph: GraphView = serde_json::from_value(body)?;
    print!("{}", render_graph(&graph));
    Ok(())
}

fn do_node_change(server: &str, path: &str, topic: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}{}", server, path);
    // Expansion goes out to Wikipedia, allow it longer than a plain read
    let body = send(
        client(120)?.post(&url).json(&serde_json::json!({ "topic": topic })),
        &url,
    )?;

    if json_output {
        return print_json(&body);
    }
    let resp: NodeChangeResponse = serde_json::from_value(body)?;
    println!("{} (node {})", resp.message, resp.node_id);
    if let Some(info) = resp.node_info.as_deref().filter(|s| !s.is_empty()) {
        println!("\n{}\n", info);
    }
    print!("{}", render_graph(&resp.graph));
    Ok(())
}

fn do_merge(server: &str, title: &str, related: &[String], json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/merge-links", server);
    let body = send(client(120)?.post(&url).json(&merge_body(title, related)), &url)?;

    if json_output {
        return print_json(&body);
    }
    let graph: GraphView = serde_json::from_value(body)?;
    print!("{}", render_graph(&graph));
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("wikigraph server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
            println!("Document:         {}", body["graph_key"].as_str().unwrap_or("?"));
            println!("Backend:          {}", body["backend"].as_str().unwrap_or("?"));
            println!("Nodes:            {}", body["nodes"]);
            println!("Links:            {}", body["links"]);
            println!("Max nodes:        {}", body["max_nodes"]);
            println!("Last saved:       {}", body["last_saved"].as_str().unwrap_or("never"));
        }
        Ok(r) => {
            let status = r.status();
            let body: serde_json::Value = r.json().unwrap_or_default();
            eprintln!(
                "wikigraph-cli: server unhealthy (HTTP {}): {}",
                status,
                body["error"].as_str().unwrap_or("?")
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("wikigraph-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Graph { json } => do_graph(&server, json),
        Commands::Add { topic, json } => do_node_change(&server, "/api/add-node", &topic, json),
        Commands::Expand { topic, json } => do_node_change(&server, "/api/expand-node", &topic, json),
        Commands::Merge { title, related, json } => do_merge(&server, &title, &related, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("wikigraph-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
