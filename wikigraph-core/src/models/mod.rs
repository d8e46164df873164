pub mod graph;

pub use graph::{Graph, Link, Node};
