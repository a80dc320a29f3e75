//! Lineage graph assembly.
//!
//! [`merge`] holds the pure fragment merge, [`explorer`] the stateful
//! explorer that issues expansion queries and derives the graph from their
//! results, and [`export`] the renderers and reachability queries used by the
//! CLI.

pub mod explorer;
pub mod export;
pub mod merge;

pub use explorer::{
    Expansion, ExplorerOptions, ExplorerStatus, Highlight, HoverState, LineageExplorer,
};
pub use merge::{GraphBuilder, MergeStats, assemble};
