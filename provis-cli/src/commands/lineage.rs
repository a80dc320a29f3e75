use anyhow::Context;
use clap::Args;

use provis_core::config::ProvisConfig;
use provis_core::lineage::export::{self, ExportFormat};
use provis_core::lineage::{ExplorerOptions, LineageExplorer};
use provis_core::source::LineageSource;
use provis_core::types::LineageDirection;

#[derive(Args, Debug)]
pub struct LineageArgs {
    /// Record id to root the graph at
    pub root: String,

    /// Additional record ids to expand, in order (repeatable)
    #[arg(short, long = "expand", value_name = "ID")]
    pub expand: Vec<String>,

    /// Lineage depth per expansion (default: from config)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Output format: text, json, dot, mermaid
    #[arg(long, default_value = "text")]
    pub format: ExportFormat,

    /// Describe one node: its registry details, neighbours and reachability
    #[arg(long, value_name = "ID")]
    pub focus: Option<String>,
}

pub async fn run(args: LineageArgs, config: &ProvisConfig) -> anyhow::Result<()> {
    let source = super::http_source(config)?;
    let mut options = ExplorerOptions::from(&config.lineage);
    if let Some(depth) = args.depth {
        anyhow::ensure!(depth > 0, "--depth must be > 0");
        options.depth = depth;
    }

    let source: std::sync::Arc<dyn LineageSource> = source;
    let mut explorer = LineageExplorer::with_root(source, &args.root, options)
        .with_context(|| format!("Cannot explore {:?}", args.root))?;
    for id in &args.expand {
        explorer.expand(id)?;
    }
    if let Some(focus) = &args.focus {
        explorer.select_focus(focus);
        explorer.hover_enter(focus);
    }
    explorer.settle().await;

    // The root failing leaves nothing to show; other failures only drop
    // their own contribution.
    if let Some(Err(message)) = explorer.expansion(&args.root) {
        anyhow::bail!("Lineage query for {} failed: {message}", args.root);
    }
    let status = explorer.status();
    if let Some(message) = &status.error_message {
        tracing::warn!(error = %message, "some expansions failed and were left out");
        eprintln!("Warning: some expansions failed and were left out: {message}");
    }

    let graph = explorer.graph();
    let rendered = export::render(&graph, args.format).context("Cannot render graph")?;
    print!("{rendered}");

    if let Some(focus) = &args.focus {
        print_focus(&explorer, focus);
    }
    Ok(())
}

fn print_focus(explorer: &LineageExplorer, focus: &str) {
    let graph = explorer.graph();
    let highlight = explorer.highlight();
    let hover = explorer.hover();

    println!();
    println!("Focus: {focus}");
    match (&hover.details, hover.error) {
        (Some(details), _) => {
            println!("  Name:     {}", details.label());
            if let Some(category) = &details.item_category {
                println!("  Category: {category}");
            }
            if let Some(subtype) = &details.item_subtype {
                println!("  Subtype:  {subtype}");
            }
        }
        (None, true) => println!("  (registry details unavailable)"),
        (None, false) => println!("  (no registry details)"),
    }
    if !graph.contains_node(focus) {
        println!("  Not present in the assembled graph");
        return;
    }

    let (incoming, outgoing) = export::degree(&graph, focus);
    println!("  Links:    {} ({incoming} in, {outgoing} out)", highlight.links.len());
    for link in &highlight.links {
        println!("    {} --{}--> {}", link.source, link.kind, link.target);
    }
    for direction in [LineageDirection::Upstream, LineageDirection::Downstream] {
        let reachable = export::reachable(&graph, focus, direction);
        println!("  {direction:<10} {} reachable", reachable.len());
        for id in &reachable {
            println!("    {id}");
        }
    }
}
