// Incremental lineage exploration with hover and focus state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::LineageSection;
use crate::error::{LineageError, ProvisError};
use crate::schedule::ScheduledTask;
use crate::source::LineageSource;
use crate::types::{ItemRecord, LineageDirection, LineageEdge, LineageGraph};

use super::merge::GraphBuilder;

/// Explorer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorerOptions {
    /// Lineage depth requested per expansion.
    pub depth: u32,
    /// Delay between `hover_exit` and the hover target being cleared.
    pub hover_delay: Duration,
}

impl Default for ExplorerOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            hover_delay: Duration::from_millis(500),
        }
    }
}

impl From<&LineageSection> for ExplorerOptions {
    fn from(section: &LineageSection) -> Self {
        Self {
            depth: section.depth,
            hover_delay: section.hover_delay(),
        }
    }
}

/// Aggregate fetch state over the current expansion set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplorerStatus {
    pub fetching: bool,
    pub error: bool,
    /// Message of the first failed expansion, in expansion order.
    pub error_message: Option<String>,
}

/// Transient preview state for the node under the pointer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoverState {
    pub id: Option<String>,
    pub loading: bool,
    pub error: bool,
    pub details: Option<ItemRecord>,
}

/// Nodes and links to emphasise around the active node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlight {
    pub active: Option<String>,
    pub node_ids: BTreeSet<String>,
    pub links: Vec<LineageEdge>,
}

/// Both directions of one expansion, already unwrapped from their envelopes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub upstream: LineageGraph,
    pub downstream: LineageGraph,
}

#[derive(Debug, Default)]
struct QueryEntry {
    /// Sequence number of the most recently issued request for this key.
    request: u64,
    fetching: bool,
    result: Option<Result<Expansion, String>>,
}

#[derive(Debug, Default)]
struct DetailEntry {
    fetching: bool,
    result: Option<Result<ItemRecord, String>>,
}

#[derive(Debug)]
enum Event {
    Expanded {
        id: String,
        request: u64,
        outcome: Result<Expansion, String>,
    },
    Details {
        id: String,
        outcome: Result<ItemRecord, String>,
    },
    HoverExpired {
        epoch: u64,
    },
}

/// Builds one lineage graph out of repeated expansions around a root record.
///
/// Network calls run as spawned tasks; their results are queued and applied
/// only when the owner calls [`next_update`](Self::next_update),
/// [`drain`](Self::drain) or [`settle`](Self::settle). All state lives on the
/// owner's side, so no locking is involved.
///
/// Methods that start network calls or timers must run inside a Tokio
/// runtime.
pub struct LineageExplorer {
    source: Arc<dyn LineageSource>,
    options: ExplorerOptions,
    root: Option<String>,
    expansions: Vec<String>,
    queries: HashMap<String, QueryEntry>,
    details: HashMap<String, DetailEntry>,
    focus: Option<String>,
    hover: Option<String>,
    hover_clear: Option<ScheduledTask>,
    hover_epoch: u64,
    next_request: u64,
    in_flight: usize,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl std::fmt::Debug for LineageExplorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageExplorer")
            .field("root", &self.root)
            .field("expansions", &self.expansions)
            .field("focus", &self.focus)
            .field("hover", &self.hover)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl LineageExplorer {
    /// An explorer with no root and an empty expansion set.
    pub fn new(source: Arc<dyn LineageSource>, options: ExplorerOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            source,
            options,
            root: None,
            expansions: Vec::new(),
            queries: HashMap::new(),
            details: HashMap::new(),
            focus: None,
            hover: None,
            hover_clear: None,
            hover_epoch: 0,
            next_request: 0,
            in_flight: 0,
            events_tx,
            events_rx,
        }
    }

    /// An explorer rooted at `root_id`, with the root query already issued.
    pub fn with_root(
        source: Arc<dyn LineageSource>,
        root_id: &str,
        options: ExplorerOptions,
    ) -> Result<Self, LineageError> {
        let mut explorer = Self::new(source, options);
        explorer.set_root(root_id)?;
        Ok(explorer)
    }

    // ── Expansion ───────────────────────────────────────────────────

    /// Make `id` the root: the expansion set becomes `[id]` and the root
    /// query is issued.
    pub fn set_root(&mut self, id: &str) -> Result<(), LineageError> {
        if id.trim().is_empty() {
            return Err(LineageError::EmptyId);
        }
        self.root = Some(id.to_string());
        self.expansions = vec![id.to_string()];
        self.issue_query(id);
        Ok(())
    }

    /// Append `id` to the expansion set and fetch its lineage in both
    /// directions. Repeated ids are appended and fetched again.
    pub fn expand(&mut self, id: &str) -> Result<(), LineageError> {
        if id.trim().is_empty() {
            return Err(LineageError::EmptyId);
        }
        self.expansions.push(id.to_string());
        self.issue_query(id);
        Ok(())
    }

    /// Back to `[root]` with focus and hover cleared. Cached query results
    /// are kept, so a resolved root contributes immediately.
    pub fn reset(&mut self) -> Result<(), LineageError> {
        let Some(root) = &self.root else {
            return Err(LineageError::NoRoot);
        };
        self.expansions = vec![root.clone()];
        self.focus = None;
        self.clear_hover();
        Ok(())
    }

    fn issue_query(&mut self, id: &str) {
        self.next_request += 1;
        let request = self.next_request;

        let entry = self.queries.entry(id.to_string()).or_default();
        entry.request = request;
        entry.fetching = true;
        self.in_flight += 1;

        let source = Arc::clone(&self.source);
        let tx = self.events_tx.clone();
        let id = id.to_string();
        let depth = self.options.depth;
        debug!(id = %id, request, "issuing lineage expansion");
        tokio::spawn(async move {
            let outcome = fetch_expansion(source.as_ref(), &id, depth)
                .await
                .map_err(|e| e.to_string());
            // The explorer may have been dropped; nothing to deliver to then.
            let _ = tx.send(Event::Expanded {
                id,
                request,
                outcome,
            });
        });
    }

    // ── Hover & focus ───────────────────────────────────────────────

    /// Point at `id`: cancel any pending clear, show it immediately and
    /// fetch its details unless they are cached or already loading.
    pub fn hover_enter(&mut self, id: &str) {
        self.hover_clear = None;
        self.hover_epoch += 1;
        self.hover = Some(id.to_string());

        let needs_fetch = match self.details.get(id) {
            None => true,
            Some(entry) => !entry.fetching && matches!(entry.result, Some(Err(_))),
        };
        if needs_fetch {
            self.issue_details(id);
        }
    }

    /// Leave the hovered node; the target is cleared after the hover delay
    /// unless another `hover_enter` happens first.
    pub fn hover_exit(&mut self) {
        self.hover_epoch += 1;
        let epoch = self.hover_epoch;
        let tx = self.events_tx.clone();
        self.hover_clear = Some(ScheduledTask::after(self.options.hover_delay, move || {
            let _ = tx.send(Event::HoverExpired { epoch });
        }));
    }

    fn clear_hover(&mut self) {
        self.hover_clear = None;
        self.hover_epoch += 1;
        self.hover = None;
    }

    fn issue_details(&mut self, id: &str) {
        let entry = self.details.entry(id.to_string()).or_default();
        entry.fetching = true;
        self.in_flight += 1;

        let source = Arc::clone(&self.source);
        let tx = self.events_tx.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let outcome = source
                .fetch_item_details(&id)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Event::Details { id, outcome });
        });
    }

    pub fn select_focus(&mut self, id: &str) {
        self.focus = Some(id.to_string());
    }

    pub fn deselect_focus(&mut self) {
        self.focus = None;
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// True when no fetch or hover timer is outstanding.
    pub fn is_settled(&self) -> bool {
        self.in_flight == 0 && self.hover_clear.is_none()
    }

    /// Wait for the next result or timer and apply it. Returns `false`
    /// without waiting when nothing is outstanding.
    pub async fn next_update(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event that is already queued. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Pump events until nothing is outstanding.
    pub async fn settle(&mut self) {
        while self.next_update().await {}
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Expanded {
                id,
                request,
                outcome,
            } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let Some(entry) = self.queries.get_mut(&id) else {
                    return;
                };
                if entry.request != request {
                    warn!(
                        id = %id,
                        request,
                        latest = entry.request,
                        "discarding superseded lineage response"
                    );
                    return;
                }
                match &outcome {
                    Ok(expansion) => info!(
                        id = %id,
                        upstream_nodes = expansion.upstream.nodes.len(),
                        downstream_nodes = expansion.downstream.nodes.len(),
                        "lineage expansion loaded"
                    ),
                    Err(message) => warn!(id = %id, error = %message, "lineage expansion failed"),
                }
                entry.fetching = false;
                entry.result = Some(outcome);
            }
            Event::Details { id, outcome } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if let Err(message) = &outcome {
                    warn!(id = %id, error = %message, "item details fetch failed");
                }
                let entry = self.details.entry(id).or_default();
                entry.fetching = false;
                entry.result = Some(outcome);
            }
            Event::HoverExpired { epoch } => {
                if epoch == self.hover_epoch {
                    debug!(hover = ?self.hover, "hover cleared");
                    self.hover = None;
                    self.hover_clear = None;
                }
            }
        }
    }

    // ── Derived state ───────────────────────────────────────────────

    /// The merged graph of every successfully resolved expansion, in
    /// expansion order, upstream before downstream. Loaded item details are
    /// attached to nodes that arrived without them.
    pub fn graph(&self) -> LineageGraph {
        let mut builder = GraphBuilder::new();
        for id in &self.expansions {
            if let Some(Some(Ok(expansion))) = self.queries.get(id).map(|q| q.result.as_ref()) {
                builder.merge(&expansion.upstream);
                builder.merge(&expansion.downstream);
            }
        }

        let mut graph = builder.finish();
        for node in &mut graph.nodes {
            if node.details.is_none() {
                if let Some(DetailEntry {
                    result: Some(Ok(record)),
                    ..
                }) = self.details.get(&node.id)
                {
                    node.details = Some(record.clone());
                }
            }
        }
        graph
    }

    pub fn status(&self) -> ExplorerStatus {
        let mut status = ExplorerStatus::default();
        for id in &self.expansions {
            let Some(entry) = self.queries.get(id) else {
                continue;
            };
            status.fetching |= entry.fetching;
            if let Some(Err(message)) = &entry.result {
                status.error = true;
                if status.error_message.is_none() {
                    status.error_message = Some(message.clone());
                }
            }
        }
        status
    }

    pub fn hover(&self) -> HoverState {
        let Some(id) = &self.hover else {
            return HoverState::default();
        };
        let entry = self.details.get(id);
        HoverState {
            id: Some(id.clone()),
            loading: entry.is_some_and(|e| e.fetching),
            error: entry.is_some_and(|e| matches!(e.result, Some(Err(_)))),
            details: entry.and_then(|e| e.result.as_ref()?.as_ref().ok().cloned()),
        }
    }

    /// The hover preview wins over the pinned focus.
    pub fn highlight(&self) -> Highlight {
        let Some(active) = self.hover.as_ref().or(self.focus.as_ref()) else {
            return Highlight::default();
        };
        let graph = self.graph();
        let links: Vec<LineageEdge> = graph.links_touching(active).cloned().collect();
        let mut node_ids = BTreeSet::new();
        node_ids.insert(active.clone());
        for link in &links {
            node_ids.insert(link.source.clone());
            node_ids.insert(link.target.clone());
        }
        Highlight {
            active: Some(active.clone()),
            node_ids,
            links,
        }
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn expansions(&self) -> &[String] {
        &self.expansions
    }

    /// The cached result for one id, if it has resolved.
    pub fn expansion(&self, id: &str) -> Option<Result<&Expansion, &str>> {
        self.queries
            .get(id)?
            .result
            .as_ref()
            .map(|r| r.as_ref().map_err(String::as_str))
    }
}

/// Fetch both directions of one expansion concurrently. Either failing
/// fails the whole expansion.
pub async fn fetch_expansion(
    source: &dyn LineageSource,
    id: &str,
    depth: u32,
) -> Result<Expansion, ProvisError> {
    let (upstream, downstream) = tokio::try_join!(
        source.fetch_lineage(id, LineageDirection::Upstream, depth),
        source.fetch_lineage(id, LineageDirection::Downstream, depth),
    )?;
    Ok(Expansion {
        upstream: upstream.into_graph()?,
        downstream: downstream.into_graph()?,
    })
}
