// In-memory lineage and job sources for integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use provis_core::error::{ApiError, ProvisError};
use provis_core::source::{JobSource, LineageSource};
use provis_core::types::{
    ItemRecord, JobPage, JobRecord, JobStatus, LineageDirection, LineageEdge, LineageGraph,
    LineageNode, LineageResponse,
};

// ── Fixtures ─────────────────────────────────────────────────────

pub fn node(id: &str) -> LineageNode {
    LineageNode {
        id: id.to_string(),
        item_category: "ENTITY".to_string(),
        item_subtype: "DATASET".to_string(),
        details: None,
    }
}

pub fn link(source: &str, target: &str, kind: &str) -> LineageEdge {
    LineageEdge {
        source: source.to_string(),
        target: target.to_string(),
        kind: kind.to_string(),
    }
}

/// A fragment with the given node ids and `(source, target, type)` links.
pub fn fragment(nodes: &[&str], links: &[(&str, &str, &str)]) -> LineageGraph {
    LineageGraph {
        nodes: nodes.iter().map(|id| node(id)).collect(),
        links: links.iter().map(|(s, t, k)| link(s, t, k)).collect(),
    }
}

pub fn item(id: &str, name: &str) -> ItemRecord {
    ItemRecord {
        id: id.to_string(),
        display_name: Some(name.to_string()),
        item_category: Some("ENTITY".to_string()),
        item_subtype: Some("DATASET".to_string()),
        extra: serde_json::Map::new(),
    }
}

pub fn job(session_id: &str, batch_id: Option<&str>, status: JobStatus) -> JobRecord {
    JobRecord {
        session_id: session_id.to_string(),
        batch_id: batch_id.map(str::to_string),
        status,
        created_timestamp: 1_717_000_000,
        job_type: "REGISTRY".to_string(),
        job_sub_type: "CREATE".to_string(),
        username: Some("tester".to_string()),
        info: None,
        result: None,
        payload: None,
    }
}

// ── Lineage ──────────────────────────────────────────────────────

/// How one directional query answers.
#[derive(Debug, Clone)]
enum Reply {
    Graph(LineageGraph),
    /// `status.success == false` with these details.
    Rejected(String),
    /// Transport failure.
    Unreachable(String),
}

/// Lineage and registry source answering from fixed fragments.
///
/// Unknown ids answer with an empty fragment. Every answer for an id can be
/// delayed, which lets tests control completion order under paused time.
#[derive(Debug, Default)]
pub struct MockLineage {
    replies: HashMap<(String, LineageDirection), Reply>,
    delays: HashMap<String, Duration>,
    items: HashMap<String, ItemRecord>,
    lineage_calls: Mutex<HashMap<String, u32>>,
    detail_calls: Mutex<HashMap<String, u32>>,
}

impl MockLineage {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fragment(
        mut self,
        id: &str,
        direction: LineageDirection,
        graph: LineageGraph,
    ) -> Self {
        self.replies
            .insert((id.to_string(), direction), Reply::Graph(graph));
        self
    }

    /// Answer `id` in `direction` with an application-level failure.
    #[must_use]
    pub fn with_rejection(mut self, id: &str, direction: LineageDirection, details: &str) -> Self {
        self.replies.insert(
            (id.to_string(), direction),
            Reply::Rejected(details.to_string()),
        );
        self
    }

    /// Fail `id` in `direction` at the transport level.
    #[must_use]
    pub fn with_network_error(
        mut self,
        id: &str,
        direction: LineageDirection,
        message: &str,
    ) -> Self {
        self.replies.insert(
            (id.to_string(), direction),
            Reply::Unreachable(message.to_string()),
        );
        self
    }

    #[must_use]
    pub fn with_delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    #[must_use]
    pub fn with_item(mut self, record: ItemRecord) -> Self {
        self.items.insert(record.id.clone(), record);
        self
    }

    /// Directional lineage requests made for `id` so far.
    pub fn lineage_calls(&self, id: &str) -> u32 {
        count(&self.lineage_calls, id)
    }

    /// Detail requests made for `id` so far.
    pub fn detail_calls(&self, id: &str) -> u32 {
        count(&self.detail_calls, id)
    }

    async fn pause(&self, id: &str) {
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
    }
}

fn count(calls: &Mutex<HashMap<String, u32>>, id: &str) -> u32 {
    calls.lock().unwrap().get(id).copied().unwrap_or(0)
}

fn bump(calls: &Mutex<HashMap<String, u32>>, id: &str) {
    *calls.lock().unwrap().entry(id.to_string()).or_default() += 1;
}

#[async_trait::async_trait]
impl LineageSource for MockLineage {
    async fn fetch_lineage(
        &self,
        id: &str,
        direction: LineageDirection,
        _depth: u32,
    ) -> provis_core::error::Result<LineageResponse> {
        bump(&self.lineage_calls, id);
        self.pause(id).await;
        match self.replies.get(&(id.to_string(), direction)) {
            None => Ok(LineageResponse::success(LineageGraph::default())),
            Some(Reply::Graph(graph)) => Ok(LineageResponse::success(graph.clone())),
            Some(Reply::Rejected(details)) => Ok(LineageResponse {
                status: provis_core::types::StatusEnvelope::failed(details.clone()),
                record_count: None,
                graph: None,
            }),
            Some(Reply::Unreachable(message)) => {
                Err(ProvisError::Api(ApiError::Network(message.clone())))
            }
        }
    }

    async fn fetch_item_details(&self, id: &str) -> provis_core::error::Result<ItemRecord> {
        bump(&self.detail_calls, id);
        self.pause(id).await;
        self.items.get(id).cloned().ok_or_else(|| {
            ProvisError::Api(ApiError::Http {
                status: 404,
                body: format!("no record {id}"),
            })
        })
    }
}

// ── Jobs ─────────────────────────────────────────────────────────

/// Job source replaying scripted answers.
///
/// Each script yields one answer per call and repeats its last answer once
/// exhausted. Unscripted sessions are not found.
#[derive(Debug, Default)]
pub struct ScriptedJobs {
    sessions: Mutex<HashMap<String, VecDeque<Result<JobRecord, String>>>>,
    batches: Mutex<HashMap<String, VecDeque<Vec<JobRecord>>>>,
    pages: Vec<JobPage>,
    calls: AtomicU32,
}

impl ScriptedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the statuses `session_id` reports on successive polls.
    #[must_use]
    pub fn with_session(self, session_id: &str, statuses: &[JobStatus]) -> Self {
        let script = statuses
            .iter()
            .map(|s| Ok(job(session_id, None, *s)))
            .collect();
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), script);
        self
    }

    /// Script a session that reports `before` and then fails every later
    /// poll with a transport error.
    #[must_use]
    pub fn with_failing_session(
        self,
        session_id: &str,
        before: &[JobStatus],
        message: &str,
    ) -> Self {
        let mut script: VecDeque<_> = before
            .iter()
            .map(|s| Ok(job(session_id, None, *s)))
            .collect();
        script.push_back(Err(message.to_string()));
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), script);
        self
    }

    /// Script the member lists `batch_id` reports on successive polls.
    #[must_use]
    pub fn with_batch(self, batch_id: &str, polls: Vec<Vec<JobRecord>>) -> Self {
        self.batches
            .lock()
            .unwrap()
            .insert(batch_id.to_string(), polls.into());
        self
    }

    /// Listing pages; each links to the next by index.
    #[must_use]
    pub fn with_pages(mut self, pages: Vec<Vec<JobRecord>>) -> Self {
        let total = pages.len();
        self.pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, jobs)| JobPage {
                jobs,
                pagination_key: (i + 1 < total).then(|| serde_json::json!({ "page": i + 1 })),
            })
            .collect();
        self
    }

    /// Requests served so far, across all endpoints.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn next<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[async_trait::async_trait]
impl JobSource for ScriptedJobs {
    async fn fetch_job_status(
        &self,
        session_id: &str,
        _admin_mode: bool,
    ) -> provis_core::error::Result<JobRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .sessions
            .lock()
            .unwrap()
            .get_mut(session_id)
            .and_then(next);
        match answer {
            Some(Ok(record)) => Ok(record),
            Some(Err(message)) => Err(ProvisError::Api(ApiError::Network(message))),
            None => Err(ProvisError::Api(ApiError::Http {
                status: 404,
                body: format!("no session {session_id}"),
            })),
        }
    }

    async fn fetch_jobs_by_batch(
        &self,
        batch_id: &str,
        limit: u32,
        _admin_mode: bool,
    ) -> provis_core::error::Result<Vec<JobRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self
            .batches
            .lock()
            .unwrap()
            .get_mut(batch_id)
            .and_then(next)
            .unwrap_or_default();
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn list_jobs(
        &self,
        pagination_key: Option<&serde_json::Value>,
        _limit: u32,
        _admin_mode: bool,
    ) -> provis_core::error::Result<JobPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = pagination_key
            .and_then(|k| k.get("page"))
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let index = usize::try_from(index).unwrap_or(usize::MAX);
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}
