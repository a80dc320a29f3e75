use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ── Registry records ───────────────────────────────────────────────

/// A registry record as returned by the entity registry.
///
/// Only the identifying fields are typed; everything else the registry sends
/// is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_subtype: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemRecord {
    /// Display name if the record has one, otherwise its id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

// ── Lineage graph ──────────────────────────────────────────────────

/// A node in a lineage graph. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageNode {
    pub id: String,
    pub item_category: String,
    pub item_subtype: String,
    /// Lazily attached registry record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ItemRecord>,
}

/// A directed relation between two nodes. Identity is `(source, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source: String,
    pub target: String,
    /// Relation type reported by the backend (e.g. `wasDerivedFrom`).
    #[serde(rename = "type")]
    pub kind: String,
}

impl LineageEdge {
    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.target)
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

/// A set of nodes and links, as sent by the provenance API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    #[serde(default)]
    pub nodes: Vec<LineageNode>,
    #[serde(default)]
    pub links: Vec<LineageEdge>,
}

impl LineageGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&LineageNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Links whose source or target is `id`.
    pub fn links_touching<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a LineageEdge> {
        self.links.iter().filter(move |l| l.touches(id))
    }

    /// Links whose endpoints are not both present as nodes.
    pub fn dangling_links(&self) -> Vec<&LineageEdge> {
        self.links
            .iter()
            .filter(|l| !self.contains_node(&l.source) || !self.contains_node(&l.target))
            .collect()
    }
}

/// Which way to walk the lineage from a starting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageDirection {
    /// What the record was derived from.
    Upstream,
    /// What was derived from the record.
    Downstream,
}

impl LineageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

impl std::fmt::Display for LineageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ── Response envelopes ─────────────────────────────────────────────

/// Application-level status carried by every API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub success: bool,
    #[serde(default)]
    pub details: String,
}

impl StatusEnvelope {
    pub fn ok() -> Self {
        Self {
            success: true,
            details: String::new(),
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: details.into(),
        }
    }

    /// Turn a `success == false` envelope into [`ApiError::Rejected`].
    pub fn check(&self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else if self.details.is_empty() {
            Err(ApiError::Rejected("request failed without details".into()))
        } else {
            Err(ApiError::Rejected(self.details.clone()))
        }
    }
}

/// Response of one directional lineage query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageResponse {
    pub status: StatusEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<LineageGraph>,
}

impl LineageResponse {
    pub fn success(graph: LineageGraph) -> Self {
        Self {
            status: StatusEnvelope::ok(),
            record_count: Some(graph.nodes.len() as u64),
            graph: Some(graph),
        }
    }

    /// The graph fragment, or the rejection carried by the envelope.
    /// A successful response without a graph is an empty fragment.
    pub fn into_graph(self) -> Result<LineageGraph, ApiError> {
        self.status.check()?;
        Ok(self.graph.unwrap_or_default())
    }
}

// ── Jobs ───────────────────────────────────────────────────────────

/// Lifecycle status of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Dequeued,
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// `Succeeded` and `Failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Dequeued => "DEQUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One asynchronous job as reported by the job API. Identity is `session_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub status: JobStatus,
    /// Seconds since the Unix epoch.
    pub created_timestamp: i64,
    pub job_type: String,
    pub job_sub_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl JobRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_timestamp, 0)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
    /// Opaque cursor for the next page; absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_key: Option<serde_json::Value>,
}
