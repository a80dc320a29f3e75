use crate::types::{ItemRecord, JobPage, JobRecord, LineageDirection, LineageResponse};

/// Read access to the provenance graph and the entity registry.
///
/// The explorer reads through this trait only; tests substitute in-memory
/// implementations.
#[async_trait::async_trait]
pub trait LineageSource: Send + Sync {
    /// Fetch the lineage fragment around `id` in one direction.
    ///
    /// Application-level failures are returned inside the envelope, not as
    /// `Err`; callers use [`LineageResponse::into_graph`] to normalize them.
    async fn fetch_lineage(
        &self,
        id: &str,
        direction: LineageDirection,
        depth: u32,
    ) -> crate::error::Result<LineageResponse>;

    /// Fetch the registry record for `id`.
    async fn fetch_item_details(&self, id: &str) -> crate::error::Result<ItemRecord>;
}

/// Read access to the asynchronous job API.
///
/// `admin_mode` selects the administrator query path; it does not change
/// the shape of the results.
#[async_trait::async_trait]
pub trait JobSource: Send + Sync {
    /// Fetch the current record of one job.
    async fn fetch_job_status(
        &self,
        session_id: &str,
        admin_mode: bool,
    ) -> crate::error::Result<JobRecord>;

    /// Fetch up to `limit` jobs sharing `batch_id`.
    async fn fetch_jobs_by_batch(
        &self,
        batch_id: &str,
        limit: u32,
        admin_mode: bool,
    ) -> crate::error::Result<Vec<JobRecord>>;

    /// Fetch one page of the caller's jobs, newest first.
    async fn list_jobs(
        &self,
        pagination_key: Option<&serde_json::Value>,
        limit: u32,
        admin_mode: bool,
    ) -> crate::error::Result<JobPage>;
}
