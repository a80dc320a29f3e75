// Paginated job listing.

use tracing::debug;

use crate::source::JobSource;
use crate::types::JobRecord;

/// Fetch up to `max_pages` pages of `page_size` jobs, following the
/// pagination key until the API stops returning one.
pub async fn list_all_jobs(
    source: &dyn JobSource,
    page_size: u32,
    admin_mode: bool,
    max_pages: usize,
) -> crate::error::Result<Vec<JobRecord>> {
    let mut jobs = Vec::new();
    let mut key: Option<serde_json::Value> = None;

    for page in 0..max_pages {
        let result = source.list_jobs(key.as_ref(), page_size, admin_mode).await?;
        debug!(
            page,
            fetched = result.jobs.len(),
            more = result.pagination_key.is_some(),
            "job page"
        );
        jobs.extend(result.jobs);
        match result.pagination_key {
            Some(next) => key = Some(next),
            None => break,
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::{ApiError, ProvisError};
    use crate::types::{JobPage, JobStatus};

    /// Serves `pages` in order; each page after the first must be requested
    /// with the key handed out by the previous one.
    #[derive(Debug)]
    struct Paged {
        pages: Vec<Vec<&'static str>>,
        keys_seen: Mutex<Vec<Option<serde_json::Value>>>,
    }

    impl Paged {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                keys_seen: Mutex::new(Vec::new()),
            }
        }
    }

    fn record(session_id: &str) -> JobRecord {
        JobRecord {
            session_id: session_id.to_string(),
            batch_id: None,
            status: JobStatus::Succeeded,
            created_timestamp: 0,
            job_type: "REGISTRY".into(),
            job_sub_type: "CREATE".into(),
            username: None,
            info: None,
            result: None,
            payload: None,
        }
    }

    #[async_trait::async_trait]
    impl JobSource for Paged {
        async fn fetch_job_status(&self, _: &str, _: bool) -> crate::error::Result<JobRecord> {
            Err(ProvisError::Api(ApiError::Rejected("unused".into())))
        }

        async fn fetch_jobs_by_batch(
            &self,
            _: &str,
            _: u32,
            _: bool,
        ) -> crate::error::Result<Vec<JobRecord>> {
            Ok(Vec::new())
        }

        async fn list_jobs(
            &self,
            pagination_key: Option<&serde_json::Value>,
            limit: u32,
            _admin_mode: bool,
        ) -> crate::error::Result<JobPage> {
            let index = pagination_key
                .and_then(|k| k.get("page"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as usize;
            self.keys_seen.lock().unwrap().push(pagination_key.cloned());
            let jobs: Vec<JobRecord> = self.pages[index]
                .iter()
                .take(limit as usize)
                .map(|id| record(id))
                .collect();
            let pagination_key =
                (index + 1 < self.pages.len()).then(|| json!({ "page": index + 1 }));
            Ok(JobPage {
                jobs,
                pagination_key,
            })
        }
    }

    #[tokio::test]
    async fn follows_pagination_keys_until_exhausted() {
        let source = Paged::new(vec![vec!["s1", "s2"], vec!["s3", "s4"], vec!["s5"]]);
        let jobs = list_all_jobs(&source, 2, false, 10).await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.session_id.as_str()).collect();
        assert_eq!(ids, ["s1", "s2", "s3", "s4", "s5"]);

        let keys = source.keys_seen.lock().unwrap().clone();
        assert_eq!(
            keys,
            vec![None, Some(json!({"page": 1})), Some(json!({"page": 2}))]
        );
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let source = Paged::new(vec![vec!["s1"], vec!["s2"], vec!["s3"]]);
        let jobs = list_all_jobs(&source, 1, false, 2).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(source.keys_seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_pages_fetches_nothing() {
        let source = Paged::new(vec![vec!["s1"]]);
        assert!(list_all_jobs(&source, 5, false, 0).await.unwrap().is_empty());
        assert!(source.keys_seen.lock().unwrap().is_empty());
    }
}
