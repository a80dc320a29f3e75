// Interval polling of job and batch status.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::JobsSection;
use crate::error::JobError;
use crate::source::JobSource;
use crate::types::{JobRecord, JobStatus};

/// Interval between polls of a single job.
pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(2500);
/// Interval between polls of a batch.
pub const BATCH_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Settings for one watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Query through the administrator endpoints.
    pub admin_mode: bool,
    /// Keep polling after a failed fetch instead of stopping.
    pub refetch_on_error: bool,
    pub interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::job()
    }
}

impl WatchOptions {
    pub fn job() -> Self {
        Self {
            admin_mode: false,
            refetch_on_error: false,
            interval: JOB_POLL_INTERVAL,
        }
    }

    pub fn batch() -> Self {
        Self {
            interval: BATCH_POLL_INTERVAL,
            ..Self::job()
        }
    }

    pub fn job_from_config(section: &JobsSection) -> Self {
        Self {
            admin_mode: false,
            refetch_on_error: section.refetch_on_error,
            interval: section.poll_interval(),
        }
    }

    pub fn batch_from_config(section: &JobsSection) -> Self {
        Self {
            interval: section.batch_poll_interval(),
            ..Self::job_from_config(section)
        }
    }

    #[must_use]
    pub fn admin(mut self, admin_mode: bool) -> Self {
        self.admin_mode = admin_mode;
        self
    }

    #[must_use]
    pub fn refetch_on_error(mut self, refetch_on_error: bool) -> Self {
        self.refetch_on_error = refetch_on_error;
        self
    }
}

/// What a poll loop has observed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot<T> {
    /// Latest successfully fetched value. Kept across later failures.
    pub data: Option<T>,
    /// Message of the latest fetch if it failed.
    pub error: Option<String>,
    /// The loop intends to fetch again on its own.
    pub is_auto_refetching: bool,
    /// A fetch is in flight right now.
    pub is_fetching: bool,
    /// Completed fetches, successful or not.
    pub fetch_count: u64,
}

impl<T> Default for PollSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_auto_refetching: true,
            is_fetching: false,
            fetch_count: 0,
        }
    }
}

impl<T> PollSnapshot<T> {
    /// At least one fetch completed and the loop has stopped on its own.
    pub fn is_idle(&self) -> bool {
        self.fetch_count > 0 && !self.is_auto_refetching && !self.is_fetching
    }
}

/// Handle to a running poll loop. Dropping it stops the loop; a fetch still
/// in flight at that point is abandoned and its result never published.
#[derive(Debug)]
pub struct PollHandle<T> {
    rx: watch::Receiver<PollSnapshot<T>>,
    refetch: Arc<Notify>,
    task: JoinHandle<()>,
}

impl<T: Clone> PollHandle<T> {
    pub fn snapshot(&self) -> PollSnapshot<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. Returns `false` once the loop
    /// is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the loop stops polling on its own (terminal data, or an
    /// error without `refetch_on_error`).
    pub async fn wait_until_idle(&mut self) -> PollSnapshot<T> {
        if self.rx.wait_for(PollSnapshot::is_idle).await.is_err() {
            debug!("poll loop ended before going idle");
        }
        self.rx.borrow().clone()
    }

    /// Fetch again now. A stopped loop resumes polling if the new result is
    /// not terminal.
    pub fn refetch(&self) {
        self.refetch.notify_one();
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `fetch` every `options.interval` while `keep_polling` holds for the
/// latest value. `on_data` sees every successful value before it is
/// published. Fetches never overlap, so a slower response cannot overwrite
/// a newer one.
fn spawn_poll<T, F, Fut, C, H>(
    label: String,
    fetch: F,
    keep_polling: C,
    mut on_data: H,
    options: WatchOptions,
) -> PollHandle<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = crate::error::Result<T>> + Send,
    C: Fn(&T) -> bool + Send + 'static,
    H: FnMut(&T) + Send + 'static,
{
    let (tx, rx) = watch::channel(PollSnapshot::default());
    let refetch = Arc::new(Notify::new());
    let wake = Arc::clone(&refetch);

    let task = tokio::spawn(async move {
        loop {
            tx.send_modify(|s| s.is_fetching = true);
            let outcome = fetch().await;

            let keep = match &outcome {
                Ok(data) => keep_polling(data),
                Err(e) => {
                    warn!(target_id = %label, error = %e, "status fetch failed");
                    options.refetch_on_error
                }
            };
            if let Ok(data) = &outcome {
                on_data(data);
            }

            tx.send_modify(|s| {
                s.is_fetching = false;
                s.is_auto_refetching = keep;
                s.fetch_count += 1;
                match outcome {
                    Ok(data) => {
                        s.data = Some(data);
                        s.error = None;
                    }
                    Err(e) => s.error = Some(e.to_string()),
                }
            });

            if tx.is_closed() {
                break;
            }

            if keep {
                debug!(target_id = %label, interval = ?options.interval, "scheduling next poll");
                tokio::select! {
                    () = tokio::time::sleep(options.interval) => {}
                    () = wake.notified() => debug!(target_id = %label, "manual refetch"),
                }
            } else {
                let fetches = tx.borrow().fetch_count;
                info!(target_id = %label, fetches, "polling stopped");
                wake.notified().await;
                debug!(target_id = %label, "manual refetch");
            }
        }
    });

    PollHandle { rx, refetch, task }
}

/// Callback fired once when a watched job succeeds.
pub type SuccessCallback = Box<dyn FnOnce(&JobRecord) + Send>;

/// Poll one job until it reaches a terminal status.
pub fn watch_job(
    source: Arc<dyn JobSource>,
    session_id: &str,
    options: WatchOptions,
    on_success: Option<SuccessCallback>,
) -> Result<PollHandle<JobRecord>, JobError> {
    if session_id.trim().is_empty() {
        return Err(JobError::EmptyId);
    }
    let id = session_id.to_string();
    let admin_mode = options.admin_mode;
    let fetch = move || {
        let source = Arc::clone(&source);
        let id = id.clone();
        async move { source.fetch_job_status(&id, admin_mode).await }
    };

    let mut on_success = on_success;
    let on_data = move |job: &JobRecord| {
        if job.status == JobStatus::Succeeded {
            if let Some(callback) = on_success.take() {
                info!(session_id = %job.session_id, "job succeeded");
                callback(job);
            }
        }
    };

    Ok(spawn_poll(
        format!("job:{session_id}"),
        fetch,
        |job: &JobRecord| !job.is_terminal(),
        on_data,
        options,
    ))
}

/// Poll every job of a batch while any of them is not terminal.
pub fn watch_batch(
    source: Arc<dyn JobSource>,
    batch_id: &str,
    limit: u32,
    options: WatchOptions,
) -> Result<PollHandle<Vec<JobRecord>>, JobError> {
    if batch_id.trim().is_empty() {
        return Err(JobError::EmptyId);
    }
    let id = batch_id.to_string();
    let admin_mode = options.admin_mode;
    let fetch = move || {
        let source = Arc::clone(&source);
        let id = id.clone();
        async move { source.fetch_jobs_by_batch(&id, limit, admin_mode).await }
    };

    Ok(spawn_poll(
        format!("batch:{batch_id}"),
        fetch,
        |jobs: &Vec<JobRecord>| jobs.iter().any(|j| !j.is_terminal()),
        |_: &Vec<JobRecord>| {},
        options,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::{ApiError, ProvisError};
    use crate::types::JobPage;

    /// Replays one status per call; repeats the last one when exhausted.
    #[derive(Debug)]
    struct Scripted {
        statuses: Mutex<VecDeque<Result<JobStatus, String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(statuses: Vec<Result<JobStatus, String>>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn record(session_id: &str, status: JobStatus) -> JobRecord {
        JobRecord {
            session_id: session_id.to_string(),
            batch_id: None,
            status,
            created_timestamp: 0,
            job_type: "PROV_LODGE".into(),
            job_sub_type: "MODEL_RUN".into(),
            username: None,
            info: None,
            result: None,
            payload: None,
        }
    }

    #[async_trait::async_trait]
    impl JobSource for Scripted {
        async fn fetch_job_status(
            &self,
            session_id: &str,
            _admin_mode: bool,
        ) -> crate::error::Result<JobRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.statuses.lock().unwrap();
            let next = if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses.front().cloned().unwrap()
            };
            match next {
                Ok(status) => Ok(record(session_id, status)),
                Err(msg) => Err(ProvisError::Api(ApiError::Network(msg))),
            }
        }

        async fn fetch_jobs_by_batch(
            &self,
            _batch_id: &str,
            _limit: u32,
            _admin_mode: bool,
        ) -> crate::error::Result<Vec<JobRecord>> {
            Ok(Vec::new())
        }

        async fn list_jobs(
            &self,
            _pagination_key: Option<&serde_json::Value>,
            _limit: u32,
            _admin_mode: bool,
        ) -> crate::error::Result<JobPage> {
            Ok(JobPage::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_terminal_status_and_fires_callback_once() {
        let source = Scripted::new(vec![
            Ok(JobStatus::InProgress),
            Ok(JobStatus::InProgress),
            Ok(JobStatus::Succeeded),
        ]);
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let start = tokio::time::Instant::now();

        let mut handle = watch_job(
            source.clone(),
            "s1",
            WatchOptions::job(),
            Some(Box::new(move |job: &JobRecord| {
                assert_eq!(job.status, JobStatus::Succeeded);
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

        let snap = handle.wait_until_idle().await;
        assert_eq!(snap.fetch_count, 3);
        assert!(!snap.is_auto_refetching);
        assert_eq!(snap.data.unwrap().status, JobStatus::Succeeded);
        let elapsed = start.elapsed();
        assert!(elapsed >= JOB_POLL_INTERVAL * 2, "polled too fast: {elapsed:?}");
        assert!(elapsed < JOB_POLL_INTERVAL * 3, "polled too slow: {elapsed:?}");

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_stops_polling_by_default() {
        let source = Scripted::new(vec![Err("connection reset".into()), Ok(JobStatus::Pending)]);
        let mut handle = watch_job(source.clone(), "s1", WatchOptions::job(), None).unwrap();

        let snap = handle.wait_until_idle().await;
        assert_eq!(snap.error.as_deref(), Some("API error: Network error: connection reset"));
        assert!(snap.data.is_none());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_on_error_keeps_polling() {
        let source = Scripted::new(vec![
            Err("timeout".into()),
            Ok(JobStatus::InProgress),
            Ok(JobStatus::Failed),
        ]);
        let options = WatchOptions::job().refetch_on_error(true);
        let mut handle = watch_job(source.clone(), "s1", options, None).unwrap();

        let snap = handle.wait_until_idle().await;
        assert_eq!(snap.fetch_count, 3);
        assert!(snap.error.is_none());
        assert_eq!(snap.data.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refetch_resumes_after_error() {
        let source = Scripted::new(vec![
            Err("boom".into()),
            Ok(JobStatus::InProgress),
            Ok(JobStatus::Succeeded),
        ]);
        let mut handle = watch_job(source.clone(), "s1", WatchOptions::job(), None).unwrap();
        handle.wait_until_idle().await;
        assert_eq!(source.calls(), 1);

        handle.refetch();
        // Wait for the refetch to be picked up before waiting for idle again.
        while handle.snapshot().fetch_count < 2 {
            assert!(handle.changed().await);
        }
        let snap = handle.wait_until_idle().await;
        assert_eq!(source.calls(), 3);
        assert_eq!(snap.data.unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_loop() {
        let source = Scripted::new(vec![Ok(JobStatus::Pending)]);
        let mut handle = watch_job(source.clone(), "s1", WatchOptions::job(), None).unwrap();
        assert!(handle.changed().await);
        while handle.snapshot().fetch_count < 1 {
            assert!(handle.changed().await);
        }
        handle.stop();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn empty_ids_are_rejected() {
        let source = Scripted::new(vec![Ok(JobStatus::Pending)]);
        assert!(matches!(
            watch_job(source.clone(), " ", WatchOptions::job(), None),
            Err(JobError::EmptyId)
        ));
        assert!(matches!(
            watch_batch(source, "", 10, WatchOptions::batch()),
            Err(JobError::EmptyId)
        ));
    }

    #[test]
    fn options_from_config() {
        let section = JobsSection {
            poll_interval_ms: 1000,
            batch_poll_interval_ms: 3000,
            refetch_on_error: true,
            ..JobsSection::default()
        };
        let job = WatchOptions::job_from_config(&section).admin(true);
        assert_eq!(job.interval, Duration::from_secs(1));
        assert!(job.refetch_on_error);
        assert!(job.admin_mode);
        assert_eq!(
            WatchOptions::batch_from_config(&section).interval,
            Duration::from_secs(3)
        );
        assert_eq!(WatchOptions::batch().interval, BATCH_POLL_INTERVAL);
    }
}
