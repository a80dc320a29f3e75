//! Asynchronous job monitoring.
//!
//! [`poller`] watches a single job or a whole batch until every job is
//! terminal; [`batch`] groups flat listings by batch id; [`list`] walks the
//! paginated job listing.

pub mod batch;
pub mod list;
pub mod poller;

pub use batch::{BatchGroup, GroupStatus, JobRow, group_by_batch};
pub use list::list_all_jobs;
pub use poller::{
    BATCH_POLL_INTERVAL, JOB_POLL_INTERVAL, PollHandle, PollSnapshot, SuccessCallback,
    WatchOptions, watch_batch, watch_job,
};
