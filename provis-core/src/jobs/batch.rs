// Grouping of job listings by batch id.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{JobRecord, JobStatus};

/// Aggregate status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Jobs sharing one batch id, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchGroup {
    pub batch_id: String,
    pub entries: Vec<JobRecord>,
    pub group_status: GroupStatus,
}

impl BatchGroup {
    fn new(batch_id: String) -> Self {
        Self {
            batch_id,
            entries: Vec::new(),
            group_status: GroupStatus::InProgress,
        }
    }

    /// Append a job and fold its status into the group status.
    /// `Failed` is never left once reached.
    fn push(&mut self, job: JobRecord) {
        let failed = job.status == JobStatus::Failed;
        self.entries.push(job);
        self.group_status = if self.group_status == GroupStatus::Failed || failed {
            GroupStatus::Failed
        } else if self
            .entries
            .iter()
            .all(|j| j.status == JobStatus::Succeeded)
        {
            GroupStatus::Succeeded
        } else {
            GroupStatus::InProgress
        };
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.entries.iter().filter(|j| j.status == status).count()
    }
}

/// One row of a grouped job listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRow {
    Standalone(JobRecord),
    Batch(BatchGroup),
}

/// Group `jobs` by batch id.
///
/// Jobs without a batch id become standalone rows in place; a batch group
/// takes the position of its first member.
pub fn group_by_batch(jobs: impl IntoIterator<Item = JobRecord>) -> Vec<JobRow> {
    let mut rows: Vec<JobRow> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for job in jobs {
        let Some(batch_id) = job.batch_id.clone() else {
            rows.push(JobRow::Standalone(job));
            continue;
        };
        let pos = *positions.entry(batch_id.clone()).or_insert_with(|| {
            rows.push(JobRow::Batch(BatchGroup::new(batch_id)));
            rows.len() - 1
        });
        if let JobRow::Batch(group) = &mut rows[pos] {
            group.push(job);
        }
    }

    rows
}
