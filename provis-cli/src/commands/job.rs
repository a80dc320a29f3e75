use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Subcommand};

use provis_core::config::ProvisConfig;
use provis_core::jobs::{
    BatchGroup, GroupStatus, JobRow, PollHandle, PollSnapshot, SuccessCallback, WatchOptions,
    group_by_batch, list_all_jobs, watch_batch, watch_job,
};
use provis_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use provis_core::source::JobSource;
use provis_core::types::{JobRecord, JobStatus};

use super::GlobalArgs;

#[derive(Args, Debug)]
pub struct JobArgs {
    #[command(subcommand)]
    pub command: JobCommand,

    /// Query through the administrator endpoints
    #[arg(long, global = true)]
    pub admin: bool,
}

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// Poll one job until it succeeds or fails
    Watch {
        /// Session id of the job
        session_id: String,
        /// Keep polling after a failed status fetch
        #[arg(long)]
        refetch_on_error: bool,
    },
    /// Poll every job of a batch until all are finished
    Batch {
        /// Batch id shared by the jobs
        batch_id: String,
        /// Maximum number of jobs to fetch (default: from config)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List recent jobs, grouped by batch
    List {
        /// Maximum number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: usize,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(args: JobArgs, config: &ProvisConfig, global: &GlobalArgs) -> anyhow::Result<()> {
    let source: Arc<dyn JobSource> = super::http_source(config)?;
    let reporter: Box<dyn ProgressReporter> = if global.quiet {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::new())
    };

    match args.command {
        JobCommand::Watch {
            session_id,
            refetch_on_error,
        } => {
            let options = WatchOptions::job_from_config(&config.jobs)
                .admin(args.admin)
                .refetch_on_error(refetch_on_error || config.jobs.refetch_on_error);
            watch_one(source, &session_id, options, reporter.as_ref()).await
        }
        JobCommand::Batch { batch_id, limit } => {
            let limit = limit.unwrap_or(config.jobs.batch_limit);
            anyhow::ensure!(limit > 0, "--limit must be > 0");
            let options = WatchOptions::batch_from_config(&config.jobs).admin(args.admin);
            watch_group(source, &batch_id, limit, options, reporter.as_ref()).await
        }
        JobCommand::List { pages, json } => {
            let jobs = list_all_jobs(source.as_ref(), config.jobs.page_size, args.admin, pages)
                .await
                .context("Cannot list jobs")?;
            let rows = group_by_batch(jobs);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_rows(&rows);
            }
            Ok(())
        }
    }
}

async fn watch_one(
    source: Arc<dyn JobSource>,
    session_id: &str,
    options: WatchOptions,
    reporter: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    let on_success: SuccessCallback = Box::new(|job: &JobRecord| {
        tracing::info!(session_id = %job.session_id, "job succeeded");
    });
    let handle = watch_job(source, session_id, options, Some(on_success))?;

    reporter.start(&format!("job {session_id}"));
    let snapshot = follow(handle, reporter, |job: &JobRecord| job.status.to_string()).await;

    if let Some(error) = &snapshot.error {
        reporter.finish("poll failed");
        anyhow::bail!("Job {session_id} poll failed: {error}");
    }
    let Some(job) = snapshot.data else {
        anyhow::bail!("Job {session_id} poll ended without a status");
    };
    reporter.finish(job.status.as_str());

    if job.status == JobStatus::Failed {
        anyhow::bail!(
            "Job {session_id} finished with status FAILED: {}",
            job.info.as_deref().unwrap_or("no details")
        );
    }
    print_job(&job);
    if let Some(result) = &job.result {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

async fn watch_group(
    source: Arc<dyn JobSource>,
    batch_id: &str,
    limit: u32,
    options: WatchOptions,
    reporter: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    let handle = watch_batch(source, batch_id, limit, options)?;

    reporter.start(&format!("batch {batch_id}"));
    let snapshot = follow(handle, reporter, |jobs: &Vec<JobRecord>| {
        let done = jobs.iter().filter(|j| j.is_terminal()).count();
        format!("{done}/{} finished", jobs.len())
    })
    .await;

    if let Some(error) = &snapshot.error {
        reporter.finish("poll failed");
        anyhow::bail!("Batch {batch_id} poll failed: {error}");
    }
    let jobs = snapshot.data.unwrap_or_default();
    reporter.finish(&format!("{} jobs", jobs.len()));
    if jobs.is_empty() {
        println!("Batch {batch_id} has no jobs");
        return Ok(());
    }

    let rows = group_by_batch(jobs);
    print_rows(&rows);
    let failed = rows
        .iter()
        .any(|row| matches!(row, JobRow::Batch(g) if g.group_status == GroupStatus::Failed));
    if failed {
        anyhow::bail!("Batch {batch_id} finished with status FAILED");
    }
    Ok(())
}

/// Report every settled snapshot until the loop goes idle.
async fn follow<T, D>(
    mut handle: PollHandle<T>,
    reporter: &dyn ProgressReporter,
    describe: D,
) -> PollSnapshot<T>
where
    T: Clone,
    D: Fn(&T) -> String,
{
    loop {
        let alive = handle.changed().await;
        let snapshot = handle.snapshot();
        if !snapshot.is_fetching {
            if let Some(error) = &snapshot.error {
                reporter.message(&format!("status fetch failed: {error}"));
            } else if let Some(data) = &snapshot.data {
                reporter.update(&describe(data));
            }
        }
        if snapshot.is_idle() || !alive {
            return snapshot;
        }
    }
}

// ── Output ─────────────────────────────────────────────────────────

fn created(job: &JobRecord) -> String {
    job.created_at().map_or_else(
        || "-".to_string(),
        |t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

fn print_job(job: &JobRecord) {
    println!(
        "  {:<38} {:<12} {:<24} {}",
        job.session_id,
        job.status,
        format!("{}/{}", job.job_type, job.job_sub_type),
        created(job)
    );
}

fn print_group(group: &BatchGroup) {
    let status = match group.group_status {
        GroupStatus::InProgress => "IN_PROGRESS",
        GroupStatus::Succeeded => "SUCCEEDED",
        GroupStatus::Failed => "FAILED",
    };
    println!(
        "Batch {} [{status}] {} jobs, {} succeeded, {} failed",
        group.batch_id,
        group.entries.len(),
        group.count(JobStatus::Succeeded),
        group.count(JobStatus::Failed)
    );
    for job in &group.entries {
        print_job(job);
    }
}

fn print_rows(rows: &[JobRow]) {
    if rows.is_empty() {
        println!("No jobs");
        return;
    }
    for row in rows {
        match row {
            JobRow::Standalone(job) => print_job(job),
            JobRow::Batch(group) => print_group(group),
        }
    }
}
