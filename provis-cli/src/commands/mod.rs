pub mod job;
pub mod lineage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use provis_core::config::ProvisConfig;
use provis_core::source::HttpSource;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assemble the lineage graph around a record and print it
    Lineage(lineage::LineageArgs),
    /// Watch, list and group asynchronous jobs
    Job(job::JobArgs),
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub quiet: bool,
}

pub async fn run(cmd: Command, global: GlobalArgs) -> anyhow::Result<()> {
    let config = load_config(&global)?;
    match cmd {
        Command::Lineage(args) => lineage::run(args, &config).await,
        Command::Job(args) => job::run(args, &config, &global).await,
    }
}

/// Resolve the active configuration: `--config`, else `.provis/config.toml`
/// in the working directory, else defaults.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<ProvisConfig> {
    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    let config = ProvisConfig::discover(global.config.as_deref(), &cwd)
        .context("Cannot load configuration")?;
    tracing::debug!(
        prov_url = %config.api.prov_url,
        jobs_url = %config.api.jobs_url,
        "configuration loaded"
    );
    Ok(config)
}

pub fn http_source(config: &ProvisConfig) -> anyhow::Result<Arc<HttpSource>> {
    let source = HttpSource::from_config(config).context("Cannot build HTTP client")?;
    Ok(Arc::new(source))
}
