//! provis core library — lineage graph assembly, job monitoring, and the
//! HTTP sources they read from.
//!
//! The two entry points are [`lineage::LineageExplorer`], which folds
//! upstream/downstream lineage queries into one de-duplicated graph, and
//! [`jobs::watch_job`], which polls an asynchronous job until it reaches a
//! terminal status.

pub mod config;
pub mod error;
pub mod jobs;
pub mod lineage;
pub mod progress;
pub mod schedule;
pub mod source;
pub mod types;
