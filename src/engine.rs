//! Scoring engines used by the quality runner.
pub mod exec;
pub mod native;

use crate::{
    asset::Asset,
    runner::{Progress, RunnerOptions},
};
use std::{future::Future, path::PathBuf};

/// A single asset to score.
#[derive(Debug, Clone)]
pub struct Job {
    pub asset: Asset,
    pub options: RunnerOptions,
    /// Path the engine writes its xml report to.
    pub output: PathBuf,
    pub progress: Progress,
}

/// Scores a [`Job`] writing an xml report to [`Job::output`].
pub trait Engine {
    fn name(&self) -> &'static str;

    /// Check the options are supported, before any job starts.
    fn validate(&self, options: &RunnerOptions) -> anyhow::Result<()>;

    fn score(&self, job: Job) -> impl Future<Output = anyhow::Result<()>> + Send;
}
