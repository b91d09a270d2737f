//! `vmafrc` executable engine.
use super::{Engine, Job};
use crate::{
    process::{Chunks, CommandExt, EngineProgress, child::AddOnDropChunkStream, cmd_err, exit_ok_stderr},
    runner::RunnerOptions,
};
use anyhow::Context;
use log::{debug, info};
use std::{path::PathBuf, pin::pin, process::Stdio};
use tokio::process::Command;
use tokio_process_stream::{Item, ProcessChunkStream};
use tokio_stream::{Stream, StreamExt};

/// Model used when none is configured.
const DEFAULT_MODEL: &str = "version=vmaf_v0.6.1";

/// Runs the `vmafrc` executable per asset.
#[derive(Debug, Clone)]
pub struct ExecEngine {
    exe: PathBuf,
}

impl ExecEngine {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    pub fn command(&self, job: &Job) -> Command {
        let Job {
            asset,
            options,
            output,
            ..
        } = job;

        let mut cmd = Command::new(&self.exe);
        cmd.kill_on_drop(true)
            .arg2("--reference", &asset.ref_path)
            .arg2("--distorted", &asset.dis_path)
            .arg2("--width", asset.width.to_string())
            .arg2("--height", asset.height.to_string())
            .arg2("--pixel_format", asset.yuv_type.chroma())
            .arg2("--bitdepth", asset.yuv_type.bit_depth().to_string())
            .arg("--xml")
            .arg2("--output", output)
            .stdin(Stdio::null());

        match options.no_prediction {
            true => cmd.arg("--no_prediction"),
            false => cmd.arg2("--model", model_arg(options)),
        };
        for feature in options.engine_features() {
            cmd.arg2("--feature", feature);
        }
        cmd.arg2_if(
            options.subsample > 1,
            "--subsample",
            options.subsample.to_string(),
        )
        .arg2_opt(
            "--threads",
            (options.n_threads > 0).then(|| options.n_threads.to_string()),
        );
        cmd
    }
}

/// `--model` value, a bare path is converted to `path=...`.
fn model_arg(options: &RunnerOptions) -> String {
    match options.model.as_deref() {
        None => DEFAULT_MODEL.into(),
        Some(m) if m.contains('=') => m.into(),
        Some(path) => format!("path={path}"),
    }
}

impl Engine for ExecEngine {
    fn name(&self) -> &'static str {
        "vmafrc"
    }

    fn validate(&self, _: &RunnerOptions) -> anyhow::Result<()> {
        Ok(())
    }

    async fn score(&self, job: Job) -> anyhow::Result<()> {
        info!(
            "vmafrc {} vs reference {}",
            job.asset.dis_path.display(),
            job.asset.ref_path.display()
        );
        let mut out = pin!(self.run(&job)?);
        let mut frames = 0;
        while let Some(next) = out.next().await {
            match next {
                ExecOut::Progress(EngineProgress { frame, fps }) if frame > frames => {
                    job.progress.inc(frame - frames, Some(fps));
                    frames = frame;
                }
                ExecOut::Progress(_) => {}
                ExecOut::Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ExecOut {
    Progress(EngineProgress),
    Err(anyhow::Error),
}

impl ExecEngine {
    /// Spawn vmafrc streaming progress, ending with an error if it fails
    /// or writes no report.
    pub fn run(&self, job: &Job) -> anyhow::Result<impl Stream<Item = ExecOut> + use<>> {
        let cmd = self.command(job);
        let cmd_str = cmd.to_cmd_str();
        debug!("cmd `{cmd_str}`");
        let vmafrc: AddOnDropChunkStream = ProcessChunkStream::try_from(cmd)
            .with_context(|| format!("could not run {}", self.exe.display()))?
            .into();
        let output = job.output.clone();

        Ok(async_stream::stream! {
            let mut vmafrc = vmafrc;
            let mut chunks = Chunks::default();
            while let Some(next) = vmafrc.next().await {
                match next {
                    Item::Stderr(chunk) => {
                        chunks.push(&chunk);
                        if let Some(progress) = EngineProgress::try_parse(chunks.last_line()) {
                            yield ExecOut::Progress(progress);
                        }
                    }
                    Item::Stdout(_) => {}
                    Item::Done(code) => {
                        if let Err(err) = exit_ok_stderr("vmafrc", code, &cmd_str, &chunks) {
                            yield ExecOut::Err(err);
                            return;
                        }
                    }
                }
            }
            if !matches!(tokio::fs::try_exists(&output).await, Ok(true)) {
                yield ExecOut::Err(cmd_err("vmafrc wrote no report", &cmd_str, &chunks));
            }
        })
    }
}
