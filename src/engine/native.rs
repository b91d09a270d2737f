//! In-process engine scoring with [`Context`].
use super::{Engine, Job};
use crate::{
    context::{Config, Context, Model, OutputFormat, PoolingMethod},
    report,
    runner::RunnerOptions,
    yuv::YuvReader,
};
use anyhow::{Context as _, ensure};
use log::{debug, info};
use std::{fs::File, io::BufWriter, path::Path, time::Instant};

/// Scores psnr metrics & linear model predictions in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl Engine for NativeEngine {
    fn name(&self) -> &'static str {
        "in-process engine"
    }

    fn validate(&self, options: &RunnerOptions) -> anyhow::Result<()> {
        ensure!(
            !(options.ssim || options.fixed_ssim || options.ms_ssim || options.fixed_ms_ssim),
            "ssim & ms-ssim are only available with the vmafrc executable"
        );
        match (&options.model, options.no_prediction) {
            (_, true) => ensure!(
                !options.engine_features().is_empty(),
                "no metrics requested, enable psnr or a model"
            ),
            (Some(model), false) => {
                Model::load(Path::new(model))?;
            }
            (None, false) => {
                anyhow::bail!("in-process scoring requires a linear --model json or --no-prediction")
            }
        }
        Ok(())
    }

    async fn score(&self, job: Job) -> anyhow::Result<()> {
        info!(
            "scoring {} vs reference {} in-process",
            job.asset.dis_path.display(),
            job.asset.ref_path.display()
        );
        tokio::task::spawn_blocking(move || score(&job)).await?
    }
}

fn score(
    Job {
        asset,
        options,
        output,
        progress,
    }: &Job,
) -> anyhow::Result<()> {
    let model = match (&options.model, options.no_prediction) {
        (Some(path), false) => {
            let mut model = Model::load(Path::new(path))?;
            // the report carries the fused score as `vmaf` whatever the model is called
            if model.name != report::MODEL_SCORE {
                debug!("reporting model {} as {}", model.name, report::MODEL_SCORE);
                model.name = report::MODEL_SCORE.into();
            }
            Some(model)
        }
        _ => None,
    };

    let mut ctx = Context::new(Config {
        n_threads: options.n_threads,
        n_subsample: options.subsample,
    })?;
    // psnr -> float_psnr, fixed_psnr -> psnr
    for feature in options.engine_features() {
        ctx.use_feature(feature)?;
    }
    if let Some(model) = &model {
        ctx.use_features_from_model(model)?;
    }

    let open = |path: &Path| YuvReader::open(path, asset.width, asset.height, asset.yuv_type);
    let mut reference = open(&asset.ref_path)?;
    let mut distorted = open(&asset.dis_path)?;

    let start = Instant::now();
    let mut frames = 0;
    while let (Some(r), Some(d)) = (reference.next_picture()?, distorted.next_picture()?) {
        ctx.read_pictures(&r, &d, frames)
            .with_context(|| format!("frame {frames}"))?;
        frames += 1;
        let fps = frames as f32 / start.elapsed().as_secs_f32().max(f32::EPSILON);
        progress.inc(1, Some(fps));
    }
    ensure!(frames > 0, "no frames to score in {}", asset.ref_path.display());
    ctx.flush()?;

    if let Some(model) = &model {
        let mean = ctx.score_pooled(model, PoolingMethod::Mean, 0, frames)?;
        debug!("{} {} mean {mean}", asset.label(), model.name);
    }

    let file = File::create(output)
        .with_context(|| format!("could not create {}", output.display()))?;
    ctx.write_output(BufWriter::new(file), OutputFormat::Xml)?;
    debug!(
        "{} scored {frames} frames in {:.2?}, engine {}",
        asset.label(),
        start.elapsed(),
        Context::version()
    );
    Ok(())
}
