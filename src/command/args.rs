//! Shared argument logic.
use crate::{
    asset::{Asset, PixelFormat},
    runner::RunnerOptions,
};
use clap::Parser;
use std::path::PathBuf;

/// Metric & engine options.
#[derive(Parser, Clone, Debug)]
#[group(skip)]
pub struct Metrics {
    /// Compute floating point PSNR (`float_psnr`).
    #[arg(long)]
    pub psnr: bool,

    /// Compute floating point SSIM (`float_ssim`).
    #[arg(long)]
    pub ssim: bool,

    /// Compute floating point MS-SSIM (`float_ms_ssim`).
    #[arg(long)]
    pub ms_ssim: bool,

    /// Compute fixed point PSNR per plane (`psnr_y`, `psnr_cb`, `psnr_cr`).
    #[arg(long)]
    pub fixed_psnr: bool,

    /// Compute fixed point SSIM (`ssim`).
    #[arg(long)]
    pub fixed_ssim: bool,

    /// Compute fixed point MS-SSIM (`ms_ssim`).
    #[arg(long)]
    pub fixed_ms_ssim: bool,

    /// Only compute features, skip the fused VMAF model score.
    #[arg(long)]
    pub no_prediction: bool,

    /// Only score every nth frame.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub subsample: u32,

    /// VMAF model.
    ///
    /// vmafrc accepts `version=...` or a model path, default `version=vmaf_v0.6.1`.
    /// In-process scoring requires a linear model json path.
    #[arg(long)]
    pub model: Option<String>,

    /// Engine worker threads. Default all cores.
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Metrics {
    pub fn to_options(&self) -> RunnerOptions {
        RunnerOptions {
            psnr: self.psnr,
            ssim: self.ssim,
            ms_ssim: self.ms_ssim,
            fixed_psnr: self.fixed_psnr,
            fixed_ssim: self.fixed_ssim,
            fixed_ms_ssim: self.fixed_ms_ssim,
            no_prediction: self.no_prediction,
            subsample: self.subsample,
            model: self.model.clone(),
            n_threads: self.threads.unwrap_or_else(num_cpus::get),
        }
    }
}

/// A single reference/distorted pair, instead of `--assets`.
#[derive(Parser, Clone, Debug)]
#[group(skip)]
pub struct Pair {
    /// Reference raw yuv file.
    #[arg(long, conflicts_with = "assets", requires_all = ["distorted", "width", "height"])]
    pub reference: Option<PathBuf>,

    /// Distorted raw yuv file.
    #[arg(long, requires = "reference")]
    pub distorted: Option<PathBuf>,

    /// Frame width.
    #[arg(long, requires = "reference")]
    pub width: Option<usize>,

    /// Frame height.
    #[arg(long, requires = "reference")]
    pub height: Option<usize>,

    /// Raw yuv pixel format.
    #[arg(long, value_enum, default_value_t = PixelFormat::Yuv420p)]
    pub yuv_type: PixelFormat,
}

impl Pair {
    /// Asset of the pair, `None` if no `--reference` was given.
    pub fn to_asset(&self) -> Option<Asset> {
        Some(Asset {
            dataset: "cmd".into(),
            content_id: 0,
            asset_id: 0,
            ref_path: self.reference.clone()?,
            dis_path: self.distorted.clone()?,
            width: self.width?,
            height: self.height?,
            yuv_type: self.yuv_type,
        })
    }
}
