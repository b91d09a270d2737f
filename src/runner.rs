//! Quality runner, scores assets with an [`Engine`] into [`ResultRecord`]s.
use crate::{
    asset::Asset,
    engine::{Engine, Job},
    log::{LogInterval, ProgressLogger},
    report::{self, ResultRecord},
    temporary,
};
use anyhow::{Context, ensure};
use futures_util::{StreamExt, TryStreamExt, stream};
use indicatif::ProgressBar;
use log::{debug, info};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

pub const VERSION: &str = "F0.2.4c-0.6.1";
pub const ALGO_VERSION: u32 = 2;
pub use report::TYPE;

/// Metrics & engine configuration applied to every asset of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Floating point psnr.
    pub psnr: bool,
    /// Floating point ssim.
    pub ssim: bool,
    /// Floating point ms-ssim.
    pub ms_ssim: bool,
    pub fixed_psnr: bool,
    pub fixed_ssim: bool,
    pub fixed_ms_ssim: bool,
    /// Only compute features, no fused model score.
    pub no_prediction: bool,
    /// Score every nth frame.
    pub subsample: u32,
    pub model: Option<String>,
    /// Engine worker threads, `0` for engine default.
    pub n_threads: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            psnr: false,
            ssim: false,
            ms_ssim: false,
            fixed_psnr: false,
            fixed_ssim: false,
            fixed_ms_ssim: false,
            no_prediction: false,
            subsample: 1,
            model: None,
            n_threads: 0,
        }
    }
}

impl RunnerOptions {
    /// Engine feature names of the requested optional metrics, in engine argument order.
    pub fn engine_features(&self) -> Vec<&'static str> {
        [
            (self.psnr, "float_psnr"),
            (self.fixed_psnr, "psnr"),
            (self.ssim, "float_ssim"),
            (self.fixed_ssim, "ssim"),
            (self.ms_ssim, "float_ms_ssim"),
            (self.fixed_ms_ssim, "ms_ssim"),
        ]
        .into_iter()
        .filter_map(|(on, feature)| on.then_some(feature))
        .collect()
    }
}

/// Shared run progress, in frames.
#[derive(Debug, Clone)]
pub struct Progress {
    bar: ProgressBar,
    logger: Arc<Mutex<ProgressLogger>>,
    total: u64,
}

impl Progress {
    pub fn new(bar: ProgressBar, total: u64, log_interval: Option<LogInterval>) -> Self {
        bar.set_length(total);
        Self {
            bar,
            logger: Arc::new(Mutex::new(ProgressLogger::new(
                module_path!(),
                Instant::now(),
                log_interval,
            ))),
            total,
        }
    }

    #[cfg(test)]
    pub fn hidden() -> Self {
        Self::new(ProgressBar::hidden(), 0, None)
    }

    /// Record `frames` more scored frames.
    pub fn inc(&self, frames: u64, fps: Option<f32>) {
        self.bar.inc(frames);
        if let Some(fps) = fps.filter(|fps| *fps > 0.0) {
            self.bar.set_message(format!("{fps} fps, "));
        }
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(self.total, self.bar.position(), fps);
    }
}

pub struct QualityRunner<E> {
    assets: Vec<Asset>,
    engine: E,
    options: RunnerOptions,
    workdir: Option<PathBuf>,
}

impl<E: Engine> QualityRunner<E> {
    pub fn new(assets: Vec<Asset>, engine: E, options: RunnerOptions) -> Self {
        Self {
            assets,
            engine,
            options,
            workdir: None,
        }
    }

    /// Directory the run's temporary report directory is created in.
    /// Default current dir.
    pub fn workdir(mut self, dir: Option<PathBuf>) -> Self {
        self.workdir = dir;
        self
    }

    /// Score all assets, returning results in asset order.
    ///
    /// With `parallelize` up to one asset per cpu is scored concurrently.
    pub async fn run(
        &self,
        parallelize: bool,
        progress: &Progress,
    ) -> anyhow::Result<Vec<ResultRecord>> {
        ensure!(self.options.subsample >= 1, "subsample must be at least 1");
        self.engine.validate(&self.options)?;
        for asset in &self.assets {
            asset.ensure_valid()?;
        }

        let dir = temporary::process_dir(self.workdir.clone());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("could not create {}", dir.display()))?;
        temporary::add(&dir);

        let concurrency = match parallelize {
            true => num_cpus::get().min(self.assets.len()).max(1),
            false => 1,
        };
        info!(
            "scoring {} assets with {}, {concurrency} at a time",
            self.assets.len(),
            self.engine.name()
        );

        stream::iter(self.assets.iter().enumerate())
            .map(|(idx, asset)| self.score_asset(idx, asset, &dir, progress))
            .buffered(concurrency)
            .try_collect()
            .await
    }

    async fn score_asset(
        &self,
        idx: usize,
        asset: &Asset,
        dir: &Path,
        progress: &Progress,
    ) -> anyhow::Result<ResultRecord> {
        let output = dir.join(format!("{idx}-{}.xml", asset.label().replace('/', "-")));
        debug!("scoring {} into {}", asset.label(), output.display());

        self.engine
            .score(Job {
                asset: asset.clone(),
                options: self.options.clone(),
                output: output.clone(),
                progress: progress.clone(),
            })
            .await
            .with_context(|| format!("{} failed on asset {}", self.engine.name(), asset.label()))?;

        let xml = tokio::fs::read_to_string(&output)
            .await
            .with_context(|| format!("could not read report {}", output.display()))?;
        let report = report::parse_report(&xml)
            .with_context(|| format!("invalid report {}", output.display()))?;
        ResultRecord::from_report(asset.clone(), report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        asset::PixelFormat,
        engine::{exec::ExecEngine, native::NativeEngine},
    };

    /// Write a yuv file of `frames` frames where every sample is `sample(frame, sample_idx)`.
    fn write_yuv(
        path: &Path,
        format: PixelFormat,
        (w, h): (usize, usize),
        frames: usize,
        sample: impl Fn(usize, usize) -> u16,
    ) {
        let samples = format.frame_size(w, h) / format.bytes_per_sample();
        let mut bytes = Vec::new();
        for frame in 0..frames {
            for i in 0..samples {
                let s = sample(frame, i);
                match format.bytes_per_sample() {
                    1 => bytes.push(s as u8),
                    _ => bytes.extend(s.to_le_bytes()),
                }
            }
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn asset(dir: &Path, name: &str, format: PixelFormat, frames: usize) -> Asset {
        let ref_path = dir.join(format!("{name}_ref.yuv"));
        let dis_path = dir.join(format!("{name}_dis.yuv"));
        let max = (1 << format.bit_depth()) - 1;
        write_yuv(&ref_path, format, (32, 16), frames, |f, i| {
            ((i * 7 + f * 3) % max) as u16
        });
        write_yuv(&dis_path, format, (32, 16), frames, |f, i| {
            ((i * 7 + f * 3 + (i + f) % 4) % max) as u16
        });
        Asset {
            dataset: "test".into(),
            content_id: 0,
            asset_id: 0,
            ref_path,
            dis_path,
            width: 32,
            height: 16,
            yuv_type: format,
        }
    }

    fn psnr_options() -> RunnerOptions {
        RunnerOptions {
            psnr: true,
            fixed_psnr: true,
            no_prediction: true,
            ..<_>::default()
        }
    }

    async fn run(
        assets: Vec<Asset>,
        options: RunnerOptions,
        parallelize: bool,
        workdir: &Path,
    ) -> anyhow::Result<Vec<ResultRecord>> {
        QualityRunner::new(assets, NativeEngine, options)
            .workdir(Some(workdir.into()))
            .run(parallelize, &Progress::hidden())
            .await
    }

    #[test]
    fn version() {
        assert_eq!(VERSION, "F0.2.4c-0.6.1");
        assert_eq!(ALGO_VERSION, 2);
        assert_eq!(TYPE, "VMAFRC");
    }

    #[test]
    fn engine_features_order() {
        let options = RunnerOptions {
            fixed_ms_ssim: true,
            psnr: true,
            ssim: true,
            fixed_psnr: true,
            ..<_>::default()
        };
        assert_eq!(
            options.engine_features(),
            ["float_psnr", "psnr", "float_ssim", "ms_ssim"]
        );
        assert!(RunnerOptions::default().engine_features().is_empty());
    }

    #[tokio::test]
    async fn reference_vs_itself_saturates() {
        let dir = tempfile::tempdir().unwrap();
        let a8 = asset(dir.path(), "a8", PixelFormat::Yuv420p, 3);
        let a10 = asset(dir.path(), "a10", PixelFormat::Yuv422p10le, 3);
        let assets = vec![
            a8.clone(),
            a8.reference_vs_itself(),
            a10.clone(),
            a10.reference_vs_itself(),
        ];

        let results = run(assets, psnr_options(), false, dir.path()).await.unwrap();
        assert_eq!(results.len(), 4);

        for (result, ceiling) in [(&results[1], 60.0), (&results[3], 72.0)] {
            assert!(result.asset.is_reference_vs_itself());
            for key in [
                "VMAFRC_float_psnr_score",
                "VMAFRC_psnr_y_score",
                "VMAFRC_psnr_cb_score",
                "VMAFRC_psnr_cr_score",
            ] {
                assert_eq!(result.score(key), Some(ceiling), "{key}");
            }
        }
        for result in [&results[0], &results[2]] {
            let psnr = result.score("VMAFRC_float_psnr_score").unwrap();
            assert!(psnr < 60.0, "{psnr}");
            // fixed & float variants agree
            let fixed = result.score("VMAFRC_psnr_y_score").unwrap();
            assert!((psnr - fixed).abs() < 1e-4, "{psnr} vs {fixed}");
        }
        assert!(results[0].score("VMAFRC_score").is_none());
    }

    #[tokio::test]
    async fn parallel_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let assets: Vec<_> = (0..4)
            .map(|n| {
                let mut a = asset(dir.path(), &format!("a{n}"), PixelFormat::Yuv420p, 2 + n);
                a.asset_id = n as _;
                a
            })
            .collect();

        let sequential = run(assets.clone(), psnr_options(), false, dir.path())
            .await
            .unwrap();
        let parallel = run(assets.clone(), psnr_options(), true, dir.path())
            .await
            .unwrap();

        assert_eq!(parallel.len(), assets.len());
        for ((s, p), asset) in sequential.iter().zip(&parallel).zip(&assets) {
            assert_eq!(&p.asset, asset, "results in asset order");
            assert_eq!(s.to_json(), p.to_json());
        }
    }

    #[tokio::test]
    async fn repeated_runs_identical() {
        let dir = tempfile::tempdir().unwrap();
        let assets = vec![asset(dir.path(), "a", PixelFormat::Yuv444p, 4)];
        let first = run(assets.clone(), psnr_options(), false, dir.path())
            .await
            .unwrap();
        let second = run(assets, psnr_options(), false, dir.path())
            .await
            .unwrap();
        assert_eq!(
            first[0].scores("VMAFRC_psnr_cb_scores"),
            second[0].scores("VMAFRC_psnr_cb_scores")
        );
        assert_eq!(first[0].to_json(), second[0].to_json());
    }

    #[tokio::test]
    async fn subsample_scores_every_nth_frame() {
        let dir = tempfile::tempdir().unwrap();
        let assets = vec![asset(dir.path(), "a", PixelFormat::Yuv420p, 12)];
        let full = run(assets.clone(), psnr_options(), false, dir.path())
            .await
            .unwrap();
        let options = RunnerOptions {
            subsample: 5,
            ..psnr_options()
        };
        let sub = run(assets, options, false, dir.path()).await.unwrap();

        assert_eq!(sub[0].frame_indices, [0, 5, 10]);
        let full = full[0].scores("VMAFRC_float_psnr_scores").unwrap();
        let sub = sub[0].scores("VMAFRC_float_psnr_scores").unwrap();
        assert_eq!(full.len(), 12);
        assert_eq!(sub.len(), 3);
        for i in (0..12).step_by(5) {
            assert!((full[i] - sub[i / 5]).abs() < 1e-7, "frame {i}");
        }
    }

    #[tokio::test]
    async fn prediction_with_linear_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.json");
        std::fs::write(
            &model,
            r#"{"feature_names":["psnr_y","psnr_cb","psnr_cr"],"weights":[0.5,0.25,0.25],"score_clip":[0,100]}"#,
        )
        .unwrap();
        let a = asset(dir.path(), "a", PixelFormat::Yuv420p, 2);
        let options = RunnerOptions {
            model: Some(model.display().to_string()),
            ..<_>::default()
        };
        let results = run(vec![a.clone(), a.reference_vs_itself()], options, false, dir.path())
            .await
            .unwrap();
        assert_eq!(results[1].score("VMAFRC_score"), Some(60.0));
        let vmaf = results[0].score("VMAFRC_score").unwrap();
        assert!(vmaf < 60.0, "{vmaf}");
        // model features are recorded too
        assert!(results[0].score("VMAFRC_psnr_y_score").is_some());
    }

    #[tokio::test]
    async fn named_model_reports_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("fusion.json");
        std::fs::write(
            &model,
            r#"{"name":"psnr_fusion","feature_names":["psnr_y"],"weights":[1.0]}"#,
        )
        .unwrap();
        let options = RunnerOptions {
            model: Some(model.display().to_string()),
            ..<_>::default()
        };
        let assets = vec![asset(dir.path(), "a", PixelFormat::Yuv420p, 3)];
        let results = run(assets, options, false, dir.path()).await.unwrap();

        let vmaf = results[0].scores("VMAFRC_scores").expect("VMAFRC_scores");
        assert_eq!(Some(vmaf), results[0].scores("VMAFRC_psnr_y_scores"));
        assert!(results[0].score("VMAFRC_score").is_some());
    }

    #[tokio::test]
    async fn metric_unaffected_by_other_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.json");
        std::fs::write(
            &model,
            r#"{"feature_names":["psnr_y","psnr_cb"],"weights":[0.75,0.25],"bias":1.5}"#,
        )
        .unwrap();
        let assets = vec![asset(dir.path(), "a", PixelFormat::Yuv420p10le, 4)];

        let psnr_only = RunnerOptions {
            psnr: true,
            no_prediction: true,
            ..<_>::default()
        };
        let everything = RunnerOptions {
            psnr: true,
            fixed_psnr: true,
            model: Some(model.display().to_string()),
            n_threads: 2,
            ..<_>::default()
        };
        let alone = run(assets.clone(), psnr_only, false, dir.path()).await.unwrap();
        let combined = run(assets, everything, false, dir.path()).await.unwrap();

        let key = "VMAFRC_float_psnr_scores";
        assert_eq!(alone[0].scores(key).unwrap().len(), 4);
        assert_eq!(alone[0].scores(key), combined[0].scores(key));
        assert!(alone[0].scores("VMAFRC_scores").is_none());
        assert!(combined[0].scores("VMAFRC_scores").is_some());
    }

    #[tokio::test]
    async fn invalid_options() {
        let dir = tempfile::tempdir().unwrap();
        let assets = vec![asset(dir.path(), "a", PixelFormat::Yuv420p, 1)];

        let zero_subsample = RunnerOptions {
            subsample: 0,
            ..psnr_options()
        };
        assert!(run(assets.clone(), zero_subsample, false, dir.path()).await.is_err());

        let ssim = RunnerOptions {
            ssim: true,
            ..psnr_options()
        };
        let err = run(assets.clone(), ssim, false, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("ssim"), "{err}");

        let no_model = RunnerOptions {
            no_prediction: false,
            ..psnr_options()
        };
        assert!(run(assets, no_model, false, dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn missing_distorted_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = asset(dir.path(), "a", PixelFormat::Yuv420p, 1);
        a.dis_path = dir.path().join("missing.yuv");
        let err = run(vec![a], psnr_options(), false, dir.path())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing.yuv"), "{err:#}");
    }

    /// Scores the 576x324 test pair with the `vmafrc` executable.
    ///
    /// Requires `VMAFRC_EXE` & `VMAFRC_TEST_RESOURCES` pointing at the dir containing
    /// `yuv/src01_hrc00_576x324.yuv`.
    #[tokio::test]
    #[ignore]
    async fn vmafrc_exec_oracle() {
        let resources = PathBuf::from(std::env::var("VMAFRC_TEST_RESOURCES").unwrap());
        let exe = std::env::var("VMAFRC_EXE").unwrap_or_else(|_| "vmafrc".into());
        let asset = Asset {
            dataset: "test".into(),
            content_id: 0,
            asset_id: 0,
            ref_path: resources.join("yuv/src01_hrc00_576x324.yuv"),
            dis_path: resources.join("yuv/src01_hrc01_576x324.yuv"),
            width: 576,
            height: 324,
            yuv_type: PixelFormat::Yuv420p,
        };
        let options = RunnerOptions {
            psnr: true,
            ssim: true,
            ms_ssim: true,
            ..<_>::default()
        };
        let workdir = tempfile::tempdir().unwrap();
        let results = QualityRunner::new(
            vec![asset.clone(), asset.reference_vs_itself()],
            ExecEngine::new(exe),
            options,
        )
        .workdir(Some(workdir.path().into()))
        .run(false, &Progress::hidden())
        .await
        .unwrap();

        let close = |result: &ResultRecord, key: &str, expected: f64| {
            let score = result.score(key).unwrap();
            assert!((score - expected).abs() < 1e-8, "{key} {score} != {expected}");
        };
        close(&results[0], "VMAFRC_score", 76.69926875);
        close(&results[0], "VMAFRC_vif_scale0_score", 0.3634208125);
        close(&results[0], "VMAFRC_motion2_score", 3.895352291666667);
        close(&results[0], "VMAFRC_adm2_score", 0.9345877291666667);
        close(&results[0], "VMAFRC_float_psnr_score", 30.7550666667);
        close(&results[1], "VMAFRC_score", 99.94641666666666);
        close(&results[1], "VMAFRC_vif_scale0_score", 1.0);
        close(&results[1], "VMAFRC_float_psnr_score", 60.0);
        close(&results[1], "VMAFRC_float_ssim_score", 1.0);
    }
}
