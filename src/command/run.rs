use crate::{
    asset::{self, Asset},
    command::{PROGRESS_CHARS, args},
    engine::{Engine, exec::ExecEngine, native::NativeEngine},
    log::LogInterval,
    report::ResultRecord,
    runner::{self, Progress, QualityRunner, RunnerOptions},
};
use anyhow::{Context, ensure};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::{io::IsTerminal, path::PathBuf, time::Duration};

/// Score reference/distorted raw yuv pairs with VMAF & its constituent metrics.
///
/// Either `--assets` or a single `--reference`/`--distorted` pair is scored.
#[derive(Parser)]
#[clap(verbatim_doc_comment)]
#[group(skip)]
pub struct Args {
    /// Json array of assets, each
    /// `{dataset, content_id, asset_id, ref_path, dis_path, width, height, yuv_type}`.
    #[arg(long, required_unless_present = "reference")]
    pub assets: Option<PathBuf>,

    #[clap(flatten)]
    pub pair: args::Pair,

    /// Also score each reference against itself.
    #[arg(long)]
    pub with_reference: bool,

    #[clap(flatten)]
    pub metrics: args::Metrics,

    /// Score assets concurrently, up to one per cpu.
    #[arg(long)]
    pub parallel: bool,

    /// Score in-process instead of running vmafrc.
    /// Supports psnr metrics & linear json models only.
    #[arg(long)]
    pub in_process: bool,

    /// vmafrc executable.
    #[arg(long, env = "VMAFRC_EXE", default_value = "vmafrc")]
    pub vmafrc: PathBuf,

    /// Directory to store temporary engine reports in. Default current dir.
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Stdout message format `human` or `json`.
    #[arg(long, value_enum, default_value_t = StdoutFormat::Human)]
    pub stdout_format: StdoutFormat,

    /// Progress log interval when stderr is not a terminal,
    /// a duration e.g. `30s` or a percentage of frames e.g. `5%`.
    #[arg(long)]
    pub log_interval: Option<LogInterval>,
}

impl Args {
    fn assets(&self) -> anyhow::Result<Vec<Asset>> {
        let mut assets = match (&self.assets, self.pair.to_asset()) {
            (Some(path), _) => asset::load_assets(path)?,
            (None, Some(asset)) => vec![asset],
            (None, None) => anyhow::bail!("no assets, use --assets or --reference"),
        };
        if self.with_reference {
            assets = assets
                .into_iter()
                .flat_map(|a| {
                    let reference = a.reference_vs_itself();
                    [a, reference]
                })
                .collect();
        }
        ensure!(!assets.is_empty(), "no assets to score");
        for asset in &assets {
            asset.ensure_valid()?;
        }
        Ok(assets)
    }
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let assets = args.assets()?;
    let options = args.metrics.to_options();
    let results = match args.in_process {
        true => score(&args, assets, NativeEngine, options).await?,
        false => score(&args, assets, ExecEngine::new(&args.vmafrc), options).await?,
    };
    args.stdout_format.print(&results)
}

async fn score<E: Engine>(
    args: &Args,
    assets: Vec<Asset>,
    engine: E,
    options: RunnerOptions,
) -> anyhow::Result<Vec<ResultRecord>> {
    let mut total = 0;
    for asset in &assets {
        total += asset
            .frame_count()
            .with_context(|| format!("asset {}", asset.label()))?;
    }
    info!(
        "{} {} v{} (algo {}) scoring {} assets, {total} frames",
        runner::TYPE,
        engine.name(),
        runner::VERSION,
        runner::ALGO_VERSION,
        assets.len()
    );

    let bar = match std::io::stderr().is_terminal() {
        true => ProgressBar::new(total).with_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan.bold} {elapsed_precise:.bold} {wide_bar:.cyan/blue} ({msg}eta {eta})")?
                .progress_chars(PROGRESS_CHARS),
        ),
        false => ProgressBar::hidden(),
    };
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message("scoring, ");
    let progress = Progress::new(bar.clone(), total, args.log_interval);

    let results = QualityRunner::new(assets, engine, options)
        .workdir(args.temp_dir.clone())
        .run(args.parallel, &progress)
        .await;
    bar.finish_and_clear();
    results
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StdoutFormat {
    Human,
    Json,
}

impl StdoutFormat {
    fn print(self, results: &[ResultRecord]) -> anyhow::Result<()> {
        match self {
            Self::Human => {
                for result in results {
                    println!(
                        "{} {}",
                        style(result.asset.label()).bold(),
                        style(format!("({} frames)", result.frame_indices.len())).dim()
                    );
                    for (key, score) in result.aggregates() {
                        let score = match key {
                            "VMAFRC_score" => style(format!("{score:.6}")).bold().green(),
                            _ => style(format!("{score:.6}")).bold(),
                        };
                        println!("  {key} {score}");
                    }
                }
            }
            Self::Json => {
                let json: Vec<_> = results.iter().map(ResultRecord::to_json).collect();
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(cli: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("run").chain(cli.iter().copied())).unwrap()
    }

    #[test]
    fn pair_with_reference() {
        let args = args(&[
            "--reference",
            "ref.yuv",
            "--distorted",
            "dis.yuv",
            "--width",
            "8",
            "--height",
            "4",
            "--with-reference",
        ]);
        let assets = args.assets().unwrap();
        assert_eq!(assets.len(), 2);
        assert!(!assets[0].is_reference_vs_itself());
        assert!(assets[1].is_reference_vs_itself());
        assert_eq!(assets[1].ref_path, PathBuf::from("ref.yuv"));
    }

    #[test]
    fn zero_width_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.yuv");
        std::fs::write(&path, [0u8; 24]).unwrap();
        let path = path.to_str().unwrap();
        let args = args(&[
            "--reference",
            path,
            "--distorted",
            path,
            "--width",
            "0",
            "--height",
            "4",
            "--psnr",
            "--no-prediction",
            "--in-process",
        ]);
        let err = args.assets().unwrap_err();
        assert!(err.to_string().contains("dimensions 0x4"), "{err}");
    }

    #[test]
    fn assets_required() {
        assert!(Args::try_parse_from(["run", "--psnr"]).is_err());
    }

    #[test]
    fn assets_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.json");
        std::fs::write(
            &path,
            r#"[
                {"dataset": "test", "content_id": 0, "asset_id": 0, "ref_path": "r0.yuv",
                 "dis_path": "d0.yuv", "width": 576, "height": 324, "yuv_type": "yuv420p"},
                {"dataset": "test", "content_id": 1, "asset_id": 0, "ref_path": "r1.yuv",
                 "dis_path": "d1.yuv", "width": 576, "height": 324}
            ]"#,
        )
        .unwrap();
        let args = args(&["--assets", path.to_str().unwrap(), "--in-process", "--parallel"]);
        assert!(args.in_process && args.parallel);
        let assets = args.assets().unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[1].label(), "test/1/0");
    }
}
