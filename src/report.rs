//! Engine xml report parsing & per asset result records.
use crate::asset::Asset;
use anyhow::{Context, anyhow, bail, ensure};
use quick_xml::{Reader, events::Event};
use serde_json::json;

/// Result key prefix.
pub const TYPE: &str = "VMAFRC";

/// Report features recorded into results, anything else is ignored.
pub const FEATURES: &[&str] = &[
    "adm2",
    "adm_scale0",
    "adm_scale1",
    "adm_scale2",
    "adm_scale3",
    "vif_scale0",
    "vif_scale1",
    "vif_scale2",
    "vif_scale3",
    "motion2",
    "psnr_y",
    "psnr_cb",
    "psnr_cr",
    "ssim",
    "ms_ssim",
    "float_psnr",
    "float_ssim",
    "float_ms_ssim",
];

/// Report attribute of the fused model score.
pub const MODEL_SCORE: &str = "vmaf";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportFrame {
    pub index: usize,
    pub vmaf: Option<f64>,
    /// Recognized features in report order.
    pub features: Vec<(&'static str, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReport {
    pub frames: Vec<ReportFrame>,
}

pub fn parse_report(xml: &str) -> anyhow::Result<ParsedReport> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut report = ParsedReport::default();
    loop {
        match reader.read_event().context("invalid report xml")? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"frame" => {
                let mut index = None;
                let mut vmaf = None;
                let mut features = Vec::new();
                let mut raw = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.context("invalid frame attribute")?;
                    let key = std::str::from_utf8(attr.key.as_ref())?.to_owned();
                    let value = attr.unescape_value()?.into_owned();
                    raw.push((key, value));
                }
                // frameNum may follow feature attributes
                for (key, value) in &raw {
                    if key == "frameNum" {
                        index = Some(value.parse::<usize>().with_context(|| {
                            format!("invalid frameNum `{value}`")
                        })?);
                    }
                }
                let index = index.ok_or_else(|| anyhow!("frame without frameNum"))?;
                for (key, value) in raw {
                    let parse = || {
                        value.parse::<f64>().with_context(|| {
                            format!("invalid {key} value `{value}` in frame {index}")
                        })
                    };
                    if key == MODEL_SCORE {
                        vmaf = Some(parse()?);
                    } else if let Some(feature) = FEATURES.iter().find(|f| **f == key) {
                        features.push((*feature, parse()?));
                    }
                }
                report.frames.push(ReportFrame {
                    index,
                    vmaf,
                    features,
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(report)
}

/// Scores of a single asset, keyed like `VMAFRC_score`, `VMAFRC_psnr_y_scores`.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub asset: Asset,
    /// Engine frame index of each score.
    pub frame_indices: Vec<usize>,
    /// Per frame score sequences, in first seen order.
    scores: Vec<(String, Vec<f64>)>,
}

fn scores_key(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{TYPE}_{name}_scores"),
        None => format!("{TYPE}_scores"),
    }
}

impl ResultRecord {
    pub fn from_report(asset: Asset, report: ParsedReport) -> anyhow::Result<Self> {
        ensure!(!report.frames.is_empty(), "no frames in report");
        ensure!(
            report.frames.windows(2).all(|w| w[0].index < w[1].index),
            "report frames are not in ascending order"
        );
        let n_frames = report.frames.len();

        let mut scores: Vec<(String, Vec<f64>)> = Vec::new();
        let mut push = |key: String, value: f64| match scores.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => scores.push((key, vec![value])),
        };
        let mut frame_indices = Vec::with_capacity(n_frames);
        for frame in report.frames {
            frame_indices.push(frame.index);
            if let Some(vmaf) = frame.vmaf {
                push(scores_key(None), vmaf);
            }
            for (feature, value) in frame.features {
                push(scores_key(Some(feature)), value);
            }
        }

        if let Some((key, values)) = scores.iter().find(|(_, v)| v.len() != n_frames) {
            bail!("{key} has {} scores for {n_frames} frames", values.len());
        }

        Ok(Self {
            asset,
            frame_indices,
            scores,
        })
    }

    /// Per frame scores, e.g. `VMAFRC_scores`, `VMAFRC_vif_scale0_scores`.
    pub fn scores(&self, key: &str) -> Option<&[f64]> {
        self.scores
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Mean score, e.g. `VMAFRC_score`, `VMAFRC_vif_scale0_score`.
    pub fn score(&self, key: &str) -> Option<f64> {
        let scores = self.scores(&format!("{key}s"))?;
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Aggregate `*_score` keys & values, in first seen order.
    pub fn aggregates(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().filter_map(|(key, _)| {
            let key = key.strip_suffix('s')?;
            Some((key, self.score(key)?))
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        record.insert("asset".into(), json!(self.asset.label()));
        record.insert("ref_path".into(), json!(self.asset.ref_path));
        record.insert("dis_path".into(), json!(self.asset.dis_path));
        record.insert("frames".into(), json!(self.frame_indices));
        for (key, value) in self.aggregates() {
            record.insert(key.into(), json!(value));
        }
        for (key, values) in &self.scores {
            record.insert(key.clone(), json!(values));
        }
        serde_json::Value::Object(record)
    }
}
