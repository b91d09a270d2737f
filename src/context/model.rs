//! Linear fusion model.
use anyhow::{Context, ensure};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormType {
    #[default]
    None,
    /// Features are rescaled by `slopes[1..]`/`intercepts[1..]` & the prediction
    /// mapped back using `slopes[0]`/`intercepts[0]`.
    LinearRescale,
}

/// Fuses per-frame feature scores into a single prediction.
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    /// Feature name the prediction is stored under.
    #[serde(default = "default_name")]
    pub name: String,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub norm_type: NormType,
    #[serde(default)]
    pub slopes: Vec<f64>,
    #[serde(default)]
    pub intercepts: Vec<f64>,
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub score_clip: Option<[f64; 2]>,
}

fn default_name() -> String {
    "vmaf".into()
}

impl Model {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read model {}", path.display()))?;
        let model: Self = serde_json::from_str(&json)
            .with_context(|| format!("invalid model json {}", path.display()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.feature_names.is_empty(), "model has no features");
        ensure!(
            self.weights.len() == self.feature_names.len(),
            "model has {} weights for {} features",
            self.weights.len(),
            self.feature_names.len()
        );
        if self.norm_type == NormType::LinearRescale {
            let expected = self.feature_names.len() + 1;
            ensure!(
                self.slopes.len() == expected && self.intercepts.len() == expected,
                "linear_rescale model requires {expected} slopes & intercepts"
            );
            ensure!(self.slopes[0] != 0.0, "model output slope must be non-zero");
        }
        if let Some([low, high]) = self.score_clip {
            ensure!(low <= high, "invalid score_clip [{low}, {high}]");
        }
        Ok(())
    }

    /// Prediction for feature scores given in `feature_names` order.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let rescale = self.norm_type == NormType::LinearRescale;
        let mut score = self.bias;
        for (i, (x, w)) in features.iter().zip(&self.weights).enumerate() {
            let x = match rescale {
                true => self.slopes[i + 1] * x + self.intercepts[i + 1],
                false => *x,
            };
            score += w * x;
        }
        if rescale {
            score = (score - self.intercepts[0]) / self.slopes[0];
        }
        match self.score_clip {
            Some([low, high]) => score.clamp(low, high),
            None => score,
        }
    }
}
