//! In-process scoring context.
//!
//! Pictures are fed in order through [`Context::read_pictures`], each registered
//! extractor appends its scores to the feature collector, then per-frame & pooled
//! model predictions and the xml report are produced from the collected features.
mod collector;
mod extractor;
mod model;
mod output;
mod psnr;

pub use model::Model;

use collector::FeatureCollector;
use extractor::{FeatureExtractor, FeatureScore};

use crate::yuv::Picture;
use rayon::prelude::*;
use std::io::Write;

const VERSION: &str = "RELEASE_CANDIDATE";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("unknown feature extractor `{0}`")]
    UnknownExtractor(String),
    #[error("no feature extractor provides `{0}`")]
    UnknownFeature(String),
    #[error("feature `{name}` already has a score at index {index}")]
    DuplicateScore { name: String, index: usize },
    #[error("feature `{name}` has no score at index {index}")]
    MissingFeature { name: String, index: usize },
    #[error("invalid index range {low}..{high}")]
    InvalidRange { low: usize, high: usize },
    #[error("invalid picture: {0}")]
    Picture(&'static str),
    #[error("could not build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("could not write output: {0}")]
    Output(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Worker threads used to run extractors of one picture concurrently.
    /// `0` runs them on the calling thread.
    pub n_threads: usize,
    /// Only score every nth frame, `0` or `1` scores all frames.
    pub n_subsample: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMethod {
    Min,
    Max,
    Mean,
    HarmonicMean,
}

impl PoolingMethod {
    /// Pool `scores`, which must be non-empty.
    pub fn pool(self, scores: &[f64]) -> f64 {
        let n = scores.len() as f64;
        match self {
            Self::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            // n counts scored frames only, not the whole index range
            Self::Mean => scores.iter().sum::<f64>() / n,
            Self::HarmonicMean => n / scores.iter().map(|s| 1.0 / (s + 1.0)).sum::<f64>() - 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xml,
}

pub struct Context {
    cfg: Config,
    pool: Option<rayon::ThreadPool>,
    extractors: Vec<Box<dyn FeatureExtractor>>,
    collector: FeatureCollector,
    dimensions: Option<(usize, usize)>,
    flushed: bool,
}

impl Context {
    pub fn new(cfg: Config) -> Result<Self, ContextError> {
        let pool = match cfg.n_threads {
            0 => None,
            n => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
        };
        Ok(Self {
            cfg,
            pool,
            extractors: Vec::new(),
            collector: FeatureCollector::default(),
            dimensions: None,
            flushed: false,
        })
    }

    /// Register the extractor named `name`, e.g. `float_psnr`.
    pub fn use_feature(&mut self, name: &str) -> Result<(), ContextError> {
        if self.extractors.iter().any(|e| e.name() == name) {
            return Ok(());
        }
        let extractor =
            extractor::by_name(name).ok_or_else(|| ContextError::UnknownExtractor(name.into()))?;
        self.extractors.push(extractor);
        Ok(())
    }

    /// Register extractors providing every feature the model uses.
    pub fn use_features_from_model(&mut self, model: &Model) -> Result<(), ContextError> {
        for feature in &model.feature_names {
            let extractor = extractor::by_feature_name(feature)
                .ok_or_else(|| ContextError::UnknownFeature(feature.clone()))?;
            if !self.extractors.iter().any(|e| e.name() == extractor.name()) {
                self.extractors.push(extractor);
            }
        }
        Ok(())
    }

    pub fn import_feature_score(
        &mut self,
        name: &str,
        value: f64,
        index: usize,
    ) -> Result<(), ContextError> {
        self.collector.append(name, value, index)
    }

    fn is_skipped(&self, index: usize) -> bool {
        self.cfg.n_subsample > 1 && index % self.cfg.n_subsample as usize != 0
    }

    /// Run registered extractors over the picture pair at `index`.
    ///
    /// Frames skipped by subsampling are only seen by temporal extractors.
    pub fn read_pictures(
        &mut self,
        reference: &Picture,
        distorted: &Picture,
        index: usize,
    ) -> Result<(), ContextError> {
        let (w, h) = (reference.luma().width, reference.luma().height);
        if (distorted.luma().width, distorted.luma().height) != (w, h)
            || reference.bit_depth != distorted.bit_depth
        {
            return Err(ContextError::Picture(
                "reference & distorted pictures differ in size or bit depth",
            ));
        }
        if *self.dimensions.get_or_insert((w, h)) != (w, h) {
            return Err(ContextError::Picture("picture size changed mid stream"));
        }

        let skipped = self.is_skipped(index);
        let Self {
            pool,
            extractors,
            collector,
            ..
        } = self;
        let extract = |e: &mut Box<dyn FeatureExtractor>| match skipped && !e.is_temporal() {
            true => Ok(Vec::new()),
            false => e.extract(reference, distorted, index),
        };
        let scores: Vec<Vec<FeatureScore>> = match pool {
            Some(pool) => pool.install(|| {
                extractors
                    .par_iter_mut()
                    .map(extract)
                    .collect::<Result<Vec<_>, ContextError>>()
            })?,
            None => extractors
                .iter_mut()
                .map(extract)
                .collect::<Result<Vec<_>, ContextError>>()?,
        };

        for score in scores.into_iter().flatten() {
            collector.append(score.name, score.value, score.index)?;
        }
        Ok(())
    }

    /// Signal the end of the stream to all extractors. Only the first call has an effect.
    pub fn flush(&mut self) -> Result<(), ContextError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        for extractor in &mut self.extractors {
            for score in extractor.flush()? {
                self.collector.append(score.name, score.value, score.index)?;
            }
        }
        Ok(())
    }

    /// Model prediction at `index`, also collected as the model's feature.
    pub fn score_at_index(&mut self, model: &Model, index: usize) -> Result<f64, ContextError> {
        if let Some(score) = self.collector.get(&model.name, index) {
            return Ok(score);
        }
        let features = model
            .feature_names
            .iter()
            .map(|name| {
                self.collector
                    .get(name, index)
                    .ok_or_else(|| ContextError::MissingFeature {
                        name: name.clone(),
                        index,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let score = model.predict(&features);
        self.import_feature_score(&model.name, score, index)?;
        Ok(score)
    }

    /// Pool model predictions over `low..high`, ignoring frames skipped by subsampling.
    pub fn score_pooled(
        &mut self,
        model: &Model,
        method: PoolingMethod,
        low: usize,
        high: usize,
    ) -> Result<f64, ContextError> {
        if low >= high {
            return Err(ContextError::InvalidRange { low, high });
        }
        self.flush()?;
        let mut scores = Vec::with_capacity(high - low);
        for index in low..high {
            if !self.is_skipped(index) {
                scores.push(self.score_at_index(model, index)?);
            }
        }
        if scores.is_empty() {
            return Err(ContextError::InvalidRange { low, high });
        }
        Ok(method.pool(&scores))
    }

    pub fn write_output(&mut self, out: impl Write, format: OutputFormat) -> Result<(), ContextError> {
        self.flush()?;
        let (width, height) = self.dimensions.unwrap_or_default();
        match format {
            OutputFormat::Xml => output::XmlReport {
                collector: &self.collector,
                version: VERSION,
                width,
                height,
                n_subsample: self.cfg.n_subsample,
            }
            .write(out),
        }
    }

    pub fn version() -> &'static str {
        VERSION
    }
}
