//! Feature extractor seam & registry.
use super::{
    ContextError,
    psnr::{FixedPsnr, FloatPsnr},
};
use crate::yuv::Picture;

/// A score produced by an extractor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScore {
    pub name: &'static str,
    pub value: f64,
    pub index: usize,
}

impl FeatureScore {
    pub fn new(name: &'static str, value: f64, index: usize) -> Self {
        Self { name, value, index }
    }
}

/// Turns reference/distorted picture pairs into named feature scores.
pub trait FeatureExtractor: Send {
    /// Extractor name, as used to request it.
    fn name(&self) -> &'static str;

    /// Names of the features this extractor produces.
    fn provided_features(&self) -> &'static [&'static str];

    /// Temporal extractors depend on previous frames so see every frame,
    /// even those skipped by subsampling.
    fn is_temporal(&self) -> bool {
        false
    }

    fn extract(
        &mut self,
        reference: &Picture,
        distorted: &Picture,
        index: usize,
    ) -> Result<Vec<FeatureScore>, ContextError>;

    /// Called once at the end of the stream, may emit trailing scores.
    fn flush(&mut self) -> Result<Vec<FeatureScore>, ContextError> {
        Ok(Vec::new())
    }
}

type Constructor = fn() -> Box<dyn FeatureExtractor>;

fn float_psnr() -> Box<dyn FeatureExtractor> {
    Box::new(FloatPsnr)
}

fn fixed_psnr() -> Box<dyn FeatureExtractor> {
    Box::new(FixedPsnr)
}

const REGISTRY: &[Constructor] = &[float_psnr, fixed_psnr];

/// New extractor instance by extractor name, e.g. `float_psnr`.
pub fn by_name(name: &str) -> Option<Box<dyn FeatureExtractor>> {
    REGISTRY.iter().map(|new| new()).find(|e| e.name() == name)
}

/// New extractor instance providing the feature, e.g. `psnr_cb`.
pub fn by_feature_name(feature: &str) -> Option<Box<dyn FeatureExtractor>> {
    REGISTRY
        .iter()
        .map(|new| new())
        .find(|e| e.provided_features().iter().any(|f| *f == feature))
}
