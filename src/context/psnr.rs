//! Floating point & fixed point PSNR extractors.
use super::{
    ContextError,
    extractor::{FeatureExtractor, FeatureScore},
};
use crate::yuv::{Picture, Plane};

const EPS: f64 = 1e-10;

fn psnr(mse: f64, peak: f64, psnr_max: f64) -> f64 {
    (10.0 * (peak * peak / mse.max(EPS)).log10()).min(psnr_max)
}

fn ensure_supported_depth(picture: &Picture) -> Result<(), ContextError> {
    match picture.bit_depth {
        8 | 10 => Ok(()),
        _ => Err(ContextError::Picture("only 8 & 10 bit pictures are supported")),
    }
}

/// Luma PSNR over float samples. High bit depth samples are scaled to the 8 bit range
/// so the peak is `255.75` and the ceiling `72`.
#[derive(Debug, Default)]
pub struct FloatPsnr;

impl FeatureExtractor for FloatPsnr {
    fn name(&self) -> &'static str {
        "float_psnr"
    }

    fn provided_features(&self) -> &'static [&'static str] {
        &["float_psnr"]
    }

    fn extract(
        &mut self,
        reference: &Picture,
        distorted: &Picture,
        index: usize,
    ) -> Result<Vec<FeatureScore>, ContextError> {
        ensure_supported_depth(reference)?;
        let (scale, peak, psnr_max) = match reference.bit_depth {
            8 => (1.0, 255.0, 60.0),
            _ => (4.0, 255.75, 72.0),
        };

        let (r, d) = (reference.luma(), distorted.luma());
        let noise: f64 = r
            .data
            .iter()
            .zip(&d.data)
            .map(|(r, d)| {
                let e = f32::from(*r) / scale - f32::from(*d) / scale;
                f64::from(e * e)
            })
            .sum();
        let mse = noise / (r.width * r.height) as f64;

        Ok(vec![FeatureScore::new(
            "float_psnr",
            psnr(mse, peak, psnr_max),
            index,
        )])
    }
}

/// Per plane PSNR over integer sums, ceiling `6 * bpc + 12`.
#[derive(Debug, Default)]
pub struct FixedPsnr;

const FIXED_PSNR_FEATURES: [&str; 3] = ["psnr_y", "psnr_cb", "psnr_cr"];

impl FeatureExtractor for FixedPsnr {
    fn name(&self) -> &'static str {
        "psnr"
    }

    fn provided_features(&self) -> &'static [&'static str] {
        &FIXED_PSNR_FEATURES
    }

    fn extract(
        &mut self,
        reference: &Picture,
        distorted: &Picture,
        index: usize,
    ) -> Result<Vec<FeatureScore>, ContextError> {
        ensure_supported_depth(reference)?;
        let bpc = u32::from(reference.bit_depth);
        let peak = f64::from((1u32 << bpc) - 1);
        let psnr_max = f64::from(6 * bpc + 12);

        Ok(FIXED_PSNR_FEATURES
            .into_iter()
            .zip(reference.planes.iter().zip(&distorted.planes))
            .map(|(name, (r, d))| {
                let mse = sse(r, d) as f64 / (r.width * r.height).max(1) as f64;
                FeatureScore::new(name, psnr(mse, peak, psnr_max), index)
            })
            .collect())
    }
}

fn sse(reference: &Plane, distorted: &Plane) -> u64 {
    reference
        .data
        .iter()
        .zip(&distorted.data)
        .map(|(r, d)| {
            let e = u64::from(r.abs_diff(*d));
            e * e
        })
        .sum()
}
