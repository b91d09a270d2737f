use super::ContextError;

/// Per-frame scores of a single feature. Frames that were not scored are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub name: String,
    scores: Vec<Option<f64>>,
}

impl FeatureVector {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            scores: Vec::new(),
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.scores.get(index).copied().flatten()
    }

    /// One past the highest scored index.
    pub fn len(&self) -> usize {
        self.scores.len()
    }
}

/// Collects feature scores by name & frame index, in registration order.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollector {
    features: Vec<FeatureVector>,
}

impl FeatureCollector {
    pub fn append(&mut self, name: &str, value: f64, index: usize) -> Result<(), ContextError> {
        let idx = match self.features.iter().position(|f| f.name == name) {
            Some(idx) => idx,
            None => {
                self.features.push(FeatureVector::new(name));
                self.features.len() - 1
            }
        };
        let feature = &mut self.features[idx];
        if feature.scores.len() <= index {
            feature.scores.resize(index + 1, None);
        }
        if feature.scores[index].is_some() {
            return Err(ContextError::DuplicateScore {
                name: name.into(),
                index,
            });
        }
        feature.scores[index] = Some(value);
        Ok(())
    }

    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.feature(name)?.get(index)
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureVector> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn features(&self) -> impl Iterator<Item = &FeatureVector> {
        self.features.iter()
    }

    /// One past the highest index scored by any feature.
    pub fn frame_count(&self) -> usize {
        self.features.iter().map(FeatureVector::len).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn append_sparse() {
        let mut collector = FeatureCollector::default();
        collector.append("float_psnr", 30.5, 0).unwrap();
        collector.append("float_psnr", 31.5, 2).unwrap();
        collector.append("motion2", 3.8, 1).unwrap();

        assert_eq!(collector.get("float_psnr", 0), Some(30.5));
        assert_eq!(collector.get("float_psnr", 1), None);
        assert_eq!(collector.get("float_psnr", 2), Some(31.5));
        assert_eq!(collector.get("adm2", 0), None);
        assert_eq!(collector.frame_count(), 3);

        let names: Vec<_> = collector.features().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["float_psnr", "motion2"]);
    }

    #[test]
    fn duplicate_score() {
        let mut collector = FeatureCollector::default();
        collector.append("psnr_y", 40.0, 3).unwrap();
        let err = collector.append("psnr_y", 41.0, 3).unwrap_err();
        assert!(
            matches!(err, ContextError::DuplicateScore { ref name, index: 3 } if name == "psnr_y"),
            "{err}"
        );
        assert_eq!(collector.get("psnr_y", 3), Some(40.0));
    }
}
