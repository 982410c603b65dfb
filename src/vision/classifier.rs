//! Zero-shot classification capability shared by all detectors.

use image::DynamicImage;

use crate::error::ClassifierError;

/// A candidate label with the confidence the classifier assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

/// Scores an image against arbitrary text labels.
///
/// Implementations return the labels ranked by confidence, descending.
/// Returning [`ClassifierError::Unavailable`] tells the caller to use its
/// heuristic path; any other error is a detection failure.
pub trait Classifier: Send + Sync {
    /// Backend name recorded on each analysis.
    fn name(&self) -> &'static str;

    fn classify(&self, image: &DynamicImage, labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Backend used when no learned model is loaded: every call reports
/// `Unavailable`, so detectors run their deterministic heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl Classifier for HeuristicClassifier {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn classify(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
        Err(ClassifierError::Unavailable("no learned model loaded".to_string()))
    }
}

/// Softmax over raw logits, used by model-backed classifiers.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; logits.len()]
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Classifier returning fixed scores per prompt; unknown prompts score 0.
    pub struct FixedClassifier {
        pub scores: HashMap<String, f32>,
    }

    impl FixedClassifier {
        pub fn new(scores: &[(&str, f32)]) -> Self {
            Self {
                scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn classify(&self, _image: &DynamicImage, labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
            let mut ranked: Vec<LabelScore> = labels
                .iter()
                .map(|l| LabelScore {
                    label: l.clone(),
                    confidence: self.scores.get(l).copied().unwrap_or(0.0),
                })
                .collect();
            ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            Ok(ranked)
        }
    }

    /// Classifier whose every call fails with an inference error.
    pub struct BrokenClassifier;

    impl Classifier for BrokenClassifier {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn classify(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
            Err(ClassifierError::Inference("session crashed".to_string()))
        }
    }
}
