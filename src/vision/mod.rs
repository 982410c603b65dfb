//! Image analysis pipeline.
//!
//! The [`Analyzer`] runs the color extractor first, then the object, landmark
//! and emotion detectors, then composes a title and description:
//! - [`palette`]: k-means dominant colors with named color families
//! - [`objects`], [`landmarks`], [`emotions`]: classifier-backed detectors with
//!   deterministic heuristic fallbacks
//! - [`describe`]: title and description text
//!
//! Every detector talks to a [`Classifier`]. When it reports
//! [`ClassifierError::Unavailable`](crate::error::ClassifierError) the detector
//! uses its heuristic path instead.

mod analyzer;
pub mod classifier;
pub mod describe;
pub mod emotions;
pub mod landmarks;
pub mod objects;
pub mod palette;
pub mod signatures;

use serde::{Deserialize, Serialize};

pub use analyzer::Analyzer;
pub use classifier::{Classifier, HeuristicClassifier, LabelScore};
pub use describe::DescriptionEnhancer;
pub use emotions::EmotionDetector;
pub use landmarks::LandmarkDetector;
pub use objects::ObjectDetector;
pub use palette::{ColorExtractor, SignaturePalette};

/// Coarse color family assigned to a palette centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFamily {
    White,
    Black,
    Beige,
    Rose,
    Brown,
    Red,
    Green,
    Blue,
    Yellow,
    Magenta,
    Cyan,
    Orange,
    Violet,
    Gray,
    Mixed,
}

impl ColorFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorFamily::White => "white",
            ColorFamily::Black => "black",
            ColorFamily::Beige => "beige",
            ColorFamily::Rose => "rose",
            ColorFamily::Brown => "brown",
            ColorFamily::Red => "red",
            ColorFamily::Green => "green",
            ColorFamily::Blue => "blue",
            ColorFamily::Yellow => "yellow",
            ColorFamily::Magenta => "magenta",
            ColorFamily::Cyan => "cyan",
            ColorFamily::Orange => "orange",
            ColorFamily::Violet => "violet",
            ColorFamily::Gray => "gray",
            ColorFamily::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for ColorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    Nature,
    People,
    Food,
    Transport,
    Architecture,
    Urban,
    General,
}

/// One cluster of the dominant color palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantColor {
    pub rgb: [u8; 3],
    pub hex: String,
    /// Share of the (downsampled) pixels, in percent with one decimal.
    pub percentage: f32,
    pub family: ColorFamily,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub category: ObjectCategory,
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, category: ObjectCategory, confidence: f32) -> Self {
        Self {
            label: label.into(),
            category,
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLandmark {
    pub landmark: String,
    pub place: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEmotion {
    pub emotion: String,
    pub confidence: f32,
    pub keywords: Vec<String>,
}

/// Output of one analysis run. Replaced wholesale on re-analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaAnalysis {
    pub objects: Vec<DetectedObject>,
    pub landmarks: Vec<DetectedLandmark>,
    pub colors: Vec<DominantColor>,
    pub emotions: Vec<DetectedEmotion>,
    pub title: String,
    pub description: String,
    /// Mean object confidence, 0.5 when nothing was detected.
    pub confidence: f32,
    /// Set when one or more stages failed and contributed nothing.
    pub error: Option<String>,
    /// Name of the classifier backend that produced this analysis.
    pub backend: String,
}

/// Round a confidence to three decimals.
pub(crate) fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Sort by confidence descending. Stable, so ties keep insertion order.
pub(crate) fn sort_by_confidence<T>(items: &mut [T], confidence: impl Fn(&T) -> f32) {
    items.sort_by(|a, b| confidence(b).total_cmp(&confidence(a)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(0.9999), 1.0);
    }

    #[test]
    fn test_sort_by_confidence_is_stable() {
        let mut objects = vec![
            DetectedObject::new("a", ObjectCategory::General, 0.5),
            DetectedObject::new("b", ObjectCategory::General, 0.9),
            DetectedObject::new("c", ObjectCategory::General, 0.5),
        ];
        sort_by_confidence(&mut objects, |o| o.confidence);
        let labels: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_color_family_serializes_lowercase() {
        let json = serde_json::to_string(&ColorFamily::Gray).unwrap();
        assert_eq!(json, "\"gray\"");
    }
}
