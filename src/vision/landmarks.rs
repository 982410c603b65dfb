//! Landmark recognition against a small gazetteer, with a color-signature
//! fallback that reports at most one monument.

use std::sync::Arc;

use image::DynamicImage;

use super::classifier::Classifier;
use super::palette::SignaturePalette;
use super::signatures::{self, LANDMARK_PARAMS};
use super::{round3, sort_by_confidence, DetectedLandmark, DominantColor};
use crate::error::ClassifierError;

/// Places and the landmarks scored for each, one classifier call per place.
const GAZETTEER: &[(&str, &[&str])] = &[
    ("Paris", &["Eiffel Tower", "Arc de Triomphe", "Louvre Museum"]),
    ("London", &["Big Ben", "Tower Bridge", "London Eye"]),
    ("New York", &["Statue of Liberty", "Empire State Building", "Brooklyn Bridge"]),
    ("Rome", &["Colosseum", "Trevi Fountain", "Vatican"]),
    ("Dubai", &["Burj Khalifa", "Palm Jumeirah"]),
];

#[derive(Debug, Clone)]
pub struct LandmarkSettings {
    pub threshold: f32,
    pub max_results: usize,
}

impl Default for LandmarkSettings {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            max_results: 3,
        }
    }
}

pub struct LandmarkDetector {
    classifier: Arc<dyn Classifier>,
    settings: LandmarkSettings,
}

impl LandmarkDetector {
    pub fn new(classifier: Arc<dyn Classifier>, settings: LandmarkSettings) -> Self {
        Self { classifier, settings }
    }

    pub fn detect(
        &self,
        image: &DynamicImage,
        signature: &SignaturePalette,
    ) -> Result<Vec<DetectedLandmark>, ClassifierError> {
        match self.classify(image) {
            Ok(landmarks) => Ok(landmarks),
            Err(e) if e.is_unavailable() => Ok(Self::detect_from_palette(signature.colors())),
            Err(e) => Err(e),
        }
    }

    fn classify(&self, image: &DynamicImage) -> Result<Vec<DetectedLandmark>, ClassifierError> {
        let mut detected = Vec::new();

        for (place, landmarks) in GAZETTEER {
            let prompts: Vec<String> = landmarks.iter().map(|l| format!("a photo of {}", l)).collect();
            for score in self.classifier.classify(image, &prompts)? {
                if score.confidence <= self.settings.threshold {
                    continue;
                }
                if let Some(idx) = prompts.iter().position(|p| *p == score.label) {
                    detected.push(DetectedLandmark {
                        landmark: landmarks[idx].to_string(),
                        place: place.to_string(),
                        confidence: round3(score.confidence),
                    });
                }
            }
        }

        sort_by_confidence(&mut detected, |l| l.confidence);
        detected.truncate(self.settings.max_results);
        Ok(detected)
    }

    /// Signature fallback: the first matching signature wins.
    pub fn detect_from_palette(palette: &[DominantColor]) -> Vec<DetectedLandmark> {
        match signatures::match_monument(palette, LANDMARK_PARAMS) {
            Some(found) => {
                let (landmark, place) = found.kind.landmark();
                tracing::debug!(signature = found.signature, landmark, "Landmark signature matched");
                vec![DetectedLandmark {
                    landmark: landmark.to_string(),
                    place: place.to_string(),
                    confidence: round3(found.confidence),
                }]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::classifier::testing::FixedClassifier;
    use crate::vision::palette::ColorExtractor;
    use crate::vision::signatures::testing::palette;
    use crate::vision::{ColorFamily::*, HeuristicClassifier};
    use image::{Rgb, RgbImage};
    use std::num::NonZeroUsize;

    fn detect(detector: &LandmarkDetector, img: &DynamicImage) -> Vec<DetectedLandmark> {
        let extractor = ColorExtractor::default();
        let signature = SignaturePalette::new(img, &extractor, NonZeroUsize::new(8).unwrap());
        detector.detect(img, &signature).unwrap()
    }

    #[test]
    fn test_gazetteer_classification() {
        let classifier = FixedClassifier::new(&[
            ("a photo of Colosseum", 0.81),
            ("a photo of Big Ben", 0.45),
            ("a photo of Burj Khalifa", 0.55),
            ("a photo of Tower Bridge", 0.42),
            ("a photo of Vatican", 0.39),
        ]);
        let detector = LandmarkDetector::new(Arc::new(classifier), LandmarkSettings::default());

        let found = detect(&detector, &DynamicImage::new_rgb8(4, 4));
        let names: Vec<&str> = found.iter().map(|l| l.landmark.as_str()).collect();
        assert_eq!(names, vec!["Colosseum", "Burj Khalifa", "Big Ben"]);
        assert_eq!(found[0].place, "Rome");
        assert_eq!(found[1].place, "Dubai");
    }

    #[test]
    fn test_fallback_single_landmark() {
        let colors = palette(&[(Gray, 35.0), (Blue, 30.0), (Green, 20.0), (Black, 15.0)]);
        let found = LandmarkDetector::detect_from_palette(&colors);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].landmark, "Eiffel Tower");
        assert_eq!(found[0].place, "Paris");
        assert_eq!(found[0].confidence, 0.92);
    }

    #[test]
    fn test_fallback_generic_monument() {
        let colors = palette(&[(Black, 40.0), (Blue, 30.0), (Red, 30.0)]);
        let found = LandmarkDetector::detect_from_palette(&colors);
        assert_eq!(found[0].landmark, "Historic monument");
        assert_eq!(found[0].place, "Unknown");
    }

    #[test]
    fn test_fallback_nothing_without_sky() {
        let colors = palette(&[(Green, 70.0), (Yellow, 30.0)]);
        assert!(LandmarkDetector::detect_from_palette(&colors).is_empty());
    }

    #[test]
    fn test_heuristic_on_image() {
        // Two-thirds light stone over a blue sky band.
        let img = RgbImage::from_fn(60, 60, |_, y| if y < 20 { Rgb([50, 90, 200]) } else { Rgb([235, 235, 235]) });
        let detector = LandmarkDetector::new(Arc::new(HeuristicClassifier), LandmarkSettings::default());

        let found = detect(&detector, &DynamicImage::ImageRgb8(img));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].landmark, "Arc de Triomphe");
    }
}
