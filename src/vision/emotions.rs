//! Mood detection.

use std::sync::Arc;

use image::DynamicImage;

use super::classifier::Classifier;
use super::{round3, sort_by_confidence, ColorFamily, DetectedEmotion, DominantColor};
use crate::error::ClassifierError;

/// Emotion groups and the keywords prompted for each.
const EMOTION_GROUPS: &[(&str, &[&str])] = &[
    ("joyful", &["happy", "bright", "colorful"]),
    ("peaceful", &["calm", "serene", "quiet"]),
    ("dramatic", &["dark", "intense", "moody"]),
    ("romantic", &["romantic", "love", "candlelight"]),
    ("melancholic", &["sad", "gray", "nostalgic"]),
    ("energetic", &["action", "dynamic", "movement"]),
];

/// Palette-driven moods: (families, emotion, confidence, keywords).
const COLOR_MOODS: &[(&[ColorFamily], &str, f32, &[&str])] = &[
    (&[ColorFamily::Red, ColorFamily::Orange], "energetic", 0.6, &["vibrant", "warm"]),
    (&[ColorFamily::Blue], "peaceful", 0.5, &["calm", "cool"]),
    (&[ColorFamily::Green], "natural", 0.7, &["nature", "fresh"]),
];

#[derive(Debug, Clone)]
pub struct EmotionSettings {
    pub threshold: f32,
    pub max_results: usize,
    pub heuristic_max_results: usize,
}

impl Default for EmotionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.25,
            max_results: 3,
            heuristic_max_results: 2,
        }
    }
}

pub struct EmotionDetector {
    classifier: Arc<dyn Classifier>,
    settings: EmotionSettings,
}

impl EmotionDetector {
    pub fn new(classifier: Arc<dyn Classifier>, settings: EmotionSettings) -> Self {
        Self { classifier, settings }
    }

    /// Detect moods, reading them off `palette` (the image's dominant
    /// colors) when the classifier is unavailable.
    pub fn detect(
        &self,
        image: &DynamicImage,
        palette: &[DominantColor],
    ) -> Result<Vec<DetectedEmotion>, ClassifierError> {
        match self.classify(image) {
            Ok(emotions) => Ok(emotions),
            Err(e) if e.is_unavailable() => Ok(self.detect_from_palette(palette)),
            Err(e) => Err(e),
        }
    }

    fn classify(&self, image: &DynamicImage) -> Result<Vec<DetectedEmotion>, ClassifierError> {
        let mut detected = Vec::new();

        for (emotion, keywords) in EMOTION_GROUPS {
            let prompts: Vec<String> = keywords.iter().map(|k| format!("a {} photo", k)).collect();
            let scores = self.classifier.classify(image, &prompts)?;
            if scores.is_empty() {
                continue;
            }

            let mean = scores.iter().map(|s| s.confidence).sum::<f32>() / scores.len() as f32;
            if mean > self.settings.threshold {
                detected.push(DetectedEmotion {
                    emotion: emotion.to_string(),
                    confidence: round3(mean),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                });
            }
        }

        sort_by_confidence(&mut detected, |e| e.confidence);
        detected.truncate(self.settings.max_results);
        Ok(detected)
    }

    /// Infer moods from the three leading palette colors.
    pub fn detect_from_palette(&self, palette: &[DominantColor]) -> Vec<DetectedEmotion> {
        let leading: Vec<ColorFamily> = palette.iter().take(3).map(|c| c.family).collect();

        COLOR_MOODS
            .iter()
            .filter(|(families, ..)| leading.iter().any(|f| families.contains(f)))
            .take(self.settings.heuristic_max_results)
            .map(|(_, emotion, confidence, keywords)| DetectedEmotion {
                emotion: emotion.to_string(),
                confidence: *confidence,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::classifier::testing::FixedClassifier;
    use crate::vision::signatures::testing::palette;
    use crate::vision::ColorFamily::*;

    fn heuristic() -> EmotionDetector {
        EmotionDetector::new(Arc::new(crate::vision::HeuristicClassifier), EmotionSettings::default())
    }

    #[test]
    fn test_group_scores_are_averaged() {
        let classifier = FixedClassifier::new(&[
            ("a happy photo", 0.6),
            ("a bright photo", 0.3),
            ("a colorful photo", 0.3),
            ("a calm photo", 0.3),
            ("a dark photo", 0.9),
        ]);
        let detector = EmotionDetector::new(Arc::new(classifier), EmotionSettings::default());

        let found = detector.detect(&DynamicImage::new_rgb8(4, 4), &[]).unwrap();
        let names: Vec<&str> = found.iter().map(|e| e.emotion.as_str()).collect();
        // peaceful averages to 0.1 and is dropped.
        assert_eq!(names, vec!["joyful", "dramatic"]);
        assert_eq!(found[0].confidence, 0.4);
        assert_eq!(found[0].keywords, vec!["happy", "bright", "colorful"]);
    }

    #[test]
    fn test_palette_moods_capped_at_two() {
        let colors = palette(&[(Red, 40.0), (Blue, 30.0), (Green, 30.0)]);
        let found = heuristic().detect_from_palette(&colors);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].emotion, "energetic");
        assert_eq!(found[0].confidence, 0.6);
        assert_eq!(found[1].emotion, "peaceful");
    }

    #[test]
    fn test_palette_moods_only_leading_colors() {
        let colors = palette(&[(Gray, 40.0), (White, 30.0), (Black, 20.0), (Green, 10.0)]);
        assert!(heuristic().detect_from_palette(&colors).is_empty());
    }

    #[test]
    fn test_unavailable_classifier_reads_given_palette() {
        let colors = palette(&[(Blue, 60.0), (White, 40.0)]);
        let found = heuristic().detect(&DynamicImage::new_rgb8(4, 4), &colors).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].emotion, "peaceful");
    }

    #[test]
    fn test_natural_mood() {
        let colors = palette(&[(Green, 70.0), (Gray, 30.0)]);
        let found = heuristic().detect_from_palette(&colors);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].emotion, "natural");
        assert_eq!(found[0].keywords, vec!["nature", "fresh"]);
    }
}
