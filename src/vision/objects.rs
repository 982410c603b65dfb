//! Object detection.
//!
//! With a classifier the image is scored against fixed label groups. Without
//! one, a priority cascade of color heuristics runs instead: a monument or an
//! urban place ends the cascade, so neither can be mistaken for a person.

use std::collections::HashSet;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};

use super::classifier::Classifier;
use super::palette::{is_skin_tone, SignaturePalette};
use super::signatures::{self, ColorProfile, OBJECT_PARAMS};
use super::{round3, sort_by_confidence, ColorFamily, DetectedObject, DominantColor, ObjectCategory};
use crate::error::ClassifierError;

/// Candidate labels scored by the classifier, one call per group.
const LABEL_GROUPS: &[(ObjectCategory, &[&str])] = &[
    (ObjectCategory::Nature, &["tree", "flower", "beach", "mountain", "sky"]),
    (ObjectCategory::People, &["person", "face", "smile"]),
    (ObjectCategory::Food, &["food", "cake", "fruit"]),
    (ObjectCategory::Transport, &["car", "bike", "plane"]),
    (ObjectCategory::Architecture, &["building", "bridge", "tower", "monument"]),
];

const SKIN_FAMILIES: [ColorFamily; 5] = [
    ColorFamily::Beige,
    ColorFamily::Rose,
    ColorFamily::Mixed,
    ColorFamily::Brown,
    ColorFamily::Orange,
];

const CLOTHING_FAMILIES: [ColorFamily; 7] = [
    ColorFamily::Black,
    ColorFamily::White,
    ColorFamily::Gray,
    ColorFamily::Blue,
    ColorFamily::Red,
    ColorFamily::Green,
    ColorFamily::Yellow,
];

#[derive(Debug, Clone)]
pub struct ObjectSettings {
    /// Minimum classifier confidence for a label to be kept.
    pub threshold: f32,
    pub max_results: usize,
    /// Cap applied to the heuristic cascade.
    pub heuristic_max_results: usize,
}

impl Default for ObjectSettings {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_results: 10,
            heuristic_max_results: 5,
        }
    }
}

pub struct ObjectDetector {
    classifier: Arc<dyn Classifier>,
    settings: ObjectSettings,
}

impl ObjectDetector {
    pub fn new(classifier: Arc<dyn Classifier>, settings: ObjectSettings) -> Self {
        Self { classifier, settings }
    }

    /// Detect objects, falling back to the heuristic cascade over
    /// `signature` when the classifier is unavailable. Inference errors are
    /// returned.
    pub fn detect(
        &self,
        image: &DynamicImage,
        signature: &SignaturePalette,
    ) -> Result<Vec<DetectedObject>, ClassifierError> {
        match self.classify(image) {
            Ok(objects) => {
                tracing::debug!(count = objects.len(), "Objects classified");
                Ok(objects)
            }
            Err(e) if e.is_unavailable() => {
                let (width, height) = image.dimensions();
                Ok(self.detect_from_palette(signature.colors(), width, height))
            }
            Err(e) => Err(e),
        }
    }

    fn classify(&self, image: &DynamicImage) -> Result<Vec<DetectedObject>, ClassifierError> {
        let mut detected = Vec::new();

        for (category, labels) in LABEL_GROUPS {
            let prompts: Vec<String> = labels.iter().map(|l| format!("a photo of {}", l)).collect();
            let scores = self.classifier.classify(image, &prompts)?;

            for score in scores {
                if score.confidence <= self.settings.threshold {
                    continue;
                }
                if let Some(idx) = prompts.iter().position(|p| *p == score.label) {
                    detected.push(DetectedObject::new(labels[idx], *category, round3(score.confidence)));
                }
            }
        }

        sort_by_confidence(&mut detected, |o| o.confidence);
        detected.truncate(self.settings.max_results);
        Ok(detected)
    }

    /// Run the heuristic cascade over an already extracted palette.
    pub fn detect_from_palette(&self, palette: &[DominantColor], width: u32, height: u32) -> Vec<DetectedObject> {
        let scene = Scene {
            palette,
            width,
            height,
        };

        let mut detected = Vec::new();
        for (name, stage) in FALLBACK_STAGES {
            match stage(&scene) {
                StageOutcome::Skip => {}
                StageOutcome::Emit(objects) => {
                    tracing::debug!(stage = name, count = objects.len(), "Heuristic stage matched");
                    detected.extend(objects);
                }
                StageOutcome::Terminal(objects) => {
                    tracing::debug!(stage = name, count = objects.len(), "Heuristic stage matched, stopping");
                    detected.extend(objects);
                    break;
                }
            }
        }

        let mut detected = dedup_by_label(detected);
        sort_by_confidence(&mut detected, |o| o.confidence);
        detected.truncate(self.settings.heuristic_max_results);
        detected
    }
}

struct Scene<'a> {
    palette: &'a [DominantColor],
    width: u32,
    height: u32,
}

enum StageOutcome {
    Skip,
    Emit(Vec<DetectedObject>),
    /// Emit and skip every later stage.
    Terminal(Vec<DetectedObject>),
}

type Stage = fn(&Scene) -> StageOutcome;

const FALLBACK_STAGES: &[(&str, Stage)] = &[
    ("monument", monument_stage),
    ("place", place_stage),
    ("person", person_stage),
    ("generic", generic_stage),
];

fn monument_stage(scene: &Scene) -> StageOutcome {
    let Some(found) = signatures::match_monument(scene.palette, OBJECT_PARAMS) else {
        return StageOutcome::Skip;
    };

    let mut objects = vec![
        DetectedObject::new(
            found.kind.object_label(),
            ObjectCategory::Architecture,
            round3(found.confidence),
        ),
        DetectedObject::new("monument", ObjectCategory::Architecture, round3(found.confidence * 0.9)),
    ];

    for color in scene.palette.iter().take(3) {
        let share = color.percentage / 100.0;
        if color.family == ColorFamily::Blue && share > 0.20 {
            objects.push(DetectedObject::new("sky", ObjectCategory::Nature, round3(share * 0.85)));
        } else if matches!(color.family, ColorFamily::Gray | ColorFamily::Beige) && share > 0.15 {
            objects.push(DetectedObject::new("architecture", ObjectCategory::Urban, round3(share * 0.80)));
        }
    }

    StageOutcome::Terminal(objects)
}

fn place_stage(scene: &Scene) -> StageOutcome {
    let profile = ColorProfile::from_palette(scene.palette, OBJECT_PARAMS.depth);

    let pavement = profile.share(ColorFamily::Gray) > 15.0;
    let buildings = profile.any_above(&[ColorFamily::Beige, ColorFamily::White, ColorFamily::Brown], 12.0);
    let sky = profile.share(ColorFamily::Blue) > 10.0;

    if pavement && buildings && sky {
        StageOutcome::Terminal(vec![
            DetectedObject::new("place", ObjectCategory::Urban, 0.80),
            DetectedObject::new("urban space", ObjectCategory::Urban, 0.68),
        ])
    } else {
        StageOutcome::Skip
    }
}

fn person_stage(scene: &Scene) -> StageOutcome {
    let palette = scene.palette;
    let mut indicators = 0u32;
    let mut bonus = 0f32;

    for color in palette {
        if is_skin_tone(color.rgb) {
            indicators += 2;
            bonus += 0.4;
        } else if SKIN_FAMILIES.contains(&color.family) && color.percentage > 5.0 {
            indicators += 1;
            bonus += 0.2;
        }
    }

    if scene.height > 0 {
        let aspect = scene.width as f32 / scene.height as f32;
        if (0.6..=1.4).contains(&aspect) {
            indicators += 1;
            bonus += 0.15;
        }
    }

    let clothing = palette
        .iter()
        .filter(|c| CLOTHING_FAMILIES.contains(&c.family) && c.percentage > 10.0)
        .count();
    if clothing >= 2 {
        indicators += 1;
        bonus += 0.2;
    }

    if palette.len() >= 3 && palette[0].percentage > 30.0 && palette[1].percentage > 10.0 {
        indicators += 1;
        bonus += 0.15;
    }

    if palette.iter().filter(|c| c.percentage > 5.0).count() >= 4 {
        indicators += 1;
        bonus += 0.1;
    }

    if indicators < 2 {
        return StageOutcome::Skip;
    }

    let base = (0.2 * indicators as f32).min(0.85);
    let confidence = round3((base + bonus).min(0.95));
    StageOutcome::Emit(vec![DetectedObject::new("person", ObjectCategory::People, confidence)])
}

fn generic_stage(scene: &Scene) -> StageOutcome {
    let mut objects = Vec::new();

    for color in scene.palette.iter().take(5) {
        let share = color.percentage / 100.0;
        if color.family == ColorFamily::Green && share > 0.15 {
            objects.push(DetectedObject::new("landscape", ObjectCategory::Nature, round3(share * 0.85)));
        }
        if color.family == ColorFamily::Blue && share > 0.25 {
            objects.push(DetectedObject::new("sky", ObjectCategory::Nature, round3(share * 0.90)));
        }
        if matches!(color.family, ColorFamily::Red | ColorFamily::Orange | ColorFamily::Yellow) && share > 0.15 {
            objects.push(DetectedObject::new("colorful scene", ObjectCategory::General, round3(share * 0.70)));
        }
    }

    if objects.is_empty() {
        StageOutcome::Skip
    } else {
        StageOutcome::Emit(objects)
    }
}

/// Keep the first occurrence of each label.
fn dedup_by_label(objects: Vec<DetectedObject>) -> Vec<DetectedObject> {
    let mut seen = HashSet::new();
    objects.into_iter().filter(|o| seen.insert(o.label.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::classifier::testing::{BrokenClassifier, FixedClassifier};
    use crate::vision::palette::ColorExtractor;
    use crate::vision::signatures::testing::palette;
    use std::num::NonZeroUsize;
    use crate::vision::HeuristicClassifier;
    use image::{Rgb, RgbImage};
    use ColorFamily::*;

    fn heuristic() -> ObjectDetector {
        ObjectDetector::new(Arc::new(HeuristicClassifier), ObjectSettings::default())
    }

    fn detect(detector: &ObjectDetector, img: &DynamicImage) -> Result<Vec<DetectedObject>, ClassifierError> {
        let extractor = ColorExtractor::default();
        let signature = SignaturePalette::new(img, &extractor, NonZeroUsize::new(8).unwrap());
        detector.detect(img, &signature)
    }

    fn labels(objects: &[DetectedObject]) -> Vec<&str> {
        objects.iter().map(|o| o.label.as_str()).collect()
    }

    #[test]
    fn test_classifier_path_filters_and_sorts() {
        let classifier = FixedClassifier::new(&[
            ("a photo of beach", 0.7),
            ("a photo of sky", 0.25),
            ("a photo of person", 0.5),
            ("a photo of car", 0.31),
        ]);
        let detector = ObjectDetector::new(Arc::new(classifier), ObjectSettings::default());

        let img = DynamicImage::new_rgb8(8, 8);
        let objects = detect(&detector, &img).unwrap();

        assert_eq!(labels(&objects), vec!["beach", "person", "car"]);
        assert_eq!(objects[0].category, ObjectCategory::Nature);
        assert_eq!(objects[1].category, ObjectCategory::People);
    }

    #[test]
    fn test_inference_error_is_returned() {
        let detector = ObjectDetector::new(Arc::new(BrokenClassifier), ObjectSettings::default());
        let img = DynamicImage::new_rgb8(8, 8);
        assert!(!detect(&detector, &img).unwrap_err().is_unavailable());
    }

    #[test]
    fn test_monument_suppresses_person() {
        // A 1:1 frame with many colors would score as a person on its own.
        let colors = palette(&[
            (Gray, 35.0),
            (Blue, 30.0),
            (Green, 15.0),
            (Black, 10.0),
            (Rose, 6.0),
            (White, 4.0),
        ]);
        let objects = heuristic().detect_from_palette(&colors, 500, 500);
        let found = labels(&objects);

        assert_eq!(found[0], "Eiffel Tower");
        assert!(found.contains(&"monument"));
        assert!(!found.contains(&"person"));
        assert!(!found.contains(&"landscape"));
        assert_eq!(objects[0].confidence, 0.92);
        assert_eq!(objects[1].confidence, 0.828);
    }

    #[test]
    fn test_structure_without_sky_is_a_person() {
        // Skin and brown tones with dark and light clothing, no sky at all.
        let colors = palette(&[(Beige, 30.0), (Brown, 25.0), (Black, 20.0), (White, 15.0), (Gray, 10.0)]);
        let objects = heuristic().detect_from_palette(&colors, 600, 600);
        let found = labels(&objects);

        assert!(!found.contains(&"monument"));
        assert!(!found.contains(&"historic monument"));
        assert_eq!(found, vec!["person"]);
        assert_eq!(objects[0].confidence, 0.95);
    }

    #[test]
    fn test_monument_context_tags() {
        let colors = palette(&[(Gray, 50.0), (Blue, 40.0), (Black, 10.0)]);
        let objects = heuristic().detect_from_palette(&colors, 800, 400);

        let sky = objects.iter().find(|o| o.label == "sky").unwrap();
        assert_eq!(sky.confidence, 0.34);
        let arch = objects.iter().find(|o| o.label == "architecture").unwrap();
        assert_eq!(arch.category, ObjectCategory::Urban);
        assert_eq!(arch.confidence, 0.4);
    }

    #[test]
    fn test_place_is_terminal() {
        // Blue at 11% is below the monument sky threshold but counts for a place.
        let colors = palette(&[
            (Gray, 40.0),
            (White, 20.0),
            (Blue, 11.0),
            (Rose, 10.0),
            (Mixed, 10.0),
            (Black, 9.0),
        ]);
        let objects = heuristic().detect_from_palette(&colors, 600, 600);
        assert_eq!(labels(&objects), vec!["place", "urban space"]);
    }

    #[test]
    fn test_person_confidence() {
        // Skin RGB (+2), skin family (+1), square frame, two clothing colors,
        // a 40/30 split and four colors above 5% push the bonus past the cap.
        let colors = palette(&[(Black, 40.0), (White, 30.0), (Beige, 20.0), (Mixed, 10.0)]);
        let objects = heuristic().detect_from_palette(&colors, 400, 400);

        let person = objects.iter().find(|o| o.label == "person").unwrap();
        assert_eq!(person.category, ObjectCategory::People);
        assert_eq!(person.confidence, 0.95);
    }

    #[test]
    fn test_person_needs_two_indicators() {
        // A wide single-color frame has no person indicators at all.
        let colors = palette(&[(Red, 100.0)]);
        let objects = heuristic().detect_from_palette(&colors, 1000, 200);
        assert!(!labels(&objects).contains(&"person"));
        assert_eq!(labels(&objects), vec!["colorful scene"]);
    }

    #[test]
    fn test_generic_stage() {
        let colors = palette(&[(Green, 60.0), (Red, 40.0)]);
        let objects = heuristic().detect_from_palette(&colors, 1000, 200);

        assert_eq!(labels(&objects), vec!["landscape", "colorful scene"]);
        assert_eq!(objects[0].confidence, 0.51);
        assert_eq!(objects[1].confidence, 0.28);
    }

    #[test]
    fn test_duplicate_labels_keep_first() {
        let colors = palette(&[(Green, 50.0), (Green, 30.0), (Red, 20.0)]);
        let objects = heuristic().detect_from_palette(&colors, 1000, 200);
        let landscapes: Vec<_> = objects.iter().filter(|o| o.label == "landscape").collect();
        assert_eq!(landscapes.len(), 1);
        assert_eq!(landscapes[0].confidence, 0.425);
    }

    #[test]
    fn test_fallback_on_real_image() {
        let img = RgbImage::from_fn(300, 100, |x, _| if x < 200 { Rgb([40, 150, 60]) } else { Rgb([230, 40, 60]) });
        let objects = detect(&heuristic(), &DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(objects[0].label, "landscape");
        assert!(objects.len() <= 5);
    }
}
