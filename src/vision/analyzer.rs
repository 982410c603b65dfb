use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use super::classifier::Classifier;
use super::describe::DescriptionEnhancer;
use super::emotions::{EmotionDetector, EmotionSettings};
use super::landmarks::{LandmarkDetector, LandmarkSettings};
use super::objects::{ObjectDetector, ObjectSettings};
use super::palette::{ColorExtractor, PaletteSettings, SignaturePalette};
use super::{round3, DetectedEmotion, DetectedLandmark, DetectedObject, DominantColor, MediaAnalysis};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ClassifierError, ConfigError, Stage};

/// Runs every detector over one image and composes the result.
///
/// A failing detector contributes nothing and is recorded in
/// [`MediaAnalysis::error`]; analysis itself never fails.
pub struct Analyzer {
    classifier: Arc<dyn Classifier>,
    extractor: ColorExtractor,
    objects: ObjectDetector,
    landmarks: LandmarkDetector,
    emotions: EmotionDetector,
    enhancer: DescriptionEnhancer,
    n_colors: NonZeroUsize,
    /// Palette size shared by the object and landmark fallbacks.
    signature_colors: NonZeroUsize,
}

impl Analyzer {
    pub fn new(classifier: Arc<dyn Classifier>, config: &AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let n_colors = non_zero(config.n_colors, "analysis.n_colors")?;
        let signature_colors = non_zero(config.signature_colors, "analysis.signature_colors")?;

        let extractor = ColorExtractor::new(PaletteSettings {
            max_side: config.max_side,
            seed: config.seed,
            runs: config.kmeans_runs,
            max_iter: config.kmeans_max_iter,
        });

        let objects = ObjectDetector::new(
            Arc::clone(&classifier),
            ObjectSettings {
                threshold: config.object_threshold,
                max_results: config.max_objects,
                heuristic_max_results: config.heuristic_max_objects,
            },
        );
        let landmarks = LandmarkDetector::new(
            Arc::clone(&classifier),
            LandmarkSettings {
                threshold: config.landmark_threshold,
                max_results: config.max_landmarks,
            },
        );
        let emotions = EmotionDetector::new(
            Arc::clone(&classifier),
            EmotionSettings {
                threshold: config.emotion_threshold,
                max_results: config.max_emotions,
                ..EmotionSettings::default()
            },
        );

        Ok(Self {
            classifier,
            extractor,
            objects,
            landmarks,
            emotions,
            enhancer: DescriptionEnhancer,
            n_colors,
            signature_colors,
        })
    }

    /// Name of the classifier backend in use.
    pub fn backend(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn load(path: &Path) -> Result<DynamicImage, AnalysisError> {
        Ok(image::open(path)?)
    }

    /// Load and analyze an image file. A load failure yields an empty
    /// analysis carrying the error.
    pub fn analyze_path(&self, path: &Path) -> MediaAnalysis {
        match Self::load(path) {
            Ok(image) => self.analyze(&image),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not load image for analysis");
                let mut analysis = self.compose(Vec::new(), Vec::new(), Vec::new(), Vec::new());
                analysis.error = Some(e.to_string());
                analysis
            }
        }
    }

    pub fn analyze(&self, image: &DynamicImage) -> MediaAnalysis {
        let mut errors = Vec::new();

        let colors = self.extractor.extract(image, self.n_colors);
        let signature = SignaturePalette::new(image, &self.extractor, self.signature_colors);

        let objects = collect(Stage::Objects, self.objects.detect(image, &signature), &mut errors);
        let landmarks = collect(Stage::Landmarks, self.landmarks.detect(image, &signature), &mut errors);
        let emotions = collect(Stage::Emotions, self.emotions.detect(image, &colors), &mut errors);

        let mut analysis = self.compose(objects, landmarks, colors, emotions);
        if !errors.is_empty() {
            analysis.error = Some(errors.join("; "));
        }

        tracing::debug!(
            backend = %analysis.backend,
            objects = analysis.objects.len(),
            landmarks = analysis.landmarks.len(),
            emotions = analysis.emotions.len(),
            confidence = analysis.confidence,
            "Image analyzed"
        );
        analysis
    }

    fn compose(
        &self,
        objects: Vec<DetectedObject>,
        landmarks: Vec<DetectedLandmark>,
        colors: Vec<DominantColor>,
        emotions: Vec<DetectedEmotion>,
    ) -> MediaAnalysis {
        let title = self.enhancer.title(&objects, &emotions, &landmarks, &colors);
        let description = self.enhancer.description(&objects, &emotions, &landmarks, &colors);

        let confidence = if objects.is_empty() {
            0.5
        } else {
            round3(objects.iter().map(|o| o.confidence).sum::<f32>() / objects.len() as f32)
        };

        MediaAnalysis {
            objects,
            landmarks,
            colors,
            emotions,
            title,
            description,
            confidence,
            error: None,
            backend: self.classifier.name().to_string(),
        }
    }
}

fn non_zero(value: usize, field: &'static str) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or(ConfigError::Zero { field })
}

/// Unwrap a detector result, recording a stage failure instead of propagating it.
fn collect<T>(stage: Stage, result: Result<Vec<T>, ClassifierError>, errors: &mut Vec<String>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(source) => {
            let err = AnalysisError::DetectionFailure { stage, source };
            tracing::warn!(stage = %stage, error = %err, "Detection stage failed");
            errors.push(err.to_string());
            Vec::new()
        }
    }
}
