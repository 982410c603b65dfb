//! CLIP zero-shot classifier using ONNX Runtime

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::tokenizer::{Tokenizer, CONTEXT_LEN};
use crate::error::ClassifierError;
use crate::vision::classifier::softmax;
use crate::vision::{Classifier, LabelScore};

/// CLIP embedding (512-dimensional vector for ViT-B/32)
pub type ClipEmbedding = Vec<f32>;

// Qdrant's ONNX exports of CLIP ViT-B/32
const VISUAL_MODEL: (&str, &str) = (
    "clip-vit-b32-vision.onnx",
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx",
);
const TEXT_MODEL: (&str, &str) = (
    "clip-vit-b32-text.onnx",
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/model.onnx",
);
const TOKENIZER: (&str, &str) = (
    "clip-vit-b32-tokenizer.json",
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/tokenizer.json",
);

/// CLIP's learned logit scale.
const LOGIT_SCALE: f32 = 100.0;

const INPUT_SIZE: u32 = 224;
// CLIP normalization constants
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Model-backed classifier. Sessions are owned by the value; each one is
/// locked for the duration of a run.
pub struct ClipClassifier {
    visual: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
    /// Prompt embeddings; detectors reuse the same prompts for every image.
    text_cache: Mutex<HashMap<String, ClipEmbedding>>,
}

impl ClipClassifier {
    /// Load the encoders and tokenizer from `model_dir`, downloading any
    /// missing file first.
    pub fn load(model_dir: &Path, intra_threads: usize) -> Result<Self> {
        std::fs::create_dir_all(model_dir)
            .with_context(|| format!("Failed to create model directory {}", model_dir.display()))?;

        let visual_path = ensure_model(model_dir, VISUAL_MODEL)?;
        let text_path = ensure_model(model_dir, TEXT_MODEL)?;
        let tokenizer_path = ensure_model(model_dir, TOKENIZER)?;

        let tokenizer = Tokenizer::from_json(&std::fs::read_to_string(&tokenizer_path)?)?;
        let visual = build_session(&visual_path, intra_threads)?;
        let text = build_session(&text_path, intra_threads)?;

        tracing::info!(dir = %model_dir.display(), "CLIP classifier loaded");
        Ok(Self {
            visual: Mutex::new(visual),
            text: Mutex::new(text),
            tokenizer,
            text_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn embed_image(&self, img: &DynamicImage) -> Result<ClipEmbedding> {
        let input = preprocess(img);
        let input_tensor = Tensor::from_array((
            [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
            input.into_boxed_slice(),
        ))?;

        let mut model = self.visual.lock().map_err(|e| anyhow!("Failed to lock model: {}", e))?;
        let outputs = model.run(ort::inputs!["pixel_values" => input_tensor])?;

        let embedding_output = outputs.iter().next().ok_or_else(|| anyhow!("No embedding output"))?;
        let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;
        Ok(l2_normalize(embedding_data.to_vec()))
    }

    pub fn embed_text(&self, text: &str) -> Result<ClipEmbedding> {
        {
            let cache = self.text_cache.lock().map_err(|e| anyhow!("Failed to lock cache: {}", e))?;
            if let Some(embedding) = cache.get(text) {
                return Ok(embedding.clone());
            }
        }

        let input_ids = self.tokenizer.encode(text);
        let input_tensor = Tensor::from_array(([1usize, CONTEXT_LEN], input_ids.into_boxed_slice()))?;

        let embedding = {
            let mut model = self.text.lock().map_err(|e| anyhow!("Failed to lock model: {}", e))?;
            let outputs = model.run(ort::inputs!["input_ids" => input_tensor])?;

            let embedding_output = outputs.iter().next().ok_or_else(|| anyhow!("No embedding output"))?;
            let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;
            l2_normalize(embedding_data.to_vec())
        };

        self.text_cache
            .lock()
            .map_err(|e| anyhow!("Failed to lock cache: {}", e))?
            .insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn score(&self, img: &DynamicImage, labels: &[String]) -> Result<Vec<LabelScore>> {
        let image_embedding = self.embed_image(img)?;
        let text_embeddings = labels
            .iter()
            .map(|label| self.embed_text(label))
            .collect::<Result<Vec<_>>>()?;
        Ok(zero_shot_scores(&image_embedding, &text_embeddings, labels))
    }
}

impl Classifier for ClipClassifier {
    fn name(&self) -> &'static str {
        "clip"
    }

    fn classify(&self, image: &DynamicImage, labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        self.score(image, labels)
            .map_err(|e| ClassifierError::Inference(format!("{:#}", e)))
    }
}

/// Download a model file if it doesn't exist
fn ensure_model(models_dir: &Path, (filename, url): (&str, &str)) -> Result<PathBuf> {
    let model_path = models_dir.join(filename);

    if !model_path.exists() {
        tracing::info!(model = %filename, "Downloading CLIP model...");
        let response = ureq::get(url)
            .call()
            .map_err(|e| anyhow!("Failed to download model: {}", e))?;

        // Renamed into place once complete
        let partial = model_path.with_extension("part");
        let mut file = std::fs::File::create(&partial)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        std::fs::rename(&partial, &model_path)?;
        tracing::info!(model = %filename, path = ?model_path, "CLIP model downloaded");
    }

    Ok(model_path)
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model {}", path.display()))?;
    Ok(session)
}

/// Resize to 224x224 and normalize into an NCHW buffer.
fn preprocess(img: &DynamicImage) -> Vec<f32> {
    let size = INPUT_SIZE as usize;
    let resized = img.resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mut input = vec![0.0f32; 3 * size * size];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * size + x as usize;
        for channel in 0..3 {
            input[channel * size * size + idx] = (pixel[channel] as f32 / 255.0 - MEAN[channel]) / STD[channel];
        }
    }
    input
}

fn l2_normalize(embedding: Vec<f32>) -> ClipEmbedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter().map(|x| x / norm).collect()
    } else {
        embedding
    }
}

/// Calculate cosine similarity between two CLIP embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Softmax over scaled cosine similarities, ranked descending.
fn zero_shot_scores(image: &[f32], texts: &[ClipEmbedding], labels: &[String]) -> Vec<LabelScore> {
    let logits: Vec<f32> = texts
        .iter()
        .map(|text| LOGIT_SCALE * cosine_similarity(image, text))
        .collect();

    let mut scores: Vec<LabelScore> = labels
        .iter()
        .zip(softmax(&logits))
        .map(|(label, confidence)| LabelScore {
            label: label.clone(),
            confidence,
        })
        .collect();
    scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_zero_shot_scores_ranked() {
        let image = vec![1.0, 0.0];
        let texts = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.6, 0.8]];
        let labels: Vec<String> = ["a photo of car", "a photo of beach", "a photo of sky"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let scores = zero_shot_scores(&image, &texts, &labels);

        assert_eq!(scores[0].label, "a photo of beach");
        assert!(scores[0].confidence > 0.99);
        assert_eq!(scores[2].label, "a photo of car");
        let sum: f32 = scores.iter().map(|s| s.confidence).sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_preprocess_layout() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0])));
        let input = preprocess(&img);
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;

        assert_eq!(input.len(), 3 * plane);
        assert!((input[0] - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-4);
        assert!((input[plane] - (0.0 - MEAN[1]) / STD[1]).abs() < 1e-4);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
