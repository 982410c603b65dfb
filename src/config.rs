use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "SNAPCURATE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub albums: AlbumsConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Palette size stored with each analysis.
    #[serde(default = "default_n_colors")]
    pub n_colors: usize,

    /// Palette size the heuristic object cascade works from.
    #[serde(default = "default_signature_colors")]
    pub signature_colors: usize,

    #[serde(default = "default_max_side")]
    pub max_side: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_kmeans_runs")]
    pub kmeans_runs: usize,

    #[serde(default = "default_kmeans_max_iter")]
    pub kmeans_max_iter: usize,

    #[serde(default = "default_object_threshold")]
    pub object_threshold: f32,

    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    #[serde(default = "default_heuristic_max_objects")]
    pub heuristic_max_objects: usize,

    #[serde(default = "default_landmark_threshold")]
    pub landmark_threshold: f32,

    #[serde(default = "default_max_landmarks")]
    pub max_landmarks: usize,

    #[serde(default = "default_emotion_threshold")]
    pub emotion_threshold: f32,

    #[serde(default = "default_max_emotions")]
    pub max_emotions: usize,

    /// Number of top objects turned into AI tags.
    #[serde(default = "default_ai_tag_count")]
    pub ai_tag_count: usize,
}

fn default_n_colors() -> usize {
    5
}

fn default_signature_colors() -> usize {
    8
}

fn default_max_side() -> u32 {
    300
}

fn default_seed() -> u64 {
    42
}

fn default_kmeans_runs() -> usize {
    4
}

fn default_kmeans_max_iter() -> usize {
    100
}

fn default_object_threshold() -> f32 {
    0.3
}

fn default_max_objects() -> usize {
    10
}

fn default_heuristic_max_objects() -> usize {
    5
}

fn default_landmark_threshold() -> f32 {
    0.4
}

fn default_max_landmarks() -> usize {
    3
}

fn default_emotion_threshold() -> f32 {
    0.25
}

fn default_max_emotions() -> usize {
    3
}

fn default_ai_tag_count() -> usize {
    5
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_colors: default_n_colors(),
            signature_colors: default_signature_colors(),
            max_side: default_max_side(),
            seed: default_seed(),
            kmeans_runs: default_kmeans_runs(),
            kmeans_max_iter: default_kmeans_max_iter(),
            object_threshold: default_object_threshold(),
            max_objects: default_max_objects(),
            heuristic_max_objects: default_heuristic_max_objects(),
            landmark_threshold: default_landmark_threshold(),
            max_landmarks: default_max_landmarks(),
            emotion_threshold: default_emotion_threshold(),
            max_emotions: default_max_emotions(),
            ai_tag_count: default_ai_tag_count(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("analysis.n_colors", self.n_colors),
            ("analysis.signature_colors", self.signature_colors),
            ("analysis.kmeans_runs", self.kmeans_runs),
            ("analysis.kmeans_max_iter", self.kmeans_max_iter),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.max_side == 0 {
            return Err(ConfigError::Zero {
                field: "analysis.max_side",
            });
        }

        let thresholds = [
            ("analysis.object_threshold", self.object_threshold),
            ("analysis.landmark_threshold", self.landmark_threshold),
            ("analysis.emotion_threshold", self.emotion_threshold),
        ];
        for (field, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Load the CLIP model. When false, or when loading fails, detectors use
    /// their heuristic paths.
    #[serde(default = "default_classifier_enabled")]
    pub enabled: bool,

    /// Where models are downloaded to. Defaults to the data directory.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_classifier_enabled() -> bool {
    true
}

fn default_intra_threads() -> usize {
    4
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_classifier_enabled(),
            model_dir: None,
            intra_threads: default_intra_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlbumsConfig {
    /// TOML file replacing the built-in rule catalog.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapcurate")
        .join("snapcurate.db")
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn default_image_extensions() -> Vec<String> {
    strings(&["jpg", "jpeg", "png", "gif", "webp"])
}

fn default_video_extensions() -> Vec<String> {
    strings(&["mp4", "avi", "mov", "webm"])
}

fn default_audio_extensions() -> Vec<String> {
    strings(&["mp3", "wav", "ogg"])
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            audio_extensions: default_audio_extensions(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            analysis: AnalysisConfig::default(),
            classifier: ClassifierConfig::default(),
            albums: AlbumsConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

impl Config {
    /// Load from `SNAPCURATE_CONFIG` or the default location, writing a
    /// default file when none exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load a specific file. Missing keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()
    }

    /// Directory CLIP models are stored in.
    pub fn model_dir(&self) -> PathBuf {
        self.classifier.model_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("snapcurate")
                .join("models")
        })
    }

    fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snapcurate")
            .join("config.toml")
    }
}
