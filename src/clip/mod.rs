//! CLIP (Contrastive Language-Image Pre-training) zero-shot classification
//!
//! Provides the model-backed [`Classifier`] used by the detectors. When the
//! model cannot be loaded the heuristic classifier takes its place.

mod model;
mod tokenizer;

pub use model::{cosine_similarity, ClipClassifier, ClipEmbedding};
pub use tokenizer::Tokenizer;

use std::sync::Arc;

use crate::config::Config;
use crate::vision::{Classifier, HeuristicClassifier};

/// Build the configured classifier backend.
pub fn load_classifier(config: &Config) -> Arc<dyn Classifier> {
    if !config.classifier.enabled {
        tracing::info!("CLIP classifier disabled, using heuristics");
        return Arc::new(HeuristicClassifier);
    }

    match ClipClassifier::load(&config.model_dir(), config.classifier.intra_threads) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "CLIP classifier unavailable, using heuristics");
            Arc::new(HeuristicClassifier)
        }
    }
}
