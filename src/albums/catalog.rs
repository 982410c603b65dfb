//! Album rule catalog.
//!
//! The built-in catalog can be replaced with a TOML file of `[[rules]]`
//! tables. Rules that fail to deserialize or validate are logged and left
//! out; the rest of the file still loads.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::RuleError;

/// Longest recency window a rule may ask for, about a century.
pub const MAX_DAYS_AGO: u32 = 36_500;

/// One album rule. Keyword groups are optional; a present group must be
/// non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlbumRule {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Matched against detected object labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<String>>,
    /// Matched against `"{landmark}, {place}"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotions: Option<Vec<String>>,
    /// Matched against color family names and hex codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
    /// Only media uploaded within this many days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_ago: Option<u32>,
    #[serde(default)]
    pub favorites_only: bool,
    #[serde(default = "default_min_media")]
    pub min_media: usize,
}

fn default_icon() -> String {
    "📁".to_string()
}

fn default_min_media() -> usize {
    1
}

impl AlbumRule {
    fn new(key: &str, name: &str, description: &str, icon: &str, min_media: usize) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            objects: None,
            landmarks: None,
            emotions: None,
            colors: None,
            days_ago: None,
            favorites_only: false,
            min_media,
        }
    }

    fn objects(mut self, keywords: &[&str]) -> Self {
        self.objects = Some(owned(keywords));
        self
    }

    fn landmarks(mut self, keywords: &[&str]) -> Self {
        self.landmarks = Some(owned(keywords));
        self
    }

    fn emotions(mut self, keywords: &[&str]) -> Self {
        self.emotions = Some(owned(keywords));
        self
    }

    fn colors(mut self, keywords: &[&str]) -> Self {
        self.colors = Some(owned(keywords));
        self
    }

    fn days_ago(mut self, days: u32) -> Self {
        self.days_ago = Some(days);
        self
    }

    fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    /// Keyword groups that are present, with their names.
    pub fn keyword_groups(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [
            ("objects", &self.objects),
            ("landmarks", &self.landmarks),
            ("emotions", &self.emotions),
            ("colors", &self.colors),
        ]
        .into_iter()
        .filter_map(|(name, group)| group.as_deref().map(|g| (name, g)))
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        let malformed = |reason: String| RuleError::Malformed {
            key: self.key.clone(),
            reason,
        };

        if self.key.trim().is_empty() {
            return Err(malformed("key is empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(malformed("name is empty".to_string()));
        }
        if self.min_media == 0 {
            return Err(malformed("min_media must be at least 1".to_string()));
        }
        match self.days_ago {
            Some(0) => return Err(malformed("days_ago must be at least 1".to_string())),
            Some(days) if days > MAX_DAYS_AGO => {
                return Err(malformed(format!("days_ago must be at most {}", MAX_DAYS_AGO)));
            }
            _ => {}
        }
        for (group, keywords) in self.keyword_groups() {
            if keywords.is_empty() {
                return Err(malformed(format!("{} has no keywords", group)));
            }
            if keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(malformed(format!("{} contains a blank keyword", group)));
            }
        }
        Ok(())
    }
}

fn owned(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_string()).collect()
}

/// Ordered set of rules with unique keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCatalog {
    rules: Vec<AlbumRule>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    rules: Vec<toml::Value>,
}

impl RuleCatalog {
    /// Build a catalog, dropping invalid rules and later duplicates of a key.
    pub fn new(rules: Vec<AlbumRule>) -> Self {
        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(rules.len());

        for rule in rules {
            if let Err(e) = rule.validate() {
                tracing::warn!(error = %e, "Dropping album rule");
                continue;
            }
            if !seen.insert(rule.key.clone()) {
                tracing::warn!(key = %rule.key, "Dropping album rule with duplicate key");
                continue;
            }
            accepted.push(rule);
        }

        Self { rules: accepted }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_rules())
    }

    /// Parse a TOML catalog. Only a document that is not valid TOML at all
    /// is an error; individual bad rules are skipped.
    pub fn from_toml(content: &str) -> Result<Self, RuleError> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut rules = Vec::with_capacity(file.rules.len());

        for (index, value) in file.rules.into_iter().enumerate() {
            let key = value
                .get("key")
                .and_then(|k| k.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index));

            match value.try_into::<AlbumRule>() {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    let error = RuleError::Malformed {
                        key,
                        reason: e.message().to_string(),
                    };
                    tracing::warn!(error = %error, "Dropping album rule");
                }
            }
        }

        Ok(Self::new(rules))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule catalog {}", path.display()))?;
        let catalog = Self::from_toml(&content)
            .with_context(|| format!("Failed to load rule catalog {}", path.display()))?;
        tracing::info!(path = %path.display(), rules = catalog.len(), "Loaded rule catalog");
        Ok(catalog)
    }

    pub fn get(&self, key: &str) -> Option<&AlbumRule> {
        self.rules.iter().find(|r| r.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlbumRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_rules() -> Vec<AlbumRule> {
    vec![
        AlbumRule::new("beaches", "Beaches & Sea", "All your beach and seaside photos", "🏖️", 1)
            .objects(&["mer", "plage", "sable", "océan", "beach", "ocean"]),
        AlbumRule::new(
            "monuments",
            "Monuments & Architecture",
            "Monuments and remarkable buildings",
            "🏛️",
            1,
        )
        .objects(&["monument", "building", "architecture", "tower", "château", "église", "place"])
        .landmarks(&[
            "Eiffel Tower",
            "Big Ben",
            "Colosseum",
            "Statue of Liberty",
            "Pyramids",
            "Arc de Triomphe",
            "Historic monument",
        ]),
        AlbumRule::new("nature", "Nature & Landscapes", "Your finest natural landscapes", "🌳", 3).objects(&[
            "tree",
            "forest",
            "mountain",
            "river",
            "lake",
            "landscape",
            "arbre",
            "montagne",
            "forêt",
        ]),
        AlbumRule::new("people", "People", "Photos with people in them", "👥", 1)
            .objects(&["person", "personne", "people", "face", "visage"]),
        AlbumRule::new("food", "Food", "Your culinary photos", "🍕", 2)
            .objects(&["food", "pizza", "burger", "cake", "nourriture", "gâteau"]),
        AlbumRule::new("peaceful", "Peaceful Moments", "Calm and serene atmospheres", "😌", 3)
            .emotions(&["peaceful", "calm", "serene", "quiet"]),
        AlbumRule::new("joyful", "Joyful Moments", "Photos full of joy and happiness", "😊", 3)
            .emotions(&["joyful", "happy", "cheerful", "celebration"]),
        AlbumRule::new("blue_dominant", "Blue Tones", "Photos dominated by blue", "💙", 3)
            .colors(&["bleu", "blue", "cyan", "turquoise"]),
        AlbumRule::new("warm_colors", "Warm Tones", "Warm colors: red, orange and yellow", "🧡", 3)
            .colors(&["rouge", "orange", "jaune", "red", "yellow"]),
        AlbumRule::new("recent", "This Week", "Photos uploaded this week", "📅", 2).days_ago(7),
        AlbumRule::new("this_month", "This Month", "Photos uploaded this month", "📆", 3).days_ago(30),
        AlbumRule::new("favorites", "Favorites", "Your favorite photos", "⭐", 1).favorites_only(),
    ]
}
