//! Smart album rule engine.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::catalog::{AlbumRule, RuleCatalog};
use super::matcher;
use crate::db::{AlbumKind, Media, MediaLibrary, NewAutoAlbum, SmartAlbum};
use crate::error::RuleError;
use crate::vision::MediaAnalysis;

/// Result of materializing one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    Created { album_id: i64, media_count: usize },
    Updated { album_id: i64, media_count: usize },
    /// Fewer matches than the rule's threshold. Nothing was written.
    Skipped { media_count: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Albums created by this run.
    pub albums: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumSuggestion {
    pub rule_key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub media_count: usize,
    pub can_create: bool,
}

pub struct SmartAlbumEngine {
    library: Arc<dyn MediaLibrary>,
    catalog: RuleCatalog,
}

impl SmartAlbumEngine {
    pub fn new(library: Arc<dyn MediaLibrary>, catalog: RuleCatalog) -> Self {
        Self { library, catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Media of `owner` matching `rule`, newest first.
    pub fn evaluate(&self, owner: &str, rule: &AlbumRule) -> Result<Vec<Media>, RuleError> {
        self.evaluate_at(owner, rule, Utc::now())
    }

    /// Like [`evaluate`](Self::evaluate), with recency windows measured from
    /// `now`.
    pub fn evaluate_at(&self, owner: &str, rule: &AlbumRule, now: DateTime<Utc>) -> Result<Vec<Media>, RuleError> {
        let corpus = self.corpus(owner).map_err(|source| RuleError::Evaluation {
            key: rule.key.clone(),
            source,
        })?;
        Ok(matcher::select(rule, &corpus, now).into_iter().cloned().collect())
    }

    pub fn materialize(&self, owner: &str, rule_key: &str, force_recreate: bool) -> Result<Materialized, RuleError> {
        let rule = self
            .catalog
            .get(rule_key)
            .ok_or_else(|| RuleError::UnknownRule(rule_key.to_string()))?;

        let evaluation = |source: anyhow::Error| RuleError::Evaluation {
            key: rule.key.clone(),
            source,
        };

        if force_recreate {
            if let Some(existing) = self.library.find_auto_album(owner, &rule.key).map_err(evaluation)? {
                self.library.delete_album(existing.id).map_err(evaluation)?;
                tracing::debug!(owner, rule = %rule.key, album_id = existing.id, "Deleted album for recreation");
            }
        }

        let corpus = self.corpus(owner).map_err(evaluation)?;
        self.apply(owner, rule, &corpus, Utc::now()).map_err(evaluation)
    }

    /// Materialize every rule of the catalog. A failing rule is logged and
    /// counted; the batch carries on.
    pub fn create_all(&self, owner: &str, force_recreate: bool) -> AlbumStats {
        let mut stats = AlbumStats::default();
        tracing::info!(owner, rules = self.catalog.len(), force_recreate, "Creating smart albums");

        if force_recreate {
            match self.library.delete_auto_albums(owner) {
                Ok(removed) => tracing::info!(owner, removed, "Deleted auto albums"),
                Err(e) => tracing::error!(owner, error = %e, "Failed to delete auto albums"),
            }
        }

        let corpus = match self.corpus(owner) {
            Ok(corpus) => corpus,
            Err(e) => {
                tracing::error!(owner, error = %e, "Failed to load analyzed media");
                stats.failed = self.catalog.len();
                return stats;
            }
        };
        let now = Utc::now();

        for rule in self.catalog.iter() {
            match self.apply(owner, rule, &corpus, now) {
                Ok(Materialized::Created { album_id, media_count }) => {
                    tracing::info!(rule = %rule.key, album_id, media_count, "Album created");
                    stats.created += 1;
                    stats.albums.push(album_id);
                }
                Ok(Materialized::Updated { album_id, media_count }) => {
                    tracing::info!(rule = %rule.key, album_id, media_count, "Album updated");
                    stats.updated += 1;
                }
                Ok(Materialized::Skipped { media_count }) => {
                    tracing::debug!(rule = %rule.key, media_count, min_media = rule.min_media, "Album skipped");
                    stats.skipped += 1;
                }
                Err(source) => {
                    let error = RuleError::Evaluation {
                        key: rule.key.clone(),
                        source,
                    };
                    tracing::error!(error = %error, "Skipping rule");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            owner,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            "Smart albums done"
        );
        stats
    }

    /// Preview of the albums the catalog would produce. Writes nothing.
    pub fn suggest(&self, owner: &str) -> Result<Vec<AlbumSuggestion>> {
        let corpus = self.corpus(owner)?;
        let now = Utc::now();

        let mut suggestions: Vec<AlbumSuggestion> = self
            .catalog
            .iter()
            .filter_map(|rule| {
                let media_count = matcher::select(rule, &corpus, now).len();
                (media_count > 0).then(|| AlbumSuggestion {
                    rule_key: rule.key.clone(),
                    name: rule.name.clone(),
                    description: rule.description.clone(),
                    icon: rule.icon.clone(),
                    media_count,
                    can_create: media_count >= rule.min_media,
                })
            })
            .collect();

        suggestions.sort_by(|a, b| b.media_count.cmp(&a.media_count));
        Ok(suggestions)
    }

    /// Re-evaluate an auto album against its rule and replace its members,
    /// regardless of the rule's threshold.
    pub fn refresh_album(&self, album_id: i64) -> Result<Option<SmartAlbum>> {
        let Some(album) = self.library.get_album(album_id)? else {
            tracing::warn!(album_id, "Album not found");
            return Ok(None);
        };
        if album.kind != AlbumKind::Auto {
            tracing::warn!(album_id, "Only auto albums can be refreshed");
            return Ok(None);
        }
        let Some(rule) = album.rule_key.as_deref().and_then(|key| self.catalog.get(key)) else {
            tracing::warn!(album_id, rule = ?album.rule_key, "Rule no longer in catalog");
            return Ok(None);
        };

        let matched = self.evaluate(&album.owner, rule)?;
        let ids: Vec<i64> = matched.iter().map(|m| m.id).collect();
        self.library.replace_album_media(album.id, &ids, ids.first().copied())?;
        tracing::info!(album_id, rule = %rule.key, media_count = ids.len(), "Album refreshed");

        self.library.get_album(album.id)
    }

    /// Delete the owner's auto albums that have no members left.
    pub fn prune_empty(&self, owner: &str) -> Result<usize> {
        let mut removed = 0;
        for album in self.library.auto_albums(owner)? {
            if album.media_count == 0 {
                self.library.delete_album(album.id)?;
                removed += 1;
            }
        }
        tracing::info!(owner, removed, "Pruned empty albums");
        Ok(removed)
    }

    fn corpus(&self, owner: &str) -> Result<Vec<(Media, MediaAnalysis)>> {
        self.library.analyzed_images(owner)
    }

    fn apply(
        &self,
        owner: &str,
        rule: &AlbumRule,
        corpus: &[(Media, MediaAnalysis)],
        now: DateTime<Utc>,
    ) -> Result<Materialized> {
        let matched = matcher::select(rule, corpus, now);
        if matched.len() < rule.min_media {
            return Ok(Materialized::Skipped {
                media_count: matched.len(),
            });
        }

        let (album_id, created) = match self.library.find_auto_album(owner, &rule.key)? {
            Some(album) => (album.id, false),
            None => {
                let id = self.library.create_auto_album(&NewAutoAlbum {
                    owner,
                    rule_key: &rule.key,
                    name: &rule.name,
                    description: &rule.description,
                    icon: &rule.icon,
                    rule_snapshot: serde_json::to_value(rule)?,
                })?;
                (id, true)
            }
        };

        let ids: Vec<i64> = matched.iter().map(|m| m.id).collect();
        // Corpus is newest first, so the first match is the cover.
        self.library.replace_album_media(album_id, &ids, ids.first().copied())?;

        let media_count = ids.len();
        Ok(if created {
            Materialized::Created { album_id, media_count }
        } else {
            Materialized::Updated { album_id, media_count }
        })
    }
}
