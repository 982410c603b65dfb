//! Media, analysis and tag operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{
    format_timestamp, now_timestamp, parse_column, parse_json, parse_timestamp, Database, Media, MediaKind,
    MediaTag, StoredAnalysis, TagSource,
};
use crate::vision::MediaAnalysis;

const MEDIA_COLUMNS: &str = "id, owner, kind, path, uploaded_at, is_favorite, analyzed";

pub(crate) fn media_from_row(row: &Row) -> rusqlite::Result<Media> {
    let kind: String = row.get(2)?;
    let uploaded_at: String = row.get(4)?;
    Ok(Media {
        id: row.get(0)?,
        owner: row.get(1)?,
        kind: parse_column(2, &kind)?,
        path: row.get(3)?,
        uploaded_at: parse_timestamp(4, &uploaded_at)?,
        is_favorite: row.get::<_, i64>(5)? != 0,
        analyzed: row.get::<_, i64>(6)? != 0,
    })
}

fn analysis_from_row(row: &Row) -> rusqlite::Result<StoredAnalysis> {
    let created_at: String = row.get(11)?;
    Ok(StoredAnalysis {
        id: row.get(0)?,
        media_id: row.get(1)?,
        analysis: MediaAnalysis {
            objects: parse_json(2, &row.get::<_, String>(2)?)?,
            landmarks: parse_json(3, &row.get::<_, String>(3)?)?,
            colors: parse_json(4, &row.get::<_, String>(4)?)?,
            emotions: parse_json(5, &row.get::<_, String>(5)?)?,
            title: row.get(6)?,
            description: row.get(7)?,
            confidence: row.get::<_, f64>(8)? as f32,
            error: row.get(9)?,
            backend: row.get(10)?,
        },
        created_at: parse_timestamp(11, &created_at)?,
    })
}

impl Database {
    /// Register a media item. Returns `None` when the owner already has a
    /// media item at this path.
    pub fn insert_media(
        &self,
        owner: &str,
        kind: MediaKind,
        path: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO media (owner, kind, path, uploaded_at) VALUES (?, ?, ?, ?)",
            params![owner, kind.as_str(), path, format_timestamp(uploaded_at)],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn get_media(&self, media_id: i64) -> Result<Option<Media>> {
        let conn = self.conn()?;
        let media = conn
            .query_row(
                &format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS),
                [media_id],
                media_from_row,
            )
            .optional()?;
        Ok(media)
    }

    /// All media of an owner, newest first.
    pub fn list_media(&self, owner: &str) -> Result<Vec<Media>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM media WHERE owner = ? ORDER BY uploaded_at DESC, id DESC",
            MEDIA_COLUMNS
        ))?;
        let media = stmt.query_map([owner], media_from_row)?.filter_map(|r| r.ok()).collect();
        Ok(media)
    }

    /// Images waiting for analysis, or every image when `include_analyzed`.
    /// `owner` narrows the selection to one user.
    pub fn images_to_analyze(&self, owner: Option<&str>, include_analyzed: bool) -> Result<Vec<Media>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM media
            WHERE kind = 'image'
              AND (?1 IS NULL OR owner = ?1)
              AND (?2 = 1 OR analyzed = 0)
            ORDER BY id
            "#,
            MEDIA_COLUMNS
        ))?;
        let media = stmt
            .query_map(params![owner, include_analyzed as i64], media_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(media)
    }

    pub fn set_favorite(&self, media_id: i64, favorite: bool) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE media SET is_favorite = ? WHERE id = ?",
            params![favorite as i64, media_id],
        )?;
        Ok(())
    }

    /// Delete a media item with its analyses, tags and album memberships.
    pub fn delete_media(&self, media_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM media WHERE id = ?", [media_id])?;
        Ok(())
    }

    /// Replace the analysis of a media item and regenerate its AI tags from
    /// the top `ai_tag_count` objects. Runs in one transaction.
    pub fn save_analysis(&self, media_id: i64, analysis: &MediaAnalysis, ai_tag_count: usize) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_timestamp();

        tx.execute("DELETE FROM media_analysis WHERE media_id = ?", [media_id])?;
        tx.execute(
            r#"
            INSERT INTO media_analysis
                (media_id, objects, landmarks, colors, emotions, title, description,
                 confidence, error, backend, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                media_id,
                serde_json::to_string(&analysis.objects)?,
                serde_json::to_string(&analysis.landmarks)?,
                serde_json::to_string(&analysis.colors)?,
                serde_json::to_string(&analysis.emotions)?,
                analysis.title,
                analysis.description,
                analysis.confidence as f64,
                analysis.error,
                analysis.backend,
                now,
            ],
        )?;
        let analysis_id = tx.last_insert_rowid();

        tx.execute("UPDATE media SET analyzed = 1 WHERE id = ?", [media_id])?;

        tx.execute(
            "DELETE FROM media_tags WHERE media_id = ? AND source = 'ai'",
            [media_id],
        )?;
        for object in analysis.objects.iter().take(ai_tag_count) {
            tx.execute(
                "INSERT OR IGNORE INTO media_tags (media_id, name, source, confidence, created_at) VALUES (?, ?, 'ai', ?, ?)",
                params![media_id, object.label, object.confidence as f64, now],
            )?;
        }

        tx.commit()?;
        tracing::debug!(media_id, analysis_id, "Analysis saved");
        Ok(analysis_id)
    }

    /// Analyses stored for a media item, oldest first.
    pub fn analyses_for_media(&self, media_id: i64) -> Result<Vec<StoredAnalysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, media_id, objects, landmarks, colors, emotions, title, description,
                   confidence, error, backend, created_at
            FROM media_analysis
            WHERE media_id = ?
            ORDER BY id
            "#,
        )?;
        let analyses = stmt
            .query_map([media_id], analysis_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(analyses)
    }

    /// Image media of an owner paired with their first analysis, newest
    /// first. Media without an analysis are left out.
    pub fn analyzed_images(&self, owner: &str) -> Result<Vec<(Media, MediaAnalysis)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT m.id, m.owner, m.kind, m.path, m.uploaded_at, m.is_favorite, m.analyzed,
                   a.id, a.media_id, a.objects, a.landmarks, a.colors, a.emotions, a.title,
                   a.description, a.confidence, a.error, a.backend, a.created_at
            FROM media m
            JOIN media_analysis a ON a.id = (
                SELECT MIN(id) FROM media_analysis WHERE media_id = m.id
            )
            WHERE m.owner = ? AND m.kind = 'image'
            ORDER BY m.uploaded_at DESC, m.id DESC
            "#,
        )?;
        let rows = stmt
            .query_map([owner], |row| {
                let media = media_from_row(row)?;
                let analysis = MediaAnalysis {
                    objects: parse_json(9, &row.get::<_, String>(9)?)?,
                    landmarks: parse_json(10, &row.get::<_, String>(10)?)?,
                    colors: parse_json(11, &row.get::<_, String>(11)?)?,
                    emotions: parse_json(12, &row.get::<_, String>(12)?)?,
                    title: row.get(13)?,
                    description: row.get(14)?,
                    confidence: row.get::<_, f64>(15)? as f32,
                    error: row.get(16)?,
                    backend: row.get(17)?,
                };
                Ok((media, analysis))
            })?
            .filter_map(|r| match r {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable analysis row");
                    None
                }
            })
            .collect();
        Ok(rows)
    }

    /// Add or overwrite a tag. A manual tag replaces an AI tag of the same name.
    pub fn add_tag(&self, media_id: i64, name: &str, source: TagSource, confidence: f32) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO media_tags (media_id, name, source, confidence, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (media_id, name) DO UPDATE SET source = excluded.source, confidence = excluded.confidence
            "#,
            params![media_id, name, source.as_str(), confidence as f64, now_timestamp()],
        )?;
        Ok(())
    }

    pub fn tags_for_media(&self, media_id: i64) -> Result<Vec<MediaTag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT media_id, name, source, confidence FROM media_tags WHERE media_id = ? ORDER BY confidence DESC, name",
        )?;
        let tags = stmt
            .query_map([media_id], |row| {
                let source: String = row.get(2)?;
                Ok(MediaTag {
                    media_id: row.get(0)?,
                    name: row.get(1)?,
                    source: parse_column(2, &source)?,
                    confidence: row.get::<_, f64>(3)? as f32,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }
}
