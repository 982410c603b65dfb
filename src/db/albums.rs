//! Album types and operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::str::FromStr;

use super::{now_timestamp, parse_column, parse_json, parse_timestamp, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumKind {
    /// Created and rewritten by the rule engine.
    Auto,
    /// Curated by the user; never touched by the engine.
    Manual,
}

impl AlbumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumKind::Auto => "auto",
            AlbumKind::Manual => "manual",
        }
    }
}

impl FromStr for AlbumKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(AlbumKind::Auto),
            "manual" => Ok(AlbumKind::Manual),
            other => Err(format!("unknown album kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmartAlbum {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub kind: AlbumKind,
    pub rule_key: Option<String>,
    /// Rule as it was when the album was created.
    pub rule_snapshot: Option<serde_json::Value>,
    pub cover_media_id: Option<i64>,
    pub media_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of an auto album created by the rule engine.
#[derive(Debug, Clone)]
pub struct NewAutoAlbum<'a> {
    pub owner: &'a str,
    pub rule_key: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub icon: &'a str,
    pub rule_snapshot: serde_json::Value,
}

const ALBUM_SELECT: &str = r#"
    SELECT a.id, a.owner, a.name, a.description, a.icon, a.kind, a.rule_key, a.rule_snapshot,
           a.cover_media_id, a.created_at, a.updated_at,
           (SELECT COUNT(*) FROM smart_album_media sam WHERE sam.album_id = a.id)
    FROM smart_albums a
"#;

fn album_from_row(row: &Row) -> rusqlite::Result<SmartAlbum> {
    let kind: String = row.get(5)?;
    let snapshot: Option<String> = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(SmartAlbum {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        kind: parse_column(5, &kind)?,
        rule_key: row.get(6)?,
        rule_snapshot: snapshot.map(|s| parse_json(7, &s)).transpose()?,
        cover_media_id: row.get(8)?,
        created_at: parse_timestamp(9, &created_at)?,
        updated_at: parse_timestamp(10, &updated_at)?,
        media_count: row.get::<_, i64>(11)? as usize,
    })
}

impl Database {
    pub fn create_auto_album(&self, album: &NewAutoAlbum) -> Result<i64> {
        let conn = self.conn()?;
        let now = now_timestamp();
        conn.execute(
            r#"
            INSERT INTO smart_albums
                (owner, name, description, icon, kind, rule_key, rule_snapshot, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'auto', ?, ?, ?, ?)
            "#,
            params![
                album.owner,
                album.name,
                album.description,
                album.icon,
                album.rule_key,
                serde_json::to_string(&album.rule_snapshot)?,
                now,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_manual_album(&self, owner: &str, name: &str, description: &str) -> Result<i64> {
        let conn = self.conn()?;
        let now = now_timestamp();
        conn.execute(
            r#"
            INSERT INTO smart_albums (owner, name, description, kind, created_at, updated_at)
            VALUES (?, ?, ?, 'manual', ?, ?)
            "#,
            params![owner, name, description, now, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_album(&self, album_id: i64) -> Result<Option<SmartAlbum>> {
        let conn = self.conn()?;
        let album = conn
            .query_row(&format!("{} WHERE a.id = ?", ALBUM_SELECT), [album_id], album_from_row)
            .optional()?;
        Ok(album)
    }

    pub fn find_auto_album(&self, owner: &str, rule_key: &str) -> Result<Option<SmartAlbum>> {
        let conn = self.conn()?;
        let album = conn
            .query_row(
                &format!("{} WHERE a.owner = ? AND a.rule_key = ? AND a.kind = 'auto'", ALBUM_SELECT),
                params![owner, rule_key],
                album_from_row,
            )
            .optional()?;
        Ok(album)
    }

    /// All albums of an owner, by name.
    pub fn list_albums(&self, owner: &str) -> Result<Vec<SmartAlbum>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE a.owner = ? ORDER BY a.name, a.id", ALBUM_SELECT))?;
        let albums = stmt.query_map([owner], album_from_row)?.filter_map(|r| r.ok()).collect();
        Ok(albums)
    }

    pub fn auto_albums(&self, owner: &str) -> Result<Vec<SmartAlbum>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE a.owner = ? AND a.kind = 'auto' ORDER BY a.id",
            ALBUM_SELECT
        ))?;
        let albums = stmt.query_map([owner], album_from_row)?.filter_map(|r| r.ok()).collect();
        Ok(albums)
    }

    /// Member media ids, most recently uploaded first.
    pub fn album_media(&self, album_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT m.id FROM smart_album_media sam
            JOIN media m ON m.id = sam.media_id
            WHERE sam.album_id = ?
            ORDER BY m.uploaded_at DESC, m.id DESC
            "#,
        )?;
        let ids = stmt.query_map([album_id], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
        Ok(ids)
    }

    pub fn add_media_to_album(&self, album_id: i64, media_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO smart_album_media (album_id, media_id, added_at) VALUES (?, ?, ?)",
            params![album_id, media_id, now_timestamp()],
        )?;
        Ok(())
    }

    /// Replace album membership and cover in one transaction.
    pub fn replace_album_media(&self, album_id: i64, media_ids: &[i64], cover: Option<i64>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_timestamp();

        tx.execute("DELETE FROM smart_album_media WHERE album_id = ?", [album_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO smart_album_media (album_id, media_id, added_at) VALUES (?, ?, ?)",
            )?;
            for media_id in media_ids {
                insert.execute(params![album_id, media_id, now])?;
            }
        }
        tx.execute(
            "UPDATE smart_albums SET cover_media_id = ?, updated_at = ? WHERE id = ?",
            params![cover, now, album_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn delete_album(&self, album_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM smart_albums WHERE id = ?", [album_id])?;
        Ok(())
    }

    /// Delete every auto album of an owner. Returns how many were removed.
    pub fn delete_auto_albums(&self, owner: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM smart_albums WHERE owner = ? AND kind = 'auto'",
            [owner],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MediaKind;
    use chrono::TimeZone;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn new_album<'a>(owner: &'a str, key: &'a str) -> NewAutoAlbum<'a> {
        NewAutoAlbum {
            owner,
            rule_key: key,
            name: "Beaches",
            description: "Seaside memories",
            icon: "beach",
            rule_snapshot: serde_json::json!({ "key": key, "min_media": 1 }),
        }
    }

    #[test]
    fn test_auto_album_lookup_by_rule() {
        let db = db();
        let id = db.create_auto_album(&new_album("alice", "beaches")).unwrap();

        let found = db.find_auto_album("alice", "beaches").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.kind, AlbumKind::Auto);
        assert_eq!(found.rule_snapshot.unwrap()["min_media"], 1);
        assert!(db.find_auto_album("bob", "beaches").unwrap().is_none());
    }

    #[test]
    fn test_one_auto_album_per_rule_and_owner() {
        let db = db();
        db.create_auto_album(&new_album("alice", "beaches")).unwrap();
        assert!(db.create_auto_album(&new_album("alice", "beaches")).is_err());
        assert!(db.create_auto_album(&new_album("bob", "beaches")).is_ok());
    }

    #[test]
    fn test_replace_membership_and_cover() {
        let db = db();
        let t = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let a = db.insert_media("alice", MediaKind::Image, "/a.jpg", t(1)).unwrap().unwrap();
        let b = db.insert_media("alice", MediaKind::Image, "/b.jpg", t(2)).unwrap().unwrap();
        let c = db.insert_media("alice", MediaKind::Image, "/c.jpg", t(3)).unwrap().unwrap();
        let album = db.create_auto_album(&new_album("alice", "beaches")).unwrap();

        db.replace_album_media(album, &[a, b], Some(b)).unwrap();
        db.replace_album_media(album, &[c, a], Some(c)).unwrap();

        assert_eq!(db.album_media(album).unwrap(), vec![c, a]);
        let stored = db.get_album(album).unwrap().unwrap();
        assert_eq!(stored.cover_media_id, Some(c));
        assert_eq!(stored.media_count, 2);
    }

    #[test]
    fn test_delete_auto_albums_keeps_manual() {
        let db = db();
        db.create_auto_album(&new_album("alice", "beaches")).unwrap();
        let manual = db.create_manual_album("alice", "Trip", "").unwrap();

        assert_eq!(db.delete_auto_albums("alice").unwrap(), 1);
        let remaining: Vec<i64> = db.list_albums("alice").unwrap().iter().map(|a| a.id).collect();
        assert_eq!(remaining, vec![manual]);
    }

    #[test]
    fn test_deleting_media_clears_cover() {
        let db = db();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = db.insert_media("alice", MediaKind::Image, "/a.jpg", t).unwrap().unwrap();
        let album = db.create_auto_album(&new_album("alice", "beaches")).unwrap();
        db.replace_album_media(album, &[a], Some(a)).unwrap();

        db.delete_media(a).unwrap();
        let stored = db.get_album(album).unwrap().unwrap();
        assert_eq!(stored.cover_media_id, None);
        assert_eq!(stored.media_count, 0);
    }
}
