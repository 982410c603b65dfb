//! Storage interface used by the album rule engine.
//!
//! The engine only needs read access to analyzed media and a handful of album
//! writes, so it depends on this trait rather than on [`Database`] directly.

use anyhow::Result;

use super::{Database, Media, NewAutoAlbum, SmartAlbum};
use crate::vision::MediaAnalysis;

pub trait MediaLibrary: Send + Sync {
    /// Image media of an owner with their first analysis, newest first.
    fn analyzed_images(&self, owner: &str) -> Result<Vec<(Media, MediaAnalysis)>>;

    fn get_album(&self, album_id: i64) -> Result<Option<SmartAlbum>>;

    fn find_auto_album(&self, owner: &str, rule_key: &str) -> Result<Option<SmartAlbum>>;

    fn auto_albums(&self, owner: &str) -> Result<Vec<SmartAlbum>>;

    fn create_auto_album(&self, album: &NewAutoAlbum) -> Result<i64>;

    /// Replace membership and cover atomically.
    fn replace_album_media(&self, album_id: i64, media_ids: &[i64], cover: Option<i64>) -> Result<()>;

    fn delete_album(&self, album_id: i64) -> Result<()>;

    fn delete_auto_albums(&self, owner: &str) -> Result<usize>;
}

impl MediaLibrary for Database {
    fn analyzed_images(&self, owner: &str) -> Result<Vec<(Media, MediaAnalysis)>> {
        Database::analyzed_images(self, owner)
    }

    fn get_album(&self, album_id: i64) -> Result<Option<SmartAlbum>> {
        Database::get_album(self, album_id)
    }

    fn find_auto_album(&self, owner: &str, rule_key: &str) -> Result<Option<SmartAlbum>> {
        Database::find_auto_album(self, owner, rule_key)
    }

    fn auto_albums(&self, owner: &str) -> Result<Vec<SmartAlbum>> {
        Database::auto_albums(self, owner)
    }

    fn create_auto_album(&self, album: &NewAutoAlbum) -> Result<i64> {
        Database::create_auto_album(self, album)
    }

    fn replace_album_media(&self, album_id: i64, media_ids: &[i64], cover: Option<i64>) -> Result<()> {
        Database::replace_album_media(self, album_id, media_ids, cover)
    }

    fn delete_album(&self, album_id: i64) -> Result<()> {
        Database::delete_album(self, album_id)
    }

    fn delete_auto_albums(&self, owner: &str) -> Result<usize> {
        Database::delete_auto_albums(self, owner)
    }
}
