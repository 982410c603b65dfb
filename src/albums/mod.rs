//! Rule-based smart albums.
//!
//! A [`RuleCatalog`] describes which media belong in which album. The
//! [`SmartAlbumEngine`] evaluates it against a [`MediaLibrary`](crate::db::MediaLibrary)
//! and writes the resulting auto albums back.

pub mod catalog;
mod engine;
mod matcher;

pub use catalog::{AlbumRule, RuleCatalog};
pub use engine::{AlbumStats, AlbumSuggestion, Materialized, SmartAlbumEngine};
