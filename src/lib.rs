//! Image analysis and rule-based smart albums.
//!
//! [`vision`] turns an image into a [`vision::MediaAnalysis`]: dominant
//! colors, objects, landmarks, moods and a generated title and description.
//! [`albums`] groups analyzed media into auto albums from a rule catalog.
//! Both persist through [`db::Database`].

pub mod albums;
pub mod clip;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod scanner;
pub mod tasks;
pub mod vision;
