//! Rule predicates over analyzed media.

use chrono::{DateTime, Duration, Utc};

use super::catalog::AlbumRule;
use crate::db::Media;
use crate::vision::MediaAnalysis;

/// Whether one media item passes every filter of a rule.
///
/// Within a keyword group one hit is enough; every present group has to
/// hit.
pub fn matches(rule: &AlbumRule, media: &Media, analysis: &MediaAnalysis, now: DateTime<Utc>) -> bool {
    if let Some(cutoff) = rule.days_ago.and_then(|days| window_start(now, days)) {
        if media.uploaded_at < cutoff {
            return false;
        }
    }
    if rule.favorites_only && !media.is_favorite {
        return false;
    }

    rule.keyword_groups().all(|(group, keywords)| {
        let haystack = haystack(group, analysis);
        any_keyword(keywords, &haystack)
    })
}

/// Oldest upload time inside a `days`-long window ending at `now`. `None`
/// when the window reaches past the earliest representable date.
fn window_start(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|window| now.checked_sub_signed(window))
}

/// Lowercased strings a keyword group is matched against.
fn haystack(group: &str, analysis: &MediaAnalysis) -> Vec<String> {
    match group {
        "objects" => analysis.objects.iter().map(|o| o.label.to_lowercase()).collect(),
        "landmarks" => analysis
            .landmarks
            .iter()
            .map(|l| format!("{}, {}", l.landmark, l.place).to_lowercase())
            .collect(),
        "emotions" => analysis.emotions.iter().map(|e| e.emotion.to_lowercase()).collect(),
        "colors" => analysis
            .colors
            .iter()
            .flat_map(|c| [c.family.as_str().to_string(), c.hex.to_lowercase()])
            .collect(),
        _ => Vec::new(),
    }
}

fn any_keyword(keywords: &[String], haystack: &[String]) -> bool {
    keywords.iter().any(|keyword| {
        let needle = keyword.to_lowercase();
        haystack.iter().any(|entry| entry.contains(&needle))
    })
}

/// Media of `corpus` matching `rule`, keeping corpus order.
pub fn select<'a>(rule: &AlbumRule, corpus: &'a [(Media, MediaAnalysis)], now: DateTime<Utc>) -> Vec<&'a Media> {
    corpus
        .iter()
        .filter(|(media, analysis)| matches(rule, media, analysis, now))
        .map(|(media, _)| media)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::MediaKind;
    use crate::vision::{
        ColorFamily, DetectedEmotion, DetectedLandmark, DetectedObject, DominantColor, ObjectCategory,
    };

    pub fn media(id: i64, uploaded_at: DateTime<Utc>, favorite: bool) -> Media {
        Media {
            id,
            owner: "alice".to_string(),
            kind: MediaKind::Image,
            path: format!("/photos/{}.jpg", id),
            uploaded_at,
            is_favorite: favorite,
            analyzed: true,
        }
    }

    pub fn with_objects(labels: &[&str]) -> MediaAnalysis {
        MediaAnalysis {
            objects: labels
                .iter()
                .map(|l| DetectedObject::new(*l, ObjectCategory::General, 0.8))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_landmark(landmark: &str, place: &str) -> MediaAnalysis {
        MediaAnalysis {
            landmarks: vec![DetectedLandmark {
                landmark: landmark.to_string(),
                place: place.to_string(),
                confidence: 0.9,
            }],
            ..Default::default()
        }
    }

    pub fn with_emotion(emotion: &str) -> MediaAnalysis {
        MediaAnalysis {
            emotions: vec![DetectedEmotion {
                emotion: emotion.to_string(),
                confidence: 0.6,
                keywords: Vec::new(),
            }],
            ..Default::default()
        }
    }

    pub fn with_color(family: ColorFamily, hex: &str) -> MediaAnalysis {
        MediaAnalysis {
            colors: vec![DominantColor {
                rgb: [0, 0, 0],
                hex: hex.to_string(),
                percentage: 60.0,
                family,
            }],
            ..Default::default()
        }
    }
}
