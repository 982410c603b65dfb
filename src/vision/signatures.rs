//! Ordered color signatures for monuments.
//!
//! The table is shared by the landmark detector and the monument stage of the
//! object detector. Order is significant: the first signature that matches
//! wins, so a palette can only ever produce one monument.

use std::collections::HashMap;

use super::{ColorFamily, DominantColor};

const GREENERY_MIN: f32 = 8.0;
const DESERT: [ColorFamily; 4] = [
    ColorFamily::Beige,
    ColorFamily::Orange,
    ColorFamily::Yellow,
    ColorFamily::Brown,
];
const STRUCTURE: [ColorFamily; 5] = [
    ColorFamily::Gray,
    ColorFamily::Brown,
    ColorFamily::Black,
    ColorFamily::Beige,
    ColorFamily::Orange,
];

/// Largest share (percent) per color family among the leading palette entries.
#[derive(Debug, Clone, Default)]
pub struct ColorProfile {
    shares: HashMap<ColorFamily, f32>,
}

impl ColorProfile {
    pub fn from_palette(palette: &[DominantColor], depth: usize) -> Self {
        let mut shares: HashMap<ColorFamily, f32> = HashMap::new();
        for color in palette.iter().take(depth) {
            let entry = shares.entry(color.family).or_insert(0.0);
            if color.percentage > *entry {
                *entry = color.percentage;
            }
        }
        Self { shares }
    }

    pub fn share(&self, family: ColorFamily) -> f32 {
        self.shares.get(&family).copied().unwrap_or(0.0)
    }

    pub fn any_above(&self, families: &[ColorFamily], threshold: f32) -> bool {
        families.iter().any(|f| self.share(*f) > threshold)
    }

    pub fn sum(&self, families: &[ColorFamily]) -> f32 {
        families.iter().map(|f| self.share(*f)).sum()
    }
}

/// How much of the palette to look at and what counts as blue sky.
#[derive(Debug, Clone, Copy)]
pub struct SignatureParams {
    pub depth: usize,
    pub sky_threshold: f32,
    /// Whether the generic monument needs blue sky on top of its
    /// structural indicators.
    pub generic_needs_sky: bool,
}

/// Parameters used by the object detector's monument stage.
pub const OBJECT_PARAMS: SignatureParams = SignatureParams {
    depth: 6,
    sky_threshold: 12.0,
    generic_needs_sky: true,
};

/// Parameters used by the landmark detector.
pub const LANDMARK_PARAMS: SignatureParams = SignatureParams {
    depth: 5,
    sky_threshold: 10.0,
    generic_needs_sky: false,
};

/// Derived facts the signature predicates are written against.
pub struct SceneFacts {
    pub profile: ColorProfile,
    pub blue_sky: bool,
    pub greenery: bool,
    pub white_stone: bool,
    pub generic_needs_sky: bool,
}

impl SceneFacts {
    pub fn new(palette: &[DominantColor], params: SignatureParams) -> Self {
        let profile = ColorProfile::from_palette(palette, params.depth);
        Self {
            blue_sky: profile.share(ColorFamily::Blue) > params.sky_threshold,
            greenery: profile.share(ColorFamily::Green) > GREENERY_MIN,
            white_stone: profile.share(ColorFamily::White) > 15.0 || profile.share(ColorFamily::Beige) > 18.0,
            generic_needs_sky: params.generic_needs_sky,
            profile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonumentKind {
    TriumphalArch,
    Tower,
    Pyramid,
    Generic,
}

impl MonumentKind {
    /// Label emitted by the object detector.
    pub fn object_label(&self) -> &'static str {
        match self {
            MonumentKind::TriumphalArch => "Arc de Triomphe",
            MonumentKind::Tower => "Eiffel Tower",
            MonumentKind::Pyramid => "Pyramids of Giza",
            MonumentKind::Generic => "historic monument",
        }
    }

    /// (landmark, place) emitted by the landmark detector.
    pub fn landmark(&self) -> (&'static str, &'static str) {
        match self {
            MonumentKind::TriumphalArch => ("Arc de Triomphe", "Paris"),
            MonumentKind::Tower => ("Eiffel Tower", "Paris"),
            MonumentKind::Pyramid => ("Pyramids of Giza", "Cairo, Egypt"),
            MonumentKind::Generic => ("Historic monument", "Unknown"),
        }
    }
}

pub struct Signature {
    pub name: &'static str,
    pub kind: MonumentKind,
    /// Returns the confidence when the signature matches.
    pub matches: fn(&SceneFacts) -> Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureMatch {
    pub signature: &'static str,
    pub kind: MonumentKind,
    pub confidence: f32,
}

pub const MONUMENT_SIGNATURES: &[Signature] = &[
    Signature {
        name: "triumphal-arch",
        kind: MonumentKind::TriumphalArch,
        matches: triumphal_arch,
    },
    Signature {
        name: "tower",
        kind: MonumentKind::Tower,
        matches: tower_with_greenery,
    },
    Signature {
        name: "tower-close-up",
        kind: MonumentKind::Tower,
        matches: tower_close_up,
    },
    Signature {
        name: "pyramid",
        kind: MonumentKind::Pyramid,
        matches: pyramid,
    },
    Signature {
        name: "generic-monument",
        kind: MonumentKind::Generic,
        matches: generic_monument,
    },
];

/// Evaluate the signature table in order; the first match wins.
pub fn match_monument(palette: &[DominantColor], params: SignatureParams) -> Option<SignatureMatch> {
    let facts = SceneFacts::new(palette, params);
    MONUMENT_SIGNATURES.iter().find_map(|sig| {
        (sig.matches)(&facts).map(|confidence| SignatureMatch {
            signature: sig.name,
            kind: sig.kind,
            confidence,
        })
    })
}

/// Light stone under blue sky with no significant greenery.
fn triumphal_arch(facts: &SceneFacts) -> Option<f32> {
    (facts.white_stone && facts.blue_sky && !facts.greenery).then_some(0.88)
}

/// Dark metallic structure, blue sky and a park around it.
fn tower_with_greenery(facts: &SceneFacts) -> Option<f32> {
    let dark = facts.profile.any_above(&[ColorFamily::Brown, ColorFamily::Gray], 10.0);
    (dark && facts.blue_sky && facts.greenery).then_some(0.92)
}

/// Metallic structure against the sky, photographed too close to show grass.
fn tower_close_up(facts: &SceneFacts) -> Option<f32> {
    let metallic = facts.profile.any_above(&[ColorFamily::Gray, ColorFamily::Brown], 12.0);
    (metallic && facts.blue_sky && !facts.white_stone).then_some(0.85)
}

fn pyramid(facts: &SceneFacts) -> Option<f32> {
    let desert = facts.profile.sum(&DESERT);
    if desert > 35.0 && facts.blue_sky {
        Some(if desert > 40.0 { 0.88 } else { 0.85 })
    } else {
        None
    }
}

fn generic_monument(facts: &SceneFacts) -> Option<f32> {
    if facts.generic_needs_sky && !facts.blue_sky {
        return None;
    }
    let indicators = structural_indicators(facts);
    (indicators >= 3).then(|| (0.60 + 0.05 * (indicators - 3) as f32).min(0.70))
}

/// Weighted count of generic "outdoor structure" cues.
pub fn structural_indicators(facts: &SceneFacts) -> u32 {
    let mut indicators = 0;
    if facts.blue_sky {
        indicators += 1;
    }
    if facts.profile.any_above(&STRUCTURE, 15.0) {
        indicators += 2;
    }
    if facts.profile.any_above(&DESERT, 20.0) && facts.profile.sum(&DESERT) > 30.0 {
        indicators += 2;
    }
    indicators
}


#[cfg(test)]
mod tests {
    use super::testing::palette;
    use super::*;
    use ColorFamily::*;

    #[test]
    fn test_profile_keeps_largest_share() {
        let colors = palette(&[(Blue, 30.0), (Gray, 20.0), (Blue, 10.0)]);
        let profile = ColorProfile::from_palette(&colors, 5);
        assert_eq!(profile.share(Blue), 30.0);
        assert_eq!(profile.share(Green), 0.0);
    }

    #[test]
    fn test_profile_respects_depth() {
        let colors = palette(&[(Blue, 30.0), (Gray, 20.0), (Green, 10.0)]);
        let profile = ColorProfile::from_palette(&colors, 2);
        assert_eq!(profile.share(Green), 0.0);
    }

    #[test]
    fn test_triumphal_arch() {
        let colors = palette(&[(White, 40.0), (Blue, 35.0), (Gray, 15.0)]);
        let m = match_monument(&colors, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.kind, MonumentKind::TriumphalArch);
        assert_eq!(m.confidence, 0.88);
    }

    #[test]
    fn test_tower_excludes_triumphal_arch() {
        let colors = palette(&[(Gray, 35.0), (Blue, 30.0), (Green, 20.0), (Black, 15.0)]);
        let facts = SceneFacts::new(&colors, LANDMARK_PARAMS);
        assert!(triumphal_arch(&facts).is_none());

        let m = match_monument(&colors, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.kind, MonumentKind::Tower);
        assert_eq!(m.signature, "tower");
        assert_eq!(m.confidence, 0.92);
    }

    #[test]
    fn test_white_stone_with_greenery_is_not_an_arch() {
        let colors = palette(&[(White, 30.0), (Blue, 25.0), (Green, 20.0), (Gray, 15.0)]);
        let m = match_monument(&colors, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.kind, MonumentKind::Tower);
    }

    #[test]
    fn test_tower_close_up() {
        let colors = palette(&[(Gray, 50.0), (Blue, 40.0), (Black, 10.0)]);
        let m = match_monument(&colors, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.signature, "tower-close-up");
        assert_eq!(m.confidence, 0.85);
    }

    #[test]
    fn test_pyramid_confidence_depends_on_margin() {
        let strong = palette(&[(Orange, 45.0), (Blue, 30.0), (Black, 25.0)]);
        let m = match_monument(&strong, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.kind, MonumentKind::Pyramid);
        assert_eq!(m.confidence, 0.88);

        let weak = palette(&[(Orange, 38.0), (Blue, 30.0), (Black, 32.0)]);
        let m = match_monument(&weak, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.kind, MonumentKind::Pyramid);
        assert_eq!(m.confidence, 0.85);
    }

    #[test]
    fn test_generic_monument_needs_three_indicators() {
        // Structure (+2) and sky (+1), but nothing specific.
        let colors = palette(&[(Black, 40.0), (Blue, 30.0), (Red, 30.0)]);
        let m = match_monument(&colors, LANDMARK_PARAMS).unwrap();
        assert_eq!(m.kind, MonumentKind::Generic);
        assert_eq!(m.confidence, 0.60);

        // Structure alone is not enough.
        let colors = palette(&[(Black, 60.0), (Red, 40.0)]);
        assert!(match_monument(&colors, LANDMARK_PARAMS).is_none());
    }

    #[test]
    fn test_object_generic_monument_needs_sky() {
        // Structure (+2) and desert tones (+2) reach the count without any sky.
        let colors = palette(&[(Beige, 30.0), (Brown, 25.0), (Black, 20.0), (White, 15.0), (Gray, 10.0)]);
        let facts = SceneFacts::new(&colors, LANDMARK_PARAMS);
        assert!(!facts.blue_sky);
        assert_eq!(structural_indicators(&facts), 4);

        assert_eq!(match_monument(&colors, LANDMARK_PARAMS).unwrap().kind, MonumentKind::Generic);
        assert!(match_monument(&colors, OBJECT_PARAMS).is_none());
    }

    #[test]
    fn test_no_sky_no_monument() {
        let colors = palette(&[(Green, 60.0), (Red, 40.0)]);
        assert!(match_monument(&colors, OBJECT_PARAMS).is_none());
    }

    #[test]
    fn test_sky_threshold_differs_between_params() {
        let colors = palette(&[(White, 50.0), (Blue, 11.0), (Red, 39.0)]);
        assert!(match_monument(&colors, LANDMARK_PARAMS).is_some());
        assert!(match_monument(&colors, OBJECT_PARAMS).is_none());
    }
}
