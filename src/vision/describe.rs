//! Deterministic title and description text from detector output.

use super::{ColorFamily, DetectedEmotion, DetectedLandmark, DetectedObject, DominantColor};

/// Labels too vague to name a subject.
const GENERIC_LABELS: [&str; 3] = ["photo", "image", "colorful scene"];

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("photo", "photograph"),
    ("image", "digital image"),
    ("nature", "natural landscape"),
    ("colorful scene", "colorful scene"),
    ("person", "portrait"),
    ("people", "group of people"),
    ("building", "architecture"),
    ("food", "gastronomy"),
    ("animal", "wildlife"),
    ("flower", "flora"),
    ("car", "vehicle"),
    ("city", "cityscape"),
];

const MOOD_PHRASES: &[(&str, &str)] = &[
    ("joyful", "a joyful and lively atmosphere"),
    ("peaceful", "a calm and serene ambiance"),
    ("dramatic", "a dramatic and intense composition"),
    ("melancholic", "a melancholic and contemplative feeling"),
    ("energetic", "a dynamic and vibrant energy"),
    ("romantic", "a soft and romantic atmosphere"),
];

const MINIMAL_SUFFIX: &str = " captured with care, revealing a unique visual composition.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Warm,
    Cool,
    Neutral,
    Colorful,
}

impl Tone {
    fn of(family: ColorFamily) -> Self {
        match family {
            ColorFamily::Red | ColorFamily::Orange | ColorFamily::Yellow | ColorFamily::Rose | ColorFamily::Magenta => {
                Tone::Warm
            }
            ColorFamily::Blue | ColorFamily::Green | ColorFamily::Cyan | ColorFamily::Violet => Tone::Cool,
            ColorFamily::Gray | ColorFamily::White | ColorFamily::Black | ColorFamily::Beige | ColorFamily::Brown => {
                Tone::Neutral
            }
            ColorFamily::Mixed => Tone::Colorful,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Tone::Warm => "warm",
            Tone::Cool => "cool",
            Tone::Neutral => "neutral",
            Tone::Colorful => "colorful",
        }
    }
}

/// Composes the title and description stored with an analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptionEnhancer;

impl DescriptionEnhancer {
    pub fn title(
        &self,
        objects: &[DetectedObject],
        emotions: &[DetectedEmotion],
        landmarks: &[DetectedLandmark],
        colors: &[DominantColor],
    ) -> String {
        let subjects = specific_subjects(objects);

        let located = landmarks.first().filter(|l| !l.place.is_empty());
        if let (Some(landmark), Some(subject)) = (located, subjects.first()) {
            return format!("{} in {}", capitalize(subject), landmark.place);
        }

        if let (Some(emotion), Some(subject)) = (emotions.first(), subjects.first()) {
            let adjective = match emotion.emotion.as_str() {
                "joyful" => "Joyful".to_string(),
                "peaceful" => "Serene".to_string(),
                "dramatic" => "Spectacular".to_string(),
                other => capitalize(other),
            };
            return format!("{} {}", adjective, subject);
        }

        match subjects.as_slice() {
            [first, second, ..] => return format!("{} and {}", capitalize(first), second),
            [only] => return capitalize(only),
            [] => {}
        }

        if colors.len() >= 2 {
            return format!("Composition in {}", palette_phrase(colors));
        }

        "Captured photograph".to_string()
    }

    pub fn description(
        &self,
        objects: &[DetectedObject],
        emotions: &[DetectedEmotion],
        landmarks: &[DetectedLandmark],
        colors: &[DominantColor],
    ) -> String {
        let subjects = specific_subjects(objects);
        let mut clauses = Vec::new();

        clauses.push(match (landmarks.first(), subjects.as_slice()) {
            (Some(l), _) if !l.landmark.is_empty() && !l.place.is_empty() => {
                format!("Photograph of {} located in {}", l.landmark, l.place)
            }
            (Some(l), _) if !l.landmark.is_empty() => format!("Photograph of {}", l.landmark),
            (Some(l), _) if !l.place.is_empty() => format!("Image captured in {}", l.place),
            (_, [only]) => format!("Photograph featuring {}", only),
            (_, [first, second]) => format!("Image showing {} and {}", first, second),
            (_, [first, second, ..]) => format!("Visual composition of {}, {} and other elements", first, second),
            (_, []) => "Photograph".to_string(),
        });

        if colors.len() >= 3 {
            clauses.push(format!("characterized by {}", palette_phrase(colors)));
        }

        if let Some(emotion) = emotions.first() {
            let name = emotion.emotion.as_str();
            match lookup(MOOD_PHRASES, name) {
                Some(phrase) => clauses.push(format!("creating {}", phrase)),
                None => clauses.push(format!("with a {} ambiance", name)),
            }
        }

        match colors.len() {
            0 => {}
            n if n >= 5 => clauses.push(format!("a rich palette of {} dominant colors enriches this composition", n)),
            n if n >= 3 => clauses.push(format!("with {} main colors in harmonious balance", n)),
            n => clauses.push(format!("with a restrained palette of {} {}", n, if n == 1 { "color" } else { "colors" })),
        }

        join_clauses(&clauses)
    }
}

/// Specific object labels, translated to display names, in detection order.
fn specific_subjects(objects: &[DetectedObject]) -> Vec<String> {
    objects
        .iter()
        .map(|o| o.label.as_str())
        .filter(|label| !GENERIC_LABELS.contains(label))
        .map(|label| {
            let lower = label.to_lowercase();
            lookup(DISPLAY_NAMES, &lower).map(str::to_string).unwrap_or_else(|| label.to_string())
        })
        .collect()
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Describe the tones of the three leading colors.
fn palette_phrase(colors: &[DominantColor]) -> String {
    let mut tones: Vec<Tone> = Vec::new();
    for color in colors.iter().take(3) {
        let tone = Tone::of(color.family);
        if !tones.contains(&tone) {
            tones.push(tone);
        }
    }

    match tones.as_slice() {
        [] => "varied tones".to_string(),
        [only] => format!("a palette of {} tones", only.as_str()),
        [a, b] => format!("{} and {} tonalities", a.as_str(), b.as_str()),
        [a, b, c, ..] => format!("a harmony of {}, {} and {}", a.as_str(), b.as_str(), c.as_str()),
    }
}

/// Join clauses: the second follows a comma, the last of three or more
/// starts a new sentence, and the text always ends with a period.
fn join_clauses(clauses: &[String]) -> String {
    match clauses {
        [] => format!("Photograph{}", MINIMAL_SUFFIX),
        [only] => format!("{}{}", only, MINIMAL_SUFFIX),
        [first, rest @ ..] => {
            let mut text = first.clone();
            let last = rest.len();
            for (i, clause) in rest.iter().enumerate() {
                let position = i + 1;
                if position > 1 && position == last {
                    text.push_str(". ");
                    text.push_str(&capitalize(clause));
                } else {
                    text.push_str(", ");
                    text.push_str(clause);
                }
            }
            if !text.ends_with('.') {
                text.push('.');
            }
            text
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
