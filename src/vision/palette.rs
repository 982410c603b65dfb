//! Dominant color extraction with seeded k-means.

use image::{DynamicImage, GenericImageView};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::OnceCell;
use std::num::NonZeroUsize;

use super::{ColorFamily, DominantColor};
use crate::error::AnalysisError;

/// Clustering parameters. The seed is fixed so the same image always yields
/// the same palette.
#[derive(Debug, Clone)]
pub struct PaletteSettings {
    /// Images whose longer side exceeds this are thumbnailed before clustering.
    pub max_side: u32,
    pub seed: u64,
    /// Independent k-means restarts; the lowest-inertia run wins.
    pub runs: usize,
    pub max_iter: usize,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            max_side: 300,
            seed: 42,
            runs: 4,
            max_iter: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColorExtractor {
    settings: PaletteSettings,
}

impl ColorExtractor {
    pub fn new(settings: PaletteSettings) -> Self {
        Self { settings }
    }

    /// Extract `n_colors` dominant colors, sorted by percentage descending.
    ///
    /// Never fails: any error is logged and yields an empty palette.
    pub fn extract(&self, image: &DynamicImage, n_colors: NonZeroUsize) -> Vec<DominantColor> {
        match self.try_extract(image, n_colors.get()) {
            Ok(colors) => {
                tracing::debug!(colors = colors.len(), "Dominant colors extracted");
                colors
            }
            Err(e) => {
                tracing::warn!(error = %e, "Color extraction failed");
                Vec::new()
            }
        }
    }

    fn try_extract(&self, image: &DynamicImage, k: usize) -> Result<Vec<DominantColor>, AnalysisError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AnalysisError::Clustering("image has no pixels".to_string()));
        }

        let max_side = self.settings.max_side;
        let rgb = if width > max_side || height > max_side {
            image.thumbnail(max_side, max_side).to_rgb8()
        } else {
            image.to_rgb8()
        };

        let pixels: Vec<[f32; 3]> = rgb
            .pixels()
            .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
            .collect();
        if pixels.is_empty() {
            return Err(AnalysisError::Clustering("thumbnail has no pixels".to_string()));
        }

        let clustering = kmeans(&pixels, k, &self.settings);
        let total = pixels.len() as f32;

        let mut colors: Vec<DominantColor> = clustering
            .centroids
            .iter()
            .zip(clustering.counts.iter())
            .filter(|(_, &count)| count > 0)
            .map(|(centroid, &count)| {
                // Truncate like an integer cast of the float centroid.
                let rgb = [centroid[0] as u8, centroid[1] as u8, centroid[2] as u8];
                DominantColor {
                    rgb,
                    hex: format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2]),
                    percentage: (count as f32 / total * 1000.0).round() / 10.0,
                    family: color_family(rgb),
                }
            })
            .collect();

        colors.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
        Ok(colors)
    }
}

impl Default for ColorExtractor {
    fn default() -> Self {
        Self::new(PaletteSettings::default())
    }
}

/// The wider palette the heuristic fallbacks score an image against.
///
/// Extracted on first use and then shared, so the object and landmark
/// fallbacks always see the same clusters for one image.
pub struct SignaturePalette<'a> {
    image: &'a DynamicImage,
    extractor: &'a ColorExtractor,
    n_colors: NonZeroUsize,
    colors: OnceCell<Vec<DominantColor>>,
}

impl<'a> SignaturePalette<'a> {
    pub fn new(image: &'a DynamicImage, extractor: &'a ColorExtractor, n_colors: NonZeroUsize) -> Self {
        Self {
            image,
            extractor,
            n_colors,
            colors: OnceCell::new(),
        }
    }

    pub fn colors(&self) -> &[DominantColor] {
        self.colors
            .get_or_init(|| self.extractor.extract(self.image, self.n_colors))
    }

    pub fn is_extracted(&self) -> bool {
        self.colors.get().is_some()
    }
}

/// Skin-tone RGB predicate shared by the color namer and the person heuristic.
pub fn is_skin_tone(rgb: [u8; 3]) -> bool {
    let [r, g, b] = rgb.map(i32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95 && g > 40 && b > 20 && max - min > 15 && (r - g).abs() > 15 && r > g && r > b
}

/// Map an RGB value to a color family. Rules are checked in order; the skin
/// tone check deliberately precedes the hue bands.
pub fn color_family(rgb: [u8; 3]) -> ColorFamily {
    let [r, g, b] = rgb.map(i32::from);

    if r > 200 && g > 200 && b > 200 {
        ColorFamily::White
    } else if r < 50 && g < 50 && b < 50 {
        ColorFamily::Black
    } else if is_skin_tone(rgb) {
        if r > 180 && g > 120 {
            ColorFamily::Beige
        } else if r > 140 && g > 80 {
            ColorFamily::Rose
        } else {
            ColorFamily::Brown
        }
    } else if r > 200 && g < 100 && b < 100 {
        ColorFamily::Red
    } else if (g > r && g > b && g > 50) || (g > 80 && r < g + 30 && b < 100) {
        ColorFamily::Green
    } else if b > r && b > g && b > 80 {
        ColorFamily::Blue
    } else if r > 200 && g > 200 && b < 100 {
        ColorFamily::Yellow
    } else if r > 200 && g < 100 && b > 200 {
        ColorFamily::Magenta
    } else if r < 100 && g > 200 && b > 200 {
        ColorFamily::Cyan
    } else if r > 150 && g > 100 && b < 100 {
        ColorFamily::Orange
    } else if r > 60 && g > 40 && b < 80 && (r - g).abs() < 50 {
        ColorFamily::Brown
    } else if r > 150 && g < 150 && b > 150 {
        ColorFamily::Violet
    } else if r > 100 && g > 100 && b > 100 {
        ColorFamily::Gray
    } else {
        ColorFamily::Mixed
    }
}

struct Clustering {
    centroids: Vec<[f32; 3]>,
    counts: Vec<usize>,
    inertia: f64,
}

fn kmeans(pixels: &[[f32; 3]], k: usize, settings: &PaletteSettings) -> Clustering {
    let mut rng = StdRng::seed_from_u64(settings.seed);

    let seeds = kmeans_plus_plus(pixels, k, &mut rng);
    let mut best = lloyd(pixels, seeds, settings.max_iter);

    for _ in 1..settings.runs {
        let seeds = kmeans_plus_plus(pixels, k, &mut rng);
        let run = lloyd(pixels, seeds, settings.max_iter);
        if run.inertia < best.inertia {
            best = run;
        }
    }

    best
}

fn distance_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

/// Index of the nearest centroid and the squared distance to it.
/// Ties go to the lowest index.
fn nearest(pixel: &[f32; 3], centroids: &[[f32; 3]]) -> (usize, f32) {
    let mut best = (0, f32::MAX);
    for (i, c) in centroids.iter().enumerate() {
        let d = distance_sq(pixel, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn kmeans_plus_plus(pixels: &[[f32; 3]], k: usize, rng: &mut StdRng) -> Vec<[f32; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(pixels[rng.gen_range(0..pixels.len())]);

    let mut dist: Vec<f32> = pixels.iter().map(|p| distance_sq(p, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().map(|&d| d as f64).sum();
        let next = if total <= 0.0 {
            // Fewer distinct colors than clusters; the duplicate ends up empty.
            rng.gen_range(0..pixels.len())
        } else {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = pixels.len() - 1;
            for (i, &d) in dist.iter().enumerate() {
                acc += d as f64;
                if acc >= target {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        let centroid = pixels[next];
        for (d, p) in dist.iter_mut().zip(pixels.iter()) {
            *d = d.min(distance_sq(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn lloyd(pixels: &[[f32; 3]], mut centroids: Vec<[f32; 3]>, max_iter: usize) -> Clustering {
    let k = centroids.len();
    let mut labels = vec![usize::MAX; pixels.len()];

    for _ in 0..max_iter.max(1) {
        let mut changed = false;
        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];

        for (label, pixel) in labels.iter_mut().zip(pixels.iter()) {
            let (idx, _) = nearest(pixel, &centroids);
            if *label != idx {
                *label = idx;
                changed = true;
            }
            counts[idx] += 1;
            for c in 0..3 {
                sums[idx][c] += pixel[c] as f64;
            }
        }

        for i in 0..k {
            // An empty cluster keeps its previous centroid.
            if counts[i] > 0 {
                let n = counts[i] as f64;
                centroids[i] = [
                    (sums[i][0] / n) as f32,
                    (sums[i][1] / n) as f32,
                    (sums[i][2] / n) as f32,
                ];
            }
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    let mut inertia = 0f64;
    for pixel in pixels {
        let (idx, d) = nearest(pixel, &centroids);
        counts[idx] += 1;
        inertia += d as f64;
    }

    Clustering {
        centroids,
        counts,
        inertia,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn n(k: usize) -> NonZeroUsize {
        NonZeroUsize::new(k).unwrap()
    }

    /// Left `split` columns in `left`, the rest in `right`.
    fn two_tone(width: u32, height: u32, split: u32, left: [u8; 3], right: [u8; 3]) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| if x < split { Rgb(left) } else { Rgb(right) });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_signature_palette_extracts_once() {
        let img = two_tone(40, 20, 30, [40, 150, 60], [230, 40, 60]);
        let extractor = ColorExtractor::default();
        let signature = SignaturePalette::new(&img, &extractor, n(8));

        assert!(!signature.is_extracted());
        let first = signature.colors();
        assert!(signature.is_extracted());
        assert!(std::ptr::eq(first, signature.colors()));
        assert_eq!(first, extractor.extract(&img, n(8)).as_slice());
    }

    #[test]
    fn test_solid_image_single_color() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([30, 60, 200])));
        let colors = ColorExtractor::default().extract(&img, n(5));

        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].rgb, [30, 60, 200]);
        assert_eq!(colors[0].hex, "#1e3cc8");
        assert_eq!(colors[0].percentage, 100.0);
        assert_eq!(colors[0].family, ColorFamily::Blue);
    }

    #[test]
    fn test_two_tone_sorted_descending() {
        let img = two_tone(40, 10, 30, [20, 160, 40], [240, 240, 240]);
        let colors = ColorExtractor::default().extract(&img, n(2));

        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].family, ColorFamily::Green);
        assert_eq!(colors[0].percentage, 75.0);
        assert_eq!(colors[1].family, ColorFamily::White);
        assert_eq!(colors[1].percentage, 25.0);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, ((x + y) * 2) as u8]));
        let colors = ColorExtractor::default().extract(&DynamicImage::ImageRgb8(img), n(5));

        assert_eq!(colors.len(), 5);
        let sum: f32 = colors.iter().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.5, "sum was {}", sum);
        for pair in colors.windows(2) {
            assert!(pair[0].percentage >= pair[1].percentage);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let img = RgbImage::from_fn(50, 50, |x, y| Rgb([(x * 5) as u8, (y * 3) as u8, ((x * y) % 255) as u8]));
        let img = DynamicImage::ImageRgb8(img);
        let extractor = ColorExtractor::default();

        let first = extractor.extract(&img, n(5));
        let second = extractor.extract(&img, n(5));
        assert_eq!(first, second);
    }

    #[test]
    fn test_large_image_is_downsampled() {
        let img = two_tone(900, 400, 450, [10, 10, 10], [250, 250, 250]);
        let colors = ColorExtractor::default().extract(&img, n(2));

        assert_eq!(colors.len(), 2);
        let sum: f32 = colors.iter().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.5);
        assert!((colors[0].percentage - 50.0).abs() <= 1.0);
    }

    #[test]
    fn test_more_clusters_than_colors() {
        let img = two_tone(10, 10, 5, [250, 10, 10], [10, 10, 250]);
        let colors = ColorExtractor::default().extract(&img, n(6));

        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].percentage, 50.0);
    }

    #[test]
    fn test_empty_image_yields_empty_palette() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(ColorExtractor::default().extract(&img, n(5)).is_empty());
    }

    #[test]
    fn test_color_family_table() {
        assert_eq!(color_family([230, 230, 230]), ColorFamily::White);
        assert_eq!(color_family([20, 20, 20]), ColorFamily::Black);
        assert_eq!(color_family([220, 160, 130]), ColorFamily::Beige);
        assert_eq!(color_family([160, 100, 90]), ColorFamily::Rose);
        assert_eq!(color_family([120, 70, 50]), ColorFamily::Brown);
        assert_eq!(color_family([40, 150, 60]), ColorFamily::Green);
        assert_eq!(color_family([50, 90, 200]), ColorFamily::Blue);
        assert_eq!(color_family([70, 210, 210]), ColorFamily::Cyan);
        assert_eq!(color_family([150, 150, 150]), ColorFamily::Gray);
        assert_eq!(color_family([90, 60, 90]), ColorFamily::Mixed);
    }

    #[test]
    fn test_skin_tone_checked_before_red() {
        // Saturated red also satisfies the skin predicate, which wins.
        assert!(is_skin_tone([230, 60, 50]));
        assert_eq!(color_family([230, 60, 50]), ColorFamily::Brown);
        assert!(!is_skin_tone([90, 90, 200]));
    }
}
