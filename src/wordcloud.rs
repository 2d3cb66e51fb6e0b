//! Word cloud rendering
//!
//! Words are counted after [`normalize`](crate::normalize::normalize), ranked by
//! frequency and placed largest-first along a spiral starting at the centre of
//! the canvas. Glyphs come from the 8x8 `font8x8` bitmap font and are scaled by
//! an integer factor, so the output is identical for identical input.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::f64::consts::{PI, SQRT_2};
use std::path::Path;
use tracing::debug;

use crate::config::WordCloudConfig;
use crate::error::{InsightsError, Result};
use crate::normalize::normalize;

/// Glyph cell size of the bitmap font, in pixels at scale 1
const GLYPH: u32 = 8;
/// Free space kept around every placed word
const MARGIN: i64 = 2;
/// Weight of the frequency ratio in the font scale (the rest is rank-independent)
const RELATIVE_SCALING: f32 = 0.5;
/// Distance between spiral rings, in pixels
const SPIRAL_SPACING: f64 = 6.0;
/// Approximate arc length between sampled positions, in pixels
const SPIRAL_STEP: f64 = 6.0;
/// Colormap position of the least frequent word
const MIN_COLOR_POSITION: f32 = 0.15;

const PLASMA: [[u8; 3]; 5] = [
    [13, 8, 135],
    [126, 3, 168],
    [204, 71, 120],
    [248, 149, 64],
    [240, 249, 33],
];

const VIRIDIS: [[u8; 3]; 5] = [
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

/// Colour ramps available for word colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Plasma,
    Viridis,
}

impl Colormap {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "plasma" => Ok(Colormap::Plasma),
            "viridis" => Ok(Colormap::Viridis),
            other => Err(InsightsError::ConfigError(format!(
                "Invalid word_cloud.colormap: '{}'. Must be 'plasma' or 'viridis'",
                other
            ))),
        }
    }

    fn anchors(&self) -> &'static [[u8; 3]; 5] {
        match self {
            Colormap::Plasma => &PLASMA,
            Colormap::Viridis => &VIRIDIS,
        }
    }

    /// Colour at position `t` in `[0, 1]` (clamped), linearly interpolated
    pub fn sample(&self, t: f32) -> Rgb<u8> {
        let anchors = self.anchors();
        let t = t.clamp(0.0, 1.0) * (anchors.len() - 1) as f32;
        let lower = (t.floor() as usize).min(anchors.len() - 2);
        let frac = t - lower as f32;
        let (a, b) = (anchors[lower], anchors[lower + 1]);

        let mix = |i: usize| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * frac).round() as u8;
        Rgb([mix(0), mix(1), mix(2)])
    }
}

/// Parse "black", "white" or "#rrggbb"
pub fn parse_color(value: &str) -> Result<Rgb<u8>> {
    let value = value.trim().to_lowercase();
    match value.as_str() {
        "black" => return Ok(Rgb([0, 0, 0])),
        "white" => return Ok(Rgb([255, 255, 255])),
        _ => {}
    }

    let invalid = || {
        InsightsError::ConfigError(format!(
            "Invalid colour '{}'. Use 'black', 'white' or '#rrggbb'",
            value
        ))
    };

    let hex = value.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Count normalized words and keep the `max_words` most frequent
///
/// Ties are broken alphabetically so the ranking is stable.
pub fn word_frequencies(texts: &[String], max_words: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in normalize(text).split_whitespace() {
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_words);
    ranked
}

/// A word positioned on the canvas
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub word: String,
    pub x: u32,
    pub y: u32,
    pub scale: u32,
    pub color: Rgb<u8>,
}

impl Placement {
    pub fn width(&self) -> u32 {
        self.word.chars().count() as u32 * GLYPH * self.scale
    }

    pub fn height(&self) -> u32 {
        GLYPH * self.scale
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

impl Rect {
    fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }

    fn padded(&self) -> Rect {
        Rect {
            x: self.x - MARGIN,
            y: self.y - MARGIN,
            w: self.w + 2 * MARGIN,
            h: self.h + 2 * MARGIN,
        }
    }
}

/// Renders snippets into a word cloud raster
#[derive(Debug, Clone)]
pub struct WordCloudRenderer {
    width: u32,
    height: u32,
    max_words: usize,
    background: Rgb<u8>,
    colormap: Colormap,
}

impl WordCloudRenderer {
    pub fn new(
        width: u32,
        height: u32,
        max_words: usize,
        background: Rgb<u8>,
        colormap: Colormap,
    ) -> Self {
        Self {
            width,
            height,
            max_words,
            background,
            colormap,
        }
    }

    pub fn from_config(config: &WordCloudConfig) -> Result<Self> {
        Ok(Self::new(
            config.width,
            config.height,
            config.max_words,
            parse_color(&config.background)?,
            Colormap::from_name(&config.colormap)?,
        ))
    }

    pub fn background(&self) -> Rgb<u8> {
        self.background
    }

    /// Render the given texts; empty input gives a blank canvas
    pub fn render(&self, texts: &[String]) -> RgbImage {
        let frequencies = word_frequencies(texts, self.max_words);
        let mut image = RgbImage::from_pixel(self.width, self.height, self.background);

        for placement in self.layout(&frequencies) {
            draw_word(&mut image, &placement);
        }
        image
    }

    /// Position ranked words on the canvas, largest first
    pub fn layout(&self, frequencies: &[(String, usize)]) -> Vec<Placement> {
        let Some((_, top_count)) = frequencies.first() else {
            return Vec::new();
        };
        let top_count = *top_count as f32;
        let max_scale = (self.height / (GLYPH * 4)).max(1);
        let last_rank = frequencies.len().saturating_sub(1).max(1) as f32;

        let mut occupied: Vec<Rect> = Vec::with_capacity(frequencies.len());
        let mut placements = Vec::with_capacity(frequencies.len());
        let mut previous_scale = max_scale;

        for (rank, (word, count)) in frequencies.iter().enumerate() {
            let ratio = *count as f32 / top_count;
            let target = (max_scale as f32
                * (RELATIVE_SCALING * ratio + (1.0 - RELATIVE_SCALING)))
                .round() as u32;
            let mut scale = target.clamp(1, previous_scale);
            let letters = word.chars().count() as u32;

            let position = loop {
                if let Some(found) = self.find_position(letters * GLYPH * scale, GLYPH * scale, &occupied)
                {
                    break Some(found);
                }
                if scale == 1 {
                    break None;
                }
                scale -= 1;
            };

            let Some(rect) = position else {
                debug!("No room left for '{}', stopping after {} words", word, rank);
                break;
            };

            occupied.push(rect.padded());
            previous_scale = scale;
            let color_position = 1.0 - (1.0 - MIN_COLOR_POSITION) * (rank as f32 / last_rank);
            placements.push(Placement {
                word: word.clone(),
                x: rect.x as u32,
                y: rect.y as u32,
                scale,
                color: self.colormap.sample(color_position),
            });
        }

        placements
    }

    fn find_position(&self, w: u32, h: u32, occupied: &[Rect]) -> Option<Rect> {
        if w > self.width || h > self.height {
            return None;
        }

        let (w, h) = (w as i64, h as i64);
        let (canvas_w, canvas_h) = (self.width as i64, self.height as i64);
        let cx = self.width as f64 / 2.0;
        let cy = self.height as f64 / 2.0;
        let aspect = self.width as f64 / self.height as f64;
        let max_radius = cy.max(cx / aspect) * SQRT_2;

        let mut theta = 0.0f64;
        loop {
            let radius = SPIRAL_SPACING * theta / (2.0 * PI);
            if radius > max_radius {
                return None;
            }

            let x = (cx + radius * aspect * theta.cos() - w as f64 / 2.0).round() as i64;
            let y = (cy + radius * theta.sin() - h as f64 / 2.0).round() as i64;
            let candidate = Rect { x, y, w, h };

            let inside = x >= 0 && y >= 0 && x + w <= canvas_w && y + h <= canvas_h;
            if inside && !occupied.iter().any(|r| r.overlaps(&candidate)) {
                return Some(candidate);
            }

            theta += (SPIRAL_STEP / radius.max(SPIRAL_STEP)).min(0.5);
        }
    }

    /// Encode the image as PNG
    pub fn save(&self, image: &RgbImage, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        image.save_with_format(path, image::ImageFormat::Png)?;
        debug!("Saved word cloud to {:?}", path);
        Ok(())
    }
}

fn draw_word(image: &mut RgbImage, placement: &Placement) {
    let scale = placement.scale;
    for (index, ch) in placement.word.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = placement.x + index as u32 * GLYPH * scale;

        for (row, &bits) in glyph.iter().enumerate() {
            // Bit 0 is the leftmost pixel of the row
            for col in 0..GLYPH {
                if bits & (1u8 << col) == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = placement.y + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        if px + dx < image.width() && py + dy < image.height() {
                            image.put_pixel(px + dx, py + dy, placement.color);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(width: u32, height: u32) -> WordCloudRenderer {
        WordCloudRenderer::new(width, height, 50, Rgb([0, 0, 0]), Colormap::Plasma)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_word_frequencies_ranking() {
        let snippets = texts(&[
            "Meeting moved to 3pm",
            "Buy cheap watches now",
            "Watches on sale, meeting tomorrow",
            "watches!",
        ]);

        let freqs = word_frequencies(&snippets, 50);
        assert_eq!(freqs[0], ("watches".to_string(), 3));
        assert_eq!(freqs[1], ("meeting".to_string(), 2));
        // Single occurrences are alphabetical
        assert_eq!(freqs[2], ("buy".to_string(), 1));
        assert!(freqs.iter().all(|(w, _)| w != "to" && w != "now" && w != "on"));
    }

    #[test]
    fn test_word_frequencies_respects_max_words() {
        let snippets = texts(&["alpha beta gamma delta epsilon"]);
        let freqs = word_frequencies(&snippets, 3);
        assert_eq!(freqs.len(), 3);
    }

    #[test]
    fn test_render_empty_input_is_blank() {
        let renderer = renderer(64, 32);
        let image = renderer.render(&[]);

        assert_eq!(image.dimensions(), (64, 32));
        assert!(image.pixels().all(|p| *p == renderer.background()));
    }

    #[test]
    fn test_render_only_stopwords_is_blank() {
        let renderer = renderer(64, 32);
        let image = renderer.render(&texts(&["the and of", "123"]));
        assert!(image.pixels().all(|p| *p == renderer.background()));
    }

    #[test]
    fn test_render_draws_words() {
        let renderer = renderer(200, 100);
        let image = renderer.render(&texts(&["invoice invoice shipping"]));

        let drawn = image.pixels().filter(|p| **p != renderer.background()).count();
        assert!(drawn > 0);
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = renderer(200, 100);
        let input = texts(&["buy cheap watches now", "meeting moved to 3pm", "watches"]);

        let first = renderer.render(&input);
        let second = renderer.render(&input);
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn test_layout_stays_in_bounds_without_overlap() {
        let renderer = renderer(160, 80);
        let freqs = word_frequencies(
            &texts(&[
                "alpha alpha alpha beta beta gamma delta epsilon zeta eta theta iota kappa",
            ]),
            50,
        );
        let placements = renderer.layout(&freqs);
        assert!(!placements.is_empty());

        for p in &placements {
            assert!(p.x + p.width() <= 160, "{} overflows horizontally", p.word);
            assert!(p.y + p.height() <= 80, "{} overflows vertically", p.word);
        }
        for (i, a) in placements.iter().enumerate() {
            for b in placements.iter().skip(i + 1) {
                let separate = a.x + a.width() <= b.x
                    || b.x + b.width() <= a.x
                    || a.y + a.height() <= b.y
                    || b.y + b.height() <= a.y;
                assert!(separate, "{} overlaps {}", a.word, b.word);
            }
        }
    }

    #[test]
    fn test_layout_scales_never_increase() {
        let renderer = renderer(200, 100);
        let freqs = word_frequencies(&texts(&["one one one two two three"]), 50);
        let placements = renderer.layout(&freqs);

        assert_eq!(placements[0].word, "one");
        for pair in placements.windows(2) {
            assert!(pair[0].scale >= pair[1].scale);
        }
    }

    #[test]
    fn test_layout_stops_when_word_cannot_fit() {
        // 4 letters at scale 1 need 32px, canvas is narrower
        let renderer = renderer(24, 16);
        let freqs = vec![("wide".to_string(), 1)];
        assert!(renderer.layout(&freqs).is_empty());
    }

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(Colormap::Plasma.sample(0.0), Rgb([13, 8, 135]));
        assert_eq!(Colormap::Plasma.sample(1.0), Rgb([240, 249, 33]));
        assert_eq!(Colormap::Viridis.sample(2.0), Rgb([253, 231, 37]));
        assert_eq!(Colormap::Viridis.sample(-1.0), Rgb([68, 1, 84]));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("black").unwrap(), Rgb([0, 0, 0]));
        assert_eq!(parse_color("White").unwrap(), Rgb([255, 255, 255]));
        assert_eq!(parse_color("#4682b4").unwrap(), Rgb([70, 130, 180]));
        assert!(parse_color("steelblue").is_err());
        assert!(parse_color("#12345").is_err());
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cloud.png");
        let renderer = renderer(64, 32);

        let image = renderer.render(&texts(&["hello"]));
        renderer.save(&image, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
