use std::fs;
use std::path::Path;

use image::Rgba;

use crate::error::ConfigError;

/// An RGBA color with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::gray(1.0);
    /// Light cyan used for pores under the highlight threshold.
    pub const HIGHLIGHT: Color = Color::rgba(0.0, 0.972, 0.915, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque gray of the given level.
    pub const fn gray(level: f32) -> Self {
        Self::rgba(level, level, level, 1.0)
    }

    #[inline]
    fn channel_to_u8(value: f32) -> u8 {
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    #[inline]
    pub fn to_pixel(self) -> Rgba<u8> {
        Rgba([
            Self::channel_to_u8(self.r),
            Self::channel_to_u8(self.g),
            Self::channel_to_u8(self.b),
            Self::channel_to_u8(self.a),
        ])
    }
}

/// Label -> color table, read once per run from a color file.
///
/// Entry `i` is the color of label `i`. Entry 0 is usually the transparent background.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    entries: Vec<Color>,
    /// Comma separated groups that did not parse as a color.
    skipped: Vec<String>,
}

impl ColorTable {
    pub fn new(entries: Vec<Color>) -> Self {
        Self {
            entries,
            skipped: Vec::new(),
        }
    }

    /// Read a color table file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or holds no color tuple.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ColorTableRead {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text);
        if table.is_empty() {
            return Err(ConfigError::EmptyColorTable(path.to_path_buf()));
        }
        tracing::debug!("Loaded {} colors from {}", table.len(), path.display());
        Ok(table)
    }

    /// Collect every parenthesized group of 3 or 4 numbers, in text order.
    ///
    /// Anything else in the text, comments included, is ignored. Line breaks do not matter.
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut open = None;
        for (pos, ch) in text.char_indices() {
            match ch {
                '(' => open = Some(pos + 1),
                ')' => {
                    if let Some(start) = open.take() {
                        let body = &text[start..pos];
                        match Self::parse_tuple(body) {
                            Some(color) => entries.push(color),
                            None if body.contains(',') => {
                                tracing::warn!(
                                    "Skipped color table group ({body}), labels from {} shift",
                                    entries.len()
                                );
                                skipped.push(body.trim().to_string());
                            }
                            None => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Self { entries, skipped }
    }

    fn parse_tuple(body: &str) -> Option<Color> {
        let mut parts: Vec<&str> = body.split(',').map(str::trim).collect();
        // `(r, g, b,)` is a valid tuple literal
        if parts.last().is_some_and(|part| part.is_empty()) {
            parts.pop();
        }
        let values = parts
            .iter()
            .map(|part| part.parse::<f32>().ok())
            .collect::<Option<Vec<_>>>()?;
        match values[..] {
            [r, g, b] => Some(Color::rgba(r, g, b, 1.0)),
            [r, g, b, a] => Some(Color::rgba(r, g, b, a)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: usize) -> Option<Color> {
        self.entries.get(label).copied()
    }

    pub fn entries(&self) -> &[Color] {
        &self.entries
    }

    /// Tuple-like groups left out of the table, in text order.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Whether entry 0 is fully transparent black.
    pub fn has_transparent_background(&self) -> bool {
        self.entries.first() == Some(&Color::TRANSPARENT)
    }
}
