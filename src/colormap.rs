//! Per-slice color rules.
//!
//! The set of values present differs from slice to slice, so every rule here is built
//! fresh for one slice and thrown away after it is rasterized.

use ndarray::ArrayView2;
use thiserror::Error;

use crate::color_table::{Color, ColorTable};
use crate::error::ConfigError;
use crate::profile::{SegmentationKind, SegmentationProfile};

/// Value -> color mapping valid for a single slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceColorRule {
    /// Slice maximum is 0: zero is transparent, anything else solid white.
    Degenerate,
    /// Zero is transparent, `1..=max` spread evenly from black to white.
    Ramp { max: f64 },
    /// Plain grayscale over `min..=max`, no transparency.
    Linear { min: f64, max: f64 },
    /// The i-th smallest value present takes `colors[i]`.
    Ranked { values: Vec<f64>, colors: Vec<Color> },
    /// Zero takes `transparency`. Any other integer `v` up to the largest present label
    /// takes the palette color of the smallest present label `p >= v`, cycling every
    /// `palette.len()` labels.
    Labeled {
        transparency: Option<Color>,
        labels: Vec<usize>,
        palette: Vec<Color>,
    },
    /// Values in `lower..upper` below `cutoff` take `color`, everything else is transparent.
    Threshold {
        lower: f64,
        upper: f64,
        cutoff: f64,
        color: Color,
    },
}

impl SliceColorRule {
    /// Plain black-to-white ramp over the finite range of the slice.
    pub fn standard_grayscale(slice: &ArrayView2<'_, f64>) -> Self {
        let (min, max) = finite_range(slice).unwrap_or((0.0, 0.0));
        SliceColorRule::Linear { min, max }
    }

    /// Color of one sample, or `None` when the rule has no entry for it.
    pub fn color_for(&self, value: f64) -> Option<Color> {
        match self {
            SliceColorRule::Degenerate => Some(if value == 0.0 {
                Color::TRANSPARENT
            } else {
                Color::WHITE
            }),
            SliceColorRule::Ramp { max } => {
                if value == 0.0 || !value.is_finite() {
                    return Some(Color::TRANSPARENT);
                }
                let level = if *max > 1.0 {
                    ((value - 1.0) / (max - 1.0)).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                Some(Color::gray(level as f32))
            }
            SliceColorRule::Linear { min, max } => {
                if !value.is_finite() {
                    return Some(Color::TRANSPARENT);
                }
                let span = max - min;
                let level = if span > 0.0 {
                    ((value - min) / span).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                Some(Color::gray(level as f32))
            }
            SliceColorRule::Ranked { values, colors } => {
                let value = normalize_zero(value);
                values
                    .binary_search_by(|probe| probe.total_cmp(&value))
                    .ok()
                    .and_then(|rank| colors.get(rank).copied())
            }
            SliceColorRule::Labeled {
                transparency,
                labels,
                palette,
            } => match as_label(value)? {
                0 => *transparency,
                label => {
                    let next = labels.get(labels.partition_point(|&present| present < label))?;
                    palette.get((next - 1) % palette.len().max(1)).copied()
                }
            },
            SliceColorRule::Threshold {
                lower,
                upper,
                cutoff,
                color,
            } => {
                let hit = value != 0.0 && value >= *lower && value < *upper && value < *cutoff;
                Some(if hit { *color } else { Color::TRANSPARENT })
            }
        }
    }
}

/// A rule together with whether it is the degraded default.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleBuild {
    pub rule: SliceColorRule,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HighlightError {
    #[error("slice has no finite samples")]
    NoSamples,

    #[error("highlight range {lower}..{upper} is empty")]
    EmptyRange { lower: f64, upper: f64 },
}

/// Everything the compositor needs to render one slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceColoring {
    Single {
        rule: RuleBuild,
        /// Whether the sampled background color must be made transparent afterwards.
        remove_background: bool,
    },
    /// Grayscale background with highlighted pores on top.
    Layered {
        background: RuleBuild,
        highlight: Result<SliceColorRule, HighlightError>,
    },
}

/// Builds slice rules from the run's profile and color table.
#[derive(Debug, Clone, Copy)]
pub struct ColormapBuilder<'a> {
    profile: SegmentationProfile,
    table: Option<&'a ColorTable>,
}

impl<'a> ColormapBuilder<'a> {
    /// # Errors
    ///
    /// Colored profiles need a color table, and labeled pores need at least one color
    /// besides the transparent entry.
    pub fn new(
        profile: SegmentationProfile,
        table: Option<&'a ColorTable>,
    ) -> Result<Self, ConfigError> {
        if profile.kind.is_colored() {
            let table = table.ok_or(ConfigError::MissingColorTable(profile.kind.tag()))?;
            if profile.kind == SegmentationKind::LabeledPores && table.len() < 2 {
                return Err(ConfigError::EmptyPalette);
            }
        }
        Ok(Self { profile, table })
    }

    pub fn profile(&self) -> &SegmentationProfile {
        &self.profile
    }

    pub fn build(&self, slice: &ArrayView2<'_, f64>) -> SliceColoring {
        match (self.profile.kind, self.table) {
            (
                SegmentationKind::CategoricalPhases | SegmentationKind::CategoricalMinerals,
                Some(table),
            ) => SliceColoring::Single {
                rule: Self::exact(Self::categorical(slice, table)),
                remove_background: false,
            },
            (SegmentationKind::LabeledPores, Some(table)) => SliceColoring::Single {
                rule: Self::exact(Self::labeled(slice, table)),
                remove_background: false,
            },
            (SegmentationKind::ThresholdPores, _) => SliceColoring::Layered {
                background: Self::grayscale(slice),
                highlight: self.highlight(slice),
            },
            // `new` guarantees colored kinds carry a table
            _ => SliceColoring::Single {
                rule: Self::grayscale(slice),
                remove_background: true,
            },
        }
    }

    fn exact(rule: SliceColorRule) -> RuleBuild {
        RuleBuild {
            rule,
            fallback: false,
        }
    }

    /// Grayscale with a transparent zero, falling back to the plain ramp when the slice
    /// has no usable `1..=max` range.
    pub fn grayscale(slice: &ArrayView2<'_, f64>) -> RuleBuild {
        match finite_range(slice) {
            Some((_, max)) if max == 0.0 => Self::exact(SliceColorRule::Degenerate),
            Some((_, max)) if max >= 1.0 => Self::exact(SliceColorRule::Ramp { max }),
            range => {
                tracing::warn!(
                    "No transparent grayscale ramp for range {:?}, using the plain ramp",
                    range
                );
                RuleBuild {
                    rule: SliceColorRule::standard_grayscale(slice),
                    fallback: true,
                }
            }
        }
    }

    /// Keep only the table entries whose index appears in the slice, ranked by value.
    ///
    /// Colors are compacted: when an intermediate table index is absent, later values
    /// shift down and take earlier colors.
    pub fn categorical(slice: &ArrayView2<'_, f64>, table: &ColorTable) -> SliceColorRule {
        let values = distinct_values(slice);
        let colors: Vec<Color> = table
            .entries()
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                values
                    .binary_search_by(|probe| probe.total_cmp(&(*index as f64)))
                    .is_ok()
            })
            .map(|(_, color)| *color)
            .collect();
        if colors.len() < values.len() {
            tracing::warn!(
                "{} distinct values but only {} matching colors, the largest values stay uncolored",
                values.len(),
                colors.len()
            );
        }
        SliceColorRule::Ranked { values, colors }
    }

    /// Entry 0 of the table is the transparency, the rest a palette repeating every
    /// `N` labels. Every label up to the slice maximum has a color; an absent label
    /// takes the color of the next label present.
    ///
    /// Only the distinct labels are stored, so the rule stays small for huge label ids.
    pub fn labeled(slice: &ArrayView2<'_, f64>, table: &ColorTable) -> SliceColorRule {
        let (transparency, palette) = match table.entries().split_first() {
            Some((&transparency, palette)) => (Some(transparency), palette.to_vec()),
            None => (None, Vec::new()),
        };
        let labels = distinct_values(slice)
            .into_iter()
            .filter_map(as_label)
            .filter(|&label| label > 0)
            .collect();
        SliceColorRule::Labeled {
            transparency,
            labels,
            palette,
        }
    }

    /// Highlight layer over `min_allowed + 1 .. slice max`.
    pub fn highlight(&self, slice: &ArrayView2<'_, f64>) -> Result<SliceColorRule, HighlightError> {
        let (_, max) = finite_range(slice).ok_or(HighlightError::NoSamples)?;
        let lower = (self.profile.min_allowed_value + 1) as f64;
        if max <= lower {
            return Err(HighlightError::EmptyRange { lower, upper: max });
        }
        Ok(SliceColorRule::Threshold {
            lower,
            upper: max,
            cutoff: (self.profile.min_allowed_value + self.profile.highlight_threshold) as f64,
            color: Color::HIGHLIGHT,
        })
    }
}

#[inline]
fn normalize_zero(value: f64) -> f64 {
    // -0.0 and 0.0 are the same label
    if value == 0.0 { 0.0 } else { value }
}

/// Non-negative integral samples are labels.
#[inline]
pub(crate) fn as_label(value: f64) -> Option<usize> {
    (value >= 0.0 && value.fract() == 0.0 && value <= usize::MAX as f64).then_some(value as usize)
}

/// Sorted distinct values of the slice, NaN excluded.
pub(crate) fn distinct_values(slice: &ArrayView2<'_, f64>) -> Vec<f64> {
    let mut values: Vec<f64> = slice
        .iter()
        .copied()
        .filter(|value| !value.is_nan())
        .map(normalize_zero)
        .collect();
    values.sort_unstable_by(f64::total_cmp);
    values.dedup();
    values
}

pub(crate) fn finite_range(slice: &ArrayView2<'_, f64>) -> Option<(f64, f64)> {
    slice
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .fold(None, |range, value| match range {
            None => Some((value, value)),
            Some((min, max)) => Some((f64::min(min, value), f64::max(max, value))),
        })
}
