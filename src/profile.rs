use crate::error::ConfigError;

/// Colorization strategy of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationKind {
    /// Raw tomography, grayscale with a transparent zero.
    Intensity,
    CategoricalPhases,
    CategoricalMinerals,
    /// Connected-component labels colored by a repeating palette.
    LabeledPores,
    /// Grayscale with pores under a threshold highlighted.
    ThresholdPores,
}

impl SegmentationKind {
    /// Canonical tag followed by the legacy tag of the same category.
    const TAGS: [(SegmentationKind, [&'static str; 2]); 5] = [
        (SegmentationKind::Intensity, ["raw tomography", "Projecao Tomografica"]),
        (SegmentationKind::CategoricalPhases, ["segmented phases", "Projecao Segmentada Fases"]),
        (SegmentationKind::ThresholdPores, ["segmented pore", "Projecao Segmentada Poro"]),
        (SegmentationKind::LabeledPores, ["labeled pore", "Projecao Segmentada Pore Labeled"]),
        (
            SegmentationKind::CategoricalMinerals,
            ["segmented minerals", "Projecao Segmentada Minerais"],
        ),
    ];

    pub fn tag(self) -> &'static str {
        Self::TAGS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("", |(_, tags)| tags[0])
    }

    /// Kinds that color labels from a color table.
    pub fn is_colored(self) -> bool {
        matches!(
            self,
            SegmentationKind::CategoricalPhases
                | SegmentationKind::CategoricalMinerals
                | SegmentationKind::LabeledPores
        )
    }
}

/// The segmentation kind of a run plus its highlight parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationProfile {
    pub kind: SegmentationKind,
    /// Pores below `min_allowed_value + highlight_threshold` are highlighted.
    pub highlight_threshold: i64,
    pub min_allowed_value: i64,
}

impl SegmentationProfile {
    pub const DEFAULT_HIGHLIGHT_THRESHOLD: i64 = 60;

    pub fn new(kind: SegmentationKind) -> Self {
        Self {
            kind,
            highlight_threshold: Self::DEFAULT_HIGHLIGHT_THRESHOLD,
            min_allowed_value: 0,
        }
    }

    /// Match a segmentation tag. Case-sensitive; underscores count as spaces.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownSegmentationType` for any other tag.
    pub fn classify(tag: &str) -> Result<Self, ConfigError> {
        let normalized = tag.replace('_', " ");
        SegmentationKind::TAGS
            .iter()
            .find(|(_, tags)| tags.contains(&normalized.as_str()))
            .map(|(kind, _)| Self::new(*kind))
            .ok_or_else(|| ConfigError::UnknownSegmentationType(tag.to_string()))
    }

    pub fn with_highlight_threshold(mut self, threshold: i64) -> Self {
        self.highlight_threshold = threshold;
        self
    }

    pub fn with_min_allowed_value(mut self, value: i64) -> Self {
        self.min_allowed_value = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_tag() {
        for (kind, tags) in SegmentationKind::TAGS {
            for tag in tags {
                assert_eq!(SegmentationProfile::classify(tag).unwrap().kind, kind);
            }
            assert_eq!(kind.tag(), tags[0]);
        }
    }

    #[test]
    fn underscores_are_spaces() {
        let profile = SegmentationProfile::classify("Projecao_Segmentada_Fases").unwrap();
        assert_eq!(profile.kind, SegmentationKind::CategoricalPhases);
        let profile = SegmentationProfile::classify("labeled_pore").unwrap();
        assert_eq!(profile.kind, SegmentationKind::LabeledPores);
    }

    #[test]
    fn tags_are_case_sensitive() {
        let err = SegmentationProfile::classify("Segmented Phases").unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownSegmentationType(tag) if tag == "Segmented Phases")
        );
    }

    #[test]
    fn defaults() {
        let profile = SegmentationProfile::classify("segmented pore").unwrap();
        assert_eq!(profile.highlight_threshold, 60);
        assert_eq!(profile.min_allowed_value, 0);
        let profile = profile.with_highlight_threshold(5).with_min_allowed_value(2);
        assert_eq!((profile.highlight_threshold, profile.min_allowed_value), (5, 2));
    }

    #[test]
    fn colored_kinds() {
        assert!(SegmentationKind::CategoricalPhases.is_colored());
        assert!(SegmentationKind::LabeledPores.is_colored());
        assert!(!SegmentationKind::ThresholdPores.is_colored());
        assert!(!SegmentationKind::Intensity.is_colored());
    }
}
