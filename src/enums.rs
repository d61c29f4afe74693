use std::fmt;

/// Volume axis that is iterated to produce 2D slices.
///
/// Volumes are laid out `(x, y, z)`, so a Z slice is `data[.., .., k]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Name of the output sub-directory used when reslicing.
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// Only Z slices are mirrored top-bottom before they are written.
    pub fn flips_on_save(self) -> bool {
        matches!(self, Axis::Z)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    /// Keep file-name order.
    #[default]
    None,
}

/// Which slices (or frames) of an extent get converted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexSelection {
    #[default]
    All,
    Middle,
    Index(usize),
}

impl IndexSelection {
    /// Parses the command line form: empty for all, `m` for the middle, or an index.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            Some(IndexSelection::All)
        } else if value.eq_ignore_ascii_case("m") {
            Some(IndexSelection::Middle)
        } else {
            value.parse().ok().map(IndexSelection::Index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_z_flips() {
        assert!(!Axis::X.flips_on_save());
        assert!(!Axis::Y.flips_on_save());
        assert!(Axis::Z.flips_on_save());
    }

    #[test]
    fn parse_index_selection() {
        assert_eq!(IndexSelection::parse(""), Some(IndexSelection::All));
        assert_eq!(IndexSelection::parse("M"), Some(IndexSelection::Middle));
        assert_eq!(IndexSelection::parse("12"), Some(IndexSelection::Index(12)));
        assert_eq!(IndexSelection::parse("-1"), None);
    }
}
