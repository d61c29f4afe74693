use std::borrow::Cow;

use ndarray::{Array2, Array3, Array4, ArrayView2, Axis as ArrayAxis, s};

use crate::enums::Axis;

/// Immutable 3D block of samples laid out `(x, y, z)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    data: Array3<f64>,
}

impl Volume {
    pub fn new(data: Array3<f64>) -> Self {
        Self { data }
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Number of slices along `axis`.
    pub fn extent(&self, axis: Axis) -> usize {
        self.data.len_of(ArrayAxis(axis.index()))
    }

    pub fn get_slice_from_axis(&self, index: usize, axis: Axis) -> Option<ArrayView2<'_, f64>> {
        if !self.is_valid_index(index, axis) {
            return None;
        }
        let slice = match axis {
            Axis::X => self.data.slice(s![index, .., ..]),
            Axis::Y => self.data.slice(s![.., index, ..]),
            Axis::Z => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    fn is_valid_index(&self, index: usize, axis: Axis) -> bool {
        index < self.extent(axis)
    }
}

/// A loaded scan: one volume, or a time series of volumes stacked on a 4th axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Scan {
    Volume(Volume),
    Series(Array4<f64>),
}

impl Scan {
    pub fn is_series(&self) -> bool {
        matches!(self, Scan::Series(_))
    }

    pub fn frame_count(&self) -> usize {
        match self {
            Scan::Volume(_) => 1,
            Scan::Series(data) => data.len_of(ArrayAxis(3)),
        }
    }

    pub fn frame(&self, index: usize) -> Option<Cow<'_, Volume>> {
        match self {
            Scan::Volume(volume) => (index == 0).then_some(Cow::Borrowed(volume)),
            Scan::Series(data) => (index < data.len_of(ArrayAxis(3)))
                .then(|| Cow::Owned(Volume::new(data.index_axis(ArrayAxis(3), index).to_owned()))),
        }
    }
}

/// Rotate a slice 90° counter-clockwise without copying.
pub fn rot90(slice: ArrayView2<'_, f64>) -> ArrayView2<'_, f64> {
    let mut rotated = slice.reversed_axes();
    rotated.invert_axis(ArrayAxis(0));
    rotated
}

/// Mirror intensities so the brightest sample becomes 0.
pub fn invert_intensities(slice: &ArrayView2<'_, f64>) -> Array2<f64> {
    let max = slice
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    slice.mapv(|value| max - value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, array};

    fn volume() -> Volume {
        Volume::new(Array::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as f64))
    }

    #[test]
    fn slices_along_each_axis() {
        let volume = volume();
        assert_eq!(volume.extent(Axis::X), 2);
        assert_eq!(volume.extent(Axis::Y), 3);
        assert_eq!(volume.extent(Axis::Z), 4);

        let x = volume.get_slice_from_axis(1, Axis::X).unwrap();
        assert_eq!(x.dim(), (3, 4));
        assert_eq!(x[[2, 3]], 123.0);

        let y = volume.get_slice_from_axis(2, Axis::Y).unwrap();
        assert_eq!(y.dim(), (2, 4));
        assert_eq!(y[[1, 3]], 123.0);

        let z = volume.get_slice_from_axis(3, Axis::Z).unwrap();
        assert_eq!(z.dim(), (2, 3));
        assert_eq!(z[[1, 2]], 123.0);

        assert!(volume.get_slice_from_axis(4, Axis::Z).is_none());
    }

    #[test]
    fn rot90_turns_counter_clockwise() {
        let slice = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(rot90(slice.view()), array![[3.0, 6.0], [2.0, 5.0], [1.0, 4.0]]);
    }

    #[test]
    fn invert_mirrors_around_max() {
        let slice = array![[0.0, 2.0], [5.0, 1.0]];
        assert_eq!(invert_intensities(&slice.view()), array![[5.0, 3.0], [0.0, 4.0]]);
    }

    #[test]
    fn series_frames() {
        let data = Array4::from_shape_fn((2, 2, 2, 3), |(_, _, _, t)| t as f64);
        let scan = Scan::Series(data);
        assert!(scan.is_series());
        assert_eq!(scan.frame_count(), 3);
        assert_eq!(scan.frame(2).unwrap().data()[[1, 1, 1]], 2.0);
        assert!(scan.frame(3).is_none());

        let single = Scan::Volume(volume());
        assert_eq!(single.frame_count(), 1);
        assert!(matches!(single.frame(0), Some(Cow::Borrowed(_))));
    }
}
