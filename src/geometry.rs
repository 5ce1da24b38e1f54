//! # Geometric and statistical helpers
//!
//! Small building blocks shared by the tracker, the classifier and the segment extractor:
//!
//! * [`BoundingBox`] – axis-aligned running bounding box over [`Position`]s.
//! * [`nan_mean`] / [`nan_std`] / [`sample_std`] – NaN-aware moments (population std for
//!   `nan_std`, `n − 1` denominator for `sample_std`).
use crate::constants::Position;

/// Axis-aligned bounding box grown one point at a time.
///
/// An empty box has `min = +∞` and `max = −∞` on every axis, so that the first
/// [`extend`](BoundingBox::extend) sets both bounds to the point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Position,
    pub max: Position,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn empty() -> Self {
        BoundingBox {
            min: Position::repeat(f64::INFINITY),
            max: Position::repeat(f64::NEG_INFINITY),
        }
    }

    /// Bounding box of a sequence of points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Position>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.extend(p);
        }
        bbox
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    #[inline]
    pub fn extend(&mut self, p: &Position) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Per-axis extent (`max − min`); zero for an empty box.
    pub fn extent(&self) -> Position {
        if self.is_empty() {
            Position::zeros()
        } else {
            self.max - self.min
        }
    }

    /// Euclidean norm of the extent, i.e. the length of the box diagonal.
    pub fn span(&self) -> f64 {
        self.extent().norm()
    }

    /// Return true if any axis extent is strictly greater than `limit`.
    pub fn any_extent_exceeds(&self, limit: f64) -> bool {
        self.extent().iter().any(|e| *e > limit)
    }
}

/// Mean of the non-NaN values, NaN when there is none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Population standard deviation of the non-NaN values, NaN when there is none.
pub fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sq, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    (sq / n as f64).sqrt()
}

/// Sample standard deviation (`n − 1` denominator), NaN for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sq / (n - 1) as f64).sqrt()
}

/// Minimum Euclidean distance from `p` to a set of positions, `None` for an empty set.
pub fn min_distance_to(p: &Position, others: &[Position]) -> Option<f64> {
    others
        .iter()
        .map(|o| (p - o).norm())
        .filter(|d| !d.is_nan())
        .min_by(f64::total_cmp)
}

#[cfg(test)]
mod geometry_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bbox_span() {
        let points = [
            Position::new(0.0, 0.0, 0.0),
            Position::new(3.0, -4.0, 0.0),
            Position::new(1.0, 1.0, 12.0),
        ];
        let bbox = BoundingBox::from_points(points.iter());
        assert_eq!(bbox.min, Position::new(0.0, -4.0, 0.0));
        assert_eq!(bbox.max, Position::new(3.0, 1.0, 12.0));
        assert_relative_eq!(bbox.span(), (9.0_f64 + 25.0 + 144.0).sqrt());
        assert!(bbox.any_extent_exceeds(11.0));
        assert!(!bbox.any_extent_exceeds(12.0));
    }

    #[test]
    fn test_empty_bbox() {
        let bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        assert_eq!(bbox.span(), 0.0);
        assert!(!bbox.any_extent_exceeds(0.0));
    }

    #[test]
    fn test_nan_moments() {
        let values = [1.0, f64::NAN, 3.0];
        assert_relative_eq!(nan_mean(&values), 2.0);
        assert_relative_eq!(nan_std(&values), 1.0);
        assert!(nan_mean(&[f64::NAN]).is_nan());
        assert!(nan_std(&[]).is_nan());
    }

    #[test]
    fn test_sample_std() {
        assert_relative_eq!(sample_std(&[1.0, 2.0, 3.0, 4.0]), 1.2909944487358056);
        assert!(sample_std(&[5.0]).is_nan());
    }

    #[test]
    fn test_min_distance() {
        let anchors = [Position::new(10.0, 0.0, 0.0), Position::new(0.0, 3.0, 4.0)];
        assert_relative_eq!(
            min_distance_to(&Position::zeros(), &anchors).unwrap(),
            5.0
        );
        assert!(min_distance_to(&Position::zeros(), &[]).is_none());
    }
}
