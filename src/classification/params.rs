//! Thresholds of the target-stimulus classifier.
use std::fmt;

use serde::Deserialize;

use crate::{
    constants::{
        Millimeter, DEFAULT_DIRECTION_TOLERANCE, DEFAULT_MAX_POINT_STD, DEFAULT_MIN_ANCHOR_DISTANCE,
        DEFAULT_MIN_DISPLACEMENT, DEFAULT_MIN_HEIGHT, DEFAULT_MIN_LENGTH, DEFAULT_MIN_R2,
        DEFAULT_REFERENCE_DIRECTION,
    },
    tracking::params::{ge0, gt0, le},
    PerchTrackError,
};

/// Configuration of [`TrajectoryClassifier`](crate::classification::TrajectoryClassifier).
///
/// Fields
/// -----------------
/// * `min_displacement` – the bounding-box diagonal must be strictly larger (mm, default 500).
/// * `min_length` – the point count must be strictly larger (default 200).
/// * `min_r2` – the plane fit must explain strictly more variance (default 0.5).
/// * `reference_direction` – expected `[a, b]` slope of the plane `z ≈ a·x + b·y + c`
///   (default `[0, 0.5]`).
/// * `direction_tolerance` – maximum distance of `[a, b]` to the reference (default 2.0).
/// * `min_anchor_distance` – mean distance to the animal's rigid bodies must be strictly
///   larger (mm, default 80).
/// * `max_point_std` – per-frame spread must be strictly smaller (default 5.5).
/// * `min_height` – the lowest point must be at least this high (mm, default 200).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    pub min_displacement: Millimeter,
    pub min_length: usize,
    pub min_r2: f64,
    pub reference_direction: [f64; 2],
    pub direction_tolerance: f64,
    pub min_anchor_distance: Millimeter,
    pub max_point_std: f64,
    pub min_height: Millimeter,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        ClassifierParams {
            min_displacement: DEFAULT_MIN_DISPLACEMENT,
            min_length: DEFAULT_MIN_LENGTH,
            min_r2: DEFAULT_MIN_R2,
            reference_direction: DEFAULT_REFERENCE_DIRECTION,
            direction_tolerance: DEFAULT_DIRECTION_TOLERANCE,
            min_anchor_distance: DEFAULT_MIN_ANCHOR_DISTANCE,
            max_point_std: DEFAULT_MAX_POINT_STD,
            min_height: DEFAULT_MIN_HEIGHT,
        }
    }
}

impl ClassifierParams {
    pub fn builder() -> ClassifierParamsBuilder {
        ClassifierParamsBuilder::new()
    }

    pub fn validate(&self) -> Result<(), PerchTrackError> {
        let invalid = |msg: &str| Err(PerchTrackError::InvalidClassifierParameter(msg.into()));

        if !ge0(self.min_displacement) {
            return invalid("min_displacement must be >= 0");
        }
        if !le(self.min_r2, 1.0) {
            return invalid("min_r2 must be <= 1");
        }
        if self.reference_direction.iter().any(|v| !v.is_finite()) {
            return invalid("reference_direction must be finite");
        }
        if !gt0(self.direction_tolerance) {
            return invalid("direction_tolerance must be > 0");
        }
        if !ge0(self.min_anchor_distance) {
            return invalid("min_anchor_distance must be >= 0");
        }
        if !gt0(self.max_point_std) {
            return invalid("max_point_std must be > 0");
        }
        if !self.min_height.is_finite() {
            return invalid("min_height must be finite");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierParamsBuilder {
    params: ClassifierParams,
}

impl ClassifierParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_displacement(mut self, v: Millimeter) -> Self {
        self.params.min_displacement = v;
        self
    }
    pub fn min_length(mut self, v: usize) -> Self {
        self.params.min_length = v;
        self
    }
    pub fn min_r2(mut self, v: f64) -> Self {
        self.params.min_r2 = v;
        self
    }
    pub fn reference_direction(mut self, v: [f64; 2]) -> Self {
        self.params.reference_direction = v;
        self
    }
    pub fn direction_tolerance(mut self, v: f64) -> Self {
        self.params.direction_tolerance = v;
        self
    }
    pub fn min_anchor_distance(mut self, v: Millimeter) -> Self {
        self.params.min_anchor_distance = v;
        self
    }
    pub fn max_point_std(mut self, v: f64) -> Self {
        self.params.max_point_std = v;
        self
    }
    pub fn min_height(mut self, v: Millimeter) -> Self {
        self.params.min_height = v;
        self
    }

    pub fn build(self) -> Result<ClassifierParams, PerchTrackError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl fmt::Display for ClassifierParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "[Classifier]")?;
            writeln!(f, "  min_displacement    = {:.1} mm", self.min_displacement)?;
            writeln!(f, "  min_length          = {}", self.min_length)?;
            writeln!(f, "  min_r2              = {:.3}", self.min_r2)?;
            writeln!(
                f,
                "  reference_direction = [{:.3}, {:.3}]",
                self.reference_direction[0], self.reference_direction[1]
            )?;
            writeln!(f, "  direction_tolerance = {:.3}", self.direction_tolerance)?;
            writeln!(f, "  min_anchor_distance = {:.1} mm", self.min_anchor_distance)?;
            writeln!(f, "  max_point_std       = {:.3}", self.max_point_std)?;
            write!(f, "  min_height          = {:.1} mm", self.min_height)
        } else {
            write!(
                f,
                "ClassifierParams(span>{:.0}mm, len>{}, std<{}, anchor>{:.0}mm, z>={:.0}mm)",
                self.min_displacement,
                self.min_length,
                self.max_point_std,
                self.min_anchor_distance,
                self.min_height
            )
        }
    }
}

#[cfg(test)]
mod classifier_params_test {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(ClassifierParams::default().validate().is_ok());
        assert!(ClassifierParams::builder().min_r2(1.5).build().is_err());
        assert!(ClassifierParams::builder()
            .direction_tolerance(0.0)
            .build()
            .is_err());
        assert!(ClassifierParams::builder()
            .reference_direction([f64::NAN, 0.0])
            .build()
            .is_err());
        assert!(ClassifierParams::builder().max_point_std(-1.0).build().is_err());

        let p = ClassifierParams::builder().min_length(10).build().unwrap();
        assert_eq!(p.min_length, 10);
    }

    #[test]
    fn test_deserialize() {
        let p: ClassifierParams =
            toml::from_str("min_height = 150.0\nreference_direction = [0.1, 0.4]").unwrap();
        assert_eq!(p.min_height, 150.0);
        assert_eq!(p.reference_direction, [0.1, 0.4]);
        assert_eq!(p.min_length, DEFAULT_MIN_LENGTH);
    }
}
