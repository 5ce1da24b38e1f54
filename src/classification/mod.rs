//! # Classification of closed trajectories
//!
//! * [`params`] – [`ClassifierParams`], tunable thresholds (builder + TOML).
//! * [`classifier`] – [`TrajectoryClassifier`] and its [`Verdict`].
pub mod classifier;
pub mod params;

pub use classifier::{TrajectoryClassifier, Verdict};
pub use params::{ClassifierParams, ClassifierParamsBuilder};
