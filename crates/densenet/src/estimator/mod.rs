//! # Estimator Interface
//!
//! A mode-driven model function for [`crate::models::densenet::DenseNet`],
//! a stateful training driver, and `burn-train` integration.
//!
//! * [`mode::Mode`] - `Train`, `Eval` or `Predict`.
//! * [`spec::Features`] / [`spec::EstimatorSpec`] - model function I/O.
//! * [`preprocess`] - crop-or-pad and standardization.
//! * [`driver::DenseNetEstimator`] - model, optimizer and global step.
//! * [`learner::DenseNetBatch`] - `TrainStep` / `ValidStep` batches.

pub mod driver;
pub mod learner;
pub mod mode;
pub mod model_fn;
pub mod preprocess;
pub mod spec;

pub use driver::{DenseNetEstimator, DenseNetSgd, EvalReport, TrainReport};
pub use mode::Mode;
pub use spec::{EstimatorSpec, EvalMetrics, Features, TrainOp};
