#![warn(missing_docs)]
//!# densenet - `DenseNet` for Burn
//!
//! ## Notable Components
//!
//! * [`errors`] - configuration and model function errors.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks::composite`] - ``BatchNorm -> ReLU -> Conv2d -> Dropout``.
//! * [`models`] - complete model families.
//!   * [`models::densenet`] - `DenseNet` and `DenseNet-BC`.
//! * [`estimator`] - mode-driven model function, training driver and
//!   `burn-train` integration.
//! * [`prefabs`] - named, well-known configurations.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod errors;
pub mod estimator;
pub mod layers;
pub mod models;
pub mod prefabs;
pub mod utility;
