//! # `DenseNet`
//!
//! Densely connected convolutional networks, with optional
//! bottleneck / compression ("BC") mode.

pub mod dense_block;
pub mod dense_layer;
pub mod densenet_model;
pub mod head;
pub mod prefabs;
pub mod transition;

pub use densenet_model::*;
pub use prefabs::PREFAB_DENSENET_MAP;
