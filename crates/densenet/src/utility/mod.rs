//! # Utilities

pub mod probability;
