//! # Miscellaneous Blocks

pub mod composite;
