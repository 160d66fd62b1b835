//! # Complete Model Families

pub mod densenet;
