//! # Error Types
//!
//! [`ConfigError`] covers invalid hyperparameters and broken model structure;
//! [`EstimatorError`] covers misuse of the model function.

use crate::estimator::mode::Mode;
use thiserror::Error;

/// Invalid model configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A size field which must be positive was zero.
    #[error("{field} must be > 0")]
    ZeroSize {
        /// The offending field.
        field: &'static str,
    },

    /// The depth is too shallow to give every block at least one layer.
    #[error(
        "depth {depth} gives no layers per block for {total_blocks} blocks (bc_mode={bc_mode})"
    )]
    DepthTooShallow {
        /// Configured depth.
        depth: usize,
        /// Configured block count.
        total_blocks: usize,
        /// Whether bottleneck mode is on.
        bc_mode: bool,
    },

    /// The transition reduction is outside ``(0, 1]``.
    #[error("reduction must be in (0, 1]: {reduction}")]
    InvalidReduction {
        /// Configured reduction.
        reduction: f64,
    },

    /// The dropout rate is outside ``[0, 1)``.
    #[error("dropout_rate must be in [0, 1): {dropout_rate}")]
    InvalidDropout {
        /// Configured dropout rate.
        dropout_rate: f64,
    },

    /// Adjacent stages do not agree on channel counts.
    #[error("{stage}: expected {expected} input channels, found {actual}")]
    ChannelMismatch {
        /// Description of the stage.
        stage: String,
        /// Channels produced by the previous stage.
        expected: usize,
        /// Channels consumed by this stage.
        actual: usize,
    },

    /// A transition compresses its input to zero channels.
    #[error("{stage}: compresses {in_channels} channels to 0")]
    EmptyTransition {
        /// Description of the stage.
        stage: String,
        /// Channels entering the transition.
        in_channels: usize,
    },

    /// The structure has no dense blocks, or the wrong number of transitions.
    #[error("{blocks} dense blocks require {expected} transitions, found {actual}")]
    TransitionCount {
        /// Number of dense blocks.
        blocks: usize,
        /// Required transitions.
        expected: usize,
        /// Configured transitions.
        actual: usize,
    },

    /// No prefab is registered under the name.
    #[error("unknown prefab \"{name}\"; available: {available:?}")]
    UnknownPrefab {
        /// The requested name.
        name: String,
        /// Registered names.
        available: Vec<&'static str>,
    },
}

/// Model function misuse.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimatorError {
    /// Training and evaluation need labels.
    #[error("labels are required in {0} mode")]
    MissingLabels(Mode),

    /// Images and labels disagree on batch size.
    #[error("images batch ({images}) != labels batch ({labels})")]
    BatchMismatch {
        /// Batch size of the images.
        images: usize,
        /// Batch size of the labels.
        labels: usize,
    },

    /// The learning rate must be finite and positive.
    #[error("learning rate must be finite and > 0: {0}")]
    InvalidLearningRate(f64),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
