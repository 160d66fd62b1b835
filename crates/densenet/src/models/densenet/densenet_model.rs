//! # `DenseNet` Core Model
//!
//! [`DenseNet`] is the core `DenseNet` module.
//!
//! [`DenseNetConfig`] implements [`Config`], and provides
//! a high-level hyperparameter interface.
//! It provides [`DenseNetConfig::to_structure`] to convert
//! to a [`DenseNetStructureConfig`].
//!
//! [`DenseNetStructureConfig`] implements [`Config`], and provides
//! [`DenseNetStructureConfig::init`] to initialize a [`DenseNet`].
//!
//! [`DenseNet`] implements [`Module`], and provides
//! [`DenseNet::forward`] and [`DenseNet::predict`].

use crate::errors::ConfigError;
use crate::layers::blocks::composite::VARIANCE_SCALING_INITIALIZER;
use crate::models::densenet::dense_block::{DenseBlock, DenseBlockConfig, DenseBlockMeta};
use crate::models::densenet::head::{ClassificationHead, ClassificationHeadConfig};
use crate::models::densenet::transition::{
    Transition, TransitionConfig, TransitionMeta, compressed_channels,
};
use bimm_contracts::unpack_shape_contract;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Config, Int, Tensor};
use burn::tensor::activation::softmax;

/// Stem width when bottleneck mode is off.
pub const DEFAULT_FIRST_OUTPUT_FEATURES: usize = 16;

/// High-level `DenseNet` model configuration.
///
/// Holds the architecture hyperparameters, and the training
/// hyperparameters which travel with them.
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Number of classification classes.
    pub num_classes: usize,

    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Channels added by each dense layer (``k``).
    #[config(default = 12)]
    pub growth_rate: usize,

    /// Total network depth (``L``).
    #[config(default = 40)]
    pub depth: usize,

    /// Number of dense blocks.
    #[config(default = 3)]
    pub total_blocks: usize,

    /// Use bottleneck layers and compressing transitions (`DenseNet-BC`).
    #[config(default = "false")]
    pub bc_mode: bool,

    /// Transition compression factor (``theta``), used in BC mode.
    #[config(default = "0.5")]
    pub reduction: f64,

    /// Dropout probability after each convolution.
    #[config(default = "0.2")]
    pub dropout_rate: f64,

    /// L2 weight decay.
    #[config(default = "1e-4")]
    pub weight_decay: f64,

    /// Nesterov momentum.
    #[config(default = "0.9")]
    pub nesterov_momentum: f64,

    /// Bottleneck width, as a multiple of `growth_rate`.
    #[config(default = 4)]
    pub bottleneck_width: usize,

    /// Batch norm epsilon.
    #[config(default = "1e-3")]
    pub norm_epsilon: f64,

    /// Batch norm running-statistics momentum.
    #[config(default = "1e-3")]
    pub norm_momentum: f64,
}

impl DenseNetConfig {
    /// Output channels of the stem convolution.
    ///
    /// ``2 * growth_rate`` in BC mode, else ``16``.
    pub fn first_output_features(&self) -> usize {
        if self.bc_mode {
            2 * self.growth_rate
        } else {
            DEFAULT_FIRST_OUTPUT_FEATURES
        }
    }

    /// Dense layers per block.
    ///
    /// ``(depth - (total_blocks + 1)) / total_blocks``, halved in BC mode
    /// (each BC layer holds two convolutions).
    pub fn layers_per_block(&self) -> usize {
        if self.total_blocks == 0 {
            return 0;
        }
        let layers = self.depth.saturating_sub(self.total_blocks + 1) / self.total_blocks;
        if self.bc_mode { layers / 2 } else { layers }
    }

    /// Effective transition reduction; `1.0` unless in BC mode.
    pub fn effective_reduction(&self) -> f64 {
        if self.bc_mode { self.reduction } else { 1.0 }
    }

    /// Whether `depth` is exactly accounted for by the derived layer counts.
    pub fn is_exact_depth(&self) -> bool {
        let convs_per_layer = if self.bc_mode { 2 } else { 1 };
        self.total_blocks * self.layers_per_block() * convs_per_layer + self.total_blocks + 1
            == self.depth
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("num_classes", self.num_classes),
            ("in_channels", self.in_channels),
            ("growth_rate", self.growth_rate),
            ("total_blocks", self.total_blocks),
            ("bottleneck_width", self.bottleneck_width),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSize { field });
            }
        }
        if self.layers_per_block() == 0 {
            return Err(ConfigError::DepthTooShallow {
                depth: self.depth,
                total_blocks: self.total_blocks,
                bc_mode: self.bc_mode,
            });
        }
        if !(self.reduction > 0.0 && self.reduction <= 1.0) {
            return Err(ConfigError::InvalidReduction {
                reduction: self.reduction,
            });
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ConfigError::InvalidDropout {
                dropout_rate: self.dropout_rate,
            });
        }

        let mut channels = self.first_output_features();
        for idx in 0..self.total_blocks - 1 {
            channels += self.layers_per_block() * self.growth_rate;
            let compressed = compressed_channels(channels, self.effective_reduction());
            if compressed == 0 {
                return Err(ConfigError::EmptyTransition {
                    stage: format!("transitions[{idx}]"),
                    in_channels: channels,
                });
            }
            channels = compressed;
        }
        Ok(())
    }

    /// Convert to a [`DenseNetStructureConfig`].
    pub fn try_to_structure(&self) -> Result<DenseNetStructureConfig, ConfigError> {
        self.try_validate()?;
        if !self.is_exact_depth() {
            tracing::warn!(
                depth = self.depth,
                total_blocks = self.total_blocks,
                layers_per_block = self.layers_per_block(),
                "depth is not evenly divisible across blocks; rounding down"
            );
        }

        let layers_per_block = self.layers_per_block();
        let bottleneck_width = self.bc_mode.then_some(self.bottleneck_width);
        let reduction = self.effective_reduction();

        let stem = Conv2dConfig::new([self.in_channels, self.first_output_features()], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(VARIANCE_SCALING_INITIALIZER);

        let mut channels = self.first_output_features();
        let mut blocks = Vec::with_capacity(self.total_blocks);
        let mut transitions = Vec::with_capacity(self.total_blocks - 1);
        for idx in 0..self.total_blocks {
            let block = DenseBlockConfig::build(
                layers_per_block,
                channels,
                self.growth_rate,
                bottleneck_width,
                self.dropout_rate,
            )
            .with_norm(self.norm_epsilon, self.norm_momentum);
            channels = block.out_channels();
            blocks.push(block);

            // The last block feeds the head directly.
            if idx + 1 < self.total_blocks {
                let transition = TransitionConfig::compressing(channels, reduction)
                    .with_dropout(self.dropout_rate)
                    .with_norm_epsilon(self.norm_epsilon)
                    .with_norm_momentum(self.norm_momentum);
                channels = transition.out_channels();
                transitions.push(transition);
            }
        }

        let head = ClassificationHeadConfig::new(channels, self.num_classes)
            .with_norm_epsilon(self.norm_epsilon)
            .with_norm_momentum(self.norm_momentum);

        let structure = DenseNetStructureConfig::new(stem, blocks, transitions, head);
        structure.try_validate()?;
        Ok(structure)
    }

    /// Convert to a [`DenseNetStructureConfig`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn to_structure(&self) -> DenseNetStructureConfig {
        match self.try_to_structure() {
            Ok(structure) => structure,
            Err(err) => panic!("{err}\n{self:#?}"),
        }
    }

    /// Validate, convert, and initialize a [`DenseNet`].
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<DenseNet<B>, ConfigError> {
        let structure = self.try_to_structure()?;
        tracing::info!(
            total_blocks = self.total_blocks,
            layers_per_block = self.layers_per_block(),
            bc_mode = self.bc_mode,
            reduction = self.effective_reduction(),
            "Building DenseNet"
        );
        Ok(structure.init(device))
    }
}

/// [`DenseNet`] Structure Config.
///
/// This config defines the structure of a converted `DenseNet` model.
/// It is not a semantic configuration; sizes are checked for continuity
/// but not re-derived.
#[derive(Config, Debug)]
pub struct DenseNetStructureConfig {
    /// The stem convolution.
    pub stem: Conv2dConfig,

    /// The dense blocks.
    pub blocks: Vec<DenseBlockConfig>,

    /// The transitions; one between each pair of blocks.
    pub transitions: Vec<TransitionConfig>,

    /// The classification head.
    pub head: ClassificationHeadConfig,
}

impl DenseNetStructureConfig {
    /// Check channel continuity through the network.
    pub fn try_validate(&self) -> Result<(), ConfigError> {
        if self.blocks.is_empty() || self.transitions.len() + 1 != self.blocks.len() {
            return Err(ConfigError::TransitionCount {
                blocks: self.blocks.len(),
                expected: self.blocks.len().saturating_sub(1),
                actual: self.transitions.len(),
            });
        }

        let check = |stage: String, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(ConfigError::ChannelMismatch {
                    stage,
                    expected,
                    actual,
                })
            }
        };

        let mut channels = self.stem.channels[1];
        for (idx, block) in self.blocks.iter().enumerate() {
            block.try_validate()?;
            check(format!("blocks[{idx}]"), channels, block.in_channels())?;
            channels = block.out_channels();

            if let Some(transition) = self.transitions.get(idx) {
                check(
                    format!("transitions[{idx}]"),
                    channels,
                    transition.in_channels(),
                )?;
                if transition.out_channels() == 0 {
                    return Err(ConfigError::EmptyTransition {
                        stage: format!("transitions[{idx}]"),
                        in_channels: transition.in_channels(),
                    });
                }
                channels = transition.out_channels();
            }
        }
        check("head".to_string(), channels, self.head.in_channels)
    }

    /// Initialize a [`DenseNet`] model.
    ///
    /// # Panics
    ///
    /// If the structure is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> DenseNet<B> {
        if let Err(err) = self.try_validate() {
            panic!("{err}\n{self:#?}");
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            tracing::debug!(
                block = idx,
                layers = block.len(),
                in_channels = block.in_channels(),
                out_channels = block.out_channels(),
                "dense block"
            );
        }

        DenseNet {
            stem: self.stem.init(device),
            blocks: self
                .blocks
                .into_iter()
                .map(|c| c.init(device))
                .collect(),
            transitions: self
                .transitions
                .into_iter()
                .map(|c| c.init(device))
                .collect(),
            head: self.head.init(device),
        }
    }
}

/// Class predictions.
#[derive(Debug, Clone)]
pub struct Predictions<B: Backend> {
    /// ``[batch]`` arg-max class indices.
    pub classes: Tensor<B, 1, Int>,

    /// ``[batch, num_classes]`` softmax probabilities.
    pub probabilities: Tensor<B, 2>,
}

impl<B: Backend> Predictions<B> {
    /// Derive predictions from ``[batch, num_classes]`` logits.
    pub fn from_logits(logits: Tensor<B, 2>) -> Self {
        let probabilities = softmax(logits, 1);
        let classes = probabilities.clone().argmax(1).squeeze::<1>(1);
        Self {
            classes,
            probabilities,
        }
    }

    /// Fraction of `classes` equal to `labels`, as a single-element tensor.
    pub fn accuracy(
        &self,
        labels: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        self.classes.clone().equal(labels).float().mean()
    }
}

/// `DenseNet` model.
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    /// Initial convolution.
    pub stem: Conv2d<B>,

    /// Dense blocks.
    pub blocks: Vec<DenseBlock<B>>,

    /// Transitions; ``transitions[i]`` follows ``blocks[i]``.
    pub transitions: Vec<Transition<B>>,

    /// Classification head.
    pub head: ClassificationHead<B>,
}

impl<B: Backend> DenseNet<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.stem.weight.shape().dims[1] * self.stem.groups
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.head.num_classes()
    }

    /// Resolution of the feature map entering the head.
    pub fn feature_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.transitions
            .iter()
            .fold(input_resolution, |res, t| t.output_resolution(res))
    }

    /// `DenseNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]`` images.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [_batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.stem.forward(input);

        let x = self
            .blocks
            .iter()
            .enumerate()
            .fold(x, |x, (idx, block)| {
                let x = block.forward(x);
                match self.transitions.get(idx) {
                    Some(transition) => transition.forward(x),
                    None => x,
                }
            });

        self.head.forward(x)
    }

    /// Forward pass, returning class predictions.
    pub fn predict(
        &self,
        input: Tensor<B, 4>,
    ) -> Predictions<B> {
        Predictions::from_logits(self.forward(input))
    }

    /// Re-initialize the last layer with the specified number of output classes.
    pub fn with_classes(
        self,
        num_classes: usize,
    ) -> Self {
        Self {
            head: self.head.with_classes(num_classes),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::densenet::dense_layer::DenseLayerMeta;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};
    use hamcrest::prelude::*;

    #[test]
    fn test_derived_sizes() {
        let config = DenseNetConfig::new(10);
        assert_eq!(config.first_output_features(), 16);
        assert_eq!(config.layers_per_block(), 12);
        assert_eq!(config.effective_reduction(), 1.0);
        assert!(config.is_exact_depth());

        let config = DenseNetConfig::new(10)
            .with_depth(100)
            .with_growth_rate(12)
            .with_bc_mode(true);
        assert_eq!(config.first_output_features(), 24);
        assert_eq!(config.layers_per_block(), 16);
        assert_eq!(config.effective_reduction(), 0.5);
        assert!(config.is_exact_depth());

        let config = DenseNetConfig::new(10).with_depth(41);
        assert_eq!(config.layers_per_block(), 12);
        assert!(!config.is_exact_depth());

        let config = DenseNetConfig::new(10).with_depth(11).with_total_blocks(2);
        assert_eq!(config.layers_per_block(), 4);
    }

    #[test]
    fn test_validate() {
        assert_eq!(DenseNetConfig::new(10).try_validate(), Ok(()));
        assert_eq!(
            DenseNetConfig::new(0).try_validate(),
            Err(ConfigError::ZeroSize {
                field: "num_classes"
            })
        );
        assert_eq!(
            DenseNetConfig::new(10).with_total_blocks(0).try_validate(),
            Err(ConfigError::ZeroSize {
                field: "total_blocks"
            })
        );
        assert_eq!(
            DenseNetConfig::new(10)
                .with_depth(7)
                .with_bc_mode(true)
                .try_validate(),
            Err(ConfigError::DepthTooShallow {
                depth: 7,
                total_blocks: 3,
                bc_mode: true
            })
        );
        assert_eq!(
            DenseNetConfig::new(10).with_reduction(0.0).try_validate(),
            Err(ConfigError::InvalidReduction { reduction: 0.0 })
        );
        assert_eq!(
            DenseNetConfig::new(10).with_dropout_rate(1.0).try_validate(),
            Err(ConfigError::InvalidDropout { dropout_rate: 1.0 })
        );
    }

    #[test]
    fn test_validate_empty_transition() {
        // 4 -> 4 + 2*2 = 8 -> floor(8 * 0.1) = 0
        let config = DenseNetConfig::new(10)
            .with_depth(16)
            .with_growth_rate(2)
            .with_bc_mode(true)
            .with_reduction(0.1);
        let expected = ConfigError::EmptyTransition {
            stage: "transitions[0]".to_string(),
            in_channels: 8,
        };
        assert_eq!(config.try_validate(), Err(expected.clone()));
        assert_eq!(config.try_to_structure().unwrap_err(), expected);
        assert!(
            config
                .try_init::<NdArray<f32>>(&Default::default())
                .is_err()
        );

        // Non-BC mode ignores the reduction.
        assert_eq!(config.with_bc_mode(false).try_validate(), Ok(()));

        let mut structure = DenseNetConfig::new(10).with_depth(10).to_structure();
        structure.transitions[1].out_channels = 0;
        assert_eq!(
            structure.try_validate(),
            Err(ConfigError::EmptyTransition {
                stage: "transitions[1]".to_string(),
                in_channels: 32
            })
        );
    }

    #[test]
    fn test_to_structure() {
        let config = DenseNetConfig::new(10).with_depth(10).with_growth_rate(4);
        let structure = config.to_structure();
        structure.try_validate().unwrap();

        assert_eq!(structure.stem.channels, [3, 16]);
        assert_eq!(structure.blocks.len(), 3);
        assert_eq!(structure.transitions.len(), 2);

        // 16 -> 16 + 2*4 = 24 -> 24 + 8 = 32 -> 32 + 8 = 40
        let block_out: Vec<usize> = structure.blocks.iter().map(|b| b.out_channels()).collect();
        assert_eq!(block_out, vec![24, 32, 40]);
        assert!(structure.transitions.iter().all(|t| t.in_channels == t.out_channels));
        assert_eq!(structure.head.in_channels, 40);
        assert_eq!(structure.head.num_classes, 10);
        assert!(
            structure
                .blocks
                .iter()
                .flat_map(|b| b.layers.iter())
                .all(|l| !l.has_bottleneck() && l.dropout == 0.2)
        );
    }

    #[test]
    fn test_to_structure_bc() {
        let config = DenseNetConfig::new(100)
            .with_depth(16)
            .with_growth_rate(6)
            .with_bc_mode(true);
        assert_eq!(config.layers_per_block(), 2);

        let structure = config.to_structure();
        assert_eq!(structure.stem.channels, [3, 12]);

        // 12 -> 24 -> /2 12 -> 24 -> /2 12 -> 24
        let block_io: Vec<(usize, usize)> = structure
            .blocks
            .iter()
            .map(|b| (b.in_channels(), b.out_channels()))
            .collect();
        assert_eq!(block_io, vec![(12, 24), (12, 24), (12, 24)]);
        assert_eq!(structure.head.in_channels, 24);
        assert!(
            structure
                .blocks
                .iter()
                .flat_map(|b| b.layers.iter())
                .all(|l| l.bottleneck_width == Some(4))
        );
    }

    #[test]
    fn test_structure_validate() {
        let mut structure = DenseNetConfig::new(10).with_depth(10).to_structure();
        structure.head.in_channels += 1;
        assert!(matches!(
            structure.try_validate(),
            Err(ConfigError::ChannelMismatch { ref stage, .. }) if stage == "head"
        ));

        let mut structure = DenseNetConfig::new(10).with_depth(10).to_structure();
        structure.transitions.pop();
        assert_eq!(
            structure.try_validate(),
            Err(ConfigError::TransitionCount {
                blocks: 3,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_config_save_load() {
        let config = DenseNetConfig::new(10).with_bc_mode(true).with_depth(100);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("densenet.json");
        config.save(&path).unwrap();

        let loaded = DenseNetConfig::load(&path).unwrap();
        assert_eq!(loaded.num_classes, 10);
        assert!(loaded.bc_mode);
        assert_eq!(loaded.depth, 100);
        assert_eq!(loaded.layers_per_block(), config.layers_per_block());
    }

    #[test]
    fn test_densenet_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = DenseNetConfig::new(5)
            .with_depth(10)
            .with_growth_rate(4)
            .with_dropout_rate(0.0);
        let model: DenseNet<B> = config.try_init(&device).unwrap();

        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.num_classes(), 5);
        assert_eq!(model.blocks.len(), 3);
        assert_eq!(model.transitions.len(), 2);
        assert_eq!(model.feature_resolution([32, 32]), [8, 8]);

        let input: Tensor<B, 4> = Tensor::random([2, 3, 16, 16], Distribution::Default, &device);
        let logits = model.forward(input.clone());
        assert_eq!(logits.dims(), [2, 5]);

        let predictions = model.predict(input);
        assert_eq!(predictions.classes.dims(), [2]);
        assert_eq!(predictions.probabilities.dims(), [2, 5]);

        let sums = predictions
            .probabilities
            .clone()
            .sum_dim(1)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        for sum in sums {
            assert_that!(sum as f64, is(close_to(1.0, 1e-5)));
        }

        let model = model.with_classes(2);
        assert_eq!(model.num_classes(), 2);
    }

    #[test]
    fn test_predictions_from_logits() {
        type B = NdArray<f32>;
        let device = Default::default();

        let logits: Tensor<B, 2> = Tensor::from_data(
            TensorData::from([[0.0, 2.0, 1.0], [3.0, -1.0, 0.0], [0.0, 0.0, 5.0]]),
            &device,
        );
        let predictions = Predictions::from_logits(logits);
        predictions
            .classes
            .to_data()
            .assert_eq(&TensorData::from([1i64, 0, 2]), false);

        let labels: Tensor<B, 1, Int> = Tensor::from_data(TensorData::from([1i64, 2, 2]), &device);
        let accuracy = predictions.accuracy(labels).into_scalar();
        assert_that!(accuracy as f64, is(close_to(2.0 / 3.0, 1e-6)));
    }
}
