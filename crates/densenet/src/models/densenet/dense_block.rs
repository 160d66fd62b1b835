//! # `DenseNet` Dense Block
//!
//! A [`DenseBlock`] is a sequence of [`DenseLayer`]s; each layer sees the
//! concatenation of the block input and every preceding layer's output.
//!
//! [`DenseBlockMeta`] defines a common meta API for [`DenseBlock`]
//! and [`DenseBlockConfig`].
//!
//! [`DenseBlockConfig`] implements [`Config`], and provides
//! [`DenseBlockConfig::init`] to initialize a [`DenseBlock`].
//!
//! [`DenseBlock`] implements [`Module`], and provides
//! [`DenseBlock::forward`].

use crate::errors::ConfigError;
use crate::models::densenet::dense_layer::{DenseLayer, DenseLayerConfig, DenseLayerMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`DenseBlock`] Meta API.
pub trait DenseBlockMeta {
    /// The number of layers.
    fn len(&self) -> usize;

    /// Check if the block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    fn out_channels(&self) -> usize;
}

/// [`DenseBlock`] Configuration.
#[derive(Config, Debug)]
pub struct DenseBlockConfig {
    /// The component layers.
    pub layers: Vec<DenseLayerConfig>,
}

impl From<Vec<DenseLayerConfig>> for DenseBlockConfig {
    fn from(layers: Vec<DenseLayerConfig>) -> Self {
        Self { layers }
    }
}

impl DenseBlockMeta for DenseBlockConfig {
    fn len(&self) -> usize {
        self.layers.len()
    }

    fn in_channels(&self) -> usize {
        self.layers[0].in_channels()
    }

    fn out_channels(&self) -> usize {
        self.layers[self.layers.len() - 1].out_channels()
    }
}

impl DenseBlockConfig {
    /// Build a config.
    ///
    /// # Arguments
    ///
    /// - `num_layers`: the number of dense layers.
    /// - `in_channels`: channels entering the block.
    /// - `growth_rate`: channels added by each layer.
    /// - `bottleneck_width`: optional bottleneck width, as a multiple of `growth_rate`.
    /// - `dropout`: dropout probability of each composite function.
    pub fn build(
        num_layers: usize,
        in_channels: usize,
        growth_rate: usize,
        bottleneck_width: Option<usize>,
        dropout: f64,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|idx| {
                DenseLayerConfig::new(in_channels + idx * growth_rate, growth_rate)
                    .with_bottleneck_width(bottleneck_width)
                    .with_dropout(dropout)
            })
            .collect();

        Self { layers }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::ZeroSize { field: "layers" });
        }

        for idx in 1..self.layers.len() {
            let prev = &self.layers[idx - 1];
            let curr = &self.layers[idx];
            if prev.out_channels() != curr.in_channels() {
                return Err(ConfigError::ChannelMismatch {
                    stage: format!("layers[{idx}]"),
                    expected: prev.out_channels(),
                    actual: curr.in_channels(),
                });
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{err}\n{self:#?}");
        }
    }

    /// Set the norm parameters of every layer.
    pub fn with_norm(
        self,
        epsilon: f64,
        momentum: f64,
    ) -> Self {
        Self {
            layers: self
                .layers
                .into_iter()
                .map(|layer| {
                    layer
                        .with_norm_epsilon(epsilon)
                        .with_norm_momentum(momentum)
                })
                .collect(),
        }
    }

    /// Initialize a new [`DenseBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> DenseBlock<B> {
        self.expect_valid();

        DenseBlock {
            layers: self
                .layers
                .into_iter()
                .map(|layer| layer.init(device))
                .collect(),
        }
    }
}

/// Dense block.
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    /// Internal layers.
    pub layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlockMeta for DenseBlock<B> {
    fn len(&self) -> usize {
        self.layers.len()
    }

    fn in_channels(&self) -> usize {
        self.layers[0].in_channels()
    }

    fn out_channels(&self) -> usize {
        self.layers[self.layers.len() - 1].out_channels()
    }
}

impl<B: Backend> DenseBlock<B> {
    /// Apply the dense block.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, in_channels + len * growth_rate, height, width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.layers.iter().fold(input, |x, layer| layer.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("height", height),
                ("width", width)
            ]
        );

        x
    }
}
