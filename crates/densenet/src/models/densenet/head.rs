//! # `DenseNet` Classification Head
//!
//! ``BatchNorm -> ReLU -> global average pool -> Linear``.

use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Glorot-uniform initializer for the output projection.
pub const XAVIER_INITIALIZER: Initializer = Initializer::XavierUniform { gain: 1.0 };

/// [`ClassificationHead`] configuration.
#[derive(Config, Debug)]
pub struct ClassificationHeadConfig {
    /// The number of input channels.
    pub in_channels: usize,

    /// The number of classes.
    pub num_classes: usize,

    /// Batch norm epsilon.
    #[config(default = "1e-3")]
    pub norm_epsilon: f64,

    /// Batch norm running-statistics momentum.
    #[config(default = "1e-3")]
    pub norm_momentum: f64,
}

impl ClassificationHeadConfig {
    /// Initialize a [`ClassificationHead`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ClassificationHead<B> {
        ClassificationHead {
            norm: BatchNormConfig::new(self.in_channels)
                .with_epsilon(self.norm_epsilon)
                .with_momentum(self.norm_momentum)
                .init(device),
            act: Relu::new(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(self.in_channels, self.num_classes)
                .with_initializer(XAVIER_INITIALIZER)
                .init(device),
        }
    }
}

/// Final norm, pooling and projection to class logits.
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    /// Final norm.
    pub norm: BatchNorm<B, 2>,
    /// Final activation.
    pub act: Relu,
    /// Global average pool.
    pub pool: AdaptiveAvgPool2d,
    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    /// The number of input channels.
    pub fn in_channels(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    /// The number of classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.norm.forward(input);
        let x = self.act.forward(x);
        let x = self.pool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }

    /// Re-initialize the projection with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let d_input = self.in_channels();
        self.fc = LinearConfig::new(d_input, num_classes)
            .with_initializer(XAVIER_INITIALIZER)
            .init(&self.fc.weight.device());
        self
    }
}
