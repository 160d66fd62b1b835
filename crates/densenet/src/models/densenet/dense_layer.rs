//! # [`DenseLayer`] for `DenseNet`
//!
//! A [`DenseLayer`] applies a ``3x3`` [`CompositeFunction`] to its input,
//! optionally preceded by a ``1x1`` bottleneck [`CompositeFunction`],
//! and concatenates the input with the result along the channel axis.
//!
//! [`DenseLayerMeta`] defines a common meta API for [`DenseLayer`]
//! and [`DenseLayerConfig`].
//!
//! [`DenseLayerConfig`] implements [`Config`], and provides
//! [`DenseLayerConfig::init`] to initialize a [`DenseLayer`].

use crate::layers::blocks::composite::{
    CompositeFunction, CompositeFunctionConfig, CompositeFunctionMeta,
};
use crate::utility::probability::expect_probability;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`DenseLayer`] Meta trait.
pub trait DenseLayerMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of channels this layer adds.
    fn growth_rate(&self) -> usize;

    /// Whether a ``1x1`` bottleneck precedes the ``3x3`` convolution.
    fn has_bottleneck(&self) -> bool;

    /// The number of output channels.
    ///
    /// ``out_channels = in_channels + growth_rate``
    fn out_channels(&self) -> usize {
        self.in_channels() + self.growth_rate()
    }
}

/// [`DenseLayer`] Config.
///
/// Implements [`DenseLayerMeta`].
#[derive(Config, Debug)]
pub struct DenseLayerConfig {
    /// The number of input channels.
    pub in_channels: usize,

    /// The number of channels this layer adds.
    pub growth_rate: usize,

    /// Bottleneck width, as a multiple of `growth_rate`.
    ///
    /// `None` disables the bottleneck.
    #[config(default = "None")]
    pub bottleneck_width: Option<usize>,

    /// Dropout probability for each composite function.
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Batch norm epsilon.
    #[config(default = "1e-3")]
    pub norm_epsilon: f64,

    /// Batch norm running-statistics momentum.
    #[config(default = "1e-3")]
    pub norm_momentum: f64,
}

impl DenseLayerMeta for DenseLayerConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn growth_rate(&self) -> usize {
        self.growth_rate
    }

    fn has_bottleneck(&self) -> bool {
        self.bottleneck_width.is_some()
    }
}

impl DenseLayerConfig {
    fn composite(
        &self,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
    ) -> CompositeFunctionConfig {
        CompositeFunctionConfig::new(in_channels, out_channels)
            .with_kernel_size(kernel_size)
            .with_dropout(self.dropout)
            .with_norm_epsilon(self.norm_epsilon)
            .with_norm_momentum(self.norm_momentum)
    }

    /// Initialize a [`DenseLayer`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> DenseLayer<B> {
        expect_probability(self.dropout);

        let bottleneck = self
            .bottleneck_width
            .map(|width| self.composite(self.in_channels, width * self.growth_rate, 1));

        let conv_in = match &bottleneck {
            Some(cfg) => cfg.out_channels(),
            None => self.in_channels,
        };

        DenseLayer {
            bottleneck: bottleneck.map(|cfg| cfg.init(device)),
            composite: self.composite(conv_in, self.growth_rate, 3).init(device),
        }
    }
}

/// Dense Layer for `DenseNet`.
///
/// Implements [`DenseLayerMeta`].
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    /// Optional ``1x1`` bottleneck.
    pub bottleneck: Option<CompositeFunction<B>>,

    /// The ``3x3`` composite function.
    pub composite: CompositeFunction<B>,
}

impl<B: Backend> DenseLayerMeta for DenseLayer<B> {
    fn in_channels(&self) -> usize {
        match &self.bottleneck {
            Some(bottleneck) => bottleneck.in_channels(),
            None => self.composite.in_channels(),
        }
    }

    fn growth_rate(&self) -> usize {
        self.composite.out_channels()
    }

    fn has_bottleneck(&self) -> bool {
        self.bottleneck.is_some()
    }
}

impl<B: Backend> DenseLayer<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, in_channels + growth_rate, height, width]``; the input
    /// channels come first, unchanged.
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

        let x = match &self.bottleneck {
            Some(bottleneck) => bottleneck.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.composite.forward(x);

        let x = Tensor::cat(vec![input, x], 1);

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

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    #[test]
    fn test_dense_layer_config() {
        let config = DenseLayerConfig::new(16, 12);
        assert_eq!(config.in_channels(), 16);
        assert_eq!(config.growth_rate(), 12);
        assert_eq!(config.out_channels(), 28);
        assert!(!config.has_bottleneck());

        let config = config.with_bottleneck_width(Some(4));
        assert!(config.has_bottleneck());
        assert_eq!(config.out_channels(), 28);
    }

    #[test]
    fn test_dense_layer_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: DenseLayer<B> = DenseLayerConfig::new(6, 4).init(&device);
        assert_eq!(layer.in_channels(), 6);
        assert_eq!(layer.growth_rate(), 4);
        assert_eq!(layer.out_channels(), 10);
        assert!(!layer.has_bottleneck());
        assert_eq!(layer.composite.kernel_size(), 3);

        let layer: DenseLayer<B> = DenseLayerConfig::new(6, 4)
            .with_bottleneck_width(Some(4))
            .init(&device);
        assert_eq!(layer.in_channels(), 6);
        assert_eq!(layer.growth_rate(), 4);
        assert!(layer.has_bottleneck());

        let bottleneck = layer.bottleneck.as_ref().unwrap();
        assert_eq!(bottleneck.kernel_size(), 1);
        assert_eq!(bottleneck.out_channels(), 16);
        assert_eq!(layer.composite.in_channels(), 16);
    }

    #[test]
    fn test_dense_layer_forward_concatenates_input() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        for bottleneck_width in [None, Some(4)] {
            let layer: DenseLayer<B> = DenseLayerConfig::new(3, 2)
                .with_bottleneck_width(bottleneck_width)
                .init(&device);

            let input: Tensor<B, 4> =
                Tensor::random([2, 3, 6, 6], Distribution::Default, &device);
            let output = layer.forward(input.clone());

            assert_shape_contract!(
                ["batch", "channels", "height", "width"],
                &output,
                &[("batch", 2), ("channels", 5), ("height", 6), ("width", 6)]
            );

            output
                .slice([0..2, 0..3, 0..6, 0..6])
                .to_data()
                .assert_eq(&input.to_data(), true);
        }
    }
}
