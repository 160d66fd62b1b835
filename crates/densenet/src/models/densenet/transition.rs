//! # `DenseNet` Transition Layer
//!
//! A [`Transition`] sits between two dense blocks. It applies a ``1x1``
//! [`CompositeFunction`] (optionally compressing the channels), then a
//! ``2x2`` stride-2 average pool with "valid" padding.

use crate::layers::blocks::composite::{
    CompositeFunction, CompositeFunctionConfig, CompositeFunctionMeta,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Pooling window and stride of a transition.
pub const TRANSITION_POOL_SIZE: usize = 2;

/// Compute the compressed channel count.
///
/// ``floor(in_channels * reduction)``
pub fn compressed_channels(
    in_channels: usize,
    reduction: f64,
) -> usize {
    ((in_channels as f64) * reduction) as usize
}

/// [`Transition`] Meta trait.
pub trait TransitionMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// Odd sizes are floored, as with "valid" padding.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        [
            input_resolution[0] / TRANSITION_POOL_SIZE,
            input_resolution[1] / TRANSITION_POOL_SIZE,
        ]
    }
}

/// [`Transition`] configuration.
#[derive(Config, Debug)]
pub struct TransitionConfig {
    /// The number of input channels.
    pub in_channels: usize,

    /// The number of output channels.
    pub out_channels: usize,

    /// Dropout probability of the composite function.
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Batch norm epsilon.
    #[config(default = "1e-3")]
    pub norm_epsilon: f64,

    /// Batch norm running-statistics momentum.
    #[config(default = "1e-3")]
    pub norm_momentum: f64,
}

impl TransitionMeta for TransitionConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl TransitionConfig {
    /// Build a transition which compresses by `reduction`.
    ///
    /// A `reduction` of `1.0` keeps the channel count.
    pub fn compressing(
        in_channels: usize,
        reduction: f64,
    ) -> Self {
        Self::new(in_channels, compressed_channels(in_channels, reduction))
    }

    /// Initialize a [`Transition`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> Transition<B> {
        Transition {
            composite: CompositeFunctionConfig::new(self.in_channels, self.out_channels)
                .with_kernel_size(1)
                .with_dropout(self.dropout)
                .with_norm_epsilon(self.norm_epsilon)
                .with_norm_momentum(self.norm_momentum)
                .init(device),
            pool: AvgPool2dConfig::new([TRANSITION_POOL_SIZE, TRANSITION_POOL_SIZE])
                .with_strides([TRANSITION_POOL_SIZE, TRANSITION_POOL_SIZE])
                .init(),
        }
    }
}

/// Transition layer.
///
/// Maps ``[batch, in_channels, height, width]`` to
/// ``[batch, out_channels, height / 2, width / 2]``.
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    /// ``1x1`` composite function.
    pub composite: CompositeFunction<B>,

    /// Downsampling pool.
    pub pool: AvgPool2d,
}

impl<B: Backend> TransitionMeta for Transition<B> {
    fn in_channels(&self) -> usize {
        self.composite.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.composite.out_channels()
    }
}

impl<B: Backend> Transition<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.composite.forward(input);
        let x = self.pool.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}
