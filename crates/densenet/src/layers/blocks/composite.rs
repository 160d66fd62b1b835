//! # `CompositeFunction` - norm/activation/conv/dropout block.
//!
//! A [`CompositeFunction`] is the pre-activation unit ``H_l`` of `DenseNet`:
//! * a [`BatchNorm`] layer,
//! * a [`Relu`] activation,
//! * a [`Conv2d`] layer (stride 1, "same" padding),
//! * a [`Dropout`] layer.
//!
//! [`CompositeFunctionMeta`] defines a common meta API for [`CompositeFunction`]
//! and [`CompositeFunctionConfig`].

use crate::utility::probability::expect_probability;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, PaddingConfig2d, Relu,
};
use burn::prelude::{Backend, Tensor};

/// Variance-scaling (fan-in, unit scale) kernel initializer.
pub const VARIANCE_SCALING_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: 1.0,
    fan_out_only: false,
};

/// [`CompositeFunction`] Meta.
pub trait CompositeFunctionMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Square kernel size.
    fn kernel_size(&self) -> usize;
}

/// [`CompositeFunction`] Config.
///
/// Implements [`CompositeFunctionMeta`].
#[derive(Config, Debug)]
pub struct CompositeFunctionConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// Square kernel size; must be odd.
    #[config(default = 3)]
    pub kernel_size: usize,

    /// Dropout probability applied after the convolution.
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Batch norm epsilon.
    #[config(default = "1e-3")]
    pub norm_epsilon: f64,

    /// Batch norm running-statistics momentum.
    #[config(default = "1e-3")]
    pub norm_momentum: f64,

    /// Convolution kernel initializer.
    #[config(default = "VARIANCE_SCALING_INITIALIZER")]
    pub initializer: Initializer,
}

impl CompositeFunctionMeta for CompositeFunctionConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }
}

impl CompositeFunctionConfig {
    /// The [`Conv2dConfig`] for the inner convolution.
    pub fn conv_config(&self) -> Conv2dConfig {
        let pad = self.kernel_size / 2;
        Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_bias(false)
        .with_initializer(self.initializer.clone())
    }

    /// Initialize a [`CompositeFunction`].
    ///
    /// # Panics
    ///
    /// If the kernel size is even, or the dropout is not a probability.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CompositeFunction<B> {
        assert!(
            self.kernel_size % 2 == 1,
            "CompositeFunction requires an odd kernel size: {}",
            self.kernel_size
        );
        let dropout = expect_probability(self.dropout);

        CompositeFunction {
            norm: BatchNormConfig::new(self.in_channels)
                .with_epsilon(self.norm_epsilon)
                .with_momentum(self.norm_momentum)
                .init(device),
            act: Relu::new(),
            conv: self.conv_config().init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }
}

/// Pre-activation norm/act/conv/dropout block.
///
/// Implements [`CompositeFunctionMeta`].
#[derive(Module, Debug)]
pub struct CompositeFunction<B: Backend> {
    /// Input norm layer.
    pub norm: BatchNorm<B, 2>,

    /// Activation.
    pub act: Relu,

    /// Convolution.
    pub conv: Conv2d<B>,

    /// Output dropout.
    pub dropout: Dropout,
}

impl<B: Backend> CompositeFunctionMeta for CompositeFunction<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }
}

impl<B: Backend> CompositeFunction<B> {
    /// Forward Pass.
    ///
    /// ```rust,ignore
    /// let x = self.norm.forward(input);
    /// let x = self.act.forward(x);
    /// let x = self.conv.forward(x);
    /// let x = self.dropout.forward(x);
    /// return x
    /// ```
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, height, width]``
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

        let x = self.norm.forward(input);
        let x = self.act.forward(x);
        let x = self.conv.forward(x);
        let x = self.dropout.forward(x);

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
