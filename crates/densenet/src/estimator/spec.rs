//! # Model Function Inputs and Outputs

use crate::estimator::mode::Mode;
use crate::models::densenet::Predictions;
use burn::LearningRate;
use burn::optim::GradientsParams;
use burn::prelude::{Backend, Tensor};
use std::fmt::{Debug, Formatter};

/// Default SGD learning rate.
pub const DEFAULT_LEARNING_RATE: LearningRate = 0.1;

/// Model function features.
#[derive(Debug, Clone)]
pub struct Features<B: Backend> {
    /// ``[batch, channels, height, width]`` images.
    pub images: Tensor<B, 4>,

    /// Learning rate for this step; only read in [`Mode::Train`].
    pub learning_rate: LearningRate,
}

impl<B: Backend> Features<B> {
    /// New features with an explicit learning rate.
    pub fn new(
        images: Tensor<B, 4>,
        learning_rate: LearningRate,
    ) -> Self {
        Self {
            images,
            learning_rate,
        }
    }

    /// New features with [`DEFAULT_LEARNING_RATE`].
    pub fn from_images(images: Tensor<B, 4>) -> Self {
        Self::new(images, DEFAULT_LEARNING_RATE)
    }

    /// The batch size.
    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Evaluation metrics.
#[derive(Debug, Clone)]
pub struct EvalMetrics<B: Backend> {
    /// Single-element batch accuracy.
    pub accuracy: Tensor<B, 1>,
}

/// A pending parameter update.
///
/// Applied by an [`burn::optim::Optimizer`] in the driver.
pub struct TrainOp {
    /// Gradients of the loss w.r.t. the model parameters.
    pub gradients: GradientsParams,

    /// Learning rate to step with.
    pub learning_rate: LearningRate,
}

impl Debug for TrainOp {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TrainOp")
            .field("gradients", &self.gradients.len())
            .field("learning_rate", &self.learning_rate)
            .finish()
    }
}

/// The result of a model function invocation.
///
/// Which fields are populated depends on [`EstimatorSpec::mode`]:
///
/// | mode      | `loss` | `eval_metrics` | `train_op` |
/// |-----------|--------|----------------|------------|
/// | `Train`   | yes    | no             | yes        |
/// | `Eval`    | yes    | yes            | no         |
/// | `Predict` | no     | no             | no         |
#[derive(Debug)]
pub struct EstimatorSpec<B: Backend> {
    /// The mode this spec was produced in.
    pub mode: Mode,

    /// Class predictions for the batch.
    pub predictions: Predictions<B>,

    /// Single-element mean cross-entropy loss.
    pub loss: Option<Tensor<B, 1>>,

    /// Evaluation metrics.
    pub eval_metrics: Option<EvalMetrics<B>>,

    /// The training operation.
    pub train_op: Option<TrainOp>,
}
