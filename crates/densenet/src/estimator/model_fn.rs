//! # `DenseNet` Model Function
//!
//! [`DenseNet::model_fn`] maps ``(features, labels, mode)`` to an
//! [`EstimatorSpec`].

use crate::errors::EstimatorError;
use crate::estimator::mode::Mode;
use crate::estimator::preprocess::ImagePreprocess;
use crate::estimator::spec::{EstimatorSpec, EvalMetrics, Features, TrainOp};
use crate::models::densenet::{DenseNet, Predictions};
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::GradientsParams;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

/// Mean softmax cross-entropy of ``[batch, num_classes]`` logits against class indices.
pub fn softmax_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, labels)
}

fn check_labels<B: Backend>(
    features: &Features<B>,
    labels: Option<Tensor<B, 1, Int>>,
    mode: Mode,
) -> Result<Tensor<B, 1, Int>, EstimatorError> {
    let labels = labels.ok_or(EstimatorError::MissingLabels(mode))?;
    let images = features.batch_size();
    let [label_count] = labels.dims();
    if images != label_count {
        return Err(EstimatorError::BatchMismatch {
            images,
            labels: label_count,
        });
    }
    Ok(labels)
}

impl<B: AutodiffBackend> DenseNet<B> {
    /// Run the model in the given mode.
    ///
    /// - [`Mode::Predict`]: predictions only, inference mode.
    /// - [`Mode::Eval`]: loss and accuracy, inference mode; requires labels.
    /// - [`Mode::Train`]: loss, accuracy and a [`TrainOp`] carrying the
    ///   gradients and `features.learning_rate`; requires labels.
    ///
    /// Weight decay is not part of the returned loss; it is applied by the
    /// optimizer when the [`TrainOp`] is stepped.
    ///
    /// # Arguments
    ///
    /// - `features`: images and the learning rate.
    /// - `labels`: ``[batch]`` class indices.
    /// - `mode`: the run mode.
    /// - `preprocess`: the preprocessing stage.
    pub fn model_fn(
        &self,
        features: Features<B>,
        labels: Option<Tensor<B, 1, Int>>,
        mode: Mode,
        preprocess: &ImagePreprocess,
    ) -> Result<EstimatorSpec<B::InnerBackend>, EstimatorError> {
        match mode {
            Mode::Predict => {
                let model = self.valid();
                let images = preprocess.apply(features.images.inner(), mode);
                Ok(EstimatorSpec {
                    mode,
                    predictions: model.predict(images),
                    loss: None,
                    eval_metrics: None,
                    train_op: None,
                })
            }
            Mode::Eval => {
                let labels = check_labels(&features, labels, mode)?.inner();
                let model = self.valid();
                let images = preprocess.apply(features.images.inner(), mode);

                let logits = model.forward(images);
                let loss = softmax_cross_entropy(logits.clone(), labels.clone());
                let predictions = Predictions::from_logits(logits);
                let accuracy = predictions.accuracy(labels);

                Ok(EstimatorSpec {
                    mode,
                    predictions,
                    loss: Some(loss),
                    eval_metrics: Some(EvalMetrics { accuracy }),
                    train_op: None,
                })
            }
            Mode::Train => {
                let learning_rate = features.learning_rate;
                if !(learning_rate.is_finite() && learning_rate > 0.0) {
                    return Err(EstimatorError::InvalidLearningRate(learning_rate));
                }
                let labels = check_labels(&features, labels, mode)?;
                let images = preprocess.apply(features.images, mode);

                let logits = self.forward(images);
                let loss = softmax_cross_entropy(logits.clone(), labels.clone());
                let gradients = GradientsParams::from_grads(loss.backward(), self);

                let loss = loss.inner();
                let labels = labels.inner();
                let predictions = Predictions::from_logits(logits.inner());
                let accuracy = predictions.accuracy(labels);

                tracing::debug!(
                    loss_per_batch = loss.clone().into_scalar().elem::<f64>(),
                    accuracy_per_batch = accuracy.clone().into_scalar().elem::<f64>(),
                    learning_rate,
                    "train batch"
                );

                Ok(EstimatorSpec {
                    mode,
                    predictions,
                    loss: Some(loss),
                    eval_metrics: None,
                    train_op: Some(TrainOp {
                        gradients,
                        learning_rate,
                    }),
                })
            }
        }
    }
}
