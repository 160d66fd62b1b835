//! # Training Driver
//!
//! [`DenseNetEstimator`] owns a model, an optimizer and a global step, and
//! drives [`DenseNet::model_fn`] in each mode.

use crate::errors::{ConfigError, EstimatorError};
use crate::estimator::mode::Mode;
use crate::estimator::preprocess::ImagePreprocess;
use crate::estimator::spec::{Features, TrainOp};
use crate::models::densenet::{DenseNet, DenseNetConfig, Predictions};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{Optimizer, Sgd, SgdConfig};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

impl DenseNetConfig {
    /// SGD with Nesterov momentum and L2 weight decay.
    ///
    /// The decay penalty adds ``weight_decay * w`` to each gradient, which
    /// is the gradient of ``weight_decay * sum(w^2) / 2``.
    pub fn optimizer_config(&self) -> SgdConfig {
        SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(self.nesterov_momentum)
                    .with_dampening(0.0)
                    .with_nesterov(true),
            ))
            .with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay as f32)))
    }
}

/// The optimizer built by [`DenseNetConfig::optimizer_config`].
pub type DenseNetSgd<B> =
    OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, DenseNet<B>, B>;

/// Summary of one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    /// Global step after the update.
    pub global_step: usize,

    /// Batch loss before the update.
    pub loss: f64,

    /// Batch accuracy before the update.
    pub accuracy: f64,
}

/// Summary of one evaluation batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    /// Batch loss.
    pub loss: f64,

    /// Batch accuracy.
    pub accuracy: f64,
}

/// Stateful driver for a [`DenseNet`].
pub struct DenseNetEstimator<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DenseNet<B>, B>,
{
    model: DenseNet<B>,
    optimizer: O,
    preprocess: ImagePreprocess,
    global_step: usize,
}

impl<B: AutodiffBackend> DenseNetEstimator<B, DenseNetSgd<B>> {
    /// Build the model and its optimizer from a config.
    pub fn from_config(
        config: &DenseNetConfig,
        preprocess: ImagePreprocess,
        device: &B::Device,
    ) -> Result<Self, ConfigError> {
        let model = config.try_init(device)?;
        let optimizer = config.optimizer_config().init();
        Ok(Self::new(model, optimizer, preprocess))
    }
}

impl<B, O> DenseNetEstimator<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DenseNet<B>, B>,
{
    /// Wrap an existing model and optimizer.
    pub fn new(
        model: DenseNet<B>,
        optimizer: O,
        preprocess: ImagePreprocess,
    ) -> Self {
        Self {
            model,
            optimizer,
            preprocess,
            global_step: 0,
        }
    }

    /// Number of training steps applied.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// The current model.
    pub fn model(&self) -> &DenseNet<B> {
        &self.model
    }

    /// The preprocessing stage.
    pub fn preprocess(&self) -> &ImagePreprocess {
        &self.preprocess
    }

    /// Consume the driver, returning the model.
    pub fn into_model(self) -> DenseNet<B> {
        self.model
    }

    /// Run one training step.
    ///
    /// Applies the [`TrainOp`] through the optimizer
    /// and increments the global step.
    pub fn train(
        &mut self,
        features: Features<B>,
        labels: Tensor<B, 1, Int>,
    ) -> Result<TrainReport, EstimatorError> {
        let spec = self.model.model_fn(
            features,
            Some(labels.clone()),
            Mode::Train,
            &self.preprocess,
        )?;

        let accuracy = spec.predictions.accuracy(labels.inner());
        let loss = spec.loss.map_or(f64::NAN, scalar);

        self.apply_train_op(spec.train_op);

        let report = TrainReport {
            global_step: self.global_step,
            loss,
            accuracy: scalar(accuracy),
        };
        tracing::info!(
            global_step = report.global_step,
            loss = report.loss,
            accuracy = report.accuracy,
            "train step"
        );
        Ok(report)
    }

    /// Step the optimizer and advance the global step.
    ///
    /// Returns whether an update was applied.
    fn apply_train_op(
        &mut self,
        train_op: Option<TrainOp>,
    ) -> bool {
        let Some(train_op) = train_op else {
            tracing::warn!(global_step = self.global_step, "no train op; update skipped");
            return false;
        };
        self.model = self.optimizer.step(
            train_op.learning_rate,
            self.model.clone(),
            train_op.gradients,
        );
        self.global_step += 1;
        true
    }

    /// Evaluate one labeled batch.
    pub fn evaluate(
        &self,
        features: Features<B>,
        labels: Tensor<B, 1, Int>,
    ) -> Result<EvalReport, EstimatorError> {
        let spec = self
            .model
            .model_fn(features, Some(labels), Mode::Eval, &self.preprocess)?;

        let report = EvalReport {
            loss: spec.loss.map_or(f64::NAN, scalar),
            accuracy: spec
                .eval_metrics
                .map_or(f64::NAN, |metrics| scalar(metrics.accuracy)),
        };
        tracing::info!(
            global_step = self.global_step,
            loss = report.loss,
            accuracy = report.accuracy,
            "eval batch"
        );
        Ok(report)
    }

    /// Predict classes for a batch of raw images.
    pub fn predict(
        &self,
        features: Features<B>,
    ) -> Result<Predictions<B::InnerBackend>, EstimatorError> {
        let spec = self
            .model
            .model_fn(features, None, Mode::Predict, &self.preprocess)?;
        Ok(spec.predictions)
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::preprocess::ImagePreprocessConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::GradientsParams;
    use burn::tensor::{Distribution, TensorData};

    type B = Autodiff<NdArray<f32>>;

    fn config() -> DenseNetConfig {
        config_with_classes(3)
    }

    fn config_with_classes(num_classes: usize) -> DenseNetConfig {
        DenseNetConfig::new(num_classes)
            .with_depth(7)
            .with_growth_rate(4)
            .with_dropout_rate(0.0)
    }

    fn batch() -> (Tensor<B, 4>, Tensor<B, 1, Int>) {
        let device = Default::default();
        let images = Tensor::random([4, 3, 8, 8], Distribution::Default, &device);
        let labels = Tensor::from_data(TensorData::from([0i64, 1, 2, 1]), &device);
        (images, labels)
    }

    fn estimator() -> DenseNetEstimator<B, DenseNetSgd<B>> {
        let preprocess = ImagePreprocessConfig::new()
            .with_target_resolution(Some([8, 8]))
            .init();
        DenseNetEstimator::from_config(&config(), preprocess, &Default::default()).unwrap()
    }

    #[test]
    fn test_optimizer_decay_and_nesterov() {
        // A zero loss gradient leaves only the decay term on the first step:
        // w' = w - lr * (1 + momentum) * weight_decay * w
        let device = Default::default();
        let config = config()
            .with_weight_decay(0.5)
            .with_nesterov_momentum(0.9);
        let model: DenseNet<B> = config.try_init(&device).unwrap();
        let mut optimizer = config.optimizer_config().init::<B, DenseNet<B>>();

        let before = model.head.fc.weight.val();
        let loss = before.clone().mul_scalar(0.0).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        let model = optimizer.step(0.1, model, grads);
        let after = model.head.fc.weight.val();

        let expected = before.inner().mul_scalar(1.0 - 0.1 * 1.9 * 0.5);
        let diff = (after.inner() - expected).abs().max().into_scalar();
        assert!(diff < 1e-6, "max diff: {diff}");
    }

    #[test]
    fn test_missing_train_op_does_not_advance() {
        let mut estimator = estimator();
        let before = estimator.model().head.fc.weight.val().to_data();

        assert!(!estimator.apply_train_op(None));
        assert_eq!(estimator.global_step(), 0);
        assert_eq!(estimator.model().head.fc.weight.val().to_data(), before);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let preprocess = ImagePreprocess::default();
        let result = DenseNetEstimator::<B, DenseNetSgd<B>>::from_config(
            &config_with_classes(0),
            preprocess,
            &Default::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::ZeroSize {
                field: "num_classes"
            })
        ));
    }

    #[test]
    fn test_train_steps() {
        let mut estimator = estimator();
        assert_eq!(estimator.global_step(), 0);

        let before = estimator.model().head.fc.weight.val().to_data();

        let (images, labels) = batch();
        let report = estimator
            .train(Features::new(images.clone(), 0.1), labels.clone())
            .unwrap();
        assert_eq!(report.global_step, 1);
        assert!(report.loss.is_finite());
        assert!((0.0..=1.0).contains(&report.accuracy));

        let after = estimator.model().head.fc.weight.val().to_data();
        assert_ne!(before, after);

        let report = estimator
            .train(Features::new(images, 0.1), labels)
            .unwrap();
        assert_eq!(report.global_step, 2);
        assert_eq!(estimator.global_step(), 2);
    }

    #[test]
    fn test_failed_step_does_not_advance() {
        let mut estimator = estimator();
        let (images, labels) = batch();

        let err = estimator
            .train(Features::new(images, -1.0), labels)
            .unwrap_err();
        assert_eq!(err, EstimatorError::InvalidLearningRate(-1.0));
        assert_eq!(estimator.global_step(), 0);
    }

    #[test]
    fn test_evaluate_and_predict() {
        let estimator = estimator();
        let (images, labels) = batch();

        let report = estimator
            .evaluate(Features::from_images(images.clone()), labels)
            .unwrap();
        assert!(report.loss.is_finite() && report.loss > 0.0);
        assert!((0.0..=1.0).contains(&report.accuracy));

        let predictions = estimator
            .predict(Features::from_images(images.mul_scalar(255.0)))
            .unwrap();
        assert_eq!(predictions.classes.dims(), [4]);
        assert_eq!(predictions.probabilities.dims(), [4, 3]);

        let model = estimator.into_model();
        assert_eq!(model.num_classes(), 3);
    }
}
