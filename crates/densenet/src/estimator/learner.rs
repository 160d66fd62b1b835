//! # `burn-train` Integration
//!
//! Lets a [`DenseNet`] be driven by burn's `Learner`.

use crate::estimator::model_fn::softmax_cross_entropy;
use crate::models::densenet::DenseNet;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};

/// A batch of labeled images.
#[derive(Debug, Clone)]
pub struct DenseNetBatch<B: Backend> {
    /// ``[batch, channels, height, width]``
    pub images: Tensor<B, 4>,

    /// ``[batch]`` class indices.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> DenseNet<B> {
    /// Forward pass with cross-entropy loss.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = softmax_cross_entropy(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<DenseNetBatch<B>, ClassificationOutput<B>> for DenseNet<B> {
    fn step(
        &self,
        batch: DenseNetBatch<B>,
    ) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<DenseNetBatch<B>, ClassificationOutput<B>> for DenseNet<B> {
    fn step(
        &self,
        batch: DenseNetBatch<B>,
    ) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::densenet::DenseNetConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{Distribution, TensorData};

    fn batch<B: Backend>(device: &B::Device) -> DenseNetBatch<B> {
        DenseNetBatch {
            images: Tensor::random([2, 3, 8, 8], Distribution::Default, device),
            targets: Tensor::from_data(TensorData::from([1i64, 0]), device),
        }
    }

    #[test]
    fn test_train_step() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let model: DenseNet<B> = DenseNetConfig::new(2)
            .with_depth(7)
            .with_growth_rate(2)
            .try_init(&device)
            .unwrap();

        let output = TrainStep::step(&model, batch::<B>(&device));
        assert_eq!(output.item.output.dims(), [2, 2]);
        assert_eq!(output.item.targets.dims(), [2]);
        assert!(output.item.loss.into_scalar().is_finite());
    }

    #[test]
    fn test_valid_step() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: DenseNet<B> = DenseNetConfig::new(4)
            .with_depth(7)
            .with_growth_rate(2)
            .try_init(&device)
            .unwrap();

        let batch = batch::<B>(&device);
        let output = ValidStep::step(&model, batch.clone());
        assert_eq!(output.output.dims(), [2, 4]);

        let expected = model.forward(batch.images);
        output
            .output
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }
}
