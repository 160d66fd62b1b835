use burn::backend::{Autodiff, NdArray};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, ElementConversion};
use clap::Parser;
use densenet::estimator::preprocess::{ImagePreprocessConfig, PIXEL_SCALE};
use densenet::estimator::{DenseNetEstimator, DenseNetSgd, Features};
use densenet::models::densenet::{DenseNetConfig, PREFAB_DENSENET_MAP};
use tracing_subscriber::EnvFilter;

// $ --depth=10 --growth-rate=4 --image-size=16 --steps=20
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List the well-known configs and exit.
    #[arg(long)]
    list_prefabs: bool,

    /// Start from a well-known config; explicit flags override it.
    #[arg(long)]
    prefab: Option<String>,

    /// Total network depth.
    #[arg(long)]
    depth: Option<usize>,

    /// Channels added per dense layer.
    #[arg(long)]
    growth_rate: Option<usize>,

    /// Number of dense blocks.
    #[arg(long)]
    total_blocks: Option<usize>,

    /// Use DenseNet-BC.
    #[arg(long)]
    bc_mode: bool,

    /// Transition compression in BC mode.
    #[arg(long)]
    reduction: Option<f64>,

    /// Dropout probability.
    #[arg(long)]
    dropout_rate: Option<f64>,

    /// Number of classes.
    #[arg(long, default_value_t = 10)]
    num_classes: usize,

    /// Batch size.
    #[arg(short, long, default_value_t = 16)]
    batch_size: usize,

    /// Square image size.
    #[arg(long, default_value_t = 32)]
    image_size: usize,

    /// Training steps.
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// SGD learning rate.
    #[arg(long, default_value_t = 0.1)]
    learning_rate: f64,

    /// Random seed for reproducibility.
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn model_config(&self) -> anyhow::Result<DenseNetConfig> {
        let mut config = match &self.prefab {
            Some(name) => PREFAB_DENSENET_MAP.lookup_prefab(name)?.to_config(),
            None => DenseNetConfig::new(self.num_classes),
        };
        config.num_classes = self.num_classes;
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(growth_rate) = self.growth_rate {
            config.growth_rate = growth_rate;
        }
        if let Some(total_blocks) = self.total_blocks {
            config.total_blocks = total_blocks;
        }
        if self.bc_mode {
            config.bc_mode = true;
        }
        if let Some(reduction) = self.reduction {
            config.reduction = reduction;
        }
        if let Some(dropout_rate) = self.dropout_rate {
            config.dropout_rate = dropout_rate;
        }
        config.try_validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_prefabs {
        println!("{}:", PREFAB_DENSENET_MAP.description);
        for prefab in PREFAB_DENSENET_MAP.items {
            println!("  {:<24} {}", prefab.name, prefab.description);
        }
        return Ok(());
    }

    type B = Autodiff<NdArray<f32>>;
    backend_main::<B>(&args, Default::default())
}

/// A batch of raw-intensity images whose per-channel level encodes the class.
fn synthetic_batch<B: Backend>(
    args: &Args,
    device: &B::Device,
) -> (Tensor<B, 4>, Tensor<B, 1, Int>) {
    let labels: Tensor<B, 1, Int> = Tensor::random(
        [args.batch_size],
        Distribution::Uniform(0.0, args.num_classes as f64),
        device,
    );
    let level = labels
        .clone()
        .float()
        .div_scalar(args.num_classes as f64)
        .mul_scalar(PIXEL_SCALE)
        .reshape([args.batch_size, 1, 1, 1]);

    let noise: Tensor<B, 4> = Tensor::random(
        [args.batch_size, 3, args.image_size, args.image_size],
        Distribution::Normal(0.0, 16.0),
        device,
    );

    ((noise + level).clamp(0.0, PIXEL_SCALE), labels)
}

/// Train, evaluate and predict on synthetic data.
pub fn backend_main<B: AutodiffBackend>(
    args: &Args,
    device: B::Device,
) -> anyhow::Result<()> {
    B::seed(args.seed);

    let config = args.model_config()?;
    tracing::info!(?config, "model config");

    let preprocess = ImagePreprocessConfig::new()
        .with_target_resolution(Some([args.image_size, args.image_size]))
        .init();

    let mut estimator: DenseNetEstimator<B, DenseNetSgd<B>> =
        DenseNetEstimator::from_config(&config, preprocess, &device)?;
    tracing::info!(
        feature_resolution = ?estimator
            .model()
            .feature_resolution([args.image_size, args.image_size]),
        "head input resolution"
    );

    for _ in 0..args.steps {
        let (images, labels) = synthetic_batch::<B>(args, &device);
        let images = images.div_scalar(PIXEL_SCALE);
        estimator.train(Features::new(images, args.learning_rate), labels)?;
    }

    let (images, labels) = synthetic_batch::<B>(args, &device);
    let report = estimator.evaluate(
        Features::from_images(images.clone().div_scalar(PIXEL_SCALE)),
        labels.clone(),
    )?;
    println!(
        "eval: loss={:.4} accuracy={:.4}",
        report.loss, report.accuracy
    );

    let predictions = estimator.predict(Features::from_images(images))?;
    let predicted = predictions.accuracy(labels.inner());
    println!("predict: accuracy={:.4}", predicted.into_scalar().elem::<f64>());

    Ok(())
}
