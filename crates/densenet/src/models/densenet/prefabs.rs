//! # Well-Known `DenseNet` Configs
//!
//! The CIFAR configurations from Huang et al., "Densely Connected
//! Convolutional Networks" (Table 2).

use crate::models::densenet::DenseNetConfig;
use crate::prefabs::{StaticPreFabConfig, StaticPreFabMap};

/// CIFAR class count.
pub const CIFAR10_CLASSES: usize = 10;

/// Well-known [`super::DenseNet`] configs.
pub static PREFAB_DENSENET_MAP: StaticPreFabMap<DenseNetConfig> = StaticPreFabMap {
    name: "densenet",
    description: "Well-Known DenseNet configs",

    items: &[
        &StaticPreFabConfig {
            name: "densenet_40_k12",
            description: "DenseNet (L=40, k=12)",
            builder: || {
                DenseNetConfig::new(CIFAR10_CLASSES)
                    .with_depth(40)
                    .with_growth_rate(12)
            },
        },
        &StaticPreFabConfig {
            name: "densenet_100_k12",
            description: "DenseNet (L=100, k=12)",
            builder: || {
                DenseNetConfig::new(CIFAR10_CLASSES)
                    .with_depth(100)
                    .with_growth_rate(12)
            },
        },
        &StaticPreFabConfig {
            name: "densenet_100_k24",
            description: "DenseNet (L=100, k=24)",
            builder: || {
                DenseNetConfig::new(CIFAR10_CLASSES)
                    .with_depth(100)
                    .with_growth_rate(24)
            },
        },
        &StaticPreFabConfig {
            name: "densenet_bc_100_k12",
            description: "DenseNet-BC (L=100, k=12)",
            builder: || {
                DenseNetConfig::new(CIFAR10_CLASSES)
                    .with_depth(100)
                    .with_growth_rate(12)
                    .with_bc_mode(true)
            },
        },
        &StaticPreFabConfig {
            name: "densenet_bc_250_k24",
            description: "DenseNet-BC (L=250, k=24)",
            builder: || {
                DenseNetConfig::new(CIFAR10_CLASSES)
                    .with_depth(250)
                    .with_growth_rate(24)
                    .with_bc_mode(true)
            },
        },
        &StaticPreFabConfig {
            name: "densenet_bc_190_k40",
            description: "DenseNet-BC (L=190, k=40)",
            builder: || {
                DenseNetConfig::new(CIFAR10_CLASSES)
                    .with_depth(190)
                    .with_growth_rate(40)
                    .with_bc_mode(true)
            },
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigError;

    #[test]
    fn test_prefabs_are_valid_and_exact() {
        for prefab in PREFAB_DENSENET_MAP.items {
            let config = prefab.to_config();
            assert_eq!(config.try_validate(), Ok(()), "{}", prefab.name);
            assert!(config.is_exact_depth(), "{}", prefab.name);
        }
    }

    #[test]
    fn test_lookup() {
        let prefab = PREFAB_DENSENET_MAP.expect_lookup_prefab("densenet_bc_100_k12");
        let config = prefab.to_config();
        assert!(config.bc_mode);
        assert_eq!(config.layers_per_block(), 16);
        assert_eq!(config.first_output_features(), 24);

        let err = PREFAB_DENSENET_MAP.lookup_prefab("resnet18").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPrefab { .. }));
        assert!(err.to_string().contains("densenet_40_k12"));
    }

    #[test]
    #[should_panic(expected = "unknown prefab")]
    fn test_expect_lookup_panics() {
        PREFAB_DENSENET_MAP.expect_lookup_prefab("nope");
    }
}
