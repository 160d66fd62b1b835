//! # Config Prefabs for Well-Known Model Configurations

use crate::errors::ConfigError;
use burn::config::Config;
use std::fmt::Debug;

/// Static builder for a well-known config.
pub struct StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: &'static str,

    /// Description of the model config pre-fab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> C,
}

impl<C> StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Build a new config.
    pub fn to_config(&self) -> C {
        (self.builder)()
    }
}

impl<C> Debug for StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let pretty = f.alternate();

        let type_name = std::any::type_name::<C>();
        let mut handle = f.debug_struct(&format!("StaticPreFabConfig<{type_name}>"));

        handle
            .field("name", &self.name)
            .field("description", &self.description);

        if pretty {
            handle.field("config", &self.to_config());
        }

        handle.finish()
    }
}

/// A named table of [`StaticPreFabConfig`]s.
#[derive(Debug)]
pub struct StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the table.
    pub name: &'static str,

    /// Description of the table.
    pub description: &'static str,

    /// The prefabs.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C> StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// The registered names, in table order.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|item| item.name).collect()
    }

    /// Look up a prefab by name.
    pub fn lookup_prefab(
        &self,
        name: &str,
    ) -> Result<&'static StaticPreFabConfig<C>, ConfigError> {
        self.items
            .iter()
            .copied()
            .find(|item| item.name == name)
            .ok_or_else(|| ConfigError::UnknownPrefab {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Look up a prefab by name.
    ///
    /// # Panics
    ///
    /// If no prefab has the name.
    pub fn expect_lookup_prefab(
        &self,
        name: &str,
    ) -> &'static StaticPreFabConfig<C> {
        match self.lookup_prefab(name) {
            Ok(prefab) => prefab,
            Err(err) => panic!("{}: {err}", self.name),
        }
    }
}
