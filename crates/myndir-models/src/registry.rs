//! Builds a masked-token transformer from its config's `_class_name`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use myndir_transformers::traits::MaskedTokenModel;
use myndir_transformers::weights::ModelWeights;
use serde::Deserialize;

use crate::models::maskgit::{MaskGitConfig, MaskGitTransformer, MASKGIT_CLASS_NAME};

/// Builds a model from its JSON config and in-memory weights.
pub type TransformerBuilder = fn(&str, &ModelWeights) -> Result<Arc<dyn MaskedTokenModel>>;

#[derive(Deserialize)]
struct Discriminator {
    #[serde(rename = "_class_name")]
    class_name: Option<String>,
}

#[derive(Clone, Default)]
pub struct TransformerRegistry {
    builders: HashMap<String, TransformerBuilder>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every transformer this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MASKGIT_CLASS_NAME, build_maskgit);
        registry
    }

    /// Registers `builder` under `class_name`, replacing any previous one.
    pub fn register(&mut self, class_name: impl Into<String>, builder: TransformerBuilder) {
        let class_name = class_name.into();
        if self.builders.insert(class_name.clone(), builder).is_some() {
            log::warn!("Replacing transformer builder for '{}'", class_name);
        }
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.builders.contains_key(class_name)
    }

    /// Registered class names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The `_class_name` of `config_json`, defaulting to the MaskGIT transformer.
    pub fn class_name_of(config_json: &str) -> Result<String> {
        let discriminator: Discriminator = serde_json::from_str(config_json)?;
        Ok(discriminator
            .class_name
            .unwrap_or_else(|| MASKGIT_CLASS_NAME.to_string()))
    }

    /// Runs the builder registered for the config's `_class_name`.
    pub fn build(&self, config_json: &str, weights: &ModelWeights) -> Result<Arc<dyn MaskedTokenModel>> {
        let class_name = Self::class_name_of(config_json)?;
        let builder = self.builders.get(&class_name).ok_or_else(|| {
            anyhow!(
                "Unknown transformer class '{}'. Registered: {}",
                class_name,
                self.names().join(", ")
            )
        })?;
        log::debug!("Building transformer '{}'", class_name);
        builder(config_json, weights)
    }
}

fn build_maskgit(config_json: &str, weights: &ModelWeights) -> Result<Arc<dyn MaskedTokenModel>> {
    let config = MaskGitConfig::from_json(config_json)?;
    Ok(Arc::new(MaskGitTransformer::from_weights(config, weights)?))
}
