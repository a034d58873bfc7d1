//! In-memory tensor store keyed by the checkpoint's parameter names.
//!
//! Reading checkpoints from disk is the loader's job; a `ModelWeights` is what
//! a loader hands to model constructors. Every tensor is kept as F32.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

#[derive(Debug, Clone, Default)]
pub struct ModelWeights {
    tensors: HashMap<String, ArrayD<f32>>,
}

impl ModelWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tensors(tensors: HashMap<String, ArrayD<f32>>) -> Self {
        Self { tensors }
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Sorted tensor names, mostly useful for diagnostics.
    pub fn tensor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.tensors
            .get(name)
            .ok_or_else(|| anyhow!("Tensor '{}' not found in model weights", name))
    }

    pub fn get_array1(&self, name: &str) -> Result<Array1<f32>> {
        let tensor = self.get(name)?;
        tensor
            .clone()
            .into_dimensionality::<Ix1>()
            .map_err(|_| anyhow!("Tensor '{}' has shape {:?}, expected 1D", name, tensor.shape()))
    }

    pub fn get_array2(&self, name: &str) -> Result<Array2<f32>> {
        let tensor = self.get(name)?;
        tensor
            .clone()
            .into_dimensionality::<Ix2>()
            .map_err(|_| anyhow!("Tensor '{}' has shape {:?}, expected 2D", name, tensor.shape()))
    }

    pub fn get_optional_array1(&self, name: &str) -> Result<Option<Array1<f32>>> {
        if self.contains(name) {
            self.get_array1(name).map(Some)
        } else {
            Ok(None)
        }
    }
}
