// =============================================================================
// FEDREC CORE — params.rs
// GlobalParameters — ordered model tensors shared between coordinator and clients
// =============================================================================

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ordered weight/bias tensors. Shapes are fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalParameters {
    pub tensors: Vec<ArrayD<f64>>,
}

impl GlobalParameters {
    pub fn new(tensors: Vec<ArrayD<f64>>) -> Self {
        GlobalParameters { tensors }
    }

    /// One 1-D tensor per input vector.
    pub fn from_vecs(layers: Vec<Vec<f64>>) -> Self {
        let tensors = layers.into_iter()
            .map(|v| { let n = v.len(); ArrayD::from_shape_vec(IxDyn(&[n]), v) })
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default();
        GlobalParameters { tensors }
    }

    #[cfg(test)]
    pub fn scalar(value: f64) -> Self {
        Self::from_vecs(vec![vec![value]])
    }

    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.tensors.iter().map(|t| t.shape().to_vec()).collect()
    }

    pub fn same_shapes(&self, other: &GlobalParameters) -> bool {
        self.tensors.len() == other.tensors.len()
            && self.tensors.iter().zip(other.tensors.iter())
                .all(|(a, b)| a.shape() == b.shape())
    }

    pub fn num_tensors(&self) -> usize { self.tensors.len() }

    pub fn total_params(&self) -> usize {
        self.tensors.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool { self.total_params() == 0 }

    /// Row-major copy of one tensor's values.
    pub fn flat(&self, index: usize) -> Option<Vec<f64>> {
        self.tensors.get(index).map(|t| t.iter().cloned().collect())
    }

    pub fn load_json(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(std::io::Error::from)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(path, text)
    }
}

impl std::fmt::Display for GlobalParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GlobalParameters: tensors={} params={} shapes={:?}",
            self.num_tensors(), self.total_params(), self.shapes())
    }
}
