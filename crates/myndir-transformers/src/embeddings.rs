//! Token and learned absolute position embeddings.

use anyhow::{anyhow, Result};
use ndarray::{s, Array2, Array3, ArrayView2};

use crate::weights::ModelWeights;

#[derive(Debug, Clone)]
pub struct Embeddings {
    pub word_embeddings: Array2<f32>,
    pub position_embeddings: Array2<f32>,
}

impl Embeddings {
    pub fn new(word_embeddings: Array2<f32>, position_embeddings: Array2<f32>) -> Result<Self> {
        if word_embeddings.shape()[1] != position_embeddings.shape()[1] {
            return Err(anyhow!(
                "word embedding width {} differs from position embedding width {}",
                word_embeddings.shape()[1],
                position_embeddings.shape()[1]
            ));
        }
        Ok(Self {
            word_embeddings,
            position_embeddings,
        })
    }

    pub fn from_weights(weights: &ModelWeights, prefix: &str) -> Result<Self> {
        Self::new(
            weights.get_array2(&format!("{}.word_embeddings.weight", prefix))?,
            weights.get_array2(&format!("{}.position_embeddings.weight", prefix))?,
        )
    }

    pub fn vocab_size(&self) -> usize {
        self.word_embeddings.shape()[0]
    }

    pub fn max_positions(&self) -> usize {
        self.position_embeddings.shape()[0]
    }

    /// `[batch, seq] -> [batch, seq, hidden]`
    pub fn forward(&self, input_ids: &ArrayView2<u32>) -> Result<Array3<f32>> {
        let (batch, seq) = input_ids.dim();
        if seq > self.max_positions() {
            return Err(anyhow!(
                "sequence length {} exceeds {} position embeddings",
                seq,
                self.max_positions()
            ));
        }
        let hidden = self.word_embeddings.shape()[1];
        let vocab = self.vocab_size();

        let mut out = Array3::<f32>::zeros((batch, seq, hidden));
        for b in 0..batch {
            for s_idx in 0..seq {
                let id = input_ids[[b, s_idx]] as usize;
                if id >= vocab {
                    return Err(anyhow!("token id {} out of range for vocab {}", id, vocab));
                }
                let mut row = out.slice_mut(s![b, s_idx, ..]);
                row.assign(&self.word_embeddings.row(id));
                row += &self.position_embeddings.row(s_idx);
            }
        }
        Ok(out)
    }
}
