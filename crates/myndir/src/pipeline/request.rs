use myndir_transformers::DecodeConfigError;
use ndarray::{Array3, Axis};

/// What a generation call is conditioned on.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text {
        text: Vec<String>,
        negative_text: Option<Vec<String>>,
    },
    Classes(Vec<u32>),
}

/// One call to the image pipeline.
///
/// # Example
///
/// ```ignore
/// let request = GenerationRequest::text(["a red fox in snow"])
///     .negative(["blurry"])
///     .images_per_prompt(4)
///     .seed(42);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub text: Option<Vec<String>>,
    pub negative_text: Option<Vec<String>>,
    pub class_ids: Option<Vec<u32>>,
    pub num_images_per_prompt: usize,
    /// Fixed seed for reproducible grids; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            text: None,
            negative_text: None,
            class_ids: None,
            num_images_per_prompt: 1,
            seed: None,
        }
    }
}

impl GenerationRequest {
    pub fn text<I, S>(prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: Some(prompts.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn classes(class_ids: impl Into<Vec<u32>>) -> Self {
        Self {
            class_ids: Some(class_ids.into()),
            ..Default::default()
        }
    }

    pub fn negative<I, S>(mut self, prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.negative_text = Some(prompts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_class_ids(mut self, class_ids: impl Into<Vec<u32>>) -> Self {
        self.class_ids = Some(class_ids.into());
        self
    }

    pub fn images_per_prompt(mut self, n: usize) -> Self {
        self.num_images_per_prompt = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Exactly one of text or class ids must be set.
    pub fn prompt(&self) -> Result<Prompt, DecodeConfigError> {
        match (&self.text, &self.class_ids) {
            (None, None) => Err(DecodeConfigError::NoConditioning),
            (Some(_), Some(_)) => Err(DecodeConfigError::ConflictingConditioning),
            (Some(text), None) => {
                if let Some(negative) = &self.negative_text {
                    if negative.len() != text.len() {
                        return Err(DecodeConfigError::BatchSizeMismatch {
                            what: "negative prompts",
                            expected: text.len(),
                            actual: negative.len(),
                        });
                    }
                }
                Ok(Prompt::Text {
                    text: text.clone(),
                    negative_text: self.negative_text.clone(),
                })
            }
            (None, Some(ids)) => Ok(Prompt::Classes(ids.clone())),
        }
    }

    /// Number of grids the call produces.
    pub fn batch_size(&self) -> usize {
        let prompts = match (&self.text, &self.class_ids) {
            (Some(text), _) => text.len(),
            (None, Some(ids)) => ids.len(),
            (None, None) => 0,
        };
        prompts * self.num_images_per_prompt
    }
}

/// Repeats every batch item `n` times in place: `[a, b]` becomes `[a, a, b, b]`.
pub fn repeat_interleave_states(states: &Array3<f32>, n: usize) -> Array3<f32> {
    if n == 1 {
        return states.clone();
    }
    let indices: Vec<usize> = (0..states.len_of(Axis(0)))
        .flat_map(|i| std::iter::repeat(i).take(n))
        .collect();
    states.select(Axis(0), &indices)
}

pub fn repeat_interleave_ids(ids: &[u32], n: usize) -> Vec<u32> {
    ids.iter()
        .flat_map(|&id| std::iter::repeat(id).take(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_resolution() {
        assert_eq!(
            GenerationRequest::default().prompt(),
            Err(DecodeConfigError::NoConditioning)
        );
        assert_eq!(
            GenerationRequest::text(["a"]).with_class_ids(vec![1]).prompt(),
            Err(DecodeConfigError::ConflictingConditioning)
        );
        assert_eq!(
            GenerationRequest::classes(vec![3, 4]).prompt(),
            Ok(Prompt::Classes(vec![3, 4]))
        );
        assert!(matches!(
            GenerationRequest::text(["a", "b"]).negative(["c"]).prompt(),
            Err(DecodeConfigError::BatchSizeMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_batch_size_counts_duplicates() {
        assert_eq!(GenerationRequest::text(["a", "b"]).images_per_prompt(3).batch_size(), 6);
        assert_eq!(GenerationRequest::classes(vec![1]).batch_size(), 1);
    }

    #[test]
    fn test_repeat_interleave() {
        assert_eq!(repeat_interleave_ids(&[7, 9], 2), vec![7, 7, 9, 9]);

        let states = Array3::from_shape_fn((2, 1, 2), |(b, _, h)| (b * 10 + h) as f32);
        let repeated = repeat_interleave_states(&states, 3);
        assert_eq!(repeated.dim(), (6, 1, 2));
        assert_eq!(repeated[[2, 0, 1]], 1.0);
        assert_eq!(repeated[[3, 0, 0]], 10.0);
    }
}
