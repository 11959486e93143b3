//! Text embeddings for similarity search.
//!
//! Only incident descriptions are embedded. The vector lives in the
//! `description_embedding` column and never leaves the storage layer.

mod openai;
mod provider;

pub use openai::{EmbeddingConfig, OpenAIEmbeddingProvider};
pub use provider::EmbeddingProvider;

#[cfg(test)]
pub use provider::MockEmbeddingProvider;

/// A dense `f32` embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// pgvector text form, e.g. `[0.1,0.2,0.3]`, cast with `::vector`
    pub fn to_pgvector(&self) -> String {
        let values: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        format!("[{}]", values.join(","))
    }

    /// Cosine distance as computed by pgvector's `<=>`.
    ///
    /// `None` when the dimensions differ or either vector has zero norm.
    pub fn cosine_distance(&self, other: &Embedding) -> Option<f64> {
        if self.0.len() != other.0.len() {
            return None;
        }

        let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
        for (a, b) in self.0.iter().zip(&other.0) {
            let (a, b) = (f64::from(*a), f64::from(*b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        if norm_a == 0.0 || norm_b == 0.0 {
            return None;
        }
        let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
        Some(1.0 - similarity)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pgvector_literal() {
        let embedding = Embedding::new(vec![0.5, -1.0, 0.0]);
        assert_eq!(embedding.to_pgvector(), "[0.5,-1,0]");
        assert_eq!(embedding.dimension(), 3);
    }

    #[test]
    fn test_cosine_distance() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        let c = Embedding::new(vec![2.0, 0.0]);
        let d = Embedding::new(vec![-1.0, 0.0]);

        assert!((a.cosine_distance(&c).unwrap()).abs() < 1e-9);
        assert!((a.cosine_distance(&b).unwrap() - 1.0).abs() < 1e-9);
        assert!((a.cosine_distance(&d).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_distance_undefined_cases() {
        let a = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.cosine_distance(&Embedding::new(vec![0.0, 0.0])), None);
        assert_eq!(a.cosine_distance(&Embedding::new(vec![1.0, 0.0, 0.0])), None);
    }

    #[test]
    fn test_non_finite_detection() {
        assert!(Embedding::new(vec![0.1, 0.2]).is_finite());
        assert!(!Embedding::new(vec![0.1, f32::NAN]).is_finite());
    }
}
