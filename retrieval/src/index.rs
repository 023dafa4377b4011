//! Immutable in-memory vector index.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use tracing::debug;

use docqa_embeddings::{Embedding, EmbeddingError, dot_product};

/// A scored position in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    /// Chunk position.
    pub index: usize,

    /// Dot product with the query vector.
    pub score: f32,
}

/// Ordered embedding vectors, one per chunk, all of the same dimension.
///
/// There is no mutating API: a new document produces a new index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Vec<Embedding>,
    dimension: usize,
}

impl VectorIndex {
    /// Build an index, rejecting any vector whose length differs from `dimension`.
    pub fn from_vectors(dimension: usize, vectors: Vec<Embedding>) -> Result<Self, EmbeddingError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(Self { vectors, dimension })
    }

    /// Wrap vectors the builder has already checked against `dimension`.
    pub(crate) fn from_aligned(dimension: usize, vectors: Vec<Embedding>) -> Self {
        debug_assert!(vectors.iter().all(|v| v.len() == dimension));
        Self { vectors, dimension }
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimension shared by every vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector at a chunk position.
    pub fn get(&self, index: usize) -> Option<&Embedding> {
        self.vectors.get(index)
    }

    /// Dot product of the query with every vector, in index order.
    pub fn score_all(&self, query: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
        self.vectors.iter().map(|v| dot_product(query, v)).collect()
    }

    /// The `k` best positions by descending score.
    ///
    /// Equal scores keep ascending index order, so the same query against the
    /// same index always ranks identically.
    pub fn rank(&self, query: &[f32], k: usize) -> Result<Vec<ScoredIndex>, EmbeddingError> {
        let scores = self.score_all(query)?;

        let mut ranked: Vec<ScoredIndex> = scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| ScoredIndex { index, score })
            .collect();

        // sort_by_key is stable, which is what breaks ties by index.
        ranked.sort_by_key(|s| Reverse(OrderedFloat(s.score)));
        ranked.truncate(k);

        debug!("Ranked {} of {} vectors", ranked.len(), self.vectors.len());
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn positions(ranked: &[ScoredIndex]) -> Vec<usize> {
        ranked.iter().map(|s| s.index).collect()
    }

    #[test]
    fn test_rank_orders_by_score() {
        let index = VectorIndex::from_vectors(
            2,
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap();

        let ranked = index.rank(&[1.0, 0.0], 2).unwrap();
        assert_eq!(positions(&ranked), vec![0, 2]);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        assert!((ranked[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_ascending_index() {
        let index = VectorIndex::from_vectors(
            2,
            vec![
                vec![0.0, 1.0],
                vec![0.5, 0.5],
                vec![0.0, 1.0],
                vec![0.5, 0.5],
            ],
        )
        .unwrap();

        let first = index.rank(&[0.0, 1.0], 4).unwrap();
        let second = index.rank(&[0.0, 1.0], 4).unwrap();
        assert_eq!(positions(&first), vec![0, 2, 1, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = VectorIndex::from_vectors(1, vec![vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(index.rank(&[1.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn test_zero_vectors_rank_last_for_positive_scores() {
        let index =
            VectorIndex::from_vectors(2, vec![vec![0.0, 0.0], vec![0.3, 0.1]]).unwrap();
        let ranked = index.rank(&[1.0, 0.0], 2).unwrap();
        assert_eq!(positions(&ranked), vec![1, 0]);
    }

    #[test]
    fn test_dimension_checks() {
        assert!(VectorIndex::from_vectors(2, vec![vec![1.0, 0.0], vec![1.0]]).is_err());

        let index = VectorIndex::from_vectors(2, vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.rank(&[1.0, 0.0, 0.0], 1).is_err());
    }
}
