//! Deterministic candidate selection.
//!
//! Accepted candidates are ordered by: fewer repairs, then higher preferred-tier
//! coverage, then fewer joins, then fewer predicates, then lower input index.
//! The order is total, so the same inputs always produce the same ranking.

use crate::constraints::Coverage;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Position in the input candidate list.
    pub index: usize,
    pub repairs: usize,
    pub coverage: Coverage,
    pub joins: usize,
    pub predicates: usize,
}

impl CandidateScore {
    fn key(&self) -> (usize, Reverse<usize>, usize, usize, usize) {
        (
            self.repairs,
            Reverse(self.coverage.satisfied),
            self.joins,
            self.predicates,
            self.index,
        )
    }
}

/// Candidate indices, best first.
pub fn rank(scores: &[CandidateScore]) -> Vec<usize> {
    scores.iter().sorted_by_key(|s| s.key()).map(|s| s.index).collect()
}
