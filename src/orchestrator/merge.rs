//! Weighted multi-query merge for refine mode.
//!
//! Each expanded query contributes a weighted RRF term per result; terms
//! for the same natural key accumulate across queries, so an item several
//! phrasings agree on outranks one only a single phrasing surfaces.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::fusion::merge_candidates;
use crate::types::{Fused, Keyed};

/// One expanded query's fused results plus its merge weight.
#[derive(Debug, Clone)]
pub struct WeightedList<P> {
    pub results: Vec<Fused<P>>,
    pub weight: f32,
}

/// Merge per-query result lists into one deduplicated ranking.
///
/// An item at 0-based rank `r` in a query's list contributes
/// `weight / (k + r + 1)`; contributions accumulate by natural key. When a
/// key repeats across queries, optional score fields keep their maximum
/// and a highlighted snippet is preferred over a plain one. Accumulation
/// is additive, so merging the same lists in any order yields the same
/// score per key.
pub fn merge_weighted<P: Keyed>(lists: Vec<WeightedList<P>>, k: f32) -> Vec<Fused<P>> {
    let mut order: Vec<Fused<P>> = Vec::new();
    let mut scores: Vec<f32> = Vec::new();
    let mut index: HashMap<P::Key, usize> = HashMap::new();

    for list in lists {
        for (rank, item) in list.results.into_iter().enumerate() {
            let contribution = list.weight / (k + rank as f32 + 1.0);
            match index.entry(item.candidate.payload.key()) {
                Entry::Occupied(slot) => {
                    let i = *slot.get();
                    scores[i] += contribution;
                    merge_candidates(&mut order[i].candidate, item.candidate);
                }
                Entry::Vacant(slot) => {
                    slot.insert(order.len());
                    scores.push(contribution);
                    order.push(item);
                }
            }
        }
    }

    for (item, score) in order.iter_mut().zip(&scores) {
        item.fused_score = *score;
        item.rrf_score = *score;
    }
    order.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}
