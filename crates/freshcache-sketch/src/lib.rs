//! Bounded-memory frequency estimators: a count-min sketch with an optional
//! conservative-update mode, and a top-K heavy-hitter sketch built on top of
//! it. These back the EW tracker family in `freshcache-tracker`.

mod count_min;
mod topk;

pub use count_min::{epsilon_delta_for_cardinality, CountMinSketch};
pub use topk::TopKSketch;

/// `K = sqrt(expected_num_keys)` heavy-hitter budget, per the sizing rule
/// the tracker family shares with the count-min sketch dimensions.
pub fn heavy_hitter_budget(expected_num_keys: usize) -> usize {
    (expected_num_keys.max(1) as f64).sqrt().ceil() as usize
}
