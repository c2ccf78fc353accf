/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for [`Selector`] and [`Selection`].
//!
//! Every generated selector is valid under [`IndexMode::Strict`] for
//! the size it was generated for: no negative indices, no
//! out-of-range values and no zero steps.
//!
//! This module is only included in test builds (`#[cfg(test)]`).
//!
//! [`IndexMode::Strict`]: crate::selector::IndexMode::Strict

use proptest::prelude::*;

use crate::selector::Range;
use crate::selector::Selection;
use crate::selector::Selector;
use crate::testing::NUM_BIAS;
use crate::testing::NUM_CYCLE;
use crate::testing::NUM_X;
use crate::testing::NUM_Y;

/// A non-empty list of indices below `size`, possibly unsorted and
/// with repeats.
pub fn gen_index_list(size: usize) -> BoxedStrategy<Vec<i64>> {
    proptest::collection::vec(0..size as i64, 1..=size).boxed()
}

/// A non-empty range within `0..size`.
pub fn gen_range(size: usize) -> BoxedStrategy<Range> {
    (0..size)
        .prop_flat_map(move |start| {
            let max_len = size - start;
            (1..=max_len).prop_flat_map(move |len| {
                (1..=len).prop_map(move |step| {
                    Range::new(start as i64, (start + len) as i64).step(step as i64)
                })
            })
        })
        .boxed()
}

/// Any selector for a dimension of `size`.
pub fn gen_selector(size: usize) -> BoxedStrategy<Selector> {
    prop_oneof![
        Just(Selector::All),
        (0..size as i64).prop_map(Selector::Index),
        gen_range(size).prop_map(Selector::Range),
        gen_index_list(size).prop_map(Selector::List),
    ]
    .boxed()
}

/// A selection over the standard fixture dimensions. The fixture is a
/// complete grid, so every such selection is dense.
pub fn gen_dense_selection() -> BoxedStrategy<Selection> {
    (
        gen_selector(NUM_X),
        gen_selector(NUM_Y),
        gen_selector(NUM_BIAS),
        gen_selector(NUM_CYCLE),
    )
        .prop_map(|(x, y, bias, cycle)| {
            Selection::new()
                .with("X", x)
                .with("Y", y)
                .with("Bias", bias)
                .with("Cycle", cycle)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::IndexMode;

    proptest! {
        #[test]
        fn test_generated_selectors_are_strictly_valid(selector in gen_selector(NUM_BIAS)) {
            let expanded = selector.expand("Bias", NUM_BIAS, IndexMode::Strict).unwrap();
            if let Some(indices) = expanded {
                prop_assert!(!indices.is_empty());
                prop_assert!(indices.iter().all(|&i| i < NUM_BIAS));
            }
        }
    }
}
