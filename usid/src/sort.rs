/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Dimension ordering.
//!
//! Index tables enumerate dimension combinations in whatever order the
//! acquisition produced them. A view can report (and reshape) its
//! dimensions either in the order they are declared in the file, or
//! ranked by how fast each one changes along the store axis, fastest
//! first.
//!
//! The effective order is never cached: it is a pure function of the
//! declared order, the change-rate ranking and the current
//! [`SortState`], so toggling the state twice always gives back the
//! declared order.

use std::fmt;

use ndarray::ArrayView2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;

/// Which order a view reports its dimensions in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortState {
    /// Dimensions appear in the order they are declared in the file.
    #[default]
    FileOrder,

    /// Dimensions are ranked from fastest to slowest changing.
    FastestFirst,
}

impl SortState {
    /// The other state.
    pub fn toggled(self) -> Self {
        match self {
            SortState::FileOrder => SortState::FastestFirst,
            SortState::FastestFirst => SortState::FileOrder,
        }
    }

    pub fn is_sorted(self) -> bool {
        self == SortState::FastestFirst
    }
}

impl fmt::Display for SortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortState::FileOrder => {
                write!(f, "Data dimensions are in the order they occur in the file.")
            }
            SortState::FastestFirst => write!(
                f,
                "Data dimensions are sorted in order from fastest changing dimension to slowest."
            ),
        }
    }
}

/// Counts, for every lane of `table` along `lanes`, how many times the
/// value changes between neighbours.
///
/// For a position table `(P, Dp)` pass `Axis(1)`: each column is one
/// dimension. For a spectroscopic table `(Ds, S)` pass `Axis(0)`.
pub fn change_counts(table: ArrayView2<'_, i64>, lanes: Axis) -> Vec<usize> {
    table
        .axis_iter(lanes)
        .map(|lane| lane.windows(2).into_iter().filter(|w| w[0] != w[1]).count())
        .collect()
}

/// Ranks dimensions from fastest to slowest changing. Ties keep their
/// declared order.
pub fn fastest_first(change_counts: &[usize]) -> Vec<usize> {
    let mut ranking: Vec<usize> = (0..change_counts.len()).collect();
    ranking.sort_by_key(|&i| std::cmp::Reverse(change_counts[i]));
    ranking
}

/// The order in which the items of one axis group are reported.
///
/// `ranking` is a permutation of `0..declared.len()` as produced by
/// [`fastest_first`].
pub fn effective_order<T: Clone>(declared: &[T], ranking: &[usize], state: SortState) -> Vec<T> {
    match state {
        SortState::FileOrder => declared.to_vec(),
        SortState::FastestFirst => ranking.iter().map(|&i| declared[i].clone()).collect(),
    }
}
