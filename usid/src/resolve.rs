/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Selector resolution.
//!
//! Turns a [`Selection`] into the store rows and columns it covers.
//! Each named dimension filters the entries of its axis group by the
//! values in its index-table lane; constraints on the same group are
//! intersected and unconstrained dimensions match everything.

use tracing::debug;

use crate::dims::AxisGroup;
use crate::dims::DimensionError;
use crate::dims::DimensionRegistry;
use crate::schema;
use crate::schema::GroupTables;
use crate::selector::IndexMode;
use crate::selector::Selection;
use crate::selector::SelectorError;

/// Store rows and columns selected by a [`Selection`], each ascending
/// and free of duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSets {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

impl IndexSets {
    pub fn get(&self, group: AxisGroup) -> &[usize] {
        match group {
            AxisGroup::Position => &self.rows,
            AxisGroup::Spectroscopic => &self.cols,
        }
    }

    /// The `(rows, cols)` shape of the flat block.
    pub fn shape(&self) -> [usize; 2] {
        [self.rows.len(), self.cols.len()]
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Dimension(#[from] DimensionError),

    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Resolves `selection` against the index tables of both groups,
/// indexed by `AxisGroup as usize`.
pub fn resolve(
    registry: &DimensionRegistry,
    tables: &[GroupTables; 2],
    selection: &Selection,
    mode: IndexMode,
) -> Result<IndexSets, ResolveError> {
    let mut masks = [
        vec![true; tables[AxisGroup::Position as usize].len()],
        vec![true; tables[AxisGroup::Spectroscopic as usize].len()],
    ];
    for (name, selector) in selection.iter() {
        let dim = registry.resolve(name)?;
        let Some(allowed) = selector.expand(name, dim.size, mode)? else {
            continue;
        };
        let lane = schema::lane(&tables[dim.group as usize], dim.offset);
        for (keep, &value) in masks[dim.group as usize].iter_mut().zip(lane.iter()) {
            *keep = *keep
                && usize::try_from(value).is_ok_and(|value| allowed.binary_search(&value).is_ok());
        }
    }

    let [rows, cols] = masks.map(|mask| {
        mask.into_iter()
            .enumerate()
            .filter_map(|(index, keep)| keep.then_some(index))
            .collect::<Vec<_>>()
    });
    debug!(
        selection = %selection,
        rows = rows.len(),
        cols = cols.len(),
        "resolved selection"
    );
    Ok(IndexSets { rows, cols })
}
