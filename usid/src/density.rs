/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Density classification.
//!
//! A selection is dense when, on each axis group, its entries cover
//! every combination of the values that remain per dimension exactly
//! once. Only dense selections have an N-dimensional form.
//!
//! Classification also records where each grid cell lives: for a
//! dense group, [`GroupLayout::order`] lists the positions (into the
//! selected index set) of the cells in row-major order over the
//! group's dimensions in declared order. This is what lets the reshape
//! engine handle tables that enumerate combinations in any order.

use std::fmt;

use itertools::Itertools;
use tracing::debug;

use crate::dims::AxisGroup;
use crate::dims::DimensionRegistry;
use crate::resolve::IndexSets;
use crate::schema;
use crate::schema::GroupTables;
use crate::sort;
use crate::sort::SortState;

/// The grid formed by one axis group of a dense selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupLayout {
    pub group: AxisGroup,
    /// Remaining values per dimension, in declared order.
    pub values: Vec<Vec<i64>>,
    /// Positions into the selected index set, in row-major order over
    /// the declared dimensions.
    pub order: Vec<usize>,
}

impl GroupLayout {
    /// Remaining sizes per dimension, in declared order.
    pub fn sizes(&self) -> Vec<usize> {
        self.values.iter().map(Vec::len).collect()
    }
}

/// Both groups of a dense selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseLayout {
    pub position: GroupLayout,
    pub spectroscopic: GroupLayout,
}

impl DenseLayout {
    pub fn group(&self, group: AxisGroup) -> &GroupLayout {
        match group {
            AxisGroup::Position => &self.position,
            AxisGroup::Spectroscopic => &self.spectroscopic,
        }
    }

    /// The N-dimensional shape, position dimensions first, each group
    /// in the order given by `state`.
    pub fn shape(&self, registry: &DimensionRegistry, state: SortState) -> Vec<usize> {
        AxisGroup::ALL
            .iter()
            .flat_map(|&group| {
                sort::effective_order(&self.group(group).sizes(), registry.ranking(group), state)
            })
            .collect()
    }
}

/// Why a selection has no N-dimensional form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sparse {
    pub group: AxisGroup,
    /// Number of selected entries.
    pub entries: usize,
    /// Number of distinct combinations of the remaining values,
    /// saturating at `usize::MAX`.
    pub combinations: usize,
}

impl fmt::Display for Sparse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries == self.combinations {
            write!(f, "{} entries repeat a combination", self.group)
        } else {
            write!(
                f,
                "{} {} entries do not cover {} combinations",
                self.entries, self.group, self.combinations
            )
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Density {
    Dense(DenseLayout),
    Sparse(Sparse),
}

impl Density {
    pub fn is_dense(&self) -> bool {
        matches!(self, Density::Dense(_))
    }
}

/// Classifies the selection `sets` over the tables of both groups.
pub fn classify(tables: &[GroupTables; 2], sets: &IndexSets) -> Density {
    let [position, spectroscopic] = AxisGroup::ALL
        .map(|group| classify_group(&tables[group as usize], sets.get(group)));
    let density = match (position, spectroscopic) {
        (Ok(position), Ok(spectroscopic)) => Density::Dense(DenseLayout {
            position,
            spectroscopic,
        }),
        (Err(sparse), _) | (_, Err(sparse)) => Density::Sparse(sparse),
    };
    match &density {
        Density::Dense(_) => debug!("selection is dense"),
        Density::Sparse(sparse) => debug!(%sparse, "selection is sparse"),
    }
    density
}

fn classify_group(tables: &GroupTables, entries: &[usize]) -> Result<GroupLayout, Sparse> {
    let lanes: Vec<_> = tables
        .offsets
        .iter()
        .map(|&offset| schema::lane(tables, offset))
        .collect();
    let values: Vec<Vec<i64>> = lanes
        .iter()
        .map(|lane| {
            entries
                .iter()
                .map(|&entry| lane[entry])
                .sorted_unstable()
                .dedup()
                .collect()
        })
        .collect();
    let sizes: Vec<usize> = values.iter().map(Vec::len).collect();
    let combinations = sizes
        .iter()
        .try_fold(1_usize, |acc, &size| acc.checked_mul(size))
        .unwrap_or(usize::MAX);
    let sparse = || Sparse {
        group: tables.group,
        entries: entries.len(),
        combinations,
    };
    if entries.len() != combinations {
        return Err(sparse());
    }

    let mut slots: Vec<Option<usize>> = vec![None; combinations];
    for (position, &entry) in entries.iter().enumerate() {
        let mut cell = 0;
        for (lane, dim_values) in lanes.iter().zip(&values) {
            // Present by construction.
            let rank = dim_values.binary_search(&lane[entry]).unwrap_or_default();
            cell = cell * dim_values.len() + rank;
        }
        if slots[cell].replace(position).is_some() {
            return Err(sparse());
        }
    }
    let order = slots.into_iter().collect::<Option<Vec<_>>>().ok_or_else(sparse)?;
    Ok(GroupLayout {
        group: tables.group,
        values,
        order,
    })
}
