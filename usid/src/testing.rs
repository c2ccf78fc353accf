/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Test fixtures.
//!
//! The standard store holds a band-excitation sweep: position
//! dimensions `X` (5) and `Y` (3), spectroscopic dimensions `Bias` (7)
//! and `Cycle` (2). Every main array cell holds `row * 100 + col`, so
//! any value identifies the cell it was read from.

use std::sync::Arc;

use ndarray::Array2;

use crate::dims::AxisGroup;
use crate::dims::DimensionRegistry;
use crate::schema;
use crate::schema::GroupTables;
use crate::store::AttrValue;
use crate::store::Attrs;
use crate::store::MemoryStore;
use crate::store::Store;

pub const MAIN: &str = "Raw_Measurement/source_main";
pub const POS_INDS: &str = "Raw_Measurement/Position_Indices";
pub const POS_VALS: &str = "Raw_Measurement/Position_Values";
pub const SPEC_INDS: &str = "Raw_Measurement/Spectroscopic_Indices";
pub const SPEC_VALS: &str = "Raw_Measurement/Spectroscopic_Values";

pub const NUM_X: usize = 5;
pub const NUM_Y: usize = 3;
pub const NUM_BIAS: usize = 7;
pub const NUM_CYCLE: usize = 2;

/// How the index tables enumerate their combinations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `X` and `Bias` change fastest (row-major over `[Y, X]` and
    /// `[Cycle, Bias]`).
    Standard,
    /// `Y` and `Cycle` change fastest, labels still declared as
    /// `[X, Y]` and `[Bias, Cycle]`.
    Reversed,
}

impl Layout {
    /// Store row of position `(x, y)`.
    pub fn row(self, x: usize, y: usize) -> usize {
        match self {
            Layout::Standard => y * NUM_X + x,
            Layout::Reversed => x * NUM_Y + y,
        }
    }

    /// Store column of spectroscopic step `(bias, cycle)`.
    pub fn col(self, bias: usize, cycle: usize) -> usize {
        match self {
            Layout::Standard => cycle * NUM_BIAS + bias,
            Layout::Reversed => bias * NUM_CYCLE + cycle,
        }
    }

    /// The value stored for the given coordinates.
    pub fn value(self, x: usize, y: usize, bias: usize, cycle: usize) -> f64 {
        cell(self.row(x, y), self.col(bias, cycle))
    }
}

pub fn cell(row: usize, col: usize) -> f64 {
    (row * 100 + col) as f64
}

pub fn x_value(x: usize) -> f64 {
    x as f64 * 0.5
}

pub fn y_value(y: usize) -> f64 {
    y as f64 * 0.25
}

pub fn bias_value(bias: usize) -> f64 {
    -1.5 + bias as f64 * 0.5
}

pub fn cycle_value(cycle: usize) -> f64 {
    cycle as f64
}

/// Builds the standard store, or a variant of it.
pub fn beps_store(layout: Layout) -> MemoryStore {
    let positions: Vec<(usize, usize)> = {
        let mut positions = vec![(0, 0); NUM_X * NUM_Y];
        for x in 0..NUM_X {
            for y in 0..NUM_Y {
                positions[layout.row(x, y)] = (x, y);
            }
        }
        positions
    };
    let steps: Vec<(usize, usize)> = {
        let mut steps = vec![(0, 0); NUM_BIAS * NUM_CYCLE];
        for b in 0..NUM_BIAS {
            for c in 0..NUM_CYCLE {
                steps[layout.col(b, c)] = (b, c);
            }
        }
        steps
    };
    build_store(&positions, &steps)
}

/// The standard store with its last position removed, so that no
/// complete `X` × `Y` grid exists.
pub fn sparse_store() -> MemoryStore {
    let mut positions: Vec<(usize, usize)> = (0..NUM_Y)
        .flat_map(|y| (0..NUM_X).map(move |x| (x, y)))
        .collect();
    positions.pop();
    let steps: Vec<(usize, usize)> = (0..NUM_CYCLE)
        .flat_map(|c| (0..NUM_BIAS).map(move |b| (b, c)))
        .collect();
    build_store(&positions, &steps)
}

pub fn build_store(positions: &[(usize, usize)], steps: &[(usize, usize)]) -> MemoryStore {
    let p = positions.len();
    let s = steps.len();
    let main = Array2::from_shape_fn((p, s), |(r, c)| cell(r, c));
    let pos_inds = Array2::from_shape_fn((p, 2), |(r, d)| {
        let (x, y) = positions[r];
        [x, y][d] as i64
    });
    let pos_vals = Array2::from_shape_fn((p, 2), |(r, d)| {
        let (x, y) = positions[r];
        [x_value(x), y_value(y)][d]
    });
    let spec_inds = Array2::from_shape_fn((2, s), |(d, c)| {
        let (b, cy) = steps[c];
        [b, cy][d] as i64
    });
    let spec_vals = Array2::from_shape_fn((2, s), |(d, c)| {
        let (b, cy) = steps[c];
        [bias_value(b), cycle_value(cy)][d]
    });

    let mut store = MemoryStore::new();
    store
        .insert(
            MAIN,
            main,
            [
                (schema::QUANTITY, AttrValue::from("Cantilever Vertical Deflection")),
                (schema::UNITS, AttrValue::from("V")),
                (schema::POSITION_INDICES, AttrValue::from(POS_INDS)),
                (schema::POSITION_VALUES, AttrValue::from(POS_VALS)),
                (schema::SPECTROSCOPIC_INDICES, AttrValue::from(SPEC_INDS)),
                (schema::SPECTROSCOPIC_VALUES, AttrValue::from(SPEC_VALS)),
            ],
        )
        .insert(
            POS_INDS,
            pos_inds,
            [
                (schema::LABELS, AttrValue::from(vec!["X", "Y"])),
                (schema::UNITS, AttrValue::from(vec!["um", "um"])),
                ("X", AttrValue::from(0_i64)),
                ("Y", AttrValue::from(1_i64)),
            ],
        )
        .insert(POS_VALS, pos_vals, Attrs::new())
        .insert(
            SPEC_INDS,
            spec_inds,
            [
                (schema::LABELS, AttrValue::from(vec!["Bias", "Cycle"])),
                (schema::UNITS, AttrValue::from(vec!["V", ""])),
                ("Bias", AttrValue::from(0_i64)),
                ("Cycle", AttrValue::from(1_i64)),
            ],
        )
        .insert(SPEC_VALS, spec_vals, Attrs::new());
    store
}

/// A store with `dims` position dimensions `D0..` over `rows` rows,
/// where every dimension's index equals the row number, and a single
/// spectroscopic step.
pub fn diagonal_store(dims: usize, rows: usize) -> MemoryStore {
    let labels: Vec<String> = (0..dims).map(|d| format!("D{d}")).collect();
    let mut pos_attrs: Attrs = labels
        .iter()
        .enumerate()
        .map(|(d, label)| (label.clone(), AttrValue::from(d)))
        .collect();
    pos_attrs.insert(schema::LABELS.to_string(), AttrValue::from(labels.clone()));
    pos_attrs.insert(schema::UNITS.to_string(), AttrValue::from(vec![""; dims]));

    let mut store = MemoryStore::new();
    store
        .insert(
            MAIN,
            Array2::from_shape_fn((rows, 1), |(r, c)| cell(r, c)),
            [
                (schema::QUANTITY, AttrValue::from("Amplitude")),
                (schema::UNITS, AttrValue::from("V")),
                (schema::POSITION_INDICES, AttrValue::from(POS_INDS)),
                (schema::POSITION_VALUES, AttrValue::from(POS_VALS)),
                (schema::SPECTROSCOPIC_INDICES, AttrValue::from(SPEC_INDS)),
                (schema::SPECTROSCOPIC_VALUES, AttrValue::from(SPEC_VALS)),
            ],
        )
        .insert(
            POS_INDS,
            Array2::from_shape_fn((rows, dims), |(r, _)| r as i64),
            pos_attrs,
        )
        .insert(
            POS_VALS,
            Array2::from_shape_fn((rows, dims), |(r, _)| r as f64),
            Attrs::new(),
        )
        .insert(
            SPEC_INDS,
            Array2::<i64>::zeros((1, 1)),
            [
                (schema::LABELS, AttrValue::from(vec!["Bias"])),
                (schema::UNITS, AttrValue::from(vec!["V"])),
                ("Bias", AttrValue::from(0_i64)),
            ],
        )
        .insert(SPEC_VALS, Array2::<f64>::zeros((1, 1)), Attrs::new());
    store
}

pub fn shared(store: MemoryStore) -> Arc<MemoryStore> {
    Arc::new(store)
}

/// Loads both groups of `store` and builds their registry.
pub fn registry_and_tables(store: &MemoryStore) -> (DimensionRegistry, [GroupTables; 2]) {
    let attrs = store.attrs(MAIN).unwrap();
    let shape = store.shape(MAIN).unwrap();
    let tables = AxisGroup::ALL
        .map(|group| schema::load_group(store, MAIN, &attrs, shape, group).unwrap());
    let registry = DimensionRegistry::new(&tables[0], &tables[1]).unwrap();
    (registry, tables)
}
