/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Reshaping between the flat and N-dimensional forms.
//!
//! A dense selection reads as a flat `(rows, cols)` block, rows and
//! columns in ascending store order. [`NdLayout`] maps that block to
//! its N-dimensional form in three steps:
//!
//! 1. gather rows and columns into row-major order over each group's
//!    declared dimensions (see [`crate::density::GroupLayout::order`]);
//! 2. view the gathered block with one axis per declared dimension,
//!    position dimensions first;
//! 3. permute the axes into the order given by the [`SortState`].
//!
//! Squeezed layouts additionally drop every axis of size 1. Each step
//! is invertible, so [`NdLayout::to_flat`] reproduces the block that
//! [`NdLayout::to_n_dim`] consumed.

use std::fmt;

use ndarray::Array2;
use ndarray::ArrayD;
use ndarray::ArrayView2;
use ndarray::ArrayViewD;
use ndarray::Axis;
use ndarray::IxDyn;

use crate::density::DenseLayout;
use crate::dims::AxisGroup;
use crate::dims::DimensionRegistry;
use crate::sort::SortState;
use crate::store::into_standard_layout;

/// Errors in converting between the two forms.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ReshapeError {
    #[error("expected a flat block of shape {expected:?}, got {actual:?}")]
    FlatShape {
        expected: [usize; 2],
        actual: Vec<usize>,
    },

    #[error("expected an N-dimensional array of shape {expected:?}, got {actual:?}")]
    NdShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// The mapping between a dense selection's flat block and its
/// N-dimensional form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdLayout {
    row_order: Vec<usize>,
    col_order: Vec<usize>,
    /// Sizes in declared order, position group first.
    declared_sizes: Vec<usize>,
    /// Output axis `i` is declared axis `permutation[i]`.
    permutation: Vec<usize>,
    /// Labels and sizes in output order, before squeezing.
    labels: Vec<String>,
    sizes: Vec<usize>,
    squeeze: bool,
}

impl NdLayout {
    pub fn new(dense: &DenseLayout, registry: &DimensionRegistry, state: SortState) -> Self {
        let mut declared_sizes = Vec::new();
        let mut permutation = Vec::new();
        let mut labels = Vec::new();
        for group in AxisGroup::ALL {
            let base = declared_sizes.len();
            let group_sizes = dense.group(group).sizes();
            for dim in registry.dimensions(group, state) {
                permutation.push(base + dim.ordinal);
                labels.push(dim.name.clone());
            }
            declared_sizes.extend(group_sizes);
        }
        let sizes = permutation.iter().map(|&axis| declared_sizes[axis]).collect();
        Self {
            row_order: dense.position.order.clone(),
            col_order: dense.spectroscopic.order.clone(),
            declared_sizes,
            permutation,
            labels,
            sizes,
            squeeze: false,
        }
    }

    /// Drops axes of size 1 from the N-dimensional form.
    pub fn squeezed(mut self) -> Self {
        self.squeeze = true;
        self
    }

    fn kept(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.sizes.len()).filter(move |&axis| !self.squeeze || self.sizes[axis] != 1)
    }

    /// Shape of the N-dimensional form.
    pub fn shape(&self) -> Vec<usize> {
        self.kept().map(|axis| self.sizes[axis]).collect()
    }

    /// Axis labels of the N-dimensional form.
    pub fn labels(&self) -> Vec<String> {
        self.kept().map(|axis| self.labels[axis].clone()).collect()
    }

    /// Shape of the flat block.
    pub fn flat_shape(&self) -> [usize; 2] {
        [self.row_order.len(), self.col_order.len()]
    }

    pub fn to_n_dim(&self, flat: ArrayView2<'_, f64>) -> Result<ArrayD<f64>, ReshapeError> {
        if flat.shape() != &self.flat_shape()[..] {
            return Err(ReshapeError::FlatShape {
                expected: self.flat_shape(),
                actual: flat.shape().to_vec(),
            });
        }
        let gathered = into_standard_layout(
            flat.select(Axis(0), &self.row_order)
                .select(Axis(1), &self.col_order),
        );
        let declared = gathered.into_shape_with_order(IxDyn(&self.declared_sizes))?;
        let permuted = declared
            .permuted_axes(IxDyn(&self.permutation))
            .as_standard_layout()
            .into_owned();
        Ok(permuted.into_shape_with_order(IxDyn(&self.shape()))?)
    }

    pub fn to_flat(&self, nd: ArrayViewD<'_, f64>) -> Result<Array2<f64>, ReshapeError> {
        if nd.shape() != self.shape().as_slice() {
            return Err(ReshapeError::NdShape {
                expected: self.shape(),
                actual: nd.shape().to_vec(),
            });
        }
        let unsqueezed = nd
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&self.sizes))?;
        let declared = unsqueezed
            .permuted_axes(IxDyn(&inverse(&self.permutation)))
            .as_standard_layout()
            .into_owned();
        let gathered = declared.into_shape_with_order(self.flat_shape())?;
        Ok(into_standard_layout(
            gathered
                .select(Axis(0), &inverse(&self.row_order))
                .select(Axis(1), &inverse(&self.col_order)),
        ))
    }
}

impl fmt::Display for NdLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NdLayout {{ flat={:?} labels={:?} shape={:?} }}",
            self.flat_shape(),
            self.labels(),
            self.shape()
        )
    }
}

fn inverse(permutation: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; permutation.len()];
    for (i, &p) in permutation.iter().enumerate() {
        inverse[p] = i;
    }
    inverse
}
