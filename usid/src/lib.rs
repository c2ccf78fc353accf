/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Views over universal spectroscopic and imaging datasets.
//!
//! A dataset is stored as a 2-D main array of shape `(positions,
//! spectroscopic steps)`. Ancillary index tables record which
//! combination of named dimension values each row and column holds,
//! in whatever order the acquisition produced them. [`UsiDataset`]
//! resolves per-dimension selections against those tables, reports
//! whether a selection forms a complete grid, and reshapes it into its
//! N-dimensional form, either eagerly or as a deferred computation.

pub mod config;
pub mod dataset;
pub mod density;
pub mod dims;
pub mod eval;
pub mod request;
pub mod reshape;
pub mod resolve;
pub mod schema;
pub mod selector;
pub mod sort;
pub mod store;

#[cfg(test)]
pub mod strategy;
#[cfg(test)]
pub(crate) mod testing;

pub use dataset::DatasetError;
pub use dataset::ErrorKind;
pub use dataset::Form;
pub use dataset::Reduction;
pub use dataset::UsiDataset;
pub use dims::AxisGroup;
pub use eval::Evaluated;
pub use eval::Evaluation;
pub use selector::Range;
pub use selector::Selection;
pub use selector::Selector;
pub use sort::SortState;
pub use store::DType;
pub use store::MemoryStore;
pub use store::Store;
