/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The dataset view.
//!
//! [`UsiDataset`] wraps a main array stored in compact `(positions,
//! spectroscopic steps)` form together with its index and value
//! tables. It answers questions about the dataset's named dimensions
//! and reads selections of it either in flat form or reshaped to the
//! N-dimensional array the data represents.
//!
//! ```ignore
//! let mut dataset = UsiDataset::open(store, "Measurement/Raw_Data")?;
//! let (slice, _) = dataset.slice(
//!     &Selection::new().with("X", 3_i64),
//!     Form::NDim,
//!     Some(Evaluation::Eager),
//! )?;
//! dataset.toggle_sorting();
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use itertools::Itertools;
use ndarray::Array1;
use ndarray::ArrayD;
use ndarray::Axis;
use ndarray::Ix2;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config;
use crate::config::Config;
use crate::density;
use crate::density::Density;
use crate::density::Sparse;
use crate::dims::AxisGroup;
use crate::dims::DimensionError;
use crate::dims::DimensionRegistry;
use crate::eval::Deferred;
use crate::eval::Eager;
use crate::eval::EvalError;
use crate::eval::Evaluated;
use crate::eval::Evaluation;
use crate::eval::ReadPlan;
use crate::eval::Strategy;
use crate::reshape::NdLayout;
use crate::reshape::ReshapeError;
use crate::resolve;
use crate::resolve::IndexSets;
use crate::resolve::ResolveError;
use crate::schema;
use crate::schema::GroupTables;
use crate::schema::SchemaError;
use crate::selector::IndexMode;
use crate::selector::Selection;
use crate::selector::SelectorError;
use crate::sort::SortState;
use crate::store::Store;
use crate::store::StoreError;

/// Axis labels of flat results.
pub const FLAT_LABELS: [&str; 2] = ["Position", "Spectroscopic"];

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Dimension(#[from] DimensionError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Reshape(#[from] ReshapeError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("dimension name must be text, got {0}")]
    InvalidNameType(String),

    #[error("dataset has no N-dimensional form: {0}")]
    NotDense(Sparse),
}

impl From<ResolveError> for DatasetError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Dimension(err) => DatasetError::Dimension(err),
            ResolveError::Selector(err) => DatasetError::Selector(err),
        }
    }
}

/// Coarse classification of a [`DatasetError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A name that is not a dimension of the dataset.
    Lookup,
    /// An argument of the wrong kind.
    Type,
    /// An argument of the right kind with an unsupported value.
    Value,
    /// An index outside a dimension.
    Index,
    /// A structurally inconsistent store.
    Schema,
    Store,
    Shape,
}

impl DatasetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatasetError::Store(_) => ErrorKind::Store,
            DatasetError::Schema(_) => ErrorKind::Schema,
            DatasetError::Dimension(_) => ErrorKind::Lookup,
            DatasetError::Selector(err) => match err {
                SelectorError::InvalidSelectorType { .. } => ErrorKind::Type,
                SelectorError::UnsupportedNegativeIndex { .. } => ErrorKind::Value,
                SelectorError::SelectorOutOfRange { .. } => ErrorKind::Index,
            },
            DatasetError::Eval(EvalError::Store(_)) => ErrorKind::Store,
            DatasetError::Reshape(_) | DatasetError::Eval(_) | DatasetError::NotDense(_) => {
                ErrorKind::Shape
            }
            DatasetError::InvalidNameType(_) => ErrorKind::Type,
        }
    }
}

/// The form of a slice.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Form {
    /// A `(positions, spectroscopic steps)` block.
    #[default]
    Flat,
    /// One axis per remaining dimension.
    NDim,
}

/// How [`UsiDataset::reduce`] collapses a dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Mean,
    Sum,
    Min,
    Max,
}

impl Reduction {
    fn apply(self, array: &ArrayD<f64>, axis: Axis) -> ArrayD<f64> {
        match self {
            Reduction::Sum => array.sum_axis(axis),
            Reduction::Mean => array.sum_axis(axis) / array.len_of(axis) as f64,
            Reduction::Min => array.fold_axis(axis, f64::INFINITY, |acc, &v| acc.min(v)),
            Reduction::Max => array.fold_axis(axis, f64::NEG_INFINITY, |acc, &v| acc.max(v)),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Mean => write!(f, "mean"),
            Reduction::Sum => write!(f, "sum"),
            Reduction::Min => write!(f, "min"),
            Reduction::Max => write!(f, "max"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown reduction {0:?}")]
pub struct ParseReductionError(String);

impl FromStr for Reduction {
    type Err = ParseReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            "min" => Ok(Reduction::Min),
            "max" => Ok(Reduction::Max),
            _ => Err(ParseReductionError(s.to_string())),
        }
    }
}

/// A read-only view over one main array and its ancillary tables.
#[derive(Debug)]
pub struct UsiDataset {
    store: Arc<dyn Store>,
    path: String,
    shape: [usize; 2],
    quantity: String,
    units: String,
    /// Indexed by `AxisGroup as usize`.
    tables: [GroupTables; 2],
    registry: DimensionRegistry,
    sort_state: SortState,
    config: Config,
    deferred: Deferred,
}

impl UsiDataset {
    /// Opens the main array at `path` with the current global
    /// configuration.
    pub fn open(store: Arc<dyn Store>, path: &str) -> Result<Self, DatasetError> {
        Self::open_with_config(store, path, config::global::get())
    }

    pub fn open_with_config(
        store: Arc<dyn Store>,
        path: &str,
        config: Config,
    ) -> Result<Self, DatasetError> {
        let shape = store.shape(path)?;
        let attrs = store.attrs(path)?;
        let quantity = schema::text_attr(&attrs, path, schema::QUANTITY)?;
        let units = schema::text_attr(&attrs, path, schema::UNITS)?;
        let tables = [
            schema::load_group(store.as_ref(), path, &attrs, shape, AxisGroup::Position)?,
            schema::load_group(store.as_ref(), path, &attrs, shape, AxisGroup::Spectroscopic)?,
        ];
        let registry = DimensionRegistry::new(&tables[0], &tables[1])?;
        let deferred = Deferred::from_config(&config)?;
        info!(
            path,
            ?shape,
            labels = ?registry.n_dim_labels(SortState::FileOrder),
            sizes = ?registry.n_dim_sizes(SortState::FileOrder),
            "opened dataset"
        );
        Ok(Self {
            store,
            path: path.to_string(),
            shape,
            quantity,
            units,
            tables,
            registry,
            sort_state: SortState::default(),
            config,
            deferred,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `(positions, spectroscopic steps)`.
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn quantity(&self) -> &str {
        &self.quantity
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    /// `"quantity (units)"`.
    pub fn data_descriptor(&self) -> String {
        format!("{} ({})", self.quantity, self.units)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &DimensionRegistry {
        &self.registry
    }

    pub fn pos_dim_labels(&self) -> Vec<&str> {
        self.registry.labels(AxisGroup::Position, SortState::FileOrder)
    }

    pub fn spec_dim_labels(&self) -> Vec<&str> {
        self.registry
            .labels(AxisGroup::Spectroscopic, SortState::FileOrder)
    }

    pub fn pos_dim_sizes(&self) -> Vec<usize> {
        self.registry.sizes(AxisGroup::Position, SortState::FileOrder)
    }

    pub fn spec_dim_sizes(&self) -> Vec<usize> {
        self.registry
            .sizes(AxisGroup::Spectroscopic, SortState::FileOrder)
    }

    pub fn pos_dim_descriptors(&self) -> Vec<String> {
        self.descriptors(AxisGroup::Position)
    }

    pub fn spec_dim_descriptors(&self) -> Vec<String> {
        self.descriptors(AxisGroup::Spectroscopic)
    }

    fn descriptors(&self, group: AxisGroup) -> Vec<String> {
        self.registry
            .declared(group)
            .iter()
            .map(|dim| dim.descriptor())
            .collect()
    }

    /// Dimension labels of the N-dimensional form, in the current sort
    /// order.
    pub fn n_dim_labels(&self) -> Vec<&str> {
        self.registry.n_dim_labels(self.sort_state)
    }

    pub fn n_dim_sizes(&self) -> Vec<usize> {
        self.registry.n_dim_sizes(self.sort_state)
    }

    pub fn sort_state(&self) -> SortState {
        self.sort_state
    }

    /// Switches between file order and fastest-first order.
    pub fn toggle_sorting(&mut self) {
        self.sort_state = self.sort_state.toggled();
        debug!(state = ?self.sort_state, labels = ?self.n_dim_labels(), "toggled sorting");
    }

    /// Describes the current sort state.
    pub fn current_sorting(&self) -> String {
        self.sort_state.to_string()
    }

    /// The physical values of position dimension `name`, one per
    /// position row.
    pub fn get_pos_values(&self, name: &str) -> Result<Array1<f64>, DatasetError> {
        self.values(AxisGroup::Position, name)
    }

    /// The physical values of spectroscopic dimension `name`, one per
    /// spectroscopic column.
    pub fn get_spec_values(&self, name: &str) -> Result<Array1<f64>, DatasetError> {
        self.values(AxisGroup::Spectroscopic, name)
    }

    fn values(&self, group: AxisGroup, name: &str) -> Result<Array1<f64>, DatasetError> {
        let dim = self.registry.resolve_in(group, name)?;
        let tables = &self.tables[group as usize];
        Ok(tables
            .values
            .index_axis(group.lane_axis(), dim.offset)
            .to_owned())
    }

    /// Resolves `selection` to store rows and columns. Negative indices
    /// are rejected.
    pub fn pos_spec_slices(&self, selection: &Selection) -> Result<IndexSets, DatasetError> {
        Ok(resolve::resolve(
            &self.registry,
            &self.tables,
            selection,
            IndexMode::Strict,
        )?)
    }

    /// Reads `selection` in the requested form.
    ///
    /// In N-dimensional form, indices wrap Python-style and single-value
    /// dimensions are squeezed away. A selection without an
    /// N-dimensional form is returned flat; the flag is true whenever
    /// the read succeeded.
    pub fn slice(
        &self,
        selection: &Selection,
        form: Form,
        evaluation: Option<Evaluation>,
    ) -> Result<(Evaluated, bool), DatasetError> {
        let mode = match form {
            Form::Flat => IndexMode::Strict,
            Form::NDim => IndexMode::Wrapping,
        };
        let sets = resolve::resolve(&self.registry, &self.tables, selection, mode)?;
        let plan = self.flat_plan(&sets);
        let plan = match form {
            Form::Flat => plan,
            Form::NDim => match density::classify(&self.tables, &sets) {
                Density::Dense(dense) => {
                    let layout = NdLayout::new(&dense, &self.registry, self.sort_state).squeezed();
                    with_n_dim(plan, layout)
                }
                Density::Sparse(sparse) => {
                    warn!(%selection, %sparse, "returning flat form");
                    plan
                }
            },
        };
        let evaluated = self.evaluate(plan, evaluation)?;
        Ok((evaluated, true))
    }

    /// The whole dataset in N-dimensional form, without squeezing.
    /// Sparse datasets are returned flat with the flag set to false.
    pub fn get_n_dim_form(
        &self,
        evaluation: Option<Evaluation>,
    ) -> Result<(Evaluated, bool), DatasetError> {
        let sets = self.all();
        let plan = self.flat_plan(&sets);
        match density::classify(&self.tables, &sets) {
            Density::Dense(dense) => {
                let layout = NdLayout::new(&dense, &self.registry, self.sort_state);
                Ok((self.evaluate(with_n_dim(plan, layout), evaluation)?, true))
            }
            Density::Sparse(sparse) => {
                warn!(path = %self.path, %sparse, "dataset has no N-dimensional form");
                Ok((self.evaluate(plan, evaluation)?, false))
            }
        }
    }

    /// Collapses dimensions `dims` of the N-dimensional form.
    pub fn reduce(
        &self,
        dims: &[&str],
        reduction: Reduction,
        evaluation: Option<Evaluation>,
    ) -> Result<Evaluated, DatasetError> {
        for name in dims {
            self.registry.resolve(name)?;
        }
        let sets = self.all();
        let dense = match density::classify(&self.tables, &sets) {
            Density::Dense(dense) => dense,
            Density::Sparse(sparse) => return Err(DatasetError::NotDense(sparse)),
        };
        let layout = NdLayout::new(&dense, &self.registry, self.sort_state);
        let labels = layout.labels();
        let sizes = layout.shape();
        // Descending, so that removing one axis leaves the others in place.
        let axes: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| dims.contains(&label.as_str()))
            .map(|(axis, _)| axis)
            .sorted_unstable_by(|a, b| b.cmp(a))
            .collect();
        let kept: Vec<usize> = (0..labels.len()).filter(|a| !axes.contains(a)).collect();
        let plan = with_n_dim(self.flat_plan(&sets), layout).then(
            kept.iter().map(|&a| sizes[a]).collect(),
            kept.iter().map(|&a| labels[a].clone()).collect(),
            move |array| {
                Ok(axes
                    .iter()
                    .fold(array, |array, &axis| reduction.apply(&array, Axis(axis))))
            },
        );
        debug!(?dims, %reduction, "planned reduction");
        self.evaluate(plan, evaluation)
    }

    fn all(&self) -> IndexSets {
        IndexSets {
            rows: (0..self.shape[0]).collect(),
            cols: (0..self.shape[1]).collect(),
        }
    }

    fn flat_plan(&self, sets: &IndexSets) -> ReadPlan {
        ReadPlan::new(
            self.store.clone(),
            self.path.clone(),
            sets.rows.clone(),
            sets.cols.clone(),
            FLAT_LABELS,
        )
    }

    fn evaluate(
        &self,
        plan: ReadPlan,
        evaluation: Option<Evaluation>,
    ) -> Result<Evaluated, DatasetError> {
        let evaluation = evaluation.unwrap_or(self.config.evaluation);
        debug!(?plan, %evaluation, "evaluating read");
        let strategy: &dyn Strategy = match evaluation {
            Evaluation::Eager => &Eager,
            Evaluation::Deferred => &self.deferred,
        };
        Ok(strategy.evaluate(plan)?)
    }
}

fn with_n_dim(plan: ReadPlan, layout: NdLayout) -> ReadPlan {
    plan.then(layout.shape(), layout.labels(), move |array| {
        let flat = array.into_dimensionality::<Ix2>()?;
        Ok(layout.to_n_dim(flat.view())?)
    })
}
