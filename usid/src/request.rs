/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Dynamic requests.
//!
//! Requests arrive as JSON objects tagged by `op`:
//!
//! ```text
//! {"op": "info"}
//! {"op": "labels", "sorted": true}
//! {"op": "values", "axis": "position", "name": "X"}
//! {"op": "slice", "select": {"X": 3, "Bias": "1:5"}, "ndim": true, "lazy": false}
//! {"op": "n_dim"}
//! {"op": "reduce", "dims": ["Bias"], "reduction": "mean"}
//! {"op": "toggle_sorting"}
//! ```
//!
//! Selector and name arguments are kept as raw JSON until they are
//! interpreted, so that values of the wrong kind surface as typed
//! dataset errors rather than as parse failures.

use ndarray::ArrayD;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::dataset::DatasetError;
use crate::dataset::ErrorKind;
use crate::dataset::Form;
use crate::dataset::Reduction;
use crate::dataset::UsiDataset;
use crate::dims::AxisGroup;
use crate::eval::Evaluated;
use crate::eval::Evaluation;
use crate::selector::Selection;
use crate::sort::SortState;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Info,
    Labels {
        #[serde(default)]
        sorted: bool,
    },
    Values {
        axis: AxisGroup,
        name: Value,
    },
    Slice {
        #[serde(default)]
        select: Value,
        #[serde(default)]
        ndim: bool,
        #[serde(default)]
        lazy: Option<bool>,
    },
    NDim {
        #[serde(default)]
        lazy: Option<bool>,
    },
    Reduce {
        dims: Vec<String>,
        reduction: Reduction,
        #[serde(default)]
        lazy: Option<bool>,
    },
    ToggleSorting,
}

impl Request {
    pub fn from_json(value: Value) -> Result<Self, RequestError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Malformed(_) => ErrorKind::Type,
            RequestError::Dataset(err) => err.kind(),
        }
    }
}

/// Summary of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Info {
    pub path: String,
    pub shape: [usize; 2],
    pub quantity: String,
    pub units: String,
    pub data_descriptor: String,
    pub pos_dim_labels: Vec<String>,
    pub pos_dim_sizes: Vec<usize>,
    pub pos_dim_descriptors: Vec<String>,
    pub spec_dim_labels: Vec<String>,
    pub spec_dim_sizes: Vec<usize>,
    pub spec_dim_descriptors: Vec<String>,
    pub n_dim_labels: Vec<String>,
    pub n_dim_sizes: Vec<usize>,
    pub sorting: String,
}

impl Info {
    pub fn new(dataset: &UsiDataset) -> Self {
        let owned = |labels: Vec<&str>| labels.into_iter().map(str::to_string).collect();
        Self {
            path: dataset.path().to_string(),
            shape: dataset.shape(),
            quantity: dataset.quantity().to_string(),
            units: dataset.units().to_string(),
            data_descriptor: dataset.data_descriptor(),
            pos_dim_labels: owned(dataset.pos_dim_labels()),
            pos_dim_sizes: dataset.pos_dim_sizes(),
            pos_dim_descriptors: dataset.pos_dim_descriptors(),
            spec_dim_labels: owned(dataset.spec_dim_labels()),
            spec_dim_sizes: dataset.spec_dim_sizes(),
            spec_dim_descriptors: dataset.spec_dim_descriptors(),
            n_dim_labels: owned(dataset.n_dim_labels()),
            n_dim_sizes: dataset.n_dim_sizes(),
            sorting: dataset.current_sorting(),
        }
    }
}

/// A computed array with its axis labels.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArrayResponse {
    pub labels: Vec<String>,
    pub shape: Vec<usize>,
    pub success: bool,
    /// Whether the read was deferred before being computed for the
    /// response.
    pub deferred: bool,
    pub array: ArrayD<f64>,
}

impl ArrayResponse {
    fn compute(evaluated: Evaluated, success: bool) -> Result<Self, DatasetError> {
        let labels = evaluated.labels().to_vec();
        let deferred = evaluated.is_deferred();
        let array = evaluated.compute()?;
        Ok(Self {
            labels,
            shape: array.shape().to_vec(),
            success,
            deferred,
            array,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Info(Info),
    Labels {
        state: SortState,
        labels: Vec<String>,
    },
    Values {
        name: String,
        values: Vec<f64>,
    },
    Array(ArrayResponse),
    Sorting {
        state: SortState,
        description: String,
    },
}

fn evaluation(lazy: Option<bool>) -> Option<Evaluation> {
    lazy.map(|lazy| {
        if lazy {
            Evaluation::Deferred
        } else {
            Evaluation::Eager
        }
    })
}

/// Runs `request` against `dataset`.
pub fn handle(dataset: &mut UsiDataset, request: &Request) -> Result<Response, DatasetError> {
    debug!(?request, "handling request");
    match request {
        Request::Info => Ok(Response::Info(Info::new(dataset))),
        Request::Labels { sorted } => {
            let state = if *sorted {
                SortState::FastestFirst
            } else {
                SortState::FileOrder
            };
            Ok(Response::Labels {
                state,
                labels: dataset
                    .registry()
                    .n_dim_labels(state)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
        }
        Request::Values { axis, name } => {
            let Value::String(name) = name else {
                return Err(DatasetError::InvalidNameType(name.to_string()));
            };
            let values = match axis {
                AxisGroup::Position => dataset.get_pos_values(name)?,
                AxisGroup::Spectroscopic => dataset.get_spec_values(name)?,
            };
            Ok(Response::Values {
                name: name.clone(),
                values: values.to_vec(),
            })
        }
        Request::Slice { select, ndim, lazy } => {
            let selection = Selection::from_json(select)?;
            let form = if *ndim { Form::NDim } else { Form::Flat };
            let (evaluated, success) = dataset.slice(&selection, form, evaluation(*lazy))?;
            Ok(Response::Array(ArrayResponse::compute(evaluated, success)?))
        }
        Request::NDim { lazy } => {
            let (evaluated, success) = dataset.get_n_dim_form(evaluation(*lazy))?;
            Ok(Response::Array(ArrayResponse::compute(evaluated, success)?))
        }
        Request::Reduce {
            dims,
            reduction,
            lazy,
        } => {
            let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
            let evaluated = dataset.reduce(&dims, *reduction, evaluation(*lazy))?;
            Ok(Response::Array(ArrayResponse::compute(evaluated, true)?))
        }
        Request::ToggleSorting => {
            dataset.toggle_sorting();
            Ok(Response::Sorting {
                state: dataset.sort_state(),
                description: dataset.current_sorting(),
            })
        }
    }
}

/// Parses and runs one JSON request, reporting failures as a JSON
/// object with `error` and `error_kind` fields. Successful responses
/// carry their type in `kind`.
pub fn respond(dataset: &mut UsiDataset, request: Value) -> Value {
    let result = Request::from_json(request)
        .and_then(|request| Ok(handle(dataset, &request)?))
        .and_then(|response| Ok(serde_json::to_value(response)?));
    match result {
        Ok(value) => value,
        Err(err) => serde_json::json!({
            "error": err.to_string(),
            "error_kind": err.kind(),
        }),
    }
}
