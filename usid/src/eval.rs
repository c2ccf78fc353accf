/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Evaluation strategies.
//!
//! Every read goes through a [`ReadPlan`]: the store block to read
//! plus a pipeline of array transforms (reshaping, reductions) to apply
//! to it. A [`Strategy`] decides when the plan runs:
//!
//! - [`Eager`] reads the block and applies the pipeline immediately;
//! - [`Deferred`] returns a [`LazyArray`] that records the plan and
//!   its resulting shape, and touches the store only when
//!   [`LazyArray::compute`] is called. The read is then split into
//!   row chunks fetched in parallel on a rayon pool. The pool belongs
//!   to the strategy and is shared by every array it defers; without
//!   a thread count, rayon's global pool is used.
//!
//! Both produce identical arrays for the same plan.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use ndarray::ArrayD;
use ndarray::Axis;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::reshape::ReshapeError;
use crate::store::Store;
use crate::store::StoreError;
use crate::store::into_standard_layout;

/// Which [`Strategy`] a read uses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    #[default]
    Eager,
    Deferred,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Eager => write!(f, "eager"),
            Evaluation::Deferred => write!(f, "deferred"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown evaluation {0:?}, expected \"eager\" or \"deferred\"")]
pub struct ParseEvaluationError(String);

impl FromStr for Evaluation {
    type Err = ParseEvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(Evaluation::Eager),
            "deferred" | "lazy" => Ok(Evaluation::Deferred),
            _ => Err(ParseEvaluationError(s.to_string())),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum EvalError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reshape(#[from] ReshapeError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("evaluated shape {actual:?} differs from planned shape {expected:?}")]
    PlannedShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// One step of a read pipeline.
pub type Transform = Arc<dyn Fn(ArrayD<f64>) -> Result<ArrayD<f64>, EvalError> + Send + Sync>;

/// A block read from a 2-D store array plus the transforms to apply
/// to it. The planned shape and labels describe the final output.
#[derive(Clone)]
pub struct ReadPlan {
    store: Arc<dyn Store>,
    path: String,
    rows: Vec<usize>,
    cols: Vec<usize>,
    shape: Vec<usize>,
    labels: Vec<String>,
    transforms: Vec<Transform>,
}

impl fmt::Debug for ReadPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadPlan")
            .field("path", &self.path)
            .field("rows", &self.rows.len())
            .field("cols", &self.cols.len())
            .field("shape", &self.shape)
            .field("labels", &self.labels)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl ReadPlan {
    /// Reads the `rows` × `cols` block of `path`, labelling its two
    /// axes with `labels`.
    pub fn new(
        store: Arc<dyn Store>,
        path: impl Into<String>,
        rows: Vec<usize>,
        cols: Vec<usize>,
        labels: [&str; 2],
    ) -> Self {
        Self {
            shape: vec![rows.len(), cols.len()],
            labels: labels.iter().map(|l| l.to_string()).collect(),
            store,
            path: path.into(),
            rows,
            cols,
            transforms: Vec::new(),
        }
    }

    /// Appends a transform producing an array of `shape`, with axes
    /// labelled `labels`.
    pub fn then<F>(mut self, shape: Vec<usize>, labels: Vec<String>, transform: F) -> Self
    where
        F: Fn(ArrayD<f64>) -> Result<ArrayD<f64>, EvalError> + Send + Sync + 'static,
    {
        self.shape = shape;
        self.labels = labels;
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn read(&self, rows: &[usize]) -> Result<Array2<f64>, StoreError> {
        self.store.read_block(&self.path, rows, &self.cols)
    }

    fn finish(&self, block: Array2<f64>) -> Result<ArrayD<f64>, EvalError> {
        let mut array = into_standard_layout(block).into_dyn();
        for transform in &self.transforms {
            array = transform(array)?;
        }
        if array.shape() != self.shape.as_slice() {
            return Err(EvalError::PlannedShape {
                expected: self.shape.clone(),
                actual: array.shape().to_vec(),
            });
        }
        Ok(array)
    }
}

/// Runs a [`ReadPlan`].
pub trait Strategy: Send + Sync {
    fn evaluation(&self) -> Evaluation;

    fn evaluate(&self, plan: ReadPlan) -> Result<Evaluated, EvalError>;
}

/// Reads and transforms immediately.
#[derive(Copy, Clone, Debug, Default)]
pub struct Eager;

impl Strategy for Eager {
    fn evaluation(&self) -> Evaluation {
        Evaluation::Eager
    }

    fn evaluate(&self, plan: ReadPlan) -> Result<Evaluated, EvalError> {
        let block = plan.read(&plan.rows)?;
        let array = plan.finish(block)?;
        Ok(Evaluated {
            labels: plan.labels,
            data: Data::Materialized(array),
        })
    }
}

/// Defers the read until [`LazyArray::compute`].
#[derive(Clone, Debug)]
pub struct Deferred {
    chunk_rows: usize,
    /// `None` runs on rayon's global pool.
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Deferred {
    /// Splits reads into chunks of `chunk_rows` rows (at least 1),
    /// fetched on a dedicated pool of `num_threads` workers, or on the
    /// global pool when `num_threads` is 0.
    pub fn new(chunk_rows: usize, num_threads: usize) -> Result<Self, EvalError> {
        let pool = match num_threads {
            0 => None,
            n => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("usid-read-{i}"))
                    .build()?,
            )),
        };
        Ok(Self {
            chunk_rows: chunk_rows.max(1),
            pool,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, EvalError> {
        Self::new(config.chunk_rows, config.num_threads)
    }

    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }

    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |pool| pool.current_num_threads())
    }
}

impl Strategy for Deferred {
    fn evaluation(&self) -> Evaluation {
        Evaluation::Deferred
    }

    fn evaluate(&self, plan: ReadPlan) -> Result<Evaluated, EvalError> {
        Ok(Evaluated {
            labels: plan.labels.clone(),
            data: Data::Deferred(LazyArray {
                plan,
                chunk_rows: self.chunk_rows,
                pool: self.pool.clone(),
            }),
        })
    }
}

/// A read whose store access has not happened yet.
#[derive(Clone, Debug)]
pub struct LazyArray {
    plan: ReadPlan,
    chunk_rows: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl LazyArray {
    pub fn shape(&self) -> &[usize] {
        self.plan.shape()
    }

    /// Number of row chunks the read is split into.
    pub fn num_chunks(&self) -> usize {
        self.plan.rows.len().div_ceil(self.chunk_rows)
    }

    /// Reads the block and applies the pending transforms.
    pub fn compute(&self) -> Result<ArrayD<f64>, EvalError> {
        let chunks: Vec<&[usize]> = self.plan.rows.chunks(self.chunk_rows).collect();
        debug!(
            path = %self.plan.path,
            chunks = chunks.len(),
            dedicated_pool = self.pool.is_some(),
            "computing deferred read"
        );
        let read = || {
            chunks
                .par_iter()
                .map(|rows| self.plan.read(rows))
                .collect::<Result<Vec<_>, _>>()
        };
        let blocks = match &self.pool {
            Some(pool) => pool.install(read),
            None => read(),
        }?;
        let block = if blocks.is_empty() {
            Array2::zeros((0, self.plan.cols.len()))
        } else {
            let views: Vec<_> = blocks.iter().map(|block| block.view()).collect();
            ndarray::concatenate(Axis(0), &views)?
        };
        self.plan.finish(block)
    }
}

#[derive(Clone, Debug)]
enum Data {
    Materialized(ArrayD<f64>),
    Deferred(LazyArray),
}

/// The result of a read: an array, or a pending computation of one,
/// with its axis labels.
#[derive(Clone, Debug)]
pub struct Evaluated {
    labels: Vec<String>,
    data: Data,
}

impl Evaluated {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn shape(&self) -> &[usize] {
        match &self.data {
            Data::Materialized(array) => array.shape(),
            Data::Deferred(lazy) => lazy.shape(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.data, Data::Deferred(_))
    }

    /// The array, if already materialized.
    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match &self.data {
            Data::Materialized(array) => Some(array),
            Data::Deferred(_) => None,
        }
    }

    /// The pending computation, if deferred.
    pub fn as_lazy(&self) -> Option<&LazyArray> {
        match &self.data {
            Data::Materialized(_) => None,
            Data::Deferred(lazy) => Some(lazy),
        }
    }

    /// The array, computing it if deferred.
    pub fn compute(self) -> Result<ArrayD<f64>, EvalError> {
        match self.data {
            Data::Materialized(array) => Ok(array),
            Data::Deferred(lazy) => lazy.compute(),
        }
    }
}
