/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The backing store consumed by dataset views.
//!
//! A [`Store`] is a read-only collection of named 2-D arrays, each
//! carrying a small set of attributes. Views never open, close or
//! write a store; they only read arrays that the caller keeps alive
//! behind an `Arc`.
//!
//! [`MemoryStore`] is the bundled implementation. It holds every
//! array in memory and round-trips through JSON, which makes it
//! suitable both for tests and for the command line tool.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use ndarray::Array;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::Dimension;
use serde::Deserialize;
use serde::Serialize;

/// Errors raised by [`Store`] implementations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("no such array: {0}")]
    NotFound(String),

    #[error("array {path} does not hold {expected} data")]
    WrongType { path: String, expected: &'static str },

    #[error("index {index} out of bounds for axis {axis} of {path} (length {len})")]
    OutOfBounds {
        path: String,
        axis: usize,
        index: usize,
        len: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    TextList(Vec<String>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            AttrValue::TextList(values) => Some(values),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<usize> for AttrValue {
    fn from(value: usize) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl<S: Into<String>> From<Vec<S>> for AttrValue {
    fn from(values: Vec<S>) -> Self {
        AttrValue::TextList(values.into_iter().map(Into::into).collect())
    }
}

/// Element type of a stored array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Int,
    Float,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Int => write!(f, "integer"),
            DType::Float => write!(f, "float"),
        }
    }
}

/// Attributes attached to an array.
pub type Attrs = BTreeMap<String, AttrValue>;

/// Read-only access to a collection of named 2-D arrays.
///
/// Implementations must be safe to share between threads: deferred
/// evaluation reads disjoint blocks of the same array concurrently.
pub trait Store: Send + Sync + fmt::Debug {
    /// The `(rows, cols)` shape of the array at `path`.
    fn shape(&self, path: &str) -> Result<[usize; 2], StoreError>;

    /// Element type of the array at `path`.
    fn dtype(&self, path: &str) -> Result<DType, StoreError>;

    /// All attributes of the array at `path`.
    fn attrs(&self, path: &str) -> Result<Attrs, StoreError>;

    /// Reads a whole integer array.
    fn read_int(&self, path: &str) -> Result<Array2<i64>, StoreError>;

    /// Reads a whole array as floats. Integer arrays are widened.
    fn read_float(&self, path: &str) -> Result<Array2<f64>, StoreError>;

    /// Reads the sub-block made of the given rows and columns, in the
    /// order they are given. The block is in standard (row-major) layout.
    fn read_block(
        &self,
        path: &str,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<Array2<f64>, StoreError>;
}

/// Array payload held by a [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "array", rename_all = "snake_case")]
pub enum ArrayData {
    Int(Array2<i64>),
    Float(Array2<f64>),
}

impl ArrayData {
    fn shape(&self) -> [usize; 2] {
        let dim = match self {
            ArrayData::Int(array) => array.dim(),
            ArrayData::Float(array) => array.dim(),
        };
        [dim.0, dim.1]
    }

    fn dtype(&self) -> DType {
        match self {
            ArrayData::Int(_) => DType::Int,
            ArrayData::Float(_) => DType::Float,
        }
    }

    fn to_float(&self) -> Array2<f64> {
        match self {
            ArrayData::Int(array) => array.mapv(|v| v as f64),
            ArrayData::Float(array) => array.clone(),
        }
    }
}

impl From<Array2<i64>> for ArrayData {
    fn from(array: Array2<i64>) -> Self {
        ArrayData::Int(array)
    }
}

impl From<Array2<f64>> for ArrayData {
    fn from(array: Array2<f64>) -> Self {
        ArrayData::Float(array)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Entry {
    data: ArrayData,
    #[serde(default)]
    attrs: Attrs,
}

/// An in-memory [`Store`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    arrays: BTreeMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an array together with its attributes.
    pub fn insert<D, I, K, V>(&mut self, path: &str, data: D, attrs: I) -> &mut Self
    where
        D: Into<ArrayData>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttrValue>,
    {
        let attrs = attrs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.arrays.insert(
            path.to_string(),
            Entry {
                data: data.into(),
                attrs,
            },
        );
        self
    }

    /// Sets a single attribute on an existing array.
    pub fn set_attr(
        &mut self,
        path: &str,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), StoreError> {
        let entry = self
            .arrays
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        entry.attrs.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, StoreError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::from_json_reader(BufReader::new(file))
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> Result<(), StoreError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    fn entry(&self, path: &str) -> Result<&Entry, StoreError> {
        self.arrays
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

fn check_bounds(path: &str, axis: usize, indices: &[usize], len: usize) -> Result<(), StoreError> {
    match indices.iter().find(|&&index| index >= len) {
        Some(&index) => Err(StoreError::OutOfBounds {
            path: path.to_string(),
            axis,
            index,
            len,
        }),
        None => Ok(()),
    }
}

/// Returns `array` in standard layout, copying only when it is not.
pub(crate) fn into_standard_layout<A: Clone, D: Dimension>(array: Array<A, D>) -> Array<A, D> {
    if array.is_standard_layout() {
        array
    } else {
        array.as_standard_layout().into_owned()
    }
}

impl Store for MemoryStore {
    fn shape(&self, path: &str) -> Result<[usize; 2], StoreError> {
        Ok(self.entry(path)?.data.shape())
    }

    fn dtype(&self, path: &str) -> Result<DType, StoreError> {
        Ok(self.entry(path)?.data.dtype())
    }

    fn attrs(&self, path: &str) -> Result<Attrs, StoreError> {
        Ok(self.entry(path)?.attrs.clone())
    }

    fn read_int(&self, path: &str) -> Result<Array2<i64>, StoreError> {
        match &self.entry(path)?.data {
            ArrayData::Int(array) => Ok(array.clone()),
            ArrayData::Float(_) => Err(StoreError::WrongType {
                path: path.to_string(),
                expected: "integer",
            }),
        }
    }

    fn read_float(&self, path: &str) -> Result<Array2<f64>, StoreError> {
        Ok(self.entry(path)?.data.to_float())
    }

    fn read_block(
        &self,
        path: &str,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<Array2<f64>, StoreError> {
        let entry = self.entry(path)?;
        let [n_rows, n_cols] = entry.data.shape();
        check_bounds(path, 0, rows, n_rows)?;
        check_bounds(path, 1, cols, n_cols)?;
        let block = match &entry.data {
            ArrayData::Int(array) => array
                .select(Axis(0), rows)
                .select(Axis(1), cols)
                .mapv(|v| v as f64),
            ArrayData::Float(array) => array.select(Axis(0), rows).select(Axis(1), cols),
        };
        Ok(into_standard_layout(block))
    }
}
