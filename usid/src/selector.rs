/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Per-dimension selectors.
//!
//! A [`Selection`] maps dimension names to a [`Selector`]: a single
//! index, a [`Range`] with an optional step, or an explicit list.
//! Dimensions that a selection does not mention keep all of their
//! values.
//!
//! Selectors are expanded against a dimension's size in one of two
//! [`IndexMode`]s. The strict mode backs the raw position/spectroscopic
//! resolution and rejects negative indices outright. The wrapping mode
//! backs N-dimensional slicing, where indices behave like Python
//! sequence indices: `-1` is the last value, and range bounds wrap and
//! clamp.
//!
//! Selectors also have a compact surface syntax (see [`FromStr`]):
//!
//! ```text
//! 3        single index
//! -2       single index, from the end (wrapping mode only)
//! :        everything
//! 1:5      range
//! 1:5:2    range with step
//! ::3      every third value
//! 1,2,4    list (brackets optional: [1,2,4])
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

/// Errors raised while interpreting selectors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectorError {
    #[error("invalid selector for {dim}: {reason}")]
    InvalidSelectorType { dim: String, reason: String },

    #[error("negative index {index} for {dim} is only supported when slicing in N-dimensional form")]
    UnsupportedNegativeIndex { dim: String, index: i64 },

    #[error("index {index} out of range for {dim} of size {size}")]
    SelectorOutOfRange { dim: String, index: i64, size: usize },
}

/// How selector indices are interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexMode {
    /// Indices must lie in `[0, size)`; negatives are rejected.
    Strict,
    /// Python-style: negative indices count from the end and range
    /// bounds are clamped.
    Wrapping,
}

/// A range of indices with an optional step, following slice
/// conventions: `start` defaults to the beginning, `stop` to the end.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub stop: Option<i64>,
    #[serde(default = "default_step")]
    pub step: i64,
}

fn default_step() -> i64 {
    1
}

impl Range {
    pub fn new(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// The full range.
    pub fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    fn expand(&self, dim: &str, size: usize, mode: IndexMode) -> Result<Vec<usize>, SelectorError> {
        if self.step == 0 {
            return Err(SelectorError::InvalidSelectorType {
                dim: dim.to_string(),
                reason: "range step must not be zero".to_string(),
            });
        }
        match mode {
            IndexMode::Strict => self.expand_strict(dim, size),
            IndexMode::Wrapping => Ok(self.expand_wrapping(size)),
        }
    }

    fn expand_strict(&self, dim: &str, size: usize) -> Result<Vec<usize>, SelectorError> {
        for value in [self.start, self.stop, Some(self.step)].into_iter().flatten() {
            if value < 0 {
                return Err(SelectorError::UnsupportedNegativeIndex {
                    dim: dim.to_string(),
                    index: value,
                });
            }
        }
        let start = self.start.unwrap_or(0);
        let stop = self.stop.unwrap_or(size as i64);
        if start < stop {
            // First value of the progression that is not below `size`.
            let (first, step, len) = (i128::from(start), i128::from(self.step), size as i128);
            let outside = if first >= len {
                first
            } else {
                first + (len - first + step - 1) / step * step
            };
            if outside < i128::from(stop) {
                return Err(SelectorError::SelectorOutOfRange {
                    dim: dim.to_string(),
                    index: outside as i64,
                    size,
                });
            }
        }
        Ok((start..stop).step_by(self.step as usize).map(|index| index as usize).collect())
    }

    fn expand_wrapping(&self, size: usize) -> Vec<usize> {
        let len = size as i64;
        // Same bound adjustment as Python's `slice.indices`.
        let adjust = |bound: i64, lower: i64, upper: i64| {
            if bound < 0 {
                (bound + len).max(lower)
            } else {
                bound.min(upper)
            }
        };
        if self.step > 0 {
            let start = self.start.map_or(0, |b| adjust(b, 0, len));
            let stop = self.stop.map_or(len, |b| adjust(b, 0, len));
            (start..stop.max(start))
                .step_by(self.step as usize)
                .map(|i| i as usize)
                .collect()
        } else {
            let start = self.start.map_or(len - 1, |b| adjust(b, -1, len - 1));
            let stop = self.stop.map_or(-1, |b| adjust(b, -1, len - 1));
            let step = self.step.unsigned_abs() as usize;
            let mut values: Vec<usize> = ((stop + 1)..=start)
                .rev()
                .step_by(step)
                .map(|i| i as usize)
                .collect();
            values.reverse();
            values
        }
    }
}

impl From<std::ops::Range<i64>> for Range {
    fn from(range: std::ops::Range<i64>) -> Self {
        Range::new(range.start, range.end)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        write!(f, ":")?;
        if let Some(stop) = self.stop {
            write!(f, "{}", stop)?;
        }
        if self.step != 1 {
            write!(f, ":{}", self.step)?;
        }
        Ok(())
    }
}

/// Selects values along one dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Every value.
    All,
    /// A single value. The dimension is dropped from N-dimensional
    /// results.
    Index(i64),
    Range(Range),
    List(Vec<i64>),
}

impl Selector {
    /// True if this selector pins the dimension to a single value.
    pub fn is_reducing(&self) -> bool {
        matches!(self, Selector::Index(_))
    }

    /// Expands the selector into the sorted, de-duplicated set of
    /// indices it selects from a dimension of the given size. `None`
    /// means every index.
    pub fn expand(
        &self,
        dim: &str,
        size: usize,
        mode: IndexMode,
    ) -> Result<Option<Vec<usize>>, SelectorError> {
        let mut values = match self {
            Selector::All => return Ok(None),
            Selector::Index(index) => vec![normalize(dim, *index, size, mode)?],
            Selector::Range(range) => range.expand(dim, size, mode)?,
            Selector::List(list) => list
                .iter()
                .map(|&index| normalize(dim, index, size, mode))
                .collect::<Result<_, _>>()?,
        };
        values.sort_unstable();
        values.dedup();
        Ok(Some(values))
    }

    /// Interprets a JSON value as a selector for `dim`.
    ///
    /// Integers, arrays of integers, `null`, `{start, stop, step}`
    /// objects and selector strings are accepted.
    pub fn from_json(dim: &str, value: &serde_json::Value) -> Result<Self, SelectorError> {
        use serde_json::Value;

        let invalid = |reason: String| SelectorError::InvalidSelectorType {
            dim: dim.to_string(),
            reason,
        };
        let integer = |value: &Value| {
            value
                .as_i64()
                .ok_or_else(|| invalid(format!("expected an integer, got {}", value)))
        };
        match value {
            Value::Null => Ok(Selector::All),
            Value::Number(_) => integer(value).map(Selector::Index),
            Value::Array(items) => items
                .iter()
                .map(integer)
                .collect::<Result<_, _>>()
                .map(Selector::List),
            Value::String(text) => text
                .parse()
                .map_err(|_| invalid(format!("cannot parse {:?} as a selector", text))),
            Value::Object(fields) => {
                if let Some(key) = fields
                    .keys()
                    .find(|k| !matches!(k.as_str(), "start" | "stop" | "step"))
                {
                    return Err(invalid(format!("unexpected range field {:?}", key)));
                }
                let bound = |key: &str| match fields.get(key) {
                    None | Some(Value::Null) => Ok(None),
                    Some(value) => integer(value).map(Some),
                };
                Ok(Selector::Range(Range {
                    start: bound("start")?,
                    stop: bound("stop")?,
                    step: bound("step")?.unwrap_or(1),
                }))
            }
            Value::Bool(_) => Err(invalid(format!("expected an integer, got {}", value))),
        }
    }
}

fn check_bounds(dim: &str, index: i64, size: usize) -> Result<usize, SelectorError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < size)
        .ok_or_else(|| SelectorError::SelectorOutOfRange {
            dim: dim.to_string(),
            index,
            size,
        })
}

fn normalize(dim: &str, index: i64, size: usize, mode: IndexMode) -> Result<usize, SelectorError> {
    match mode {
        IndexMode::Strict if index < 0 => Err(SelectorError::UnsupportedNegativeIndex {
            dim: dim.to_string(),
            index,
        }),
        IndexMode::Wrapping if index < 0 => match check_bounds(dim, index + size as i64, size) {
            Ok(index) => Ok(index),
            Err(_) => Err(SelectorError::SelectorOutOfRange {
                dim: dim.to_string(),
                index,
                size,
            }),
        },
        _ => check_bounds(dim, index, size),
    }
}

/// Parse errors for the selector surface syntax.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid selector syntax: {0:?}")]
pub struct ParseSelectorError(String);

impl FromStr for Selector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSelectorError(s.to_string());
        let text = s.trim();
        let int = |part: &str| part.trim().parse::<i64>().map_err(|_| err());
        let bound = |part: &str| {
            if part.trim().is_empty() {
                Ok(None)
            } else {
                int(part).map(Some)
            }
        };

        if text.is_empty() {
            return Err(err());
        }
        if text.contains(':') {
            let parts: Vec<&str> = text.split(':').collect();
            if parts.len() > 3 {
                return Err(err());
            }
            let range = Range {
                start: bound(parts[0])?,
                stop: bound(parts[1])?,
                step: match parts.get(2) {
                    Some(part) => bound(part)?.unwrap_or(1),
                    None => 1,
                },
            };
            return Ok(if range == Range::full() {
                Selector::All
            } else {
                Selector::Range(range)
            });
        }
        let inner = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'));
        if inner.is_some() || text.contains(',') {
            let inner = inner.unwrap_or(text);
            return inner
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(int)
                .collect::<Result<_, _>>()
                .map(Selector::List);
        }
        int(text).map(Selector::Index)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, ":"),
            Selector::Index(index) => write!(f, "{}", index),
            Selector::Range(range) => write!(f, "{}", range),
            Selector::List(list) => write!(f, "[{}]", list.iter().join(",")),
        }
    }
}

impl From<i64> for Selector {
    fn from(index: i64) -> Self {
        Selector::Index(index)
    }
}

impl From<Range> for Selector {
    fn from(range: Range) -> Self {
        Selector::Range(range)
    }
}

impl From<std::ops::Range<i64>> for Selector {
    fn from(range: std::ops::Range<i64>) -> Self {
        Selector::Range(range.into())
    }
}

impl From<std::ops::RangeFull> for Selector {
    fn from(_: std::ops::RangeFull) -> Self {
        Selector::All
    }
}

impl From<Vec<i64>> for Selector {
    fn from(list: Vec<i64>) -> Self {
        Selector::List(list)
    }
}

impl<const N: usize> From<[i64; N]> for Selector {
    fn from(list: [i64; N]) -> Self {
        Selector::List(list.to_vec())
    }
}

/// Selectors keyed by dimension name, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(IndexMap<String, Selector>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a selector, replacing any previous one for `dim`.
    pub fn with(mut self, dim: impl Into<String>, selector: impl Into<Selector>) -> Self {
        self.insert(dim, selector);
        self
    }

    pub fn insert(&mut self, dim: impl Into<String>, selector: impl Into<Selector>) {
        self.0.insert(dim.into(), selector.into());
    }

    pub fn get(&self, dim: &str) -> Option<&Selector> {
        self.0.get(dim)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selector)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Interprets a JSON object of dimension name → selector. `null`
    /// is the empty selection.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, SelectorError> {
        match value {
            serde_json::Value::Null => Ok(Self::new()),
            serde_json::Value::Object(fields) => fields
                .iter()
                .map(|(dim, value)| Ok((dim.clone(), Selector::from_json(dim, value)?)))
                .collect::<Result<IndexMap<_, _>, _>>()
                .map(Selection),
            other => Err(SelectorError::InvalidSelectorType {
                dim: String::new(),
                reason: format!("expected an object of selectors, got {}", other),
            }),
        }
    }
}

impl<K: Into<String>, S: Into<Selector>> FromIterator<(K, S)> for Selection {
    fn from_iter<I: IntoIterator<Item = (K, S)>>(iter: I) -> Self {
        Selection(
            iter.into_iter()
                .map(|(k, s)| (k.into(), s.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter().map(|(k, s)| format!("{}={}", k, s)).join(", ")
        )
    }
}
