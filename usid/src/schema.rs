/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Layout of a main dataset and its ancillary tables in a [`Store`].
//!
//! A main array of shape `(P, S)` names four ancillary arrays through
//! text attributes:
//!
//! ```text
//! main            (P, S)   quantity, units,
//!                          Position_Indices, Position_Values,
//!                          Spectroscopic_Indices, Spectroscopic_Values
//! position inds   (P, Dp)  labels, units, <name> = column
//! position vals   (P, Dp)
//! spec inds       (Ds, S)  labels, units, <name> = row
//! spec vals       (Ds, S)
//! ```
//!
//! Everything here runs once, when a view is constructed, and any
//! inconsistency is reported as a [`SchemaError`].

use ndarray::Array2;

use crate::dims::AxisGroup;
use crate::store::Attrs;
use crate::store::DType;
use crate::store::Store;
use crate::store::StoreError;

pub const QUANTITY: &str = "quantity";
pub const UNITS: &str = "units";
pub const LABELS: &str = "labels";
pub const POSITION_INDICES: &str = "Position_Indices";
pub const POSITION_VALUES: &str = "Position_Values";
pub const SPECTROSCOPIC_INDICES: &str = "Spectroscopic_Indices";
pub const SPECTROSCOPIC_VALUES: &str = "Spectroscopic_Values";

/// Structural problems found while constructing a view. These are
/// fatal: a view is never created over an inconsistent store.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("{path} is missing attribute {attr}")]
    MissingAttribute { path: String, attr: String },

    #[error("attribute {attr} of {path} is not {expected}")]
    AttributeType {
        path: String,
        attr: String,
        expected: &'static str,
    },

    #[error("{path} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        path: String,
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("{path} declares {labels} labels for {dims} dimensions")]
    LabelCount {
        path: String,
        labels: usize,
        dims: usize,
    },

    #[error("dimension {0} is declared more than once")]
    DuplicateDimension(String),

    #[error("dimension {name} of {path} maps to offset {offset}, which is out of range or shared")]
    BadOffset {
        path: String,
        name: String,
        offset: i64,
    },

    #[error("{path} holds negative index {value} for dimension {name}")]
    NegativeIndex {
        path: String,
        name: String,
        value: i64,
    },

    #[error("main array {path} holds {dtype} data, expected float")]
    MainType { path: String, dtype: DType },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The ancillary tables of one axis group, loaded and validated.
#[derive(Clone, Debug)]
pub struct GroupTables {
    pub group: AxisGroup,
    pub labels: Vec<String>,
    /// Column (position) or row (spectroscopic) of each label.
    pub offsets: Vec<usize>,
    pub units: Vec<Option<String>>,
    pub indices: Array2<i64>,
    pub values: Array2<f64>,
}

impl GroupTables {
    /// Number of store entries (rows for position, columns for
    /// spectroscopic) enumerated by these tables.
    pub fn len(&self) -> usize {
        self.indices.len_of(self.group.store_axis())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dimensions in the group.
    pub fn num_dims(&self) -> usize {
        self.indices.len_of(self.group.lane_axis())
    }
}

pub(crate) fn text_attr(attrs: &Attrs, path: &str, attr: &str) -> Result<String, SchemaError> {
    let value = attrs.get(attr).ok_or_else(|| SchemaError::MissingAttribute {
        path: path.to_string(),
        attr: attr.to_string(),
    })?;
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| SchemaError::AttributeType {
            path: path.to_string(),
            attr: attr.to_string(),
            expected: "text",
        })
}

/// Loads the index and value tables of `group` for the main array at
/// `main_path`, whose shape is `main_shape`.
pub fn load_group(
    store: &dyn Store,
    main_path: &str,
    main_attrs: &Attrs,
    main_shape: [usize; 2],
    group: AxisGroup,
) -> Result<GroupTables, SchemaError> {
    let dtype = store.dtype(main_path)?;
    if dtype != DType::Float {
        return Err(SchemaError::MainType {
            path: main_path.to_string(),
            dtype,
        });
    }
    let (inds_attr, vals_attr) = match group {
        AxisGroup::Position => (POSITION_INDICES, POSITION_VALUES),
        AxisGroup::Spectroscopic => (SPECTROSCOPIC_INDICES, SPECTROSCOPIC_VALUES),
    };
    let inds_path = text_attr(main_attrs, main_path, inds_attr)?;
    let vals_path = text_attr(main_attrs, main_path, vals_attr)?;

    let indices = store.read_int(&inds_path)?;
    let entry_axis = group.store_axis();
    let lane_axis = group.lane_axis();
    let entries = main_shape[entry_axis.index()];
    if indices.len_of(entry_axis) != entries {
        let mut expected = [0; 2];
        expected[entry_axis.index()] = entries;
        expected[lane_axis.index()] = indices.len_of(lane_axis);
        return Err(SchemaError::ShapeMismatch {
            path: inds_path,
            expected,
            actual: [indices.nrows(), indices.ncols()],
        });
    }

    let values = store.read_float(&vals_path)?;
    if values.dim() != indices.dim() {
        return Err(SchemaError::ShapeMismatch {
            path: vals_path,
            expected: [indices.nrows(), indices.ncols()],
            actual: [values.nrows(), values.ncols()],
        });
    }

    let attrs = store.attrs(&inds_path)?;
    let num_dims = indices.len_of(lane_axis);
    let labels = match attrs.get(LABELS) {
        Some(value) => value
            .as_text_list()
            .ok_or_else(|| SchemaError::AttributeType {
                path: inds_path.clone(),
                attr: LABELS.to_string(),
                expected: "a list of text",
            })?
            .to_vec(),
        None => {
            return Err(SchemaError::MissingAttribute {
                path: inds_path,
                attr: LABELS.to_string(),
            });
        }
    };
    if labels.len() != num_dims {
        return Err(SchemaError::LabelCount {
            path: inds_path,
            labels: labels.len(),
            dims: num_dims,
        });
    }

    let mut offsets = Vec::with_capacity(num_dims);
    for (ordinal, name) in labels.iter().enumerate() {
        let offset = match attrs.get(name).and_then(|v| v.as_int()) {
            Some(offset) => offset,
            None => ordinal as i64,
        };
        let valid = usize::try_from(offset)
            .ok()
            .filter(|&o| o < num_dims && !offsets.contains(&o));
        match valid {
            Some(offset) => offsets.push(offset),
            None => {
                return Err(SchemaError::BadOffset {
                    path: inds_path,
                    name: name.clone(),
                    offset,
                });
            }
        }
    }

    for (name, &offset) in labels.iter().zip(&offsets) {
        let lane = indices.index_axis(lane_axis, offset);
        if let Some(&value) = lane.iter().find(|&&v| v < 0) {
            return Err(SchemaError::NegativeIndex {
                path: inds_path,
                name: name.clone(),
                value,
            });
        }
    }

    let units = match attrs.get(UNITS).and_then(|v| v.as_text_list()) {
        Some(units) if units.len() == num_dims => units.iter().cloned().map(Some).collect(),
        _ => vec![None; num_dims],
    };

    Ok(GroupTables {
        group,
        labels,
        offsets,
        units,
        indices,
        values,
    })
}

/// Size of each dimension (in label order): one more than the largest
/// index it takes.
pub(crate) fn dimension_sizes(tables: &GroupTables) -> Vec<usize> {
    tables
        .offsets
        .iter()
        .map(|&offset| lane(tables, offset).iter().max().map_or(0, |&max| max as usize + 1))
        .collect()
}

/// The index lane (column for position, row for spectroscopic) of the
/// dimension stored at `offset`.
pub(crate) fn lane(tables: &GroupTables, offset: usize) -> ndarray::ArrayView1<'_, i64> {
    tables.indices.index_axis(tables.group.lane_axis(), offset)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::store::AttrValue;
    use crate::store::MemoryStore;
    use crate::testing;
    use crate::testing::Layout;

    fn load(store: &MemoryStore, group: AxisGroup) -> Result<GroupTables, SchemaError> {
        let attrs = store.attrs(testing::MAIN).unwrap();
        let shape = store.shape(testing::MAIN).unwrap();
        load_group(store, testing::MAIN, &attrs, shape, group)
    }

    #[test]
    fn test_load_standard_groups() {
        let store = testing::beps_store(Layout::Standard);
        let pos = load(&store, AxisGroup::Position).unwrap();
        assert_eq!(pos.labels, vec!["X", "Y"]);
        assert_eq!(pos.offsets, vec![0, 1]);
        assert_eq!(pos.units, vec![Some("um".to_string()), Some("um".to_string())]);
        assert_eq!((pos.len(), pos.num_dims()), (15, 2));
        assert_eq!(dimension_sizes(&pos), vec![5, 3]);

        let spec = load(&store, AxisGroup::Spectroscopic).unwrap();
        assert_eq!((spec.len(), spec.num_dims()), (14, 2));
        assert_eq!(dimension_sizes(&spec), vec![7, 2]);
        assert_eq!(lane(&spec, 1).to_vec()[..8], [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_main_must_hold_floats() {
        let mut store = testing::beps_store(Layout::Standard);
        let attrs = store.attrs(testing::MAIN).unwrap();
        store.insert(testing::MAIN, Array2::<i64>::zeros((15, 14)), attrs);
        for group in AxisGroup::ALL {
            let err = load(&store, group).unwrap_err();
            assert!(matches!(
                err,
                SchemaError::MainType {
                    dtype: DType::Int,
                    ..
                }
            ));
            assert_eq!(
                err.to_string(),
                format!("main array {} holds integer data, expected float", testing::MAIN)
            );
        }
    }

    #[test]
    fn test_index_rows_must_match_main() {
        let mut store = testing::beps_store(Layout::Standard);
        store.insert(
            testing::POS_INDS,
            array![[0_i64, 0], [1, 0]],
            [(LABELS, AttrValue::from(vec!["X", "Y"]))],
        );
        assert!(matches!(
            load(&store, AxisGroup::Position),
            Err(SchemaError::ShapeMismatch { expected: [15, 2], actual: [2, 2], .. })
        ));
    }

    #[test]
    fn test_value_table_must_match_index_table() {
        let mut store = testing::beps_store(Layout::Standard);
        store.insert(
            testing::SPEC_VALS,
            ndarray::Array2::<f64>::zeros((1, 14)),
            crate::store::Attrs::new(),
        );
        assert!(matches!(
            load(&store, AxisGroup::Spectroscopic),
            Err(SchemaError::ShapeMismatch { expected: [2, 14], .. })
        ));
    }

    #[test]
    fn test_missing_link_attribute() {
        let mut store = testing::beps_store(Layout::Standard);
        let mut attrs = store.attrs(testing::MAIN).unwrap();
        attrs.remove(POSITION_VALUES);
        let main = store.read_float(testing::MAIN).unwrap();
        store.insert(testing::MAIN, main, attrs);
        assert!(matches!(
            load(&store, AxisGroup::Position),
            Err(SchemaError::MissingAttribute { attr, .. }) if attr == POSITION_VALUES
        ));
    }

    #[test]
    fn test_label_count() {
        let mut store = testing::beps_store(Layout::Standard);
        store
            .set_attr(testing::POS_INDS, LABELS, vec!["X"])
            .unwrap();
        assert!(matches!(
            load(&store, AxisGroup::Position),
            Err(SchemaError::LabelCount { labels: 1, dims: 2, .. })
        ));
    }

    #[test]
    fn test_bad_offsets() {
        let mut store = testing::beps_store(Layout::Standard);
        store.set_attr(testing::POS_INDS, "Y", 0_i64).unwrap();
        assert!(matches!(
            load(&store, AxisGroup::Position),
            Err(SchemaError::BadOffset { name, offset: 0, .. }) if name == "Y"
        ));
        store.set_attr(testing::POS_INDS, "Y", 7_i64).unwrap();
        assert!(matches!(
            load(&store, AxisGroup::Position),
            Err(SchemaError::BadOffset { offset: 7, .. })
        ));
    }

    #[test]
    fn test_negative_index_values() {
        let mut store = testing::beps_store(Layout::Standard);
        let mut inds = store.read_int(testing::SPEC_INDS).unwrap();
        inds[[1, 3]] = -1;
        let attrs = store.attrs(testing::SPEC_INDS).unwrap();
        store.insert(testing::SPEC_INDS, inds, attrs);
        assert!(matches!(
            load(&store, AxisGroup::Spectroscopic),
            Err(SchemaError::NegativeIndex { value: -1, .. })
        ));
    }
}
