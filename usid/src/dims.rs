/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The dimension registry.
//!
//! Dimension names are not part of any fixed schema: they are read
//! from table attributes when a view is constructed. The registry
//! turns them into an ordered, immutable map from name to
//! [`Dimension`] and answers label and size queries in either
//! [`SortState`].

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;

use crate::schema;
use crate::schema::GroupTables;
use crate::schema::SchemaError;
use crate::sort;
use crate::sort::SortState;

/// The two store axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisGroup {
    Position,
    Spectroscopic,
}

impl AxisGroup {
    pub const ALL: [AxisGroup; 2] = [AxisGroup::Position, AxisGroup::Spectroscopic];

    /// The main array axis this group enumerates. Index and value
    /// tables share it.
    pub fn store_axis(self) -> Axis {
        match self {
            AxisGroup::Position => Axis(0),
            AxisGroup::Spectroscopic => Axis(1),
        }
    }

    /// The index table axis along which dimensions are laid out.
    pub fn lane_axis(self) -> Axis {
        match self {
            AxisGroup::Position => Axis(1),
            AxisGroup::Spectroscopic => Axis(0),
        }
    }
}

impl fmt::Display for AxisGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisGroup::Position => write!(f, "position"),
            AxisGroup::Spectroscopic => write!(f, "spectroscopic"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown axis group {0:?}, expected \"position\" or \"spectroscopic\"")]
pub struct ParseAxisGroupError(String);

impl FromStr for AxisGroup {
    type Err = ParseAxisGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "position" | "pos" => Ok(AxisGroup::Position),
            "spectroscopic" | "spec" => Ok(AxisGroup::Spectroscopic),
            _ => Err(ParseAxisGroupError(s.to_string())),
        }
    }
}

/// Lookup failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("unknown {group} dimension: {name}")]
    NotInGroup { name: String, group: AxisGroup },
}

/// A named dimension of a dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub group: AxisGroup,
    /// Position of the name in the group's declared labels.
    pub ordinal: usize,
    /// Column (position) or row (spectroscopic) in the index table.
    pub offset: usize,
    pub size: usize,
    pub units: Option<String>,
}

impl Dimension {
    /// `"name (units)"`, or just the name when units are unknown.
    pub fn descriptor(&self) -> String {
        match &self.units {
            Some(units) => format!("{} ({})", self.name, units),
            None => self.name.clone(),
        }
    }
}

/// Ordered name → [`Dimension`] map, built once per view.
#[derive(Clone, Debug)]
pub struct DimensionRegistry {
    /// Position dimensions first, then spectroscopic, each in declared
    /// order.
    dims: Vec<Dimension>,
    by_name: IndexMap<String, usize>,
    num_position: usize,
    /// Per group, declared ordinals ranked fastest to slowest.
    ranking: [Vec<usize>; 2],
}

impl DimensionRegistry {
    pub fn new(position: &GroupTables, spectroscopic: &GroupTables) -> Result<Self, SchemaError> {
        let mut dims = Vec::new();
        let mut by_name = IndexMap::new();
        let mut ranking: [Vec<usize>; 2] = Default::default();
        for (slot, tables) in [position, spectroscopic].into_iter().enumerate() {
            let sizes = schema::dimension_sizes(tables);
            for (ordinal, name) in tables.labels.iter().enumerate() {
                let dim = Dimension {
                    name: name.clone(),
                    group: tables.group,
                    ordinal,
                    offset: tables.offsets[ordinal],
                    size: sizes[ordinal],
                    units: tables.units[ordinal].clone(),
                };
                if by_name.insert(name.clone(), dims.len()).is_some() {
                    return Err(SchemaError::DuplicateDimension(name.clone()));
                }
                dims.push(dim);
            }
            // Change counts are indexed by table offset; re-key them by
            // declared ordinal before ranking.
            let by_offset = sort::change_counts(tables.indices.view(), tables.group.lane_axis());
            let by_ordinal: Vec<usize> = tables.offsets.iter().map(|&o| by_offset[o]).collect();
            ranking[slot] = sort::fastest_first(&by_ordinal);
        }
        Ok(Self {
            dims,
            by_name,
            num_position: position.labels.len(),
            ranking,
        })
    }

    /// Looks a dimension up by name in either group.
    pub fn resolve(&self, name: &str) -> Result<&Dimension, DimensionError> {
        self.by_name
            .get(name)
            .map(|&i| &self.dims[i])
            .ok_or_else(|| DimensionError::UnknownDimension(name.to_string()))
    }

    /// Looks a dimension up by name, requiring it to belong to `group`.
    pub fn resolve_in(&self, group: AxisGroup, name: &str) -> Result<&Dimension, DimensionError> {
        match self.resolve(name).ok() {
            Some(dim) if dim.group == group => Ok(dim),
            Some(_) => Err(DimensionError::NotInGroup {
                name: name.to_string(),
                group,
            }),
            None => Err(DimensionError::UnknownDimension(name.to_string())),
        }
    }

    /// The dimensions of `group` in declared order.
    pub fn declared(&self, group: AxisGroup) -> &[Dimension] {
        let (position, spectroscopic) = self.dims.split_at(self.num_position);
        match group {
            AxisGroup::Position => position,
            AxisGroup::Spectroscopic => spectroscopic,
        }
    }

    /// The dimensions of `group`, in the order given by `state`.
    pub fn dimensions(&self, group: AxisGroup, state: SortState) -> Vec<&Dimension> {
        let declared: Vec<&Dimension> = self.declared(group).iter().collect();
        sort::effective_order(&declared, &self.ranking[group as usize], state)
    }

    /// All dimensions, position group first.
    pub fn n_dim_dimensions(&self, state: SortState) -> Vec<&Dimension> {
        let mut dims = self.dimensions(AxisGroup::Position, state);
        dims.extend(self.dimensions(AxisGroup::Spectroscopic, state));
        dims
    }

    pub fn labels(&self, group: AxisGroup, state: SortState) -> Vec<&str> {
        self.dimensions(group, state)
            .into_iter()
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn sizes(&self, group: AxisGroup, state: SortState) -> Vec<usize> {
        self.dimensions(group, state)
            .into_iter()
            .map(|d| d.size)
            .collect()
    }

    pub fn n_dim_labels(&self, state: SortState) -> Vec<&str> {
        self.n_dim_dimensions(state)
            .into_iter()
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn n_dim_sizes(&self, state: SortState) -> Vec<usize> {
        self.n_dim_dimensions(state)
            .into_iter()
            .map(|d| d.size)
            .collect()
    }

    /// Number of dimensions in `group`.
    pub fn num_dims(&self, group: AxisGroup) -> usize {
        self.declared(group).len()
    }

    /// Declared ordinals of `group` ranked fastest to slowest.
    pub fn ranking(&self, group: AxisGroup) -> &[usize] {
        &self.ranking[group as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::load_group;
    use crate::store::AttrValue;
    use crate::store::MemoryStore;
    use crate::store::Store;
    use crate::testing;
    use crate::testing::Layout;

    fn tables(store: &MemoryStore) -> (GroupTables, GroupTables) {
        let attrs = store.attrs(testing::MAIN).unwrap();
        let shape = store.shape(testing::MAIN).unwrap();
        let pos = load_group(store, testing::MAIN, &attrs, shape, AxisGroup::Position).unwrap();
        let spec =
            load_group(store, testing::MAIN, &attrs, shape, AxisGroup::Spectroscopic).unwrap();
        (pos, spec)
    }

    fn registry(layout: Layout) -> DimensionRegistry {
        let (pos, spec) = tables(&testing::beps_store(layout));
        DimensionRegistry::new(&pos, &spec).unwrap()
    }

    #[test]
    fn test_parse_axis_group() {
        assert_eq!("position".parse::<AxisGroup>(), Ok(AxisGroup::Position));
        assert_eq!("spec".parse::<AxisGroup>(), Ok(AxisGroup::Spectroscopic));
        assert!("time".parse::<AxisGroup>().is_err());
        for group in AxisGroup::ALL {
            assert_eq!(group.to_string().parse::<AxisGroup>(), Ok(group));
        }
    }

    #[test]
    fn test_resolve() {
        let registry = registry(Layout::Standard);
        let x = registry.resolve("X").unwrap();
        assert_eq!(x.group, AxisGroup::Position);
        assert_eq!((x.offset, x.size), (0, 5));
        assert_eq!(x.descriptor(), "X (um)");
        let cycle = registry.resolve("Cycle").unwrap();
        assert_eq!(cycle.group, AxisGroup::Spectroscopic);
        assert_eq!((cycle.offset, cycle.size), (1, 2));
        assert_eq!(
            registry.resolve("blah"),
            Err(DimensionError::UnknownDimension("blah".to_string()))
        );
    }

    #[test]
    fn test_resolve_in_group() {
        let registry = registry(Layout::Standard);
        assert!(registry.resolve_in(AxisGroup::Position, "Y").is_ok());
        assert_eq!(
            registry.resolve_in(AxisGroup::Position, "Bias"),
            Err(DimensionError::NotInGroup {
                name: "Bias".to_string(),
                group: AxisGroup::Position
            })
        );
        assert!(matches!(
            registry.resolve_in(AxisGroup::Spectroscopic, "nope"),
            Err(DimensionError::UnknownDimension(_))
        ));
    }

    #[test]
    fn test_labels_and_sizes() {
        let registry = registry(Layout::Standard);
        let state = SortState::FileOrder;
        assert_eq!(registry.labels(AxisGroup::Position, state), vec!["X", "Y"]);
        assert_eq!(
            registry.labels(AxisGroup::Spectroscopic, state),
            vec!["Bias", "Cycle"]
        );
        assert_eq!(registry.n_dim_sizes(state), vec![5, 3, 7, 2]);
        assert_eq!(registry.num_dims(AxisGroup::Spectroscopic), 2);
        // X and Bias already change fastest.
        assert_eq!(
            registry.n_dim_labels(SortState::FastestFirst),
            vec!["X", "Y", "Bias", "Cycle"]
        );
    }

    #[test]
    fn test_sorted_labels_follow_change_rate() {
        let registry = registry(Layout::Reversed);
        assert_eq!(
            registry.n_dim_labels(SortState::FileOrder),
            vec!["X", "Y", "Bias", "Cycle"]
        );
        assert_eq!(
            registry.n_dim_labels(SortState::FastestFirst),
            vec!["Y", "X", "Cycle", "Bias"]
        );
        assert_eq!(
            registry.n_dim_sizes(SortState::FastestFirst),
            vec![3, 5, 2, 7]
        );
        assert_eq!(registry.ranking(AxisGroup::Position), &[1, 0]);
    }

    #[test]
    fn test_offsets_from_attributes() {
        // Swap the column attributes: "X" now lives in column 1.
        let mut store = testing::beps_store(Layout::Standard);
        store
            .set_attr(testing::POS_INDS, "X", AttrValue::Int(1))
            .unwrap();
        store
            .set_attr(testing::POS_INDS, "Y", AttrValue::Int(0))
            .unwrap();
        let (pos, spec) = tables(&store);
        let registry = DimensionRegistry::new(&pos, &spec).unwrap();
        let x = registry.resolve("X").unwrap();
        assert_eq!((x.ordinal, x.offset, x.size), (0, 1, 3));
        // Column 1 changes slowly, so the declared-first "X" ranks last.
        assert_eq!(
            registry.labels(AxisGroup::Position, SortState::FastestFirst),
            vec!["Y", "X"]
        );
    }

    #[test]
    fn test_duplicate_names_across_groups() {
        let mut store = testing::beps_store(Layout::Standard);
        store
            .set_attr(
                testing::SPEC_INDS,
                crate::schema::LABELS,
                vec!["X", "Cycle"],
            )
            .unwrap();
        let (pos, spec) = tables(&store);
        assert!(matches!(
            DimensionRegistry::new(&pos, &spec),
            Err(SchemaError::DuplicateDimension(name)) if name == "X"
        ));
    }
}
