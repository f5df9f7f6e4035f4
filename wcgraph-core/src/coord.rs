//! Coordinates and coordinate spaces.
//!
//! A [`Coordinate`] is the point in (date x parameters) space where a graph
//! item lives. A [`CoordSpace`] enumerates the cartesian product of a
//! parameter tuple (and an optional date) in declaration order, so that
//! everything downstream — `Array` insertion order, `Store` iteration order —
//! stays deterministic.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{ParamDecl, ParamValue};
use crate::temporal::Date;

/// A single dimension value: either the reserved `date` axis or a named
/// parameter value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordValue {
    Date(Date),
    Param(ParamValue),
}

impl fmt::Display for CoordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordValue::Date(d) => write!(f, "{d}"),
            CoordValue::Param(p) => write!(f, "{p}"),
        }
    }
}

/// A mapping from dimension name to value. Preserves insertion order for
/// display and for building `Array` keys, but equality and hashing only
/// consider the dimension/value pairs, not their order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Coordinate {
    dims: IndexMap<String, CoordValue>,
}

impl Coordinate {
    pub fn new() -> Self {
        Self {
            dims: IndexMap::new(),
        }
    }

    pub fn with(mut self, dim: impl Into<String>, value: CoordValue) -> Self {
        self.dims.insert(dim.into(), value);
        self
    }

    pub fn insert(&mut self, dim: impl Into<String>, value: CoordValue) {
        self.dims.insert(dim.into(), value);
    }

    pub fn get(&self, dim: &str) -> Option<&CoordValue> {
        self.dims.get(dim)
    }

    pub fn date(&self) -> Option<&Date> {
        match self.dims.get("date") {
            Some(CoordValue::Date(d)) => Some(d),
            _ => None,
        }
    }

    /// The dimension names, in first-insertion order.
    pub fn dims(&self) -> impl Iterator<Item = &str> {
        self.dims.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.dims.len() == other.dims.len()
            && self
                .dims
                .iter()
                .all(|(k, v)| other.dims.get(k).is_some_and(|ov| ov == v))
    }
}
impl Eq for Coordinate {}

impl std::hash::Hash for Coordinate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Order-independent hash: combine per-entry hashes with XOR.
        let mut acc: u64 = 0;
        for (k, v) in &self.dims {
            let mut h = std::collections::hash_map::DefaultHasher::new();
            (k, v).hash(&mut h);
            acc ^= std::hash::Hasher::finish(&h);
        }
        state.write_u64(acc);
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// Enumerates the cartesian product `[date] x param_refs[0].values x ... x
/// param_refs[k].values`, yielding one `Coordinate` per combination in
/// dimension-declared, then value-declared, order.
pub struct CoordSpace<'a> {
    date: Option<Date>,
    axes: Vec<&'a ParamDecl>,
}

impl<'a> CoordSpace<'a> {
    pub fn new(axes: Vec<&'a ParamDecl>, date: Option<Date>) -> Self {
        Self { date, axes }
    }

    pub fn iter(&self) -> impl Iterator<Item = Coordinate> + '_ {
        let mut dims: Vec<&str> = Vec::new();
        let mut value_lists: Vec<Vec<CoordValue>> = Vec::new();
        if let Some(date) = self.date {
            dims.push("date");
            value_lists.push(vec![CoordValue::Date(date)]);
        }
        for axis in &self.axes {
            dims.push(axis.name.as_str());
            value_lists.push(axis.values.iter().cloned().map(CoordValue::Param).collect());
        }
        cartesian_product(value_lists).map(move |values| {
            let mut coord = Coordinate::new();
            for (dim, value) in dims.iter().zip(values) {
                coord.insert(*dim, value);
            }
            coord
        })
    }
}

/// Cartesian product of a list of value lists, in first-axis-slowest order
/// (matching `itertools.product`).
fn cartesian_product(lists: Vec<Vec<CoordValue>>) -> impl Iterator<Item = Vec<CoordValue>> {
    let mut combos: Vec<Vec<CoordValue>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len().max(1));
        for combo in &combos {
            for value in &list {
                let mut extended = combo.clone();
                extended.push(value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::parse_date;

    fn axis(name: &str, values: &[&str]) -> ParamDecl {
        ParamDecl {
            name: name.to_string(),
            values: values.iter().map(|v| ParamValue::Str(v.to_string())).collect(),
        }
    }

    #[test]
    fn product_without_date() {
        let member = axis("member", &["a", "b"]);
        let space = CoordSpace::new(vec![&member], None);
        let coords: Vec<_> = space.iter().collect();
        assert_eq!(coords.len(), 2);
        assert_eq!(
            coords[0].get("member"),
            Some(&CoordValue::Param(ParamValue::Str("a".into())))
        );
    }

    #[test]
    fn product_with_date_is_first_dimension() {
        let date = parse_date("2025-01-01").unwrap();
        let member = axis("member", &["a", "b", "c"]);
        let space = CoordSpace::new(vec![&member], Some(date));
        let coords: Vec<_> = space.iter().collect();
        assert_eq!(coords.len(), 3);
        assert_eq!(coords[0].dims().next(), Some("date"));
    }

    #[test]
    fn coordinate_equality_ignores_insertion_order() {
        let mut a = Coordinate::new();
        a.insert("x", CoordValue::Param(ParamValue::Str("1".into())));
        a.insert("y", CoordValue::Param(ParamValue::Str("2".into())));
        let mut b = Coordinate::new();
        b.insert("y", CoordValue::Param(ParamValue::Str("2".into())));
        b.insert("x", CoordValue::Param(ParamValue::Str("1".into())));
        assert_eq!(a, b);
    }
}
