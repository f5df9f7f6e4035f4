//! `Array`: a multi-dimensional map of `Coordinate -> GraphItem` with a
//! dimension set frozen on first insertion.

use indexmap::{IndexMap, IndexSet};

use crate::config::{ReferenceSpec, Selector};
use crate::coord::{Coordinate, CoordValue};
use crate::error::{CoreError, Result};
use crate::temporal::Date;

/// A coordinate-indexed container for one item name. All coordinates
/// inserted into one Array share the same dimension tuple, fixed by the
/// first insertion; per-dimension value sets are insertion-ordered so
/// `all`-broadcast resolution stays deterministic.
#[derive(Clone, Debug)]
pub struct Array<T> {
    name: String,
    dims: Option<Vec<String>>,
    axes: IndexMap<String, IndexSet<CoordValue>>,
    items: IndexMap<Vec<CoordValue>, T>,
}

impl<T> Array<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dims: None,
            axes: IndexMap::new(),
            items: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[String] {
        self.dims.as_deref().unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn coord_dims(coord: &Coordinate) -> Vec<String> {
        coord.dims().map(str::to_string).collect()
    }

    fn key_for(&self, coord: &Coordinate) -> Vec<CoordValue> {
        self.dims()
            .iter()
            .map(|d| coord.get(d).cloned().expect("dims checked before key_for"))
            .collect()
    }

    fn check_dims(&self, coord: &Coordinate) -> Result<()> {
        let got = Self::coord_dims(coord);
        match &self.dims {
            None => Ok(()),
            Some(expected) if expected == &got => Ok(()),
            Some(expected) => Err(CoreError::SchemaMismatch {
                array: self.name.clone(),
                expected: expected.clone(),
                got,
            }),
        }
    }

    /// Inserts `item` at `coord`. The first insertion freezes `self.dims()`
    /// to `coord`'s dimension set, in `coord`'s own insertion order.
    pub fn insert(&mut self, coord: Coordinate, item: T) -> Result<()> {
        self.check_dims(&coord)?;
        if self.dims.is_none() {
            let dims = Self::coord_dims(&coord);
            for d in &dims {
                self.axes.insert(d.clone(), IndexSet::new());
            }
            self.dims = Some(dims);
        }
        let key = self.key_for(&coord);
        if self.items.contains_key(&key) {
            return Err(CoreError::DuplicateKey {
                array: self.name.clone(),
                coord,
            });
        }
        for d in self.dims().to_vec() {
            if let Some(value) = coord.get(&d) {
                self.axes.get_mut(&d).expect("axis created above").insert(value.clone());
            }
        }
        self.items.insert(key, item);
        Ok(())
    }

    /// Overwrites the item already stored at `coord`. Used by pass 4 of the
    /// builder to perform the one-time `wait_on` transition by replacing a
    /// Task record rather than mutating it in place.
    pub fn replace(&mut self, coord: &Coordinate, item: T) -> Result<()> {
        self.check_dims(coord)?;
        let key = self.key_for(coord);
        if !self.items.contains_key(&key) {
            return Err(CoreError::NotFound {
                what: "coordinate",
                name: format!("{} at {coord}", self.name),
            });
        }
        self.items.insert(key, item);
        Ok(())
    }

    pub fn get(&self, coord: &Coordinate) -> Result<&T> {
        self.check_dims(coord)?;
        let key = self.key_for(coord);
        self.items.get(&key).ok_or_else(|| CoreError::NotFound {
            what: "coordinate",
            name: format!("{} at {coord}", self.name),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Resolves a reference spec against this Array's coordinate space,
    /// yielding every matching item in deterministic (date-first,
    /// declared-axis-order) order.
    pub fn resolve_spec(&self, spec: &ReferenceSpec, reference: &Coordinate) -> Result<Vec<&T>> {
        let dims = self.dims();
        let has_date_dim = dims.iter().any(|d| d == "date");

        if !has_date_dim && (!spec.lag.is_empty() || !spec.date.is_empty()) {
            return Err(CoreError::DateDimMissing(self.name.clone()));
        }
        if has_date_dim && reference.date().is_none() && spec.date.is_empty() {
            return Err(CoreError::DateReferenceRequired(self.name.clone()));
        }

        let mut value_lists: Vec<Vec<CoordValue>> = Vec::with_capacity(dims.len());
        for dim in dims {
            value_lists.push(self.resolve_dim(dim, spec, reference)?);
        }

        let mut out = Vec::new();
        for key in cartesian(&value_lists) {
            match self.items.get(&key) {
                Some(item) => out.push(item),
                None => {
                    let date = key
                        .iter()
                        .find_map(|v| match v {
                            CoordValue::Date(d) => Some(d.to_string()),
                            _ => None,
                        })
                        .unwrap_or_default();
                    return Err(CoreError::OutOfRange {
                        array: self.name.clone(),
                        date,
                    });
                }
            }
        }
        Ok(out)
    }

    fn resolve_dim(&self, dim: &str, spec: &ReferenceSpec, reference: &Coordinate) -> Result<Vec<CoordValue>> {
        if dim == "date" {
            if spec.lag.is_empty() && spec.date.is_empty() {
                let date = *reference.date().expect("checked by resolve_spec");
                return Ok(vec![CoordValue::Date(date)]);
            }
            let mut values = Vec::new();
            if !spec.lag.is_empty() {
                let base: Date = *reference.date().expect("checked by resolve_spec");
                for lag in &spec.lag {
                    values.push(CoordValue::Date(base + *lag));
                }
            }
            for date in &spec.date {
                values.push(CoordValue::Date(*date));
            }
            return Ok(values);
        }
        if spec.parameters.get(dim) == Some(&Selector::Single) {
            let value = reference.get(dim).cloned().ok_or_else(|| CoreError::NotFound {
                what: "dimension",
                name: dim.to_string(),
            })?;
            return Ok(vec![value]);
        }
        Ok(self
            .axes
            .get(dim)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

fn cartesian(lists: &[Vec<CoordValue>]) -> Vec<Vec<CoordValue>> {
    let mut combos: Vec<Vec<CoordValue>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len().max(1));
        for combo in &combos {
            for value in list {
                let mut extended = combo.clone();
                extended.push(value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::parse_date;

    fn coord(dim: &str, value: &str) -> Coordinate {
        let mut c = Coordinate::new();
        c.insert(dim, CoordValue::Param(crate::config::ParamValue::Str(value.to_string())));
        c
    }

    #[test]
    fn first_insert_freezes_dims() {
        let mut arr: Array<u32> = Array::new("demo");
        arr.insert(coord("member", "a"), 1).unwrap();
        assert_eq!(arr.dims(), &["member".to_string()]);
    }

    #[test]
    fn schema_mismatch_on_second_insert() {
        let mut arr: Array<u32> = Array::new("demo");
        arr.insert(coord("member", "a"), 1).unwrap();
        let mut other = Coordinate::new();
        other.insert("site", CoordValue::Param(crate::config::ParamValue::Str("x".into())));
        let err = arr.insert(other, 2).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn duplicate_key_rejected() {
        let mut arr: Array<u32> = Array::new("demo");
        arr.insert(coord("member", "a"), 1).unwrap();
        let err = arr.insert(coord("member", "a"), 2).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
    }

    #[test]
    fn date_dim_missing_on_lag_reference() {
        let mut arr: Array<u32> = Array::new("scalar");
        arr.insert(Coordinate::new(), 1).unwrap();
        let spec = ReferenceSpec {
            name: "scalar".to_string(),
            lag: vec![crate::temporal::parse_duration("P1D").unwrap()],
            ..Default::default()
        };
        let err = arr.resolve_spec(&spec, &Coordinate::new()).unwrap_err();
        assert!(matches!(err, CoreError::DateDimMissing(_)));
    }

    #[test]
    fn broadcast_yields_full_axis_in_insertion_order() {
        let mut arr: Array<String> = Array::new("members");
        for m in ["a", "b", "c"] {
            arr.insert(coord("member", m), m.to_string()).unwrap();
        }
        let spec = ReferenceSpec {
            name: "members".to_string(),
            parameters: [("member".to_string(), Selector::All)].into_iter().collect(),
            ..Default::default()
        };
        let got = arr.resolve_spec(&spec, &Coordinate::new()).unwrap();
        assert_eq!(got, vec!["a", "b", "c"]);
    }

    #[test]
    fn lag_resolves_relative_to_reference_date() {
        let mut arr: Array<String> = Array::new("restart");
        let d1 = parse_date("2025-01-01").unwrap();
        let d2 = parse_date("2025-03-01").unwrap();
        let mut c1 = Coordinate::new();
        c1.insert("date", CoordValue::Date(d1));
        arr.insert(c1, "jan".to_string()).unwrap();
        let mut c2 = Coordinate::new();
        c2.insert("date", CoordValue::Date(d2));
        arr.insert(c2, "mar".to_string()).unwrap();

        let spec = ReferenceSpec {
            name: "restart".to_string(),
            lag: vec![crate::temporal::parse_duration("-P2M").unwrap()],
            ..Default::default()
        };
        let mut reference = Coordinate::new();
        reference.insert("date", CoordValue::Date(d2));
        let got = arr.resolve_spec(&spec, &reference).unwrap();
        assert_eq!(got, vec!["jan"]);
    }
}
