//! `Store`: a name-keyed collection of `Array`s, and the entry point for
//! resolving reference specs (temporal guards, scalar vs. dimensioned
//! targets) during unrolling.

use indexmap::IndexMap;

use crate::array::Array;
use crate::config::ReferenceSpec;
use crate::coord::Coordinate;
use crate::error::{CoreError, Result};

/// Anything that can live in a `Store`: it knows its own name and the
/// coordinate it was created at.
pub trait GraphItem {
    fn item_name(&self) -> &str;
    fn coordinate(&self) -> &Coordinate;
}

/// A homogeneous-by-item-type, heterogeneous-by-dimension collection of
/// named `Array`s.
#[derive(Clone, Debug)]
pub struct Store<T> {
    arrays: IndexMap<String, Array<T>>,
}

impl<T: GraphItem> Store<T> {
    pub fn new() -> Self {
        Self {
            arrays: IndexMap::new(),
        }
    }

    /// Adds `item` to the Array named after it, creating the Array lazily.
    pub fn add(&mut self, item: T) -> Result<()> {
        let name = item.item_name().to_string();
        let coord = item.coordinate().clone();
        let array = self
            .arrays
            .entry(name.clone())
            .or_insert_with(|| Array::new(name));
        array.insert(coord, item)
    }

    pub fn get(&self, name: &str, coord: &Coordinate) -> Result<&T> {
        let array = self.arrays.get(name).ok_or_else(|| CoreError::NotFound {
            what: "name",
            name: name.to_string(),
        })?;
        if array.dims().is_empty() {
            if !coord.is_empty() {
                return Err(CoreError::UnexpectedCoordinate(name.to_string()));
            }
        } else if coord.is_empty() {
            return Err(CoreError::CoordinateRequired(name.to_string()));
        }
        array.get(coord)
    }

    pub fn array(&self, name: &str) -> Option<&Array<T>> {
        self.arrays.get(name)
    }

    /// Overwrites an already-inserted item at `(name, coord)`. See
    /// [`Array::replace`].
    pub fn replace(&mut self, name: &str, coord: &Coordinate, item: T) -> Result<()> {
        let array = self.arrays.get_mut(name).ok_or_else(|| CoreError::NotFound {
            what: "name",
            name: name.to_string(),
        })?;
        array.replace(coord, item)
    }

    /// Resolves a reference spec against the named Array, applying the
    /// `when` temporal guard first (a guard mismatch yields nothing, not an
    /// error).
    pub fn iter_from_spec(&self, spec: &ReferenceSpec, reference: &Coordinate) -> Result<Vec<&T>> {
        if let Some(when) = &spec.when {
            let ref_date = reference.date().ok_or(CoreError::GuardNeedsDate)?;
            if let Some(at) = when.at {
                if at != *ref_date {
                    return Ok(Vec::new());
                }
            }
            if let Some(before) = when.before {
                if before <= *ref_date {
                    return Ok(Vec::new());
                }
            }
            if let Some(after) = when.after {
                if after >= *ref_date {
                    return Ok(Vec::new());
                }
            }
        }

        let array = self.arrays.get(&spec.name).ok_or_else(|| CoreError::NotFound {
            what: "name",
            name: spec.name.clone(),
        })?;

        if array.dims().is_empty() {
            let scalar_ref = !spec.lag.is_empty() || !spec.date.is_empty() || !spec.parameters.is_empty();
            if scalar_ref {
                return Err(CoreError::ScalarMisreferenced(spec.name.clone()));
            }
            return Ok(array.iter().collect());
        }

        array.resolve_spec(spec, reference)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.arrays.values().flat_map(|a| a.iter())
    }

    pub fn len(&self) -> usize {
        self.arrays.values().map(Array::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: GraphItem> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Selector;
    use crate::coord::CoordValue;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Item {
        name: String,
        coord: Coordinate,
        value: u32,
    }

    impl GraphItem for Item {
        fn item_name(&self) -> &str {
            &self.name
        }
        fn coordinate(&self) -> &Coordinate {
            &self.coord
        }
    }

    #[test]
    fn scalar_get_requires_empty_coordinate() {
        let mut store = Store::new();
        store
            .add(Item {
                name: "a".to_string(),
                coord: Coordinate::new(),
                value: 1,
            })
            .unwrap();
        let mut coord = Coordinate::new();
        coord.insert("date", CoordValue::Date(crate::temporal::parse_date("2025-01-01").unwrap()));
        let err = store.get("a", &coord).unwrap_err();
        assert!(matches!(err, CoreError::UnexpectedCoordinate(_)));
    }

    #[test]
    fn scalar_misreferenced_with_lag() {
        let mut store = Store::new();
        store
            .add(Item {
                name: "a".to_string(),
                coord: Coordinate::new(),
                value: 1,
            })
            .unwrap();
        let spec = ReferenceSpec {
            name: "a".to_string(),
            lag: vec![crate::temporal::parse_duration("P1D").unwrap()],
            ..Default::default()
        };
        let err = store.iter_from_spec(&spec, &Coordinate::new()).unwrap_err();
        assert!(matches!(err, CoreError::ScalarMisreferenced(_)));
    }

    #[test]
    fn when_guard_filters_before_resolution() {
        let mut store = Store::new();
        let mut coord = Coordinate::new();
        coord.insert(
            "member",
            CoordValue::Param(crate::config::ParamValue::Str("a".to_string())),
        );
        store
            .add(Item {
                name: "b".to_string(),
                coord: coord.clone(),
                value: 1,
            })
            .unwrap();

        let when = crate::config::WhenGuard {
            at: Some(crate::temporal::parse_date("2025-02-01").unwrap()),
            before: None,
            after: None,
        };
        let spec = ReferenceSpec {
            name: "b".to_string(),
            when: Some(when),
            parameters: [("member".to_string(), Selector::Single)].into_iter().collect(),
            ..Default::default()
        };
        let mut reference = Coordinate::new();
        reference.insert("date", CoordValue::Date(crate::temporal::parse_date("2025-01-01").unwrap()));
        reference.insert(
            "member",
            CoordValue::Param(crate::config::ParamValue::Str("a".to_string())),
        );
        let got = store.iter_from_spec(&spec, &reference).unwrap();
        assert!(got.is_empty());
    }
}
