//! Store-native query descriptions.
//!
//! These types describe filters, sorts, updates and aggregations without any
//! SQL. [`super::Collection`] compiles them against its own tables.

use crate::store::ObjectId;
use serde_json::Value;

/// Document filter. `And(vec![])` matches everything, like `All`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    IdEq(ObjectId),
    /// `_id` strictly less than the given id.
    IdLt(ObjectId),
    /// Native text search (`$search` syntax) over the collection's text index.
    Text(String),
    And(Vec<Filter>),
}

impl Filter {
    /// Conjunction that collapses trivial cases.
    pub fn and(filters: Vec<Filter>) -> Self {
        let mut parts: Vec<Filter> = filters
            .into_iter()
            .filter(|filter| *filter != Filter::All)
            .collect();
        match parts.len() {
            0 => Filter::All,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        }
    }

    pub(crate) fn uses_text_search(&self) -> bool {
        match self {
            Filter::Text(_) => true,
            Filter::And(parts) => parts.iter().any(Filter::uses_text_search),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    Id,
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn id(direction: SortDirection) -> Self {
        Self {
            field: SortField::Id,
            direction,
        }
    }

    pub fn field(name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: SortField::Field(name.into()),
            direction,
        }
    }
}

/// Sort/skip/limit options for `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: u64,
    /// `None` returns every matching document.
    pub limit: Option<u64>,
}

/// `$set`-style update: replaces the listed top-level fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Vec<(String, Value)>,
}

impl Update {
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((field.into(), value.into()));
        self
    }
}

/// Accumulator of a group-all aggregation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    /// Number of grouped documents (`$sum: 1`).
    Count,
    /// Average code-point length of a string field (`$avg: {$strLenCP: ...}`).
    AvgCharLength(String),
}

/// `$match` followed by `$group { _id: null, ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAll {
    pub filter: Filter,
    pub accumulators: Vec<(String, Accumulator)>,
}

impl GroupAll {
    pub fn new() -> Self {
        Self {
            filter: Filter::All,
            accumulators: Vec::new(),
        }
    }

    pub fn accumulate(mut self, output: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push((output.into(), accumulator));
        self
    }
}

impl Default for GroupAll {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Filter;
    use crate::store::ObjectId;

    #[test]
    fn and_collapses_trivial_conjunctions() {
        assert_eq!(Filter::and(vec![]), Filter::All);
        assert_eq!(Filter::and(vec![Filter::All, Filter::All]), Filter::All);

        let id = ObjectId::new();
        assert_eq!(
            Filter::and(vec![Filter::All, Filter::IdLt(id)]),
            Filter::IdLt(id)
        );
    }

    #[test]
    fn text_usage_is_detected_inside_conjunctions() {
        let filter = Filter::and(vec![
            Filter::IdLt(ObjectId::new()),
            Filter::Text("alpha".to_string()),
        ]);
        assert!(filter.uses_text_search());
        assert!(!Filter::IdEq(ObjectId::new()).uses_text_search());
    }
}
