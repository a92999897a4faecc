//! Row filters for data service requests
//!
//! Filters are plain data so they can be sent to a remote service or
//! evaluated in process. Comparisons understand numbers and RFC 3339
//! timestamps, so `5` equals `5.0` and `2024-01-01T00:00:00Z` sorts
//! before `2024-01-01T00:00:00.5Z`.

use crate::data::{Collection, Record};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;

/// A single predicate over a row
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    NotNull(String),
    /// Holds when no row of `collection` matches `filter`
    NotExists {
        collection: Collection,
        filter: Box<Filter>,
    },
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Conjunction of conditions plus optional ordering and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
}

/// Read access to other collections, needed by `NotExists`
pub trait RowSource {
    fn rows(&self, collection: Collection) -> &[Record];
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gte(field.to_string(), value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.conditions.push(Condition::NotNull(field.to_string()));
        self
    }

    pub fn not_exists(mut self, collection: Collection, filter: Filter) -> Self {
        self.conditions.push(Condition::NotExists {
            collection,
            filter: Box::new(filter),
        });
        self
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order_by = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a row against every condition
    pub fn matches(&self, record: &Record, source: &dyn RowSource) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition_matches(condition, record, source))
    }

    /// Select, order and limit rows
    pub fn apply<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a Record>,
        source: &dyn RowSource,
    ) -> Vec<Record> {
        let mut selected: Vec<Record> = rows
            .into_iter()
            .filter(|record| self.matches(record, source))
            .cloned()
            .collect();

        if let Some((field, order)) = &self.order_by {
            // Stable sort, then reverse, so ties come out newest-first for Desc
            selected.sort_by(|a, b| compare_fields(a.get(field), b.get(field)));
            if *order == Order::Desc {
                selected.reverse();
            }
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
    }
}

fn condition_matches(condition: &Condition, record: &Record, source: &dyn RowSource) -> bool {
    match condition {
        Condition::Eq(field, expected) => record
            .get(field)
            .map(|actual| values_equal(actual, expected))
            .unwrap_or(expected.is_null()),
        Condition::Gte(field, bound) => record
            .get(field)
            .and_then(|actual| compare_values(actual, bound))
            .map(|ordering| ordering != Ordering::Less)
            .unwrap_or(false),
        Condition::In(field, options) => record
            .get(field)
            .map(|actual| options.iter().any(|option| values_equal(actual, option)))
            .unwrap_or(false),
        Condition::NotNull(field) => record.get(field).map(|v| !v.is_null()).unwrap_or(false),
        Condition::NotExists { collection, filter } => !source
            .rows(*collection)
            .iter()
            .any(|other| filter.matches(other, source)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

/// Order two JSON values of the same kind; `None` when incomparable
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        // Missing values sort first
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
