//! Filters, projections and query options for list reads.
//!
//! All three serialize deterministically so that a [`Query`] can double as a
//! cache key.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{self, compare_values, Document, ID_FIELD};
use crate::EntityId;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to. A list field matches when it contains the value.
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// List contains the value, or string contains the substring
    Contains,
    /// Field equals one of a list of values
    In,
}

/// A single field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Dotted field path
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl FilterExpr {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    /// Evaluate this expression against a stored document.
    pub fn matches(&self, doc: &Document) -> bool {
        let actual = document::get_path(doc, &self.field).unwrap_or(&Value::Null);
        match self.operator {
            FilterOperator::Eq => equals(actual, &self.value),
            FilterOperator::Ne => !equals(actual, &self.value),
            FilterOperator::Gt => ordered(actual, &self.value, |o| o == Ordering::Greater),
            FilterOperator::Lt => ordered(actual, &self.value, |o| o == Ordering::Less),
            FilterOperator::Gte => ordered(actual, &self.value, |o| o != Ordering::Less),
            FilterOperator::Lte => ordered(actual, &self.value, |o| o != Ordering::Greater),
            FilterOperator::Contains => match (actual, &self.value) {
                (Value::Array(items), v) => items.contains(v),
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                _ => false,
            },
            FilterOperator::In => match &self.value {
                Value::Array(options) => options.iter().any(|v| equals(actual, v)),
                _ => false,
            },
        }
    }

    /// Whether this clause can be expressed as JSON containment (`@>`).
    pub fn is_containment(&self) -> bool {
        match self.operator {
            FilterOperator::Eq => !self.value.is_null(),
            FilterOperator::Contains => !self.value.is_string(),
            _ => false,
        }
    }
}

fn equals(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) if !expected.is_array() => items.contains(expected),
        _ => actual == expected,
    }
}

fn ordered(actual: &Value, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let comparable = matches!(
        (actual, expected),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
    );
    comparable && accept(compare_values(actual, expected))
}

/// Conjunction of field comparisons. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    clauses: Vec<FilterExpr>,
}

impl Filter {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self::all().and(FilterExpr::eq(ID_FIELD, id))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(FilterExpr::eq(field, value))
    }

    /// Documents whose list at `field` contains `value`.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(FilterExpr::contains(field, value))
    }

    pub fn and(mut self, expr: FilterExpr) -> Self {
        self.clauses.push(expr);
        self
    }

    pub fn clauses(&self) -> &[FilterExpr] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|c| c.matches(doc))
    }
}

// ============================================================================
// PROJECTION
// ============================================================================

/// Field projection: only listed paths, plus the identifier, are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Copy of `doc` restricted to the projected paths.
    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = Document::new();
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
        for field in &self.fields {
            if let Some(value) = document::get_path(doc, field) {
                if let Some(slot) = document::get_path_mut_or_insert(&mut out, field) {
                    *slot = value.clone();
                }
            }
        }
        out
    }
}

// ============================================================================
// QUERY OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Sort and pagination applied after filtering. Defaults keep store order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order,
        });
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort (stable), then skip, then limit.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                for key in &self.sort {
                    let left = document::get_path(a, &key.field).unwrap_or(&Value::Null);
                    let right = document::get_path(b, &key.field).unwrap_or(&Value::Null);
                    let ord = compare_values(left, right);
                    let ord = match key.order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        docs.into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// A complete list query: filter, optional projection and options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    pub fields: Option<Projection>,
    pub options: QueryOptions,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_fields(mut self, fields: Projection) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Run this query over documents already in store order.
    pub fn run<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let matched: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.filter.matches(doc))
            .cloned()
            .collect();
        let page = self.options.apply(matched);
        match &self.fields {
            Some(projection) => page.iter().map(|doc| projection.apply(doc)).collect(),
            None => page,
        }
    }
}
