//! Table query builder shared by every data service.
//!
//! A [`TableQuery`] is a declarative description of one bounded read: the
//! relation, a projection, a conjunction of predicates, the sort order and an
//! offset/limit window. The PostgREST client renders it into URL parameters;
//! the in-memory service evaluates it directly with [`TableQuery::apply`], so
//! both backends share one definition of what a filter means.

use std::cmp::Ordering;

use serde_json::Value;

pub mod key;
pub mod sort;

pub use key::{DateRange, DatePreset, ListingParams, QueryKey};
pub use sort::{SortDirection, SortField, SortSpec};

/// One filter condition. All predicates of a query are AND-composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Column equals value
    Eq { column: String, value: String },
    /// Column value is one of `values`
    In { column: String, values: Vec<String> },
    /// Array column shares at least one element with `values`
    Overlaps { column: String, values: Vec<String> },
    /// Case-insensitive substring match on any of `columns`
    Search { columns: Vec<String>, text: String },
    /// Column is greater than or equal to value
    Gte { column: String, value: String },
    /// Column is less than or equal to value
    Lte { column: String, value: String },
}

impl Predicate {
    /// Render as a PostgREST `(key, value)` query parameter.
    pub fn to_param(&self) -> (String, String) {
        match self {
            Predicate::Eq { column, value } => (column.clone(), format!("eq.{value}")),
            Predicate::In { column, values } => (
                column.clone(),
                format!("in.({})", quote_list(values).join(",")),
            ),
            Predicate::Overlaps { column, values } => (
                column.clone(),
                format!("ov.{{{}}}", quote_list(values).join(",")),
            ),
            Predicate::Search { columns, text } => {
                let pattern = quote_value(&format!("*{text}*"));
                let clauses: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{c}.ilike.{pattern}"))
                    .collect();
                ("or".to_string(), format!("({})", clauses.join(",")))
            }
            Predicate::Gte { column, value } => (column.clone(), format!("gte.{value}")),
            Predicate::Lte { column, value } => (column.clone(), format!("lte.{value}")),
        }
    }

    /// Evaluate against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Predicate::Eq { column, value } => {
                scalar(row.get(column)).is_some_and(|v| v == *value)
            }
            Predicate::In { column, values } => {
                scalar(row.get(column)).is_some_and(|v| values.contains(&v))
            }
            Predicate::Overlaps { column, values } => match row.get(column) {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| scalar(Some(item)))
                    .any(|item| values.contains(&item)),
                _ => false,
            },
            Predicate::Search { columns, text } => {
                let needle = text.to_lowercase();
                columns.iter().any(|c| match row.get(c) {
                    Some(Value::Array(items)) => items.iter().any(|item| {
                        scalar(Some(item)).is_some_and(|s| s.to_lowercase().contains(&needle))
                    }),
                    other => scalar(other).is_some_and(|s| s.to_lowercase().contains(&needle)),
                })
            }
            Predicate::Gte { column, value } => {
                compare_to(row.get(column), value).is_some_and(|o| o != Ordering::Less)
            }
            Predicate::Lte { column, value } => {
                compare_to(row.get(column), value).is_some_and(|o| o != Ordering::Greater)
            }
        }
    }
}

/// Sort instruction. Nulls always sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: SortDirection,
}

impl Order {
    fn to_param(&self) -> String {
        format!("{}.{}.nullslast", self.column, self.direction)
    }
}

/// A bounded read against one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    relation: String,
    columns: String,
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl TableQuery {
    pub fn new(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            columns: "*".to_string(),
            predicates: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    /// Set the column projection (comma separated)
    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    /// Add a predicate (AND composition)
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<String>) -> Self {
        self.filter(Predicate::Eq {
            column: column.to_string(),
            value: value.into(),
        })
    }

    pub fn in_list(self, column: &str, values: Vec<String>) -> Self {
        self.filter(Predicate::In {
            column: column.to_string(),
            values,
        })
    }

    pub fn overlaps(self, column: &str, values: Vec<String>) -> Self {
        self.filter(Predicate::Overlaps {
            column: column.to_string(),
            values,
        })
    }

    pub fn search(self, columns: &[&str], text: &str) -> Self {
        self.filter(Predicate::Search {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            text: text.to_string(),
        })
    }

    pub fn gte(self, column: &str, value: impl Into<String>) -> Self {
        self.filter(Predicate::Gte {
            column: column.to_string(),
            value: value.into(),
        })
    }

    pub fn lte(self, column: &str, value: impl Into<String>) -> Self {
        self.filter(Predicate::Lte {
            column: column.to_string(),
            value: value.into(),
        })
    }

    /// Append a sort column; earlier calls take precedence
    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    /// Restrict to `limit` rows starting at `offset`
    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// PostgREST query parameters for this query.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.predicates.iter().map(Predicate::to_param));
        if !self.order.is_empty() {
            let order: Vec<String> = self.order.iter().map(Order::to_param).collect();
            params.push(("order".to_string(), order.join(",")));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// True if `row` satisfies every predicate.
    pub fn matches(&self, row: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// Filter, sort, window and project `rows` the way the server would.
    pub fn apply<'a>(&self, rows: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
        let mut filtered: Vec<&Value> = rows.into_iter().filter(|r| self.matches(r)).collect();

        filtered.sort_by(|a, b| {
            for order in &self.order {
                let ordering =
                    compare_values(a.get(&order.column), b.get(&order.column), order.direction);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);

        filtered
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| self.project(row))
            .collect()
    }

    fn project(&self, row: &Value) -> Value {
        if self.columns.trim() == "*" {
            return row.clone();
        }
        let Value::Object(map) = row else {
            return row.clone();
        };
        let projected = self
            .columns
            .split(',')
            .map(str::trim)
            .filter_map(|c| map.get(c).map(|v| (c.to_string(), v.clone())))
            .collect();
        Value::Object(projected)
    }
}

fn quote_value(value: &str) -> String {
    if value
        .chars()
        .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | ':' | '.' | ' '))
    {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn quote_list(values: &[String]) -> Vec<String> {
    values.iter().map(|v| quote_value(v)).collect()
}

/// String form of a scalar JSON value, `None` for null, arrays and objects.
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compare_to(value: Option<&Value>, bound: &str) -> Option<Ordering> {
    match value? {
        Value::Number(n) => {
            let bound: f64 = bound.parse().ok()?;
            n.as_f64()?.partial_cmp(&bound)
        }
        Value::String(s) => Some(s.as_str().cmp(bound)),
        _ => None,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = match (a, b) {
                (Value::Number(x), Value::Number(y)) => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
                _ => scalar(Some(a)).cmp(&scalar(Some(b))),
            };
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}
