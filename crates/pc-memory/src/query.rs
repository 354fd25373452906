//! Query evaluation for [`crate::MemoryStateStore`].
//!
//! Stored values are parsed as JSON. Filters address fields by dotted path
//! relative to the value (`"person.org"`).
//!
//! | Operator | Argument                      |
//! |----------|-------------------------------|
//! | `EQ`     | `{ "<path>": <value> }`       |
//! | `IN`     | `{ "<path>": [<value>, ..] }` |
//! | `AND`    | `[<filter>, ..]`              |
//! | `OR`     | `[<filter>, ..]`              |
//!
//! Several operators at one level combine with AND. An empty filter matches
//! everything, including values that are not JSON.

use std::cmp::Ordering;
use std::collections::HashMap;

use pc_components::{
    ComponentError, StateStoreQueryPagination, StateStoreQuerySortOrder, StateStoreQuerySorting,
};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    All,
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub(crate) fn parse(filter: &HashMap<String, Value>) -> Result<Self, ComponentError> {
        let mut ops: Vec<(&String, &Value)> = filter.iter().collect();
        ops.sort_by(|a, b| a.0.cmp(b.0));
        Self::combine(ops)
    }

    fn parse_object(object: &Map<String, Value>) -> Result<Self, ComponentError> {
        Self::combine(object.iter().collect())
    }

    fn combine(ops: Vec<(&String, &Value)>) -> Result<Self, ComponentError> {
        let mut filters = ops
            .into_iter()
            .map(|(op, arg)| Self::parse_op(op, arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match filters.len() {
            0 => Self::All,
            1 => filters.remove(0),
            _ => Self::And(filters),
        })
    }

    fn parse_op(op: &str, arg: &Value) -> Result<Self, ComponentError> {
        match op.to_ascii_uppercase().as_str() {
            "EQ" => {
                let (path, value) = single_field(op, arg)?;
                Ok(Self::Eq(path, value.clone()))
            }
            "IN" => {
                let (path, value) = single_field(op, arg)?;
                let candidates = value.as_array().ok_or_else(|| {
                    ComponentError::failed(format!("IN argument for {path} must be an array"))
                })?;
                Ok(Self::In(path, candidates.clone()))
            }
            "AND" => Ok(Self::And(Self::parse_list(op, arg)?)),
            "OR" => Ok(Self::Or(Self::parse_list(op, arg)?)),
            _ => Err(ComponentError::Unsupported(format!("query operator {op}"))),
        }
    }

    fn parse_list(op: &str, arg: &Value) -> Result<Vec<Self>, ComponentError> {
        arg.as_array()
            .ok_or_else(|| ComponentError::failed(format!("{op} argument must be an array")))?
            .iter()
            .map(|item| match item {
                Value::Object(object) => Self::parse_object(object),
                _ => Err(ComponentError::failed(format!(
                    "{op} elements must be filter objects"
                ))),
            })
            .collect()
    }

    /// Whether a stored value passes the filter. `None` is a non-JSON value.
    pub(crate) fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::All => true,
            Self::Eq(path, expected) => {
                value.and_then(|v| lookup(v, path)) == Some(expected)
            }
            Self::In(path, candidates) => value
                .and_then(|v| lookup(v, path))
                .is_some_and(|found| candidates.contains(found)),
            Self::And(filters) => filters.iter().all(|f| f.matches(value)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(value)),
        }
    }
}

fn single_field<'a>(op: &str, arg: &'a Value) -> Result<(String, &'a Value), ComponentError> {
    match arg.as_object() {
        Some(object) if object.len() == 1 => {
            let (path, value) = object.iter().next().ok_or_else(|| {
                ComponentError::failed(format!("{op} needs exactly one field"))
            })?;
            Ok((path.clone(), value))
        }
        _ => Err(ComponentError::failed(format!(
            "{op} needs exactly one field"
        ))),
    }
}

/// Follow a dotted path through nested objects.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.get(segment))
}

/// Total order over optional JSON values: missing first, then numbers,
/// strings and anything else by its JSON text.
pub(crate) fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Compare two values by every sort key in turn.
pub(crate) fn compare_by(
    sorting: &[StateStoreQuerySorting],
    a: Option<&Value>,
    b: Option<&Value>,
) -> Ordering {
    for sort in sorting {
        let ordering = compare(
            a.and_then(|v| lookup(v, &sort.key)),
            b.and_then(|v| lookup(v, &sort.key)),
        );
        let ordering = match sort.order {
            StateStoreQuerySortOrder::Ascending => ordering,
            StateStoreQuerySortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Cut one page out of `items`. The token is the offset of the next page.
pub(crate) fn paginate<T>(
    mut items: Vec<T>,
    pagination: Option<&StateStoreQueryPagination>,
) -> Result<(Vec<T>, Option<String>), ComponentError> {
    let Some(pagination) = pagination else {
        return Ok((items, None));
    };

    let offset = match pagination.token.as_deref() {
        None | Some("") => 0,
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| ComponentError::failed(format!("invalid pagination token {token:?}")))?,
    };
    if offset >= items.len() {
        return Ok((Vec::new(), None));
    }
    items.drain(..offset);

    let limit = usize::try_from(pagination.limit).unwrap_or(usize::MAX);
    if limit == 0 || items.len() <= limit {
        return Ok((items, None));
    }
    items.truncate(limit);
    Ok((items, Some((offset + limit).to_string())))
}
