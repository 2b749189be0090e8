//! Declarative record filter
//!
//! A filter is a JSON object evaluated against each scanned record:
//!
//! | Form                               | Meaning                                   |
//! |------------------------------------|-------------------------------------------|
//! | `{"name": "a"}`                    | field equals literal (or array contains)  |
//! | `{"age": {"$gte": 18, "$lt": 65}}` | every operator must hold                  |
//! | `{"address.city": "Berlin"}`       | dot path into nested objects/arrays       |
//! | `{"$or": [{...}, {...}]}`          | logical `$and` / `$or` / `$nor`           |
//!
//! Field operators: `$eq $ne $gt $gte $lt $lte $in $nin $exists $all $size
//! $mod $regex` (with optional `$options` flags `i`, `m`, `s`).

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use relay_common::{RelayError, Result};

/// Compiled filter
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Field {
        path: Vec<String>,
        conditions: Vec<Condition>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    All(Vec<Value>),
    Size(usize),
    Mod { divisor: i64, remainder: i64 },
    Regex(Regex),
}

fn invalid(reason: impl Into<String>) -> RelayError {
    RelayError::InvalidFilter(reason.into())
}

impl Filter {
    /// Compile a filter specification
    pub fn parse(spec: &Value) -> Result<Self> {
        let object = spec
            .as_object()
            .ok_or_else(|| invalid("filter must be a JSON object"))?;

        let mut clauses = Vec::with_capacity(object.len());
        for (key, value) in object {
            let clause = match key.as_str() {
                "$and" => Clause::And(Self::parse_list(key, value)?),
                "$or" => Clause::Or(Self::parse_list(key, value)?),
                "$nor" => Clause::Nor(Self::parse_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(invalid(format!("unknown operator '{}'", op)));
                }
                field => Clause::Field {
                    path: field.split('.').map(str::to_string).collect(),
                    conditions: parse_conditions(value)?,
                },
            };
            clauses.push(clause);
        }

        Ok(Self { clauses })
    }

    fn parse_list(op: &str, value: &Value) -> Result<Vec<Filter>> {
        let items = value
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| invalid(format!("'{}' expects a non-empty array", op)))?;
        items.iter().map(Filter::parse).collect()
    }

    /// An empty filter matches every record
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }
}

impl Clause {
    fn matches(&self, record: &Value) -> bool {
        match self {
            Clause::Field { path, conditions } => {
                let field = resolve(record, path);
                conditions.iter().all(|c| c.matches(field))
            }
            Clause::And(filters) => filters.iter().all(|f| f.matches(record)),
            Clause::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Clause::Nor(filters) => !filters.iter().any(|f| f.matches(record)),
        }
    }
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => equals(field, expected),
            Condition::Ne(expected) => !equals(field, expected),
            Condition::Gt(bound) => any_element(field, |v| compare(v, bound) == Some(Ordering::Greater)),
            Condition::Gte(bound) => any_element(field, |v| {
                matches!(compare(v, bound), Some(Ordering::Greater | Ordering::Equal))
            }),
            Condition::Lt(bound) => any_element(field, |v| compare(v, bound) == Some(Ordering::Less)),
            Condition::Lte(bound) => any_element(field, |v| {
                matches!(compare(v, bound), Some(Ordering::Less | Ordering::Equal))
            }),
            Condition::In(candidates) => candidates.iter().any(|c| equals(field, c)),
            Condition::Nin(candidates) => !candidates.iter().any(|c| equals(field, c)),
            Condition::Exists(flag) => field.is_some() == *flag,
            Condition::All(required) => match field {
                Some(Value::Array(items)) => required
                    .iter()
                    .all(|r| items.iter().any(|item| value_eq(item, r))),
                _ => false,
            },
            Condition::Size(len) => matches!(field, Some(Value::Array(items)) if items.len() == *len),
            Condition::Mod { divisor, remainder } => any_element(field, |v| {
                v.as_i64().is_some_and(|n| n.wrapping_rem(*divisor) == *remainder)
            }),
            Condition::Regex(re) => {
                any_element(field, |v| v.as_str().is_some_and(|s| re.is_match(s)))
            }
        }
    }
}

fn parse_conditions(value: &Value) -> Result<Vec<Condition>> {
    let ops = match value.as_object() {
        Some(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => obj,
        Some(obj) if obj.keys().any(|k| k.starts_with('$')) => {
            return Err(invalid("cannot mix operators and literal fields"));
        }
        _ => return Ok(vec![Condition::Eq(value.clone())]),
    };

    let regex_flags = match ops.get("$options") {
        Some(Value::String(flags)) => flags.as_str(),
        Some(_) => return Err(invalid("'$options' expects a string")),
        None => "",
    };

    let mut conditions = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Gt(arg.clone()),
            "$gte" => Condition::Gte(arg.clone()),
            "$lt" => Condition::Lt(arg.clone()),
            "$lte" => Condition::Lte(arg.clone()),
            "$in" => Condition::In(array_arg(op, arg)?),
            "$nin" => Condition::Nin(array_arg(op, arg)?),
            "$all" => Condition::All(array_arg(op, arg)?),
            "$exists" => Condition::Exists(
                arg.as_bool()
                    .ok_or_else(|| invalid("'$exists' expects a boolean"))?,
            ),
            "$size" => Condition::Size(
                arg.as_u64()
                    .ok_or_else(|| invalid("'$size' expects a non-negative integer"))?
                    as usize,
            ),
            "$mod" => parse_mod(arg)?,
            "$regex" => Condition::Regex(build_regex(arg, regex_flags)?),
            "$options" => continue,
            other => return Err(invalid(format!("unknown operator '{}'", other))),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn array_arg(op: &str, arg: &Value) -> Result<Vec<Value>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| invalid(format!("'{}' expects an array", op)))
}

fn parse_mod(arg: &Value) -> Result<Condition> {
    let pair = array_arg("$mod", arg)?;
    match pair.as_slice() {
        [divisor, remainder] => {
            let divisor = divisor
                .as_i64()
                .filter(|d| *d != 0)
                .ok_or_else(|| invalid("'$mod' divisor must be a non-zero integer"))?;
            let remainder = remainder
                .as_i64()
                .ok_or_else(|| invalid("'$mod' remainder must be an integer"))?;
            Ok(Condition::Mod { divisor, remainder })
        }
        _ => Err(invalid("'$mod' expects [divisor, remainder]")),
    }
}

fn build_regex(arg: &Value, flags: &str) -> Result<Regex> {
    let pattern = arg
        .as_str()
        .ok_or_else(|| invalid("'$regex' expects a string"))?;
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| invalid(e.to_string()))
}

/// Follow a dot path through objects and array indexes
fn resolve<'a>(record: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(record, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual @ Value::Array(items)) => {
            value_eq(actual, expected) || items.iter().any(|item| value_eq(item, expected))
        }
        Some(actual) => value_eq(actual, expected),
    }
}

fn any_element(field: Option<&Value>, pred: impl Fn(&Value) -> bool) -> bool {
    match field {
        Some(Value::Array(items)) => items.iter().any(pred),
        Some(value) => pred(value),
        None => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Whether a filter specification selects every record
pub fn is_match_all(spec: Option<&Value>) -> bool {
    match spec {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}
