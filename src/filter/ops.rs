use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use super::json_type_name;
use crate::error::{PubSubError, Result};

/// Одна проверка поля.
#[derive(Debug, Clone)]
pub enum Op {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Not(Vec<Op>),
}

/// Компилирует правую часть условия на поле.
///
/// Объект, все ключи которого начинаются с `$`, является документом
/// операторов; любое другое значение (включая обычные объекты) проверяется
/// на равенство.
pub(super) fn compile_field(value: &Value) -> Result<Vec<Op>> {
    let Value::Object(map) = value else {
        return Ok(vec![Op::Eq(value.clone())]);
    };

    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        return Ok(vec![Op::Eq(value.clone())]);
    }
    if operators != map.len() {
        return Err(PubSubError::invalid_filter(
            "cannot mix operators and plain fields in one clause",
        ));
    }

    map.iter()
        .map(|(name, operand)| compile_op(name, operand))
        .collect()
}

fn compile_op(
    name: &str,
    operand: &Value,
) -> Result<Op> {
    let op = match name {
        "$eq" => Op::Eq(operand.clone()),
        "$ne" => Op::Ne(operand.clone()),
        "$gt" => Op::Gt(operand.clone()),
        "$gte" => Op::Gte(operand.clone()),
        "$lt" => Op::Lt(operand.clone()),
        "$lte" => Op::Lte(operand.clone()),
        "$in" => Op::In(expect_array(name, operand)?),
        "$nin" => Op::Nin(expect_array(name, operand)?),
        "$exists" => match operand {
            Value::Bool(b) => Op::Exists(*b),
            other => {
                return Err(PubSubError::invalid_filter(format!(
                    "'$exists' expects a boolean, got {}",
                    json_type_name(other)
                )));
            }
        },
        "$regex" => match operand {
            Value::String(pattern) => Op::Regex(Regex::new(pattern)?),
            other => {
                return Err(PubSubError::invalid_filter(format!(
                    "'$regex' expects a string, got {}",
                    json_type_name(other)
                )));
            }
        },
        "$not" => Op::Not(compile_field(operand)?),
        unknown => {
            return Err(PubSubError::invalid_filter(format!(
                "unknown operator '{unknown}'"
            )));
        }
    };
    Ok(op)
}

fn expect_array(
    name: &str,
    operand: &Value,
) -> Result<Vec<Value>> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        other => Err(PubSubError::invalid_filter(format!(
            "'{name}' expects an array, got {}",
            json_type_name(other)
        ))),
    }
}

impl Op {
    /// Проверяет найденное поле; `None` означает, что поля нет.
    pub fn test(
        &self,
        field: Option<&Value>,
    ) -> bool {
        match self {
            Op::Eq(expected) => equals(field, expected),
            Op::Ne(expected) => !equals(field, expected),
            Op::Gt(bound) => any_value(field, |v| compare(v, bound) == Some(Ordering::Greater)),
            Op::Gte(bound) => any_value(field, |v| {
                matches!(compare(v, bound), Some(Ordering::Greater | Ordering::Equal))
            }),
            Op::Lt(bound) => any_value(field, |v| compare(v, bound) == Some(Ordering::Less)),
            Op::Lte(bound) => any_value(field, |v| {
                matches!(compare(v, bound), Some(Ordering::Less | Ordering::Equal))
            }),
            Op::In(candidates) => candidates.iter().any(|c| equals(field, c)),
            Op::Nin(candidates) => !candidates.iter().any(|c| equals(field, c)),
            Op::Exists(expected) => field.is_some() == *expected,
            Op::Regex(regex) => any_value(field, |v| v.as_str().is_some_and(|s| regex.is_match(s))),
            Op::Not(ops) => !ops.iter().all(|op| op.test(field)),
        }
    }
}

/// Равенство с семантикой вхождения в массив; `null` совпадает и с
/// отсутствующим полем.
fn equals(
    field: Option<&Value>,
    expected: &Value,
) -> bool {
    match field {
        None => expected.is_null(),
        Some(value) if same_value(value, expected) => true,
        Some(Value::Array(items)) => items.iter().any(|item| same_value(item, expected)),
        Some(_) => false,
    }
}

/// Глубокое равенство, где числа сравниваются по значению: `1` равно `1.0`.
fn same_value(
    left: &Value,
    right: &Value,
) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare(left, right) == Some(Ordering::Equal),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| same_value(x, y)))
        }
        _ => left == right,
    }
}

/// Применяет `test` к полю или к любому элементу, если поле является
/// массивом.
fn any_value(
    field: Option<&Value>,
    test: impl Fn(&Value) -> bool,
) -> bool {
    match field {
        None => false,
        Some(Value::Array(items)) => items.iter().any(&test),
        Some(value) => test(value),
    }
}

/// Числа сравниваются численно, строки лексикографически; остальные пары
/// несравнимы.
fn compare(
    left: &Value,
    right: &Value,
) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
