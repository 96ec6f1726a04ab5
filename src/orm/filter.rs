//! Filter expressions: property name -> operator bag -> operand.
//!
//! Operator names are part of the wire contract and must match exactly:
//! `eq, notEq, in, notIn, contains, notContains, regex, notRegex, gt, gte,
//! lt, lte, exists`. Operators in one bag are ANDed, and so are fields.
//! An empty expression matches every document.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// A filter operator from the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    NotEq,
    In,
    NotIn,
    Contains,
    NotContains,
    Regex,
    NotRegex,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 13] = [
        FilterOperator::Eq,
        FilterOperator::NotEq,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::Contains,
        FilterOperator::NotContains,
        FilterOperator::Regex,
        FilterOperator::NotRegex,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Exists,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::NotEq => "notEq",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "notIn",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "notContains",
            FilterOperator::Regex => "regex",
            FilterOperator::NotRegex => "notRegex",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Exists => "exists",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or(())
    }
}

/// Operators applied to one field, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorBag {
    operators: Vec<(FilterOperator, Value)>,
}

impl OperatorBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, operator: FilterOperator, operand: impl Into<Value>) -> Self {
        self.operators.push((operator, operand.into()));
        self
    }

    pub fn eq(self, v: impl Into<Value>) -> Self {
        self.with(FilterOperator::Eq, v)
    }

    pub fn not_eq(self, v: impl Into<Value>) -> Self {
        self.with(FilterOperator::NotEq, v)
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.with(FilterOperator::In, list)
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        let list: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.with(FilterOperator::NotIn, list)
    }

    pub fn contains(self, sub: impl Into<String>) -> Self {
        self.with(FilterOperator::Contains, sub.into())
    }

    pub fn not_contains(self, sub: impl Into<String>) -> Self {
        self.with(FilterOperator::NotContains, sub.into())
    }

    pub fn regex(self, pattern: impl Into<String>) -> Self {
        self.with(FilterOperator::Regex, pattern.into())
    }

    pub fn not_regex(self, pattern: impl Into<String>) -> Self {
        self.with(FilterOperator::NotRegex, pattern.into())
    }

    pub fn gt(self, v: impl Into<Value>) -> Self {
        self.with(FilterOperator::Gt, v)
    }

    pub fn gte(self, v: impl Into<Value>) -> Self {
        self.with(FilterOperator::Gte, v)
    }

    pub fn lt(self, v: impl Into<Value>) -> Self {
        self.with(FilterOperator::Lt, v)
    }

    pub fn lte(self, v: impl Into<Value>) -> Self {
        self.with(FilterOperator::Lte, v)
    }

    pub fn exists(self, present: bool) -> Self {
        self.with(FilterOperator::Exists, present)
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterOperator, &Value)> {
        self.operators.iter().map(|(op, v)| (*op, v))
    }
}

/// Field -> operator bag mapping, ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    fields: Vec<(String, OperatorBag)>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, bag: OperatorBag) -> Self {
        self.fields.push((name.into(), bag));
        self
    }

    /// True when no field contributes a constraint.
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, bag)| bag.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OperatorBag)> {
        self.fields.iter().map(|(name, bag)| (name.as_str(), bag))
    }

    /// Parse the JSON wire form, e.g. `{"numberOfOrders": {"gt": 10, "lt": 20}}`.
    ///
    /// `null` is the empty filter and a `null` bag contributes nothing.
    /// Unknown operator names fail with `InvalidFilterOperator`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let fields = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(fields) => fields,
            other => {
                return Err(Error::invalid_value(
                    "filter",
                    "filter",
                    format!("expected an object, got {}", json_kind(other)),
                ));
            }
        };

        let mut expression = Self::default();
        for (field, bag) in fields {
            let operators = match bag {
                Value::Null => continue,
                Value::Object(operators) => operators,
                other => {
                    return Err(Error::invalid_value(
                        field.as_str(),
                        "filter",
                        format!("expected an operator object, got {}", json_kind(other)),
                    ));
                }
            };

            let mut parsed = OperatorBag::new();
            for (name, operand) in operators {
                let operator: FilterOperator =
                    name.parse().map_err(|_| Error::InvalidFilterOperator {
                        field: field.clone(),
                        operator: name.clone(),
                    })?;
                parsed = parsed.with(operator, operand.clone());
            }
            expression = expression.field(field.clone(), parsed);
        }
        Ok(expression)
    }
}

impl TryFrom<&Value> for FilterExpression {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Self::from_json(value)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
