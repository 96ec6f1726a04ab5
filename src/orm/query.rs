//! Filter compiler: [`FilterExpression`] -> [`StoreQuery`].
//!
//! Compilation checks every field and operand against the registry before the
//! store is touched, so a malformed filter never reaches the backing store.

use serde_json::Value;

use super::filter::{FilterExpression, FilterOperator, json_kind};
use crate::error::{Error, Result};
use crate::registry::{EntityDescriptor, PropertyType, Registry, canonical_timestamp};

/// A typed scalar operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Lists and objects have no scalar form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn is_orderable(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_) | Scalar::Text(_))
    }
}

/// Ordering comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

/// One compiled per-field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Scalar),
    NotEq(Scalar),
    In(Vec<Scalar>),
    NotIn(Vec<Scalar>),
    Contains(String),
    NotContains(String),
    Regex(String),
    NotRegex(String),
    Compare(Comparison, Scalar),
    Exists(bool),
}

/// What a condition reads: the document id or a body property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    Id,
    Property(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub field: FieldPath,
    pub condition: Condition,
}

/// Conjunction of constraints; no constraints matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreQuery {
    constraints: Vec<Constraint>,
}

impl StoreQuery {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: FieldPath, condition: Condition) -> Self {
        self.constraints.push(Constraint { field, condition });
        self
    }

    pub fn is_match_all(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

/// Compile `filter` for `entity_name`.
pub fn compile(registry: &Registry, entity_name: &str, filter: &FilterExpression) -> Result<StoreQuery> {
    let entity = registry.entity(entity_name)?;
    compile_for(entity, filter)
}

/// Compile against an already resolved entity.
pub fn compile_for(entity: &EntityDescriptor, filter: &FilterExpression) -> Result<StoreQuery> {
    let mut query = StoreQuery::match_all();

    for (field, bag) in filter.iter() {
        if bag.is_empty() {
            continue;
        }
        let (path, ty) = resolve_field(entity, field)?;
        for (operator, operand) in bag.iter() {
            let condition = compile_operator(&path, ty, field, operator, operand)?;
            query = query.and(path.clone(), condition);
        }
    }

    tracing::debug!(
        entity = entity.name(),
        constraints = query.constraints.len(),
        "Compiled filter"
    );
    Ok(query)
}

fn resolve_field(entity: &EntityDescriptor, field: &str) -> Result<(FieldPath, PropertyType)> {
    if field == "id" {
        return Ok((FieldPath::Id, PropertyType::Id));
    }
    let property = entity
        .get_property(field)
        .ok_or_else(|| Error::UnknownProperty {
            entity: entity.name().to_string(),
            property: field.to_string(),
        })?;
    if !property.is_filterable() {
        return Err(Error::NotFilterable {
            entity: entity.name().to_string(),
            property: field.to_string(),
        });
    }
    Ok((FieldPath::Property(field.to_string()), property.ty()))
}

/// DateTime operands are compared in their canonical UTC form, the same form
/// the mutation pipeline stores.
fn compile_operator(
    path: &FieldPath,
    ty: PropertyType,
    field: &str,
    operator: FilterOperator,
    operand: &Value,
) -> Result<Condition> {
    let invalid = |reason: String| Error::invalid_value(field, operator.as_str(), reason);

    if *path == FieldPath::Id
        && !matches!(
            operator,
            FilterOperator::Eq
                | FilterOperator::NotEq
                | FilterOperator::In
                | FilterOperator::NotIn
                | FilterOperator::Exists
        )
    {
        return Err(invalid("not supported on id".to_string()));
    }

    let scalar = |value: &Value| -> Result<Scalar> {
        let scalar = Scalar::from_json(value)
            .ok_or_else(|| invalid(format!("expected a scalar, got {}", json_kind(value))))?;
        match scalar {
            Scalar::Text(raw) if ty == PropertyType::DateTime => canonical_timestamp(&raw)
                .map(Scalar::Text)
                .ok_or_else(|| invalid("expected an RFC 3339 timestamp".to_string())),
            other => Ok(other),
        }
    };
    let list = |value: &Value| -> Result<Vec<Scalar>> {
        value
            .as_array()
            .ok_or_else(|| invalid(format!("expected a list, got {}", json_kind(value))))?
            .iter()
            .map(scalar)
            .collect()
    };
    let text = |value: &Value| {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("expected a string, got {}", json_kind(value))))
    };
    let pattern = |value: &Value| -> Result<String> {
        let pattern = text(value)?;
        regex::Regex::new(&pattern).map_err(|e| invalid(format!("invalid pattern: {}", e)))?;
        Ok(pattern)
    };
    let bound = |value: &Value| -> Result<Scalar> {
        let bound = scalar(value)?;
        if bound.is_orderable() {
            Ok(bound)
        } else {
            Err(invalid(format!(
                "expected a number or string, got {}",
                json_kind(value)
            )))
        }
    };

    Ok(match operator {
        FilterOperator::Eq => Condition::Eq(scalar(operand)?),
        FilterOperator::NotEq => Condition::NotEq(scalar(operand)?),
        FilterOperator::In => Condition::In(list(operand)?),
        FilterOperator::NotIn => Condition::NotIn(list(operand)?),
        FilterOperator::Contains => Condition::Contains(text(operand)?),
        FilterOperator::NotContains => Condition::NotContains(text(operand)?),
        FilterOperator::Regex => Condition::Regex(pattern(operand)?),
        FilterOperator::NotRegex => Condition::NotRegex(pattern(operand)?),
        FilterOperator::Gt => Condition::Compare(Comparison::Gt, bound(operand)?),
        FilterOperator::Gte => Condition::Compare(Comparison::Gte, bound(operand)?),
        FilterOperator::Lt => Condition::Compare(Comparison::Lt, bound(operand)?),
        FilterOperator::Lte => Condition::Compare(Comparison::Lte, bound(operand)?),
        FilterOperator::Exists => Condition::Exists(
            operand
                .as_bool()
                .ok_or_else(|| invalid(format!("expected a boolean, got {}", json_kind(operand))))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::OperatorBag;
    use crate::registry::{PropertyDescriptor, PropertyType};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::builder()
            .entity(
                crate::registry::EntityDescriptor::new("Customer")
                    .property(PropertyDescriptor::new("name", PropertyType::String))
                    .property(PropertyDescriptor::new("numberOfOrders", PropertyType::Int))
                    .property(PropertyDescriptor::new("password", PropertyType::String).hidden())
                    .property(PropertyDescriptor::new("profile", PropertyType::Json))
                    .property(PropertyDescriptor::new("joinedAt", PropertyType::DateTime)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_interval_compiles_to_two_constraints() {
        let filter = FilterExpression::new()
            .field("numberOfOrders", OperatorBag::new().gt(10).lt(20));
        let query = compile(&registry(), "Customer", &filter).unwrap();
        let path = FieldPath::Property("numberOfOrders".into());
        assert_eq!(
            query,
            StoreQuery::match_all()
                .and(path.clone(), Condition::Compare(Comparison::Gt, Scalar::Int(10)))
                .and(path, Condition::Compare(Comparison::Lt, Scalar::Int(20)))
        );
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let query = compile(&registry(), "Customer", &FilterExpression::new()).unwrap();
        assert!(query.is_match_all());
        let query = compile(
            &registry(),
            "Customer",
            &FilterExpression::new().field("name", OperatorBag::new()),
        )
        .unwrap();
        assert!(query.is_match_all());
    }

    #[test]
    fn test_operand_shapes() {
        let reg = registry();
        let bad = [
            json!({"name": {"in": "John"}}),
            json!({"name": {"contains": 3}}),
            json!({"name": {"regex": "("}}),
            json!({"name": {"exists": "yes"}}),
            json!({"name": {"eq": {"first": "J"}}}),
            json!({"numberOfOrders": {"gt": true}}),
            json!({"id": {"contains": "a"}}),
        ];
        for filter in bad {
            let filter = FilterExpression::from_json(&filter).unwrap();
            assert_matches!(
                compile(&reg, "Customer", &filter),
                Err(Error::InvalidFilterValue { .. }),
                "{:?}",
                filter
            );
        }
    }

    #[test]
    fn test_unknown_and_unfilterable_fields() {
        let reg = registry();
        let filter = FilterExpression::new().field("age", OperatorBag::new().eq(3));
        assert_matches!(
            compile(&reg, "Customer", &filter),
            Err(Error::UnknownProperty { property, .. }) if property == "age"
        );
        for field in ["password", "profile"] {
            let filter = FilterExpression::new().field(field, OperatorBag::new().exists(true));
            assert_matches!(
                compile(&reg, "Customer", &filter),
                Err(Error::NotFilterable { .. })
            );
        }
    }

    #[test]
    fn test_id_filter() {
        let filter = FilterExpression::new().field("id", OperatorBag::new().in_list(["a", "b"]));
        let query = compile(&registry(), "Customer", &filter).unwrap();
        assert_eq!(
            query.constraints()[0].condition,
            Condition::In(vec![Scalar::Text("a".into()), Scalar::Text("b".into())])
        );
        assert_eq!(query.constraints()[0].field, FieldPath::Id);
    }

    #[test]
    fn test_datetime_operands_are_canonical() {
        let filter = FilterExpression::from_json(&json!({
            "joinedAt": {
                "gte": "2024-01-01T10:00:00+05:00",
                "in": ["2024-03-01T00:00:00.5Z"],
                "contains": "2024-01",
            },
        }))
        .unwrap();
        let query = compile(&registry(), "Customer", &filter).unwrap();
        let conditions: Vec<&Condition> = query.constraints().iter().map(|c| &c.condition).collect();
        assert_eq!(
            conditions,
            vec![
                &Condition::Compare(
                    Comparison::Gte,
                    Scalar::Text("2024-01-01T05:00:00.000Z".into())
                ),
                &Condition::In(vec![Scalar::Text("2024-03-01T00:00:00.500Z".into())]),
                &Condition::Contains("2024-01".into()),
            ]
        );

        let filter = FilterExpression::from_json(&json!({"joinedAt": {"lt": "yesterday"}})).unwrap();
        assert_matches!(
            compile(&registry(), "Customer", &filter),
            Err(Error::InvalidFilterValue { .. })
        );
    }
}
