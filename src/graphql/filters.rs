//! Shared GraphQL operator inputs.
//!
//! Field names are the wire operator names (`eq`, `notEq`, `in`, ...), so a
//! filter argument converts to a [`FilterExpression`](crate::orm::FilterExpression)
//! without renaming. Which operators an input carries depends on the scalar:
//!
//! - `StringFilter`: every operator
//! - `IntFilter` / `FloatFilter`: equality, membership, ordering, `exists`
//! - `BooleanFilter`: `eq`, `notEq`, `exists`
//! - `IDFilter`: `eq`, `notEq`, `in`, `notIn`, `exists`

use async_graphql::dynamic::{InputObject, InputValue, TypeRef};

use crate::orm::FilterOperator;
use crate::registry::PropertyType;

pub const STRING_FILTER: &str = "StringFilter";
pub const INT_FILTER: &str = "IntFilter";
pub const FLOAT_FILTER: &str = "FloatFilter";
pub const BOOLEAN_FILTER: &str = "BooleanFilter";
pub const ID_FILTER: &str = "IDFilter";

const EQUALITY: [FilterOperator; 2] = [FilterOperator::Eq, FilterOperator::NotEq];
const MEMBERSHIP: [FilterOperator; 2] = [FilterOperator::In, FilterOperator::NotIn];
const TEXT: [FilterOperator; 4] = [
    FilterOperator::Contains,
    FilterOperator::NotContains,
    FilterOperator::Regex,
    FilterOperator::NotRegex,
];
const ORDERING: [FilterOperator; 4] = [
    FilterOperator::Gt,
    FilterOperator::Gte,
    FilterOperator::Lt,
    FilterOperator::Lte,
];

/// Operator input used for a property of type `ty`.
pub fn filter_input_for(ty: PropertyType) -> Option<&'static str> {
    match ty {
        PropertyType::String | PropertyType::DateTime => Some(STRING_FILTER),
        PropertyType::Int => Some(INT_FILTER),
        PropertyType::Float => Some(FLOAT_FILTER),
        PropertyType::Boolean => Some(BOOLEAN_FILTER),
        PropertyType::Id => Some(ID_FILTER),
        PropertyType::Json | PropertyType::Embedded => None,
    }
}

fn operator_input(name: &str, scalar: &str, operators: &[FilterOperator]) -> InputObject {
    let mut input = InputObject::new(name);
    for op in operators {
        let ty = match op {
            FilterOperator::In | FilterOperator::NotIn => TypeRef::named_list(scalar),
            FilterOperator::Exists => TypeRef::named(TypeRef::BOOLEAN),
            FilterOperator::Contains
            | FilterOperator::NotContains
            | FilterOperator::Regex
            | FilterOperator::NotRegex => TypeRef::named(TypeRef::STRING),
            _ => TypeRef::named(scalar),
        };
        input = input.field(InputValue::new(op.as_str(), ty));
    }
    input
}

/// All shared operator inputs, ready to register on a schema.
pub fn operator_inputs() -> Vec<InputObject> {
    let all = |extra: &[FilterOperator]| -> Vec<FilterOperator> {
        let mut ops = EQUALITY.to_vec();
        ops.extend(MEMBERSHIP);
        ops.extend_from_slice(extra);
        ops.push(FilterOperator::Exists);
        ops
    };

    let mut string_ops = TEXT.to_vec();
    string_ops.extend(ORDERING);

    vec![
        operator_input(STRING_FILTER, TypeRef::STRING, &all(&string_ops)),
        operator_input(INT_FILTER, TypeRef::INT, &all(&ORDERING)),
        operator_input(FLOAT_FILTER, TypeRef::FLOAT, &all(&ORDERING)),
        operator_input(
            BOOLEAN_FILTER,
            TypeRef::BOOLEAN,
            &[FilterOperator::Eq, FilterOperator::NotEq, FilterOperator::Exists],
        ),
        operator_input(ID_FILTER, TypeRef::ID, &all(&[])),
    ]
}
