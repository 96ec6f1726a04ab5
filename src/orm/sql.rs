//! Rendering of compiled queries into parameterized SQLite fragments.
//!
//! Documents live in a `doc` TEXT column holding a JSON object. Every
//! property condition is guarded by `json_type` so values of another JSON type
//! never match, and negated operators are wrapped in `NOT COALESCE(.., 0)` so a
//! missing or null property satisfies them.

use super::query::{Comparison, Condition, Constraint, FieldPath, Scalar, StoreQuery};
use super::sort::{SortField, SortKey};

/// Represents a SQL value that can be bound to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
}

impl SqlValue {
    /// Bind this value to a sqlx query builder
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
        }
    }

    /// Same as [`bind_to_query`](Self::bind_to_query) for scalar queries.
    pub fn bind_to_scalar<'q, O>(
        &'q self,
        query: sqlx::query::QueryScalar<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::QueryScalar<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
        }
    }
}

/// Value and JSON type expressions for a field.
struct Column {
    value: String,
    json_type: String,
}

impl Column {
    fn of(field: &FieldPath) -> Self {
        match field {
            FieldPath::Id => Self {
                value: "id".to_string(),
                json_type: "'text'".to_string(),
            },
            FieldPath::Property(name) => Self {
                value: format!("json_extract(doc, '$.{}')", name),
                json_type: format!("json_type(doc, '$.{}')", name),
            },
        }
    }

    fn is_null(&self) -> String {
        format!("({t} IS NULL OR {t} = 'null')", t = self.json_type)
    }

    fn is_present(&self) -> String {
        format!("({t} IS NOT NULL AND {t} != 'null')", t = self.json_type)
    }

    fn is_number(&self) -> String {
        format!("{} IN ('integer', 'real')", self.json_type)
    }

    fn is_text(&self) -> String {
        format!("{} = 'text'", self.json_type)
    }
}

impl StoreQuery {
    /// WHERE fragments, ANDed by the caller, with values in placeholder order.
    pub fn to_sql_conditions(&self) -> (Vec<String>, Vec<SqlValue>) {
        let mut conditions = Vec::with_capacity(self.constraints().len());
        let mut values = Vec::new();
        for constraint in self.constraints() {
            conditions.push(render_constraint(constraint, &mut values));
        }
        (conditions, values)
    }

    /// Full ` WHERE ...` clause, or an empty string for a match-all query.
    pub fn to_where_sql(&self) -> (String, Vec<SqlValue>) {
        let (conditions, values) = self.to_sql_conditions();
        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

fn render_constraint(constraint: &Constraint, values: &mut Vec<SqlValue>) -> String {
    let column = Column::of(&constraint.field);
    match &constraint.condition {
        Condition::Eq(v) => eq(&column, v, values),
        Condition::NotEq(v) => negate(&eq(&column, v, values)),
        Condition::In(list) => any_of(&column, list, values),
        Condition::NotIn(list) => negate(&any_of(&column, list, values)),
        Condition::Contains(sub) => contains(&column, sub, values),
        Condition::NotContains(sub) => negate(&contains(&column, sub, values)),
        Condition::Regex(pattern) => regex(&column, pattern, values),
        Condition::NotRegex(pattern) => negate(&regex(&column, pattern, values)),
        Condition::Compare(op, bound) => compare(&column, *op, bound, values),
        Condition::Exists(true) => column.is_present(),
        Condition::Exists(false) => column.is_null(),
    }
}

fn negate(condition: &str) -> String {
    format!("NOT COALESCE(({}), 0)", condition)
}

fn eq(column: &Column, value: &Scalar, values: &mut Vec<SqlValue>) -> String {
    match value {
        Scalar::Null => column.is_null(),
        Scalar::Bool(true) => format!("{} = 'true'", column.json_type),
        Scalar::Bool(false) => format!("{} = 'false'", column.json_type),
        Scalar::Int(i) => {
            values.push(SqlValue::Int(*i));
            format!("({} AND {} = ?)", column.is_number(), column.value)
        }
        Scalar::Float(f) => {
            values.push(SqlValue::Float(*f));
            format!("({} AND {} = ?)", column.is_number(), column.value)
        }
        Scalar::Text(s) => {
            values.push(SqlValue::String(s.clone()));
            format!("({} AND {} = ?)", column.is_text(), column.value)
        }
    }
}

fn any_of(column: &Column, list: &[Scalar], values: &mut Vec<SqlValue>) -> String {
    if list.is_empty() {
        return "0".to_string();
    }
    let alternatives: Vec<String> = list.iter().map(|v| eq(column, v, values)).collect();
    format!("({})", alternatives.join(" OR "))
}

fn contains(column: &Column, sub: &str, values: &mut Vec<SqlValue>) -> String {
    values.push(SqlValue::String(sub.to_string()));
    format!("({} AND instr({}, ?) > 0)", column.is_text(), column.value)
}

fn regex(column: &Column, pattern: &str, values: &mut Vec<SqlValue>) -> String {
    values.push(SqlValue::String(pattern.to_string()));
    format!("({} AND {} REGEXP ?)", column.is_text(), column.value)
}

fn compare(column: &Column, op: Comparison, bound: &Scalar, values: &mut Vec<SqlValue>) -> String {
    let guard = match bound {
        Scalar::Int(i) => {
            values.push(SqlValue::Int(*i));
            column.is_number()
        }
        Scalar::Float(f) => {
            values.push(SqlValue::Float(*f));
            column.is_number()
        }
        Scalar::Text(s) => {
            values.push(SqlValue::String(s.clone()));
            column.is_text()
        }
        // Rejected by the compiler.
        Scalar::Null | Scalar::Bool(_) => return "0".to_string(),
    };
    format!("({} AND {} {} ?)", guard, column.value, op.to_sql())
}

/// ORDER BY clause: requested keys, then insertion order as the tie breaker.
pub fn order_by_sql(sort: &[SortKey]) -> String {
    let mut clauses: Vec<String> = sort
        .iter()
        .map(|key| {
            let column = match &key.field {
                SortField::CreatedAt => "seq".to_string(),
                SortField::Property(name) => format!("json_extract(doc, '$.{}')", name),
            };
            format!("{} {}", column, key.direction.to_sql())
        })
        .collect();
    clauses.push("seq ASC".to_string());
    format!(" ORDER BY {}", clauses.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::sort::OrderDirection;
    use pretty_assertions::assert_eq;

    fn prop(name: &str) -> FieldPath {
        FieldPath::Property(name.to_string())
    }

    #[test]
    fn test_interval_renders_guarded_comparisons() {
        let query = StoreQuery::match_all()
            .and(prop("n"), Condition::Compare(Comparison::Gt, Scalar::Int(10)))
            .and(prop("n"), Condition::Compare(Comparison::Lt, Scalar::Int(20)));
        let (conditions, values) = query.to_sql_conditions();
        assert_eq!(
            conditions,
            vec![
                "(json_type(doc, '$.n') IN ('integer', 'real') AND json_extract(doc, '$.n') > ?)",
                "(json_type(doc, '$.n') IN ('integer', 'real') AND json_extract(doc, '$.n') < ?)",
            ]
        );
        assert_eq!(values, vec![SqlValue::Int(10), SqlValue::Int(20)]);
    }

    #[test]
    fn test_negation_tolerates_missing() {
        let query = StoreQuery::match_all().and(prop("n"), Condition::NotEq(Scalar::Int(20)));
        let (conditions, _) = query.to_sql_conditions();
        assert_eq!(
            conditions[0],
            "NOT COALESCE(((json_type(doc, '$.n') IN ('integer', 'real') AND json_extract(doc, '$.n') = ?)), 0)"
        );
    }

    #[test]
    fn test_empty_lists() {
        let query = StoreQuery::match_all()
            .and(prop("n"), Condition::In(vec![]))
            .and(prop("n"), Condition::NotIn(vec![]));
        let (conditions, values) = query.to_sql_conditions();
        assert_eq!(conditions, vec!["0", "NOT COALESCE((0), 0)"]);
        assert!(values.is_empty());
    }

    #[test]
    fn test_id_column() {
        let query = StoreQuery::match_all().and(FieldPath::Id, Condition::Eq(Scalar::Text("a".into())));
        let (clause, values) = query.to_where_sql();
        assert_eq!(clause, " WHERE ('text' = 'text' AND id = ?)");
        assert_eq!(values, vec![SqlValue::String("a".into())]);
        assert_eq!(StoreQuery::match_all().to_where_sql().0, "");
    }

    #[test]
    fn test_order_by_appends_sequence() {
        assert_eq!(order_by_sql(&[]), " ORDER BY seq ASC");
        let sort = [SortKey::new(SortField::Property("name".into()), OrderDirection::Desc)];
        assert_eq!(
            order_by_sql(&sort),
            " ORDER BY json_extract(doc, '$.name') DESC, seq ASC"
        );
    }
}
