//! Sort keys for paginated reads.

use crate::error::{Error, Result};
use crate::registry::EntityDescriptor;

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order (A-Z, 1-9, oldest-newest)
    #[default]
    Asc,
    /// Descending order (Z-A, 9-1, newest-oldest)
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// What a sort key orders by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    /// Insertion order
    CreatedAt,
    Property(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: OrderDirection,
}

impl SortKey {
    pub fn new(field: SortField, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(SortField::Property(property.into()), OrderDirection::Asc)
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(SortField::Property(property.into()), OrderDirection::Desc)
    }

    /// Parse a field name as exposed over the wire.
    pub fn parse(field: &str, direction: OrderDirection) -> Self {
        let field = match field {
            "createdAt" => SortField::CreatedAt,
            other => SortField::Property(other.to_string()),
        };
        Self::new(field, direction)
    }
}

/// Reject keys naming unknown or unsortable properties.
pub fn check_sort(entity: &EntityDescriptor, sort: &[SortKey]) -> Result<()> {
    for key in sort {
        let SortField::Property(name) = &key.field else {
            continue;
        };
        let property = entity
            .get_property(name)
            .ok_or_else(|| Error::UnknownProperty {
                entity: entity.name().to_string(),
                property: name.clone(),
            })?;
        if !property.is_sortable() {
            return Err(Error::NotSortable {
                entity: entity.name().to_string(),
                property: name.clone(),
            });
        }
    }
    Ok(())
}
