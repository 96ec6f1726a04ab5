//! Dynamic schema generated from the property registry.
//!
//! For every entity `E` (plural `Es`):
//!
//! - `type E`, `type EPage`
//! - `input CreateEInput`, `input UpdateEInput`, `input EFilter`, `input ESort`
//! - `enum ESortField`
//! - `Query.paginateEs(page, limit, filter, sort)`, `Query.e(id)`
//! - `Mutation.createE(input)`, `Mutation.updateE(id, input)`
//!
//! An embedded entity `A` becomes `type A` (no id or timestamps) and
//! `input AInput`, used wherever a property embeds it.

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object,
    ResolverContext, Scalar, Schema, SchemaError, TypeRef,
};
use async_graphql::{ErrorExtensions, Value as GqlValue};
use serde_json::Value;

use super::filters::{ID_FILTER, filter_input_for, operator_inputs};
use crate::engine::Engine;
use crate::error::Error;
use crate::orm::Scalar as QueryScalar;
use crate::orm::{
    Condition, FieldPath, FilterExpression, OrderDirection, PageRequest, PageResult, SortKey,
    StoreQuery,
};
use crate::registry::{EntityDescriptor, PropertyDescriptor, Relation, RelationKind, RequestContext};
use crate::store::Document;

pub const JSON_SCALAR: &str = "JSON";
const SORT_DIRECTION: &str = "SortDirection";

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| {
            ext.set("code", self.code());
            match self {
                Error::Validation { property, .. }
                | Error::UnknownProperty { property, .. }
                | Error::NotFilterable { property, .. }
                | Error::NotSortable { property, .. }
                | Error::HookFailed { property, .. } => ext.set("property", property.as_str()),
                Error::InvalidFilterOperator { field, .. }
                | Error::InvalidFilterValue { field, .. } => ext.set("property", field.as_str()),
                _ => {}
            }
        })
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn property_type(property: &PropertyDescriptor, non_null: bool, input: bool) -> TypeRef {
    let name = match property.embedded_entity() {
        Some(target) if input => format!("{}Input", target),
        Some(target) => target.to_string(),
        None => property.ty().graphql_name().to_string(),
    };
    match (property.is_list(), non_null) {
        (true, true) => TypeRef::named_list_nn(name),
        (true, false) => TypeRef::named_list(name),
        (false, true) => TypeRef::named_nn(name),
        (false, false) => TypeRef::named(name),
    }
}

/// JSON -> GraphQL output; null and missing are both GraphQL null.
fn output_value<'a>(value: Option<&Value>) -> async_graphql::Result<Option<FieldValue<'a>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(FieldValue::value(GqlValue::from_json(value.clone())?))),
    }
}

/// Embedded documents resolve as objects so their own fields can be selected.
fn embedded_value<'a>(value: Option<&Value>) -> Option<FieldValue<'a>> {
    match value? {
        Value::Object(doc) => Some(FieldValue::owned_any(doc.clone())),
        Value::Array(items) => Some(FieldValue::list(items.iter().map(|item| match item {
            Value::Object(doc) => FieldValue::owned_any(doc.clone()),
            _ => FieldValue::NULL,
        }))),
        _ => None,
    }
}

fn request_context(ctx: &ResolverContext<'_>) -> RequestContext {
    ctx.data_opt::<RequestContext>().cloned().unwrap_or_default()
}

/// Read an optional argument as JSON, treating an explicit null like absence.
fn json_arg(ctx: &ResolverContext<'_>, name: &str) -> async_graphql::Result<Option<Value>> {
    match ctx.args.get(name) {
        Some(arg) if !arg.is_null() => Ok(Some(arg.as_value().clone().into_json()?)),
        _ => Ok(None),
    }
}

fn document_arg(ctx: &ResolverContext<'_>, name: &str) -> async_graphql::Result<Document> {
    match json_arg(ctx, name)? {
        Some(Value::Object(doc)) => Ok(doc),
        _ => Err(async_graphql::Error::new(format!("`{}` must be an object", name))),
    }
}

fn page_request(ctx: &ResolverContext<'_>) -> async_graphql::Result<PageRequest> {
    let mut request = PageRequest::new();
    if let Some(page) = ctx.args.get("page").filter(|v| !v.is_null()) {
        request = request.page(page.i64()?);
    }
    if let Some(limit) = ctx.args.get("limit").filter(|v| !v.is_null()) {
        request = request.limit(limit.i64()?);
    }
    if let Some(sort) = ctx.args.get("sort").filter(|v| !v.is_null()) {
        for key in sort.list()?.iter() {
            let key = key.object()?;
            let field = key.try_get("field")?.enum_name()?.to_string();
            let direction = match key.get("direction").filter(|v| !v.is_null()) {
                Some(d) if d.enum_name()? == "Desc" => OrderDirection::Desc,
                _ => OrderDirection::Asc,
            };
            request = request.sort(SortKey::parse(&field, direction));
        }
    }
    Ok(request)
}

fn entity_object(entity: &EntityDescriptor) -> Object {
    let mut object = Object::new(entity.name());
    if !entity.is_embedded() {
        object = object.field(Field::new("id", TypeRef::named_nn(TypeRef::ID), |ctx| {
            FieldFuture::new(async move {
                let doc = ctx.parent_value.try_downcast_ref::<Document>()?;
                output_value(doc.get("id"))
            })
        }));
    }

    let visible = entity
        .properties()
        .iter()
        .filter(|p| !p.is_hidden())
        .map(|p| {
            let embedded = p.embedded_entity().is_some();
            (p.name().to_string(), property_type(p, false, false), embedded)
        });
    let system = ["createdAt", "updatedAt"]
        .into_iter()
        .filter(|_| !entity.is_embedded())
        .map(|name| (name.to_string(), TypeRef::named_nn(TypeRef::STRING), false));
    let outputs = entity
        .outputs()
        .iter()
        .map(|o| (o.name().to_string(), TypeRef::named(o.ty().graphql_name()), false));

    for (name, ty, embedded) in visible.chain(system).chain(outputs) {
        let key = name.clone();
        object = object.field(Field::new(name, ty, move |ctx| {
            let key = key.clone();
            FieldFuture::new(async move {
                let doc = ctx.parent_value.try_downcast_ref::<Document>()?;
                if embedded {
                    Ok(embedded_value(doc.get(&key)))
                } else {
                    output_value(doc.get(&key))
                }
            })
        }));
    }

    for relation in entity.relations() {
        object = object.field(relation_field(relation));
    }
    object
}

fn relation_field(relation: &Relation) -> Field {
    let ty = if relation.kind.is_multiple() {
        TypeRef::named_nn_list_nn(relation.target.as_str())
    } else {
        TypeRef::named(relation.target.as_str())
    };
    let relation = relation.clone();

    Field::new(relation.field_name.clone(), ty, move |ctx| {
        let relation = relation.clone();
        FieldFuture::new(async move {
            let engine = ctx.data::<Engine>()?;
            let request = request_context(&ctx);
            let parent = ctx.parent_value.try_downcast_ref::<Document>()?;
            let target = relation.target.as_str();

            let docs = match relation.kind {
                RelationKind::BelongsTo => {
                    let Some(id) = parent.get(&relation.key).and_then(Value::as_str) else {
                        return Ok(None);
                    };
                    let doc = engine
                        .find_by_id(target, id, &request)
                        .await
                        .map_err(|e| e.extend())?;
                    return Ok(doc.map(FieldValue::owned_any));
                }
                RelationKind::ReferencesMany => {
                    let ids: Vec<QueryScalar> = parent
                        .get(&relation.key)
                        .and_then(Value::as_array)
                        .map(|ids| {
                            ids.iter()
                                .filter_map(Value::as_str)
                                .map(|id| QueryScalar::Text(id.to_string()))
                                .collect()
                        })
                        .unwrap_or_default();
                    let query = StoreQuery::match_all().and(FieldPath::Id, Condition::In(ids));
                    engine.find_all(target, &query, &[], &request).await
                }
                RelationKind::HasOne | RelationKind::HasMany => {
                    let Some(id) = parent.get("id").and_then(Value::as_str) else {
                        return Ok(None);
                    };
                    let query = StoreQuery::match_all().and(
                        FieldPath::Property(relation.key.clone()),
                        Condition::Eq(QueryScalar::Text(id.to_string())),
                    );
                    engine.find_all(target, &query, &[], &request).await
                }
            }
            .map_err(|e| e.extend())?;

            if relation.kind.is_multiple() {
                Ok(Some(FieldValue::list(docs.into_iter().map(FieldValue::owned_any))))
            } else {
                Ok(docs.into_iter().next().map(FieldValue::owned_any))
            }
        })
    })
}

fn page_object(entity: &EntityDescriptor) -> Object {
    let page_type = format!("{}Page", entity.name());
    let docs = Field::new(
        "docs",
        TypeRef::named_nn_list_nn(entity.name()),
        |ctx| {
            FieldFuture::new(async move {
                let page = ctx.parent_value.try_downcast_ref::<PageResult<Document>>()?;
                Ok(Some(FieldValue::list(
                    page.docs.iter().cloned().map(FieldValue::owned_any),
                )))
            })
        },
    );

    let mut object = Object::new(page_type).field(docs);
    let meta: [(&str, TypeRef, fn(&PageResult<Document>) -> GqlValue); 8] = [
        ("totalDocs", TypeRef::named_nn(TypeRef::INT), |p| p.total_docs.into()),
        ("totalPages", TypeRef::named_nn(TypeRef::INT), |p| p.total_pages.into()),
        ("page", TypeRef::named_nn(TypeRef::INT), |p| p.page.into()),
        ("limit", TypeRef::named_nn(TypeRef::INT), |p| p.limit.into()),
        ("hasPrevPage", TypeRef::named_nn(TypeRef::BOOLEAN), |p| p.has_prev_page.into()),
        ("hasNextPage", TypeRef::named_nn(TypeRef::BOOLEAN), |p| p.has_next_page.into()),
        ("prevPage", TypeRef::named(TypeRef::INT), |p| {
            p.prev_page.map_or(GqlValue::Null, GqlValue::from)
        }),
        ("nextPage", TypeRef::named(TypeRef::INT), |p| {
            p.next_page.map_or(GqlValue::Null, GqlValue::from)
        }),
    ];
    for (name, ty, read) in meta {
        object = object.field(Field::new(name, ty, move |ctx| {
            FieldFuture::new(async move {
                let page = ctx.parent_value.try_downcast_ref::<PageResult<Document>>()?;
                match read(page) {
                    GqlValue::Null => Ok(None),
                    value => Ok(Some(FieldValue::value(value))),
                }
            })
        }));
    }
    object
}

fn create_input(entity: &EntityDescriptor) -> InputObject {
    let mut input = InputObject::new(format!("Create{}Input", entity.name()));
    for property in entity.properties() {
        let non_null = property.is_required() && !property.has_create_default();
        input = input.field(InputValue::new(
            property.name(),
            property_type(property, non_null, true),
        ));
    }
    input
}

fn embedded_input(entity: &EntityDescriptor) -> InputObject {
    let mut input = InputObject::new(format!("{}Input", entity.name()));
    for property in entity.properties() {
        let non_null = property.is_required() && !property.has_create_default();
        input = input.field(InputValue::new(
            property.name(),
            property_type(property, non_null, true),
        ));
    }
    input
}

fn update_input(entity: &EntityDescriptor) -> InputObject {
    entity.properties().iter().fold(
        InputObject::new(format!("Update{}Input", entity.name())),
        |input, property| {
            input.field(InputValue::new(property.name(), property_type(property, false, true)))
        },
    )
}

fn filter_input(entity: &EntityDescriptor) -> InputObject {
    let mut input = InputObject::new(format!("{}Filter", entity.name()))
        .field(InputValue::new("id", TypeRef::named(ID_FILTER)));
    for property in entity.properties().iter().filter(|p| p.is_filterable()) {
        if let Some(operators) = filter_input_for(property.ty()) {
            input = input.field(InputValue::new(property.name(), TypeRef::named(operators)));
        }
    }
    input
}

fn sort_types(entity: &EntityDescriptor) -> (Enum, InputObject) {
    let field_enum = format!("{}SortField", entity.name());
    let items = std::iter::once("createdAt").chain(
        entity
            .properties()
            .iter()
            .filter(|p| p.is_sortable())
            .map(|p| p.name()),
    );
    let fields = Enum::new(field_enum.as_str()).items(items.map(EnumItem::new));
    let sort = InputObject::new(format!("{}Sort", entity.name()))
        .field(InputValue::new("field", TypeRef::named_nn(field_enum)))
        .field(InputValue::new("direction", TypeRef::named(SORT_DIRECTION)));
    (fields, sort)
}

fn paginate_field(entity: &EntityDescriptor) -> Field {
    let name = entity.name().to_string();
    Field::new(
        format!("paginate{}", entity.plural_name()),
        TypeRef::named_nn(format!("{}Page", entity.name())),
        move |ctx| {
            let name = name.clone();
            FieldFuture::new(async move {
                let engine = ctx.data::<Engine>()?;
                let filter = match json_arg(&ctx, "filter")? {
                    Some(filter) => FilterExpression::from_json(&filter).map_err(|e| e.extend())?,
                    None => FilterExpression::new(),
                };
                let request = page_request(&ctx)?;
                let page = engine
                    .paginate(&name, &filter, &request, &request_context(&ctx))
                    .await
                    .map_err(|e| e.extend())?;
                Ok(Some(FieldValue::owned_any(page)))
            })
        },
    )
    .argument(InputValue::new("page", TypeRef::named(TypeRef::INT)))
    .argument(InputValue::new("limit", TypeRef::named(TypeRef::INT)))
    .argument(InputValue::new(
        "filter",
        TypeRef::named(format!("{}Filter", entity.name())),
    ))
    .argument(InputValue::new(
        "sort",
        TypeRef::named_nn_list(format!("{}Sort", entity.name())),
    ))
}

fn find_field(entity: &EntityDescriptor) -> Field {
    let name = entity.name().to_string();
    Field::new(lower_first(entity.name()), TypeRef::named(entity.name()), move |ctx| {
        let name = name.clone();
        FieldFuture::new(async move {
            let engine = ctx.data::<Engine>()?;
            let id = ctx.args.try_get("id")?.string()?.to_string();
            let doc = engine
                .find_by_id(&name, &id, &request_context(&ctx))
                .await
                .map_err(|e| e.extend())?;
            Ok(doc.map(FieldValue::owned_any))
        })
    })
    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
}

fn create_field(entity: &EntityDescriptor) -> Field {
    let name = entity.name().to_string();
    Field::new(
        format!("create{}", entity.name()),
        TypeRef::named_nn(entity.name()),
        move |ctx| {
            let name = name.clone();
            FieldFuture::new(async move {
                let engine = ctx.data::<Engine>()?;
                let input = document_arg(&ctx, "input")?;
                let doc = engine
                    .create(&name, input, &request_context(&ctx))
                    .await
                    .map_err(|e| e.extend())?;
                Ok(Some(FieldValue::owned_any(doc)))
            })
        },
    )
    .argument(InputValue::new(
        "input",
        TypeRef::named_nn(format!("Create{}Input", entity.name())),
    ))
}

fn update_field(entity: &EntityDescriptor) -> Field {
    let name = entity.name().to_string();
    Field::new(
        format!("update{}", entity.name()),
        TypeRef::named_nn(entity.name()),
        move |ctx| {
            let name = name.clone();
            FieldFuture::new(async move {
                let engine = ctx.data::<Engine>()?;
                let id = ctx.args.try_get("id")?.string()?.to_string();
                let input = document_arg(&ctx, "input")?;
                let doc = engine
                    .update(&name, &id, input, &request_context(&ctx))
                    .await
                    .map_err(|e| e.extend())?;
                Ok(Some(FieldValue::owned_any(doc)))
            })
        },
    )
    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
    .argument(InputValue::new(
        "input",
        TypeRef::named_nn(format!("Update{}Input", entity.name())),
    ))
}

/// Build the schema for every entity in the engine's registry.
///
/// The engine is stored as schema data; resolvers read the caller's
/// [`RequestContext`] from request data and fall back to an anonymous one.
pub fn build_schema(engine: Engine) -> Result<Schema, SchemaError> {
    let registry = engine.registry().clone();

    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");
    let mut builder = Schema::build("Query", Some("Mutation"), None)
        .register(Scalar::new(JSON_SCALAR))
        .register(Enum::new(SORT_DIRECTION).items([EnumItem::new("Asc"), EnumItem::new("Desc")]));
    for input in operator_inputs() {
        builder = builder.register(input);
    }

    for entity in registry.embedded_entities() {
        builder = builder
            .register(entity_object(entity))
            .register(embedded_input(entity));
    }

    for entity in registry.entities() {
        let (sort_field, sort) = sort_types(entity);
        builder = builder
            .register(entity_object(entity))
            .register(page_object(entity))
            .register(create_input(entity))
            .register(update_input(entity))
            .register(filter_input(entity))
            .register(sort_field)
            .register(sort);

        query = query.field(paginate_field(entity)).field(find_field(entity));
        mutation = mutation
            .field(create_field(entity))
            .field(update_field(entity));
    }

    tracing::info!(entities = registry.entities().count(), "GraphQL schema built");
    builder.register(query).register(mutation).data(engine).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_first() {
        assert_eq!(lower_first("Customer"), "customer");
        assert_eq!(lower_first("OrderLine"), "orderLine");
        assert_eq!(lower_first(""), "");
    }

    #[test]
    fn test_error_extensions_carry_code() {
        let err = Error::validation("email", "must contain @").extend();
        let ext = err.extensions.unwrap();
        assert_eq!(ext.get("code"), Some(&GqlValue::from("VALIDATION_ERROR")));
        assert_eq!(ext.get("property"), Some(&GqlValue::from("email")));
    }
}
