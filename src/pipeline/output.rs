//! Output shaping: stored document -> client view.

use chrono::SecondsFormat;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::registry::{EntityDescriptor, Registry, RequestContext};
use crate::store::{Document, StoredDocument};

/// Build the client view of `stored`.
///
/// The view holds `id`, every non-hidden property present in the body,
/// `createdAt`, `updatedAt`, and then the entity's output properties computed
/// in registration order. Each computer sees the view built so far. Embedded
/// documents are shaped with their own entity's rules, minus the system
/// fields. The stored document is left untouched.
pub fn shape(
    registry: &Registry,
    entity: &EntityDescriptor,
    stored: &StoredDocument,
    request: &RequestContext,
) -> Result<Document> {
    let mut view = Document::new();
    view.insert("id".to_string(), Value::String(stored.id.clone()));
    visible_properties(registry, entity, &stored.body, request, &mut view)?;

    view.insert(
        "createdAt".to_string(),
        Value::String(stored.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    view.insert(
        "updatedAt".to_string(),
        Value::String(stored.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    computed_outputs(entity, request, &mut view)?;
    Ok(view)
}

fn shape_embedded(
    registry: &Registry,
    entity: &EntityDescriptor,
    body: &Document,
    request: &RequestContext,
) -> Result<Document> {
    let mut view = Document::new();
    visible_properties(registry, entity, body, request, &mut view)?;
    computed_outputs(entity, request, &mut view)?;
    Ok(view)
}

fn visible_properties(
    registry: &Registry,
    entity: &EntityDescriptor,
    body: &Document,
    request: &RequestContext,
    view: &mut Document,
) -> Result<()> {
    for property in entity.properties() {
        if property.is_hidden() {
            continue;
        }
        let Some(value) = body.get(property.name()) else {
            continue;
        };
        let value = match (registry.embedded_for(property)?, value) {
            (Some(nested), Value::Object(doc)) => {
                Value::Object(shape_embedded(registry, nested, doc, request)?)
            }
            (Some(nested), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(doc) => {
                            shape_embedded(registry, nested, doc, request).map(Value::Object)
                        }
                        other => Ok(other.clone()),
                    })
                    .collect::<Result<_>>()?,
            ),
            (_, value) => value.clone(),
        };
        view.insert(property.name().to_string(), value);
    }
    Ok(())
}

fn computed_outputs(
    entity: &EntityDescriptor,
    request: &RequestContext,
    view: &mut Document,
) -> Result<()> {
    for output in entity.outputs() {
        let value = output
            .computer()
            .compute(view, request)
            .map_err(|e| Error::HookFailed {
                stage: "output",
                property: output.name().to_string(),
                reason: e.0,
            })?;
        view.insert(output.name().to_string(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HookError, PropertyDescriptor, PropertyType};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use serde_json::json;

    fn registry(entity: EntityDescriptor) -> Registry {
        Registry::builder().entity(entity).build().unwrap()
    }

    fn stored(body: Value) -> StoredDocument {
        StoredDocument {
            id: "c1".to_string(),
            seq: 1,
            body: body.as_object().cloned().unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_hidden_dropped_and_outputs_added() {
        let registry = registry(
            EntityDescriptor::new("Customer")
                .property(PropertyDescriptor::new("name", PropertyType::String))
                .property(PropertyDescriptor::new("password", PropertyType::String).hidden())
                .output("greeting", PropertyType::String, |view, request| {
                    let name = view.get("name").and_then(Value::as_str).unwrap_or("stranger");
                    let by = request.user_id.as_deref().unwrap_or("anon");
                    Ok(json!(format!("hi {} from {}", name, by)))
                }),
        );
        let entity = registry.entity("Customer").unwrap();
        let doc = stored(json!({"name": "john", "password": "secret"}));
        let request = RequestContext::new().with_user("u1");

        let view = shape(&registry, entity, &doc, &request).unwrap();
        assert_eq!(view["id"], json!("c1"));
        assert_eq!(view["greeting"], json!("hi john from u1"));
        assert!(!view.contains_key("password"));
        assert!(view.contains_key("createdAt") && view.contains_key("updatedAt"));
        assert_eq!(doc.body["password"], json!("secret"));
    }

    #[test]
    fn test_output_failure() {
        let registry = registry(
            EntityDescriptor::new("Customer")
                .property(PropertyDescriptor::new("name", PropertyType::String))
                .output("broken", PropertyType::String, |_, _| Err(HookError::new("boom"))),
        );
        let entity = registry.entity("Customer").unwrap();
        let err = shape(&registry, entity, &stored(json!({})), &RequestContext::new()).unwrap_err();
        assert_matches!(err, Error::HookFailed { stage: "output", property, .. } if property == "broken");
    }

    #[test]
    fn test_embedded_documents_are_shaped() {
        let registry = Registry::builder()
            .entity(
                EntityDescriptor::embedded("Card")
                    .property(PropertyDescriptor::new("last4", PropertyType::String))
                    .property(PropertyDescriptor::new("number", PropertyType::String).hidden())
                    .output("masked", PropertyType::String, |view, _| {
                        let last4 = view.get("last4").and_then(Value::as_str).unwrap_or("????");
                        Ok(json!(format!("**** {}", last4)))
                    }),
            )
            .entity(
                EntityDescriptor::new("Customer")
                    .property(PropertyDescriptor::embedded("cards", "Card").list()),
            )
            .build()
            .unwrap();
        let entity = registry.entity("Customer").unwrap();
        let doc = stored(json!({
            "cards": [{"last4": "4242", "number": "4111111111114242"}, null],
        }));

        let view = shape(&registry, entity, &doc, &RequestContext::new()).unwrap();
        assert_eq!(view["cards"], json!([{"last4": "4242", "masked": "**** 4242"}, null]));
        assert_eq!(doc.body["cards"][0]["number"], json!("4111111111114242"));
    }
}
