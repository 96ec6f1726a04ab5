#![allow(dead_code)]

use std::sync::Arc;

use docgraph::Engine;
use docgraph::registry::{EntityDescriptor, PropertyDescriptor, PropertyType, Registry, RequestContext};
use docgraph::store::{Document, SqliteStore};
use serde_json::{Value, json};

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

/// Customer entity used by the pagination scenarios.
pub fn customer_entity() -> EntityDescriptor {
    EntityDescriptor::new("Customer")
        .property(
            PropertyDescriptor::new("name", PropertyType::String)
                .required()
                .sortable(),
        )
        .property(PropertyDescriptor::new("email", PropertyType::String).required())
        .property(PropertyDescriptor::new("numberOfOrders", PropertyType::Int).sortable())
}

pub async fn engine_with(registry: Registry) -> Engine {
    let store = SqliteStore::in_memory().await.expect("in-memory store");
    let engine = Engine::new(Arc::new(registry), Arc::new(store));
    engine.bootstrap().await.expect("bootstrap");
    engine
}

/// Engine holding the five customers, inserted in this order:
/// John (10), Jane (15), Jack (20), Jill (null), Joe (null).
pub async fn seeded_customers() -> Engine {
    let registry = Registry::builder()
        .entity(customer_entity())
        .build()
        .expect("registry");
    let engine = engine_with(registry).await;

    let customers = [
        json!({"name": "John", "email": "john@example.com", "numberOfOrders": 10}),
        json!({"name": "Jane", "email": "jane@example.com", "numberOfOrders": 15}),
        json!({"name": "Jack", "email": "jack@example.com", "numberOfOrders": 20}),
        json!({"name": "Jill", "email": "jill@example.com", "numberOfOrders": null}),
        json!({"name": "Joe", "email": "joe@example.com", "numberOfOrders": null}),
    ];
    let ctx = RequestContext::new();
    for customer in customers {
        engine
            .create("Customer", doc(customer), &ctx)
            .await
            .expect("seed customer");
    }
    engine
}

/// `(email, numberOfOrders)` pairs, the projection the scenarios compare.
pub fn emails_and_orders(docs: &[Document]) -> Vec<(String, Value)> {
    docs.iter()
        .map(|d| {
            (
                d["email"].as_str().unwrap_or_default().to_string(),
                d.get("numberOfOrders").cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}
