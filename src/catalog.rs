//! Demo entities served by the binary: `Customer` and `Order`, with an
//! embedded `Address` on customers.

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::registry::{
    EntityDescriptor, HookError, PropertyDescriptor, PropertyType, Registry, RegistryError,
    Relation,
};

fn non_empty(value: &Value) -> Result<(), HookError> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(HookError::new("must not be empty")),
    }
}

fn hash_password(value: &Value) -> Result<Value, HookError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let plain = value
        .as_str()
        .ok_or_else(|| HookError::new("must be a string"))?;
    let digest = Sha256::digest(plain.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(Value::String(hex))
}

fn trimmed(value: &Value) -> Value {
    value
        .as_str()
        .map(|s| json!(s.trim()))
        .unwrap_or_else(|| value.clone())
}

pub fn address() -> EntityDescriptor {
    EntityDescriptor::embedded("Address")
        .property(
            PropertyDescriptor::new("street", PropertyType::String)
                .required()
                .validate(|v, _, _| non_empty(v)),
        )
        .property(
            PropertyDescriptor::new("city", PropertyType::String)
                .required()
                .transform_on_input(|v, _, _| Ok(trimmed(v))),
        )
        .property(PropertyDescriptor::new("postalCode", PropertyType::String))
        .property(
            PropertyDescriptor::new("country", PropertyType::String)
                .default_on_input(|_, _| Ok(json!("US"))),
        )
}

pub fn customer() -> EntityDescriptor {
    EntityDescriptor::new("Customer")
        .property(
            PropertyDescriptor::new("name", PropertyType::String)
                .required()
                .sortable()
                .validate(|v, _, _| non_empty(v)),
        )
        .property(
            PropertyDescriptor::new("email", PropertyType::String)
                .required()
                .sortable()
                .validate(|v, _, _| match v.as_str() {
                    Some(s) if s.contains('@') => Ok(()),
                    _ => Err(HookError::new("must be an email address")),
                })
                .transform_on_input(|v, _, _| {
                    Ok(v.as_str()
                        .map(|s| json!(s.trim().to_lowercase()))
                        .unwrap_or(Value::Null))
                }),
        )
        .property(
            PropertyDescriptor::new("numberOfOrders", PropertyType::Int)
                .sortable()
                .validate(|v, _, _| match v.as_i64() {
                    Some(n) if n < 0 => Err(HookError::new("must not be negative")),
                    _ => Ok(()),
                }),
        )
        .property(
            PropertyDescriptor::new("password", PropertyType::String)
                .hidden()
                .transform_on_input(|v, _, _| hash_password(v)),
        )
        .property(
            PropertyDescriptor::new("status", PropertyType::String)
                .default_on_create(|_, _| Ok(json!("active"))),
        )
        .property(
            PropertyDescriptor::new("createdBy", PropertyType::Id).default_on_create(|ctx, _| {
                Ok(ctx
                    .request
                    .user_id
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null))
            }),
        )
        .property(PropertyDescriptor::embedded("address", "Address"))
        .output("displayName", PropertyType::String, |view, _| {
            let name = view.get("name").and_then(Value::as_str).unwrap_or_default();
            Ok(match view.get("email").and_then(Value::as_str) {
                Some(email) => json!(format!("{} <{}>", name, email)),
                None => json!(name),
            })
        })
        .relation(Relation::has_many("orders", "Order", "customerId"))
}

pub fn order() -> EntityDescriptor {
    EntityDescriptor::new("Order")
        .property(PropertyDescriptor::new("customerId", PropertyType::Id).required())
        .property(
            PropertyDescriptor::new("total", PropertyType::Float)
                .required()
                .sortable()
                .validate(|v, _, _| match v.as_f64() {
                    Some(t) if t < 0.0 => Err(HookError::new("must not be negative")),
                    _ => Ok(()),
                }),
        )
        .property(
            PropertyDescriptor::new("placedAt", PropertyType::DateTime)
                .sortable()
                .default_on_create(|_, _| {
                    Ok(json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)))
                }),
        )
        .relation(Relation::belongs_to("customer", "Customer", "customerId"))
}

/// Registry holding the demo entities.
pub fn registry() -> Result<Registry, RegistryError> {
    Registry::builder()
        .entity(address())
        .entity(customer())
        .entity(order())
        .build()
}
