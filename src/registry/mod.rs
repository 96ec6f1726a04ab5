//! Property registry
//!
//! Maps entity name -> property name -> behavior metadata. Built once through
//! [`RegistryBuilder`], checked for consistency, and read-only afterwards, so
//! request-time lookups need no locking. A process-wide instance can be
//! installed with [`install`] and fetched with [`global`].
//!
//! ```rust,ignore
//! let registry = Registry::builder()
//!     .entity(
//!         EntityDescriptor::new("Customer")
//!             .property(PropertyDescriptor::new("name", PropertyType::String).required())
//!             .property(
//!                 PropertyDescriptor::new("email", PropertyType::String)
//!                     .transform_on_input(|v, _, _| Ok(lowercase(v))),
//!             ),
//!     )
//!     .build()?;
//! ```

mod descriptor;
mod hooks;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;

pub use descriptor::{
    EntityDescriptor, HookRef, OutputProperty, PropertyDescriptor, PropertyHooks, PropertyType,
    Relation, RelationKind, canonical_timestamp,
};
pub use hooks::{
    DefaultProducer, DefaultStage, FnDefault, FnTransformer, FnValidator, HookContext, HookError,
    LifecycleStage, Operation, OutputComputer, RequestContext, TransformStage, Transformer,
    Validator,
};

use crate::error::{Error, Result};

/// Names the shaper writes into every output view.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Problems detected while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("entity `{0}` is registered twice")]
    DuplicateEntity(String),

    #[error("`{name}` is not a valid identifier")]
    InvalidIdentifier { name: String },

    #[error("entity `{0}` declares no properties")]
    EmptyEntity(String),

    #[error("`{entity}` declares `{name}` twice")]
    DuplicateField { entity: String, name: String },

    #[error("`{entity}.{name}` uses a reserved name")]
    ReservedName { entity: String, name: String },

    #[error("relation `{entity}.{relation}` targets unknown entity `{target}`")]
    UnknownRelationTarget {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("relation `{entity}.{relation}` uses unknown key `{key}`")]
    UnknownRelationKey {
        entity: String,
        relation: String,
        key: String,
    },

    #[error("`{entity}.{property}` embeds unknown entity `{target}`")]
    UnknownEmbedded {
        entity: String,
        property: String,
        target: String,
    },

    #[error("embedded entity `{entity}` cannot declare relation `{relation}`")]
    EmbeddedRelation { entity: String, relation: String },

    #[error("a registry is already installed")]
    AlreadyInstalled,
}

/// Read-only collection of entity descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    entities: Vec<EntityDescriptor>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn descriptor(&self, name: &str) -> Result<&EntityDescriptor> {
        self.by_name
            .get(name)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Look up a top-level (collection-backed) entity by name.
    pub fn entity(&self, name: &str) -> Result<&EntityDescriptor> {
        self.descriptor(name)
            .ok()
            .filter(|e| !e.is_embedded())
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Look up an embedded entity by name.
    pub fn embedded(&self, name: &str) -> Result<&EntityDescriptor> {
        self.descriptor(name)
            .ok()
            .filter(|e| e.is_embedded())
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// The entity describing an embedded property's sub-document, `None` for
    /// every other property.
    pub fn embedded_for(&self, property: &PropertyDescriptor) -> Result<Option<&EntityDescriptor>> {
        property
            .embedded_entity()
            .map(|name| self.embedded(name))
            .transpose()
    }

    /// Top-level entities in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter().filter(|e| !e.is_embedded())
    }

    /// Embedded entities in registration order.
    pub fn embedded_entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter().filter(|e| e.is_embedded())
    }

    /// Properties of `entity` carrying a hook for `stage`, in registration order.
    pub fn properties_by_stage(
        &self,
        entity: &str,
        stage: LifecycleStage,
    ) -> Result<Vec<(&str, HookRef<'_>)>> {
        let entity = self.descriptor(entity)?;
        Ok(entity
            .properties()
            .iter()
            .filter_map(|p| p.hooks().get(stage).map(|hook| (p.name(), hook)))
            .collect())
    }

    /// The hook registered for `(entity, stage, property)`, if any.
    pub fn metadata_value(
        &self,
        entity: &str,
        stage: LifecycleStage,
        property: &str,
    ) -> Option<HookRef<'_>> {
        self.descriptor(entity)
            .ok()?
            .get_property(property)?
            .hooks()
            .get(stage)
    }
}

/// Collects entity declarations and validates them in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDescriptor>,
}

impl RegistryBuilder {
    pub fn entity(mut self, entity: EntityDescriptor) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut by_name = HashMap::new();
        for (i, entity) in self.entities.iter().enumerate() {
            for name in [entity.name(), entity.plural_name(), entity.collection_name()] {
                check_identifier(name)?;
            }
            if by_name.insert(entity.name().to_string(), i).is_some() {
                return Err(RegistryError::DuplicateEntity(entity.name().to_string()));
            }
            check_fields(entity)?;
        }

        let lookup = |name: &str| by_name.get(name).map(|&i: &usize| &self.entities[i]);
        for entity in &self.entities {
            for property in entity.properties() {
                if property.ty() != PropertyType::Embedded {
                    continue;
                }
                let target = property.embedded_entity().unwrap_or_default();
                if !lookup(target).is_some_and(EntityDescriptor::is_embedded) {
                    return Err(RegistryError::UnknownEmbedded {
                        entity: entity.name().to_string(),
                        property: property.name().to_string(),
                        target: target.to_string(),
                    });
                }
            }

            if let (true, Some(relation)) = (entity.is_embedded(), entity.relations().first()) {
                return Err(RegistryError::EmbeddedRelation {
                    entity: entity.name().to_string(),
                    relation: relation.field_name.clone(),
                });
            }

            for relation in entity.relations() {
                let target = lookup(&relation.target)
                    .filter(|t| !t.is_embedded())
                    .ok_or_else(|| RegistryError::UnknownRelationTarget {
                        entity: entity.name().to_string(),
                        relation: relation.field_name.clone(),
                        target: relation.target.clone(),
                    })?;
                let key_owner = if relation.kind.is_local() { entity } else { target };
                if key_owner.get_property(&relation.key).is_none() {
                    return Err(RegistryError::UnknownRelationKey {
                        entity: entity.name().to_string(),
                        relation: relation.field_name.clone(),
                        key: relation.key.clone(),
                    });
                }
            }
        }

        tracing::debug!(entities = self.entities.len(), "Property registry built");
        Ok(Registry {
            entities: self.entities,
            by_name,
        })
    }
}

fn check_fields(entity: &EntityDescriptor) -> Result<(), RegistryError> {
    if entity.properties().is_empty() {
        return Err(RegistryError::EmptyEntity(entity.name().to_string()));
    }

    let names = entity
        .properties()
        .iter()
        .map(|p| p.name())
        .chain(entity.outputs().iter().map(|o| o.name()))
        .chain(entity.relations().iter().map(|r| r.field_name.as_str()));

    let mut seen = HashSet::new();
    for name in names {
        check_identifier(name)?;
        if SYSTEM_FIELDS.contains(&name) {
            return Err(RegistryError::ReservedName {
                entity: entity.name().to_string(),
                name: name.to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(RegistryError::DuplicateField {
                entity: entity.name().to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Names end up in SQL paths and GraphQL type names, so keep them plain.
fn check_identifier(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

/// Install the process-wide registry. Only the first call succeeds.
pub fn install(registry: Registry) -> Result<Arc<Registry>, RegistryError> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(registry.clone())
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    Ok(registry)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer() -> EntityDescriptor {
        EntityDescriptor::new("Customer")
            .property(
                PropertyDescriptor::new("name", PropertyType::String)
                    .validate(|_, _, _| Ok(()))
                    .transform_on_update(|v, _, _| Ok(v.clone())),
            )
            .property(
                PropertyDescriptor::new("email", PropertyType::String).validate(|_, _, _| Ok(())),
            )
            .property(
                PropertyDescriptor::new("status", PropertyType::String)
                    .default_on_create(|_, _| Ok(json!("active"))),
            )
    }

    #[test]
    fn test_properties_by_stage_keeps_registration_order() {
        let registry = Registry::builder().entity(customer()).build().unwrap();
        let names: Vec<&str> = registry
            .properties_by_stage("Customer", LifecycleStage::Validate)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["name", "email"]);
    }

    #[test]
    fn test_metadata_value() {
        let registry = Registry::builder().entity(customer()).build().unwrap();
        assert!(matches!(
            registry.metadata_value("Customer", LifecycleStage::DefaultOnCreate, "status"),
            Some(HookRef::Default(_))
        ));
        assert!(
            registry
                .metadata_value("Customer", LifecycleStage::DefaultOnUpdate, "status")
                .is_none()
        );
        assert!(
            registry
                .metadata_value("Nope", LifecycleStage::Validate, "name")
                .is_none()
        );
    }

    #[test]
    fn test_unknown_entity() {
        let registry = Registry::builder().entity(customer()).build().unwrap();
        assert!(matches!(
            registry.entity("Order"),
            Err(Error::UnknownEntity(name)) if name == "Order"
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_reserved_names() {
        let err = Registry::builder()
            .entity(customer())
            .entity(customer())
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateEntity("Customer".into()));

        let err = Registry::builder()
            .entity(
                EntityDescriptor::new("Thing")
                    .property(PropertyDescriptor::new("id", PropertyType::String)),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::ReservedName { .. }));

        let err = Registry::builder()
            .entity(
                EntityDescriptor::new("Thing")
                    .property(PropertyDescriptor::new("bad-name", PropertyType::String)),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_relation_targets_are_checked() {
        let err = Registry::builder()
            .entity(
                EntityDescriptor::new("Order")
                    .property(PropertyDescriptor::new("customerId", PropertyType::Id))
                    .relation(Relation::belongs_to("customer", "Customer", "customerId")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownRelationTarget { .. }));

        let err = Registry::builder()
            .entity(customer().relation(Relation::has_many("orders", "Order", "ownerId")))
            .entity(
                EntityDescriptor::new("Order")
                    .property(PropertyDescriptor::new("customerId", PropertyType::Id)),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownRelationKey { key, .. } if key == "ownerId"));
    }

    fn address() -> EntityDescriptor {
        EntityDescriptor::embedded("Address")
            .property(PropertyDescriptor::new("city", PropertyType::String).required())
    }

    #[test]
    fn test_embedded_entities_are_kept_apart() {
        let registry = Registry::builder()
            .entity(address())
            .entity(customer().property(PropertyDescriptor::embedded("address", "Address")))
            .build()
            .unwrap();

        let top: Vec<&str> = registry.entities().map(|e| e.name()).collect();
        assert_eq!(top, vec!["Customer"]);
        assert!(matches!(registry.entity("Address"), Err(Error::UnknownEntity(_))));
        assert!(registry.embedded("Customer").is_err());

        let customer = registry.entity("Customer").unwrap();
        let nested = registry
            .embedded_for(customer.get_property("address").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(nested.name(), "Address");
        assert!(
            registry
                .embedded_for(customer.get_property("name").unwrap())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_embedded_targets_are_checked() {
        let err = Registry::builder()
            .entity(customer().property(PropertyDescriptor::embedded("address", "Address")))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownEmbedded { target, .. } if target == "Address"));

        // A top-level entity cannot be embedded.
        let err = Registry::builder()
            .entity(customer())
            .entity(
                EntityDescriptor::new("Order")
                    .property(PropertyDescriptor::embedded("buyer", "Customer")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownEmbedded { .. }));

        let err = Registry::builder()
            .entity(customer())
            .entity(address().relation(Relation::belongs_to("customer", "Customer", "city")))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmbeddedRelation { .. }));
    }

    #[test]
    fn test_install_once() {
        let first = Registry::builder().entity(customer()).build().unwrap();
        let installed = install(first).unwrap();
        assert!(Arc::ptr_eq(&installed, &global().unwrap()));

        let second = Registry::builder().entity(customer()).build().unwrap();
        assert_eq!(install(second).unwrap_err(), RegistryError::AlreadyInstalled);
    }
}
