//! Create/update mutation pipeline.
//!
//! A run moves through `check input -> validate -> set defaults -> (required
//! check on create) -> transform`, producing the document handed to the
//! store. Each stage walks the entity's properties in registration order and
//! awaits every hook before calling the next one, so later hooks see the
//! values written by earlier ones. The first failure aborts the run.
//!
//! Embedded sub-documents go through the same stages with their own entity's
//! hooks. Errors inside them name the full path, e.g. `address.city`. DateTime
//! values are rewritten to canonical UTC right after the input check and
//! again once transforms have run.

mod output;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::registry::{
    EntityDescriptor, HookContext, Operation, PropertyDescriptor, Registry, RequestContext,
    SYSTEM_FIELDS,
};
use crate::store::Document;

pub use output::shape;

/// One create or update run against a single entity.
pub struct MutationPipeline<'a> {
    registry: &'a Registry,
    entity: &'a EntityDescriptor,
    operation: Operation,
    request: &'a RequestContext,
}

fn is_present(input: &Document, property: &str) -> bool {
    input.contains_key(property)
}

fn is_unset(input: &Document, property: &str) -> bool {
    input.get(property).is_none_or(Value::is_null)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Sub-documents held by an embedded value: the object itself, or each object
/// element of a list, paired with its path.
fn sub_documents<'v>(value: &'v Value, path: &str) -> Vec<(String, &'v Document)> {
    match value {
        Value::Object(doc) => vec![(path.to_string(), doc)],
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_object().map(|doc| (join(path, &i.to_string()), doc)))
            .collect(),
        _ => Vec::new(),
    }
}

fn sub_documents_mut<'v>(value: &'v mut Value, path: &str) -> Vec<(String, &'v mut Document)> {
    match value {
        Value::Object(doc) => vec![(path.to_string(), doc)],
        Value::Array(items) => items
            .iter_mut()
            .enumerate()
            .filter_map(|(i, item)| {
                item.as_object_mut()
                    .map(|doc| (join(path, &i.to_string()), doc))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn type_mismatch(property: &PropertyDescriptor) -> String {
    match (property.embedded_entity(), property.is_list()) {
        (Some(target), true) => format!("expected a list of embedded {}", target),
        (Some(target), false) => format!("expected an embedded {}", target),
        (None, true) => format!("expected a list of {}", property.ty()),
        (None, false) => format!("expected {}", property.ty()),
    }
}

impl<'a> MutationPipeline<'a> {
    pub fn new(
        registry: &'a Registry,
        entity: &'a EntityDescriptor,
        operation: Operation,
        request: &'a RequestContext,
    ) -> Self {
        Self {
            registry,
            entity,
            operation,
            request,
        }
    }

    fn context<'c>(&'c self, entity: &'c EntityDescriptor, property: &'c str) -> HookContext<'c> {
        HookContext {
            entity: entity.name(),
            property,
            operation: self.operation,
            request: self.request,
        }
    }

    /// Run every stage and return the document to persist.
    pub async fn run(&self, mut input: Document) -> Result<Document> {
        tracing::debug!(
            entity = self.entity.name(),
            operation = %self.operation,
            fields = input.len(),
            "Starting mutation pipeline"
        );

        self.check_input(&input)?;
        self.normalize(&mut input)?;
        self.validate(&input).await?;
        self.set_defaults(&mut input).await?;
        match self.operation {
            Operation::Create => self.check_required(&input)?,
            Operation::Update => self.check_embedded_required(self.entity, "", &input)?,
        }
        self.transform(&mut input).await?;
        self.normalize(&mut input)?;
        Ok(input)
    }

    /// Reject system fields, undeclared properties and values of the wrong type.
    pub fn check_input(&self, input: &Document) -> Result<()> {
        self.check_input_in(self.entity, "", input)
    }

    fn check_input_in(&self, entity: &EntityDescriptor, prefix: &str, input: &Document) -> Result<()> {
        for (key, value) in input {
            let path = join(prefix, key);
            if prefix.is_empty() && SYSTEM_FIELDS.contains(&key.as_str()) {
                return Err(Error::validation(path, "is read-only"));
            }
            let Some(property) = entity.get_property(key) else {
                return Err(Error::validation(path, "is not a declared property"));
            };
            if value.is_null() {
                continue;
            }
            if !property.accepts(value) {
                return Err(Error::validation(path, type_mismatch(property)));
            }
            if let Some(nested) = self.registry.embedded_for(property)? {
                for (path, doc) in sub_documents(value, &path) {
                    self.check_input_in(nested, &path, doc)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrite DateTime values to canonical UTC, embedded documents included.
    pub fn normalize(&self, input: &mut Document) -> Result<()> {
        self.normalize_in(self.entity, input)
    }

    fn normalize_in(&self, entity: &EntityDescriptor, input: &mut Document) -> Result<()> {
        for property in entity.properties() {
            let Some(value) = input.get_mut(property.name()) else {
                continue;
            };
            property.normalize(value);
            if let Some(nested) = self.registry.embedded_for(property)? {
                for (_, doc) in sub_documents_mut(value, "") {
                    self.normalize_in(nested, doc)?;
                }
            }
        }
        Ok(())
    }

    /// Call each validator whose property is present in the input (null
    /// included), then validate present embedded documents.
    pub async fn validate(&self, input: &Document) -> Result<()> {
        self.validate_in(self.entity, String::new(), input).await
    }

    fn validate_in<'f>(
        &'f self,
        entity: &'f EntityDescriptor,
        prefix: String,
        input: &'f Document,
    ) -> BoxFuture<'f, Result<()>> {
        async move {
            for property in entity.properties() {
                let Some(value) = input.get(property.name()) else {
                    continue;
                };
                let path = join(&prefix, property.name());
                if let Some(validator) = property.hooks().validate.as_ref() {
                    let ctx = self.context(entity, property.name());
                    validator
                        .validate(value, &ctx, input)
                        .await
                        .map_err(|e| Error::validation(&path, e.0))?;
                }
                if let Some(nested) = self.registry.embedded_for(property)? {
                    for (path, doc) in sub_documents(value, &path) {
                        self.validate_in(nested, path, doc).await?;
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Fill null or absent properties from their default producers, then
    /// default inside embedded documents.
    pub async fn set_defaults(&self, input: &mut Document) -> Result<()> {
        self.set_defaults_in(self.entity, String::new(), input).await
    }

    fn set_defaults_in<'f>(
        &'f self,
        entity: &'f EntityDescriptor,
        prefix: String,
        input: &'f mut Document,
    ) -> BoxFuture<'f, Result<()>> {
        async move {
            for property in entity.properties() {
                let path = join(&prefix, property.name());
                if let Some((stage, producer)) = property.hooks().default_for(self.operation) {
                    if is_unset(input, property.name()) {
                        let ctx = self.context(entity, property.name());
                        let value = producer.produce(&ctx, input).await.map_err(|e| {
                            Error::HookFailed {
                                stage: stage.as_str(),
                                property: path.clone(),
                                reason: e.0,
                            }
                        })?;
                        tracing::debug!(property = %path, stage = %stage, "Applied default");
                        input.insert(property.name().to_string(), value);
                    }
                }
                let Some(nested) = self.registry.embedded_for(property)? else {
                    continue;
                };
                let Some(value) = input.get_mut(property.name()) else {
                    continue;
                };
                for (path, doc) in sub_documents_mut(value, &path) {
                    self.set_defaults_in(nested, path, doc).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Every required property must be non-null once defaults are applied.
    pub fn check_required(&self, input: &Document) -> Result<()> {
        self.check_required_in(self.entity, "", input)
    }

    fn check_required_in(&self, entity: &EntityDescriptor, prefix: &str, input: &Document) -> Result<()> {
        if let Some(property) = entity
            .properties()
            .iter()
            .find(|p| p.is_required() && is_unset(input, p.name()))
        {
            return Err(Error::validation(join(prefix, property.name()), "is required"));
        }
        self.check_embedded_required(entity, prefix, input)
    }

    /// Embedded documents are replaced wholesale, so their required
    /// properties are checked on update too.
    fn check_embedded_required(&self, entity: &EntityDescriptor, prefix: &str, input: &Document) -> Result<()> {
        for property in entity.properties() {
            let (Some(nested), Some(value)) =
                (self.registry.embedded_for(property)?, input.get(property.name()))
            else {
                continue;
            };
            for (path, doc) in sub_documents(value, &join(prefix, property.name())) {
                self.check_required_in(nested, &path, doc)?;
            }
        }
        Ok(())
    }

    /// Replace present values with their transformed form. Embedded
    /// documents are transformed before the property holding them.
    pub async fn transform(&self, input: &mut Document) -> Result<()> {
        self.transform_in(self.entity, String::new(), input).await
    }

    fn transform_in<'f>(
        &'f self,
        entity: &'f EntityDescriptor,
        prefix: String,
        input: &'f mut Document,
    ) -> BoxFuture<'f, Result<()>> {
        async move {
            for property in entity.properties() {
                if !is_present(input, property.name()) {
                    continue;
                }
                let path = join(&prefix, property.name());
                if let Some(nested) = self.registry.embedded_for(property)? {
                    if let Some(value) = input.get_mut(property.name()) {
                        for (path, doc) in sub_documents_mut(value, &path) {
                            self.transform_in(nested, path, doc).await?;
                        }
                    }
                }
                let Some((stage, transformer)) = property.hooks().transform_for(self.operation)
                else {
                    continue;
                };
                let ctx = self.context(entity, property.name());
                let current = input.get(property.name()).cloned().unwrap_or(Value::Null);
                let value = transformer
                    .transform(&current, &ctx, input)
                    .await
                    .map_err(|e| Error::HookFailed {
                        stage: stage.as_str(),
                        property: path,
                        reason: e.0,
                    })?;
                input.insert(property.name().to_string(), value);
            }
            Ok(())
        }
        .boxed()
    }
}
