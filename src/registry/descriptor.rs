//! Entity, property, output and relation descriptors.
//!
//! Descriptors double as builders: declare an entity once, hand it to the
//! [`RegistryBuilder`](super::RegistryBuilder), and it is frozen from then on.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::hooks::{
    DefaultProducer, DefaultStage, FnDefault, FnTransformer, FnValidator, HookContext, HookError,
    LifecycleStage, Operation, OutputComputer, TransformStage, Transformer, Validator,
};
use crate::store::Document;

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Int,
    Float,
    Boolean,
    /// RFC 3339 timestamp stored as a string
    DateTime,
    /// Reference to another document's id
    Id,
    /// Embedded value of any shape
    Json,
    /// Sub-document described by an embedded entity
    Embedded,
}

/// Canonical form of an RFC 3339 timestamp: UTC with millisecond precision.
///
/// Canonical strings order lexically the same way the instants do.
pub fn canonical_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl PropertyType {
    /// Whether a non-null JSON value fits this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            PropertyType::String | PropertyType::Id => value.is_string(),
            PropertyType::Int => value.is_i64() || value.is_u64(),
            PropertyType::Float => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::DateTime => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            PropertyType::Json => true,
            PropertyType::Embedded => value.is_object(),
        }
    }

    /// Name of the matching GraphQL type.
    pub fn graphql_name(&self) -> &'static str {
        match self {
            PropertyType::String | PropertyType::DateTime => "String",
            PropertyType::Int => "Int",
            PropertyType::Float => "Float",
            PropertyType::Boolean => "Boolean",
            PropertyType::Id => "ID",
            // Embedded properties are typed per entity by the schema builder.
            PropertyType::Json | PropertyType::Embedded => "JSON",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, PropertyType::Json | PropertyType::Embedded)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::DateTime => "DateTime",
            PropertyType::Embedded => "Embedded",
            other => other.graphql_name(),
        };
        f.write_str(name)
    }
}

/// Hooks registered for one property, keyed by lifecycle stage.
#[derive(Clone, Default)]
pub struct PropertyHooks {
    pub validate: Option<Arc<dyn Validator>>,
    pub default_on_create: Option<Arc<dyn DefaultProducer>>,
    pub default_on_update: Option<Arc<dyn DefaultProducer>>,
    pub default_on_input: Option<Arc<dyn DefaultProducer>>,
    pub transform_on_create: Option<Arc<dyn Transformer>>,
    pub transform_on_update: Option<Arc<dyn Transformer>>,
    pub transform_on_input: Option<Arc<dyn Transformer>>,
}

/// A borrowed hook of any stage.
#[derive(Clone, Copy)]
pub enum HookRef<'a> {
    Validate(&'a Arc<dyn Validator>),
    Default(&'a Arc<dyn DefaultProducer>),
    Transform(&'a Arc<dyn Transformer>),
}

impl fmt::Debug for HookRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookRef::Validate(_) => f.write_str("HookRef::Validate"),
            HookRef::Default(_) => f.write_str("HookRef::Default"),
            HookRef::Transform(_) => f.write_str("HookRef::Transform"),
        }
    }
}

impl PropertyHooks {
    pub fn get(&self, stage: LifecycleStage) -> Option<HookRef<'_>> {
        match stage {
            LifecycleStage::Validate => self.validate.as_ref().map(HookRef::Validate),
            LifecycleStage::DefaultOnCreate => self.default_on_create.as_ref().map(HookRef::Default),
            LifecycleStage::DefaultOnUpdate => self.default_on_update.as_ref().map(HookRef::Default),
            LifecycleStage::DefaultOnInput => self.default_on_input.as_ref().map(HookRef::Default),
            LifecycleStage::TransformOnCreate => {
                self.transform_on_create.as_ref().map(HookRef::Transform)
            }
            LifecycleStage::TransformOnUpdate => {
                self.transform_on_update.as_ref().map(HookRef::Transform)
            }
            LifecycleStage::TransformOnInput => {
                self.transform_on_input.as_ref().map(HookRef::Transform)
            }
        }
    }

    /// Default producer for an operation, falling back to the on-input hook.
    pub fn default_for(
        &self,
        operation: Operation,
    ) -> Option<(LifecycleStage, &Arc<dyn DefaultProducer>)> {
        LifecycleStage::defaults_for(operation)
            .into_iter()
            .find_map(|stage| match self.get(stage) {
                Some(HookRef::Default(hook)) => Some((stage, hook)),
                _ => None,
            })
    }

    /// Transformer for an operation, falling back to the on-input hook.
    pub fn transform_for(
        &self,
        operation: Operation,
    ) -> Option<(LifecycleStage, &Arc<dyn Transformer>)> {
        LifecycleStage::transforms_for(operation)
            .into_iter()
            .find_map(|stage| match self.get(stage) {
                Some(HookRef::Transform(hook)) => Some((stage, hook)),
                _ => None,
            })
    }
}

/// A persisted property and its behavior.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: String,
    ty: PropertyType,
    embedded: Option<String>,
    list: bool,
    required: bool,
    hidden: bool,
    filterable: bool,
    sortable: bool,
    pub(crate) hooks: PropertyHooks,
}

impl PropertyDescriptor {
    /// Scalar properties are filterable by default; lists and JSON are not.
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            embedded: None,
            list: false,
            required: false,
            hidden: false,
            filterable: ty.is_scalar(),
            sortable: false,
            hooks: PropertyHooks::default(),
        }
    }

    /// A sub-document shaped by the embedded entity `entity`.
    ///
    /// Its own properties run through the same checks and hooks as a
    /// top-level document, nested under this property.
    pub fn embedded(name: impl Into<String>, entity: impl Into<String>) -> Self {
        let mut property = Self::new(name, PropertyType::Embedded);
        property.embedded = Some(entity.into());
        property
    }

    /// Store a list of `ty` values.
    pub fn list(mut self) -> Self {
        self.list = true;
        self.filterable = false;
        self
    }

    /// Must be non-null after defaulting on create.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Persisted but never shaped into output.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self.filterable = false;
        self
    }

    pub fn filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &HookContext<'_>, &Document) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks.validate = Some(Arc::new(FnValidator(f)));
        self
    }

    pub fn validate_with(mut self, validator: Arc<dyn Validator>) -> Self {
        self.hooks.validate = Some(validator);
        self
    }

    pub fn default_on_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_>, &Document) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.hooks.default_on_create = Some(Arc::new(FnDefault(f)));
        self
    }

    pub fn default_on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_>, &Document) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.hooks.default_on_update = Some(Arc::new(FnDefault(f)));
        self
    }

    pub fn default_on_input<F>(mut self, f: F) -> Self
    where
        F: Fn(&HookContext<'_>, &Document) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.hooks.default_on_input = Some(Arc::new(FnDefault(f)));
        self
    }

    /// Register an async default producer under an explicit default stage.
    pub fn default_with(mut self, stage: DefaultStage, producer: Arc<dyn DefaultProducer>) -> Self {
        let slot = match stage {
            DefaultStage::OnCreate => &mut self.hooks.default_on_create,
            DefaultStage::OnUpdate => &mut self.hooks.default_on_update,
            DefaultStage::OnInput => &mut self.hooks.default_on_input,
        };
        *slot = Some(producer);
        self
    }

    pub fn transform_on_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &HookContext<'_>, &Document) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.transform_on_create = Some(Arc::new(FnTransformer(f)));
        self
    }

    pub fn transform_on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &HookContext<'_>, &Document) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.transform_on_update = Some(Arc::new(FnTransformer(f)));
        self
    }

    pub fn transform_on_input<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &HookContext<'_>, &Document) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.transform_on_input = Some(Arc::new(FnTransformer(f)));
        self
    }

    /// Register an async transformer under an explicit transform stage.
    pub fn transform_with(mut self, stage: TransformStage, transformer: Arc<dyn Transformer>) -> Self {
        let slot = match stage {
            TransformStage::OnCreate => &mut self.hooks.transform_on_create,
            TransformStage::OnUpdate => &mut self.hooks.transform_on_update,
            TransformStage::OnInput => &mut self.hooks.transform_on_input,
        };
        *slot = Some(transformer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> PropertyType {
        self.ty
    }

    /// Embedded entity name for [`PropertyType::Embedded`] properties.
    pub fn embedded_entity(&self) -> Option<&str> {
        self.embedded.as_deref()
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_filterable(&self) -> bool {
        self.filterable
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn hooks(&self) -> &PropertyHooks {
        &self.hooks
    }

    /// Whether a non-null value matches the declared type (element-wise for lists).
    pub fn accepts(&self, value: &Value) -> bool {
        if self.list {
            value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_null() || self.ty.accepts(v)))
        } else {
            self.ty.accepts(value)
        }
    }

    /// Rewrite DateTime values (element-wise for lists) into canonical form.
    /// Anything unparseable is left alone.
    pub fn normalize(&self, value: &mut Value) {
        if self.ty != PropertyType::DateTime {
            return;
        }
        let canonicalize = |v: &mut Value| {
            if let Some(canonical) = v.as_str().and_then(canonical_timestamp) {
                *v = Value::String(canonical);
            }
        };
        match value {
            Value::Array(items) if self.list => items.iter_mut().for_each(canonicalize),
            other => canonicalize(other),
        }
    }

    /// Whether a create input may omit this property.
    pub fn has_create_default(&self) -> bool {
        self.hooks.default_for(Operation::Create).is_some()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = LifecycleStage::ALL
            .iter()
            .filter(|s| self.hooks.get(**s).is_some())
            .map(|s| s.as_str())
            .collect();
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("embedded", &self.embedded)
            .field("list", &self.list)
            .field("required", &self.required)
            .field("hidden", &self.hidden)
            .field("hooks", &stages)
            .finish()
    }
}

/// Output-only field computed while shaping.
#[derive(Clone)]
pub struct OutputProperty {
    name: String,
    ty: PropertyType,
    computer: Arc<dyn OutputComputer>,
}

impl OutputProperty {
    pub fn new<F>(name: impl Into<String>, ty: PropertyType, f: F) -> Self
    where
        F: Fn(&Document, &crate::registry::RequestContext) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            ty,
            computer: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> PropertyType {
        self.ty
    }

    pub fn computer(&self) -> &dyn OutputComputer {
        self.computer.as_ref()
    }
}

impl fmt::Debug for OutputProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputProperty")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// How a relation field finds its documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Local key holds the target id
    BelongsTo,
    /// Target's foreign key holds this id; at most one
    HasOne,
    /// Target's foreign key holds this id
    HasMany,
    /// Local key holds a list of target ids
    ReferencesMany,
}

impl RelationKind {
    pub fn is_multiple(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ReferencesMany)
    }

    /// Whether the key lives on this entity rather than on the target.
    pub fn is_local(&self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::ReferencesMany)
    }
}

/// Relation metadata resolved lazily by the GraphQL layer.
#[derive(Debug, Clone)]
pub struct Relation {
    pub field_name: String,
    pub kind: RelationKind,
    pub target: String,
    pub key: String,
}

impl Relation {
    pub fn belongs_to(field: impl Into<String>, target: impl Into<String>, local_key: impl Into<String>) -> Self {
        Self::new(field, RelationKind::BelongsTo, target, local_key)
    }

    pub fn has_one(field: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(field, RelationKind::HasOne, target, foreign_key)
    }

    pub fn has_many(field: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(field, RelationKind::HasMany, target, foreign_key)
    }

    pub fn references_many(
        field: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        Self::new(field, RelationKind::ReferencesMany, target, local_key)
    }

    fn new(
        field: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field.into(),
            kind,
            target: target.into(),
            key: key.into(),
        }
    }
}

/// An entity declaration: properties in registration order plus outputs and relations.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    plural: String,
    collection: String,
    embedded: bool,
    properties: Vec<PropertyDescriptor>,
    outputs: Vec<OutputProperty>,
    relations: Vec<Relation>,
}

impl EntityDescriptor {
    /// Plural defaults to `name + "s"`, collection to the lowercased plural.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let plural = format!("{}s", name);
        Self {
            collection: plural.to_lowercase(),
            plural,
            name,
            embedded: false,
            properties: Vec::new(),
            outputs: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// An entity that only lives inside other documents: no collection, no
    /// id or timestamps, and no top-level query or mutation fields.
    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            embedded: true,
            ..Self::new(name)
        }
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn output<F>(mut self, name: impl Into<String>, ty: PropertyType, f: F) -> Self
    where
        F: Fn(&Document, &crate::registry::RequestContext) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.outputs.push(OutputProperty::new(name, ty, f));
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn plural_name(&self) -> &str {
        &self.plural
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn outputs(&self) -> &[OutputProperty] {
        &self.outputs
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn get_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_acceptance() {
        assert!(PropertyType::Int.accepts(&json!(10)));
        assert!(!PropertyType::Int.accepts(&json!(1.5)));
        assert!(PropertyType::Float.accepts(&json!(10)));
        assert!(PropertyType::DateTime.accepts(&json!("2024-01-02T03:04:05Z")));
        assert!(!PropertyType::DateTime.accepts(&json!("yesterday")));
        assert!(PropertyType::Json.accepts(&json!({"a": [1, 2]})));
    }

    #[test]
    fn test_list_acceptance() {
        let tags = PropertyDescriptor::new("tags", PropertyType::String).list();
        assert!(tags.accepts(&json!(["a", "b"])));
        assert!(!tags.accepts(&json!(["a", 1])));
        assert!(!tags.accepts(&json!("a")));
        assert!(!tags.is_filterable());
    }

    #[test]
    fn test_default_fallback_prefers_specific_stage() {
        let prop = PropertyDescriptor::new("status", PropertyType::String)
            .default_on_input(|_, _| Ok(json!("input")))
            .default_on_create(|_, _| Ok(json!("create")));
        let (stage, _) = prop.hooks().default_for(Operation::Create).unwrap();
        assert_eq!(stage, LifecycleStage::DefaultOnCreate);
        let (stage, _) = prop.hooks().default_for(Operation::Update).unwrap();
        assert_eq!(stage, LifecycleStage::DefaultOnInput);
        assert!(prop.has_create_default());
    }

    #[test]
    fn test_datetime_normalization() {
        assert_eq!(
            canonical_timestamp("2024-01-01T10:00:00+05:00").as_deref(),
            Some("2024-01-01T05:00:00.000Z")
        );
        assert_eq!(
            canonical_timestamp("2024-01-01T06:00:00.5Z").as_deref(),
            Some("2024-01-01T06:00:00.500Z")
        );
        assert_eq!(canonical_timestamp("tomorrow"), None);

        let at = PropertyDescriptor::new("at", PropertyType::DateTime).list();
        let mut value = json!(["2024-01-01T00:00:00-01:00", "nope"]);
        at.normalize(&mut value);
        assert_eq!(value, json!(["2024-01-01T01:00:00.000Z", "nope"]));

        let name = PropertyDescriptor::new("name", PropertyType::String);
        let mut value = json!("2024-01-01T10:00:00+05:00");
        name.normalize(&mut value);
        assert_eq!(value, json!("2024-01-01T10:00:00+05:00"));
    }

    #[test]
    fn test_explicit_stage_registration() {
        let stamp = FnDefault(|_: &HookContext<'_>, _: &Document| -> Result<Value, HookError> {
            Ok(json!("u"))
        });
        let keep = FnTransformer(
            |v: &Value, _: &HookContext<'_>, _: &Document| -> Result<Value, HookError> {
                Ok(v.clone())
            },
        );
        let prop = PropertyDescriptor::new("code", PropertyType::String)
            .default_with(DefaultStage::OnUpdate, Arc::new(stamp))
            .transform_with(TransformStage::OnCreate, Arc::new(keep));
        assert!(prop.hooks().default_on_update.is_some());
        assert!(prop.hooks().default_on_input.is_none());
        assert!(prop.hooks().transform_on_create.is_some());
        assert!(prop.hooks().transform_on_input.is_none());
        assert_eq!(LifecycleStage::from(DefaultStage::OnInput), LifecycleStage::DefaultOnInput);
        assert_eq!(
            LifecycleStage::from(TransformStage::OnUpdate),
            LifecycleStage::TransformOnUpdate
        );
    }

    #[test]
    fn test_embedded_property() {
        let address = PropertyDescriptor::embedded("address", "Address");
        assert_eq!(address.ty(), PropertyType::Embedded);
        assert_eq!(address.embedded_entity(), Some("Address"));
        assert!(!address.is_filterable());
        assert!(address.accepts(&json!({"city": "Oslo"})));
        assert!(!address.accepts(&json!("Oslo")));
        assert!(EntityDescriptor::embedded("Address").is_embedded());
    }

    #[test]
    fn test_entity_defaults() {
        let entity = EntityDescriptor::new("Customer");
        assert_eq!(entity.plural_name(), "Customers");
        assert_eq!(entity.collection_name(), "customers");
    }
}
