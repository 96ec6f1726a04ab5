//! Per-property lifecycle hooks.
//!
//! Hooks form a closed set of signatures, one per lifecycle stage:
//!
//! - [`Validator`]: `(value, context, fullInput) -> ()`
//! - [`DefaultProducer`]: `(context, fullInput) -> value`
//! - [`Transformer`]: `(value, context, fullInput) -> value`
//! - [`OutputComputer`]: `(view, request) -> value` (output shaping only)
//!
//! Synchronous closures are wrapped by the property builder; hooks that need
//! I/O implement the async traits directly. The pipeline awaits every hook
//! before moving on, so a hook always observes values set by earlier hooks.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::store::Document;

/// Reason returned by a failing hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Caller-supplied data for a single request, handed to every hook.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Authenticated caller, if any
    pub user_id: Option<String>,
    /// Free-form request attributes
    pub attributes: HashMap<String, Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Which write operation a pipeline run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stages a property hook can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    Validate,
    DefaultOnCreate,
    DefaultOnUpdate,
    DefaultOnInput,
    TransformOnCreate,
    TransformOnUpdate,
    TransformOnInput,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 7] = [
        LifecycleStage::Validate,
        LifecycleStage::DefaultOnCreate,
        LifecycleStage::DefaultOnUpdate,
        LifecycleStage::DefaultOnInput,
        LifecycleStage::TransformOnCreate,
        LifecycleStage::TransformOnUpdate,
        LifecycleStage::TransformOnInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Validate => "validate",
            LifecycleStage::DefaultOnCreate => "defaultOnCreate",
            LifecycleStage::DefaultOnUpdate => "defaultOnUpdate",
            LifecycleStage::DefaultOnInput => "defaultOnInput",
            LifecycleStage::TransformOnCreate => "transformOnCreate",
            LifecycleStage::TransformOnUpdate => "transformOnUpdate",
            LifecycleStage::TransformOnInput => "transformOnInput",
        }
    }

    /// Default stages for an operation, most specific first.
    pub fn defaults_for(operation: Operation) -> [LifecycleStage; 2] {
        match operation {
            Operation::Create => [LifecycleStage::DefaultOnCreate, LifecycleStage::DefaultOnInput],
            Operation::Update => [LifecycleStage::DefaultOnUpdate, LifecycleStage::DefaultOnInput],
        }
    }

    /// Transform stages for an operation, most specific first.
    pub fn transforms_for(operation: Operation) -> [LifecycleStage; 2] {
        match operation {
            Operation::Create => [
                LifecycleStage::TransformOnCreate,
                LifecycleStage::TransformOnInput,
            ],
            Operation::Update => [
                LifecycleStage::TransformOnUpdate,
                LifecycleStage::TransformOnInput,
            ],
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages a default producer can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultStage {
    OnCreate,
    OnUpdate,
    OnInput,
}

impl From<DefaultStage> for LifecycleStage {
    fn from(stage: DefaultStage) -> Self {
        match stage {
            DefaultStage::OnCreate => LifecycleStage::DefaultOnCreate,
            DefaultStage::OnUpdate => LifecycleStage::DefaultOnUpdate,
            DefaultStage::OnInput => LifecycleStage::DefaultOnInput,
        }
    }
}

/// Stages a transformer can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformStage {
    OnCreate,
    OnUpdate,
    OnInput,
}

impl From<TransformStage> for LifecycleStage {
    fn from(stage: TransformStage) -> Self {
        match stage {
            TransformStage::OnCreate => LifecycleStage::TransformOnCreate,
            TransformStage::OnUpdate => LifecycleStage::TransformOnUpdate,
            TransformStage::OnInput => LifecycleStage::TransformOnInput,
        }
    }
}

/// What a hook knows about the invocation it is part of.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub entity: &'a str,
    pub property: &'a str,
    pub operation: Operation,
    pub request: &'a RequestContext,
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        value: &Value,
        ctx: &HookContext<'_>,
        input: &Document,
    ) -> Result<(), HookError>;
}

#[async_trait]
pub trait DefaultProducer: Send + Sync {
    async fn produce(&self, ctx: &HookContext<'_>, input: &Document) -> Result<Value, HookError>;
}

#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        value: &Value,
        ctx: &HookContext<'_>,
        input: &Document,
    ) -> Result<Value, HookError>;
}

/// Computes an output-only field from the shaped view. Must be side-effect free.
pub trait OutputComputer: Send + Sync {
    fn compute(&self, view: &Document, request: &RequestContext) -> Result<Value, HookError>;
}

/// Adapter turning a synchronous closure into a [`Validator`].
pub struct FnValidator<F>(pub F);

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value, &HookContext<'_>, &Document) -> Result<(), HookError> + Send + Sync,
{
    async fn validate(
        &self,
        value: &Value,
        ctx: &HookContext<'_>,
        input: &Document,
    ) -> Result<(), HookError> {
        (self.0)(value, ctx, input)
    }
}

/// Adapter turning a synchronous closure into a [`DefaultProducer`].
pub struct FnDefault<F>(pub F);

#[async_trait]
impl<F> DefaultProducer for FnDefault<F>
where
    F: Fn(&HookContext<'_>, &Document) -> Result<Value, HookError> + Send + Sync,
{
    async fn produce(&self, ctx: &HookContext<'_>, input: &Document) -> Result<Value, HookError> {
        (self.0)(ctx, input)
    }
}

/// Adapter turning a synchronous closure into a [`Transformer`].
pub struct FnTransformer<F>(pub F);

#[async_trait]
impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&Value, &HookContext<'_>, &Document) -> Result<Value, HookError> + Send + Sync,
{
    async fn transform(
        &self,
        value: &Value,
        ctx: &HookContext<'_>,
        input: &Document,
    ) -> Result<Value, HookError> {
        (self.0)(value, ctx, input)
    }
}

impl<F> OutputComputer for F
where
    F: Fn(&Document, &RequestContext) -> Result<Value, HookError> + Send + Sync,
{
    fn compute(&self, view: &Document, request: &RequestContext) -> Result<Value, HookError> {
        self(view, request)
    }
}
