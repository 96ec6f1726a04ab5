//! Entry point tying the registry, store, filter compiler, pagination and
//! mutation pipeline together.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::orm::{
    FilterExpression, PageRequest, PageResult, PaginationOptions, SortKey, StoreQuery, check_sort,
    compile_for, skip_for,
};
use crate::pipeline::{MutationPipeline, shape};
use crate::registry::{EntityDescriptor, Operation, Registry, RequestContext};
use crate::store::{Document, DocumentStore};

/// Generic CRUD/query service over every registered entity.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    store: Arc<dyn DocumentStore>,
    options: PaginationOptions,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            registry,
            store,
            options: PaginationOptions::default(),
        }
    }

    pub fn with_pagination(mut self, options: PaginationOptions) -> Self {
        self.options = options;
        self
    }

    /// Make sure every registered entity has a collection.
    pub async fn bootstrap(&self) -> Result<()> {
        for entity in self.registry.entities() {
            self.store.ensure_collection(entity.collection_name()).await?;
        }
        tracing::info!(
            entities = self.registry.entities().count(),
            "Collections ready"
        );
        Ok(())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn pagination(&self) -> PaginationOptions {
        self.options
    }

    /// Compile a filter for `entity`. Nothing touches the store.
    pub fn compile(&self, entity: &str, filter: &FilterExpression) -> Result<StoreQuery> {
        compile_for(self.registry.entity(entity)?, filter)
    }

    /// One page of shaped documents matching `filter`.
    pub async fn paginate(
        &self,
        entity: &str,
        filter: &FilterExpression,
        request: &PageRequest,
        ctx: &RequestContext,
    ) -> Result<PageResult<Document>> {
        let descriptor = self.registry.entity(entity)?;
        let query = compile_for(descriptor, filter)?;
        check_sort(descriptor, &request.sort)?;
        let (page, limit) = request.resolve(&self.options);

        let collection = descriptor.collection_name();
        let total_docs = self.store.count(collection, &query).await?;
        let docs = self
            .store
            .find(
                collection,
                &query,
                skip_for(page, limit),
                Some(limit),
                &request.sort,
            )
            .await?;

        tracing::debug!(
            entity,
            page,
            limit,
            total_docs,
            returned = docs.len(),
            "Paginated"
        );

        let shaped = docs
            .iter()
            .map(|doc| shape(&self.registry, descriptor, doc, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(PageResult::from_window(shaped, total_docs, page, limit))
    }

    /// Every shaped document matching an already compiled query.
    pub async fn find_all(
        &self,
        entity: &str,
        query: &StoreQuery,
        sort: &[SortKey],
        ctx: &RequestContext,
    ) -> Result<Vec<Document>> {
        let descriptor = self.registry.entity(entity)?;
        let docs = self
            .store
            .find(descriptor.collection_name(), query, 0, None, sort)
            .await?;
        docs.iter().map(|doc| shape(&self.registry, descriptor, doc, ctx)).collect()
    }

    pub async fn find_by_id(
        &self,
        entity: &str,
        id: &str,
        ctx: &RequestContext,
    ) -> Result<Option<Document>> {
        let descriptor = self.registry.entity(entity)?;
        self.store
            .find_by_id(descriptor.collection_name(), id)
            .await?
            .map(|doc| shape(&self.registry, descriptor, &doc, ctx))
            .transpose()
    }

    /// Validate, default, transform, insert and shape a new document.
    pub async fn create(&self, entity: &str, input: Document, ctx: &RequestContext) -> Result<Document> {
        let descriptor = self.registry.entity(entity)?;
        let prepared = self.prepare(descriptor, Operation::Create, input, ctx).await?;

        let stored = self
            .store
            .insert(descriptor.collection_name(), prepared)
            .await?;
        tracing::info!(entity, id = %stored.id, "Created document");
        shape(&self.registry, descriptor, &stored, ctx)
    }

    /// Validate, default, transform and apply a partial update by id.
    pub async fn update(
        &self,
        entity: &str,
        id: &str,
        input: Document,
        ctx: &RequestContext,
    ) -> Result<Document> {
        let descriptor = self.registry.entity(entity)?;
        let prepared = self.prepare(descriptor, Operation::Update, input, ctx).await?;

        let stored = self
            .store
            .find_by_id_and_update(descriptor.collection_name(), id, prepared)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            })?;
        tracing::info!(entity, id = %stored.id, "Updated document");
        shape(&self.registry, descriptor, &stored, ctx)
    }

    async fn prepare(
        &self,
        descriptor: &EntityDescriptor,
        operation: Operation,
        input: Document,
        ctx: &RequestContext,
    ) -> Result<Document> {
        MutationPipeline::new(&self.registry, descriptor, operation, ctx)
            .run(input)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    entity = descriptor.name(),
                    operation = %operation,
                    error = %e,
                    "Mutation rejected"
                )
            })
    }
}
