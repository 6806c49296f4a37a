//! Strategy object binding a controller to one document type and its model.

use std::sync::Arc;

use async_trait::async_trait;
use persistence::{MissingModel, Model, Persistent, Query};
use shared::error::Failure;

#[async_trait]
pub trait CrudDelegate<D: Persistent>: Send + Sync {
    /// Fresh, unsaved document used by `new_document` and when a controller
    /// starts without one.
    fn create_document(&self) -> Arc<D>;

    /// Resolved once per controller and cached.
    fn model(&self) -> Arc<dyn Model<D>>;

    /// Custom retrieval for `document_collection`. Returning `Some` bypasses
    /// [`CrudDelegate::query_docs`] entirely.
    async fn find_docs(&self, _limit: Option<usize>) -> Option<Result<Vec<Arc<D>>, Failure>> {
        None
    }

    /// Query run by `document_collection` when `find_docs` yields nothing.
    /// A zero limit means unbounded.
    fn query_docs<'a>(&self, model: &'a dyn Model<D>, limit: Option<usize>) -> Query<'a, D> {
        let query = model.find();
        match limit {
            Some(limit) if limit > 0 => query.limit(limit),
            _ => query,
        }
    }
}

type Factory<D> = Box<dyn Fn() -> Arc<D> + Send + Sync>;

/// Delegate built from a model handle and a document factory closure.
pub struct ModelBinding<D: Persistent> {
    model: Arc<dyn Model<D>>,
    factory: Factory<D>,
}

impl<D: Persistent> ModelBinding<D> {
    pub fn new<F>(model: Arc<dyn Model<D>>, factory: F) -> Self
    where
        F: Fn() -> Arc<D> + Send + Sync + 'static,
    {
        Self {
            model,
            factory: Box::new(factory),
        }
    }

    /// Binding with no backend; every save, delete, and listing is routed as
    /// a failure.
    pub fn unbound<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<D> + Send + Sync + 'static,
    {
        Self::new(Arc::new(MissingModel), factory)
    }
}

#[async_trait]
impl<D: Persistent> CrudDelegate<D> for ModelBinding<D> {
    fn create_document(&self) -> Arc<D> {
        (self.factory)()
    }

    fn model(&self) -> Arc<dyn Model<D>> {
        Arc::clone(&self.model)
    }
}
