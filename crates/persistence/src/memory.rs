use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use shared::{domain::DocumentId, error::Failure};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Model, Persistent, QueryParams};

/// Insertion-ordered in-memory model with optional simulated latency and
/// injectable failures.
pub struct MemoryModel<D: Persistent> {
    documents: RwLock<Vec<Arc<D>>>,
    latency: Mutex<Duration>,
    failure: Mutex<Option<Failure>>,
}

impl<D: Persistent> Default for MemoryModel<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Persistent> MemoryModel<D> {
    pub fn new() -> Self {
        Self::with_documents(Vec::new())
    }

    pub fn with_documents(documents: impl IntoIterator<Item = Arc<D>>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().collect()),
            latency: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Every subsequent call fails with `failure` until cleared with `None`.
    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = failure;
    }

    pub async fn documents(&self) -> Vec<Arc<D>> {
        self.documents.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn settle(&self) -> Result<(), Failure> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<D: Persistent> Model<D> for MemoryModel<D> {
    async fn save(&self, document: Arc<D>) -> Result<(), Failure> {
        self.settle().await?;

        let id = document.id();
        let mut documents = self.documents.write().await;
        match documents.iter_mut().find(|stored| stored.id() == id) {
            Some(stored) => *stored = document,
            None => documents.push(document),
        }
        debug!(document_id = %id, total = documents.len(), "memory model saved document");
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), Failure> {
        self.settle().await?;

        let mut documents = self.documents.write().await;
        documents.retain(|stored| &stored.id() != id);
        debug!(document_id = %id, total = documents.len(), "memory model deleted document");
        Ok(())
    }

    async fn fetch(&self, params: QueryParams) -> Result<Vec<Arc<D>>, Failure> {
        self.settle().await?;

        let documents = self.documents.read().await;
        let limit = params.limit.unwrap_or(usize::MAX);
        Ok(documents
            .iter()
            .filter(|document| params.matches::<D>(document))
            .take(limit)
            .cloned()
            .collect())
    }
}
