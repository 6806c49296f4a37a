//! Collaborator contracts consumed by document controllers, plus an in-memory
//! model and a schema-driven document for local use.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{DocumentId, PersistentProperty, PropChangeEvent},
    error::Failure,
    observable::Unsubscriber,
};

mod memory;
mod record;

pub use memory::MemoryModel;
pub use record::{Record, RecordSchema};

pub type PropObserver = Box<dyn Fn(&PropChangeEvent) + Send + Sync>;

/// A persistable entity with identity, metadata, and property-change notifications.
pub trait Persistent: Send + Sync + 'static {
    fn id(&self) -> DocumentId;

    fn class_name(&self) -> &str;

    fn on_change(&self, observer: PropObserver) -> Unsubscriber;

    fn persistent_properties(&self) -> Vec<PersistentProperty>;

    fn is_required(&self, property: &str) -> bool {
        self.persistent_properties()
            .iter()
            .any(|candidate| candidate.name == property && candidate.required)
    }

    /// Built-in validity check for one property.
    fn is_prop_value_valid(&self, property: &str) -> bool;

    fn get_property(&self, property: &str) -> Option<Value>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub limit: Option<usize>,
    pub conditions: Vec<(String, Value)>,
}

impl QueryParams {
    pub fn matches<D: Persistent>(&self, document: &D) -> bool {
        self.conditions
            .iter()
            .all(|(property, expected)| document.get_property(property).as_ref() == Some(expected))
    }
}

#[async_trait]
pub trait Model<D: Persistent>: Send + Sync {
    async fn save(&self, document: Arc<D>) -> Result<(), Failure>;
    async fn delete(&self, id: &DocumentId) -> Result<(), Failure>;
    async fn fetch(&self, params: QueryParams) -> Result<Vec<Arc<D>>, Failure>;
}

impl<'m, D: Persistent> dyn Model<D> + 'm {
    pub fn find(&self) -> Query<'_, D> {
        Query {
            model: self,
            params: QueryParams::default(),
        }
    }
}

/// Builder over [`Model::fetch`].
pub struct Query<'a, D: Persistent> {
    model: &'a dyn Model<D>,
    params: QueryParams,
}

impl<'a, D: Persistent> Query<'a, D> {
    pub fn limit(mut self, limit: usize) -> Self {
        self.params.limit = Some(limit);
        self
    }

    pub fn where_eq(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.conditions.push((property.into(), value.into()));
        self
    }

    pub async fn get(self) -> Result<Vec<Arc<D>>, Failure> {
        self.model.fetch(self.params).await
    }
}

/// Model used when no persistence backend is wired.
pub struct MissingModel;

#[async_trait]
impl<D: Persistent> Model<D> for MissingModel {
    async fn save(&self, document: Arc<D>) -> Result<(), Failure> {
        Err(Failure::from(format!(
            "no model available to save {} {}",
            document.class_name(),
            document.id()
        )))
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), Failure> {
        Err(Failure::from(format!("no model available to delete {id}")))
    }

    async fn fetch(&self, _params: QueryParams) -> Result<Vec<Arc<D>>, Failure> {
        Err(Failure::from("no model available to query documents"))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
