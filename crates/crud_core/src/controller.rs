//! The CRUD controller: owns the current document, drives the model, and
//! reports change, progress, and error events.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use persistence::{Model, Persistent};
use serde_json::Value;
use shared::{
    domain::PropChangeEvent,
    error::{ControllerError, Failure},
    observable::{Observable, Unsubscriber},
    text::snake_case,
};
use tracing::{debug, info, warn};

use crate::{
    delegate::CrudDelegate,
    error_policy::ErrorRouter,
    events::{ControllerEvent, CrudAction},
    progress::{ProgressAggregator, ProgressEvent},
    validation::ValidatorRegistry,
};

pub const STAGE_SAVING: &str = "Saving main document";
pub const STAGE_DELETING: &str = "Delete main document";
pub const STAGE_RETRIEVING: &str = "Retrieving document collection";

pub type DocumentFilter<D> = Arc<dyn Fn(&D) -> bool + Send + Sync>;

struct ControllerState<D> {
    document: Option<Arc<D>>,
    document_subscription: Option<Unsubscriber>,
    filter: Option<DocumentFilter<D>>,
    validators: ValidatorRegistry,
}

/// Mediates between one document type's model and a rendering layer.
///
/// All operations take `&self`; store, delete, and listing may overlap and
/// their busy stages compose through the embedded [`ProgressAggregator`].
/// Failures are notified on the error channel and only returned as `Err`
/// while no error observer is attached.
pub struct DocumentController<D: Persistent> {
    delegate: Arc<dyn CrudDelegate<D>>,
    model: OnceLock<Arc<dyn Model<D>>>,
    progress: ProgressAggregator,
    changes: Observable<ControllerEvent<D>>,
    errors: ErrorRouter,
    state: Mutex<ControllerState<D>>,
}

impl<D: Persistent> DocumentController<D> {
    /// Starts with a document from [`CrudDelegate::create_document`].
    pub fn new(delegate: Arc<dyn CrudDelegate<D>>) -> Self {
        Self::with_document(delegate, None)
    }

    pub fn with_document(delegate: Arc<dyn CrudDelegate<D>>, document: Option<Arc<D>>) -> Self {
        let document = document.unwrap_or_else(|| delegate.create_document());
        let controller = Self {
            delegate,
            model: OnceLock::new(),
            progress: ProgressAggregator::new(),
            changes: Observable::new(),
            errors: ErrorRouter::new(),
            state: Mutex::new(ControllerState {
                document: None,
                document_subscription: None,
                filter: None,
                validators: ValidatorRegistry::default(),
            }),
        };
        controller.set_document(Some(document));
        controller
    }

    fn state(&self) -> MutexGuard<'_, ControllerState<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn model(&self) -> Arc<dyn Model<D>> {
        Arc::clone(self.model.get_or_init(|| self.delegate.model()))
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    pub fn is_busy(&self) -> bool {
        self.progress.is_busy()
    }

    pub fn document(&self) -> Option<Arc<D>> {
        self.state().document.clone()
    }

    /// Installs `document` as current, unless it is already the installed
    /// instance. Property changes of the new document are forwarded as
    /// [`ControllerEvent::DocumentProps`]; the previous one is detached.
    pub fn set_document(&self, document: Option<Arc<D>>) -> &Self {
        let previous_subscription = {
            let mut state = self.state();
            let unchanged = match (&state.document, &document) {
                (Some(current), Some(next)) => Arc::ptr_eq(current, next),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return self;
            }
            state.document = document.clone();
            state.document_subscription.take()
        };

        if let Some(previous) = previous_subscription {
            previous.unsubscribe();
        }

        if let Some(next) = &document {
            let changes = self.changes.clone();
            let subscription = next.on_change(Box::new(move |event: &PropChangeEvent| {
                changes.notify(&ControllerEvent::DocumentProps(event.clone()));
            }));

            let mut state = self.state();
            let still_current = state
                .document
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, next));
            if still_current {
                state.document_subscription = Some(subscription);
            } else {
                drop(state);
                subscription.unsubscribe();
            }
        }

        debug!(
            document_id = ?document.as_ref().map(|doc| doc.id()),
            "current document replaced"
        );
        self.changes
            .notify(&ControllerEvent::DocumentChanged(document));
        self
    }

    pub fn new_document(&self) -> &Self {
        self.set_document(Some(self.delegate.create_document()))
    }

    /// Slug of the current document's class name, e.g. `"test-document"`.
    pub fn document_class_slug(&self) -> Option<String> {
        self.document()
            .map(|document| snake_case(document.class_name(), '-'))
    }

    /// Saves the current document, then re-fetches the collection and
    /// announces it with [`CrudAction::Saved`].
    ///
    /// The target document and the busy stage are both taken when this is
    /// called, so a later `set_document` does not redirect the save.
    pub fn store_document(&self) -> impl Future<Output = Result<(), ControllerError>> + Send + '_ {
        let stage = self.progress.begin(STAGE_SAVING);
        let target = self.document();

        async move {
            let outcome = match target {
                Some(document) => {
                    let id = document.id();
                    match self.model().save(document).await {
                        Ok(()) => {
                            info!(document_id = %id, "document saved");
                            Ok(())
                        }
                        Err(failure) => Err(failure.normalize()),
                    }
                }
                None => Err(ControllerError::missing_document()),
            };

            let result = match outcome {
                Ok(()) => self.announce_collection(CrudAction::Saved).await,
                Err(error) => self.managed_throw(error),
            };
            drop(stage);
            result
        }
    }

    /// Deletes the current document by id; otherwise shaped like
    /// [`DocumentController::store_document`].
    pub fn delete_document(&self) -> impl Future<Output = Result<(), ControllerError>> + Send + '_ {
        let stage = self.progress.begin(STAGE_DELETING);
        let target = self.document();

        async move {
            let outcome = match target {
                Some(document) => {
                    let id = document.id();
                    match self.model().delete(&id).await {
                        Ok(()) => {
                            info!(document_id = %id, "document deleted");
                            Ok(())
                        }
                        Err(failure) => Err(failure.normalize()),
                    }
                }
                None => Err(ControllerError::missing_document()),
            };

            let result = match outcome {
                Ok(()) => self.announce_collection(CrudAction::Deleted).await,
                Err(error) => self.managed_throw(error),
            };
            drop(stage);
            result
        }
    }

    /// Retrieves documents through the delegate's `find_docs`, falling back to
    /// its `query_docs` query. The active filter is not applied; pass the
    /// result through [`DocumentController::filter`].
    ///
    /// An observed failure resolves to an empty list.
    pub fn document_collection(
        &self,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Arc<D>>, ControllerError>> + Send + '_ {
        let stage = self.progress.begin(STAGE_RETRIEVING);

        async move {
            let found = match self.delegate.find_docs(limit).await {
                Some(found) => found,
                None => {
                    let model = self.model();
                    self.delegate.query_docs(model.as_ref(), limit).get().await
                }
            };

            let result = match found {
                Ok(documents) => {
                    debug!(count = documents.len(), ?limit, "document collection retrieved");
                    Ok(documents)
                }
                Err(failure) => self.managed_throw(failure).map(|()| Vec::new()),
            };
            drop(stage);
            result
        }
    }

    // A failed re-fetch was already routed by `document_collection`.
    async fn announce_collection(&self, action: CrudAction) -> Result<(), ControllerError> {
        let documents = self.document_collection(None).await?;
        self.changes
            .notify(&ControllerEvent::DocumentCollection { documents, action });
        Ok(())
    }

    pub fn set_filter<F>(&self, filter: F) -> &Self
    where
        F: Fn(&D) -> bool + Send + Sync + 'static,
    {
        self.state().filter = Some(Arc::new(filter));
        self.changes.notify(&ControllerEvent::FilterChanged);
        self
    }

    pub fn reset_filter(&self) -> &Self {
        self.state().filter = None;
        self.changes.notify(&ControllerEvent::FilterChanged);
        self
    }

    pub fn has_filter(&self) -> bool {
        self.state().filter.is_some()
    }

    /// Keeps the documents accepted by the active filter; all of them when no
    /// filter is set.
    pub fn filter(&self, documents: impl IntoIterator<Item = Arc<D>>) -> Vec<Arc<D>> {
        let filter = self.state().filter.clone();
        match filter {
            Some(filter) => documents
                .into_iter()
                .filter(|document| filter(document.as_ref()))
                .collect(),
            None => documents.into_iter().collect(),
        }
    }

    pub fn add_validator<F>(
        &self,
        property: impl Into<String>,
        predicate: F,
        error_message: Option<&str>,
    ) -> &Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.state()
            .validators
            .add(property, predicate, error_message);
        self
    }

    pub fn remove_validator(&self, property: &str) -> &Self {
        self.state().validators.remove(property);
        self
    }

    pub fn failed_validation_error(&self, property: &str) -> Option<String> {
        self.state()
            .validators
            .error_message(property)
            .map(str::to_string)
    }

    fn require_document(&self) -> Result<Arc<D>, ControllerError> {
        self.document().ok_or_else(ControllerError::missing_document)
    }

    pub fn required_properties(&self) -> Result<Vec<String>, ControllerError> {
        let document = self.require_document()?;
        Ok(document
            .persistent_properties()
            .into_iter()
            .filter(|property| document.is_required(&property.name))
            .map(|property| property.name)
            .collect())
    }

    /// Custom validator if one is registered, else the document's own check.
    pub fn is_property_valid(&self, property: &str) -> Result<bool, ControllerError> {
        let document = self.require_document()?;
        let validators = self.state().validators.clone();
        Ok(validators.is_valid(&*document, property))
    }

    pub fn non_filled_required_properties(&self) -> Result<Vec<String>, ControllerError> {
        let document = self.require_document()?;
        let validators = self.state().validators.clone();
        Ok(self
            .required_properties()?
            .into_iter()
            .filter(|property| !validators.is_valid(&*document, property))
            .collect())
    }

    pub fn all_required_properties_filled(&self) -> Result<bool, ControllerError> {
        Ok(self.non_filled_required_properties()?.is_empty())
    }

    pub fn on_change<F>(&self, observer: F) -> Unsubscriber
    where
        F: Fn(&ControllerEvent<D>) + Send + Sync + 'static,
    {
        self.changes.subscribe(observer)
    }

    /// While at least one error observer is attached, failing operations
    /// resolve `Ok` and report only through this channel.
    pub fn on_error<F>(&self, observer: F) -> Unsubscriber
    where
        F: Fn(&ControllerError) + Send + Sync + 'static,
    {
        self.errors.subscribe(observer)
    }

    pub fn on_progress<F>(&self, observer: F) -> Unsubscriber
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.progress.on_progress(observer)
    }

    /// Normalizes `error`, publishes it on the change and error channels, and
    /// returns it as `Err` only when no error observer is attached.
    pub fn managed_throw(&self, error: impl Into<Failure>) -> Result<(), ControllerError> {
        let error = error.into().normalize();
        warn!(
            %error,
            error_observers = self.errors.observer_count(),
            "controller operation failed"
        );
        self.changes.notify(&ControllerEvent::Error(error.clone()));
        self.errors.route(error)
    }
}

impl<D: Persistent> Drop for DocumentController<D> {
    fn drop(&mut self) {
        if let Some(subscription) = self.state().document_subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
