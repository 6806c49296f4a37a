//! Data-bound CRUD controller and the progress aggregation it reports through.

pub mod controller;
pub mod delegate;
pub mod error_policy;
pub mod events;
pub mod progress;
pub mod validation;

pub use controller::{
    DocumentController, DocumentFilter, STAGE_DELETING, STAGE_RETRIEVING, STAGE_SAVING,
};
pub use delegate::{CrudDelegate, ModelBinding};
pub use error_policy::ErrorRouter;
pub use events::{ControllerEvent, CrudAction};
pub use progress::{BusyStage, ProgressAggregator, ProgressEvent, ProgressStage};
pub use validation::{ValidatorEntry, ValidatorRegistry};

pub use shared::error::{ControllerError, Failure};
pub use shared::observable::Unsubscriber;
