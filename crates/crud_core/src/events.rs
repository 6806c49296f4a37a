use std::{fmt, sync::Arc};

use shared::{domain::PropChangeEvent, error::ControllerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudAction {
    Saved,
    Deleted,
    FilterChange,
}

/// Everything published on a controller's change channel.
pub enum ControllerEvent<D> {
    /// A property of the current document changed.
    DocumentProps(PropChangeEvent),
    DocumentChanged(Option<Arc<D>>),
    DocumentCollection {
        documents: Vec<Arc<D>>,
        action: CrudAction,
    },
    FilterChanged,
    /// Mirror of the error channel for observers that only watch changes.
    /// Prefer `on_error`.
    Error(ControllerError),
}

impl<D> ControllerEvent<D> {
    pub fn action(&self) -> Option<CrudAction> {
        match self {
            ControllerEvent::DocumentCollection { action, .. } => Some(*action),
            ControllerEvent::FilterChanged => Some(CrudAction::FilterChange),
            _ => None,
        }
    }

    pub fn document_collection(&self) -> Option<&[Arc<D>]> {
        match self {
            ControllerEvent::DocumentCollection { documents, .. } => Some(documents.as_slice()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ControllerError> {
        match self {
            ControllerEvent::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<D> Clone for ControllerEvent<D> {
    fn clone(&self) -> Self {
        match self {
            ControllerEvent::DocumentProps(event) => ControllerEvent::DocumentProps(event.clone()),
            ControllerEvent::DocumentChanged(document) => {
                ControllerEvent::DocumentChanged(document.clone())
            }
            ControllerEvent::DocumentCollection { documents, action } => {
                ControllerEvent::DocumentCollection {
                    documents: documents.clone(),
                    action: *action,
                }
            }
            ControllerEvent::FilterChanged => ControllerEvent::FilterChanged,
            ControllerEvent::Error(error) => ControllerEvent::Error(error.clone()),
        }
    }
}

impl<D> fmt::Debug for ControllerEvent<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEvent::DocumentProps(event) => {
                f.debug_tuple("DocumentProps").field(event).finish()
            }
            ControllerEvent::DocumentChanged(document) => f
                .debug_tuple("DocumentChanged")
                .field(&document.is_some())
                .finish(),
            ControllerEvent::DocumentCollection { documents, action } => f
                .debug_struct("DocumentCollection")
                .field("documents", &documents.len())
                .field("action", action)
                .finish(),
            ControllerEvent::FilterChanged => f.write_str("FilterChanged"),
            ControllerEvent::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}
