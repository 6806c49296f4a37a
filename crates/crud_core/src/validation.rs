use std::{collections::HashMap, fmt, sync::Arc};

use persistence::Persistent;
use serde_json::Value;

pub type ValidatorFn = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct ValidatorEntry {
    predicate: ValidatorFn,
    error_message: Option<String>,
}

impl ValidatorEntry {
    pub fn accepts(&self, value: Option<&Value>) -> bool {
        (self.predicate)(value)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl fmt::Debug for ValidatorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorEntry")
            .field("error_message", &self.error_message)
            .finish_non_exhaustive()
    }
}

/// Per-property custom validators. A registered validator replaces the
/// document's built-in check for that property; it never runs alongside it.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    entries: HashMap<String, ValidatorEntry>,
}

impl ValidatorRegistry {
    pub fn add<F>(&mut self, property: impl Into<String>, predicate: F, error_message: Option<&str>)
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.entries.insert(
            property.into(),
            ValidatorEntry {
                predicate: Arc::new(predicate),
                error_message: error_message.map(str::to_string),
            },
        );
    }

    pub fn remove(&mut self, property: &str) -> Option<ValidatorEntry> {
        self.entries.remove(property)
    }

    pub fn error_message(&self, property: &str) -> Option<&str> {
        self.entries.get(property)?.error_message()
    }

    pub fn is_valid<D: Persistent>(&self, document: &D, property: &str) -> bool {
        match self.entries.get(property) {
            Some(entry) => entry.accepts(document.get_property(property).as_ref()),
            None => document.is_prop_value_valid(property),
        }
    }
}
