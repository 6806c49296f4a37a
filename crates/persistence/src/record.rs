use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use shared::{
    domain::{DocumentId, PersistentProperty, PropChangeEvent},
    observable::{Observable, Unsubscriber},
};

use crate::{MemoryModel, Persistent, PropObserver};

const CLASS_NAME_KEY: &str = "__className";
const ID_KEY: &str = "id";

/// Class name and persistent property list shared by every [`Record`] of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    class_name: String,
    properties: Vec<PersistentProperty>,
}

impl RecordSchema {
    pub fn new(
        class_name: impl Into<String>,
        properties: impl IntoIterator<Item = PersistentProperty>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            properties: properties.into_iter().collect(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn properties(&self) -> &[PersistentProperty] {
        &self.properties
    }

    fn property(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties.iter().find(|property| property.name == name)
    }
}

/// A JSON-backed document whose shape is described by a [`RecordSchema`].
///
/// Required properties are valid once they hold a non-null value that is not an
/// empty string. Optional and unknown properties are always valid.
pub struct Record {
    id: DocumentId,
    schema: Arc<RecordSchema>,
    values: RwLock<Map<String, Value>>,
    changes: Observable<PropChangeEvent>,
}

impl Record {
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        Self::with_id(schema, DocumentId::generate())
    }

    pub fn with_id(schema: Arc<RecordSchema>, id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            schema,
            values: RwLock::new(Map::new()),
            changes: Observable::new(),
        }
    }

    pub fn from_json(schema: Arc<RecordSchema>, value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| anyhow!("record must be a JSON object, got {value}"))?;

        if let Some(class_name) = object.get(CLASS_NAME_KEY) {
            if class_name.as_str() != Some(schema.class_name()) {
                bail!(
                    "record class {class_name} does not match schema class {}",
                    schema.class_name()
                );
            }
        }

        let id = object
            .get(ID_KEY)
            .and_then(Value::as_str)
            .context("record is missing a string `id`")?;

        let values: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| key.as_str() != ID_KEY && key.as_str() != CLASS_NAME_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let record = Self::with_id(schema, id);
        *record.values.write().unwrap_or_else(PoisonError::into_inner) = values;
        Ok(record)
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn get(&self, property: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(property)
            .cloned()
    }

    /// Stores `value` and notifies observers, unless the value is unchanged.
    pub fn set(&self, property: &str, value: impl Into<Value>) {
        let new_value = value.into();
        let old_value = {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            if values.get(property) == Some(&new_value) {
                return;
            }
            values.insert(property.to_string(), new_value.clone())
        };

        self.changes.notify(&PropChangeEvent {
            document_id: self.id.clone(),
            property: property.to_string(),
            old_value,
            new_value: Some(new_value),
        });
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            CLASS_NAME_KEY.to_string(),
            Value::String(self.schema.class_name().to_string()),
        );
        object.insert(ID_KEY.to_string(), Value::String(self.id.to_string()));
        for (key, value) in self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("class_name", &self.schema.class_name())
            .field("id", &self.id)
            .field("values", &*self.values.read().unwrap_or_else(PoisonError::into_inner))
            .finish()
    }
}

impl Persistent for Record {
    fn id(&self) -> DocumentId {
        self.id.clone()
    }

    fn class_name(&self) -> &str {
        self.schema.class_name()
    }

    fn on_change(&self, observer: PropObserver) -> Unsubscriber {
        self.changes.subscribe(observer)
    }

    fn persistent_properties(&self) -> Vec<PersistentProperty> {
        self.schema.properties().to_vec()
    }

    fn is_required(&self, property: &str) -> bool {
        self.schema
            .property(property)
            .is_some_and(|property| property.required)
    }

    fn is_prop_value_valid(&self, property: &str) -> bool {
        if !self.is_required(property) {
            return true;
        }
        match self.get(property) {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        }
    }

    fn get_property(&self, property: &str) -> Option<Value> {
        self.get(property)
    }
}

impl MemoryModel<Record> {
    /// Loads `{ "<ClassName>": { "<id>": { ...record } } }`, keeping only the
    /// collection named after the schema class.
    pub fn from_collections(schema: Arc<RecordSchema>, data: &Value) -> Result<Self> {
        let Some(collection) = data.get(schema.class_name()) else {
            return Ok(Self::new());
        };
        let collection = collection.as_object().with_context(|| {
            format!("collection `{}` must be a JSON object", schema.class_name())
        })?;

        let records = collection
            .iter()
            .map(|(key, value)| {
                Record::from_json(Arc::clone(&schema), value)
                    .map(Arc::new)
                    .with_context(|| format!("invalid record `{key}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_documents(records))
    }

    pub async fn to_collections(&self) -> Value {
        let documents = self.documents().await;
        let mut collections = Map::new();
        for document in documents {
            let entry = collections
                .entry(document.class_name().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(collection) = entry {
                collection.insert(document.id().to_string(), document.to_json());
            }
        }
        Value::Object(collections)
    }
}
