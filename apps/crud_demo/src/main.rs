use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crud_core::{ControllerEvent, CrudDelegate, DocumentController, ModelBinding};
use persistence::{MemoryModel, Model, Persistent, Record, RecordSchema};
use serde_json::Value;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod settings;

#[derive(Parser, Debug)]
#[command(about = "Drive a document controller over a JSON fixture file")]
struct Args {
    #[arg(long, default_value = "crud_demo.toml")]
    config: PathBuf,
    #[arg(long)]
    data_file: Option<PathBuf>,
    #[arg(long)]
    latency_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the collection, optionally filtered in memory.
    List {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long = "where", value_parser = parse_assignment)]
        conditions: Vec<(String, Value)>,
    },
    /// Create a document, or update the one with `--id`.
    Store {
        #[arg(long)]
        id: Option<String>,
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        values: Vec<(String, Value)>,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

/// `prop=value`, where `value` is JSON when it parses and a plain string otherwise.
fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (property, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected prop=value, got '{raw}'"))?;
    if property.is_empty() {
        return Err(format!("missing property name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((property.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = settings::load_settings(&args.config)?;
    if let Some(data_file) = args.data_file {
        settings.data_file = data_file;
    }
    if let Some(latency_ms) = args.latency_ms {
        settings.latency_ms = latency_ms;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let schema = Arc::new(settings.schema());
    let mut data = read_fixture(&settings.data_file)?;
    let model = Arc::new(
        MemoryModel::from_collections(Arc::clone(&schema), &data)?
            .with_latency(Duration::from_millis(settings.latency_ms)),
    );
    let controller = build_controller(Arc::clone(&model), Arc::clone(&schema));

    match args.command {
        Command::List { limit, conditions } => {
            let documents = controller
                .document_collection(limit.or(settings.collection_limit))
                .await?;
            if !conditions.is_empty() {
                controller.set_filter(move |document: &Record| {
                    conditions
                        .iter()
                        .all(|(property, value)| document.get(property).as_ref() == Some(value))
                });
            }
            let listed: Vec<Value> = controller
                .filter(documents)
                .iter()
                .map(|document| document.to_json())
                .collect();
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        Command::Store { id, values } => {
            if let Some(id) = id {
                let existing = model
                    .documents()
                    .await
                    .into_iter()
                    .find(|document| document.id().as_str() == id);
                let document = existing
                    .unwrap_or_else(|| Arc::new(Record::with_id(Arc::clone(&schema), id)));
                controller.set_document(Some(document));
            }
            let document = controller.document().context("no document to store")?;
            for (property, value) in values {
                document.set(&property, value);
            }

            let missing = controller.non_filled_required_properties()?;
            if !missing.is_empty() {
                bail!("required properties not filled: {}", missing.join(", "));
            }

            controller.store_document().await?;
            write_fixture(&settings.data_file, &mut data, &schema, &model).await?;
            println!("{}", serde_json::to_string_pretty(&document.to_json())?);
        }
        Command::Delete { id } => {
            let Some(document) = model
                .documents()
                .await
                .into_iter()
                .find(|document| document.id().as_str() == id)
            else {
                bail!("no {} with id '{id}'", schema.class_name());
            };

            controller.set_document(Some(document)).delete_document().await?;
            write_fixture(&settings.data_file, &mut data, &schema, &model).await?;
            println!("deleted {id}");
        }
    }

    Ok(())
}

fn build_controller(
    model: Arc<MemoryModel<Record>>,
    schema: Arc<RecordSchema>,
) -> DocumentController<Record> {
    let model: Arc<dyn Model<Record>> = model;
    let delegate: Arc<dyn CrudDelegate<Record>> = Arc::new(ModelBinding::new(model, move || {
        Arc::new(Record::new(Arc::clone(&schema)))
    }));
    let controller = DocumentController::new(delegate);

    controller.on_progress(|event| {
        debug!(
            busy = event.busy,
            overall_progress = event.overall_progress,
            stages = ?event.stages.keys().collect::<Vec<_>>(),
            "progress"
        );
    });
    controller.on_change(|event: &ControllerEvent<Record>| match event {
        ControllerEvent::DocumentCollection { documents, action } => {
            info!(?action, count = documents.len(), "collection refreshed");
        }
        ControllerEvent::DocumentProps(change) => {
            debug!(property = %change.property, value = ?change.new_value, "document edited");
        }
        ControllerEvent::Error(err) => error!(%err, "controller reported an error"),
        other => debug!(event = ?other, "controller event"),
    });

    controller
}

fn read_fixture(path: &Path) -> Result<Value> {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in data file '{}'", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "data file not found; starting empty");
            Ok(Value::Object(Default::default()))
        }
        Err(err) => Err(err).with_context(|| format!("failed to read '{}'", path.display())),
    }
}

/// Replaces this class's collection in `data` and writes the whole file back.
async fn write_fixture(
    path: &Path,
    data: &mut Value,
    schema: &RecordSchema,
    model: &MemoryModel<Record>,
) -> Result<()> {
    let exported = model.to_collections().await;
    let collection = exported
        .get(schema.class_name())
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let Value::Object(collections) = data else {
        bail!("data file '{}' must hold a JSON object", path.display());
    };
    collections.insert(schema.class_name().to_string(), collection);

    settings::ensure_parent_dir_exists(path)?;
    fs::write(path, serde_json::to_string_pretty(&*data)?)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_json_and_plain_assignments() {
        assert_eq!(
            parse_assignment("count=3").expect("json"),
            ("count".to_string(), json!(3))
        );
        assert_eq!(
            parse_assignment("title=Write docs").expect("plain"),
            ("title".to_string(), json!("Write docs"))
        );
        assert_eq!(
            parse_assignment("expr=a=b").expect("first equals splits"),
            ("expr".to_string(), json!("a=b"))
        );
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("=value").is_err());
    }

    #[tokio::test]
    async fn write_fixture_keeps_other_collections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("documents.json");
        let schema = Arc::new(settings::Settings::default().schema());
        let mut data = json!({
            "Invoice": { "i1": { "__className": "Invoice", "id": "i1" } },
            "Task": { "t1": { "__className": "Task", "id": "t1", "title": "Old" } }
        });
        let model = MemoryModel::from_collections(Arc::clone(&schema), &data).expect("load");
        model
            .delete(&shared::domain::DocumentId::from("t1"))
            .await
            .expect("delete");

        write_fixture(&path, &mut data, &schema, &model)
            .await
            .expect("write");

        let written = read_fixture(&path).expect("read back");
        assert_eq!(written["Task"], json!({}));
        assert_eq!(written["Invoice"]["i1"]["id"], json!("i1"));
    }

    #[test]
    fn missing_fixture_reads_as_empty_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = read_fixture(&dir.path().join("absent.json")).expect("empty");
        assert_eq!(data, json!({}));
    }

    #[tokio::test]
    async fn controller_lists_fixture_documents() {
        let schema = Arc::new(settings::Settings::default().schema());
        let data = json!({
            "Task": {
                "t1": { "__className": "Task", "id": "t1", "title": "One" },
                "t2": { "__className": "Task", "id": "t2", "title": "Two" }
            }
        });
        let model =
            Arc::new(MemoryModel::from_collections(Arc::clone(&schema), &data).expect("load"));
        let controller = build_controller(model, schema);

        let documents = controller.document_collection(None).await.expect("list");
        assert_eq!(documents.len(), 2);
    }
}
