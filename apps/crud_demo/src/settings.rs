use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use persistence::RecordSchema;
use serde::Deserialize;
use shared::domain::PersistentProperty;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_file: PathBuf,
    pub class_name: String,
    pub required_properties: Vec<String>,
    pub optional_properties: Vec<String>,
    pub latency_ms: u64,
    pub log_filter: String,
    pub collection_limit: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("./data/documents.json"),
            class_name: "Task".into(),
            required_properties: vec!["title".into()],
            optional_properties: vec!["notes".into(), "status".into()],
            latency_ms: 0,
            log_filter: "info".into(),
            collection_limit: None,
        }
    }
}

impl Settings {
    pub fn schema(&self) -> RecordSchema {
        let required = self
            .required_properties
            .iter()
            .map(PersistentProperty::required);
        let optional = self.optional_properties.iter().map(PersistentProperty::new);
        RecordSchema::new(self.class_name.clone(), required.chain(optional))
    }
}

/// Defaults, then `path` if it exists, then `CRUD_DEMO__*` environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };

    apply_env_overrides(&mut settings, lookup);
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CRUD_DEMO__DATA_FILE") {
        settings.data_file = PathBuf::from(v);
    }

    if let Some(v) = lookup("CRUD_DEMO__LATENCY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.latency_ms = parsed;
        }
    }

    if let Some(v) = lookup("CRUD_DEMO__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(v) = lookup("CRUD_DEMO__COLLECTION_LIMIT") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.collection_limit = Some(parsed);
        }
    }
}

pub fn ensure_parent_dir_exists(path: &Path) -> anyhow::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for data file '{}'",
            parent.display(),
            path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use persistence::{Persistent, Record};

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings =
            load_settings_with(&dir.path().join("absent.toml"), |_| None).expect("defaults");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn reads_partial_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("crud_demo.toml");
        fs::write(
            &path,
            "class_name = \"Contact\"\nrequired_properties = [\"name\", \"email\"]\nlatency_ms = 250\n",
        )
        .expect("write settings");

        let settings = load_settings_with(&path, |_| None).expect("load");
        assert_eq!(settings.class_name, "Contact");
        assert_eq!(settings.required_properties, vec!["name", "email"]);
        assert_eq!(settings.log_filter, Settings::default().log_filter);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("crud_demo.toml");
        fs::write(&path, "latency_ms = \"soon\"").expect("write settings");
        let err = load_settings_with(&path, |_| None).expect_err("should fail");
        assert!(err.to_string().contains("invalid settings file"));
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CRUD_DEMO__DATA_FILE", "/tmp/other.json"),
            ("CRUD_DEMO__LATENCY_MS", "not-a-number"),
            ("CRUD_DEMO__COLLECTION_LIMIT", "5"),
        ]);
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.data_file, PathBuf::from("/tmp/other.json"));
        assert_eq!(settings.latency_ms, 0);
        assert_eq!(settings.collection_limit, Some(5));
    }

    #[test]
    fn schema_marks_required_properties() {
        let record = Record::new(std::sync::Arc::new(Settings::default().schema()));
        assert_eq!(record.class_name(), "Task");
        assert!(record.is_required("title"));
        assert!(!record.is_required("status"));
    }

    #[test]
    fn creates_parent_dir_for_data_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("documents.json");
        ensure_parent_dir_exists(&path).expect("prepare");
        assert!(dir.path().join("nested").exists());
    }
}
