//! On-disk store of screener model documents, one `<id>.json` per model.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::domain::ModelId;
use crate::error::ConfigError;
use crate::persist::{json_files, read_json, write_json, JsonFileError};
use crate::screener::ScreenerRegistry;

use super::ScreenerModel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: malformed model document: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model '{name}' is invalid: {source}")]
    Invalid {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("model not found: {0}")]
    NotFound(ModelId),
}

impl ModelError {
    fn from_json_file(path: &Path, err: JsonFileError) -> Self {
        match err {
            JsonFileError::Io(source) => ModelError::Io {
                path: path.to_path_buf(),
                source,
            },
            JsonFileError::Json(source) => ModelError::Malformed {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Loads, validates and persists screener models.
#[derive(Debug)]
pub struct ModelManager {
    dir: PathBuf,
    registry: Arc<ScreenerRegistry>,
    models: BTreeMap<ModelId, ScreenerModel>,
}

impl ModelManager {
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<ScreenerRegistry>) -> Self {
        Self {
            dir: dir.into(),
            registry,
            models: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry(&self) -> &ScreenerRegistry {
        &self.registry
    }

    /// Replace the in-memory set with every document in the directory.
    ///
    /// Aborts on the first unreadable, malformed or invalid document and
    /// leaves the previous set untouched. A missing directory loads nothing.
    pub fn load_all(&mut self) -> Result<usize, ModelError> {
        let files = json_files(&self.dir).map_err(|source| ModelError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut loaded = BTreeMap::new();
        for path in files {
            let model: ScreenerModel =
                read_json(&path).map_err(|e| ModelError::from_json_file(&path, e))?;
            self.validate(&model)?;
            loaded.insert(model.id, model);
        }

        tracing::info!(dir = %self.dir.display(), count = loaded.len(), "models loaded");
        self.models = loaded;
        Ok(self.models.len())
    }

    /// Models sorted by name.
    pub fn models(&self) -> Vec<&ScreenerModel> {
        let mut models: Vec<_> = self.models.values().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        models
    }

    /// Enabled models sorted by name.
    pub fn enabled(&self) -> Vec<&ScreenerModel> {
        self.models().into_iter().filter(|m| m.enabled).collect()
    }

    pub fn get(&self, id: ModelId) -> Option<&ScreenerModel> {
        self.models.get(&id)
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Option<&ScreenerModel> {
        self.models()
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn validate(&self, model: &ScreenerModel) -> Result<(), ModelError> {
        model
            .validate(&self.registry)
            .map_err(|source| ModelError::Invalid {
                name: model.name.clone(),
                source,
            })
    }

    /// Validate, stamp `updated_at`, and write atomically.
    pub fn save(&mut self, mut model: ScreenerModel) -> Result<&ScreenerModel, ModelError> {
        self.validate(&model)?;
        model.updated_at = Utc::now();
        let path = self.path_for(model.id);
        write_json(&path, &model).map_err(|source| ModelError::Io { path, source })?;
        tracing::debug!(model = %model.name, id = %model.id, "model saved");
        let id = model.id;
        self.models.insert(id, model);
        self.models.get(&id).ok_or(ModelError::NotFound(id))
    }

    /// Remove a model and its document.
    pub fn delete(&mut self, id: ModelId) -> Result<ScreenerModel, ModelError> {
        let model = self.models.remove(&id).ok_or(ModelError::NotFound(id))?;
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                self.models.insert(id, model);
                return Err(ModelError::Io { path, source });
            }
        }
        Ok(model)
    }

    fn path_for(&self, id: ModelId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}
