//! Model storage with file persistence
//!
//! Keeps models in memory keyed by their command-line name
//! (`modeler:<file stem>`), optionally backed by a directory of `.model`
//! files that is loaded on startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::{load_file, save_file, MODEL_EXTENSION};
use crate::error::Result;
use crate::model::{WorkflowModel, COMMAND_PREFIX};

/// Summary of a stored model (for listing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub command_name: String,
    pub name: String,
    pub group: String,
    pub node_count: usize,
    pub input_count: usize,
}

/// In-memory model store with optional directory persistence
///
/// # Example
///
/// ```ignore
/// let mut store = ModelStore::with_persistence("~/.modeler/models");
/// let count = store.load_from_disk()?;
/// let key = store.insert(model)?; // written to <dir>/<name>.model
/// ```
#[derive(Debug, Default)]
pub struct ModelStore {
    models: BTreeMap<String, WorkflowModel>,
    persist_path: Option<PathBuf>,
}

impl ModelStore {
    /// Create a store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists to the given directory
    ///
    /// The directory is created on the first save.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            models: BTreeMap::new(),
            persist_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Load every `.model` file from the persistence directory
    ///
    /// Files that fail to load are logged and skipped. Returns the number
    /// of models loaded.
    pub fn load_from_disk(&mut self) -> Result<usize> {
        let Some(ref dir) = self.persist_path else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != MODEL_EXTENSION) {
                continue;
            }
            match load_file(&path) {
                Ok(model) => {
                    log::info!("Loaded model '{}' from {:?}", model.name, path);
                    loaded.push(model);
                }
                Err(e) => log::warn!("Failed to load model from {:?}: {}", path, e),
            }
        }

        let count = loaded.len();
        for model in loaded {
            self.models.insert(store_key(&model), model);
        }
        Ok(count)
    }

    /// Insert or replace a model, saving it when persistence is enabled
    ///
    /// Returns the key the model is stored under.
    pub fn insert(&mut self, mut model: WorkflowModel) -> Result<String> {
        if let Some(ref dir) = self.persist_path {
            std::fs::create_dir_all(dir)?;
            let stem = model
                .source_path()
                .and_then(Path::file_stem)
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| file_stem_for(&model.name));
            let path = dir.join(format!("{}.{}", stem, MODEL_EXTENSION));
            save_file(&mut model, &path)?;
        }
        let key = store_key(&model);
        self.models.insert(key.clone(), model);
        Ok(key)
    }

    /// Remove a model, deleting its file when it lives in the store directory
    pub fn remove(&mut self, command_name: &str) -> Result<Option<WorkflowModel>> {
        let Some(model) = self.models.remove(command_name) else {
            return Ok(None);
        };
        if let (Some(dir), Some(path)) = (&self.persist_path, model.source_path()) {
            if path.starts_with(dir) && path.exists() {
                std::fs::remove_file(path)?;
                log::debug!("Deleted model '{}' at {:?}", command_name, path);
            }
        }
        Ok(Some(model))
    }

    /// Get a model by command-line name
    pub fn get(&self, command_name: &str) -> Option<&WorkflowModel> {
        self.models.get(command_name)
    }

    pub fn contains(&self, command_name: &str) -> bool {
        self.models.contains_key(command_name)
    }

    /// List all stored models
    pub fn list(&self) -> Vec<ModelMetadata> {
        self.models
            .iter()
            .map(|(key, m)| ModelMetadata {
                command_name: key.clone(),
                name: m.name.clone(),
                group: m.group.clone(),
                node_count: m.nodes().len(),
                input_count: m.inputs().len(),
            })
            .collect()
    }

    /// All command-line names, sorted
    pub fn command_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

/// Key of a model: its command-line name, or one derived from its name
/// for models without a file
fn store_key(model: &WorkflowModel) -> String {
    model.command_line_name().unwrap_or_else(|| {
        format!("{}{}", COMMAND_PREFIX, file_stem_for(&model.name).to_lowercase())
    })
}

/// File stem for a model name, with path-unsafe characters replaced
fn file_stem_for(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim().is_empty() {
        "model".to_string()
    } else {
        stem
    }
}
