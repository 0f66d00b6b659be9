//! Keyed JSON document store.
//!
//! One file per document. Writes go to a sibling temp file first and are
//! renamed into place, so readers see either the old or the new document.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{DocumentKey, StorageConfig, StorageError};

/// JSON document store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    config: StorageConfig,
}

impl JsonStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn exists(&self, key: &DocumentKey) -> bool {
        key.validate().is_ok() && key.path(&self.config).exists()
    }

    /// Read a document, or `None` if it has never been written.
    pub fn read<T: DeserializeOwned>(&self, key: &DocumentKey) -> Result<Option<T>, StorageError> {
        key.validate()?;
        let path = key.path(&self.config);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let document = serde_json::from_reader(BufReader::new(file))?;
        debug!("Read {} from {:?}", key, path);
        Ok(Some(document))
    }

    /// Read a document as untyped JSON.
    pub fn read_value(&self, key: &DocumentKey) -> Result<serde_json::Value, StorageError> {
        let path = key.path(&self.config);
        self.read(key)?.ok_or(StorageError::PathNotFound(path))
    }

    /// Replace a document.
    pub fn write<T: Serialize>(&self, key: &DocumentKey, document: &T) -> Result<(), StorageError> {
        key.validate()?;
        let path = key.path(&self.config);
        ensure_parent(&path)?;

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, document)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        debug!("Wrote {} to {:?}", key, path);
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
