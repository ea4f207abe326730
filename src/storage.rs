//! Namespaced JSON records on local disk
//!
//! Each namespace maps to one `<namespace>.json` file in the data directory
//! (~/.local/share/rmcp-batteries by default).

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory for this application
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("rmcp-batteries"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a namespace
    pub fn path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }

    /// Raw record contents, `None` if the record was never written
    pub fn read(&self, namespace: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(namespace)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace a record. Writes to a sibling temp file first so a crash
    /// never leaves a half-written record behind.
    pub fn write(&self, namespace: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(namespace);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)
    }

    pub fn load<T: DeserializeOwned>(&self, namespace: &str) -> anyhow::Result<Option<T>> {
        let Some(contents) = self.read(namespace)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt record '{}'", namespace))?;
        Ok(Some(value))
    }

    pub fn save<T: Serialize + ?Sized>(&self, namespace: &str, value: &T) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(value)?;
        self.write(namespace, &contents)
            .with_context(|| format!("Failed to write {:?}", self.path(namespace)))?;
        tracing::debug!("Saved record '{}'", namespace);
        Ok(())
    }
}
