//! Persisted session properties.
//!
//! The state file is a JSON object mapping each declared property name to a
//! tagged string produced by [`crate::codec`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::codec::{self, PropertyValue};
use crate::error::StateError;

/// Name to tagged-value mapping as stored on disk
pub type SerializedState = BTreeMap<String, String>;

/// The declared set of persisted session properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    CurrentDirectory,
    History,
}

impl Property {
    pub const ALL: [Property; 2] = [Property::CurrentDirectory, Property::History];

    pub fn name(self) -> &'static str {
        match self {
            Property::CurrentDirectory => "currentDirectory",
            Property::History => "history",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Value used when nothing was persisted
    pub fn default_value(self, home_dir: &Path) -> PropertyValue {
        match self {
            Property::CurrentDirectory => {
                PropertyValue::String(home_dir.to_string_lossy().to_string())
            }
            Property::History => PropertyValue::History(Vec::new()),
        }
    }
}

/// Reads and writes the session state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    home_dir: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            home_dir: home_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared defaults, encoded
    pub fn defaults(&self) -> SerializedState {
        Property::ALL
            .into_iter()
            .map(|p| (p.name().to_string(), codec::encode(&p.default_value(&self.home_dir))))
            .collect()
    }

    pub fn default_value(&self, property: Property) -> PropertyValue {
        property.default_value(&self.home_dir)
    }

    /// Read the state file. Values are not decoded here.
    pub fn load(&self) -> Result<SerializedState, StateError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| StateError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the state file, falling back to the declared defaults.
    ///
    /// Declared properties missing from the file take their default, and
    /// keys that are not declared are kept so the caller can report them.
    pub fn load_or_defaults(&self) -> SerializedState {
        let mut state = match self.load() {
            Ok(state) => state,
            Err(StateError::Read { ref source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::debug!("No state file at {}, using defaults", self.path.display());
                return self.defaults();
            }
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                return self.defaults();
            }
        };
        for (name, value) in self.defaults() {
            state.entry(name).or_insert(value);
        }
        state
    }

    /// Encode `values` and replace the state file in one atomic write
    pub fn save(&self, values: &[(Property, PropertyValue)]) -> Result<(), StateError> {
        let state: serde_json::Map<String, serde_json::Value> = values
            .iter()
            .map(|(p, v)| (p.name().to_string(), codec::encode(v).into()))
            .collect();

        let write_err = |source: std::io::Error| StateError::Write {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::Value::Object(state).to_string();
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
