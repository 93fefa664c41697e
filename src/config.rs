// Engine Configuration
// The host platform stores settings as a loose JSON document; this module
// validates that document once per operation into a strict typed shape.
//
// Three outcomes:
// - a required setting absent or empty: the engine is inert (every entry
//   point no-ops, no error)
// - a required setting present with the wrong JSON shape: fatal ConfigError
// - otherwise: a fully typed SyncConfig

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// TYPED CONFIGURATION
// ============================================================================

/// Validated settings for the role-sync engine, read fresh at the start of
/// each top-level operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Name of the platform role this engine manages.
    pub role: String,

    /// Membership types whose primary memberships confer the role.
    pub membership_type_ids: HashSet<i64>,

    /// Whether decision logging is enabled.
    pub logging: bool,
}

// ============================================================================
// CONFIGURATION ERROR
// ============================================================================

/// A required setting exists but has the wrong shape. This is the one fatal
/// configuration state: the operation aborts instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: String,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Setting '{}' should be of type: {}; {} found",
            self.field, self.expected, self.found
        )
    }
}

impl std::error::Error for ConfigError {}

/// JSON type label used in ConfigError messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SETTINGS STORE
// ============================================================================

/// Source of the raw settings document. Implemented by host-platform glue;
/// the engine reads through this on every top-level operation rather than
/// assuming settings are immutable across requests.
pub trait SettingsStore {
    /// Fetch the raw settings document, or None when none is stored.
    fn load(&self) -> Result<Option<Value>>;
}

/// Settings held in a JSON file on disk.
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileSettings {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SettingsStore for JsonFileSettings {
    fn load(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file: {:?}", self.path))?;
        let document = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", self.path))?;
        Ok(Some(document))
    }
}

/// Fixed in-memory settings document.
pub struct StaticSettings(pub Option<Value>);

impl SettingsStore for StaticSettings {
    fn load(&self) -> Result<Option<Value>> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

impl SyncConfig {
    /// Validate a raw settings document into typed configuration.
    ///
    /// Returns Ok(None) when a required setting is absent or empty, and
    /// ConfigError when one is present with the wrong shape.
    pub fn from_value(document: &Value) -> Result<Option<SyncConfig>, ConfigError> {
        let Some(settings) = document.as_object() else {
            return Err(ConfigError {
                field: "settings".to_string(),
                expected: "object".to_string(),
                found: json_type_name(document).to_string(),
            });
        };

        let role = match settings.get("role") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(role)) => {
                if role.is_empty() {
                    return Ok(None);
                }
                role.clone()
            }
            Some(other) => {
                return Err(ConfigError {
                    field: "role".to_string(),
                    expected: "string".to_string(),
                    found: json_type_name(other).to_string(),
                });
            }
        };

        let membership_type_ids = match settings.get("membership_type_ids") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(entries)) => {
                if entries.is_empty() {
                    return Ok(None);
                }
                let mut type_ids = HashSet::new();
                for entry in entries {
                    match entry.as_i64() {
                        Some(type_id) => {
                            type_ids.insert(type_id);
                        }
                        None => {
                            return Err(ConfigError {
                                field: "membership_type_ids".to_string(),
                                expected: "array of integers".to_string(),
                                found: format!("array containing {}", json_type_name(entry)),
                            });
                        }
                    }
                }
                type_ids
            }
            Some(other) => {
                return Err(ConfigError {
                    field: "membership_type_ids".to_string(),
                    expected: "array".to_string(),
                    found: json_type_name(other).to_string(),
                });
            }
        };

        // Optional; the host stores it as a bool or a 0/1 flag.
        let logging = match settings.get("logging") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(flag)) => flag.as_i64().unwrap_or(0) != 0,
            _ => false,
        };

        Ok(Some(SyncConfig {
            role,
            membership_type_ids,
            logging,
        }))
    }

    /// Read and validate settings from a store. Store failures and shape
    /// errors both surface; a missing document is the inert state.
    pub fn load_from(store: &dyn SettingsStore) -> Result<Option<SyncConfig>> {
        match store.load()? {
            None => Ok(None),
            Some(document) => Ok(SyncConfig::from_value(&document)?),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
