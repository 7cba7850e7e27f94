//! `.macro` files and the macro library directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::codec;
use crate::error::{Result, SerializationError};
use crate::ops::Operation;
use crate::sidecar::write_atomically;

pub const MACRO_EXTENSION: &str = "macro";

/// A path guaranteed to carry the `.macro` extension.
#[derive(Debug, Clone)]
pub struct MacroPath(PathBuf);

impl MacroPath {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let mut normalized = path.as_ref().to_path_buf();
        if !has_macro_extension(&normalized) {
            let mut name = normalized.file_name().unwrap_or_default().to_os_string();
            name.push(".");
            name.push(MACRO_EXTENSION);
            normalized.set_file_name(name);
        }
        Self(normalized)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

fn has_macro_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MACRO_EXTENSION))
}

/// On-disk layout. `operations` holds a codec string so the same decoder
/// serves sidecars and macros.
#[derive(Debug, Serialize, Deserialize)]
struct MacroDocument {
    name: String,
    recorded_at: DateTime<Utc>,
    operations: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub recorded_at: DateTime<Utc>,
    pub operations: Vec<Operation>,
}

impl Macro {
    pub fn new(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self {
            name: name.into(),
            recorded_at: Utc::now(),
            operations,
        }
    }

    pub fn ops_string(&self) -> String {
        codec::encode(&self.operations)
    }

    pub fn to_document(&self) -> String {
        let doc = MacroDocument {
            name: self.name.clone(),
            recorded_at: self.recorded_at,
            operations: self.ops_string(),
        };
        serde_json::to_string_pretty(&doc).expect("macro document always serializes")
    }

    /// Parse a macro document, or a bare codec string written by older builds.
    pub fn parse(raw: &str, fallback_name: &str) -> std::result::Result<Self, SerializationError> {
        if let Ok(doc) = serde_json::from_str::<MacroDocument>(raw) {
            return Ok(Self {
                name: doc.name,
                recorded_at: doc.recorded_at,
                operations: codec::try_decode(&doc.operations)?,
            });
        }
        Ok(Self {
            name: fallback_name.to_string(),
            recorded_at: Utc::now(),
            operations: codec::try_decode(raw)?,
        })
    }

    /// Writes to `path` with the `.macro` extension enforced; returns the
    /// path actually written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = MacroPath::new(path).into_path();
        write_atomically(&path, self.to_document().as_bytes())?;
        debug!("saved macro '{}' to {}", self.name, path.display());
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        Ok(Self::parse(&raw, &file_stem(path))?)
    }
}

/// The codec string stored in a macro file's contents, without decoding it.
pub fn ops_string_from_contents(raw: &str) -> String {
    match serde_json::from_str::<MacroDocument>(raw) {
        Ok(doc) => doc.operations,
        Err(_) => raw.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroEntry {
    pub name: String,
    pub path: PathBuf,
    pub operations: usize,
}

/// List every readable `.macro` file under `dir`, sorted by name. Files that
/// fail to parse are skipped.
pub fn list_macros(dir: &Path) -> Result<Vec<MacroEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !has_macro_extension(entry.path()) {
            continue;
        }
        match Macro::load(entry.path()) {
            Ok(m) => out.push(MacroEntry {
                name: m.name,
                path: entry.path().to_path_buf(),
                operations: m.operations.len(),
            }),
            Err(err) => warn!("skipping macro {}: {err}", entry.path().display()),
        }
    }
    out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(out)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
