//! Sidecar persistence
//!
//! Marks live next to the PDF in a JSON file with the same base name:
//!
//! ```json
//! { "pdf_path": "exam.pdf", "all_marks": { "0": [ { "text": "good", "x": 10, "y": 20, ... } ] } }
//! ```
//!
//! JSON object keys are strings, the in-memory page index is `u32`. This
//! module is the only place that converts between the two.

use crate::error::MarkError;
use crate::marks::{MarkDefaults, MarkFields};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SIDECAR_EXTENSION: &str = "mlat";

/// Sidecar location for a PDF: same directory and base name, new extension.
pub fn sidecar_path_for(pdf_path: &Path, extension: &str) -> PathBuf {
    pdf_path.with_extension(extension)
}

/// First free `<sidecar>.bak`, `<sidecar>.bak.1`, ... next to `sidecar_path`.
pub fn backup_path_for(sidecar_path: &Path) -> PathBuf {
    let mut name = sidecar_path.as_os_str().to_owned();
    name.push(".bak");
    let first = PathBuf::from(&name);
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| {
            let mut numbered = name.clone();
            numbered.push(format!(".{}", n));
            PathBuf::from(numbered)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SidecarDocument {
    pub pdf_path: String,
    pub all_marks: BTreeMap<u32, Vec<MarkFields>>,
}

/// On-disk entry. Style fields are optional for sidecars written before
/// marks carried a font, size and width.
#[derive(Debug, Deserialize)]
struct StoredMark {
    text: String,
    x: f64,
    y: f64,
    font: Option<String>,
    size: Option<u32>,
    width: Option<u32>,
}

impl StoredMark {
    fn into_fields(self, defaults: &MarkDefaults) -> MarkFields {
        MarkFields {
            text: self.text,
            x: self.x,
            y: self.y,
            font: self.font.unwrap_or_else(|| defaults.font.clone()),
            size: self.size.unwrap_or(defaults.size),
            width: self.width.unwrap_or(defaults.width),
        }
    }
}

/// Pages and entries stay untyped until each one is checked on its own.
#[derive(Debug, Deserialize)]
struct StoredSidecar {
    #[serde(default)]
    pdf_path: String,
    #[serde(default)]
    all_marks: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct StoredSidecarRef<'a> {
    pdf_path: &'a str,
    all_marks: BTreeMap<String, &'a [MarkFields]>,
}

impl SidecarDocument {
    pub fn new(pdf_path: impl Into<String>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            all_marks: BTreeMap::new(),
        }
    }

    /// Parse sidecar JSON, filling missing style fields from `defaults`.
    ///
    /// Only a document that is not a JSON object of the expected shape is
    /// an error. A page key that is not a non-negative integer, a page
    /// value that is not a list, or a single malformed entry is skipped
    /// with a warning.
    pub fn from_json(json: &str, defaults: &MarkDefaults) -> Result<Self, MarkError> {
        let stored: StoredSidecar = serde_json::from_str(json)?;

        let mut all_marks = BTreeMap::new();
        for (key, entries) in stored.all_marks {
            let Ok(page) = key.trim().parse::<u32>() else {
                tracing::warn!("Skipping sidecar page with invalid key {:?}", key);
                continue;
            };
            let Value::Array(entries) = entries else {
                tracing::warn!("Skipping sidecar page {}: not a list of marks", page);
                continue;
            };
            let marks = entries
                .into_iter()
                .enumerate()
                .filter_map(|(index, entry)| {
                    match serde_json::from_value::<StoredMark>(entry) {
                        Ok(mark) => Some(mark.into_fields(defaults)),
                        Err(e) => {
                            tracing::warn!("Skipping mark {} on page {}: {}", index, page, e);
                            None
                        }
                    }
                })
                .collect();
            all_marks.insert(page, marks);
        }

        Ok(Self {
            pdf_path: stored.pdf_path,
            all_marks,
        })
    }

    pub fn to_json(&self) -> Result<String, MarkError> {
        let stored = StoredSidecarRef {
            pdf_path: &self.pdf_path,
            all_marks: self
                .all_marks
                .iter()
                .map(|(page, marks)| (page.to_string(), marks.as_slice()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&stored)?)
    }

    pub fn read(path: &Path, defaults: &MarkDefaults) -> Result<Self, MarkError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json, defaults)
    }

    pub fn write(&self, path: &Path) -> Result<(), MarkError> {
        let json = self.to_json()?;
        fs::write(path, json)?;
        Ok(())
    }
}
