//! Mark data model
//!
//! A mark is one positioned, styled text annotation on a page. The
//! persisted shape ([`MarkFields`]) carries no identity; the in-memory
//! [`Mark`] adds a [`MarkId`] assigned by the owning store so undo and
//! deletion never depend on value equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type MarkId = u64;

/// Marks per zero-based page index, in insertion (z-) order.
pub type PageMarks = BTreeMap<u32, Vec<Mark>>;

pub const DEFAULT_FONT: &str = "Fira Code";
pub const DEFAULT_SIZE: u32 = 10;
pub const DEFAULT_WIDTH: u32 = 30;

pub const SIZE_RANGE: (u32, u32) = (5, 50);
pub const WIDTH_RANGE: (u32, u32) = (10, 200);

/// Style applied to marks that do not specify one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDefaults {
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default = "default_width")]
    pub width: u32,
}

fn default_font() -> String {
    DEFAULT_FONT.to_string()
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

impl Default for MarkDefaults {
    fn default() -> Self {
        Self {
            font: default_font(),
            size: default_size(),
            width: default_width(),
        }
    }
}

/// The mutable fields of a mark, as stored in the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkFields {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font: String,
    pub size: u32,
    pub width: u32,
}

impl MarkFields {
    /// Fields for a new mark at `(x, y)` using the default style.
    pub fn new(text: impl Into<String>, x: f64, y: f64, defaults: &MarkDefaults) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font: defaults.font.clone(),
            size: defaults.size,
            width: defaults.width,
        }
    }

    /// Clamp size and width into their allowed ranges.
    pub fn clamped(mut self) -> Self {
        self.size = self.size.clamp(SIZE_RANGE.0, SIZE_RANGE.1);
        self.width = self.width.clamp(WIDTH_RANGE.0, WIDTH_RANGE.1);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    id: MarkId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font: String,
    pub size: u32,
    pub width: u32,
}

impl Mark {
    pub(crate) fn from_fields(id: MarkId, fields: MarkFields) -> Self {
        let fields = fields.clamped();
        Self {
            id,
            text: fields.text,
            x: fields.x,
            y: fields.y,
            font: fields.font,
            size: fields.size,
            width: fields.width,
        }
    }

    pub fn id(&self) -> MarkId {
        self.id
    }

    /// Snapshot of the mark's fields without its identity.
    pub fn fields(&self) -> MarkFields {
        MarkFields {
            text: self.text.clone(),
            x: self.x,
            y: self.y,
            font: self.font.clone(),
            size: self.size,
            width: self.width,
        }
    }

    /// Overwrite every mutable field, keeping the identity.
    pub fn apply(&mut self, fields: MarkFields) {
        let fields = fields.clamped();
        self.text = fields.text;
        self.x = fields.x;
        self.y = fields.y;
        self.font = fields.font;
        self.size = fields.size;
        self.width = fields.width;
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}
