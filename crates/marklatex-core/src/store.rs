//! In-memory mark storage for one open document

use crate::error::MarkError;
use crate::marks::{Mark, MarkDefaults, MarkFields, MarkId, PageMarks};
use crate::sidecar::SidecarDocument;
use std::path::Path;

/// Owns every mark of the currently open document.
///
/// Marks are addressed by [`MarkId`]; ids are assigned on insertion and
/// never reused within one store.
#[derive(Debug, Clone, Default)]
pub struct MarkStore {
    pages: PageMarks,
    next_id: MarkId,
}

impl MarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load marks from a sidecar file.
    ///
    /// A missing or unreadable sidecar yields an empty store.
    pub fn load(sidecar_path: &Path, defaults: &MarkDefaults) -> Self {
        Self::try_load(sidecar_path, defaults).unwrap_or_else(|e| {
            tracing::warn!(
                "Ignoring unreadable sidecar {}: {}",
                sidecar_path.display(),
                e
            );
            Self::new()
        })
    }

    /// Like [`MarkStore::load`], but an unreadable sidecar is an error so
    /// the caller can keep it from being overwritten. A missing one is not.
    pub fn try_load(sidecar_path: &Path, defaults: &MarkDefaults) -> Result<Self, MarkError> {
        if !sidecar_path.exists() {
            tracing::debug!("No sidecar at {}", sidecar_path.display());
            return Ok(Self::new());
        }

        let store = Self::from_sidecar(SidecarDocument::read(sidecar_path, defaults)?);
        tracing::debug!(
            "Loaded {} marks from {}",
            store.len(),
            sidecar_path.display()
        );
        Ok(store)
    }

    pub fn from_sidecar(doc: SidecarDocument) -> Self {
        let mut store = Self::new();
        for (page, marks) in doc.all_marks {
            store.ensure_page(page);
            for fields in marks {
                store.add_mark(page, fields);
            }
        }
        store
    }

    pub fn to_sidecar(&self, pdf_path: &str) -> SidecarDocument {
        SidecarDocument {
            pdf_path: pdf_path.to_string(),
            all_marks: self
                .pages
                .iter()
                .map(|(page, marks)| (*page, marks.iter().map(Mark::fields).collect()))
                .collect(),
        }
    }

    /// Write all marks to `sidecar_path`.
    pub fn save(&self, sidecar_path: &Path, pdf_path: &str) -> Result<(), MarkError> {
        self.to_sidecar(pdf_path).write(sidecar_path)
    }

    /// Create an empty mark list for `page` if there is none.
    pub fn ensure_page(&mut self, page: u32) -> &mut Vec<Mark> {
        self.pages.entry(page).or_default()
    }

    /// Append a new mark to `page` and return its id.
    pub fn add_mark(&mut self, page: u32, fields: MarkFields) -> MarkId {
        let id = self.next_id;
        self.next_id += 1;
        self.ensure_page(page).push(Mark::from_fields(id, fields));
        id
    }

    /// Append an existing mark record (keeping its id) to `page`.
    pub fn restore_mark(&mut self, page: u32, mark: Mark) {
        self.next_id = self.next_id.max(mark.id() + 1);
        self.ensure_page(page).push(mark);
    }

    /// Remove the mark with `id` from `page`. Absent marks are ignored.
    pub fn remove_mark(&mut self, page: u32, id: MarkId) -> Option<Mark> {
        let marks = self.pages.get_mut(&page)?;
        let pos = marks.iter().position(|m| m.id() == id)?;
        Some(marks.remove(pos))
    }

    /// Page index and position of the mark with `id`.
    pub fn locate(&self, id: MarkId) -> Option<(u32, usize)> {
        self.pages.iter().find_map(|(page, marks)| {
            marks
                .iter()
                .position(|m| m.id() == id)
                .map(|pos| (*page, pos))
        })
    }

    pub fn mark(&self, id: MarkId) -> Option<&Mark> {
        self.pages
            .values()
            .flat_map(|marks| marks.iter())
            .find(|m| m.id() == id)
    }

    pub fn mark_mut(&mut self, id: MarkId) -> Option<&mut Mark> {
        self.pages
            .values_mut()
            .flat_map(|marks| marks.iter_mut())
            .find(|m| m.id() == id)
    }

    pub fn page(&self, page: u32) -> &[Mark] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pages(&self) -> &PageMarks {
        &self.pages
    }

    /// Total number of marks across all pages.
    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
