//! Per-document editing session
//!
//! Ties a [`MarkStore`], its [`UndoLog`] and the sidecar file together.
//! Every successful mutation (and every undo) is followed by a sidecar
//! save whose outcome goes to the session's [`Notifier`].
//!
//! A sidecar that exists but cannot be read is never overwritten: the
//! session starts empty and renames the file to a `.bak` before its first
//! save.

use crate::config::MarkConfig;
use crate::error::MarkError;
use crate::export::{export_document, ExportReport};
use crate::marks::{MarkDefaults, MarkFields, MarkId};
use crate::notify::{Notice, Notifier};
use crate::raster::MarkRenderer;
use crate::sidecar::{backup_path_for, sidecar_path_for};
use crate::store::MarkStore;
use crate::undo::{UndoAction, UndoLog};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct EditSession {
    pdf_path: PathBuf,
    sidecar_path: PathBuf,
    store: MarkStore,
    undo: UndoLog,
    defaults: MarkDefaults,
    page_count: Option<u32>,
    unreadable_sidecar: bool,
    notifier: Box<dyn Notifier>,
}

impl EditSession {
    /// Open the sidecar of `pdf_path`, starting empty if there is none.
    pub fn open(pdf_path: impl Into<PathBuf>, config: &MarkConfig, notifier: Box<dyn Notifier>) -> Self {
        let pdf_path = pdf_path.into();
        let sidecar_path = sidecar_path_for(&pdf_path, &config.session.sidecar_extension);
        let (store, unreadable_sidecar) =
            match MarkStore::try_load(&sidecar_path, &config.defaults) {
                Ok(store) => (store, false),
                Err(e) => {
                    tracing::warn!(
                        "Unreadable sidecar {} will be set aside on the next save: {}",
                        sidecar_path.display(),
                        e
                    );
                    (MarkStore::new(), true)
                }
            };
        Self {
            pdf_path,
            sidecar_path,
            store,
            undo: UndoLog::with_capacity(config.session.undo_capacity),
            defaults: config.defaults.clone(),
            page_count: None,
            unreadable_sidecar,
            notifier,
        }
    }

    /// Restrict edits to pages `0..page_count`.
    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }

    pub fn pdf_path(&self) -> &Path {
        &self.pdf_path
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    pub fn store(&self) -> &MarkStore {
        &self.store
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Fields for a new mark at `(x, y)` in the session's default style.
    pub fn new_fields(&self, text: impl Into<String>, x: f64, y: f64) -> MarkFields {
        MarkFields::new(text, x, y, &self.defaults)
    }

    /// Id of the `index`-th mark on `page`, in z-order.
    pub fn mark_id_at(&self, page: u32, index: usize) -> Option<MarkId> {
        self.store.page(page).get(index).map(|m| m.id())
    }

    fn page_in_range(&self, page: u32) -> bool {
        self.page_count.map_or(true, |count| page < count)
    }

    pub fn add_mark(&mut self, page: u32, fields: MarkFields) -> Option<MarkId> {
        if !self.page_in_range(page) {
            tracing::debug!("Ignoring add on page {} (out of range)", page);
            return None;
        }
        let id = self.store.add_mark(page, fields);
        self.undo.push(UndoAction::Add { page, id });
        self.save();
        Some(id)
    }

    pub fn delete_mark(&mut self, page: u32, id: MarkId) -> bool {
        let Some(mark) = self.store.remove_mark(page, id) else {
            return false;
        };
        self.undo.push(UndoAction::Delete { page, mark });
        self.save();
        true
    }

    /// Replace a mark's fields. Empty text is rejected.
    pub fn edit_mark(&mut self, id: MarkId, fields: MarkFields) -> bool {
        if fields.text.is_empty() {
            return false;
        }
        let Some(mark) = self.store.mark_mut(id) else {
            return false;
        };
        let before = mark.fields();
        mark.apply(fields);
        self.undo.push(UndoAction::Edit { id, before });
        self.save();
        true
    }

    pub fn move_mark(&mut self, id: MarkId, x: f64, y: f64) -> bool {
        let Some(mark) = self.store.mark_mut(id) else {
            return false;
        };
        let before = mark.position();
        mark.set_position(x, y);
        self.undo.push(UndoAction::Move { id, before });
        self.save();
        true
    }

    pub fn undo(&mut self) -> bool {
        if !self.undo.undo(&mut self.store) {
            return false;
        }
        self.save();
        self.notifier.notify(Notice::Undone);
        true
    }

    /// Write the sidecar. Failures are reported, never returned.
    pub fn save(&mut self) {
        if self.unreadable_sidecar && !self.set_aside_unreadable() {
            return;
        }
        let pdf_path = self.pdf_path.to_string_lossy();
        let notice = match self.store.save(&self.sidecar_path, &pdf_path) {
            Ok(()) => Notice::Saved(self.sidecar_path.clone()),
            Err(e) => Notice::SaveFailed {
                path: self.sidecar_path.clone(),
                error: e.to_string(),
            },
        };
        self.notifier.notify(notice);
    }

    /// Rename the unreadable sidecar out of the way. `false` if it is still
    /// in place, in which case nothing may be written over it.
    fn set_aside_unreadable(&mut self) -> bool {
        let backup = backup_path_for(&self.sidecar_path);
        match fs::rename(&self.sidecar_path, &backup) {
            Ok(()) => {
                self.notifier.notify(Notice::SetAside {
                    path: self.sidecar_path.clone(),
                    backup,
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                self.notifier.notify(Notice::SaveFailed {
                    path: self.sidecar_path.clone(),
                    error: format!("unreadable sidecar could not be moved aside: {}", e),
                });
                return false;
            }
        }
        self.unreadable_sidecar = false;
        true
    }

    /// Export the document with the current marks.
    pub fn export(&self, renderer: &dyn MarkRenderer, out_path: &Path) -> Result<ExportReport, MarkError> {
        let result = export_document(&self.pdf_path, self.store.pages(), renderer, out_path);
        let notice = match &result {
            Ok(report) => Notice::Exported(report.output.clone()),
            Err(e) => Notice::ExportFailed {
                path: out_path.to_path_buf(),
                error: e.to_string(),
            },
        };
        self.notifier.notify(notice);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn open(dir: &Path) -> (EditSession, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let session = EditSession::open(
            dir.join("exam.pdf"),
            &MarkConfig::default(),
            Box::new(notifier.clone()),
        );
        (session, notifier)
    }

    #[test]
    fn test_add_saves_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, notifier) = open(dir.path());

        let fields = session.new_fields("good", 10.0, 20.0);
        let id = session.add_mark(0, fields).unwrap();

        assert_eq!(session.store().mark(id).unwrap().text, "good");
        assert_eq!(
            notifier.notices(),
            vec![Notice::Saved(dir.path().join("exam.mlat"))]
        );

        // A fresh session sees the saved mark
        let (reopened, _) = open(dir.path());
        assert_eq!(reopened.store().page(0).len(), 1);
    }

    #[test]
    fn test_out_of_range_page_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (session, notifier) = open(dir.path());
        let mut session = session.with_page_count(2);

        let fields = session.new_fields("x", 0.0, 0.0);
        assert_eq!(session.add_mark(2, fields), None);
        assert!(session.store().is_empty());
        assert_eq!(session.undo_depth(), 0);
        assert!(notifier.notices().is_empty());
    }

    #[test]
    fn test_edit_rejects_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = open(dir.path());
        let id = session.add_mark(0, session.new_fields("keep", 0.0, 0.0)).unwrap();

        let mut fields = session.store().mark(id).unwrap().fields();
        fields.text = String::new();
        assert!(!session.edit_mark(id, fields));
        assert_eq!(session.store().mark(id).unwrap().text, "keep");
        assert_eq!(session.undo_depth(), 1);
    }

    #[test]
    fn test_edit_accepts_whitespace_text() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = open(dir.path());
        let id = session.add_mark(0, session.new_fields("keep", 0.0, 0.0)).unwrap();

        let mut fields = session.store().mark(id).unwrap().fields();
        fields.text = "   ".to_string();
        assert!(session.edit_mark(id, fields));
        assert_eq!(session.store().mark(id).unwrap().text, "   ");
        assert_eq!(session.undo_depth(), 2);
    }

    #[test]
    fn test_every_mutation_is_undoable() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, notifier) = open(dir.path());
        let keep = session.add_mark(0, session.new_fields("keep", 1.0, 1.0)).unwrap();
        let initial = session.store().to_sidecar("exam.pdf");

        let added = session.add_mark(0, session.new_fields("temp", 5.0, 5.0)).unwrap();
        assert!(session.move_mark(keep, 50.0, 60.0));
        let mut fields = session.store().mark(keep).unwrap().fields();
        fields.text = "changed".to_string();
        fields.size = 20;
        assert!(session.edit_mark(keep, fields));
        assert!(session.delete_mark(0, added));

        for _ in 0..4 {
            assert!(session.undo());
        }
        assert_eq!(session.store().to_sidecar("exam.pdf"), initial);

        // The very first add is still undoable
        assert!(session.undo());
        assert!(session.store().is_empty());
        assert!(!session.undo());

        let undone = notifier
            .notices()
            .iter()
            .filter(|n| **n == Notice::Undone)
            .count();
        assert_eq!(undone, 5);
    }

    #[test]
    fn test_missing_mark_operations_return_false() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, notifier) = open(dir.path());
        assert!(!session.move_mark(99, 0.0, 0.0));
        assert!(!session.delete_mark(0, 99));
        let fields = session.new_fields("x", 0.0, 0.0);
        assert!(!session.edit_mark(99, fields));
        assert!(notifier.notices().is_empty());
    }

    #[test]
    fn test_save_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let mut session = EditSession::open(
            dir.path().join("missing").join("exam.pdf"),
            &MarkConfig::default(),
            Box::new(notifier.clone()),
        );

        let id = session.add_mark(0, session.new_fields("x", 0.0, 0.0));
        assert!(id.is_some());
        assert_eq!(session.store().len(), 1);
        assert!(matches!(
            notifier.notices().as_slice(),
            [Notice::SaveFailed { .. }]
        ));
    }

    #[test]
    fn test_unreadable_sidecar_is_set_aside_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("exam.mlat");
        let damaged = r#"{"pdf_path":"exam.pdf","all_marks":{"0":[{"text":"keep me""#;
        std::fs::write(&sidecar, damaged).unwrap();

        let (mut session, notifier) = open(dir.path());
        assert!(session.store().is_empty());
        session.add_mark(0, session.new_fields("new", 1.0, 2.0)).unwrap();

        let backup = dir.path().join("exam.mlat.bak");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), damaged);
        assert_eq!(
            notifier.notices(),
            vec![
                Notice::SetAside {
                    path: sidecar.clone(),
                    backup,
                },
                Notice::Saved(sidecar.clone()),
            ]
        );

        // Only the first save moves the file
        session.add_mark(0, session.new_fields("more", 1.0, 2.0)).unwrap();
        assert!(!dir.path().join("exam.mlat.bak.1").exists());
        let (reopened, _) = open(dir.path());
        assert_eq!(reopened.store().page(0).len(), 2);
    }

    #[test]
    fn test_bad_page_key_keeps_other_marks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("exam.mlat"),
            r#"{"pdf_path":"exam.pdf","all_marks":{"0":[{"text":"keep me","x":1,"y":2}],"-1":[]}}"#,
        )
        .unwrap();

        let (mut session, _) = open(dir.path());
        assert_eq!(session.store().len(), 1);
        session.add_mark(0, session.new_fields("new", 0.0, 0.0)).unwrap();

        let saved = std::fs::read_to_string(dir.path().join("exam.mlat")).unwrap();
        assert!(saved.contains("keep me"));
        assert!(!dir.path().join("exam.mlat.bak").exists());
    }

    #[test]
    fn test_mark_id_at_follows_z_order() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = open(dir.path());
        let a = session.add_mark(3, session.new_fields("a", 0.0, 0.0)).unwrap();
        let b = session.add_mark(3, session.new_fields("b", 0.0, 0.0)).unwrap();
        assert_eq!(session.mark_id_at(3, 0), Some(a));
        assert_eq!(session.mark_id_at(3, 1), Some(b));
        assert_eq!(session.mark_id_at(3, 2), None);
    }

    #[test]
    fn test_export_failure_is_notified() {
        let dir = tempfile::tempdir().unwrap();
        let (session, notifier) = open(dir.path());
        let renderer = crate::compose::test_support::BlockRenderer {
            width_px: 1,
            height_px: 1,
        };
        let out = dir.path().join("exam_marked.pdf");
        assert!(session.export(&renderer, &out).is_err());
        assert!(matches!(
            notifier.notices().as_slice(),
            [Notice::ExportFailed { .. }]
        ));
    }
}
