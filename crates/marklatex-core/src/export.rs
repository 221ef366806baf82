//! Exporting marked documents
//!
//! A single export writes `<base>_marked.pdf` next to the source. A batch
//! export walks a folder tree and mirrors it under a sibling directory:
//!
//! ```text
//! exams/a.pdf          -> marked/exams/a_marked.pdf
//! exams/week2/b.pdf    -> marked/exams/week2/b_marked.pdf
//! ```

use crate::compose::{compose, PageLayout};
use crate::config::{ExportConfig, MarkConfig};
use crate::error::MarkError;
use crate::marks::PageMarks;
use crate::normalize::normalize;
use crate::raster::MarkRenderer;
use crate::sidecar::sidecar_path_for;
use crate::store::MarkStore;
use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub output: PathBuf,
    pub pages: Vec<PageLayout>,
}

impl ExportReport {
    pub fn placed_marks(&self) -> usize {
        self.pages.iter().map(|p| p.placed_marks).sum()
    }

    pub fn skipped_marks(&self) -> usize {
        self.pages.iter().map(|p| p.skipped_marks).sum()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub exported: Vec<ExportReport>,
    /// Source PDFs that could not be exported, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Source PDFs skipped because they have no marks file
    pub without_sidecar: Vec<PathBuf>,
}

/// `<dir>/<base><suffix>.pdf` for a source at `<dir>/<base>.pdf`.
pub fn default_output_path(pdf_path: &Path, suffix: &str) -> PathBuf {
    let stem = pdf_path.file_stem().unwrap_or_default().to_string_lossy();
    pdf_path.with_file_name(format!("{}{}.pdf", stem, suffix))
}

/// Output path of `pdf_path` in a grouped export of `root`.
///
/// The result is `<parent of root>/<grouped_dir>/<root name>/<subfolder>/<base><suffix>.pdf`
/// where `<subfolder>` is the PDF's directory relative to `root`.
pub fn grouped_output_path(pdf_path: &Path, root: &Path, config: &ExportConfig) -> PathBuf {
    let root_name = root.file_name().unwrap_or_default();
    let base = root.parent().unwrap_or_else(|| Path::new(""));
    let subfolder = pdf_path
        .parent()
        .and_then(|dir| dir.strip_prefix(root).ok())
        .unwrap_or_else(|| Path::new(""));
    let file_name = default_output_path(pdf_path, &config.suffix);
    let file_name = file_name.file_name().unwrap_or_default();

    base.join(&config.grouped_dir)
        .join(root_name)
        .join(subfolder)
        .join(file_name)
}

/// Bake `marks` into a copy of `pdf_path` written to `out_path`.
#[instrument(skip(marks, renderer), fields(pdf = %pdf_path.display()))]
pub fn export_document(
    pdf_path: &Path,
    marks: &PageMarks,
    renderer: &dyn MarkRenderer,
    out_path: &Path,
) -> Result<ExportReport, MarkError> {
    let mut source = Document::load(pdf_path).map_err(|e| MarkError::ParseError(e.to_string()))?;
    let normalized = normalize(&mut source)?;
    let (mut composed, pages) = compose(&normalized, marks, renderer)?;

    composed.compress();
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    composed.save(out_path)?;

    let report = ExportReport {
        output: out_path.to_path_buf(),
        pages,
    };
    info!(
        "Exported {} ({} pages, {} marks)",
        out_path.display(),
        report.pages.len(),
        report.placed_marks()
    );
    if report.skipped_marks() > 0 {
        warn!("{} mark(s) could not be drawn", report.skipped_marks());
    }
    Ok(report)
}

/// All PDFs under `root`, excluding previous exports, sorted by path.
pub fn discover_pdfs(root: &Path, suffix: &str) -> Result<Vec<PathBuf>, MarkError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_source_pdf(&path, suffix) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_source_pdf(path: &Path, suffix: &str) -> bool {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    let is_export = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().ends_with(suffix))
        .unwrap_or(false);
    is_pdf && !is_export
}

/// Export every marked PDF under `root` into the grouped layout.
///
/// A failing document is recorded in the report and does not stop the batch.
#[instrument(skip(config, renderer), fields(root = %root.display()))]
pub fn export_tree(
    root: &Path,
    config: &MarkConfig,
    renderer: &dyn MarkRenderer,
) -> Result<BatchReport, MarkError> {
    let root = root.canonicalize()?;
    let mut report = BatchReport::default();

    for pdf in discover_pdfs(&root, &config.export.suffix)? {
        let sidecar = sidecar_path_for(&pdf, &config.session.sidecar_extension);
        if !sidecar.exists() {
            report.without_sidecar.push(pdf);
            continue;
        }

        let store = MarkStore::load(&sidecar, &config.defaults);
        let out_path = grouped_output_path(&pdf, &root, &config.export);
        match export_document(&pdf, store.pages(), renderer, &out_path) {
            Ok(exported) => report.exported.push(exported),
            Err(e) => {
                warn!("Failed to export {}: {}", pdf.display(), e);
                report.failed.push((pdf, e.to_string()));
            }
        }
    }

    info!(
        "Batch finished: {} exported, {} failed, {} without marks",
        report.exported.len(),
        report.failed.len(),
        report.without_sidecar.len()
    );
    Ok(report)
}
