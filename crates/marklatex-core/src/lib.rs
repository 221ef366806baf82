//! Text marks overlaid on PDF pages
//!
//! Marks are short styled annotations (optionally with `$...$` math spans)
//! kept in a JSON sidecar next to the PDF. Exporting bakes them into a copy
//! of the document, normalizing page rotation first and growing each page
//! so marks placed past its edges stay visible.

pub mod compose;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod marks;
pub mod normalize;
pub mod notify;
pub mod pdf;
pub mod raster;
pub mod session;
pub mod sidecar;
pub mod store;
pub mod undo;
pub mod wrap;

pub use compose::{compose, PageLayout};
pub use config::MarkConfig;
pub use error::MarkError;
pub use export::{
    default_output_path, discover_pdfs, export_document, export_tree, grouped_output_path,
    BatchReport, ExportReport,
};
pub use marks::{Mark, MarkDefaults, MarkFields, MarkId, PageMarks};
pub use normalize::{normalize, NormalizedDocument};
pub use notify::{Notice, Notifier, RecordingNotifier, TracingNotifier};
pub use raster::{FontRasterizer, MarkRenderer, RenderOptions, RenderedMark};
pub use session::EditSession;
pub use sidecar::{sidecar_path_for, SidecarDocument};
pub use store::MarkStore;
pub use undo::{UndoAction, UndoLog};
pub use wrap::wrap_text;

use std::path::Path;

/// Load the PDF at `path` and return its page count
pub fn get_page_count(path: &Path) -> Result<u32, MarkError> {
    let doc = lopdf::Document::load(path).map_err(|e| MarkError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
