//! Subcommand implementations

use anyhow::{anyhow, bail, Context};
use marklatex_core::{
    default_output_path, export_tree, get_page_count, wrap_text, EditSession, FontRasterizer,
    MarkConfig, MarkFields, MarkId, MarkStore, TracingNotifier,
};
use marklatex_core::sidecar::sidecar_path_for;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Optional style fields given on the command line.
#[derive(Debug, Default)]
pub struct StyleOverrides {
    pub font: Option<String>,
    pub size: Option<u32>,
    pub width: Option<u32>,
}

impl StyleOverrides {
    fn apply_to(self, fields: &mut MarkFields) {
        if let Some(font) = self.font {
            fields.font = font;
        }
        if let Some(size) = self.size {
            fields.size = size;
        }
        if let Some(width) = self.width {
            fields.width = width;
        }
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<MarkConfig> {
    match path {
        Some(path) => MarkConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(MarkConfig::default()),
    }
}

fn open_session(config: &MarkConfig, pdf: &Path) -> anyhow::Result<EditSession> {
    let page_count =
        get_page_count(pdf).with_context(|| format!("Failed to open {}", pdf.display()))?;
    Ok(EditSession::open(pdf, config, Box::new(TracingNotifier)).with_page_count(page_count))
}

fn rasterizer(config: &MarkConfig) -> anyhow::Result<FontRasterizer> {
    Ok(FontRasterizer::new(config.render.to_options()?))
}

pub fn export(config: &MarkConfig, pdf: &Path, out: Option<PathBuf>) -> anyhow::Result<()> {
    let session = open_session(config, pdf)?;
    let out = out.unwrap_or_else(|| default_output_path(pdf, &config.export.suffix));
    let report = session.export(&rasterizer(config)?, &out)?;

    println!("Saved: {}", report.output.display());
    if report.skipped_marks() > 0 {
        println!("{} mark(s) could not be drawn", report.skipped_marks());
    }
    Ok(())
}

pub fn batch(config: &MarkConfig, root: &Path) -> anyhow::Result<()> {
    let report = export_tree(root, config, &rasterizer(config)?)
        .with_context(|| format!("Failed to export {}", root.display()))?;

    for exported in &report.exported {
        println!("Saved: {}", exported.output.display());
    }
    for (pdf, error) in &report.failed {
        println!("Failed: {}: {}", pdf.display(), error);
    }
    println!(
        "{} exported, {} failed, {} without marks",
        report.exported.len(),
        report.failed.len(),
        report.without_sidecar.len()
    );
    if !report.failed.is_empty() {
        bail!("{} document(s) failed to export", report.failed.len());
    }
    Ok(())
}

pub fn wrap(text: &str, width: usize) -> String {
    wrap_text(text, width)
}

/// Human-readable listing of a PDF's marks, pages numbered from 1.
pub fn list(config: &MarkConfig, pdf: &Path) -> String {
    let sidecar = sidecar_path_for(pdf, &config.session.sidecar_extension);
    format_marks(&MarkStore::load(&sidecar, &config.defaults))
}

fn format_marks(store: &MarkStore) -> String {
    let mut out = String::new();
    for (page, marks) in store.pages() {
        if marks.is_empty() {
            continue;
        }
        let _ = writeln!(out, "page {}", page + 1);
        for (index, mark) in marks.iter().enumerate() {
            let _ = writeln!(
                out,
                "  [{}] ({}, {}) {} {}pt w{}: {:?}",
                index, mark.x, mark.y, mark.font, mark.size, mark.width, mark.text
            );
        }
    }
    if out.is_empty() {
        out.push_str("no marks\n");
    }
    out
}

pub fn add(
    config: &MarkConfig,
    pdf: &Path,
    page: u32,
    (x, y): (f64, f64),
    text: String,
    style: StyleOverrides,
) -> anyhow::Result<()> {
    if text.is_empty() {
        bail!("mark text is empty");
    }
    let mut session = open_session(config, pdf)?;
    let mut fields = session.new_fields(text, x, y);
    style.apply_to(&mut fields);

    session
        .add_mark(page, fields)
        .ok_or_else(|| anyhow!("page {} is past the end of {}", page + 1, pdf.display()))?;
    Ok(())
}

pub fn edit(
    config: &MarkConfig,
    pdf: &Path,
    page: u32,
    index: usize,
    text: Option<String>,
    style: StyleOverrides,
) -> anyhow::Result<()> {
    let mut session = open_session(config, pdf)?;
    let id = find_mark(&session, page, index)?;
    let mut fields = session
        .store()
        .mark(id)
        .map(|m| m.fields())
        .ok_or_else(|| anyhow!("mark disappeared"))?;
    if let Some(text) = text {
        fields.text = text;
    }
    style.apply_to(&mut fields);

    if !session.edit_mark(id, fields) {
        bail!("mark text is empty");
    }
    Ok(())
}

pub fn move_mark(
    config: &MarkConfig,
    pdf: &Path,
    page: u32,
    index: usize,
    (x, y): (f64, f64),
) -> anyhow::Result<()> {
    let mut session = open_session(config, pdf)?;
    let id = find_mark(&session, page, index)?;
    session.move_mark(id, x, y);
    Ok(())
}

pub fn delete(config: &MarkConfig, pdf: &Path, page: u32, index: usize) -> anyhow::Result<()> {
    let mut session = open_session(config, pdf)?;
    let id = find_mark(&session, page, index)?;
    session.delete_mark(page, id);
    Ok(())
}

fn find_mark(session: &EditSession, page: u32, index: usize) -> anyhow::Result<MarkId> {
    session
        .mark_id_at(page, index)
        .ok_or_else(|| anyhow!("no mark {} on page {}", index, page + 1))
}
