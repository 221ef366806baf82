//! End-to-end workflow: edit marks through a session, undo, export
//!
//! Run with: cargo test -p marklatex-core --test export_workflow

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use marklatex_core::pdf::{obj_to_f64, page_box, page_rotation};
use marklatex_core::{
    default_output_path, EditSession, Mark, MarkConfig, MarkError, MarkRenderer, Notice,
    RecordingNotifier, RenderedMark,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

/// One point per pixel, size proportional to the text length.
struct StubRenderer;

impl MarkRenderer for StubRenderer {
    fn render(&self, mark: &Mark) -> Result<RenderedMark, MarkError> {
        let width = 10 * mark.text.chars().count() as u32;
        let height = mark.size;
        let mut png_bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_bytes, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer
                .write_image_data(&vec![200u8; (width * height * 4) as usize])
                .unwrap();
        }
        Ok(RenderedMark {
            png: png_bytes,
            width_px: width,
            height_px: height,
            dpi: 72.0,
        })
    }
}

fn write_pdf(path: &Path, pages: &[(i64, i64, i64)]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for &(width, height, rotation) in pages {
        let content = Content {
            operations: vec![
                Operation::new("re", vec![10.into(), 10.into(), 50.into(), 50.into()]),
                Operation::new("f", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Rotate" => rotation,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[test]
fn test_edit_undo_export() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("homework.pdf");
    write_pdf(&pdf, &[(612, 792, 0), (612, 792, 90)]);

    let config = MarkConfig::default();
    let notifier = Arc::new(RecordingNotifier::new());
    let page_count = marklatex_core::get_page_count(&pdf).unwrap();
    let mut session =
        EditSession::open(&pdf, &config, Box::new(notifier.clone())).with_page_count(page_count);

    let good = session
        .add_mark(0, session.new_fields("good", -30.0, 100.0))
        .unwrap();
    let typo = session
        .add_mark(1, session.new_fields("$x^2$", 700.0, 20.0))
        .unwrap();
    assert_eq!(session.add_mark(2, session.new_fields("x", 0.0, 0.0)), None);

    // A stray move, then undo it
    assert!(session.move_mark(typo, 0.0, 0.0));
    assert!(session.undo());
    assert_eq!(session.store().mark(typo).unwrap().position(), (700.0, 20.0));
    assert!(notifier.notices().contains(&Notice::Undone));

    // The sidecar reflects the undone state
    let reopened = EditSession::open(&pdf, &config, Box::new(RecordingNotifier::new()));
    assert_eq!(
        reopened.store().to_sidecar("homework.pdf"),
        session.store().to_sidecar("homework.pdf")
    );

    let out = default_output_path(&pdf, &config.export.suffix);
    let report = session.export(&StubRenderer, &out).unwrap();
    assert_eq!(report.placed_marks(), 2);
    assert_eq!(report.skipped_marks(), 0);
    assert!(matches!(notifier.notices().last(), Some(Notice::Exported(_))));

    let exported = Document::load(&out).unwrap();
    let pages = exported.get_pages();
    assert_eq!(pages.len(), 2);

    // Page 1: 40pt wide mark starting 30pt left of the page
    assert_eq!(page_box(&exported, pages[&1]), [0.0, 0.0, 642.0, 792.0]);
    // Page 2: landscape after normalization, mark fits inside
    assert_eq!(page_box(&exported, pages[&2]), [0.0, 0.0, 792.0, 612.0]);
    assert!(pages.values().all(|id| page_rotation(&exported, *id) == 0));

    // The first page's image sits at the new left edge
    let content = Content::decode(&exported.get_page_content(pages[&1]).unwrap()).unwrap();
    let image_cm: Vec<f64> = content
        .operations
        .iter()
        .filter(|op| op.operator == "cm")
        .nth(1)
        .map(|op| op.operands.iter().filter_map(obj_to_f64).collect())
        .unwrap();
    assert_eq!(image_cm, vec![40.0, 0.0, 0.0, 10.0, 0.0, 682.0]);
    assert_eq!(session.store().locate(good), Some((0, 0)));
}
