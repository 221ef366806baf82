//! Export compositing
//!
//! Each page of a normalized document is rebuilt on a new page large enough
//! for both the original content and every mark image, including marks
//! placed partly or wholly outside the original page. Marks use top-left,
//! y-down page coordinates; PDF space is bottom-left, y-up.

use crate::error::MarkError;
use crate::geometry::{Rect, Size};
use crate::marks::{Mark, PageMarks};
use crate::pdf::{add_png_image, draw_xobject, page_box, page_form_xobject, DocumentBuilder, Matrix, ObjectImporter};
use crate::raster::MarkRenderer;
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, warn};

const PAGE_XOBJECT: &str = "Pg";

/// Where a page ended up in the composed document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// Zero-based page index
    pub page: u32,
    pub size: Size,
    /// Shift applied to the original content, in page coordinates
    pub offset: (f64, f64),
    pub placed_marks: usize,
    pub skipped_marks: usize,
}

struct PlacedImage {
    rect: Rect,
    image_id: lopdf::ObjectId,
}

/// Composite marks onto a normalized document.
///
/// A mark that fails to render or embed is skipped with a warning; the rest
/// of the page is still produced.
pub fn compose(
    normalized: &Document,
    marks: &PageMarks,
    renderer: &dyn MarkRenderer,
) -> Result<(Document, Vec<PageLayout>), MarkError> {
    let mut builder = DocumentBuilder::new(&normalized.version);
    let mut importer = ObjectImporter::new();
    let mut layouts = Vec::new();

    for (index, page_id) in normalized.get_pages().into_values().enumerate() {
        let page = index as u32;
        let bbox = page_box(normalized, page_id);
        let page_size = Size::new(bbox[2] - bbox[0], bbox[3] - bbox[1]);
        let page_marks = marks.get(&page).map(Vec::as_slice).unwrap_or(&[]);

        let mut total = Rect::new(0.0, 0.0, page_size.width, page_size.height);
        let mut images = Vec::with_capacity(page_marks.len());
        let mut skipped = 0;
        for mark in page_marks {
            match place_mark(builder.document_mut(), mark, renderer) {
                Ok(placed) => {
                    total = total.union(&placed.rect);
                    images.push(placed);
                }
                Err(e) => {
                    warn!("Skipping mark on page {}: {}", page, e);
                    skipped += 1;
                }
            }
        }

        let offset = ((-total.x0).max(0.0), (-total.y0).max(0.0));
        let size = Size::new(total.width(), total.height());

        let form = page_form_xobject(normalized, page_id)?;
        let form = importer.import(builder.document_mut(), normalized, &Object::Stream(form));
        let form_id = builder.document_mut().add_object(form);

        let mut xobjects = Dictionary::new();
        xobjects.set(PAGE_XOBJECT, form_id);
        let content_placement = Matrix::translate(-bbox[0], -bbox[1]).then(&Matrix::translate(
            offset.0,
            size.height - offset.1 - page_size.height,
        ));
        let mut operations = draw_xobject(PAGE_XOBJECT, &content_placement);

        for (i, placed) in images.iter().enumerate() {
            let name = format!("Im{}", i);
            xobjects.set(name.as_bytes().to_vec(), placed.image_id);
            let rect = placed.rect.translate(offset.0, offset.1);
            let matrix = Matrix([
                rect.width(),
                0.0,
                0.0,
                rect.height(),
                rect.x0,
                size.height - rect.y1,
            ]);
            operations.extend(draw_xobject(&name, &matrix));
        }

        builder.add_page(size, xobjects, operations)?;
        debug!(
            "Composed page {}: {}x{} offset ({}, {}), {} mark(s)",
            page,
            size.width,
            size.height,
            offset.0,
            offset.1,
            images.len()
        );
        layouts.push(PageLayout {
            page,
            size,
            offset,
            placed_marks: images.len(),
            skipped_marks: skipped,
        });
    }

    Ok((builder.finish(), layouts))
}

fn place_mark(
    doc: &mut Document,
    mark: &Mark,
    renderer: &dyn MarkRenderer,
) -> Result<PlacedImage, MarkError> {
    let rendered = renderer.render(mark)?;
    let image_id = add_png_image(doc, &rendered.png)?;
    Ok(PlacedImage {
        rect: Rect::from_origin_size(mark.x, mark.y, rendered.width_pt(), rendered.height_pt()),
        image_id,
    })
}
