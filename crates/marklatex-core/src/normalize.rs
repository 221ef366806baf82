//! Page rotation normalization
//!
//! Rewrites a document so every page has `/Rotate 0` while looking the same
//! as before. Each source page is captured as a Form XObject in its
//! unrotated frame and placed on a new page of the visual size, turned
//! back by the page's rotation. Vector content is kept as is.

use crate::error::MarkError;
use crate::pdf::{
    draw_xobject, page_box, page_form_xobject, page_rotation, visual_size, DocumentBuilder,
    Matrix, ObjectImporter, RotationOverride,
};
use lopdf::{dictionary, Document, Object};
use std::borrow::Cow;
use tracing::debug;

/// A document whose pages all have rotation 0.
///
/// Borrowed when the source needed no changes, owned otherwise. Either way
/// it is released when dropped.
pub type NormalizedDocument<'a> = Cow<'a, Document>;

const PAGE_XOBJECT: &str = "Pg";

/// Normalize page rotation.
///
/// `doc` is only borrowed mutably to apply a temporary rotation override
/// during capture; its `/Rotate` entries are the same afterwards.
pub fn normalize(doc: &mut Document) -> Result<NormalizedDocument<'_>, MarkError> {
    let pages: Vec<_> = doc.get_pages().into_values().collect();
    if pages.iter().all(|id| page_rotation(doc, *id) == 0) {
        debug!("No rotated pages, skipping normalization");
        return Ok(Cow::Borrowed(doc));
    }

    let mut builder = DocumentBuilder::new(&doc.version);
    let mut importer = ObjectImporter::new();

    for page_id in pages {
        let rotation = page_rotation(doc, page_id);
        let bbox = page_box(doc, page_id);
        let size = visual_size(bbox, rotation);

        let form = if rotation == 0 {
            page_form_xobject(doc, page_id)?
        } else {
            let unrotated = RotationOverride::new(doc, page_id, 0)?;
            page_form_xobject(&unrotated, page_id)?
        };

        let form = importer.import(builder.document_mut(), doc, &Object::Stream(form));
        let form_id = builder.document_mut().add_object(form);
        let placement = placement_matrix(bbox, rotation);
        builder.add_page(
            size,
            dictionary! { PAGE_XOBJECT => form_id },
            draw_xobject(PAGE_XOBJECT, &placement),
        )?;
        debug!(
            "Normalized page {:?}: rotation {} -> {}x{}",
            page_id, rotation, size.width, size.height
        );
    }

    Ok(Cow::Owned(builder.finish()))
}

/// Matrix mapping a page box, rotated clockwise by `rotation` degrees, onto
/// `[0, 0, visual width, visual height]`.
pub fn placement_matrix(page_box: [f64; 4], rotation: i64) -> Matrix {
    let [x0, y0, x1, y1] = page_box;
    // /Rotate turns clockwise, so undo it with a counter-clockwise-negative turn
    let turned = Matrix::translate(-x0, -y0).then(&Matrix::quarter_turn(-rotation));

    let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)].map(|(x, y)| turned.apply(x, y));
    let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);

    turned.then(&Matrix::translate(-min_x, -min_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::pdf::test_support::create_test_pdf;
    use lopdf::content::Content;
    use pretty_assertions::assert_eq;

    fn page_sizes(doc: &Document) -> Vec<(Size, i64)> {
        doc.get_pages()
            .values()
            .map(|id| {
                let b = page_box(doc, *id);
                (Size::new(b[2] - b[0], b[3] - b[1]), page_rotation(doc, *id))
            })
            .collect()
    }

    #[test]
    fn test_unrotated_document_is_borrowed() {
        let mut doc = create_test_pdf(&[(612, 792, 0), (300, 200, 0)]);
        let normalized = normalize(&mut doc).unwrap();
        assert!(matches!(normalized, Cow::Borrowed(_)));
        assert_eq!(
            page_sizes(&normalized),
            vec![(Size::new(612.0, 792.0), 0), (Size::new(300.0, 200.0), 0)]
        );
    }

    #[test]
    fn test_quarter_turns_swap_size() {
        let mut doc = create_test_pdf(&[(612, 792, 90), (612, 792, 180), (612, 792, 270)]);
        let normalized = normalize(&mut doc).unwrap();
        assert!(matches!(normalized, Cow::Owned(_)));
        assert_eq!(
            page_sizes(&normalized),
            vec![
                (Size::new(792.0, 612.0), 0),
                (Size::new(612.0, 792.0), 0),
                (Size::new(792.0, 612.0), 0),
            ]
        );
    }

    #[test]
    fn test_mixed_document_keeps_page_order_and_sizes() {
        let mut doc = create_test_pdf(&[(300, 400, 0), (612, 792, 90)]);
        let normalized = normalize(&mut doc).unwrap();
        assert_eq!(
            page_sizes(&normalized),
            vec![(Size::new(300.0, 400.0), 0), (Size::new(792.0, 612.0), 0)]
        );
    }

    #[test]
    fn test_source_rotation_is_unchanged() {
        let mut doc = create_test_pdf(&[(612, 792, 90), (612, 792, 270)]);
        {
            let _normalized = normalize(&mut doc).unwrap();
        }
        let rotations: Vec<i64> = doc
            .get_pages()
            .values()
            .map(|id| page_rotation(&doc, *id))
            .collect();
        assert_eq!(rotations, vec![90, 270]);
    }

    #[test]
    fn test_renormalize_takes_fast_path() {
        let mut doc = create_test_pdf(&[(612, 792, 90)]);
        let mut once = normalize(&mut doc).unwrap().into_owned();
        let sizes = page_sizes(&once);
        let twice = normalize(&mut once).unwrap();
        assert!(matches!(twice, Cow::Borrowed(_)));
        assert_eq!(page_sizes(&twice), sizes);
    }

    #[test]
    fn test_normalized_page_draws_captured_form() {
        let mut doc = create_test_pdf(&[(612, 792, 90)]);
        let normalized = normalize(&mut doc).unwrap();
        let page_id = normalized.get_pages()[&1];

        let content = Content::decode(&normalized.get_page_content(page_id).unwrap()).unwrap();
        let ops: Vec<&str> = content
            .operations
            .iter()
            .map(|op| op.operator.as_str())
            .collect();
        assert_eq!(ops, vec!["q", "cm", "Do", "Q"]);

        // The form and its font came along
        let page = normalized.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let form_id = resources
            .get(b"XObject")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Pg")
            .unwrap()
            .as_reference()
            .unwrap();
        let form = normalized.get_object(form_id).unwrap().as_stream().unwrap();
        let font_ref = form
            .dict
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Font")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"F1")
            .unwrap()
            .as_reference()
            .unwrap();
        assert!(normalized.get_object(font_ref).is_ok());
    }

    #[test]
    fn test_placement_matrices() {
        let b = [0.0, 0.0, 612.0, 792.0];
        assert_eq!(placement_matrix(b, 0), Matrix::IDENTITY);
        assert_eq!(
            placement_matrix(b, 90),
            Matrix([0.0, -1.0, 1.0, 0.0, 0.0, 612.0])
        );
        assert_eq!(
            placement_matrix(b, 180),
            Matrix([-1.0, 0.0, 0.0, -1.0, 612.0, 792.0])
        );
        assert_eq!(
            placement_matrix(b, 270),
            Matrix([0.0, 1.0, -1.0, 0.0, 792.0, 0.0])
        );
    }

    #[test]
    fn test_placement_maps_box_onto_visual_rect() {
        let b = [10.0, 20.0, 110.0, 220.0];
        let m = placement_matrix(b, 90);
        // Top-left of the unrotated page ends up at the top-right after a clockwise turn
        assert_eq!(m.apply(10.0, 220.0), (200.0, 100.0));
        assert_eq!(m.apply(110.0, 20.0), (0.0, 0.0));
    }
}
