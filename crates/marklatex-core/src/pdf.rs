//! Low-level PDF helpers built on lopdf
//!
//! Page attribute lookup (with inheritance through the page tree), page
//! capture as Form XObjects, cross-document object import, new document
//! construction and raster image embedding.

use crate::error::MarkError;
use crate::geometry::Size;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;
use std::ops::{Deref, DerefMut};

/// US Letter, used when a page has no usable box.
const DEFAULT_PAGE_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

pub fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look up a page attribute, walking up `/Parent` for inheritable keys.
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn parse_box(obj: &Object, doc: &Document) -> Option<[f64; 4]> {
    let arr = obj.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(arr) {
        *slot = obj_to_f64(resolve(doc, item))?;
    }
    // Boxes may list any two opposite corners
    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

/// The page's visible box in PDF user space: CropBox, else MediaBox.
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    inherited_attribute(doc, page_id, b"CropBox")
        .and_then(|b| parse_box(b, doc))
        .or_else(|| inherited_attribute(doc, page_id, b"MediaBox").and_then(|b| parse_box(b, doc)))
        .unwrap_or(DEFAULT_PAGE_BOX)
}

/// Normalize rotation to 0, 90, 180, or 270
pub fn normalize_rotation(angle: i64) -> i64 {
    angle.rem_euclid(360)
}

/// Effective `/Rotate` of a page, normalized into `0..360`.
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|r| r.as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0)
}

/// Size of the page as a viewer shows it, i.e. after rotation.
pub fn visual_size(page_box: [f64; 4], rotation: i64) -> Size {
    let width = page_box[2] - page_box[0];
    let height = page_box[3] - page_box[1];
    match normalize_rotation(rotation) {
        90 | 270 => Size::new(height, width),
        _ => Size::new(width, height),
    }
}

/// Temporarily replaces a page's own `/Rotate` entry.
///
/// The original entry (or its absence) is put back when the guard is
/// dropped, on every exit path.
pub struct RotationOverride<'a> {
    doc: &'a mut Document,
    page_id: ObjectId,
    original: Option<Object>,
}

impl<'a> RotationOverride<'a> {
    pub fn new(doc: &'a mut Document, page_id: ObjectId, rotation: i64) -> Result<Self, MarkError> {
        let dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
        let original = dict.remove(b"Rotate");
        dict.set("Rotate", Object::Integer(rotation));
        Ok(Self {
            doc,
            page_id,
            original,
        })
    }
}

impl Deref for RotationOverride<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.doc
    }
}

impl DerefMut for RotationOverride<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        self.doc
    }
}

impl Drop for RotationOverride<'_> {
    fn drop(&mut self) {
        if let Ok(dict) = self
            .doc
            .get_object_mut(self.page_id)
            .and_then(Object::as_dict_mut)
        {
            match self.original.take() {
                Some(value) => dict.set("Rotate", value),
                None => {
                    dict.remove(b"Rotate");
                }
            }
        }
    }
}

/// Capture a page's content and resources as a Form XObject.
///
/// The form's coordinate space is the page's unrotated user space and its
/// `/BBox` is the page box. Object references inside still point into
/// `doc`; use [`ObjectImporter`] to move the form into another document.
///
/// A form has no `/Rotate`, so a rotated page must be captured under a
/// [`RotationOverride`] to 0; otherwise this is an error.
pub fn page_form_xobject(doc: &Document, page_id: ObjectId) -> Result<Stream, MarkError> {
    let rotation = page_rotation(doc, page_id);
    if rotation != 0 {
        return Err(MarkError::OperationError(format!(
            "cannot capture page {:?} with /Rotate {}",
            page_id, rotation
        )));
    }
    let content = doc.get_page_content(page_id)?;
    let bbox = page_box(doc, page_id);
    let resources = inherited_attribute(doc, page_id, b"Resources")
        .cloned()
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => bbox.iter().map(|v| Object::Real(*v as f32)).collect::<Vec<_>>(),
        "Resources" => resources,
    };
    Ok(Stream::new(dict, content))
}

/// Deep-copies objects from one document into another, remapping ids.
///
/// Each source object is copied at most once per importer, so shared
/// resources (fonts, images) stay shared in the destination. References
/// to page-tree nodes are replaced with null so a copied resource never
/// drags the source page tree along.
#[derive(Debug, Default)]
pub struct ObjectImporter {
    map: BTreeMap<ObjectId, ObjectId>,
}

impl ObjectImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(&mut self, dest: &mut Document, source: &Document, obj: &Object) -> Object {
        match obj {
            Object::Reference(id) => self.import_reference(dest, source, *id),
            Object::Array(arr) => Object::Array(
                arr.iter()
                    .map(|item| self.import(dest, source, item))
                    .collect(),
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.import_dict(dest, source, dict)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.import_dict(dest, source, &stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn import_dict(&mut self, dest: &mut Document, source: &Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.import(dest, source, value));
        }
        copy
    }

    fn import_reference(&mut self, dest: &mut Document, source: &Document, id: ObjectId) -> Object {
        if let Some(new_id) = self.map.get(&id) {
            return Object::Reference(*new_id);
        }

        let Ok(object) = source.get_object(id) else {
            return Object::Null;
        };
        if is_page_tree_node(object) {
            return Object::Null;
        }

        let new_id = dest.new_object_id();
        self.map.insert(id, new_id);
        let copy = self.import(dest, source, object);
        dest.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }
}

fn is_page_tree_node(obj: &Object) -> bool {
    let dict = match obj {
        Object::Dictionary(dict) => dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Page") | Ok(b"Pages")
    )
}

/// Affine transform in PDF `[a b c d e f]` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [f64; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn translate(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// Counter-clockwise rotation by a multiple of 90 degrees.
    ///
    /// Other angles are snapped to the nearest quarter turn.
    pub fn quarter_turn(degrees: i64) -> Self {
        let quarter = ((degrees as f64 / 90.0).round() as i64).rem_euclid(4);
        let (cos, sin) = match quarter {
            0 => (1.0, 0.0),
            1 => (0.0, 1.0),
            2 => (-1.0, 0.0),
            _ => (0.0, -1.0),
        };
        Matrix([cos, sin, -sin, cos, 0.0, 0.0])
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = next.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn operation(&self) -> Operation {
        Operation::new(
            "cm",
            self.0.iter().map(|v| Object::Real(*v as f32)).collect(),
        )
    }
}

/// Content operations that paint XObject `name` under `matrix`.
pub fn draw_xobject(name: &str, matrix: &Matrix) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        matrix.operation(),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// Builds a fresh document page by page.
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl DocumentBuilder {
    pub fn new(version: &str) -> Self {
        let mut doc = Document::with_version(version);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Append a page with the given size, XObject resources and content.
    pub fn add_page(
        &mut self,
        size: Size,
        xobjects: Dictionary,
        operations: Vec<Operation>,
    ) -> Result<ObjectId, MarkError> {
        let content = Content { operations }
            .encode()
            .map_err(|e| MarkError::OperationError(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(size.width as f32),
                Object::Real(size.height as f32),
            ],
            "Resources" => dictionary! { "XObject" => xobjects },
            "Contents" => content_id,
        });
        self.kids.push(page_id);
        Ok(page_id)
    }

    pub fn finish(mut self) -> Document {
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => self.kids.len() as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, MarkError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decode a PNG and add it to `doc` as an RGB image with a soft mask.
pub fn add_png_image(doc: &mut Document, png_bytes: &[u8]) -> Result<ObjectId, MarkError> {
    let mut decoder = png::Decoder::new(std::io::Cursor::new(png_bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| MarkError::Image(e.to_string()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| MarkError::Image(e.to_string()))?;
    let pixels = &buf[..info.buffer_size()];

    let pixel_count = (info.width * info.height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    match info.color_type {
        png::ColorType::Rgba => {
            for px in pixels.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
        }
        png::ColorType::Rgb => {
            rgb.extend_from_slice(pixels);
            alpha.resize(pixel_count, 255);
        }
        png::ColorType::GrayscaleAlpha => {
            for px in pixels.chunks_exact(2) {
                rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                alpha.push(px[1]);
            }
        }
        png::ColorType::Grayscale => {
            for &v in pixels {
                rgb.extend_from_slice(&[v, v, v]);
            }
            alpha.resize(pixel_count, 255);
        }
        png::ColorType::Indexed => {
            return Err(MarkError::Image("palette image was not expanded".into()));
        }
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => info.width as i64,
            "Height" => info.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(&alpha)?,
    ));

    Ok(doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => info.width as i64,
            "Height" => info.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
            "SMask" => smask_id,
        },
        deflate(&rgb)?,
    )))
}
