//! Mark text rasterization
//!
//! [`MarkRenderer`] turns a mark into a transparent PNG. The compositor
//! only depends on the trait; [`FontRasterizer`] is the default
//! implementation, drawing glyph outlines from system fonts.

use crate::error::MarkError;
use crate::marks::Mark;
use crate::wrap::{strip_math_delimiters, wrap_text};
use fontdb::{Database, Family, Query, ID};
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Transform};
use tracing::{debug, info, warn};

pub const DEFAULT_DPI: f32 = 300.0;
pub const DEFAULT_INK: [u8; 3] = [255, 0, 0];
pub const DEFAULT_ERROR_FONT_SIZE: f32 = 8.0;

/// Transparent border around the ink, in pixels.
const INK_PADDING: f32 = 1.0;

/// A rasterized mark.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMark {
    pub png: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: f32,
}

impl RenderedMark {
    pub fn width_pt(&self) -> f64 {
        f64::from(self.width_px) * 72.0 / f64::from(self.dpi)
    }

    pub fn height_pt(&self) -> f64 {
        f64::from(self.height_px) * 72.0 / f64::from(self.dpi)
    }
}

pub trait MarkRenderer {
    fn render(&self, mark: &Mark) -> Result<RenderedMark, MarkError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub dpi: f32,
    pub color: [u8; 3],
    /// Point size of the placeholder drawn when a font is missing.
    pub error_font_size: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            color: DEFAULT_INK,
            error_font_size: DEFAULT_ERROR_FONT_SIZE,
        }
    }
}

/// Renders marks with system fonts.
pub struct FontRasterizer {
    db: Database,
    options: RenderOptions,
}

impl FontRasterizer {
    /// Create a rasterizer over all installed system fonts.
    pub fn new(options: RenderOptions) -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        info!("Loaded {} system font faces", db.len());
        Self::with_database(db, options)
    }

    pub fn with_database(db: Database, options: RenderOptions) -> Self {
        Self { db, options }
    }

    pub fn face_count(&self) -> usize {
        self.db.len()
    }

    fn find_face(&self, family: &str) -> Option<ID> {
        self.db.query(&Query {
            families: &[Family::Name(family)],
            ..Query::default()
        })
    }

    fn fallback_face(&self) -> Option<ID> {
        self.db
            .query(&Query {
                families: &[Family::SansSerif],
                ..Query::default()
            })
            .or_else(|| self.db.faces().next().map(|face| face.id))
    }

    fn draw(
        &self,
        data: &[u8],
        face_index: u32,
        lines: &[String],
        size_pt: f32,
    ) -> Result<RenderedMark, MarkError> {
        let face = ttf_parser::Face::parse(data, face_index)
            .map_err(|e| MarkError::Raster(format!("unusable font face: {}", e)))?;

        let px_per_em = size_pt * self.options.dpi / 72.0;
        let scale = px_per_em / f32::from(face.units_per_em());
        let ascender = f32::from(face.ascender()) * scale;
        let line_height =
            line_height_units(face.ascender(), face.descender(), face.line_gap()) * scale;

        let mut glyphs = GlyphPath::new(scale);
        for (row, line) in lines.iter().enumerate() {
            let baseline = ascender + row as f32 * line_height;
            let mut pen_x = 0.0;
            for ch in line.chars() {
                let Some(glyph) = face.glyph_index(ch) else {
                    continue;
                };
                glyphs.set_origin(pen_x, baseline);
                face.outline_glyph(glyph, &mut glyphs);
                pen_x += f32::from(face.glyph_hor_advance(glyph).unwrap_or(0)) * scale;
            }
        }

        let path = glyphs
            .finish()
            .ok_or_else(|| MarkError::Raster("text has no visible ink".to_string()))?;
        self.fill(&path)
    }

    /// Fill `path` onto a pixmap cropped to its bounds.
    fn fill(&self, path: &Path) -> Result<RenderedMark, MarkError> {
        let bounds = path.bounds();
        let width = (bounds.width() + 2.0 * INK_PADDING).ceil() as u32;
        let height = (bounds.height() + 2.0 * INK_PADDING).ceil() as u32;
        let mut pixmap = Pixmap::new(width.max(1), height.max(1))
            .ok_or_else(|| MarkError::Raster(format!("cannot allocate {}x{} pixmap", width, height)))?;

        let [r, g, b] = self.options.color;
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;

        let transform = Transform::from_translate(
            INK_PADDING - bounds.left(),
            INK_PADDING - bounds.top(),
        );
        pixmap.fill_path(path, &paint, FillRule::Winding, transform, None);

        let png = pixmap
            .encode_png()
            .map_err(|e| MarkError::Raster(format!("PNG encoding failed: {}", e)))?;
        Ok(RenderedMark {
            png,
            width_px: pixmap.width(),
            height_px: pixmap.height(),
            dpi: self.options.dpi,
        })
    }
}

impl MarkRenderer for FontRasterizer {
    fn render(&self, mark: &Mark) -> Result<RenderedMark, MarkError> {
        let wrapped = wrap_text(&mark.text, mark.width as usize);

        let (face_id, text, size) = match self.find_face(&mark.font) {
            Some(id) => (id, wrapped, mark.size as f32),
            None => {
                warn!("Font '{}' not found, drawing placeholder", mark.font);
                let id = self.fallback_face().ok_or_else(|| {
                    MarkError::Raster(format!("no font available to draw '{}'", mark.font))
                })?;
                (
                    id,
                    format!("FONT ERROR\n{}", wrapped),
                    self.options.error_font_size,
                )
            }
        };

        let lines: Vec<String> = text.lines().map(strip_math_delimiters).collect();
        debug!("Rasterizing {} line(s) at {}pt", lines.len(), size);

        self.db
            .with_face_data(face_id, |data, index| self.draw(data, index, &lines, size))
            .ok_or_else(|| MarkError::Raster("font data could not be read".to_string()))?
    }
}

/// Line advance in font units. Summed in `f32`: the `i16` metrics of
/// some fonts overflow when added.
fn line_height_units(ascender: i16, descender: i16, line_gap: i16) -> f32 {
    f32::from(ascender) - f32::from(descender) + f32::from(line_gap)
}

/// Collects glyph outlines into one path in pixel space (y down).
struct GlyphPath {
    builder: PathBuilder,
    scale: f32,
    origin: (f32, f32),
}

impl GlyphPath {
    fn new(scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            scale,
            origin: (0.0, 0.0),
        }
    }

    /// Pen position (left edge, baseline) of the next glyph.
    fn set_origin(&mut self, x: f32, baseline: f32) {
        self.origin = (x, baseline);
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin.0 + x * self.scale, self.origin.1 - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl ttf_parser::OutlineBuilder for GlyphPath {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
