use crate::error::ReportError;
use crate::raster::{RasterImage, pixmap_to_rgba, rgba_to_pixmap};
use image::RgbaImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId};
use crate::pdf::winansi_char;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tiny_skia::{
    FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

const MAX_RASTER_SIDE_PX: f32 = 8000.0;
// Points of an A4 page, used when a page carries no MediaBox anywhere up its tree.
const DEFAULT_PAGE_PT: (f32, f32) = (595.276, 841.89);

/// Turns an embedded document attachment into page images.
pub trait DocumentRasterizer: Send + Sync {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PagedDocument>, ReportError>;
}

/// An opened multi-page document.
pub trait PagedDocument {
    fn page_count(&self) -> usize;

    /// Renders page `index` (zero based) at `scale` device pixels per point.
    fn rasterize_page(&self, index: usize, scale: f32) -> Result<RasterImage, ReportError>;
}

/// Parses documents with lopdf and paints them with tiny-skia.
///
/// Covers what scanned and exported receipts contain: image XObjects (nested
/// forms included), filled or stroked vector paths in gray, RGB or CMYK, and
/// text set in embedded TrueType or OpenType fonts. Text in a font without an
/// embedded program fails the page instead of leaving it blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfRasterizer;

impl DocumentRasterizer for LopdfRasterizer {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PagedDocument>, ReportError> {
        let doc = LoDocument::load_mem(data)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(ReportError::Rasterize("document has no pages".to_string()));
        }
        Ok(Box::new(LopdfDocument { doc, pages }))
    }
}

struct LopdfDocument {
    doc: LoDocument,
    pages: Vec<ObjectId>,
}

impl PagedDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn rasterize_page(&self, index: usize, scale: f32) -> Result<RasterImage, ReportError> {
        let page_id = *self.pages.get(index).ok_or_else(|| {
            ReportError::Rasterize(format!(
                "page {} out of range ({} pages)",
                index + 1,
                self.pages.len()
            ))
        })?;
        let (width_pt, height_pt) = page_size_for_id(&self.doc, page_id)?;
        let scale = scale
            .min(MAX_RASTER_SIDE_PX / width_pt)
            .min(MAX_RASTER_SIDE_PX / height_pt);
        let width_px = (width_pt * scale).ceil().max(1.0) as u32;
        let height_px = (height_pt * scale).ceil().max(1.0) as u32;
        let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
            ReportError::Rasterize(format!("cannot allocate {width_px}x{height_px} page"))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let page_dict = self.doc.get_object(page_id)?.as_dict()?;
        let resources = inherited_resources(&self.doc, page_dict);
        let content = Content::decode(&self.doc.get_page_content(page_id)?)?;

        let mut painter = PagePainter {
            doc: &self.doc,
            pixmap: &mut pixmap,
            // PDF user space has its origin bottom-left; flip into device rows.
            base: Transform::from_row(scale, 0.0, 0.0, -scale, 0.0, height_pt * scale),
            visited_forms: HashSet::new(),
            fonts: HashMap::new(),
        };
        let mut state = PaintState::default();
        painter.run(&content.operations, resources, &mut state)?;

        Ok(RasterImage::from_pixels(pixmap_to_rgba(&pixmap)?))
    }
}

#[derive(Clone, Copy, Debug)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn identity() -> Self {
        Self::from_operands([1.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    fn from_operands([a, b, c, d, e, f]: [f32; 6]) -> Self {
        Self { a, b, c, d, e, f }
    }

    fn translation(tx: f32, ty: f32) -> Self {
        Self::from_operands([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn concat(self, rhs: Self) -> Self {
        Self {
            a: self.a * rhs.a + self.b * rhs.c,
            b: self.a * rhs.b + self.b * rhs.d,
            c: self.c * rhs.a + self.d * rhs.c,
            d: self.c * rhs.b + self.d * rhs.d,
            e: self.e * rhs.a + self.f * rhs.c + rhs.e,
            f: self.e * rhs.b + self.f * rhs.d + rhs.f,
        }
    }

    fn to_transform(self) -> Transform {
        Transform::from_row(self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

#[derive(Clone, Debug)]
struct PaintState {
    ctm: Matrix,
    fill: [u8; 3],
    stroke: [u8; 3],
    line_width: f32,
    text: TextState,
}

impl Default for PaintState {
    fn default() -> Self {
        Self {
            ctm: Matrix::identity(),
            fill: [0, 0, 0],
            stroke: [0, 0, 0],
            line_width: 1.0,
            text: TextState::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct TextState {
    font: Option<Vec<u8>>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
    render_mode: i64,
    matrix: Matrix,
    line_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
            matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
        }
    }
}

impl TextState {
    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).concat(self.line_matrix);
        self.matrix = self.line_matrix;
    }
}

struct PagePainter<'a> {
    doc: &'a LoDocument,
    pixmap: &'a mut Pixmap,
    base: Transform,
    visited_forms: HashSet<ObjectId>,
    fonts: HashMap<ObjectId, Rc<EmbeddedFont>>,
}

impl PagePainter<'_> {
    fn run(
        &mut self,
        operations: &[Operation],
        resources: Option<&LoDictionary>,
        state: &mut PaintState,
    ) -> Result<(), ReportError> {
        let mut stack: Vec<PaintState> = Vec::new();
        let mut path = PathBuilder::new();
        let mut current = (0.0f32, 0.0f32);
        for op in operations {
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        *state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = op_f32s::<6>(op) {
                        state.ctm = Matrix::from_operands(m).concat(state.ctm);
                    }
                }
                "w" => {
                    if let Some([w]) = op_f32s::<1>(op) {
                        state.line_width = w.max(0.0);
                    }
                }
                "g" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.fill = rgb_bytes(v, v, v);
                    }
                }
                "G" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.stroke = rgb_bytes(v, v, v);
                    }
                }
                "rg" => {
                    if let Some([r, g, b]) = op_f32s::<3>(op) {
                        state.fill = rgb_bytes(r, g, b);
                    }
                }
                "RG" => {
                    if let Some([r, g, b]) = op_f32s::<3>(op) {
                        state.stroke = rgb_bytes(r, g, b);
                    }
                }
                "k" => {
                    if let Some([c, m, y, k]) = op_f32s::<4>(op) {
                        let (r, g, b) = cmyk_to_rgb(c, m, y, k);
                        state.fill = rgb_bytes(r, g, b);
                    }
                }
                "K" => {
                    if let Some([c, m, y, k]) = op_f32s::<4>(op) {
                        let (r, g, b) = cmyk_to_rgb(c, m, y, k);
                        state.stroke = rgb_bytes(r, g, b);
                    }
                }
                "m" => {
                    if let Some([x, y]) = op_f32s::<2>(op) {
                        path.move_to(x, y);
                        current = (x, y);
                    }
                }
                "l" => {
                    if let Some([x, y]) = op_f32s::<2>(op) {
                        path.line_to(x, y);
                        current = (x, y);
                    }
                }
                "c" => {
                    if let Some([x1, y1, x2, y2, x3, y3]) = op_f32s::<6>(op) {
                        path.cubic_to(x1, y1, x2, y2, x3, y3);
                        current = (x3, y3);
                    }
                }
                "v" => {
                    if let Some([x2, y2, x3, y3]) = op_f32s::<4>(op) {
                        path.cubic_to(current.0, current.1, x2, y2, x3, y3);
                        current = (x3, y3);
                    }
                }
                "y" => {
                    if let Some([x1, y1, x3, y3]) = op_f32s::<4>(op) {
                        path.cubic_to(x1, y1, x3, y3, x3, y3);
                        current = (x3, y3);
                    }
                }
                "h" => path.close(),
                "re" => {
                    if let Some([x, y, w, h]) = op_f32s::<4>(op) {
                        if let Some(rect) = tiny_skia::Rect::from_xywh(x, y, w, h)
                            .or_else(|| tiny_skia::Rect::from_ltrb(x + w, y + h, x, y))
                        {
                            path.push_rect(rect);
                        }
                        current = (x, y);
                    }
                }
                "f" | "F" | "f*" => {
                    let rule = if op.operator == "f*" {
                        FillRule::EvenOdd
                    } else {
                        FillRule::Winding
                    };
                    self.fill(std::mem::take(&mut path), state, rule);
                }
                "S" => self.stroke(std::mem::take(&mut path), state),
                "s" => {
                    path.close();
                    self.stroke(std::mem::take(&mut path), state);
                }
                "B" | "B*" | "b" | "b*" => {
                    if op.operator.starts_with('b') {
                        path.close();
                    }
                    let rule = if op.operator.ends_with('*') {
                        FillRule::EvenOdd
                    } else {
                        FillRule::Winding
                    };
                    let taken = std::mem::take(&mut path);
                    self.fill(taken.clone(), state, rule);
                    self.stroke(taken, state);
                }
                "n" => path = PathBuilder::new(),
                "BT" => {
                    state.text.matrix = Matrix::identity();
                    state.text.line_matrix = Matrix::identity();
                }
                "ET" => {}
                "Tf" => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        state.text.font = Some(name.to_vec());
                    }
                    if let Some(size) = op.operands.get(1).and_then(obj_to_f32) {
                        state.text.size = size;
                    }
                }
                "Tc" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.text.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.text.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.text.h_scale = v / 100.0;
                    }
                }
                "TL" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.text.leading = v;
                    }
                }
                "Ts" => {
                    if let Some([v]) = op_f32s::<1>(op) {
                        state.text.rise = v;
                    }
                }
                "Tr" => {
                    if let Some(mode) = op.operands.first().and_then(|o| o.as_i64().ok()) {
                        state.text.render_mode = mode;
                    }
                }
                "Td" | "TD" => {
                    if let Some([tx, ty]) = op_f32s::<2>(op) {
                        if op.operator == "TD" {
                            state.text.leading = -ty;
                        }
                        state.text.next_line(tx, ty);
                    }
                }
                "T*" => {
                    let leading = state.text.leading;
                    state.text.next_line(0.0, -leading);
                }
                "Tm" => {
                    if let Some(m) = op_f32s::<6>(op) {
                        state.text.matrix = Matrix::from_operands(m);
                        state.text.line_matrix = state.text.matrix;
                    }
                }
                "Tj" => {
                    if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                        self.show_text(bytes, resources, state)?;
                    }
                }
                "'" | "\"" => {
                    if op.operator == "\"" {
                        if let Some([aw, ac]) = op_f32s::<2>(op) {
                            state.text.word_spacing = aw;
                            state.text.char_spacing = ac;
                        }
                    }
                    let leading = state.text.leading;
                    state.text.next_line(0.0, -leading);
                    if let Some(bytes) = op.operands.last().and_then(|o| o.as_str().ok()) {
                        self.show_text(bytes, resources, state)?;
                    }
                }
                "TJ" => {
                    let Some(items) = op.operands.first().and_then(|o| o.as_array().ok()) else {
                        continue;
                    };
                    for item in items {
                        if let Ok(bytes) = item.as_str() {
                            self.show_text(bytes, resources, state)?;
                        } else if let Some(adjust) = obj_to_f32(item) {
                            // Thousandths of text space, subtracted from the pen position.
                            let text = &mut state.text;
                            let tx = -adjust / 1000.0 * text.size * text.h_scale;
                            text.matrix = Matrix::translation(tx, 0.0).concat(text.matrix);
                        }
                    }
                }
                "Do" => {
                    let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                        continue;
                    };
                    let Some(id) = resources.and_then(|r| xobject_id(self.doc, r, name)) else {
                        continue;
                    };
                    self.draw_xobject(id, resources, state)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn device_transform(&self, ctm: Matrix) -> Transform {
        self.base.pre_concat(ctm.to_transform())
    }

    fn fill(&mut self, path: PathBuilder, state: &PaintState, rule: FillRule) {
        let Some(path) = path.finish() else {
            return;
        };
        let mut paint = Paint::default();
        let [r, g, b] = state.fill;
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;
        let transform = self.device_transform(state.ctm);
        self.pixmap.fill_path(&path, &paint, rule, transform, None);
    }

    fn stroke(&mut self, path: PathBuilder, state: &PaintState) {
        let Some(path) = path.finish() else {
            return;
        };
        let mut paint = Paint::default();
        let [r, g, b] = state.stroke;
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;
        let stroke = Stroke {
            // Zero means the thinnest visible line.
            width: if state.line_width > 0.0 {
                state.line_width
            } else {
                0.5
            },
            ..Stroke::default()
        };
        let transform = self.device_transform(state.ctm);
        self.pixmap
            .stroke_path(&path, &paint, &stroke, transform, None);
    }

    fn show_text(
        &mut self,
        bytes: &[u8],
        resources: Option<&LoDictionary>,
        state: &mut PaintState,
    ) -> Result<(), ReportError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let name = state.text.font.clone().ok_or_else(|| {
            ReportError::Rasterize("text shown before a font was selected".to_string())
        })?;
        let font = self.font(&name, resources)?;
        let face = ttf_parser::Face::parse(&font.program, 0).map_err(|err| {
            ReportError::Rasterize(format!(
                "font /{}: {err}",
                String::from_utf8_lossy(&name)
            ))
        })?;
        let units_per_em = face.units_per_em().max(1) as f32;
        let ctm = state.ctm;
        let (fill, stroke) = (state.fill, state.stroke);
        let line_width = state.line_width;
        let text = &mut state.text;
        // Modes 3 and 7 set invisible text.
        let visible = !matches!(text.render_mode, 3 | 7);
        let stroked = matches!(text.render_mode, 1 | 2 | 5 | 6);
        let filled = matches!(text.render_mode, 0 | 2 | 4 | 6);

        for code in font.codes(bytes) {
            let glyph = font.glyph_id(&face, code);
            if let Some(glyph) = glyph.filter(|_| visible) {
                let mut outline = GlyphOutline(PathBuilder::new());
                if face.outline_glyph(glyph, &mut outline).is_some() {
                    if let Some(path) = outline.0.finish() {
                        let em = text.size / units_per_em;
                        let glyph_space =
                            Matrix::from_operands([em * text.h_scale, 0.0, 0.0, em, 0.0, text.rise]);
                        let transform =
                            self.device_transform(glyph_space.concat(text.matrix).concat(ctm));
                        let mut paint = Paint::default();
                        paint.anti_alias = true;
                        if filled {
                            paint.set_color_rgba8(fill[0], fill[1], fill[2], 255);
                            self.pixmap
                                .fill_path(&path, &paint, FillRule::Winding, transform, None);
                        }
                        if stroked {
                            paint.set_color_rgba8(stroke[0], stroke[1], stroke[2], 255);
                            let pen = Stroke {
                                width: line_width.max(0.5),
                                ..Stroke::default()
                            };
                            self.pixmap
                                .stroke_path(&path, &paint, &pen, transform, None);
                        }
                    }
                }
            }
            let width = font
                .width(code)
                .or_else(|| {
                    glyph
                        .and_then(|g| face.glyph_hor_advance(g))
                        .map(|advance| advance as f32 * 1000.0 / units_per_em)
                })
                .unwrap_or(500.0);
            let mut tx = width / 1000.0 * text.size + text.char_spacing;
            if !font.two_byte && code == 0x20 {
                tx += text.word_spacing;
            }
            tx *= text.h_scale;
            text.matrix = Matrix::translation(tx, 0.0).concat(text.matrix);
        }
        Ok(())
    }

    fn font(
        &mut self,
        name: &[u8],
        resources: Option<&LoDictionary>,
    ) -> Result<Rc<EmbeddedFont>, ReportError> {
        let label = String::from_utf8_lossy(name).into_owned();
        let entry = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|o| resolve_dict(self.doc, o))
            .and_then(|fonts| fonts.get(name).ok())
            .ok_or_else(|| {
                ReportError::Rasterize(format!("font /{label} is missing from the resources"))
            })?;
        let id = entry.as_reference().ok();
        if let Some(font) = id.and_then(|id| self.fonts.get(&id)) {
            return Ok(Rc::clone(font));
        }
        let font = resolve_dict(self.doc, entry)
            .and_then(|dict| EmbeddedFont::load(self.doc, dict))
            .map(Rc::new)
            .ok_or_else(|| {
                ReportError::Rasterize(format!(
                    "font /{label} has no embedded TrueType or OpenType program"
                ))
            })?;
        if let Some(id) = id {
            self.fonts.insert(id, Rc::clone(&font));
        }
        Ok(font)
    }

    fn draw_xobject(
        &mut self,
        id: ObjectId,
        parent_resources: Option<&LoDictionary>,
        state: &PaintState,
    ) -> Result<(), ReportError> {
        let doc = self.doc;
        let stream = doc.get_object(id)?.as_stream()?;
        let subtype = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .unwrap_or_default();

        if subtype == b"Form" {
            if !self.visited_forms.insert(id) {
                return Ok(());
            }
            let plain = stream
                .get_plain_content()
                .map_err(|e| ReportError::Rasterize(format!("form xobject: {e}")))?;
            let content = Content::decode(&plain)?;
            let own = stream
                .dict
                .get(b"Resources")
                .ok()
                .and_then(|o| resolve_dict(doc, o));
            let matrix = stream
                .dict
                .get(b"Matrix")
                .ok()
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| array_f32s::<6>(arr))
                .map(Matrix::from_operands)
                .unwrap_or_else(Matrix::identity);
            let mut nested = state.clone();
            nested.ctm = matrix.concat(state.ctm);
            let resources = own.or(parent_resources);
            let result = self.run(&content.operations, resources, &mut nested);
            self.visited_forms.remove(&id);
            return result;
        }

        if subtype == b"Image" {
            let Some(rgba) = decode_image_stream(doc, stream) else {
                log::debug!("skipping unsupported image xobject {id:?}");
                return Ok(());
            };
            let Some(image) = rgba_to_pixmap(&rgba) else {
                return Ok(());
            };
            let (w, h) = (image.width() as f32, image.height() as f32);
            // Image space is the unit square with row 0 at the top.
            let unit = Transform::from_row(1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0);
            let transform = self.device_transform(state.ctm).pre_concat(unit);
            let mut paint = PixmapPaint::default();
            paint.quality = FilterQuality::Bilinear;
            self.pixmap
                .draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
        }
        Ok(())
    }
}

/// A font whose glyph outlines travel inside the document.
struct EmbeddedFont {
    program: Vec<u8>,
    /// Type0 fonts use two-byte codes that are glyph ids (Identity CIDToGIDMap).
    two_byte: bool,
    widths: HashMap<u16, f32>,
    default_width: Option<f32>,
}

impl EmbeddedFont {
    fn load(doc: &LoDocument, dict: &LoDictionary) -> Option<Self> {
        let subtype = dict.get(b"Subtype").ok()?.as_name().ok()?;
        if subtype == b"Type0" {
            let descendants = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|o| resolve_object(doc, o))?
                .as_array()
                .ok()?;
            let cid_font = resolve_dict(doc, descendants.first()?)?;
            let widths = cid_font
                .get(b"W")
                .ok()
                .and_then(|o| resolve_object(doc, o))
                .and_then(|o| o.as_array().ok())
                .map(|arr| cid_widths(doc, arr))
                .unwrap_or_default();
            let default_width = cid_font
                .get(b"DW")
                .ok()
                .and_then(|o| resolve_object(doc, o))
                .and_then(obj_to_f32)
                .unwrap_or(1000.0);
            return Some(Self {
                program: font_program(doc, cid_font)?,
                two_byte: true,
                widths,
                default_width: Some(default_width),
            });
        }

        let first_char = dict_u32(dict, b"FirstChar").unwrap_or(0);
        let widths: HashMap<u16, f32> = dict
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve_object(doc, o))
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .enumerate()
                    .filter_map(|(i, w)| {
                        let code = u16::try_from(first_char as usize + i).ok()?;
                        Some((code, resolve_object(doc, w).and_then(obj_to_f32)?))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            program: font_program(doc, dict)?,
            two_byte: false,
            widths,
            default_width: None,
        })
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u16> {
        if self.two_byte {
            bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect()
        } else {
            bytes.iter().map(|b| *b as u16).collect()
        }
    }

    fn glyph_id(&self, face: &ttf_parser::Face<'_>, code: u16) -> Option<ttf_parser::GlyphId> {
        if self.two_byte {
            return Some(ttf_parser::GlyphId(code));
        }
        let byte = code as u8;
        face.glyph_index(winansi_char(byte)).or_else(|| {
            // Symbolic subsets map their codes into the private-use page.
            char::from_u32(0xF000 + byte as u32).and_then(|ch| face.glyph_index(ch))
        })
    }

    /// Advance in thousandths of an em, as the document declares it.
    fn width(&self, code: u16) -> Option<f32> {
        self.widths.get(&code).copied().or(self.default_width)
    }
}

fn font_program(doc: &LoDocument, font: &LoDictionary) -> Option<Vec<u8>> {
    let descriptor = font
        .get(b"FontDescriptor")
        .ok()
        .and_then(|o| resolve_dict(doc, o))?;
    if let Some(stream) = descriptor
        .get(b"FontFile2")
        .ok()
        .and_then(|o| resolve_object(doc, o))
        .and_then(|o| o.as_stream().ok())
    {
        return stream.get_plain_content().ok();
    }
    let stream = descriptor
        .get(b"FontFile3")
        .ok()
        .and_then(|o| resolve_object(doc, o))
        .and_then(|o| o.as_stream().ok())?;
    let is_open_type = stream
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        .is_some_and(|name| name == b"OpenType");
    if is_open_type {
        stream.get_plain_content().ok()
    } else {
        None
    }
}

/// Parses a CIDFont `/W` array: `c [w1 w2 ..]` and `c_first c_last w` runs.
fn cid_widths(doc: &LoDocument, arr: &[LoObject]) -> HashMap<u16, f32> {
    let mut out = HashMap::new();
    let number = |obj: &LoObject| resolve_object(doc, obj).and_then(obj_to_f32);
    let mut i = 0;
    while i < arr.len() {
        let Some(first) = number(&arr[i]) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match arr.get(i + 1).and_then(|o| resolve_object(doc, o)) {
            Some(LoObject::Array(run)) => {
                for (k, w) in run.iter().enumerate() {
                    if let (Ok(code), Some(w)) = (u16::try_from(first + k as u32), number(w)) {
                        out.insert(code, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (obj_to_f32(last), arr.get(i + 2).and_then(number))
                else {
                    break;
                };
                let last = (last.max(0.0) as u32).min(u16::MAX as u32);
                for code in first..=last {
                    out.insert(code as u16, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    out
}

struct GlyphOutline(PathBuilder);

impl ttf_parser::OutlineBuilder for GlyphOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.0.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.0.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.0.close();
    }
}

fn page_size_for_id(doc: &LoDocument, mut id: ObjectId) -> Result<(f32, f32), ReportError> {
    loop {
        let dict = doc.get_object(id)?.as_dict()?;
        if let Ok(arr) = dict.get(b"MediaBox").and_then(LoObject::as_array) {
            if let Some([x0, y0, x1, y1]) = array_f32s::<4>(arr) {
                return Ok(((x1 - x0).abs().max(1.0), (y1 - y0).abs().max(1.0)));
            }
        }
        id = match dict.get(b"Parent").and_then(LoObject::as_reference) {
            Ok(parent_id) => parent_id,
            Err(_) => break,
        };
    }
    Ok(DEFAULT_PAGE_PT)
}

/// Page resources, falling back to the nearest ancestor that defines them.
fn inherited_resources<'a>(doc: &'a LoDocument, page: &'a LoDictionary) -> Option<&'a LoDictionary> {
    let mut dict = page;
    for _ in 0..32 {
        if let Some(resources) = dict.get(b"Resources").ok().and_then(|o| resolve_dict(doc, o)) {
            return Some(resources);
        }
        let parent = dict.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        dict = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn xobject_id(doc: &LoDocument, resources: &LoDictionary, name: &[u8]) -> Option<ObjectId> {
    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve_dict(doc, o))?;
    xobjects.get(name).ok()?.as_reference().ok()
}

fn resolve_object<'a>(doc: &'a LoDocument, mut obj: &'a LoObject) -> Option<&'a LoObject> {
    for _ in 0..32 {
        match obj {
            LoObject::Reference(id) => obj = doc.get_object(*id).ok()?,
            _ => return Some(obj),
        }
    }
    None
}

fn resolve_dict<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> Option<&'a LoDictionary> {
    match resolve_object(doc, obj)? {
        LoObject::Dictionary(d) => Some(d),
        _ => None,
    }
}

fn decode_image_stream(doc: &LoDocument, stream: &lopdf::Stream) -> Option<RgbaImage> {
    let filters = stream.filters().unwrap_or_default();
    if filters.iter().any(|f| *f == b"DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
            .ok()
            .map(|img| img.to_rgba8());
    }
    let plain = stream.get_plain_content().ok()?;
    let width = dict_u32(&stream.dict, b"Width")?;
    let height = dict_u32(&stream.dict, b"Height")?;
    let bpc = dict_u32(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return None;
    }
    let channels = match stream.dict.get(b"ColorSpace") {
        Ok(obj) => color_space_channels(doc, obj)?,
        Err(_) => 1,
    };
    let pixels = (width as usize).checked_mul(height as usize)?;
    if plain.len() < pixels.checked_mul(channels)? {
        return None;
    }
    let mut rgba = Vec::with_capacity(pixels * 4);
    for px in plain.chunks_exact(channels).take(pixels) {
        let [r, g, b] = match channels {
            1 => [px[0], px[0], px[0]],
            3 => [px[0], px[1], px[2]],
            _ => {
                let (r, g, b) = cmyk_to_rgb(
                    px[0] as f32 / 255.0,
                    px[1] as f32 / 255.0,
                    px[2] as f32 / 255.0,
                    px[3] as f32 / 255.0,
                );
                rgb_bytes(r, g, b)
            }
        };
        rgba.extend_from_slice(&[r, g, b, 255]);
    }
    RgbaImage::from_raw(width, height, rgba)
}

fn color_space_channels(doc: &LoDocument, obj: &LoObject) -> Option<usize> {
    match resolve_object(doc, obj)? {
        LoObject::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        LoObject::Array(arr) => {
            let family = arr.first()?.as_name().ok()?;
            if family != b"ICCBased" {
                return None;
            }
            let profile = resolve_object(doc, arr.get(1)?)?.as_stream().ok()?;
            let n = dict_u32(&profile.dict, b"N")? as usize;
            matches!(n, 1 | 3 | 4).then_some(n)
        }
        _ => None,
    }
}

fn dict_u32(dict: &LoDictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .ok()
        .and_then(|o| o.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
}

fn op_f32s<const N: usize>(op: &Operation) -> Option<[f32; N]> {
    array_f32s::<N>(&op.operands)
}

fn array_f32s<const N: usize>(objects: &[LoObject]) -> Option<[f32; N]> {
    if objects.len() < N {
        return None;
    }
    let mut out = [0.0f32; N];
    for (slot, obj) in out.iter_mut().zip(objects) {
        *slot = obj_to_f32(obj)?;
    }
    Some(out)
}

fn obj_to_f32(obj: &LoObject) -> Option<f32> {
    if let Ok(v) = obj.as_float() {
        return Some(v);
    }
    obj.as_i64().ok().map(|v| v as f32)
}

fn rgb_bytes(r: f32, g: f32, b: f32) -> [u8; 3] {
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> (f32, f32, f32) {
    let c = c.clamp(0.0, 1.0);
    let m = m.clamp(0.0, 1.0);
    let y = y.clamp(0.0, 1.0);
    let k = k.clamp(0.0, 1.0);
    ((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream as LoStream, dictionary};

    // Two 200x100pt pages: the first carries a red rectangle in its top-left
    // quarter, the second a 2x2 raw RGB image stretched over the whole page.
    fn two_page_pdf() -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();

        let rect_content = b"1 0 0 rg\n0 50 100 50 re\nf\n".to_vec();
        let rect_content_id = doc.add_object(LoStream::new(LoDictionary::new(), rect_content));
        let first = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => rect_content_id,
            "Resources" => dictionary! {},
        });

        let pixels = vec![0u8, 0, 255, 0, 0, 255, 0, 0, 255, 0, 0, 255];
        let image_id = doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            pixels,
        ));
        let image_content = b"q 200 0 0 100 0 0 cm /Im1 Do Q\n".to_vec();
        let image_content_id = doc.add_object(LoStream::new(LoDictionary::new(), image_content));
        let second = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => image_content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![first.into(), second.into()],
            "Count" => 2,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    fn single_page_pdf(
        content: &[u8],
        resources: impl FnOnce(&mut LoDocument) -> LoDictionary,
    ) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let resources = resources(&mut doc);
        let content_id = doc.add_object(LoStream::new(LoDictionary::new(), content.to_vec()));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    // A TrueType program with two glyphs: .notdef (empty) and a 500 x 700 unit
    // box at x 100..600, on a 1000 unit em.
    fn box_font() -> Vec<u8> {
        fn be16(out: &mut Vec<u8>, v: u16) {
            out.extend_from_slice(&v.to_be_bytes());
        }
        fn be32(out: &mut Vec<u8>, v: u32) {
            out.extend_from_slice(&v.to_be_bytes());
        }

        let mut head = Vec::new();
        be32(&mut head, 0x0001_0000);
        be32(&mut head, 0x0001_0000);
        be32(&mut head, 0);
        be32(&mut head, 0x5F0F_3CF5);
        be16(&mut head, 0);
        be16(&mut head, 1000);
        head.extend_from_slice(&[0u8; 16]);
        for v in [100u16, 0, 600, 700] {
            be16(&mut head, v);
        }
        be16(&mut head, 0);
        be16(&mut head, 8);
        be16(&mut head, 2);
        be16(&mut head, 0);
        be16(&mut head, 0);

        let mut hhea = Vec::new();
        be32(&mut hhea, 0x0001_0000);
        for v in [800u16, (-200i16) as u16, 0, 700, 0, 0, 600, 1, 0, 0, 0, 0, 0, 0, 0] {
            be16(&mut hhea, v);
        }
        be16(&mut hhea, 2);

        let mut maxp = Vec::new();
        be32(&mut maxp, 0x0000_5000);
        be16(&mut maxp, 2);

        let mut hmtx = Vec::new();
        for v in [500u16, 0, 700, 100] {
            be16(&mut hmtx, v);
        }

        let mut glyf = Vec::new();
        be16(&mut glyf, 1);
        for v in [100u16, 0, 600, 700] {
            be16(&mut glyf, v);
        }
        be16(&mut glyf, 3);
        be16(&mut glyf, 0);
        glyf.extend_from_slice(&[0x01; 4]);
        for v in [100i16, 0, 500, 0, 0, 700, 0, -700] {
            be16(&mut glyf, v as u16);
        }
        glyf.extend_from_slice(&[0, 0]);

        let mut loca = Vec::new();
        for v in [0u16, 0, (glyf.len() / 2) as u16] {
            be16(&mut loca, v);
        }

        let tables: [(&[u8; 4], Vec<u8>); 6] = [
            (b"glyf", glyf),
            (b"head", head),
            (b"hhea", hhea),
            (b"hmtx", hmtx),
            (b"loca", loca),
            (b"maxp", maxp),
        ];
        let mut out = Vec::new();
        be32(&mut out, 0x0001_0000);
        be16(&mut out, tables.len() as u16);
        be16(&mut out, 64);
        be16(&mut out, 2);
        be16(&mut out, 32);
        let mut offset = 12 + 16 * tables.len();
        let mut body = Vec::new();
        for (tag, data) in &tables {
            out.extend_from_slice(*tag);
            be32(&mut out, 0);
            be32(&mut out, offset as u32);
            be32(&mut out, data.len() as u32);
            body.extend_from_slice(data);
            while body.len() % 4 != 0 {
                body.push(0);
            }
            offset = 12 + 16 * tables.len() + body.len();
        }
        out.extend_from_slice(&body);
        out
    }

    // /F1 as a Type0 font over the box program, codes being glyph ids.
    fn box_font_resources(doc: &mut LoDocument) -> LoDictionary {
        let font_file = doc.add_object(LoStream::new(LoDictionary::new(), box_font()));
        let descriptor = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "BoxFont",
            "FontFile2" => font_file,
        });
        let cid_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "BoxFont",
            "CIDToGIDMap" => "Identity",
            "FontDescriptor" => descriptor,
        });
        let font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "BoxFont",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![cid_font.into()],
        });
        dictionary! {
            "Font" => dictionary! { "F1" => font },
        }
    }

    fn has_ink(image: &RasterImage) -> bool {
        image.pixels().pixels().any(|p| p.0 != [255, 255, 255, 255])
    }

    #[test]
    fn text_in_a_standard_font_fails_the_page() {
        let pdf = single_page_pdf(b"BT /F1 14 Tf 20 40 Td (TOTAL 1200,00 kr) Tj ET\n", |_| {
            dictionary! {
                "Font" => dictionary! {
                    "F1" => dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                        "Encoding" => "WinAnsiEncoding",
                    },
                },
            }
        });
        let doc = LopdfRasterizer.open(&pdf).unwrap();
        match doc.rasterize_page(0, 2.0) {
            Err(ReportError::Rasterize(message)) => assert!(message.contains("/F1"), "{message}"),
            other => panic!("expected a rasterize error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn text_in_an_embedded_truetype_font_is_painted() {
        let content = b"0 0 1 rg BT /F1 50 Tf 20 20 Td <00010001> Tj ET\n";
        let pdf = single_page_pdf(content, box_font_resources);
        let doc = LopdfRasterizer.open(&pdf).unwrap();
        let page = doc.rasterize_page(0, 1.0).unwrap();
        // First box: user x 25..50, y 20..55, so device rows 45..80.
        assert_eq!(page.pixels().get_pixel(37, 62).0, [0, 0, 255, 255]);
        // The default CID width of 1000 moves the pen 50pt: second box at x 75..100.
        assert_eq!(page.pixels().get_pixel(87, 62).0, [0, 0, 255, 255]);
        assert_eq!(page.pixels().get_pixel(62, 62).0, [255, 255, 255, 255]);
        assert_eq!(page.pixels().get_pixel(150, 20).0, [255, 255, 255, 255]);
    }

    #[test]
    fn invisible_text_is_skipped() {
        let pdf = single_page_pdf(b"BT 3 Tr /F1 50 Tf 20 20 Td <0001> Tj ET\n", box_font_resources);
        let doc = LopdfRasterizer.open(&pdf).unwrap();
        assert!(!has_ink(&doc.rasterize_page(0, 1.0).unwrap()));
    }

    #[test]
    fn counts_pages_and_inherits_media_box() {
        let doc = LopdfRasterizer.open(&two_page_pdf()).unwrap();
        assert_eq!(doc.page_count(), 2);
        let page = doc.rasterize_page(0, 2.0).unwrap();
        assert_eq!((page.width(), page.height()), (400, 200));
    }

    #[test]
    fn paints_filled_paths_in_device_orientation() {
        let doc = LopdfRasterizer.open(&two_page_pdf()).unwrap();
        let page = doc.rasterize_page(0, 1.0).unwrap();
        // The rectangle spans user y 50..100, the top half of the page.
        assert_eq!(page.pixels().get_pixel(20, 20).0, [255, 0, 0, 255]);
        assert_eq!(page.pixels().get_pixel(150, 80).0, [255, 255, 255, 255]);
    }

    #[test]
    fn paints_image_xobjects() {
        let doc = LopdfRasterizer.open(&two_page_pdf()).unwrap();
        let page = doc.rasterize_page(1, 1.0).unwrap();
        let px = page.pixels().get_pixel(100, 50).0;
        assert!(px[2] > 200 && px[0] < 40, "{px:?}");
    }

    #[test]
    fn rejects_garbage_and_out_of_range_pages() {
        assert!(matches!(
            LopdfRasterizer.open(b"not a pdf"),
            Err(ReportError::Rasterize(_))
        ));
        let doc = LopdfRasterizer.open(&two_page_pdf()).unwrap();
        assert!(doc.rasterize_page(5, 1.0).is_err());
    }
}
