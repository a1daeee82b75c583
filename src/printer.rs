use crate::canvas::{Canvas, Document};
use crate::config::ReportConfig;
use crate::debug::DebugLogger;
use crate::encoder::EncodedImage;
use crate::font::FontFace;
use crate::frame::Frame;
use crate::page_template::PageTemplate;
use crate::types::{Color, Pt, Rect};

pub const META_PAGE_BREAK_KEY: &str = "page_break";

const POINTS_PER_MM: f32 = crate::types::PT_PER_INCH / crate::types::MM_PER_INCH;
const LEADING: f32 = 1.2;

/// Writes report content top to bottom across pages, owning the page cursor.
///
/// Every page break goes through [`PagePrinter::new_page`] so breaks are logged
/// with a reason in one place.
pub struct PagePrinter<'a> {
    config: &'a ReportConfig,
    template: PageTemplate,
    canvas: Canvas,
    frame: Frame,
    debug: Option<&'a DebugLogger>,
}

impl<'a> PagePrinter<'a> {
    pub fn new(config: &'a ReportConfig, debug: Option<&'a DebugLogger>) -> Self {
        let template = PageTemplate::from_config(config);
        Self {
            config,
            canvas: Canvas::new(template.page_size),
            frame: template.instantiate_frame(),
            template,
            debug,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        self.config
    }

    pub fn page_number(&self) -> usize {
        self.canvas.page_number()
    }

    pub fn frame_rect(&self) -> Rect {
        self.frame.rect()
    }

    /// Absolute distance of the cursor from the page top.
    pub fn cursor_mm(&self) -> f32 {
        self.frame.cursor().to_mm()
    }

    pub fn remaining_mm(&self) -> f32 {
        self.frame.remaining_height().to_mm()
    }

    pub fn is_page_fresh(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn new_page(&mut self, reason: &str) {
        let from = self.page_number();
        log::debug!("page break {from} -> {} ({reason})", from + 1);
        if let Some(debug) = self.debug {
            debug.page_break(from, from + 1, reason);
        }
        self.canvas.show_page();
        self.frame = self.template.instantiate_frame();
        self.canvas.meta(META_PAGE_BREAK_KEY, reason);
    }

    /// Breaks the page unless `height_mm` fits below the cursor. A fresh page never
    /// breaks again, so oversized content lands on its own page instead of looping.
    pub fn ensure_space(&mut self, height_mm: f32, reason: &str) -> bool {
        if self.frame.fits(Pt::from_mm(height_mm)) || self.frame.is_empty() {
            return false;
        }
        self.new_page(reason);
        true
    }

    pub fn gap(&mut self, height_mm: f32) {
        self.frame.advance(Pt::from_mm(height_mm));
    }

    /// Height a single text line of `font_size` points occupies.
    pub fn line_height_mm(&self, font_size: f32) -> f32 {
        self.config.line_height_mm.max(font_size * LEADING / POINTS_PER_MM)
    }

    /// Writes one line at the left edge of the frame and moves the cursor below it.
    pub fn text_line(&mut self, text: &str, face: FontFace, font_size: f32, color: Color) {
        let line_height = self.line_height_mm(font_size);
        self.ensure_space(line_height, "text_overflow");
        let x = self.frame.rect().x;
        self.text_at(x, text, face, font_size, color, line_height);
        self.frame.advance(Pt::from_mm(line_height));
    }

    /// Draws text vertically centred in a line box that starts at the cursor.
    /// Does not move the cursor.
    pub fn text_at(
        &mut self,
        x: Pt,
        text: &str,
        face: FontFace,
        font_size: f32,
        color: Color,
        line_height_mm: f32,
    ) {
        let line_top = self.frame.cursor();
        let inset = (Pt::from_mm(line_height_mm) - Pt::from_f32(font_size)).max(Pt::ZERO) * 0.5;
        self.canvas.set_fill_color(color);
        self.canvas.set_font(face, Pt::from_f32(font_size));
        self.canvas.draw_string(x, line_top + inset, text);
    }

    pub fn fill_rect(&mut self, x: Pt, width: Pt, height_mm: f32, color: Color) {
        let y = self.frame.cursor();
        self.canvas.set_fill_color(color);
        self.canvas
            .draw_rect(x, y, width, Pt::from_mm(height_mm));
    }

    /// Horizontal rule across the frame at `offset_mm` below the cursor.
    pub fn rule(&mut self, offset_mm: f32, color: Color) {
        let rect = self.frame.rect();
        let y = self.frame.cursor() + Pt::from_mm(offset_mm);
        self.canvas.set_stroke_color(color);
        self.canvas.set_line_width(Pt::from_f32(0.5));
        self.canvas.move_to(rect.x, y);
        self.canvas.line_to(rect.x + rect.width, y);
        self.canvas.stroke();
    }

    /// Small grey note marking a split image band.
    pub fn continuation_label(&mut self, text: &str) {
        let size = self.config.continuation_font_size;
        let height = self.config.continuation_label_mm;
        let x = self.frame.rect().x;
        self.text_at(x, text, FontFace::Regular, size, Color::gray(0.4), height);
        self.frame.advance(Pt::from_mm(height));
    }

    /// Registers encoded pixels and draws them at the cursor, left-aligned.
    pub fn image_block(&mut self, image: EncodedImage, width_mm: f32, height_mm: f32) -> String {
        if let Some(debug) = self.debug {
            debug.image_encoded(image.format_name(), image.width, image.height, image.data.len());
        }
        let resource_id = self.canvas.register_image(image);
        let x = self.frame.rect().x;
        let y = self.frame.cursor();
        self.canvas.draw_image(
            x,
            y,
            Pt::from_mm(width_mm),
            Pt::from_mm(height_mm),
            resource_id.clone(),
        );
        self.frame.advance(Pt::from_mm(height_mm));
        resource_id
    }

    pub fn meta(&mut self, key: &str, value: impl Into<String>) {
        self.canvas.meta(key, value);
    }

    pub fn finish(self) -> Document {
        self.canvas.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;

    #[test]
    fn text_lines_advance_the_cursor() {
        let config = ReportConfig::default();
        let mut printer = PagePrinter::new(&config, None);
        assert!((printer.cursor_mm() - 15.0).abs() < 1e-3);
        printer.text_line("Hello", FontFace::Regular, 10.0, Color::BLACK);
        assert!((printer.cursor_mm() - 20.0).abs() < 1e-3);
        // 22pt needs more than the default line height.
        printer.text_line("Title", FontFace::Bold, 22.0, Color::BLACK);
        assert!(printer.cursor_mm() > 28.0);
    }

    #[test]
    fn overflow_breaks_to_a_new_page_once() {
        let config = ReportConfig::default();
        let mut printer = PagePrinter::new(&config, None);
        printer.gap(265.0);
        assert!(printer.ensure_space(10.0, "test"));
        assert_eq!(printer.page_number(), 2);
        assert!(printer.is_page_fresh());
        assert!(!printer.ensure_space(1000.0, "test"));
        assert_eq!(printer.page_number(), 2);

        let doc = printer.finish();
        assert_eq!(doc.meta_values(META_PAGE_BREAK_KEY), vec![(1, "test")]);
    }

    #[test]
    fn image_blocks_are_placed_at_the_cursor() {
        let config = ReportConfig::default();
        let mut printer = PagePrinter::new(&config, None);
        printer.gap(10.0);
        let image = EncodedImage {
            format: crate::encoder::ImageFormat::Flate,
            width: 1,
            height: 1,
            gray: true,
            data: vec![0],
        };
        let id = printer.image_block(image, 100.0, 50.0);
        assert!((printer.cursor_mm() - 75.0).abs() < 1e-3);
        let doc = printer.finish();
        let placements = doc.image_placements();
        assert_eq!(placements.len(), 1);
        match placements[0].1 {
            Command::DrawImage {
                y, resource_id, ..
            } => {
                assert!((y.to_mm() - 25.0).abs() < 1e-3);
                assert_eq!(resource_id, &id);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
