use crate::encoder::EncodedImage;
use crate::font::FontFace;
use crate::types::{Color, Pt, Size};
use std::collections::{BTreeMap, HashMap};

/// Drawing commands in top-left page coordinates (points). The PDF writer flips y.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Non-rendered metadata used for page-aware reporting and tests. Ignored by the PDF writer.
    Meta {
        key: String,
        value: String,
    },
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetFontName(String),
    SetFontSize(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    // Filled rectangle in the current fill color.
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    // `y` is the top of the text line; the baseline sits one font size below it.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, EncodedImage>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All `DrawImage` commands with the page index they land on.
    pub fn image_placements(&self) -> Vec<(usize, &Command)> {
        self.pages
            .iter()
            .enumerate()
            .flat_map(|(index, page)| {
                page.commands
                    .iter()
                    .filter(|cmd| matches!(cmd, Command::DrawImage { .. }))
                    .map(move |cmd| (index, cmd))
            })
            .collect()
    }

    pub fn meta_values(&self, key: &str) -> Vec<(usize, &str)> {
        let mut out = Vec::new();
        for (index, page) in self.pages.iter().enumerate() {
            for cmd in &page.commands {
                if let Command::Meta { key: k, value } = cmd {
                    if k == key {
                        out.push((index, value.as_str()));
                    }
                }
            }
        }
        out
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.pages.iter().any(|page| {
            page.commands.iter().any(|cmd| match cmd {
                Command::DrawString { text, .. } => text.contains(needle),
                _ => false,
            })
        })
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font_size: Pt,
    font_name: String,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font_size: Pt::from_f32(12.0),
            font_name: FontFace::Regular.pdf_name().to_string(),
        }
    }
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    current_state: GraphicsState,
    images: BTreeMap<String, EncodedImage>,
    image_ids_by_fingerprint: HashMap<[u8; 32], String>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            current_state: GraphicsState::default(),
            images: BTreeMap::new(),
            image_ids_by_fingerprint: HashMap::new(),
        }
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.current.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_font(&mut self, face: FontFace, size: Pt) {
        let name = face.pdf_name();
        if self.current_state.font_name != name {
            self.current_state.font_name = name.to_string();
            self.current
                .commands
                .push(Command::SetFontName(name.to_string()));
        }
        if self.current_state.font_size != size {
            self.current_state.font_size = size;
            self.current.commands.push(Command::SetFontSize(size));
        }
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.current.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    /// Registers encoded pixels once per distinct content and returns the resource id.
    pub fn register_image(&mut self, image: EncodedImage) -> String {
        let fingerprint = image.fingerprint();
        if let Some(id) = self.image_ids_by_fingerprint.get(&fingerprint) {
            return id.clone();
        }
        let id = format!("img{}", self.images.len() + 1);
        self.images.insert(id.clone(), image);
        self.image_ids_by_fingerprint
            .insert(fingerprint, id.clone());
        id
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.current_state = GraphicsState::default();
    }

    pub fn current_command_count(&self) -> usize {
        self.current.commands.len()
    }

    pub fn is_current_empty(&self) -> bool {
        self.current.commands.is_empty()
    }

    /// Pages shown so far plus the one being drawn.
    pub fn page_number(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}
