use crate::canvas::{Command, Document};
use crate::encoder::EncodedImage;
use crate::error::ReportError;
use crate::font::FontFace;
use crate::types::{Color, Pt};
use fixed::types::I32F32;
use std::collections::BTreeSet;
use std::io::{self, Write};

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const INFO_ID: usize = 3;
const FONT_REGULAR_ID: usize = 4;
const FONT_BOLD_ID: usize = 5;
const FIRST_DYNAMIC_ID: usize = 6;

/// Serializes a finished document into PDF bytes.
pub fn document_to_pdf(document: &Document, title: &str) -> Result<Vec<u8>, ReportError> {
    let mut out = Vec::new();
    write_pdf(document, title, &mut out)?;
    Ok(out)
}

/// Writes `document` to `writer` and returns the number of bytes written.
///
/// Object layout: catalog, page tree, info, the two Helvetica faces, one XObject
/// per registered image, then a content stream and page object per page.
pub fn write_pdf<W: Write>(
    document: &Document,
    title: &str,
    writer: W,
) -> Result<usize, ReportError> {
    let layout = ObjectLayout::new(document);
    let mut pdf = PdfWriter::new(writer, layout.object_count);
    pdf.write_bytes(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")?;

    pdf.begin_object(CATALOG_ID)?;
    pdf.write_str(&format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>"))?;
    pdf.end_object()?;

    let kids: Vec<String> = layout
        .page_ids
        .iter()
        .map(|(_, page_id)| format!("{page_id} 0 R"))
        .collect();
    pdf.begin_object(PAGES_ID)?;
    pdf.write_str(&format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        kids.len()
    ))?;
    pdf.end_object()?;

    pdf.begin_object(INFO_ID)?;
    pdf.write_str(&format!(
        "<< /Title ({}) /Producer (expense-report) >>",
        encode_winansi_pdf_string(title).text
    ))?;
    pdf.end_object()?;

    for (id, face) in [(FONT_REGULAR_ID, FontFace::Regular), (FONT_BOLD_ID, FontFace::Bold)] {
        pdf.begin_object(id)?;
        pdf.write_str(&font_object(face))?;
        pdf.end_object()?;
    }

    for ((_, image), id) in document.images.iter().zip(layout.image_ids.iter()) {
        pdf.begin_object(*id)?;
        write_image_object(&mut pdf, image)?;
        pdf.end_object()?;
    }

    let page_width = document.page_size.width;
    let page_height = document.page_size.height;
    for (page, (content_id, page_id)) in document.pages.iter().zip(layout.page_ids.iter()) {
        let content = page_content(&page.commands, page_height);
        pdf.begin_object(*content_id)?;
        pdf.write_str(&format!("<< /Length {} >>\nstream\n", content.len()))?;
        pdf.write_bytes(content.as_bytes())?;
        pdf.write_str("\nendstream")?;
        pdf.end_object()?;

        let xobjects = xobject_resources(document, &page.commands, &layout);
        pdf.begin_object(*page_id)?;
        pdf.write_str(&format!(
            "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 {FONT_REGULAR_ID} 0 R /F2 {FONT_BOLD_ID} 0 R >>{} >> \
             /Contents {content_id} 0 R >>",
            fmt_pt(page_width),
            fmt_pt(page_height),
            xobjects
        ))?;
        pdf.end_object()?;
    }

    pdf.finish()
}

/// Object ids assigned before anything is written, so the page tree can
/// reference pages that come later in the file.
struct ObjectLayout {
    image_ids: Vec<usize>,
    page_ids: Vec<(usize, usize)>,
    object_count: usize,
}

impl ObjectLayout {
    fn new(document: &Document) -> Self {
        let mut next = FIRST_DYNAMIC_ID;
        let image_ids = (0..document.images.len())
            .map(|_| {
                next += 1;
                next - 1
            })
            .collect();
        let page_ids = (0..document.pages.len())
            .map(|_| {
                next += 2;
                (next - 2, next - 1)
            })
            .collect();
        Self {
            image_ids,
            page_ids,
            object_count: next - 1,
        }
    }

    fn image_object_id(&self, document: &Document, resource_id: &str) -> Option<usize> {
        let index = document.images.keys().position(|key| key == resource_id)?;
        self.image_ids.get(index).copied()
    }
}

struct PdfWriter<W: Write> {
    out: W,
    offset: usize,
    offsets: Vec<usize>,
}

impl<W: Write> PdfWriter<W> {
    fn new(out: W, object_count: usize) -> Self {
        Self {
            out,
            offset: 0,
            offsets: vec![0; object_count],
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.offset += bytes.len();
        Ok(())
    }

    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    fn begin_object(&mut self, id: usize) -> Result<(), ReportError> {
        let slot = self
            .offsets
            .get_mut(id - 1)
            .ok_or_else(|| ReportError::Pdf(format!("object {id} outside the layout")))?;
        *slot = self.offset;
        self.write_str(&format!("{id} 0 obj\n"))?;
        Ok(())
    }

    fn end_object(&mut self) -> io::Result<()> {
        self.write_str("\nendobj\n")
    }

    fn finish(mut self) -> Result<usize, ReportError> {
        let xref_offset = self.offset;
        let size = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {size} /Root {CATALOG_ID} 0 R /Info {INFO_ID} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        ));
        self.write_str(&xref)?;
        self.out.flush()?;
        Ok(self.offset)
    }
}

fn font_object(face: FontFace) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        face.pdf_name()
    )
}

fn font_resource(face: FontFace) -> &'static str {
    match face {
        FontFace::Regular => "F1",
        FontFace::Bold => "F2",
    }
}

fn write_image_object<W: Write>(
    pdf: &mut PdfWriter<W>,
    image: &EncodedImage,
) -> Result<(), ReportError> {
    pdf.write_str(&format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} \
         /BitsPerComponent 8 /Filter {} /Length {} >>\nstream\n",
        image.width,
        image.height,
        image.color_space(),
        image.filter(),
        image.data.len()
    ))?;
    pdf.write_bytes(&image.data)?;
    pdf.write_str("\nendstream")?;
    Ok(())
}

fn xobject_resources(document: &Document, commands: &[Command], layout: &ObjectLayout) -> String {
    let used: BTreeSet<&str> = commands
        .iter()
        .filter_map(|cmd| match cmd {
            Command::DrawImage { resource_id, .. } => Some(resource_id.as_str()),
            _ => None,
        })
        .collect();
    if used.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = used
        .into_iter()
        .filter_map(|name| {
            layout
                .image_object_id(document, name)
                .map(|id| format!("/{name} {id} 0 R"))
        })
        .collect();
    format!(" /XObject << {} >>", entries.join(" "))
}

/// Translates canvas commands into a content stream, flipping y so that the
/// canvas's top-left origin lands on PDF's bottom-left one.
fn page_content(commands: &[Command], page_height: Pt) -> String {
    let mut out = String::new();
    let mut face = FontFace::Regular;
    let mut font_size = Pt::from_f32(12.0);
    for cmd in commands {
        match cmd {
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => {
                out.push_str(&format!("{} rg\n", color_components(*color)));
            }
            Command::SetStrokeColor(color) => {
                out.push_str(&format!("{} RG\n", color_components(*color)));
            }
            Command::SetLineWidth(width) => out.push_str(&format!("{} w\n", fmt_pt(*width))),
            Command::SetFontName(name) => face = FontFace::from_pdf_name(name),
            Command::SetFontSize(size) => font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re f\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    log::debug!("{} characters outside WinAnsi replaced in {text:?}", encoded.replaced);
                }
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", font_resource(face), fmt_pt(font_size)));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - font_size)
                ));
                out.push_str(&format!("({}) Tj\nET\n", encoded.text));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height)
                ));
                out.push_str(&format!("/{resource_id} Do\nQ\n"));
            }
        }
    }
    out
}

fn color_components(color: Color) -> String {
    format!(
        "{} {} {}",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

// cp1252 codes in 0x80..=0x9F that differ from Latin-1.
const WINANSI_HIGH: [(u8, char); 18] = [
    (0x80, '\u{20AC}'),
    (0x82, '\u{201A}'),
    (0x85, '\u{2026}'),
    (0x8A, '\u{0160}'),
    (0x8C, '\u{0152}'),
    (0x8E, '\u{017D}'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '\u{2022}'),
    (0x96, '\u{2013}'),
    (0x97, '\u{2014}'),
    (0x99, '\u{2122}'),
    (0x9A, '\u{0161}'),
    (0x9C, '\u{0153}'),
    (0x9E, '\u{017E}'),
    (0x9F, '\u{0178}'),
];

fn winansi_byte(ch: char) -> Option<u8> {
    match ch {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => Some(ch as u8),
        _ => WINANSI_HIGH
            .iter()
            .find(|(_, mapped)| *mapped == ch)
            .map(|(byte, _)| *byte),
    }
}

/// The character a WinAnsi byte stands for. Unassigned codes map to themselves.
pub(crate) fn winansi_char(byte: u8) -> char {
    WINANSI_HIGH
        .iter()
        .find(|(code, _)| *code == byte)
        .map(|(_, ch)| *ch)
        .unwrap_or(byte as char)
}

/// Escapes `input` as the body of a PDF literal string in WinAnsi (cp1252) bytes.
/// Characters with no cp1252 code become `?`.
fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = winansi_byte(ch).unwrap_or_else(|| {
            replaced += 1;
            b'?'
        });
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{b:03o}")),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let scaled = (I32F32::from_num(value) * I32F32::from_num(1000)).round();
    format_milli(scaled.to_num())
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let (int_part, frac_part) = (abs / 1000, abs % 1000);
    if frac_part == 0 {
        return if abs == 0 {
            "0".to_string()
        } else {
            format!("{sign}{int_part}")
        };
    }
    let frac = format!("{frac_part:03}");
    format!("{sign}{int_part}.{}", frac.trim_end_matches('0'))
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
