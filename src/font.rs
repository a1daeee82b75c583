// Advance widths (1/1000 em) for the printable ASCII range 0x20..=0x7E of the
// standard Type 1 Helvetica faces. Text is emitted with WinAnsi encoding, so these
// two base-14 faces are the only fonts the report uses.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722, 722, 667,
    611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556,
    278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
}

impl FontFace {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            FontFace::Regular => "Helvetica",
            FontFace::Bold => "Helvetica-Bold",
        }
    }

    pub fn from_pdf_name(name: &str) -> FontFace {
        if name.eq_ignore_ascii_case("Helvetica-Bold") {
            FontFace::Bold
        } else {
            FontFace::Regular
        }
    }

    fn advance(&self, ch: char) -> u16 {
        let table = match self {
            FontFace::Regular => &HELVETICA_WIDTHS,
            FontFace::Bold => &HELVETICA_BOLD_WIDTHS,
        };
        let code = ch as u32;
        if (0x20..=0x7E).contains(&code) {
            return table[(code - 0x20) as usize];
        }
        match ch {
            'Å' | 'Ä' | 'À' | 'Á' | 'Â' | 'É' | 'È' | 'Ê' | 'Ü' => table['A' as usize - 0x20],
            'Ö' | 'Ø' | 'Ó' | 'Ô' => table['O' as usize - 0x20],
            '\u{00A0}' => table[0],
            '\u{2013}' => 556,
            '\u{2014}' => 1000,
            _ if ch.is_uppercase() => 722,
            _ => 556,
        }
    }
}

/// Width of `text` in points at `font_size`.
pub fn text_width(face: FontFace, font_size: f32, text: &str) -> f32 {
    let units: u32 = text.chars().map(|ch| face.advance(ch) as u32).sum();
    units as f32 * font_size / 1000.0
}

/// Greedy word wrap. Explicit newlines always break; words wider than the line are
/// broken between characters.
pub fn wrap_text(face: FontFace, font_size: f32, max_width: f32, text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if text_width(face, font_size, &candidate) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(face, font_size, word) <= max_width {
                current = word.to_string();
                continue;
            }
            for ch in word.chars() {
                current.push(ch);
                if text_width(face, font_size, &current) > max_width && current.chars().count() > 1
                {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(ch);
                }
            }
        }
        lines.push(current);
    }
    lines
}
