use crate::config::ReportConfig;
use crate::font::{FontFace, text_width, wrap_text};
use crate::format::{format_currency, format_decimal};
use crate::labels::{Labels, keys};
use crate::printer::PagePrinter;
use crate::record::{ExpenseRecord, ReporterDetails};
use crate::types::{Color, Pt};

pub const META_TABLE_ROW_KEY: &str = "table.row";

const CELL_PADDING_MM: f32 = 1.2;
// Index, description, cost, category.
const COLUMN_SHARES: [f32; 4] = [0.07, 0.48, 0.18, 0.27];
const HEADER_FILL: Color = Color {
    r: 0.86,
    g: 0.89,
    b: 0.93,
};
const RULE_COLOR: Color = Color {
    r: 0.75,
    g: 0.75,
    b: 0.75,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSummary {
    pub rows: usize,
    pub total: f64,
}

#[derive(Debug, Clone, Copy)]
struct Column {
    x: Pt,
    width: Pt,
    right_aligned: bool,
}

/// The per-record summary table, the totals line and the reporter footer.
pub struct SummaryTable<'a> {
    config: &'a ReportConfig,
    labels: &'a dyn Labels,
}

impl<'a> SummaryTable<'a> {
    pub fn new(config: &'a ReportConfig, labels: &'a dyn Labels) -> Self {
        Self { config, labels }
    }

    /// Draws one row per record, repeating the header after every page break.
    pub fn render(&self, printer: &mut PagePrinter<'_>, records: &[ExpenseRecord]) -> TableSummary {
        let columns = self.columns(printer);
        self.header(printer, &columns);

        let size = self.config.body_font_size;
        let line_height = printer.line_height_mm(size);
        let mut total = 0.0;
        for (index, record) in records.iter().enumerate() {
            total += record.cost;
            let cells = [
                vec![format!("{}", index + 1)],
                self.description_lines(record),
                vec![format_currency(record.cost, &self.config.currency_suffix)],
                vec![self.labels.label(&record.category).to_string()],
            ];
            let wrapped: Vec<Vec<String>> = cells
                .iter()
                .zip(columns.iter())
                .map(|(lines, column)| self.wrap_cell(lines, column))
                .collect();
            let line_count = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
            let row_height = line_count as f32 * line_height + 2.0 * CELL_PADDING_MM;

            if printer.ensure_space(row_height, "table_overflow") {
                self.header(printer, &columns);
            }
            printer.meta(META_TABLE_ROW_KEY, format!("{}", index + 1));
            printer.gap(CELL_PADDING_MM);
            for line_index in 0..line_count {
                for (lines, column) in wrapped.iter().zip(columns.iter()) {
                    if let Some(line) = lines.get(line_index) {
                        let x = self.cell_x(column, FontFace::Regular, line);
                        printer.text_at(x, line, FontFace::Regular, size, Color::BLACK, line_height);
                    }
                }
                printer.gap(line_height);
            }
            printer.gap(CELL_PADDING_MM);
            printer.rule(0.0, RULE_COLOR);
        }

        TableSummary {
            rows: records.len(),
            total,
        }
    }

    /// Totals line and, when known, the reporter's payout details.
    pub fn footer(
        &self,
        printer: &mut PagePrinter<'_>,
        total: f64,
        reporter: Option<&ReporterDetails>,
    ) {
        let size = self.config.body_font_size;
        printer.gap(2.0);
        let total_line = format!(
            "{}: {}",
            self.labels.label(keys::TOTAL),
            format_currency(total, &self.config.currency_suffix)
        );
        printer.text_line(&total_line, FontFace::Bold, size + 1.0, Color::BLACK);

        let Some(reporter) = reporter else {
            return;
        };
        printer.gap(3.0);
        let fields = [
            (keys::REPORTER_NAME, &reporter.name),
            (keys::BANK_NAME, &reporter.bank_name),
            (keys::CLEARING_NUMBER, &reporter.clearing_number),
            (keys::ACCOUNT_NUMBER, &reporter.account_number),
        ];
        for (key, value) in fields {
            if value.trim().is_empty() {
                continue;
            }
            let line = format!("{}: {}", self.labels.label(key), value.trim());
            printer.text_line(&line, FontFace::Regular, size, Color::BLACK);
        }
    }

    /// Description cell content. Driving records fold their trip details in below
    /// the purpose.
    pub fn description_lines(&self, record: &ExpenseRecord) -> Vec<String> {
        let mut lines = vec![record.description.clone()];
        let Some(driving) = record.driving_details() else {
            return lines;
        };
        if let Some(passengers) = driving.passengers.as_deref().filter(|p| !p.trim().is_empty()) {
            lines.push(format!("{}: {}", self.labels.label(keys::PASSENGERS), passengers.trim()));
        }
        lines.push(format!(
            "{}: {}",
            self.labels.label(keys::DISTANCE_KM),
            format_decimal(driving.distance_km)
        ));
        if !driving.route_stops.is_empty() {
            lines.push(format!(
                "{}: {}",
                self.labels.label(keys::ROUTE),
                driving.route_stops.join(" \u{2013} ")
            ));
        }
        if let Some(calculated) = driving.calculated_distance_km {
            lines.push(format!(
                "{}: {}",
                self.labels.label(keys::CALCULATED_DISTANCE_KM),
                format_decimal(calculated)
            ));
        }
        lines.push(format!(
            "{} km \u{00d7} {}/km",
            format_decimal(driving.distance_km),
            format_currency(self.config.driving_cost_per_km, &self.config.currency_suffix)
        ));
        lines
    }

    fn header(&self, printer: &mut PagePrinter<'_>, columns: &[Column; 4]) {
        let size = self.config.body_font_size;
        let line_height = printer.line_height_mm(size);
        let height = line_height + 2.0 * CELL_PADDING_MM;
        printer.ensure_space(height, "table_overflow");
        let rect = printer.frame_rect();
        printer.fill_rect(rect.x, rect.width, height, HEADER_FILL);
        printer.gap(CELL_PADDING_MM);
        let titles = [
            "#",
            self.labels.label(keys::DESCRIPTION),
            self.labels.label(keys::COST),
            self.labels.label(keys::CATEGORY),
        ];
        for (title, column) in titles.iter().zip(columns.iter()) {
            let x = self.cell_x(column, FontFace::Bold, title);
            printer.text_at(x, title, FontFace::Bold, size, Color::BLACK, line_height);
        }
        printer.gap(line_height + CELL_PADDING_MM);
    }

    fn columns(&self, printer: &PagePrinter<'_>) -> [Column; 4] {
        let rect = printer.frame_rect();
        let mut x = rect.x;
        let mut columns = [Column {
            x,
            width: Pt::ZERO,
            right_aligned: false,
        }; 4];
        for (index, share) in COLUMN_SHARES.iter().enumerate() {
            let width = rect.width * *share;
            columns[index] = Column {
                x,
                width,
                right_aligned: index == 2,
            };
            x += width;
        }
        columns
    }

    fn wrap_cell(&self, lines: &[String], column: &Column) -> Vec<String> {
        let max_width = (column.width - Pt::from_mm(2.0 * CELL_PADDING_MM)).to_f32();
        lines
            .iter()
            .flat_map(|line| wrap_text(FontFace::Regular, self.config.body_font_size, max_width, line))
            .collect()
    }

    fn cell_x(&self, column: &Column, face: FontFace, text: &str) -> Pt {
        let padding = Pt::from_mm(CELL_PADDING_MM);
        if !column.right_aligned {
            return column.x + padding;
        }
        let width = Pt::from_f32(text_width(face, self.config.body_font_size, text));
        (column.x + column.width - padding - width).max(column.x + padding)
    }
}
