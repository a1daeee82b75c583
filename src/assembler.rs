use crate::canvas::Document;
use crate::config::ReportConfig;
use crate::contrast::{ContrastClassifier, ContrastProfile};
use crate::debug::DebugLogger;
use crate::encoder::{ImageEncoder, passthrough};
use crate::error::ReportError;
use crate::font::FontFace;
use crate::format::format_decimal;
use crate::geometry::{GeometryPlanner, PageLayoutPlan};
use crate::labels::{Labels, keys};
use crate::metrics::RenderMetrics;
use crate::pdf_raster::DocumentRasterizer;
use crate::printer::PagePrinter;
use crate::raster::{RasterImage, SurfaceFactory};
use crate::record::{AttachmentKind, ExpenseRecord, ReportHeader};
use crate::splitter::{PageSplitter, count_encoding};
use crate::table::SummaryTable;
use crate::types::Color;

pub const META_RECEIPT_KEY: &str = "receipt";
pub const META_PLACEHOLDER_KEY: &str = "receipt.placeholder";

/// Builds the report document: header, summary table, totals, then the
/// receipts section with every attached image or document page.
pub struct DocumentAssembler<'a> {
    config: &'a ReportConfig,
    labels: &'a dyn Labels,
    surfaces: &'a dyn SurfaceFactory,
    rasterizer: &'a dyn DocumentRasterizer,
    debug: Option<&'a DebugLogger>,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(
        config: &'a ReportConfig,
        labels: &'a dyn Labels,
        surfaces: &'a dyn SurfaceFactory,
        rasterizer: &'a dyn DocumentRasterizer,
    ) -> Self {
        Self {
            config,
            labels,
            surfaces,
            rasterizer,
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    /// Lays out the whole report. Problems with a single receipt are logged and
    /// that receipt is skipped or replaced by a placeholder; they never abort the
    /// document.
    pub fn assemble(
        &self,
        records: &[ExpenseRecord],
        header: &ReportHeader,
    ) -> Result<(Document, RenderMetrics), ReportError> {
        let mut printer = PagePrinter::new(self.config, self.debug);
        let mut metrics = RenderMetrics::default();

        self.render_header(&mut printer, header);
        let table = SummaryTable::new(self.config, self.labels);
        let summary = table.render(&mut printer, records);
        table.footer(&mut printer, summary.total, header.reporter.as_ref());
        metrics.summary_rows = summary.rows;

        let receipts: Vec<(usize, &ExpenseRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.receipt().is_some())
            .collect();
        if !receipts.is_empty() {
            printer.new_page("receipts_section");
            printer.text_line(
                self.labels.label(keys::RECEIPTS),
                FontFace::Bold,
                self.config.heading_font_size,
                Color::BLACK,
            );
            printer.gap(self.config.line_height_mm);
        }

        let encoder = ImageEncoder::new(self.config, self.surfaces);
        let placer = ReceiptPlacer {
            config: self.config,
            classifier: ContrastClassifier::new(self.config, self.surfaces),
            planner: GeometryPlanner::new(self.config),
            splitter: PageSplitter::new(&encoder, self.labels),
            encoder: &encoder,
            debug: self.debug,
        };
        for (index, record) in receipts {
            self.place_receipt(&placer, &mut printer, index, record, &mut metrics);
        }

        let document = printer.finish();
        metrics.pages = document.page_count();
        if let Some(debug) = self.debug {
            debug.emit_summary("report");
            debug.flush();
        }
        log::debug!(
            "assembled {} pages, {} rows, {} image blocks",
            metrics.pages,
            metrics.summary_rows,
            metrics.image_blocks()
        );
        Ok((document, metrics))
    }

    fn render_header(&self, printer: &mut PagePrinter<'_>, header: &ReportHeader) {
        printer.text_line(
            self.labels.label(keys::EXPENSE_REPORT),
            FontFace::Bold,
            self.config.title_font_size,
            Color::BLACK,
        );
        printer.gap(2.0);
        let date_line = format!("{}: {}", self.labels.label(keys::DATE), header.report_date);
        printer.text_line(&date_line, FontFace::Regular, self.config.body_font_size, Color::BLACK);
        printer.gap(6.0);
    }

    fn place_receipt(
        &self,
        placer: &ReceiptPlacer<'_>,
        printer: &mut PagePrinter<'_>,
        index: usize,
        record: &ExpenseRecord,
        metrics: &mut RenderMetrics,
    ) {
        let Some(attachment) = record.receipt() else {
            return;
        };
        let label = self.receipt_label(index, record);
        match attachment.kind() {
            AttachmentKind::RasterImage => {
                let image = match RasterImage::decode(attachment) {
                    Ok(image) => image,
                    Err(err) => {
                        self.skip(index, &err, metrics);
                        return;
                    }
                };
                let profile = placer.classifier.classify(&image);
                if let Err(err) = placer.place(printer, index, &image, profile, &label, metrics) {
                    self.skip(index, &err, metrics);
                }
            }
            AttachmentKind::EmbeddedDocument => {
                let document = match self.rasterizer.open(&attachment.data) {
                    Ok(document) => document,
                    Err(err) => {
                        log::warn!("record {}: embedded document unreadable: {err}", index + 1);
                        self.placeholder(printer, index, record, metrics);
                        return;
                    }
                };
                let page_count = document.page_count();
                for page in 0..page_count {
                    let page_label = format!(
                        "{label} ({} {}/{page_count})",
                        self.labels.label(keys::PAGE),
                        page + 1
                    );
                    // Pages are released before the next one is rendered.
                    let result = document
                        .rasterize_page(page, self.config.pdf_page_raster_scale)
                        .and_then(|image| {
                            placer.place(
                                printer,
                                index,
                                &image,
                                ContrastProfile::photographic(),
                                &page_label,
                                metrics,
                            )
                        });
                    if let Err(err) = result {
                        log::warn!("record {} page {}: {err}", index + 1, page + 1);
                        self.placeholder(printer, index, record, metrics);
                    }
                }
            }
        }
    }

    /// "#N: description — category", with trip details for driving records.
    pub fn receipt_label(&self, index: usize, record: &ExpenseRecord) -> String {
        let mut label = format!(
            "#{}: {} \u{2014} {}",
            index + 1,
            record.description,
            self.labels.label(&record.category)
        );
        if let Some(driving) = record.driving_details() {
            let mut details = vec![format!("{} km", format_decimal(driving.distance_km))];
            if let Some(passengers) = driving.passengers.as_deref().filter(|p| !p.trim().is_empty()) {
                details.push(format!("{}: {}", self.labels.label(keys::PASSENGERS), passengers.trim()));
            }
            label.push_str(&format!(" ({})", details.join(", ")));
        }
        label
    }

    fn skip(&self, index: usize, err: &ReportError, metrics: &mut RenderMetrics) {
        log::warn!("record {}: receipt skipped: {err}", index + 1);
        if let Some(debug) = self.debug {
            debug.record_skipped(index + 1, &err.to_string());
        }
        metrics.skipped_images += 1;
    }

    fn placeholder(
        &self,
        printer: &mut PagePrinter<'_>,
        index: usize,
        record: &ExpenseRecord,
        metrics: &mut RenderMetrics,
    ) {
        let text = format!(
            "#{}: {} \u{2014} {}",
            index + 1,
            record.description,
            self.labels.label(keys::RECEIPT_UNAVAILABLE)
        );
        printer.meta(META_PLACEHOLDER_KEY, format!("{}", index + 1));
        printer.text_line(
            &text,
            FontFace::Regular,
            self.config.label_font_size,
            Color::gray(0.35),
        );
        printer.gap(self.config.line_height_mm);
        metrics.placeholder_records += 1;
    }
}

/// Places one decoded image with its label: plan, then single block or split.
struct ReceiptPlacer<'a> {
    config: &'a ReportConfig,
    classifier: ContrastClassifier<'a>,
    planner: GeometryPlanner<'a>,
    splitter: PageSplitter<'a>,
    encoder: &'a ImageEncoder<'a>,
    debug: Option<&'a DebugLogger>,
}

impl ReceiptPlacer<'_> {
    fn place(
        &self,
        printer: &mut PagePrinter<'_>,
        index: usize,
        image: &RasterImage,
        profile: ContrastProfile,
        label: &str,
        metrics: &mut RenderMetrics,
    ) -> Result<(), ReportError> {
        let label_height = printer.line_height_mm(self.config.label_font_size);
        printer.ensure_space(label_height + self.config.min_image_block_mm, "receipt_label");

        let mut plan = self.plan_below_label(printer, image, label_height);
        if plan.start_on_new_page {
            if !printer.is_page_fresh() {
                printer.new_page("receipt_label");
                plan = self.plan_below_label(printer, image, label_height);
            }
            // A fresh page has no more room to offer; the first band goes below the label.
            if plan.start_on_new_page {
                plan = self.planner.plan_without_page_break(
                    image.width(),
                    image.height(),
                    self.config.usable_width_mm(),
                    self.config.usable_height_mm(),
                    printer.cursor_mm() + label_height,
                );
            }
        }
        if let Some(debug) = self.debug {
            debug.image_plan(
                index + 1,
                (image.width(), image.height()),
                (plan.width_mm, plan.height_mm),
                plan.decision.as_str(),
                plan.chunk_count(),
                plan.effective_dpi,
            );
        }
        log::debug!(
            "record {}: {} ({}), {} band(s) at {:.0} dpi",
            index + 1,
            plan.decision.as_str(),
            profile.as_str(),
            plan.chunk_count(),
            plan.effective_dpi
        );

        printer.meta(META_RECEIPT_KEY, label);
        printer.text_line(label, FontFace::Bold, self.config.label_font_size, Color::BLACK);

        if plan.is_split() {
            self.splitter
                .split(printer, image, &plan, profile, label, metrics)?;
        } else {
            let encoded = match self.encoder.encode_whole(image, profile) {
                Ok(encoded) => encoded,
                Err(ReportError::SurfaceUnavailable) => {
                    metrics.passthrough_images += 1;
                    passthrough(image)?
                }
                Err(err) => return Err(err),
            };
            count_encoding(metrics, &encoded);
            printer.image_block(encoded, plan.width_mm, plan.height_mm);
            metrics.single_blocks += 1;
        }
        printer.gap(self.config.line_height_mm);
        Ok(())
    }

    fn plan_below_label(
        &self,
        printer: &PagePrinter<'_>,
        image: &RasterImage,
        label_height: f32,
    ) -> PageLayoutPlan {
        self.planner.plan(
            image.width(),
            image.height(),
            self.config.usable_width_mm(),
            self.config.usable_height_mm(),
            printer.cursor_mm() + label_height,
        )
    }
}
