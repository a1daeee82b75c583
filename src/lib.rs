mod assembler;
mod canvas;
mod config;
mod contrast;
mod debug;
mod encoder;
mod error;
mod font;
mod format;
mod frame;
mod geometry;
mod labels;
mod metrics;
mod page_template;
mod pdf;
mod pdf_raster;
mod printer;
mod raster;
mod record;
mod splitter;
mod table;
mod types;

pub use assembler::{DocumentAssembler, META_PLACEHOLDER_KEY, META_RECEIPT_KEY};
pub use canvas::{Canvas, Command, Document, Page};
pub use config::ReportConfig;
pub use contrast::{ContrastClassifier, ContrastProfile, luminance_std_dev, sample_window};
use debug::DebugLogger;
pub use encoder::{
    EncodedImage, Encoding, ImageEncoder, ImageFormat, encoding_for, normalized_width, passthrough,
};
pub use error::ReportError;
pub use font::{FontFace, text_width, wrap_text};
pub use format::{format_currency, format_decimal};
pub use geometry::{ChunkPlan, GeometryPlanner, PageLayoutPlan, PlacementDecision, effective_dpi};
pub use labels::{LabelTable, Labels, keys};
pub use metrics::RenderMetrics;
pub use pdf::{document_to_pdf, write_pdf};
pub use pdf_raster::{DocumentRasterizer, LopdfRasterizer, PagedDocument};
pub use printer::{META_PAGE_BREAK_KEY, PagePrinter};
pub use raster::{NoSurfaceFactory, PixelRect, PixmapSurfaceFactory, RasterImage, SurfaceFactory};
pub use record::{
    Attachment, AttachmentKind, DrivingDetails, ExpenseKind, ExpenseRecord, ReportHeader,
    ReporterDetails,
};
pub use splitter::{META_IMAGE_CHUNK_KEY, PageSplitter, SplitOutcome};
pub use table::{META_TABLE_ROW_KEY, SummaryTable, TableSummary};
pub use types::{Color, MM_PER_INCH, PT_PER_INCH, Pt, Rect, Size};

use std::path::Path;
use std::sync::Arc;

/// Expense-report renderer: lays records and their receipts out on A4 pages and
/// serializes the result as PDF.
pub struct ExpenseReport {
    config: ReportConfig,
    labels: Arc<dyn Labels>,
    surfaces: Arc<dyn SurfaceFactory>,
    rasterizer: Arc<dyn DocumentRasterizer>,
    debug: Option<DebugLogger>,
}

impl ExpenseReport {
    pub fn builder() -> ExpenseReportBuilder {
        ExpenseReportBuilder::new()
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Lays out the report without serializing it.
    pub fn assemble(
        &self,
        records: &[ExpenseRecord],
        header: &ReportHeader,
    ) -> Result<(Document, RenderMetrics), ReportError> {
        DocumentAssembler::new(
            &self.config,
            self.labels.as_ref(),
            self.surfaces.as_ref(),
            self.rasterizer.as_ref(),
        )
        .with_debug(self.debug.as_ref())
        .assemble(records, header)
    }

    pub fn render_pdf(
        &self,
        records: &[ExpenseRecord],
        header: &ReportHeader,
    ) -> Result<Vec<u8>, ReportError> {
        Ok(self.render_pdf_with_metrics(records, header)?.0)
    }

    pub fn render_pdf_with_metrics(
        &self,
        records: &[ExpenseRecord],
        header: &ReportHeader,
    ) -> Result<(Vec<u8>, RenderMetrics), ReportError> {
        let (document, metrics) = self.assemble(records, header)?;
        let bytes = document_to_pdf(&document, &self.title(header))?;
        log::info!(
            "rendered expense report: {} pages, {} bytes",
            metrics.pages,
            bytes.len()
        );
        Ok((bytes, metrics))
    }

    /// Renders and writes the PDF to `path`, returning the byte count.
    pub fn render_pdf_to_path(
        &self,
        records: &[ExpenseRecord],
        header: &ReportHeader,
        path: impl AsRef<Path>,
    ) -> Result<usize, ReportError> {
        let (document, _) = self.assemble(records, header)?;
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        write_pdf(&document, &self.title(header), writer)
    }

    fn title(&self, header: &ReportHeader) -> String {
        let title = self.labels.label(keys::EXPENSE_REPORT);
        if header.report_date.trim().is_empty() {
            title.to_string()
        } else {
            format!("{title} {}", header.report_date.trim())
        }
    }
}

pub struct ExpenseReportBuilder {
    config: ReportConfig,
    labels: Arc<dyn Labels>,
    surfaces: Arc<dyn SurfaceFactory>,
    rasterizer: Arc<dyn DocumentRasterizer>,
    debug_path: Option<std::path::PathBuf>,
}

impl Default for ExpenseReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpenseReportBuilder {
    pub fn new() -> Self {
        Self {
            config: ReportConfig::default(),
            labels: Arc::new(LabelTable::english()),
            surfaces: Arc::new(PixmapSurfaceFactory),
            rasterizer: Arc::new(LopdfRasterizer),
            debug_path: None,
        }
    }

    pub fn config(mut self, config: ReportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn labels(mut self, labels: impl Labels + 'static) -> Self {
        self.labels = Arc::new(labels);
        self
    }

    /// Drawing surface used for resampling. [`NoSurfaceFactory`] makes every image
    /// go in from its source bytes.
    pub fn surface_factory(mut self, surfaces: Arc<dyn SurfaceFactory>) -> Self {
        self.surfaces = surfaces;
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn DocumentRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Writes JSONL layout events (page breaks, plans, encodes, skips) to `path`.
    pub fn debug_log(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ExpenseReport, ReportError> {
        self.config.validate()?;
        let debug = if let Some(path) = self.debug_path {
            Some(DebugLogger::new(path)?)
        } else {
            None
        };
        Ok(ExpenseReport {
            config: self.config,
            labels: self.labels,
            surfaces: self.surfaces,
            rasterizer: self.rasterizer,
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_invalid_configuration() {
        let config = ReportConfig {
            split_overlap_mm: -1.0,
            ..ReportConfig::default()
        };
        let result = ExpenseReport::builder().config(config).build();
        assert!(matches!(result, Err(ReportError::InvalidConfiguration(_))));
    }

    #[test]
    fn title_includes_the_report_date() {
        let report = ExpenseReport::builder()
            .labels(LabelTable::swedish())
            .build()
            .unwrap();
        assert_eq!(
            report.title(&ReportHeader::new("2024-05-01")),
            "Utgiftsrapport 2024-05-01"
        );
        assert_eq!(report.title(&ReportHeader::new(" ")), "Utgiftsrapport");
    }

    #[test]
    fn debug_log_records_layout_events() {
        let path = std::env::temp_dir().join(format!(
            "expense_report_debug_{}.jsonl",
            std::process::id()
        ));
        let report = ExpenseReport::builder().debug_log(&path).build().unwrap();
        let records = vec![ExpenseRecord::standard("Taxi", "Travel", 240.0)];
        report.render_pdf(&records, &ReportHeader::new("2024-05-01")).unwrap();
        let log = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(log.contains("\"type\":\"debug.summary\""), "{log}");
    }
}
