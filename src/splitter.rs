use crate::contrast::ContrastProfile;
use crate::encoder::{EncodedImage, ImageEncoder, passthrough};
use crate::error::ReportError;
use crate::geometry::PageLayoutPlan;
use crate::labels::{Labels, keys};
use crate::metrics::RenderMetrics;
use crate::printer::PagePrinter;
use crate::raster::{PixelRect, RasterImage};

pub const META_IMAGE_CHUNK_KEY: &str = "image.chunk";

/// Where a split placement left the page cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOutcome {
    pub chunks_placed: usize,
    pub final_cursor_mm: f32,
    /// No drawing surface was available; the image went in whole.
    pub degraded: bool,
}

/// Places a split plan band by band, one page per band, with continuation
/// labels between them.
pub struct PageSplitter<'a> {
    encoder: &'a ImageEncoder<'a>,
    labels: &'a dyn Labels,
}

impl<'a> PageSplitter<'a> {
    pub fn new(encoder: &'a ImageEncoder<'a>, labels: &'a dyn Labels) -> Self {
        Self { encoder, labels }
    }

    /// Writes every band of `plan` starting at the printer's cursor. `label`
    /// tags each band in the page metadata.
    ///
    /// Bands are encoded one at a time; only the band being placed is held in
    /// memory next to the source image.
    pub fn split(
        &self,
        printer: &mut PagePrinter<'_>,
        image: &RasterImage,
        plan: &PageLayoutPlan,
        profile: ContrastProfile,
        label: &str,
        metrics: &mut RenderMetrics,
    ) -> Result<SplitOutcome, ReportError> {
        let Some(first_chunk) = plan.chunks.first() else {
            return Err(ReportError::Encode("split plan has no bands".to_string()));
        };
        let band = |src_y: u32, src_height: u32| PixelRect::new(0, src_y, image.width(), src_height);

        // The first band doubles as the surface probe.
        let mut pending = match self.encoder.encode_band(
            image,
            band(first_chunk.src_y, first_chunk.src_height),
            profile,
        ) {
            Ok(encoded) => Some(encoded),
            Err(ReportError::SurfaceUnavailable) => {
                log::warn!("no drawing surface; placing {label} unsplit");
                return self.place_unsplit(printer, image, plan, metrics);
            }
            Err(err) => return Err(err),
        };

        let count = plan.chunks.len();
        for (index, chunk) in plan.chunks.iter().enumerate() {
            let encoded = match pending.take() {
                Some(encoded) => encoded,
                None => self.encoder.encode_band(
                    image,
                    band(chunk.src_y, chunk.src_height),
                    profile,
                )?,
            };
            if index > 0 || (plan.start_on_new_page && !printer.is_page_fresh()) {
                printer.new_page("image_split");
            }
            if index > 0 {
                printer.continuation_label(self.labels.label(keys::CONTINUED_FROM_PREVIOUS));
            }
            printer.meta(META_IMAGE_CHUNK_KEY, format!("{label} [{}/{count}]", index + 1));
            count_encoding(metrics, &encoded);
            printer.image_block(encoded, plan.width_mm, chunk.display_height_mm);
            if index + 1 < count {
                printer.continuation_label(self.labels.label(keys::CONTINUED_ON_NEXT));
            }
        }

        metrics.split_images += 1;
        metrics.split_chunks += count;
        Ok(SplitOutcome {
            chunks_placed: count,
            final_cursor_mm: printer.cursor_mm(),
            degraded: false,
        })
    }

    /// Embeds the source as one block at the cursor, shrunk to the room left on
    /// the page so it stays next to whatever was drawn above it.
    fn place_unsplit(
        &self,
        printer: &mut PagePrinter<'_>,
        image: &RasterImage,
        plan: &PageLayoutPlan,
        metrics: &mut RenderMetrics,
    ) -> Result<SplitOutcome, ReportError> {
        let encoded = passthrough(image)?;
        let room = printer.remaining_mm();
        let (mut width, mut height) = (plan.target_width_mm, plan.target_height_mm);
        if height > room && room > 0.0 {
            width *= room / height;
            height = room;
        }
        count_encoding(metrics, &encoded);
        printer.image_block(encoded, width, height);
        metrics.single_blocks += 1;
        metrics.passthrough_images += 1;
        Ok(SplitOutcome {
            chunks_placed: 1,
            final_cursor_mm: printer.cursor_mm(),
            degraded: true,
        })
    }
}

pub(crate) fn count_encoding(metrics: &mut RenderMetrics, encoded: &EncodedImage) {
    if encoded.is_lossless() {
        metrics.lossless_encodes += 1;
    } else {
        metrics.lossy_encodes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::config::ReportConfig;
    use crate::geometry::GeometryPlanner;
    use crate::labels::LabelTable;
    use crate::raster::{NoSurfaceFactory, PixmapSurfaceFactory};
    use image::{Rgba, RgbaImage};

    // 720x3600 lands 180mm wide and 900mm tall at about 100 DPI: a forced split.
    fn tall_receipt() -> RasterImage {
        let img = RgbaImage::from_fn(720, 3600, |x, y| {
            let v = ((x / 9 + y / 7) % 200) as u8 + 30;
            Rgba([v, v / 2, 255 - v, 255])
        });
        RasterImage::from_pixels(img)
    }

    fn split_plan(config: &ReportConfig, image: &RasterImage) -> PageLayoutPlan {
        GeometryPlanner::new(config).plan(
            image.width(),
            image.height(),
            config.usable_width_mm(),
            config.usable_height_mm(),
            config.margin_mm,
        )
    }

    #[test]
    fn bands_land_on_consecutive_pages_with_labels() {
        let config = ReportConfig::default();
        let labels = LabelTable::english();
        let encoder = ImageEncoder::new(&config, &PixmapSurfaceFactory);
        let splitter = PageSplitter::new(&encoder, &labels);
        let image = tall_receipt();
        let plan = split_plan(&config, &image);
        assert!(plan.is_split());

        let mut printer = PagePrinter::new(&config, None);
        let mut metrics = RenderMetrics::default();
        let outcome = splitter
            .split(&mut printer, &image, &plan, ContrastProfile::photographic(), "#1", &mut metrics)
            .unwrap();
        assert_eq!(outcome.chunks_placed, plan.chunk_count());
        assert!(!outcome.degraded);
        assert_eq!(metrics.split_images, 1);
        assert_eq!(metrics.split_chunks, plan.chunk_count());
        assert_eq!(metrics.lossy_encodes, plan.chunk_count());

        let doc = printer.finish();
        assert_eq!(doc.page_count(), plan.chunk_count());
        let placements = doc.image_placements();
        let pages: Vec<usize> = placements.iter().map(|(page, _)| *page).collect();
        assert_eq!(pages, (0..plan.chunk_count()).collect::<Vec<_>>());
        for (_, cmd) in placements {
            let Command::DrawImage { y, height, .. } = cmd else {
                unreachable!()
            };
            let bottom = (*y + *height).to_mm();
            assert!(bottom <= config.page_height_mm - config.margin_mm + 0.5);
        }
        let first = &doc.pages[0];
        let last = doc.pages.last().unwrap();
        let has = |page: &crate::canvas::Page, text: &str| {
            page.commands
                .iter()
                .any(|c| matches!(c, Command::DrawString { text: t, .. } if t == text))
        };
        assert!(has(first, "Continued on next page"));
        assert!(!has(first, "Continued from previous page"));
        assert!(has(last, "Continued from previous page"));
        assert!(!has(last, "Continued on next page"));
    }

    #[test]
    fn missing_surface_places_the_image_whole() {
        let config = ReportConfig::default();
        let labels = LabelTable::english();
        let encoder = ImageEncoder::new(&config, &NoSurfaceFactory);
        let splitter = PageSplitter::new(&encoder, &labels);
        let image = tall_receipt();
        let plan = split_plan(&config, &image);

        let mut printer = PagePrinter::new(&config, None);
        let mut metrics = RenderMetrics::default();
        let outcome = splitter
            .split(&mut printer, &image, &plan, ContrastProfile::photographic(), "#1", &mut metrics)
            .unwrap();
        assert!(outcome.degraded);
        assert_eq!(metrics.passthrough_images, 1);
        assert_eq!(metrics.split_images, 0);
        let doc = printer.finish();
        assert_eq!(doc.image_placements().len(), 1);
    }

    #[test]
    fn unsplit_fallback_stays_on_the_page_below_the_cursor() {
        let config = ReportConfig::default();
        let labels = LabelTable::english();
        let encoder = ImageEncoder::new(&config, &NoSurfaceFactory);
        let splitter = PageSplitter::new(&encoder, &labels);
        let image = tall_receipt();

        let mut printer = PagePrinter::new(&config, None);
        printer.gap(100.0);
        let plan = GeometryPlanner::new(&config).plan(
            image.width(),
            image.height(),
            config.usable_width_mm(),
            config.usable_height_mm(),
            printer.cursor_mm(),
        );
        assert!(plan.is_split());
        let room = printer.remaining_mm();
        let mut metrics = RenderMetrics::default();
        splitter
            .split(&mut printer, &image, &plan, ContrastProfile::photographic(), "#1", &mut metrics)
            .unwrap();

        let doc = printer.finish();
        assert_eq!(doc.page_count(), 1);
        let placements = doc.image_placements();
        let Command::DrawImage { y, height, .. } = placements[0].1 else {
            unreachable!()
        };
        assert!((y.to_mm() - (config.margin_mm + 100.0)).abs() < 0.01);
        assert!(height.to_mm() <= room + 0.01);
    }

    #[test]
    fn fresh_page_is_not_broken_again_for_the_first_band() {
        let config = ReportConfig {
            min_image_block_mm: 300.0,
            ..ReportConfig::default()
        };
        let labels = LabelTable::english();
        let encoder = ImageEncoder::new(&config, &PixmapSurfaceFactory);
        let splitter = PageSplitter::new(&encoder, &labels);
        let image = tall_receipt();
        let plan = split_plan(&config, &image);
        assert!(plan.start_on_new_page);

        let mut printer = PagePrinter::new(&config, None);
        let mut metrics = RenderMetrics::default();
        splitter
            .split(&mut printer, &image, &plan, ContrastProfile::photographic(), "#1", &mut metrics)
            .unwrap();
        let doc = printer.finish();
        assert_eq!(doc.image_placements()[0].0, 0);
        assert_eq!(doc.page_count(), plan.chunk_count());
    }
}
