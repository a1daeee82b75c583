use crate::config::ReportConfig;
use crate::types::MM_PER_INCH;

const EPSILON_MM: f32 = 0.01;

/// How an image block is placed relative to the space left on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementDecision {
    /// Natural size fits below the cursor.
    Fit,
    /// Too narrow to be worth splitting; shrunk to the space left.
    ScaleNarrow,
    /// Overflow is small; shrunk to the space left.
    ScaleMinorOverflow,
    /// Enough resolution to stay legible when shrunk to the space left.
    ScaleHighDpi,
    /// Cut into overlapping bands, one per page.
    Split,
}

impl PlacementDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementDecision::Fit => "fit",
            PlacementDecision::ScaleNarrow => "scale_narrow",
            PlacementDecision::ScaleMinorOverflow => "scale_minor_overflow",
            PlacementDecision::ScaleHighDpi => "scale_high_dpi",
            PlacementDecision::Split => "split",
        }
    }
}

/// One band of a placement: a row range of the source image and the height it
/// occupies on its page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub index: usize,
    pub src_y: u32,
    pub src_height: u32,
    pub display_height_mm: f32,
}

impl ChunkPlan {
    pub fn src_end(&self) -> u32 {
        self.src_y + self.src_height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayoutPlan {
    pub decision: PlacementDecision,
    pub natural_width_px: u32,
    pub natural_height_px: u32,
    /// Size the image would take with no page bottom in the way.
    pub target_width_mm: f32,
    pub target_height_mm: f32,
    /// Placed width. Equal to the target width unless the block was scaled.
    pub width_mm: f32,
    /// Placed height of a single block, or the full target height when split.
    pub height_mm: f32,
    pub effective_dpi: f32,
    /// Share of the target height that does not fit below the cursor.
    pub overflow_fraction: f32,
    /// Source rows repeated between consecutive bands.
    pub overlap_px: u32,
    /// The first band is too short to be useful on the current page.
    pub start_on_new_page: bool,
    /// Always at least one entry. Single-block placements cover the whole image.
    pub chunks: Vec<ChunkPlan>,
}

impl PageLayoutPlan {
    pub fn is_split(&self) -> bool {
        self.decision == PlacementDecision::Split
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Decides how an image block of a given pixel size lands on the page.
pub struct GeometryPlanner<'a> {
    config: &'a ReportConfig,
}

impl<'a> GeometryPlanner<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self { config }
    }

    /// Display size for an image before the page bottom is considered.
    ///
    /// Landscape and square images span the printable width. Portrait images are
    /// held to the printable height unless that would squeeze them into a strip
    /// thinner than `min_constrained_width_percent`; such strips keep full width
    /// and are left to the fit/split rules.
    pub fn natural_target(
        &self,
        width_px: u32,
        height_px: u32,
        available_width_mm: f32,
        available_height_mm: f32,
    ) -> (f32, f32) {
        let ratio = width_px.max(1) as f32 / height_px.max(1) as f32;
        let full_width_height = available_width_mm / ratio;
        if ratio >= 1.0 || full_width_height <= available_height_mm {
            return (available_width_mm, full_width_height);
        }
        let constrained_width = available_height_mm * ratio;
        let min_width = available_width_mm * self.config.min_constrained_width_percent / 100.0;
        if constrained_width >= min_width {
            (constrained_width, available_height_mm)
        } else {
            (available_width_mm, full_width_height)
        }
    }

    /// Plans an image at `cursor_y_mm` (absolute, from the page top) inside a
    /// printable area of `available_width_mm` x `available_height_mm` that starts
    /// at the top margin.
    pub fn plan(
        &self,
        width_px: u32,
        height_px: u32,
        available_width_mm: f32,
        available_height_mm: f32,
        cursor_y_mm: f32,
    ) -> PageLayoutPlan {
        self.plan_inner(
            width_px,
            height_px,
            available_width_mm,
            available_height_mm,
            cursor_y_mm,
            true,
        )
    }

    /// Like [`GeometryPlanner::plan`], but a split always starts its first band
    /// at the cursor. Used when the cursor already sits at the top of a page and
    /// breaking would only orphan what is above it.
    pub fn plan_without_page_break(
        &self,
        width_px: u32,
        height_px: u32,
        available_width_mm: f32,
        available_height_mm: f32,
        cursor_y_mm: f32,
    ) -> PageLayoutPlan {
        self.plan_inner(
            width_px,
            height_px,
            available_width_mm,
            available_height_mm,
            cursor_y_mm,
            false,
        )
    }

    fn plan_inner(
        &self,
        width_px: u32,
        height_px: u32,
        available_width_mm: f32,
        available_height_mm: f32,
        cursor_y_mm: f32,
        allow_page_break: bool,
    ) -> PageLayoutPlan {
        let width_px = width_px.max(1);
        let height_px = height_px.max(1);
        let (target_w, target_h) =
            self.natural_target(width_px, height_px, available_width_mm, available_height_mm);
        let area_bottom = self.config.margin_mm + available_height_mm;
        let remaining = (area_bottom - cursor_y_mm).max(0.0);
        let dpi = effective_dpi(width_px, height_px, target_w, target_h);

        let mut plan = PageLayoutPlan {
            decision: PlacementDecision::Fit,
            natural_width_px: width_px,
            natural_height_px: height_px,
            target_width_mm: target_w,
            target_height_mm: target_h,
            width_mm: target_w,
            height_mm: target_h,
            effective_dpi: dpi,
            overflow_fraction: 0.0,
            overlap_px: 0,
            start_on_new_page: false,
            chunks: Vec::new(),
        };

        if target_h <= remaining + EPSILON_MM {
            plan.chunks.push(whole_image_chunk(height_px, target_h));
            return plan;
        }

        plan.overflow_fraction = (target_h - remaining) / target_h;
        let narrow_limit = available_width_mm * self.config.narrow_image_width_percent / 100.0;
        let decision = if target_w < narrow_limit {
            PlacementDecision::ScaleNarrow
        } else if plan.overflow_fraction * 100.0 < self.config.min_split_overflow_percent {
            PlacementDecision::ScaleMinorOverflow
        } else if dpi > self.config.dpi_scale_threshold {
            PlacementDecision::ScaleHighDpi
        } else {
            PlacementDecision::Split
        };
        plan.decision = decision;

        if decision != PlacementDecision::Split {
            let scale = remaining / target_h;
            plan.width_mm = target_w * scale;
            plan.height_mm = remaining;
            plan.chunks.push(whole_image_chunk(height_px, remaining));
            return plan;
        }

        self.cut_bands(&mut plan, remaining, available_height_mm, allow_page_break);
        plan
    }

    fn cut_bands(
        &self,
        plan: &mut PageLayoutPlan,
        remaining_mm: f32,
        available_height_mm: f32,
        allow_page_break: bool,
    ) {
        let label = self.config.continuation_label_mm;
        let overlap = self.config.split_overlap_mm;
        let band_max = (available_height_mm - 2.0 * label).max(overlap + 1.0);
        let target_h = plan.target_height_mm;
        let px_per_mm = plan.natural_height_px as f32 / target_h;

        // The first band only carries the "continued on next page" label.
        let mut first_cap = (remaining_mm - label).min(available_height_mm - label);
        if first_cap < self.config.min_image_block_mm.max(overlap * 2.0) {
            if allow_page_break {
                plan.start_on_new_page = true;
                first_cap = available_height_mm - label;
            } else {
                first_cap = first_cap.max(overlap + 1.0);
            }
        }

        let mut bounds = Vec::new();
        let mut start = 0.0f32;
        let mut cap = first_cap;
        loop {
            let end = (start + cap).min(target_h);
            bounds.push((start, end));
            if end >= target_h - EPSILON_MM {
                break;
            }
            start = end - overlap;
            cap = band_max;
        }

        let last = bounds.len() - 1;
        let mut chunks = Vec::with_capacity(bounds.len());
        for (index, (start_mm, end_mm)) in bounds.into_iter().enumerate() {
            let src_y = if index == 0 {
                0
            } else {
                ((start_mm * px_per_mm).floor() as u32).min(plan.natural_height_px - 1)
            };
            let src_end = if index == last {
                plan.natural_height_px
            } else {
                ((end_mm * px_per_mm).ceil() as u32).clamp(src_y + 1, plan.natural_height_px)
            };
            let src_height = src_end - src_y;
            chunks.push(ChunkPlan {
                index,
                src_y,
                src_height,
                display_height_mm: src_height as f32 / px_per_mm,
            });
        }
        plan.overlap_px = (overlap * px_per_mm).round() as u32;
        plan.chunks = chunks;
    }
}

/// Average of horizontal and vertical pixels per inch at the given display size.
pub fn effective_dpi(width_px: u32, height_px: u32, width_mm: f32, height_mm: f32) -> f32 {
    if width_mm <= 0.0 || height_mm <= 0.0 {
        return 0.0;
    }
    let horizontal = width_px as f32 / (width_mm / MM_PER_INCH);
    let vertical = height_px as f32 / (height_mm / MM_PER_INCH);
    (horizontal + vertical) / 2.0
}

fn whole_image_chunk(height_px: u32, display_height_mm: f32) -> ChunkPlan {
    ChunkPlan {
        index: 0,
        src_y: 0,
        src_height: height_px,
        display_height_mm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner_config() -> ReportConfig {
        ReportConfig::default()
    }

    fn plan_at(config: &ReportConfig, w: u32, h: u32, cursor: f32) -> PageLayoutPlan {
        GeometryPlanner::new(config).plan(
            w,
            h,
            config.usable_width_mm(),
            config.usable_height_mm(),
            cursor,
        )
    }

    #[test]
    fn landscape_spans_printable_width() {
        let config = planner_config();
        let plan = plan_at(&config, 1800, 900, config.margin_mm);
        assert_eq!(plan.decision, PlacementDecision::Fit);
        assert!((plan.width_mm - 180.0).abs() < 1e-3);
        assert!((plan.height_mm - 90.0).abs() < 1e-3);
        assert_eq!(plan.chunk_count(), 1);
    }

    #[test]
    fn portrait_is_held_to_printable_height() {
        let config = planner_config();
        let plan = plan_at(&config, 1000, 2000, config.margin_mm);
        assert_eq!(plan.decision, PlacementDecision::Fit);
        assert!((plan.height_mm - 267.0).abs() < 1e-3);
        assert!((plan.width_mm - 133.5).abs() < 1e-3);
    }

    #[test]
    fn narrow_overflowing_image_is_scaled_not_split() {
        let config = planner_config();
        // Held to 267mm tall, 74mm wide: under half the printable width.
        let plan = plan_at(&config, 500, 1800, 150.0);
        assert_eq!(plan.decision, PlacementDecision::ScaleNarrow);
        assert!((plan.height_mm - 132.0).abs() < 1e-3);
        assert_eq!(plan.chunk_count(), 1);
    }

    #[test]
    fn small_overflow_is_scaled() {
        let config = planner_config();
        // 180 x 100mm block with 90mm left on the page: overflow 10%.
        let plan = plan_at(&config, 900, 500, 192.0);
        assert_eq!(plan.decision, PlacementDecision::ScaleMinorOverflow);
        assert!((plan.height_mm - 90.0).abs() < 1e-3);
    }

    #[test]
    fn dense_images_are_scaled_and_sparse_ones_split() {
        let config = planner_config();
        // 180 x 180mm at ~254 DPI.
        let dense = plan_at(&config, 1800, 1800, 200.0);
        assert_eq!(dense.decision, PlacementDecision::ScaleHighDpi);
        assert!(dense.effective_dpi > 150.0);

        // Same block at ~102 DPI.
        let sparse = plan_at(&config, 720, 720, 200.0);
        assert_eq!(sparse.decision, PlacementDecision::Split);
    }

    #[test]
    fn narrow_wins_over_minor_overflow_and_dpi() {
        let config = planner_config();
        // 74 x 267mm at ~618 DPI with 262mm left: narrow, minor overflow and
        // dense all hold at once.
        let plan = plan_at(&config, 1800, 6500, 20.0);
        assert!(plan.effective_dpi > config.dpi_scale_threshold);
        assert!(plan.overflow_fraction * 100.0 < config.min_split_overflow_percent);
        assert_eq!(plan.decision, PlacementDecision::ScaleNarrow);
    }

    #[test]
    fn minor_overflow_wins_over_dpi() {
        let config = planner_config();
        // 180 x 100mm at ~254 DPI with 90mm left.
        let plan = plan_at(&config, 1800, 1000, 192.0);
        assert!(plan.effective_dpi > config.dpi_scale_threshold);
        assert_eq!(plan.decision, PlacementDecision::ScaleMinorOverflow);
    }

    #[test]
    fn tall_strip_splits_into_at_least_three_bands() {
        let config = planner_config();
        // Too thin to hold to the page height: 180mm wide, 900mm tall at ~102 DPI.
        let plan = plan_at(&config, 720, 3600, config.margin_mm);
        assert_eq!(plan.decision, PlacementDecision::Split);
        assert!(plan.chunk_count() >= 3);
        assert!(!plan.start_on_new_page);
        let first_max = config.usable_height_mm() - config.continuation_label_mm + 0.5;
        assert!(plan.chunks[0].display_height_mm <= first_max);
        let max_band = config.max_chunk_height_mm() + 0.5;
        for chunk in &plan.chunks[1..] {
            assert!(chunk.display_height_mm <= max_band);
        }
    }

    #[test]
    fn bands_cover_every_source_row_with_overlap() {
        let config = planner_config();
        for &(w, h, cursor) in &[(720u32, 3600u32, 15.0f32), (700, 5000, 120.0), (650, 3001, 60.0)] {
            let plan = plan_at(&config, w, h, cursor);
            assert!(plan.is_split(), "{w}x{h} at {cursor}");
            assert_eq!(plan.chunks[0].src_y, 0);
            assert_eq!(plan.chunks.last().unwrap().src_end(), h);
            for pair in plan.chunks.windows(2) {
                assert!(pair[1].src_y < pair[0].src_end());
                assert!(pair[1].src_y > pair[0].src_y);
            }
        }
    }

    #[test]
    fn short_first_band_moves_to_a_new_page() {
        let config = planner_config();
        let plan = plan_at(&config, 720, 3600, 270.0);
        assert!(plan.is_split());
        assert!(plan.start_on_new_page);
        let first = &plan.chunks[0];
        assert!(first.display_height_mm > config.min_image_block_mm);
    }

    #[test]
    fn first_band_stays_at_the_cursor_when_breaking_is_not_allowed() {
        let config = ReportConfig {
            min_image_block_mm: 200.0,
            ..ReportConfig::default()
        };
        let planner = GeometryPlanner::new(&config);
        let cursor = 120.0;
        let breaking = plan_at(&config, 720, 3600, cursor);
        assert!(breaking.start_on_new_page);

        let here = planner.plan_without_page_break(
            720,
            3600,
            config.usable_width_mm(),
            config.usable_height_mm(),
            cursor,
        );
        assert!(here.is_split());
        assert!(!here.start_on_new_page);
        let room = config.margin_mm + config.usable_height_mm() - cursor;
        assert!(here.chunks[0].display_height_mm <= room - config.continuation_label_mm + 0.5);
        assert_eq!(here.chunks.last().unwrap().src_end(), 3600);
    }

    #[test]
    fn dpi_averages_both_axes() {
        let dpi = effective_dpi(254, 508, 25.4, 50.8);
        assert!((dpi - 254.0).abs() < 1e-3);
        assert_eq!(effective_dpi(10, 10, 0.0, 5.0), 0.0);
    }
}
