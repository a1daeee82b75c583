use crate::error::ReportError;

/// Every tunable threshold the layout engine consumes.
///
/// The values are immutable once an [`crate::ExpenseReport`] is built; tests
/// construct their own copies to vary thresholds per case.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub margin_mm: f32,

    /// Effective DPI above which an overflowing image is scaled down instead of split.
    pub dpi_scale_threshold: f32,
    /// Overflow (percent of target height) below which scaling beats splitting.
    pub min_split_overflow_percent: f32,
    pub split_overlap_mm: f32,
    /// Images narrower than this share of the printable width are scaled, never split.
    pub narrow_image_width_percent: f32,
    /// A portrait image is only constrained to the page height while its constrained
    /// width stays at or above this share of the printable width. Thinner strips keep
    /// full width and go through fit/split planning.
    pub min_constrained_width_percent: f32,
    /// Smallest image block worth starting on the current page.
    pub min_image_block_mm: f32,

    pub max_image_width_px: u32,
    pub optimal_image_width_px: u32,

    pub photo_quality: u8,
    pub photo_split_quality: u8,
    pub high_contrast_split_quality: u8,

    pub contrast_std_dev_threshold: f32,
    pub contrast_sample_max_width_px: u32,
    pub contrast_sample_max_height_px: u32,
    pub contrast_sample_stride: usize,

    pub driving_cost_per_km: f64,
    pub currency_suffix: String,

    pub title_font_size: f32,
    pub heading_font_size: f32,
    pub body_font_size: f32,
    pub label_font_size: f32,
    pub continuation_font_size: f32,
    pub line_height_mm: f32,
    pub continuation_label_mm: f32,

    /// Scale applied to embedded PDF pages when rasterizing them (1.0 = 72 DPI).
    pub pdf_page_raster_scale: f32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_mm: 15.0,
            dpi_scale_threshold: 150.0,
            min_split_overflow_percent: 15.0,
            split_overlap_mm: 10.0,
            narrow_image_width_percent: 50.0,
            min_constrained_width_percent: 35.0,
            min_image_block_mm: 25.0,
            max_image_width_px: 2400,
            optimal_image_width_px: 1600,
            photo_quality: 75,
            photo_split_quality: 85,
            high_contrast_split_quality: 92,
            contrast_std_dev_threshold: 50.0,
            contrast_sample_max_width_px: 400,
            contrast_sample_max_height_px: 400,
            contrast_sample_stride: 10,
            driving_cost_per_km: 2.5,
            currency_suffix: "kr".to_string(),
            title_font_size: 22.0,
            heading_font_size: 18.0,
            body_font_size: 10.0,
            label_font_size: 11.0,
            continuation_font_size: 9.0,
            line_height_mm: 5.0,
            continuation_label_mm: 6.0,
            pdf_page_raster_scale: 2.0,
        }
    }
}

impl ReportConfig {
    pub fn usable_width_mm(&self) -> f32 {
        self.page_width_mm - 2.0 * self.margin_mm
    }

    pub fn usable_height_mm(&self) -> f32 {
        self.page_height_mm - 2.0 * self.margin_mm
    }

    /// Tallest image band a split chunk may occupy on a fresh page, leaving room for
    /// both continuation labels.
    pub fn max_chunk_height_mm(&self) -> f32 {
        self.usable_height_mm() - 2.0 * self.continuation_label_mm
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        let positive = [
            ("page_width_mm", self.page_width_mm),
            ("page_height_mm", self.page_height_mm),
            ("dpi_scale_threshold", self.dpi_scale_threshold),
            ("contrast_std_dev_threshold", self.contrast_std_dev_threshold),
            ("title_font_size", self.title_font_size),
            ("heading_font_size", self.heading_font_size),
            ("body_font_size", self.body_font_size),
            ("label_font_size", self.label_font_size),
            ("continuation_font_size", self.continuation_font_size),
            ("line_height_mm", self.line_height_mm),
            ("continuation_label_mm", self.continuation_label_mm),
            ("pdf_page_raster_scale", self.pdf_page_raster_scale),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{name} must be a positive number, got {value}")));
            }
        }

        let non_negative = [
            ("margin_mm", self.margin_mm),
            ("split_overlap_mm", self.split_overlap_mm),
            ("min_image_block_mm", self.min_image_block_mm),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must not be negative, got {value}")));
            }
        }

        let percents = [
            ("min_split_overflow_percent", self.min_split_overflow_percent),
            ("narrow_image_width_percent", self.narrow_image_width_percent),
            (
                "min_constrained_width_percent",
                self.min_constrained_width_percent,
            ),
        ];
        for (name, value) in percents {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!("{name} must be within 0..=100, got {value}")));
            }
        }

        let qualities = [
            ("photo_quality", self.photo_quality),
            ("photo_split_quality", self.photo_split_quality),
            ("high_contrast_split_quality", self.high_contrast_split_quality),
        ];
        for (name, value) in qualities {
            if !(1..=100).contains(&value) {
                return Err(invalid(format!("{name} must be within 1..=100, got {value}")));
            }
        }

        if self.optimal_image_width_px == 0 || self.max_image_width_px == 0 {
            return Err(invalid("resampling widths must be non-zero".to_string()));
        }
        if self.optimal_image_width_px > self.max_image_width_px {
            return Err(invalid(format!(
                "optimal_image_width_px ({}) exceeds max_image_width_px ({})",
                self.optimal_image_width_px, self.max_image_width_px
            )));
        }
        if self.contrast_sample_max_width_px == 0
            || self.contrast_sample_max_height_px == 0
            || self.contrast_sample_stride == 0
        {
            return Err(invalid("contrast sample window must be non-empty".to_string()));
        }
        if !self.driving_cost_per_km.is_finite() || self.driving_cost_per_km < 0.0 {
            return Err(invalid(format!(
                "driving_cost_per_km must not be negative, got {}",
                self.driving_cost_per_km
            )));
        }
        if self.usable_width_mm() <= 0.0 || self.usable_height_mm() <= 0.0 {
            return Err(invalid(format!(
                "margin {}mm leaves no printable area on a {}x{}mm page",
                self.margin_mm, self.page_width_mm, self.page_height_mm
            )));
        }
        if self.max_chunk_height_mm() <= self.split_overlap_mm {
            return Err(invalid(format!(
                "split overlap {}mm must be smaller than the chunk height {}mm",
                self.split_overlap_mm,
                self.max_chunk_height_mm()
            )));
        }
        if self.min_image_block_mm >= self.usable_height_mm() {
            return Err(invalid(format!(
                "min_image_block_mm {} must be below the printable height {}",
                self.min_image_block_mm,
                self.usable_height_mm()
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ReportError {
    ReportError::InvalidConfiguration(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ReportConfig::default().validate().unwrap();
    }

    #[test]
    fn a4_defaults_leave_180mm_printable_width() {
        let config = ReportConfig::default();
        assert!((config.usable_width_mm() - 180.0).abs() < f32::EPSILON);
        assert!((config.usable_height_mm() - 267.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_quality_out_of_range() {
        let config = ReportConfig {
            photo_split_quality: 0,
            ..ReportConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("photo_split_quality"));
    }

    #[test]
    fn rejects_overlap_larger_than_a_chunk() {
        let config = ReportConfig {
            split_overlap_mm: 400.0,
            ..ReportConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ReportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_nan_threshold() {
        let config = ReportConfig {
            dpi_scale_threshold: f32::NAN,
            ..ReportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_resample_widths() {
        let config = ReportConfig {
            optimal_image_width_px: 4000,
            ..ReportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
