use crate::config::ReportConfig;
use crate::raster::{PixelRect, RasterImage, SurfaceFactory};
use image::RgbaImage;

/// Whether an image reads as a document (sharp text on a flat background) or
/// as a photograph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastProfile {
    pub is_high_contrast: bool,
    pub std_dev: f32,
}

impl ContrastProfile {
    /// The safe default when classification cannot run.
    pub fn photographic() -> Self {
        Self {
            is_high_contrast: false,
            std_dev: 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        if self.is_high_contrast {
            "high_contrast"
        } else {
            "photographic"
        }
    }
}

pub struct ContrastClassifier<'a> {
    config: &'a ReportConfig,
    surfaces: &'a dyn SurfaceFactory,
}

impl<'a> ContrastClassifier<'a> {
    pub fn new(config: &'a ReportConfig, surfaces: &'a dyn SurfaceFactory) -> Self {
        Self { config, surfaces }
    }

    /// Samples a window of the image and thresholds the spread of its luminance.
    /// Never fails: any sampling problem yields [`ContrastProfile::photographic`].
    pub fn classify(&self, image: &RasterImage) -> ContrastProfile {
        let Some(window) = sample_window(self.config, image.width(), image.height()) else {
            return ContrastProfile::photographic();
        };
        let sample = match self
            .surfaces
            .render(image, window, window.width, window.height)
        {
            Ok(sample) => sample,
            Err(err) => {
                log::debug!("contrast sampling unavailable: {err}");
                return ContrastProfile::photographic();
            }
        };
        let Some(std_dev) = luminance_std_dev(&sample, self.config.contrast_sample_stride) else {
            return ContrastProfile::photographic();
        };
        ContrastProfile {
            is_high_contrast: std_dev > self.config.contrast_std_dev_threshold,
            std_dev,
        }
    }
}

/// Window starting 10% in from the left edge, capped at the configured sample
/// size and centred vertically.
pub fn sample_window(config: &ReportConfig, width: u32, height: u32) -> Option<PixelRect> {
    let x = width / 10;
    let sample_width = config.contrast_sample_max_width_px.min(width - x);
    let sample_height = config.contrast_sample_max_height_px.min(height);
    let y = (height - sample_height) / 2;
    let window = PixelRect::new(x, y, sample_width, sample_height);
    (!window.is_empty()).then_some(window)
}

/// Population standard deviation of Rec. 601 luma over every `stride`-th pixel
/// of the flattened sample. `None` when the sample is empty.
pub fn luminance_std_dev(sample: &RgbaImage, stride: usize) -> Option<f32> {
    let stride = stride.max(1);
    let mut count = 0u64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for px in sample.as_raw().chunks_exact(4).step_by(stride) {
        let luma = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
        count += 1;
        sum += luma;
        sum_sq += luma * luma;
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    Some(variance.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{NoSurfaceFactory, PixmapSurfaceFactory};
    use image::Rgba;

    fn striped_document(width: u32, height: u32) -> RasterImage {
        let img = RgbaImage::from_fn(width, height, |_, y| {
            if y % 8 < 2 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        RasterImage::from_pixels(img)
    }

    fn soft_gradient(width: u32, height: u32) -> RasterImage {
        let img = RgbaImage::from_fn(width, height, |x, _| {
            let v = 100 + (x * 60 / width) as u8;
            Rgba([v, v, v, 255])
        });
        RasterImage::from_pixels(img)
    }

    #[test]
    fn text_like_stripes_are_high_contrast() {
        let config = ReportConfig::default();
        let classifier = ContrastClassifier::new(&config, &PixmapSurfaceFactory);
        let profile = classifier.classify(&striped_document(500, 500));
        assert!(profile.is_high_contrast);
        assert!(profile.std_dev > 100.0);
    }

    #[test]
    fn smooth_gradients_are_photographic() {
        let config = ReportConfig::default();
        let classifier = ContrastClassifier::new(&config, &PixmapSurfaceFactory);
        let profile = classifier.classify(&soft_gradient(500, 500));
        assert!(!profile.is_high_contrast);
        assert!(profile.std_dev < 25.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let config = ReportConfig::default();
        let classifier = ContrastClassifier::new(&config, &PixmapSurfaceFactory);
        let image = striped_document(640, 480);
        assert_eq!(classifier.classify(&image), classifier.classify(&image));
    }

    #[test]
    fn sampling_failure_falls_back_to_photographic() {
        let config = ReportConfig::default();
        let classifier = ContrastClassifier::new(&config, &NoSurfaceFactory);
        let profile = classifier.classify(&striped_document(500, 500));
        assert_eq!(profile, ContrastProfile::photographic());
    }

    #[test]
    fn window_is_offset_capped_and_centred() {
        let config = ReportConfig::default();
        assert_eq!(
            sample_window(&config, 1000, 2000),
            Some(PixelRect::new(100, 800, 400, 400))
        );
        assert_eq!(
            sample_window(&config, 200, 100),
            Some(PixelRect::new(20, 0, 180, 100))
        );
        assert_eq!(sample_window(&config, 0, 10), None);
    }

    #[test]
    fn uniform_sample_has_zero_spread() {
        let flat = RgbaImage::from_pixel(20, 20, Rgba([90, 90, 90, 255]));
        let std_dev = luminance_std_dev(&flat, 10).unwrap();
        assert!(std_dev.abs() < 1e-3);
        assert_eq!(luminance_std_dev(&RgbaImage::new(0, 0), 10), None);
    }
}
