use crate::config::ReportConfig;
use crate::contrast::ContrastProfile;
use crate::error::ReportError;
use crate::raster::{PixelRect, RasterImage, SurfaceFactory, flatten_onto_white};
use image::RgbImage;
use sha2::{Digest, Sha256};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Zlib-compressed raw samples (`/FlateDecode`).
    Flate,
    /// Baseline JPEG (`/DCTDecode`).
    Dct,
}

/// Pixels ready to be written as a PDF image XObject.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// One sample per pixel instead of three.
    pub gray: bool,
    pub data: Vec<u8>,
}

impl EncodedImage {
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.format as u8, self.gray as u8]);
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    pub fn format_name(&self) -> &'static str {
        match self.format {
            ImageFormat::Flate => "flate",
            ImageFormat::Dct => "jpeg",
        }
    }

    pub fn filter(&self) -> &'static str {
        match self.format {
            ImageFormat::Flate => "/FlateDecode",
            ImageFormat::Dct => "/DCTDecode",
        }
    }

    pub fn color_space(&self) -> &'static str {
        if self.gray { "/DeviceGray" } else { "/DeviceRGB" }
    }

    pub fn is_lossless(&self) -> bool {
        self.format == ImageFormat::Flate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Lossless,
    Lossy { quality: u8 },
}

/// Picks the encoding for a whole image or one split band.
pub fn encoding_for(config: &ReportConfig, profile: ContrastProfile, is_band: bool) -> Encoding {
    match (profile.is_high_contrast, is_band) {
        (true, false) => Encoding::Lossless,
        (true, true) => Encoding::Lossy {
            quality: config.high_contrast_split_quality,
        },
        (false, false) => Encoding::Lossy {
            quality: config.photo_quality,
        },
        (false, true) => Encoding::Lossy {
            quality: config.photo_split_quality,
        },
    }
}

/// Width photographic content is resampled to: small images are brought up to
/// the optimal width, oversized ones down to the maximum.
pub fn normalized_width(config: &ReportConfig, width: u32) -> u32 {
    if width < config.optimal_image_width_px {
        config.optimal_image_width_px
    } else if width > config.max_image_width_px {
        config.max_image_width_px
    } else {
        width
    }
}

fn scaled_height(height: u32, from_width: u32, to_width: u32) -> u32 {
    let scaled = height as f64 * to_width as f64 / from_width.max(1) as f64;
    (scaled.round() as u32).max(1)
}

pub struct ImageEncoder<'a> {
    config: &'a ReportConfig,
    surfaces: &'a dyn SurfaceFactory,
}

impl<'a> ImageEncoder<'a> {
    pub fn new(config: &'a ReportConfig, surfaces: &'a dyn SurfaceFactory) -> Self {
        Self { config, surfaces }
    }

    /// Encodes an image placed as a single block.
    ///
    /// High-contrast images keep their original resolution and are stored
    /// losslessly. Photographs are resampled to the normalized width on a drawing
    /// surface and stored as JPEG; without a surface this fails with
    /// [`ReportError::SurfaceUnavailable`] and callers fall back to [`passthrough`].
    pub fn encode_whole(
        &self,
        image: &RasterImage,
        profile: ContrastProfile,
    ) -> Result<EncodedImage, ReportError> {
        let encoding = encoding_for(self.config, profile, false);
        if profile.is_high_contrast {
            return encode_rgb(&image.flattened_rgb(), encoding);
        }
        let width = normalized_width(self.config, image.width());
        let height = scaled_height(image.height(), image.width(), width);
        let rendered = self
            .surfaces
            .render(image, image.full_rect(), width, height)?;
        encode_rgb(&flatten_onto_white(&rendered), encoding)
    }

    /// Encodes one horizontal band of a split image. High-contrast bands keep
    /// their native resolution; photographic bands are normalized like whole images.
    pub fn encode_band(
        &self,
        image: &RasterImage,
        band: PixelRect,
        profile: ContrastProfile,
    ) -> Result<EncodedImage, ReportError> {
        let band = band.clamp_to(image.width(), image.height());
        if band.is_empty() {
            return Err(ReportError::Encode("empty image band".to_string()));
        }
        let encoding = encoding_for(self.config, profile, true);
        let (width, height) = if profile.is_high_contrast {
            (band.width, band.height)
        } else {
            let width = normalized_width(self.config, band.width);
            (width, scaled_height(band.height, band.width, width))
        };
        let rendered = self.surfaces.render(image, band, width, height)?;
        encode_rgb(&flatten_onto_white(&rendered), encoding)
    }
}

/// Embeds an image without a drawing surface: gray and RGB JPEG sources are
/// copied byte for byte, anything else is stored losslessly from its decoded pixels.
pub fn passthrough(image: &RasterImage) -> Result<EncodedImage, ReportError> {
    if image.is_jpeg_source() {
        let components = jpeg_components(image.source_bytes());
        if matches!(components, Some(1) | Some(3)) {
            return Ok(EncodedImage {
                format: ImageFormat::Dct,
                width: image.width(),
                height: image.height(),
                gray: components == Some(1),
                data: image.source_bytes().to_vec(),
            });
        }
    }
    encode_rgb(&image.flattened_rgb(), Encoding::Lossless)
}

/// Component count from the first start-of-frame marker. CMYK (4) streams
/// cannot be declared with a device RGB color space.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        // SOF0..SOF15 minus DHT, JPG and DAC.
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return bytes.get(pos + 9).copied();
        }
        if marker == 0xDA {
            return None;
        }
        pos += 2 + len;
    }
    None
}

pub(crate) fn encode_rgb(rgb: &RgbImage, encoding: Encoding) -> Result<EncodedImage, ReportError> {
    let (width, height) = rgb.dimensions();
    let gray = is_grayscale(rgb);
    let samples: Vec<u8> = if gray {
        rgb.pixels().map(|p| p[0]).collect()
    } else {
        rgb.as_raw().clone()
    };
    match encoding {
        Encoding::Lossless => Ok(EncodedImage {
            format: ImageFormat::Flate,
            width,
            height,
            gray,
            data: flate_compress(&samples)?,
        }),
        Encoding::Lossy { quality } => {
            let color = if gray {
                image::ExtendedColorType::L8
            } else {
                image::ExtendedColorType::Rgb8
            };
            let mut buf = Vec::new();
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
            encoder
                .encode(&samples, width, height, color)
                .map_err(|e| ReportError::Encode(format!("jpeg: {e}")))?;
            Ok(EncodedImage {
                format: ImageFormat::Dct,
                width,
                height,
                gray,
                data: buf,
            })
        }
    }
}

fn is_grayscale(rgb: &RgbImage) -> bool {
    rgb.pixels().all(|p| p[0] == p[1] && p[1] == p[2])
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, ReportError> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ReportError::Encode(format!("flate: {e}")))?;
    encoder
        .finish()
        .map_err(|e| ReportError::Encode(format!("flate: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{NoSurfaceFactory, PixmapSurfaceFactory};
    use crate::record::Attachment;
    use flate2::read::ZlibDecoder;
    use image::{Rgba, RgbaImage};
    use std::io::Read;

    fn high_contrast() -> ContrastProfile {
        ContrastProfile {
            is_high_contrast: true,
            std_dev: 110.0,
        }
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    fn palette_image() -> RasterImage {
        let palette = [
            Rgba([0, 0, 0, 255]),
            Rgba([255, 255, 255, 255]),
            Rgba([200, 30, 30, 255]),
            Rgba([20, 40, 220, 255]),
        ];
        let img = RgbaImage::from_fn(37, 23, |x, y| palette[((x / 3 + y) % 4) as usize]);
        RasterImage::from_pixels(img)
    }

    #[test]
    fn encoding_table_matches_content_and_split() {
        let config = ReportConfig::default();
        let photo = ContrastProfile::photographic();
        assert_eq!(encoding_for(&config, high_contrast(), false), Encoding::Lossless);
        assert_eq!(
            encoding_for(&config, high_contrast(), true),
            Encoding::Lossy { quality: 92 }
        );
        assert_eq!(encoding_for(&config, photo, false), Encoding::Lossy { quality: 75 });
        assert_eq!(encoding_for(&config, photo, true), Encoding::Lossy { quality: 85 });
    }

    #[test]
    fn normalization_clamps_width_into_range() {
        let config = ReportConfig::default();
        assert_eq!(normalized_width(&config, 800), 1600);
        assert_eq!(normalized_width(&config, 2000), 2000);
        assert_eq!(normalized_width(&config, 4000), 2400);
    }

    #[test]
    fn lossless_whole_image_preserves_every_pixel() {
        let config = ReportConfig::default();
        let encoder = ImageEncoder::new(&config, &NoSurfaceFactory);
        let image = palette_image();
        let encoded = encoder.encode_whole(&image, high_contrast()).unwrap();
        assert_eq!(encoded.format, ImageFormat::Flate);
        assert_eq!((encoded.width, encoded.height), (37, 23));
        assert!(!encoded.gray);
        assert_eq!(inflate(&encoded.data), image.flattened_rgb().into_raw());
    }

    #[test]
    fn grayscale_content_is_stored_with_one_channel() {
        let img = RgbaImage::from_fn(8, 8, |x, _| {
            let v = (x * 30) as u8;
            Rgba([v, v, v, 255])
        });
        let encoded = encode_rgb(&flatten_onto_white(&img), Encoding::Lossless).unwrap();
        assert!(encoded.gray);
        assert_eq!(encoded.color_space(), "/DeviceGray");
        assert_eq!(inflate(&encoded.data).len(), 64);
    }

    #[test]
    fn photographs_are_resampled_to_optimal_width_as_jpeg() {
        let config = ReportConfig::default();
        let encoder = ImageEncoder::new(&config, &PixmapSurfaceFactory);
        let img = RgbaImage::from_fn(400, 300, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]));
        let encoded = encoder
            .encode_whole(&RasterImage::from_pixels(img), ContrastProfile::photographic())
            .unwrap();
        assert_eq!(encoded.format, ImageFormat::Dct);
        assert_eq!((encoded.width, encoded.height), (1600, 1200));
        assert!(encoded.data.starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn lossy_encoding_is_deterministic() {
        let config = ReportConfig::default();
        let encoder = ImageEncoder::new(&config, &PixmapSurfaceFactory);
        let image = palette_image();
        let band = PixelRect::new(0, 5, 37, 10);
        let a = encoder.encode_band(&image, band, high_contrast()).unwrap();
        let b = encoder.encode_band(&image, band, high_contrast()).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!((a.width, a.height), (37, 10));
    }

    #[test]
    fn missing_surface_is_reported_for_photographs() {
        let config = ReportConfig::default();
        let encoder = ImageEncoder::new(&config, &NoSurfaceFactory);
        let result = encoder.encode_whole(&palette_image(), ContrastProfile::photographic());
        assert!(matches!(result, Err(ReportError::SurfaceUnavailable)));
    }

    #[test]
    fn passthrough_copies_jpeg_sources_verbatim() {
        let rgb = RgbImage::from_pixel(6, 4, image::Rgb([120, 60, 30]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 80)
            .encode(rgb.as_raw(), 6, 4, image::ExtendedColorType::Rgb8)
            .unwrap();
        let attachment = Attachment::new(jpeg.clone(), Some("image/jpeg".to_string()));
        let image = RasterImage::decode(&attachment).unwrap();
        let encoded = passthrough(&image).unwrap();
        assert_eq!(encoded.format, ImageFormat::Dct);
        assert_eq!(encoded.data, jpeg);
        assert_eq!((encoded.width, encoded.height), (6, 4));

        let flate = passthrough(&palette_image()).unwrap();
        assert_eq!(flate.format, ImageFormat::Flate);
    }

    #[test]
    fn jpeg_component_count_is_read_from_the_frame_header() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([90]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode(gray.as_raw(), 4, 4, image::ExtendedColorType::L8)
            .unwrap();
        assert_eq!(jpeg_components(&jpeg), Some(1));
        assert_eq!(jpeg_components(b"not a jpeg"), None);
    }
}
