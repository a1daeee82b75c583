use crate::error::ReportError;
use crate::record::Attachment;
use image::RgbaImage;
use std::sync::Arc;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

/// A decoded receipt held in memory for exactly one record's placement.
///
/// The source bytes travel with the pixels so the encoder can fall back to
/// embedding them untouched when no drawing surface is available.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: RgbaImage,
    mime: Option<String>,
    source: Arc<[u8]>,
}

impl RasterImage {
    pub fn decode(attachment: &Attachment) -> Result<Self, ReportError> {
        let pixels = decode_rgba(&attachment.data, attachment.mime.as_deref())?;
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(ReportError::Decode("image has no pixels".to_string()));
        }
        Ok(Self {
            pixels,
            mime: attachment.mime.clone(),
            source: attachment.data.clone(),
        })
    }

    /// Wraps already-decoded pixels. Used for rasterized document pages, which have
    /// no encoded source of their own.
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            mime: None,
            source: Arc::from(Vec::<u8>::new()),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn is_jpeg_source(&self) -> bool {
        let declared = self
            .mime
            .as_deref()
            .map(|m| m.contains("jpeg") || m.contains("jpg"))
            .unwrap_or(false);
        declared || self.source.starts_with(&[0xFF, 0xD8, 0xFF])
    }

    pub fn full_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width(), self.height())
    }

    /// Pixels flattened onto white, the way they appear on a paper page.
    pub fn flattened_rgb(&self) -> image::RgbImage {
        flatten_onto_white(&self.pixels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamps the rectangle to an image of the given size.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelRect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        PixelRect::new(
            x,
            y,
            self.width.min(width - x),
            self.height.min(height - y),
        )
    }
}

/// Off-screen drawing surfaces. Every pixel operation that crops or resamples
/// goes through one, so hosts without a surface degrade to passthrough embedding.
pub trait SurfaceFactory: Send + Sync {
    /// Draws `src` of `image` scaled to `width` x `height` onto an opaque white
    /// surface and reads the result back.
    fn render(
        &self,
        image: &RasterImage,
        src: PixelRect,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, ReportError>;
}

/// Surfaces backed by tiny-skia pixmaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixmapSurfaceFactory;

impl SurfaceFactory for PixmapSurfaceFactory {
    fn render(
        &self,
        image: &RasterImage,
        src: PixelRect,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, ReportError> {
        let src = src.clamp_to(image.width(), image.height());
        if src.is_empty() {
            return Err(ReportError::Encode("empty source region".to_string()));
        }
        let mut region = image::imageops::crop_imm(
            image.pixels(),
            src.x,
            src.y,
            src.width,
            src.height,
        )
        .to_image();
        // Bicubic sampling aliases on strong reductions; pre-shrink with a box filter.
        if region.width() > width.saturating_mul(2) && region.height() > height.saturating_mul(2) {
            region = image::imageops::thumbnail(
                &region,
                width.saturating_mul(2),
                height.saturating_mul(2),
            );
        }
        let source = rgba_to_pixmap(&region).ok_or(ReportError::SurfaceUnavailable)?;
        let mut target = Pixmap::new(width, height).ok_or(ReportError::SurfaceUnavailable)?;
        target.fill(tiny_skia::Color::WHITE);

        let sx = width as f32 / source.width() as f32;
        let sy = height as f32 / source.height() as f32;
        let mut paint = PixmapPaint::default();
        paint.quality = if source.width() == width && source.height() == height {
            FilterQuality::Nearest
        } else {
            FilterQuality::Bicubic
        };
        target.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );
        pixmap_to_rgba(&target)
    }
}

/// A host without drawing surfaces. Every render request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSurfaceFactory;

impl SurfaceFactory for NoSurfaceFactory {
    fn render(
        &self,
        _image: &RasterImage,
        _src: PixelRect,
        _width: u32,
        _height: u32,
    ) -> Result<RgbaImage, ReportError> {
        Err(ReportError::SurfaceUnavailable)
    }
}

fn decode_rgba(
    data: &[u8],
    mime: Option<&str>,
) -> Result<RgbaImage, ReportError> {
    let declared = mime.and_then(|mime| {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    });
    let format = match declared {
        Some(fmt) => fmt,
        None => image::guess_format(data)?,
    };
    // A wrong declared type is common for camera uploads; retry with sniffing.
    let decoded = match image::load_from_memory_with_format(data, format) {
        Ok(img) => img,
        Err(first) => match image::guess_format(data) {
            Ok(sniffed) if sniffed != format => image::load_from_memory_with_format(data, sniffed)?,
            _ => return Err(first.into()),
        },
    };
    Ok(decoded.to_rgba8())
}

pub(crate) fn rgba_to_pixmap(rgba: &RgbaImage) -> Option<Pixmap> {
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src_px, dst_px) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

/// Reads back an opaque pixmap. Premultiplied and straight alpha agree when alpha is 255.
pub(crate) fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<RgbaImage, ReportError> {
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec())
        .ok_or(ReportError::SurfaceUnavailable)
}

pub(crate) fn flatten_onto_white(rgba: &RgbaImage) -> image::RgbImage {
    let (width, height) = rgba.dimensions();
    let mut out = image::RgbImage::new(width, height);
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let a = src[3] as u16;
        for c in 0..3 {
            let blended = (src[c] as u16 * a + 255 * (255 - a) + 127) / 255;
            dst[c] = blended as u8;
        }
    }
    out
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}
