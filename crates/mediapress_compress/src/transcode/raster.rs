//! Still-image compression with the `image` crate.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageError, ImageFormat, ImageReader, Rgb, RgbImage};
use mediapress_config::CompressionConfig;

use super::{CompressedOutput, Transcoder};
use crate::error::CompressionError;

/// Re-encodes images in their own format.
///
/// Steps, in order: decode, apply the EXIF orientation, flatten transparency
/// onto white when the target is JPEG, downscale to the configured bounds with
/// Lanczos3, then encode with the format's size-oriented settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTranscoder;

impl Transcoder for ImageTranscoder {
    fn compress(
        &self,
        source: &Path,
        config: &CompressionConfig,
    ) -> Result<CompressedOutput, CompressionError> {
        let format = ImageFormat::from_path(source).map_err(|_| {
            CompressionError::UnsupportedFormat {
                path: source.to_path_buf(),
            }
        })?;

        let img = decode_oriented(source)?;
        let img = fit_within(img, config.image_max_width, config.image_max_height);
        encode(&img, format, config.image_quality)
            .map(CompressedOutput::Bytes)
            .map_err(|e| CompressionError::Encode {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

fn decode_oriented(source: &Path) -> Result<DynamicImage, CompressionError> {
    let decode_err = |e: ImageError| CompressionError::Decode {
        path: source.to_path_buf(),
        reason: e.to_string(),
    };

    let reader = ImageReader::open(source)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| CompressionError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Downscales `img` to fit the given bounds, preserving aspect ratio.
///
/// Never upscales. Either bound may be absent.
pub(crate) fn fit_within(
    img: DynamicImage,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> DynamicImage {
    match scaled_dimensions(img.width(), img.height(), max_width, max_height) {
        Some((w, h)) => img.resize_exact(w, h, FilterType::Lanczos3),
        None => img,
    }
}

/// Target dimensions for a downscale, or `None` when the image already fits.
pub(crate) fn scaled_dimensions(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Option<(u32, u32)> {
    let mut scale = 1.0_f64;
    if let Some(mw) = max_width {
        if width > mw {
            scale = scale.min(f64::from(mw) / f64::from(width));
        }
    }
    if let Some(mh) = max_height {
        if height > mh {
            scale = scale.min(f64::from(mh) / f64::from(height));
        }
    }
    if scale >= 1.0 {
        return None;
    }
    let w = ((f64::from(width) * scale) as u32).max(1);
    let h = ((f64::from(height) * scale) as u32).max(1);
    Some((w, h))
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(flatten_onto_white(img));
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
        }
        ImageFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            let pixels = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            pixels.write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
        }
        ImageFormat::Gif => {
            let mut cursor = Cursor::new(&mut buf);
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut cursor, format)?;
        }
        other => {
            let pixels = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            let mut cursor = Cursor::new(&mut buf);
            pixels.write_to(&mut cursor, other)?;
        }
    }
    Ok(buf)
}

/// Composites any alpha channel over a white background.
pub(crate) fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let c = u32::from(c);
            let a = u32::from(a);
            ((c * a + 255 * (255 - a) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn scaled_dimensions_preserve_aspect() {
        assert_eq!(scaled_dimensions(2000, 1000, Some(1000), None), Some((1000, 500)));
        assert_eq!(scaled_dimensions(1000, 2000, None, Some(1000)), Some((500, 1000)));
        assert_eq!(
            scaled_dimensions(4000, 1000, Some(2000), Some(250)),
            Some((1000, 250))
        );
    }

    #[test]
    fn scaled_dimensions_never_upscale() {
        assert_eq!(scaled_dimensions(800, 600, Some(1920), Some(1080)), None);
        assert_eq!(scaled_dimensions(800, 600, None, None), None);
        assert_eq!(scaled_dimensions(800, 600, Some(800), Some(600)), None);
    }

    #[test]
    fn scaled_dimensions_floor_at_one_pixel() {
        assert_eq!(scaled_dimensions(10_000, 1, Some(10), None), Some((10, 1)));
    }

    #[test]
    fn flatten_blends_transparent_pixels_to_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    fn compress_bytes(path: &Path, config: &CompressionConfig) -> Vec<u8> {
        ImageTranscoder
            .compress(path, config)
            .unwrap()
            .into_bytes()
            .unwrap()
    }

    #[test]
    fn compresses_png_and_respects_max_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        gradient(64, 32).save(&path).unwrap();

        let config = CompressionConfig {
            image_max_width: Some(16),
            ..CompressionConfig::default()
        };
        let out = compress_bytes(&path, &config);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn jpeg_output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        gradient(40, 40).save(&path).unwrap();

        let config = CompressionConfig::default();
        let first = compress_bytes(&path, &config);
        let second = compress_bytes(&path, &config);
        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert_eq!(
            image::guess_format(&first).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn output_format_follows_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("logo.png");
        gradient(24, 24).save(&png).unwrap();
        let renamed = dir.path().join("logo.jpg");
        std::fs::copy(&png, &renamed).unwrap();

        let config = CompressionConfig::default();
        let from_png = compress_bytes(&png, &config);
        let from_jpg = compress_bytes(&renamed, &config);
        assert_eq!(image::guess_format(&from_png).unwrap(), ImageFormat::Png);
        assert_eq!(image::guess_format(&from_jpg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn undecodable_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = ImageTranscoder
            .compress(&path, &CompressionConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompressionError::Decode { .. }));
    }

    #[test]
    fn empty_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();
        assert!(ImageTranscoder
            .compress(&path, &CompressionConfig::default())
            .is_err());
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        let err = ImageTranscoder
            .compress(&path, &CompressionConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompressionError::UnsupportedFormat { .. }));
    }
}
