//! CPU-side frame composition: decode, orient, scale to fit and letterbox.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fast_image_resize as fir;
use image::{ImageReader, Rgba, RgbaImage};
use tracing::debug;

use crate::error::RenderError;

/// Where a scaled image lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest size that fits `canvas` while keeping the aspect ratio of
/// `image`, centered. Upscaling is allowed.
pub fn fit_within(image: (u32, u32), canvas: (u32, u32)) -> Placement {
    let (iw, ih) = (image.0.max(1), image.1.max(1));
    let (cw, ch) = (canvas.0.max(1), canvas.1.max(1));
    let scale = (f64::from(cw) / f64::from(iw)).min(f64::from(ch) / f64::from(ih));
    let width = ((f64::from(iw) * scale) as u32).clamp(1, cw);
    let height = ((f64::from(ih) * scale) as u32).clamp(1, ch);
    Placement {
        x: (cw - width) / 2,
        y: (ch - height) / 2,
        width,
        height,
    }
}

pub fn solid_frame(width: u32, height: u32, color: [u8; 3]) -> RgbaImage {
    RgbaImage::from_pixel(
        width.max(1),
        height.max(1),
        Rgba([color[0], color[1], color[2], 255]),
    )
}

/// Scale `source` to fit the canvas and alpha-blend it centered over black.
pub fn compose_letterboxed(
    path: &Path,
    source: &RgbaImage,
    width: u32,
    height: u32,
) -> Result<RgbaImage, RenderError> {
    let mut canvas = solid_frame(width, height, [0, 0, 0]);
    let place = fit_within(source.dimensions(), canvas.dimensions());
    let scaled = resize_rgba(path, source, place.width, place.height)?;
    image::imageops::overlay(&mut canvas, &scaled, i64::from(place.x), i64::from(place.y));
    Ok(canvas)
}

fn resize_rgba(
    path: &Path,
    source: &RgbaImage,
    target_w: u32,
    target_h: u32,
) -> Result<RgbaImage, RenderError> {
    if source.dimensions() == (target_w, target_h) {
        return Ok(source.clone());
    }
    let scale_err = |message: String| RenderError::Scale {
        path: path.to_path_buf(),
        message,
    };

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .map_err(|err| scale_err(err.to_string()))?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    fir::Resizer::new()
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|err| scale_err(err.to_string()))?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| scale_err("resized buffer has unexpected length".to_string()))
}

/// Decode to RGBA8 and apply EXIF orientation when present.
pub fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage, RenderError> {
    let decode_err = |source: image::ImageError| RenderError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(|err| decode_err(image::ImageError::IoError(err)))?
        .with_guessed_format()
        .map_err(|err| decode_err(image::ImageError::IoError(err)))?
        .decode()
        .map_err(decode_err)?;
    let img = img.to_rgba8();

    let oriented = match read_orientation(path).unwrap_or(1) {
        2 => image::imageops::flip_horizontal(&img),
        3 => image::imageops::rotate180(&img),
        4 => image::imageops::flip_vertical(&img),
        5 => image::imageops::flip_horizontal(&image::imageops::rotate90(&img)),
        6 => image::imageops::rotate90(&img),
        7 => image::imageops::flip_horizontal(&image::imageops::rotate270(&img)),
        8 => image::imageops::rotate270(&img),
        _ => img,
    };
    Ok(oriented)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = u16::try_from(field.value.get_uint(0)?).ok()?;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    // JPEG 2x1 with EXIF orientation 6 (rotate 90 CW), base64 encoded
    const ORIENT6_JPEG: &str = concat!(
        "/9j/4AAQSkZJRgABAQAAAQABAAD/4QAiRXhpZgAATU0AKgAAAAgAAQESAAMAAAABAAYAAAAAAAD/2wBDAAgGBgcGBQgHBwcJCQgKDBQNDAsLDBkSEw8UHRofHh0aHBwgJC4nICIsIxwcKDcpLDAxNDQ0Hyc5PTgyPC4zNDL/",
        "2wBDAQkJCQwLDBgNDRgyIRwhMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjL/wAARCAABAAIDASIAAhEBAxEB/8QAHwAAAQUBAQEBAQEAAAAAAAAAAAECAwQFBgcICQoL/8QAtRAAAgEDAwIEAwUFBAQAAAF9AQIDAAQRBRIhMUEGE1FhByJxFDKBkaEII0KxwRVS0fAkM2JyggkKFhcYGRolJicoKSo0NTY3ODk6Q0RFRkdISUpTVFVWV1hZWmNkZWZnaGlqc3R1dnd4eXqDhIWGh4iJipKTlJWWl5iZmqKjpKWmp6ipqrKztLW2t7i5usLDxMXGx8jJytLT1NXW19jZ2uHi4+Tl5ufo6erx8vP09fb3+Pn6/8QAHwEAAwEBAQEBAQEBAQAAAAAAAAECAwQFBgcICQoL/8QAtREAAgECBAQDBAcFBAQAAQJ3AAECAxEEBSExBhJBUQdhcRMiMoEIFEKRobHBCSMzUvAVYnLRChYkNOEl8RcYGRomJygpKjU2Nzg5OkNERUZHSElKU1RVVldYWVpjZGVmZ2hpanN0dXZ3eHl6goOEhYaHiImKkpOUlZaXmJmaoqOkpaanqKmqsrO0tba3uLm6wsPExcbHyMnK0tPU1dbX2Nna4uPk5ebn6Onq8vP09fb3+Pn6/9oADAMBAAIRAxEAPwDi6KKK+ZP3E//Z"
    );

    #[test]
    fn landscape_is_letterboxed_top_and_bottom() {
        let p = fit_within((1600, 900), (800, 800));
        assert_eq!((p.width, p.height), (800, 450));
        assert_eq!((p.x, p.y), (0, 175));
    }

    #[test]
    fn portrait_is_pillarboxed_and_upscaled() {
        let p = fit_within((100, 200), (1920, 1080));
        assert_eq!((p.width, p.height), (540, 1080));
        assert_eq!((p.x, p.y), (690, 0));
    }

    #[test]
    fn letterbox_bars_are_black() {
        let source = solid_frame(40, 10, [10, 200, 30]);
        let canvas = compose_letterboxed(Path::new("mem.png"), &source, 40, 40).unwrap();
        assert_eq!(canvas.dimensions(), (40, 40));
        assert_eq!(canvas.get_pixel(20, 0).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(20, 39).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(20, 20).0, [10, 200, 30, 255]);
    }

    #[test]
    fn corrupt_file_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = decode_rgba8_apply_exif(&path).unwrap_err();
        assert!(matches!(err, RenderError::Decode { .. }));
    }

    #[test]
    fn applies_orientation_six() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(ORIENT6_JPEG)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orient6.jpg");
        std::fs::write(&path, &bytes).unwrap();
        let img = decode_rgba8_apply_exif(&path).unwrap();
        assert_eq!(img.dimensions(), (1, 2));
    }
}
