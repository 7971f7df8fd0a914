use image::{imageops::FilterType, DynamicImage, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("uploaded file is empty")]
    Empty,
    #[error("cannot identify image file: {0}")]
    Format(#[from] std::io::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decodes any supported encoding. There is no cap on width or height, only
/// on the bytes the decoded buffer may take, which is checked against the
/// header before any pixel data is allocated.
pub fn decode_image(image_data: &[u8], max_decode_bytes: u64) -> Result<DynamicImage, ImageError> {
    if image_data.is_empty() {
        return Err(ImageError::Empty);
    }

    let mut reader = ImageReader::new(Cursor::new(image_data)).with_guessed_format()?;
    let mut limits = Limits::no_limits();
    limits.max_alloc = Some(max_decode_bytes);
    reader.limits(limits);

    Ok(reader.decode()?)
}

/// Size after bounding the larger edge to `max_edge`. The larger edge lands on
/// `max_edge` exactly, the other is scaled and rounded.
pub fn bounded_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }

    let scale = |side: u32, longest: u32| -> u32 {
        let scaled = (side as u64 * max_edge as u64 + longest as u64 / 2) / longest as u64;
        (scaled as u32).max(1)
    };

    if width >= height {
        (max_edge, scale(height, width))
    } else {
        (scale(width, height), max_edge)
    }
}

/// Converts to three-channel RGB and downsizes so neither edge exceeds `max_edge`.
pub fn normalize(image: DynamicImage, max_edge: u32) -> RgbImage {
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    let (new_width, new_height) = bounded_dimensions(width, height, max_edge);

    if (new_width, new_height) == (width, height) {
        return rgb;
    }

    tracing::info!(
        "Image downscaled from {}x{} to {}x{}",
        width,
        height,
        new_width,
        new_height
    );
    image::imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3)
}
