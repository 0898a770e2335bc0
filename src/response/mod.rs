//! Response encoding - PNG raster and base64 transport

pub mod base64;

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::error::Result;

/// Raster format every image is returned in
pub const IMAGE_FORMAT: &str = "png";

/// An image ready to be placed in a JSON response
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 of the PNG bytes
    pub data: String,
    pub format: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encode an image as base64 PNG
pub fn encode_image(image: &DynamicImage) -> Result<EncodedImage> {
    let png = encode_png(image)?;
    Ok(EncodedImage {
        data: base64::encode(&png),
        format: IMAGE_FORMAT,
        width: image.width(),
        height: image.height(),
    })
}

/// Decode a base64 PNG back into an image
pub fn decode_image(encoded: &str) -> Result<DynamicImage> {
    let bytes = base64::decode(encoded)?;
    Ok(image::load_from_memory_with_format(&bytes, ImageFormat::Png)?)
}
