//! Decoding of downloaded photos before they are sent to the model

use image::ImageFormat;

/// A decoded image ready to be sent inline to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// Raw encoded bytes as downloaded
    pub bytes: Vec<u8>,
    /// MIME type matching `bytes`
    pub mime_type: &'static str,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
}

impl ImageInput {
    /// Sniff the format and fully decode the image to validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a supported, decodable image.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, image::ImageError> {
        let format = image::guess_format(&bytes)?;
        let decoded = image::load_from_memory_with_format(&bytes, format)?;

        Ok(Self {
            mime_type: mime_type_for(format),
            width: decoded.width(),
            height: decoded.height(),
            bytes,
        })
    }
}

fn mime_type_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        _ => "image/jpeg",
    }
}
