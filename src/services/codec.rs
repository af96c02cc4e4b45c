//! Image decoding and encoding for the HTTP layer
//!
//! Inline payloads arrive as data URLs or bare base64. Decoding reads the
//! header dimensions before allocating pixels so the dimension limit can
//! reject oversized images cheaply. Results are always encoded as PNG.

use crate::{
    config::{OversizePolicy, ServiceConfig},
    error::{BgRemovalError, Result},
};
use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use image::{imageops::FilterType, DynamicImage, ImageError, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Standard alphabet that accepts payloads with or without padding
const INLINE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// An image ready for the model
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    /// Dimensions as found in the payload
    pub original_dimensions: (u32, u32),
    /// Dimensions after the dimension limit was applied
    pub processed_dimensions: (u32, u32),
}

/// Decoder and encoder bound to the service's dimension limit
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    max_image_size: u32,
    oversize_policy: OversizePolicy,
}

impl ImageCodec {
    #[must_use]
    pub fn new(max_image_size: u32, oversize_policy: OversizePolicy) -> Self {
        Self {
            max_image_size: max_image_size.max(1),
            oversize_policy,
        }
    }

    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.max_image_size, config.oversize_policy)
    }

    /// Decode an inline payload (data URL or bare base64) into an image
    ///
    /// # Errors
    /// - [`BgRemovalError::InvalidEncoding`] for malformed data URLs or base64
    /// - Any error of [`ImageCodec::decode_bytes`]
    pub fn decode_inline(&self, data: &str) -> Result<DecodedImage> {
        let bytes = decode_inline_payload(data)?;
        self.decode_bytes(&bytes)
    }

    /// Decode raw image bytes, enforcing the dimension limit
    ///
    /// # Errors
    /// - [`BgRemovalError::EmptyImage`] for zero-length input
    /// - [`BgRemovalError::UnsupportedFormat`] for unknown or disabled formats
    /// - [`BgRemovalError::CorruptImage`] for undecodable or zero-sized images
    /// - [`BgRemovalError::ImageTooLarge`] when the policy is to reject
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::EmptyImage);
        }

        let format = image::guess_format(bytes)
            .map_err(|_| BgRemovalError::unsupported_format("unrecognized image header"))?;
        if !format.reading_enabled() {
            return Err(BgRemovalError::unsupported_format(format!("{format:?}")));
        }

        // Reading the header allocates nothing; only the full decode is bounded by the default limits
        let mut header_reader = ImageReader::with_format(Cursor::new(bytes), format);
        header_reader.no_limits();
        let (width, height) = header_reader
            .into_dimensions()
            .map_err(|e| classify_decode_error(&e))?;
        if width == 0 || height == 0 {
            return Err(BgRemovalError::corrupt_image(format!(
                "image has zero size ({width}x{height})"
            )));
        }
        if self.oversize_policy == OversizePolicy::Reject && self.exceeds_limit(width, height) {
            return Err(BgRemovalError::ImageTooLarge {
                width,
                height,
                max: self.max_image_size,
            });
        }

        let decoded = ImageReader::with_format(Cursor::new(bytes), format)
            .decode()
            .map_err(|e| match e {
                ImageError::Limits(_) => BgRemovalError::ImageTooLarge {
                    width,
                    height,
                    max: self.max_image_size,
                },
                other => classify_decode_error(&other),
            })?;
        let original_dimensions = (decoded.width(), decoded.height());

        let image = self.enforce_dimension_limit(normalize_color(decoded))?;
        let processed_dimensions = (image.width(), image.height());
        if processed_dimensions != original_dimensions {
            log::debug!(
                "Downscaled {}x{} to {}x{}",
                original_dimensions.0,
                original_dimensions.1,
                processed_dimensions.0,
                processed_dimensions.1
            );
        }

        Ok(DecodedImage {
            image,
            format,
            original_dimensions,
            processed_dimensions,
        })
    }

    /// Apply the dimension limit to a decoded image
    ///
    /// # Errors
    /// - [`BgRemovalError::ImageTooLarge`] when the policy is to reject
    pub fn enforce_dimension_limit(&self, image: DynamicImage) -> Result<DynamicImage> {
        let (width, height) = (image.width(), image.height());
        if !self.exceeds_limit(width, height) {
            return Ok(image);
        }

        match self.oversize_policy {
            OversizePolicy::Reject => Err(BgRemovalError::ImageTooLarge {
                width,
                height,
                max: self.max_image_size,
            }),
            OversizePolicy::Downscale => {
                let (new_width, new_height) =
                    downscaled_dimensions(width, height, self.max_image_size);
                Ok(image.resize_exact(new_width, new_height, FilterType::Lanczos3))
            },
        }
    }

    fn exceeds_limit(&self, width: u32, height: u32) -> bool {
        width > self.max_image_size || height > self.max_image_size
    }
}

/// Extract the raw bytes of a data URL or bare base64 string
///
/// ASCII whitespace inside the payload is ignored.
///
/// # Errors
/// - Data URL without a `,` separator
/// - Data URL that does not declare base64 encoding
/// - Invalid base64
pub fn decode_inline_payload(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.trim();
    let payload = match strip_prefix_ignore_case(trimmed, "data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| {
                BgRemovalError::invalid_encoding("data URL is missing the ',' separator")
            })?;
            let is_base64 = header
                .split(';')
                .skip(1)
                .any(|param| param.trim().eq_ignore_ascii_case("base64"));
            if !is_base64 {
                return Err(BgRemovalError::invalid_encoding(
                    "only base64-encoded data URLs are supported",
                ));
            }
            payload
        },
        None => trimmed,
    };

    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    INLINE_ENGINE
        .decode(compact.as_bytes())
        .map_err(|e| BgRemovalError::invalid_encoding(format!("invalid base64: {e}")))
}

/// Target size for a downscale: the longer side becomes `max_size`
#[must_use]
pub fn downscaled_dimensions(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width > height {
        let scaled = (f64::from(height) / f64::from(width) * f64::from(max_size)) as u32;
        (max_size, scaled.max(1))
    } else {
        let scaled = (f64::from(width) / f64::from(height) * f64::from(max_size)) as u32;
        (scaled.max(1), max_size)
    }
}

/// Convert anything that is not 8-bit RGB or RGBA
#[must_use]
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Encode a result as PNG
///
/// # Errors
/// - [`BgRemovalError::Encode`] if the PNG encoder fails
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| BgRemovalError::encode(format!("PNG encoding failed: {e}")))?;
    Ok(buffer)
}

/// Wrap PNG bytes in a `data:image/png;base64,` URL
#[must_use]
pub fn to_data_url(png: &[u8]) -> String {
    let mut url = String::with_capacity(PNG_DATA_URL_PREFIX.len() + png.len() * 4 / 3 + 4);
    url.push_str(PNG_DATA_URL_PREFIX);
    STANDARD.encode_string(png, &mut url);
    url
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

fn classify_decode_error(error: &ImageError) -> BgRemovalError {
    match error {
        ImageError::Unsupported(e) => BgRemovalError::unsupported_format(e.to_string()),
        ImageError::Limits(e) => BgRemovalError::PayloadTooLarge(e.to_string()),
        other => BgRemovalError::corrupt_image(other.to_string()),
    }
}
