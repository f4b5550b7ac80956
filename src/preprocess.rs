//! Turns a base64 image payload, as sent by a drawing canvas, into the fixed
//! `[1, 1, 28, 28]` grayscale tensor the digit classifier expects.

use base64::{
    alphabet,
    engine::{self, general_purpose},
    Engine as _,
};
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

/// Side length of the square input the classifier was trained on
pub const IMAGE_SIDE: u32 = 28;

/// Shape of every `CanonicalTensor`: (batch, channel, height, width)
pub const TENSOR_SHAPE: [usize; 4] = [1, 1, IMAGE_SIDE as usize, IMAGE_SIDE as usize];

const TENSOR_LEN: usize = (IMAGE_SIDE * IMAGE_SIDE) as usize;

/// Standard alphabet with padding, but tolerant of non-zero trailing bits
const PAYLOAD_ENGINE: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::STANDARD,
    general_purpose::PAD.with_decode_allow_trailing_bits(true),
);

/// Why a payload could not be turned into a tensor
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),

    #[error("unreadable image: {0}")]
    UnreadableImage(#[source] image::ImageError),
}

/// A grayscale image ready for the classifier. Values are in `[0.0, 1.0]`,
/// laid out row-major with shape `TENSOR_SHAPE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTensor {
    data: Vec<f32>,
}

impl CanonicalTensor {
    /// Resize a grayscale raster to 28x28 (ignoring aspect ratio) and scale
    /// its intensities to `[0.0, 1.0]`
    pub fn from_luma(image: &GrayImage) -> Self {
        let resized = imageops::resize(image, IMAGE_SIDE, IMAGE_SIDE, FilterType::CatmullRom);
        let data = resized
            .pixels()
            .map(|p| f32::from(p.0[0]) / 255.0)
            .collect::<Vec<f32>>();
        debug_assert_eq!(data.len(), TENSOR_LEN);
        CanonicalTensor { data }
    }

    /// An all-zero (black) tensor
    pub fn zeros() -> Self {
        CanonicalTensor {
            data: vec![0.0; TENSOR_LEN],
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        TENSOR_SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Drop a `data:<mediatype>;base64,` prefix if there is one. Only the first
/// comma delimits the prefix.
pub fn strip_data_url(payload: &str) -> &str {
    let is_data_url = payload
        .get(..5)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("data:"));

    match payload.split_once(',') {
        Some((_, data)) if is_data_url => data,
        _ => payload,
    }
}

/// Pad `payload` with `=` up to the next multiple of four characters
pub fn pad_base64(payload: &str) -> Cow<'_, str> {
    match payload.len() % 4 {
        0 => Cow::Borrowed(payload),
        rem => {
            let mut padded = String::with_capacity(payload.len() + 4 - rem);
            padded.push_str(payload);
            padded.extend(std::iter::repeat('=').take(4 - rem));
            Cow::Owned(padded)
        }
    }
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    PAYLOAD_ENGINE
        .decode(payload)
        .map_err(DecodeError::InvalidBase64)
}

/// Decode any supported image container into an 8-bit grayscale raster
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
    let image = image::load_from_memory(bytes)
        .map_err(DecodeError::UnreadableImage)?
        .to_luma8();

    // Some containers allow an empty raster, which would resize to all zeros
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::UnreadableImage(ImageError::Parameter(
            ParameterError::from_kind(ParameterErrorKind::DimensionMismatch),
        )));
    }
    Ok(image)
}

/// Run the whole decode pipeline on a request payload
pub fn normalize(payload: &str) -> Result<CanonicalTensor, DecodeError> {
    let data = pad_base64(strip_data_url(payload));

    let bytes = decode_base64(&data).map_err(|e| {
        debug!("rejecting payload of {} chars: {e}", payload.len());
        e
    })?;

    let image = decode_grayscale(&bytes).map_err(|e| {
        debug!("rejecting {} decoded bytes: {e}", bytes.len());
        e
    })?;

    debug!(
        "decoded {}x{} image, resizing to {IMAGE_SIDE}x{IMAGE_SIDE}",
        image.width(),
        image.height()
    );

    Ok(CanonicalTensor::from_luma(&image))
}
