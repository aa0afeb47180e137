//! Image payloads, reference images for editing, and the configuration of
//! the image generation, editing and upscaling operations.

use std::path::Path;
use std::sync::OnceLock;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{Error, IoSnafu, invalid_argument};

/// An image either stored in Cloud Storage or carried inline.
///
/// Inline bytes travel base64 encoded; [`Image::bytes`] decodes them on
/// first access and keeps the result for the lifetime of the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<String>,
    #[serde(rename = "bytesBase64Encoded", skip_serializing_if = "Option::is_none")]
    encoded: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip)]
    decoded: OnceLock<Vec<u8>>,
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.gcs_uri == other.gcs_uri && self.encoded == other.encoded && self.mime_type == other.mime_type
    }
}

impl Image {
    pub fn from_bytes(data: impl AsRef<[u8]>, mime_type: impl Into<String>) -> Self {
        Self {
            encoded: Some(STANDARD.encode(data.as_ref())),
            mime_type: Some(mime_type.into()),
            ..Default::default()
        }
    }

    pub fn from_gcs(uri: impl Into<String>, mime_type: Option<String>) -> Self {
        Self { gcs_uri: Some(uri.into()), mime_type, ..Default::default() }
    }

    /// Loads an image from a `gs://` URI, a public Cloud Storage URL, or a
    /// local path (MIME type guessed from the extension).
    pub fn from_location(location: &str) -> Result<Self, Error> {
        if location.starts_with("gs://") {
            return Ok(Self::from_gcs(location, None));
        }
        if let Some(object) = location.strip_prefix("https://storage.googleapis.com/") {
            return Ok(Self::from_gcs(format!("gs://{object}"), None));
        }
        let path = Path::new(location);
        let data = std::fs::read(path).context(IoSnafu)?;
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();
        Ok(Self::from_bytes(data, mime_type.essence_str()))
    }

    /// Decoded inline bytes, `None` for Cloud Storage images.
    pub fn bytes(&self) -> Result<Option<&[u8]>, Error> {
        let Some(encoded) = &self.encoded else {
            return Ok(None);
        };
        if let Some(decoded) = self.decoded.get() {
            return Ok(Some(decoded.as_slice()));
        }
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| invalid_argument(format!("image bytes are not valid base64: {e}")))?;
        Ok(Some(self.decoded.get_or_init(|| decoded).as_slice()))
    }

    pub fn has_bytes(&self) -> bool {
        self.encoded.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rai_filtered_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateImagesResponse {
    pub generated_images: Vec<GeneratedImage>,
}

/// Shared knobs of the image generation and editing operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateImagesConfig {
    /// Vertex AI only.
    pub output_gcs_uri: Option<String>,
    /// Vertex AI only.
    pub negative_prompt: Option<String>,
    pub number_of_images: Option<i32>,
    pub aspect_ratio: Option<String>,
    pub guidance_scale: Option<f32>,
    /// Vertex AI only.
    pub seed: Option<i32>,
    pub safety_filter_level: Option<String>,
    pub person_generation: Option<String>,
    pub include_safety_attributes: Option<bool>,
    pub include_rai_reason: Option<bool>,
    /// Vertex AI only.
    pub language: Option<String>,
    pub output_mime_type: Option<String>,
    pub output_compression_quality: Option<i32>,
    /// Vertex AI only.
    pub add_watermark: Option<bool>,
    pub enhance_prompt: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditImageConfig {
    pub output_gcs_uri: Option<String>,
    pub negative_prompt: Option<String>,
    pub number_of_images: Option<i32>,
    pub guidance_scale: Option<f32>,
    pub seed: Option<i32>,
    pub safety_filter_level: Option<String>,
    pub person_generation: Option<String>,
    pub include_safety_attributes: Option<bool>,
    pub include_rai_reason: Option<bool>,
    pub language: Option<String>,
    pub output_mime_type: Option<String>,
    pub output_compression_quality: Option<i32>,
    /// e.g. `EDIT_MODE_INPAINT_INSERTION`
    pub edit_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpscaleImageConfig {
    pub include_rai_reason: Option<bool>,
    pub output_mime_type: Option<String>,
    pub output_compression_quality: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskReferenceConfig {
    /// e.g. `MASK_MODE_FOREGROUND`
    pub mask_mode: Option<String>,
    pub segmentation_classes: Option<Vec<i32>>,
    pub mask_dilation: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlReferenceConfig {
    /// e.g. `CONTROL_TYPE_CANNY`
    pub control_type: Option<String>,
    pub enable_control_image_computation: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleReferenceConfig {
    pub style_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectReferenceConfig {
    /// e.g. `SUBJECT_TYPE_PERSON`
    pub subject_type: Option<String>,
    pub subject_description: Option<String>,
}

/// A reference image for editing. The reference type is fixed by the
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceImage {
    Raw { reference_id: i32, image: Image },
    Mask { reference_id: i32, image: Option<Image>, config: MaskReferenceConfig },
    Control { reference_id: i32, image: Image, config: ControlReferenceConfig },
    Style { reference_id: i32, image: Image, config: StyleReferenceConfig },
    Subject { reference_id: i32, image: Image, config: SubjectReferenceConfig },
}

impl ReferenceImage {
    pub fn raw(reference_id: i32, image: Image) -> Self {
        ReferenceImage::Raw { reference_id, image }
    }

    pub fn mask(reference_id: i32, image: Option<Image>, config: MaskReferenceConfig) -> Self {
        ReferenceImage::Mask { reference_id, image, config }
    }

    pub fn control(reference_id: i32, image: Image, config: ControlReferenceConfig) -> Self {
        ReferenceImage::Control { reference_id, image, config }
    }

    pub fn style(reference_id: i32, image: Image, config: StyleReferenceConfig) -> Self {
        ReferenceImage::Style { reference_id, image, config }
    }

    pub fn subject(reference_id: i32, image: Image, config: SubjectReferenceConfig) -> Self {
        ReferenceImage::Subject { reference_id, image, config }
    }

    pub fn reference_type(&self) -> &'static str {
        match self {
            ReferenceImage::Raw { .. } => "REFERENCE_TYPE_RAW",
            ReferenceImage::Mask { .. } => "REFERENCE_TYPE_MASK",
            ReferenceImage::Control { .. } => "REFERENCE_TYPE_CONTROL",
            ReferenceImage::Style { .. } => "REFERENCE_TYPE_STYLE",
            ReferenceImage::Subject { .. } => "REFERENCE_TYPE_SUBJECT",
        }
    }

    pub fn reference_id(&self) -> i32 {
        match self {
            ReferenceImage::Raw { reference_id, .. }
            | ReferenceImage::Mask { reference_id, .. }
            | ReferenceImage::Control { reference_id, .. }
            | ReferenceImage::Style { reference_id, .. }
            | ReferenceImage::Subject { reference_id, .. } => *reference_id,
        }
    }

    pub fn image(&self) -> Option<&Image> {
        match self {
            ReferenceImage::Mask { image, .. } => image.as_ref(),
            ReferenceImage::Raw { image, .. }
            | ReferenceImage::Control { image, .. }
            | ReferenceImage::Style { image, .. }
            | ReferenceImage::Subject { image, .. } => Some(image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_decode_once_and_stay_out_of_equality() {
        let image = Image::from_bytes([1u8, 2, 3], "image/png");
        let copy = image.clone();
        assert_eq!(image.bytes().unwrap(), Some(&[1u8, 2, 3][..]));
        assert_eq!(image, copy);
        let wire = serde_json::to_value(&image).unwrap();
        assert_eq!(wire, serde_json::json!({"bytesBase64Encoded": "AQID", "mimeType": "image/png"}));
    }

    #[test]
    fn public_storage_url_becomes_gcs_uri() {
        let image = Image::from_location("https://storage.googleapis.com/bucket/cat.png").unwrap();
        assert_eq!(image.gcs_uri.as_deref(), Some("gs://bucket/cat.png"));
        assert_eq!(image.bytes().unwrap(), None);
    }

    #[test]
    fn reference_type_follows_variant() {
        let mask = ReferenceImage::mask(2, None, MaskReferenceConfig::default());
        assert_eq!(mask.reference_type(), "REFERENCE_TYPE_MASK");
        assert!(mask.image().is_none());
        let raw = ReferenceImage::raw(1, Image::from_gcs("gs://b/o.png", None));
        assert_eq!(raw.reference_type(), "REFERENCE_TYPE_RAW");
    }
}
