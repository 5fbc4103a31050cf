//! Normalizes everything a user can submit (pasted text, an uploaded file, an
//! inline base64 image) into a single [`DocumentInput`].

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{GuardianError, Result};

pub const MISSING_DOCUMENT_MESSAGE: &str =
    "Please provide some text or an image from your medical document.";

/// Image formats the analysis model accepts.
const SUPPORTED_IMAGE_FORMATS: [ImageFormat; 3] =
    [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP];

/// Extensions that are always read as text, whatever the first bytes look like.
const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// A document ready for analysis. Exactly one kind of content is present.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentInput {
    Text(DocumentText),
    Image(ImageDocument),
}

/// Non-blank document text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentText(String);

impl DocumentText {
    fn new(text: String) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(GuardianError::MissingInput(MISSING_DOCUMENT_MESSAGE.to_string()));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageDocument {
    bytes: Vec<u8>,
    media_type: String,
}

impl ImageDocument {
    fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Result<Self> {
        let media_type = media_type.into().trim().to_ascii_lowercase();
        if bytes.is_empty() {
            return Err(GuardianError::MissingInput(MISSING_DOCUMENT_MESSAGE.to_string()));
        }
        if !media_type.starts_with("image/") {
            return Err(GuardianError::InvalidInput(format!(
                "Unsupported image media type: {media_type}"
            )));
        }
        Ok(Self { bytes, media_type })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Inline image as sent by clients: raw base64 or a full `data:` URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ImagePayload {
    pub fn decode(&self) -> Result<ImageDocument> {
        let (url_media_type, encoded) = split_data_url(self.data.trim());

        let media_type = self
            .mime_type
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or(url_media_type)
            .ok_or_else(|| {
                GuardianError::InvalidInput("Image media type is required".to_string())
            })?;

        let bytes = STANDARD.decode(encoded).map_err(|e| {
            GuardianError::InvalidInput(format!("Image data is not valid base64: {e}"))
        })?;

        ImageDocument::new(bytes, media_type)
    }
}

/// Splits `data:image/png;base64,AAAA` into its media type and payload.
fn split_data_url(data: &str) -> (Option<String>, &str) {
    let Some(rest) = data.strip_prefix("data:") else {
        return (None, data);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let media_type = header
                .split(';')
                .next()
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            (media_type, payload)
        }
        None => (None, data),
    }
}

impl DocumentInput {
    pub fn text(text: impl Into<String>) -> Result<Self> {
        DocumentText::new(text.into()).map(DocumentInput::Text)
    }

    pub fn image(bytes: Vec<u8>, media_type: impl Into<String>) -> Result<Self> {
        ImageDocument::new(bytes, media_type).map(DocumentInput::Image)
    }

    /// Builds an input from a submission that may carry text, an image, or neither.
    /// Blank text counts as absent.
    pub fn from_parts(text: Option<String>, image: Option<ImagePayload>) -> Result<Self> {
        let text = text.filter(|t| !t.trim().is_empty());
        match (text, image) {
            (Some(_), Some(_)) => Err(GuardianError::InvalidInput(
                "Provide either document text or an image, not both".to_string(),
            )),
            (Some(text), None) => Self::text(text),
            (None, Some(image)) => Ok(DocumentInput::Image(image.decode()?)),
            (None, None) => Err(GuardianError::MissingInput(
                MISSING_DOCUMENT_MESSAGE.to_string(),
            )),
        }
    }

    /// Builds an input from an uploaded body. `image/*` content types become
    /// images; anything else must be UTF-8 text. Without a content type the
    /// bytes are sniffed for a known image format first.
    pub fn from_bytes(bytes: Vec<u8>, content_type: Option<&str>) -> Result<Self> {
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty());

        match media_type {
            Some(media_type) if media_type.starts_with("image/") => {
                Self::image(bytes, media_type)
            }
            Some(_) => Self::decode_text(bytes),
            None => match sniff_image_media_type(&bytes) {
                Some(media_type) => Self::image(bytes, media_type),
                None => Self::decode_text(bytes),
            },
        }
    }

    /// Reads a local file. `.txt` and `.md` files are text. Otherwise a
    /// supported image extension or recognizable image bytes make an image,
    /// and anything else is read as text.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            GuardianError::InvalidInput(format!("Error reading file {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), size = bytes.len(), "Read document from disk");

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        if extension
            .as_deref()
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
        {
            return Self::decode_text(bytes);
        }

        let by_extension = extension
            .as_deref()
            .and_then(ImageFormat::from_extension)
            .filter(|format| SUPPORTED_IMAGE_FORMATS.contains(format))
            .map(|format| format.to_mime_type().to_string());

        match by_extension.or_else(|| sniff_image_media_type(&bytes)) {
            Some(media_type) => Self::image(bytes, media_type),
            None => Self::decode_text(bytes),
        }
    }

    fn decode_text(bytes: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8(bytes).map_err(|_| {
            GuardianError::InvalidInput("Document is neither an image nor UTF-8 text".to_string())
        })?;
        Self::text(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocumentInput::Text(_) => "text",
            DocumentInput::Image(_) => "image",
        }
    }
}

/// Detects png, jpeg and webp content. Other formats `image` knows about are
/// ignored, so text that happens to start with e.g. `P1` stays text.
fn sniff_image_media_type(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes)
        .ok()
        .filter(|format| SUPPORTED_IMAGE_FORMATS.contains(format))?;
    debug!(?format, "Detected image format from content");
    Some(format.to_mime_type().to_string())
}
