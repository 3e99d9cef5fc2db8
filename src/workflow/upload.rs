// Upload step - massing image plus configuration text
use crate::config::ArchConfig;
use crate::error::WorkflowError;
use base64::prelude::*;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DATA_URL_PREFIX: Regex =
        Regex::new(r"^data:image/(png|jpeg|jpg);base64,").expect("data URL pattern is valid");
}

/// Image as it arrives from the client
#[derive(Debug, Clone)]
pub enum ImageInput {
    Bytes(Vec<u8>),
    /// `data:image/...;base64,` URL or bare base64
    DataUrl(String),
}

/// What the upload step hands to the workflow
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutput {
    pub image: Vec<u8>,
    pub config: ArchConfig,
}

/// Editor state for the upload step. Nothing leaves it until `submit` succeeds.
#[derive(Debug, Clone)]
pub struct UploadForm {
    image: Option<ImageInput>,
    config_text: String,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadForm {
    /// Empty image slot and the editor seeded with the default template.
    pub fn new() -> Self {
        Self {
            image: None,
            config_text: ArchConfig::default().to_pretty_json().unwrap_or_default(),
        }
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_config_text(mut self, text: impl Into<String>) -> Self {
        self.config_text = text.into();
        self
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn config_text(&self) -> &str {
        &self.config_text
    }

    /// Validate and emit the image bytes with the parsed configuration.
    pub fn submit(&self) -> Result<UploadOutput, WorkflowError> {
        let image = match &self.image {
            Some(input) => decode_image(input)?,
            None => return Err(WorkflowError::MissingImage),
        };
        if image.is_empty() {
            return Err(WorkflowError::MissingImage);
        }

        let config = ArchConfig::parse(&self.config_text).map_err(|e| {
            tracing::warn!("❌ Rejected configuration: {}", e);
            WorkflowError::InvalidConfig(e)
        })?;
        config.check_limits().map_err(|reason| {
            tracing::warn!("❌ Rejected configuration: {}", reason);
            WorkflowError::ConfigOutOfRange(reason)
        })?;

        tracing::info!("📤 Upload accepted ({} image bytes)", image.len());
        Ok(UploadOutput { image, config })
    }
}

/// Remove the transport prefix from a data URL, leaving the base64 body.
pub fn strip_data_url_prefix(data_url: &str) -> &str {
    match DATA_URL_PREFIX.find(data_url) {
        Some(prefix) => &data_url[prefix.end()..],
        None => data_url,
    }
}

pub fn decode_image(input: &ImageInput) -> Result<Vec<u8>, WorkflowError> {
    match input {
        ImageInput::Bytes(bytes) => Ok(bytes.clone()),
        ImageInput::DataUrl(url) => Ok(BASE64_STANDARD.decode(strip_data_url_prefix(url.trim()))?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn test_prefix_is_stripped_for_known_types() {
        assert_eq!(strip_data_url_prefix(PNG_DATA_URL), "iVBORw0KGgo=");
        assert_eq!(strip_data_url_prefix("data:image/jpg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url_prefix("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url_prefix("AAAA"), "AAAA");
    }

    #[test]
    fn test_submit_emits_bytes_and_parsed_config() {
        let form = UploadForm::new().with_image(ImageInput::DataUrl(PNG_DATA_URL.to_string()));
        let output = form.submit().unwrap();
        assert_eq!(&output.image[..4], &[0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(output.config, ArchConfig::default());
    }

    #[test]
    fn test_missing_image_blocks_submit() {
        let form = UploadForm::new();
        assert!(matches!(form.submit(), Err(WorkflowError::MissingImage)));

        let empty = UploadForm::new().with_image(ImageInput::Bytes(Vec::new()));
        assert!(matches!(empty.submit(), Err(WorkflowError::MissingImage)));
    }

    #[test]
    fn test_invalid_json_blocks_submit() {
        let form = UploadForm::new()
            .with_image(ImageInput::Bytes(vec![1, 2, 3]))
            .with_config_text("{ \"style\": ");
        let err = form.submit().unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConfig(_)));
        assert!(err.to_string().starts_with("Invalid JSON configuration"));
    }

    #[test]
    fn test_oversized_image_count_blocks_submit() {
        let mut config = ArchConfig::default();
        config.image_generation.number_of_images = usize::MAX;
        let form = UploadForm::new()
            .with_image(ImageInput::Bytes(vec![1, 2, 3]))
            .with_config_text(config.to_pretty_json().unwrap());
        assert!(matches!(form.submit(), Err(WorkflowError::ConfigOutOfRange(_))));
    }

    #[test]
    fn test_unsupported_data_url_is_rejected() {
        let form = UploadForm::new().with_image(ImageInput::DataUrl("data:image/gif;base64,R0lG".to_string()));
        assert!(matches!(form.submit(), Err(WorkflowError::InvalidImage(_))));
    }

    #[test]
    fn test_clearing_image_blocks_again() {
        let mut form = UploadForm::new().with_image(ImageInput::Bytes(vec![7]));
        assert!(form.has_image());
        form.clear_image();
        assert!(!form.has_image());
        assert!(form.config_text().contains("\"camera_angles\""));
    }
}
