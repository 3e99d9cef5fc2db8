use crate::config::{ArchConfig, StyleConfig, VideoConfig};
use crate::error::GatewayError;
use crate::gateway::{poll_until_done, GenerationGateway, PollPolicy, RenderedImage, RenderedVideo};
use crate::settings::{ModelSet, Settings};
use crate::types::{AnalysisResult, VisualProposal};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Arc<RwLock<Option<String>>>,
    base_url: String,
    models: ModelSet,
    video_poll: PollPolicy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    // thought signatures and other parts we never read
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String, // base64 encoded data
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason")]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text of the first candidate, if it has any
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn first_inline_data(&self) -> Option<&InlineData> {
        self.first_parts().iter().find_map(|part| match part {
            Part::InlineData { inline_data } => Some(inline_data),
            _ => None,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PredictVideoRequest {
    pub instances: Vec<VideoInstance>,
    pub parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
pub struct VideoInstance {
    pub prompt: String,
    pub image: VideoSeedImage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSeedImage {
    pub bytes_base64_encoded: String,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    pub aspect_ratio: String,
    pub resolution: String,
    pub sample_count: u32,
}

/// Long-running operation handle returned by the video endpoint
#[derive(Debug, Deserialize)]
pub struct VideoOperation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<OperationStatus>,
    pub response: Option<VideoOperationResponse>,
}

#[derive(Debug, Deserialize)]
pub struct OperationStatus {
    pub code: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoOperationResponse {
    #[serde(rename = "generateVideoResponse")]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples", default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedSample {
    pub video: Option<VideoFile>,
}

#[derive(Debug, Deserialize)]
pub struct VideoFile {
    pub uri: Option<String>,
}

impl VideoOperation {
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
    }
}

/// Determine MIME type from the image signature
pub fn detect_image_mime(image_bytes: &[u8]) -> &'static str {
    if image_bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if image_bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if image_bytes.starts_with(&[0x52, 0x49, 0x46, 0x46]) {
        "image/webp"
    } else {
        "image/png"
    }
}

pub fn analysis_prompt() -> &'static str {
    "Analyze this unfinished 3D architectural massing model. \
     Identify the building typology, geometry/proportions, structural logic, and what is missing to make it realistic. \
     Return JSON only."
}

pub fn proposal_prompt(analysis: &AnalysisResult, style: &StyleConfig) -> Result<String, GatewayError> {
    let context = serde_json::to_string(analysis)?;
    let constraints = serde_json::to_string(style)?;
    Ok(format!(
        "Based on this architectural analysis: {}\n\
         And these user constraints: {}\n\n\
         Propose 3 distinct visual directions for the final rendering.\n\
         Return a JSON array of proposals.",
        context, constraints
    ))
}

pub fn render_prompt(proposal: &VisualProposal, config: &ArchConfig, camera_angle: &str) -> String {
    let style = &config.style;
    format!(
        "Transform this massing model into a {} architectural render.\n\
         Camera Angle: {}.\n\
         Style: {}. {}.\n\
         Materials: {}.\n\
         Lighting: {}.\n\
         Environment: {}.\n\
         Mood: {}.\n\
         Post-processing: {}.\n\
         Maintain the exact geometry of the input massing.",
        style.realism_level,
        camera_angle,
        proposal.title,
        proposal.description,
        style.material,
        style.lighting,
        style.environment,
        style.mood,
        config.image_generation.post_processing
    )
}

pub fn video_prompt(video: &VideoConfig, config: &ArchConfig) -> String {
    format!(
        "Cinematic architectural video.\n\
         {} motion.\n\
         Camera: {}.\n\
         Atmosphere: {}, {}.\n\
         High quality, photorealistic, 4k.",
        video.motion_style,
        video.camera_movements.join(", "),
        config.style.mood,
        config.style.lighting
    )
}

fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "typology": { "type": "STRING" },
            "geometry": { "type": "STRING" },
            "structural_logic": { "type": "STRING" },
            "missing_elements": { "type": "ARRAY", "items": { "type": "STRING" } }
        }
    })
}

fn proposal_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": { "type": "STRING" },
                "title": { "type": "STRING" },
                "description": { "type": "STRING" },
                "material_palette": { "type": "STRING" },
                "lighting": { "type": "STRING" }
            }
        }
    })
}

/// Credential header accepted by every Gemini and Veo endpoint, file downloads included
const API_KEY_HEADER: &str = "x-goog-api-key";

fn user_content(parts: Vec<Part>) -> Content {
    Content {
        parts,
        role: Some("user".to_string()),
    }
}

fn inline_image(image: &[u8]) -> Part {
    Part::InlineData {
        inline_data: InlineData {
            mime_type: detect_image_mime(image).to_string(),
            data: BASE64_STANDARD.encode(image),
        },
    }
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: Arc::new(RwLock::new(settings.gemini_api_key.clone())),
            base_url: settings.gemini_base_url.clone(),
            models: settings.models.clone(),
            video_poll: settings.video_poll,
        }
    }

    async fn api_key(&self) -> Result<String, GatewayError> {
        self.api_key
            .read()
            .await
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(GatewayError::MissingCredential)
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GatewayError> {
        let api_key = self.api_key().await?;
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        tracing::debug!(model = %model, "Gemini request with {} content blocks", request.contents.len());

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                service: "Gemini",
                status: status.as_u16(),
                body: response_text,
            });
        }

        tracing::debug!(
            "Gemini API response (truncated): {}...",
            response_text.chars().take(500).collect::<String>()
        );

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}", e);
            GatewayError::Decode(e)
        })?;

        if let Some(reason) = parsed.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            tracing::warn!(model = %model, "Gemini blocked the prompt: {}", reason);
        }

        Ok(parsed)
    }

    /// GET with exponential backoff on connection errors, 429 and 5xx.
    /// Only used for idempotent reads against the video job.
    async fn get_with_retry(&self, url: &str, api_key: &str) -> Result<reqwest::Response, GatewayError> {
        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(15),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let operation = || async {
            let response = self
                .client
                .get(url)
                .header(API_KEY_HEADER, api_key)
                .timeout(Duration::from_secs(120))
                .send()
                .await
                .map_err(|e| {
                    let e = e.without_url();
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Veo request connection error (retrying): {}", e);
                        backoff::Error::transient(GatewayError::from(e))
                    } else {
                        backoff::Error::permanent(GatewayError::from(e))
                    }
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let error = GatewayError::Api {
                service: "Veo",
                status: status.as_u16(),
                body,
            };
            if matches!(status.as_u16(), 429 | 500 | 502 | 503) {
                tracing::warn!("Veo returned {} (retrying)", status);
                Err(backoff::Error::transient(error))
            } else {
                Err(backoff::Error::permanent(error))
            }
        };

        retry(backoff_config, operation).await
    }

    async fn fetch_operation(&self, name: &str) -> Result<VideoOperation, GatewayError> {
        let api_key = self.api_key().await?;
        let url = format!("{}/{}", self.base_url, name);
        let response = self.get_with_retry(&url, &api_key).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn submit_video(
        &self,
        seed: &[u8],
        video: &VideoConfig,
        config: &ArchConfig,
    ) -> Result<VideoOperation, GatewayError> {
        let api_key = self.api_key().await?;
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, self.models.video);

        let request = PredictVideoRequest {
            instances: vec![VideoInstance {
                prompt: video_prompt(video, config),
                image: VideoSeedImage {
                    bytes_base64_encoded: BASE64_STANDARD.encode(seed),
                    mime_type: detect_image_mime(seed).to_string(),
                },
            }],
            parameters: VideoParameters {
                aspect_ratio: "16:9".to_string(),
                resolution: "720p".to_string(),
                sample_count: 1,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                service: "Veo",
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl GenerationGateway for GeminiClient {
    async fn ensure_credential(&self) -> Result<(), GatewayError> {
        self.api_key().await.map(|_| ())
    }

    async fn connect(&self, api_key: String) -> Result<(), GatewayError> {
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        *self.api_key.write().await = Some(api_key);
        tracing::info!("🔑 Gemini credential updated");
        Ok(())
    }

    async fn analyze(&self, image: &[u8]) -> Result<AnalysisResult, GatewayError> {
        let request = GenerateContentRequest {
            contents: vec![user_content(vec![
                inline_image(image),
                Part::Text {
                    text: analysis_prompt().to_string(),
                },
            ])],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(analysis_schema()),
                ..Default::default()
            }),
        };

        tracing::info!("🧠 Analyzing massing model ({} bytes)", image.len());
        let response = self.generate_content(&self.models.analysis, &request).await?;
        let text = response
            .text()
            .ok_or(GatewayError::EmptyResponse("Failed to analyze image"))?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn propose(
        &self,
        analysis: &AnalysisResult,
        style: &StyleConfig,
    ) -> Result<Vec<VisualProposal>, GatewayError> {
        let request = GenerateContentRequest {
            contents: vec![user_content(vec![Part::Text {
                text: proposal_prompt(analysis, style)?,
            }])],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(proposal_schema()),
                ..Default::default()
            }),
        };

        tracing::info!("🎨 Requesting visual directions for a {}", analysis.typology);
        let response = self.generate_content(&self.models.analysis, &request).await?;
        let text = response
            .text()
            .ok_or(GatewayError::EmptyResponse("Failed to generate proposals"))?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn render_image(
        &self,
        massing: &[u8],
        proposal: &VisualProposal,
        config: &ArchConfig,
        camera_angle: &str,
    ) -> Result<RenderedImage, GatewayError> {
        let request = GenerateContentRequest {
            contents: vec![user_content(vec![
                inline_image(massing),
                Part::Text {
                    text: render_prompt(proposal, config, camera_angle),
                },
            ])],
            generation_config: None,
        };

        tracing::info!(angle = %camera_angle, "🖼️ Rendering '{}'", proposal.title);
        let response = self.generate_content(&self.models.image, &request).await?;
        let inline = response
            .first_inline_data()
            .ok_or(GatewayError::EmptyResponse("No image generated"))?;

        Ok(RenderedImage {
            mime_type: inline.mime_type.clone(),
            data: BASE64_STANDARD.decode(&inline.data)?,
        })
    }

    async fn render_video(
        &self,
        seed: &[u8],
        video: &VideoConfig,
        config: &ArchConfig,
    ) -> Result<RenderedVideo, GatewayError> {
        let submitted = self.submit_video(seed, video, config).await?;
        tracing::info!(operation = %submitted.name, "🎬 Video job submitted ({})", video.motion_style);

        let operation = if submitted.done {
            submitted
        } else {
            let name = submitted.name.clone();
            poll_until_done(&self.video_poll, &name, || async {
                let operation = self.fetch_operation(&name).await?;
                Ok(if operation.done { Some(operation) } else { None })
            })
            .await?
        };

        if let Some(error) = &operation.error {
            return Err(GatewayError::VideoFailed(
                error
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("operation error code {:?}", error.code)),
            ));
        }

        let uri = operation
            .video_uri()
            .ok_or_else(|| GatewayError::VideoFailed("no video in finished operation".to_string()))?
            .to_string();

        let response = self.get_with_retry(&uri, &self.api_key().await?).await?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();
        let data = response.bytes().await?.to_vec();

        tracing::info!(operation = %operation.name, "✅ Video downloaded ({} bytes)", data.len());
        Ok(RenderedVideo {
            mime_type,
            data,
            source_uri: uri,
        })
    }
}
