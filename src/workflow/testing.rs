// Scripted gateway for controller tests
use crate::config::{ArchConfig, StyleConfig, VideoConfig};
use crate::error::GatewayError;
use crate::gateway::{GenerationGateway, RenderedImage, RenderedVideo, SharedGateway};
use crate::types::{AnalysisResult, VisualProposal};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub enum Outcome {
    Succeed,
    Fail,
    /// Wait for the notify, then succeed
    WaitFor(Arc<Notify>),
}

#[derive(Default)]
pub struct StubGateway {
    pub analysis_fails: bool,
    pub proposals_fail: bool,
    /// keyed by camera angle; missing keys succeed
    pub images: HashMap<String, Outcome>,
    /// keyed by motion style; missing keys succeed
    pub videos: HashMap<String, Outcome>,
    pub analyze_calls: AtomicUsize,
    pub propose_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    pub video_calls: AtomicUsize,
    pub video_seeds: std::sync::Mutex<Vec<Vec<u8>>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, angle: &str, outcome: Outcome) -> Self {
        self.images.insert(angle.to_string(), outcome);
        self
    }

    pub fn with_video(mut self, motion_style: &str, outcome: Outcome) -> Self {
        self.videos.insert(motion_style.to_string(), outcome);
        self
    }

    pub fn shared(self) -> (Arc<StubGateway>, SharedGateway) {
        let stub = Arc::new(self);
        let gateway: SharedGateway = stub.clone();
        (stub, gateway)
    }
}

pub fn sample_analysis() -> AnalysisResult {
    AnalysisResult {
        typology: "mid-rise housing".to_string(),
        geometry: "two offset bars".to_string(),
        structural_logic: "concrete frame on a podium".to_string(),
        missing_elements: vec!["window reveals".to_string(), "landscape".to_string()],
    }
}

pub fn sample_proposals() -> Vec<VisualProposal> {
    ["warm", "stark", "verdant"]
        .iter()
        .map(|name| VisualProposal {
            id: format!("prop-{}", name),
            title: format!("{} direction", name),
            description: format!("A {} reading of the massing", name),
            material_palette: "concrete, oak".to_string(),
            lighting: "late afternoon".to_string(),
        })
        .collect()
}

async fn resolve(outcome: Option<&Outcome>, what: &'static str) -> Result<(), GatewayError> {
    match outcome {
        None | Some(Outcome::Succeed) => Ok(()),
        Some(Outcome::Fail) => Err(GatewayError::EmptyResponse(what)),
        Some(Outcome::WaitFor(notify)) => {
            notify.notified().await;
            Ok(())
        }
    }
}

#[async_trait]
impl GenerationGateway for StubGateway {
    async fn ensure_credential(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn connect(&self, _api_key: String) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn analyze(&self, _image: &[u8]) -> Result<AnalysisResult, GatewayError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if self.analysis_fails {
            return Err(GatewayError::EmptyResponse("Failed to analyze image"));
        }
        Ok(sample_analysis())
    }

    async fn propose(
        &self,
        _analysis: &AnalysisResult,
        _style: &StyleConfig,
    ) -> Result<Vec<VisualProposal>, GatewayError> {
        self.propose_calls.fetch_add(1, Ordering::SeqCst);
        if self.proposals_fail {
            return Err(GatewayError::EmptyResponse("Failed to generate proposals"));
        }
        Ok(sample_proposals())
    }

    async fn render_image(
        &self,
        _massing: &[u8],
        _proposal: &VisualProposal,
        _config: &ArchConfig,
        camera_angle: &str,
    ) -> Result<RenderedImage, GatewayError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        resolve(self.images.get(camera_angle), "No image generated").await?;
        Ok(RenderedImage {
            mime_type: "image/png".to_string(),
            data: camera_angle.as_bytes().to_vec(),
        })
    }

    async fn render_video(
        &self,
        seed: &[u8],
        video: &VideoConfig,
        _config: &ArchConfig,
    ) -> Result<RenderedVideo, GatewayError> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seeds) = self.video_seeds.lock() {
            seeds.push(seed.to_vec());
        }
        resolve(self.videos.get(&video.motion_style), "Video generation failed").await?;
        Ok(RenderedVideo {
            mime_type: "video/mp4".to_string(),
            data: video.motion_style.as_bytes().to_vec(),
            source_uri: format!("https://files.test/{}", video.motion_style.replace(' ', "-")),
        })
    }
}
