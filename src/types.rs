// types.rs - Artifacts passed between workflow steps
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured decomposition of the uploaded massing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub typology: String,
    pub geometry: String,
    pub structural_logic: String,
    #[serde(default)]
    pub missing_elements: Vec<String>,
}

/// One candidate visual direction offered by the proposal step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualProposal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub material_palette: String,
    pub lighting: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

/// Rendered payload of an asset. The bytes stay in memory and are served
/// through the download endpoints; snapshots only carry the metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetContent {
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub size_bytes: usize,
    /// Where the payload was fetched from, when it came from a remote job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl AssetContent {
    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            size_bytes: data.len(),
            data,
            source_uri: None,
        }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub content: AssetContent,
    /// Which camera angle or motion style produced the asset
    pub prompt_used: Option<String>,
}

impl GeneratedAsset {
    pub fn new(kind: AssetKind, slot: usize, content: AssetContent, prompt_used: impl Into<String>) -> Self {
        let prefix = match kind {
            AssetKind::Image => "img",
            AssetKind::Video => "vid",
        };
        Self {
            id: format!("{}-{}-{}", prefix, chrono::Utc::now().timestamp_millis(), slot),
            kind,
            content,
            prompt_used: Some(prompt_used.into()),
        }
    }
}

/// Steps of a run, in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStep {
    Upload,
    Analysis,
    Proposal,
    ImageGen,
    VideoGen,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 5] = [
        WorkflowStep::Upload,
        WorkflowStep::Analysis,
        WorkflowStep::Proposal,
        WorkflowStep::ImageGen,
        WorkflowStep::VideoGen,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Short label shown in the progress indicator
    pub fn label(self) -> &'static str {
        match self {
            WorkflowStep::Upload => "Source",
            WorkflowStep::Analysis => "Analyze",
            WorkflowStep::Proposal => "Direction",
            WorkflowStep::ImageGen => "Render",
            WorkflowStep::VideoGen => "Cinematic",
        }
    }

    pub fn next(self) -> Option<WorkflowStep> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::Upload => "UPLOAD",
            WorkflowStep::Analysis => "ANALYSIS",
            WorkflowStep::Proposal => "PROPOSAL",
            WorkflowStep::ImageGen => "IMAGE_GEN",
            WorkflowStep::VideoGen => "VIDEO_GEN",
        };
        f.write_str(name)
    }
}
