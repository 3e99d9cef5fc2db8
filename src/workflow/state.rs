// Workflow - current step plus the artifacts each completed step produced
use super::upload::UploadOutput;
use crate::config::ArchConfig;
use crate::error::WorkflowError;
use crate::types::{AnalysisResult, GeneratedAsset, VisualProposal, WorkflowStep};
use std::sync::Arc;

/// State container for one run. Every advance sets its artifact and the
/// next step inside a single `&mut self` call, so the two never disagree.
#[derive(Debug, Clone)]
pub struct Workflow {
    step: WorkflowStep,
    config: Arc<ArchConfig>,
    base_image: Option<Arc<Vec<u8>>>,
    analysis: Option<AnalysisResult>,
    selected_proposal: Option<VisualProposal>,
    generated_images: Vec<GeneratedAsset>,
}

/// The controller that should be showing, with the upstream artifacts it needs.
#[derive(Debug, Clone, Copy)]
pub enum ActiveStep<'a> {
    Upload,
    Analysis {
        image: &'a Arc<Vec<u8>>,
    },
    Proposal {
        analysis: &'a AnalysisResult,
        config: &'a Arc<ArchConfig>,
    },
    ImageGen {
        base_image: &'a Arc<Vec<u8>>,
        proposal: &'a VisualProposal,
        config: &'a Arc<ArchConfig>,
    },
    VideoGen {
        source_images: &'a [GeneratedAsset],
        config: &'a Arc<ArchConfig>,
    },
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            step: WorkflowStep::Upload,
            config: Arc::new(ArchConfig::default()),
            base_image: None,
            analysis: None,
            selected_proposal: None,
            generated_images: Vec::new(),
        }
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn config(&self) -> &Arc<ArchConfig> {
        &self.config
    }

    pub fn base_image(&self) -> Option<&Arc<Vec<u8>>> {
        self.base_image.as_ref()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn selected_proposal(&self) -> Option<&VisualProposal> {
        self.selected_proposal.as_ref()
    }

    pub fn generated_images(&self) -> &[GeneratedAsset] {
        &self.generated_images
    }

    fn expect_step(&self, expected: WorkflowStep, action: &'static str) -> Result<(), WorkflowError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(WorkflowError::WrongStep {
                action,
                actual: self.step,
            })
        }
    }

    pub fn submit_upload(&mut self, upload: UploadOutput) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::Upload, "submit an upload")?;
        upload.config.check_limits().map_err(WorkflowError::ConfigOutOfRange)?;
        for warning in upload.config.warnings() {
            tracing::warn!("⚠️ Configuration: {}", warning);
        }
        self.base_image = Some(Arc::new(upload.image));
        self.config = Arc::new(upload.config);
        self.step = WorkflowStep::Analysis;
        tracing::info!("📍 Workflow advanced to {}", self.step);
        Ok(())
    }

    pub fn complete_analysis(&mut self, analysis: AnalysisResult) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::Analysis, "complete the analysis")?;
        self.analysis = Some(analysis);
        self.step = WorkflowStep::Proposal;
        tracing::info!("📍 Workflow advanced to {}", self.step);
        Ok(())
    }

    pub fn select_proposal(&mut self, proposal: VisualProposal) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::Proposal, "select a proposal")?;
        self.selected_proposal = Some(proposal);
        self.step = WorkflowStep::ImageGen;
        tracing::info!("📍 Workflow advanced to {}", self.step);
        Ok(())
    }

    pub fn complete_images(&mut self, images: Vec<GeneratedAsset>) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::ImageGen, "hand over generated images")?;
        self.generated_images = images;
        self.step = WorkflowStep::VideoGen;
        tracing::info!("📍 Workflow advanced to {}", self.step);
        Ok(())
    }

    /// Pure function of the current state; `None` when a prerequisite is missing.
    pub fn active_step(&self) -> Option<ActiveStep<'_>> {
        match self.step {
            WorkflowStep::Upload => Some(ActiveStep::Upload),
            WorkflowStep::Analysis => self
                .base_image
                .as_ref()
                .map(|image| ActiveStep::Analysis { image }),
            WorkflowStep::Proposal => self.analysis.as_ref().map(|analysis| ActiveStep::Proposal {
                analysis,
                config: &self.config,
            }),
            WorkflowStep::ImageGen => match (&self.base_image, &self.selected_proposal) {
                (Some(base_image), Some(proposal)) => Some(ActiveStep::ImageGen {
                    base_image,
                    proposal,
                    config: &self.config,
                }),
                _ => None,
            },
            WorkflowStep::VideoGen if !self.generated_images.is_empty() => Some(ActiveStep::VideoGen {
                source_images: &self.generated_images,
                config: &self.config,
            }),
            WorkflowStep::VideoGen => None,
        }
    }
}
