// Proposal step - candidate visual directions, one selected by the user
use super::job::OneShotJob;
use crate::config::ArchConfig;
use crate::error::WorkflowError;
use crate::gateway::SharedGateway;
use crate::types::{AnalysisResult, VisualProposal};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ProposalState {
    Loading,
    Ready { proposals: Vec<VisualProposal> },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub state: ProposalState,
    pub selected_id: Option<String>,
    /// Failure text of the request, kept for diagnostics only
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct ProposalBoard {
    state: ProposalState,
    last_error: Option<String>,
}

pub struct ProposalStep {
    board: Arc<RwLock<ProposalBoard>>,
    selected_id: Option<String>,
    job: OneShotJob,
}

impl Default for ProposalStep {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalStep {
    pub fn new() -> Self {
        Self {
            board: Arc::new(RwLock::new(ProposalBoard {
                state: ProposalState::Loading,
                last_error: None,
            })),
            selected_id: None,
            job: OneShotJob::new("proposal"),
        }
    }

    pub fn activate(&mut self, gateway: SharedGateway, analysis: AnalysisResult, config: Arc<ArchConfig>) -> bool {
        let board = self.board.clone();
        self.job.start(async move {
            match gateway.propose(&analysis, &config.style).await {
                Ok(proposals) => {
                    tracing::info!("🎨 Received {} visual directions", proposals.len());
                    board.write().await.state = ProposalState::Ready { proposals };
                }
                Err(e) => {
                    // stays loading; the run has no recovery path from here
                    tracing::error!("❌ Proposal request failed: {}", e);
                    board.write().await.last_error = Some(e.public_message().to_string());
                }
            }
        })
    }

    pub fn is_active(&self) -> bool {
        self.job.is_started()
    }

    pub async fn snapshot(&self) -> ProposalView {
        let board = self.board.read().await;
        ProposalView {
            state: board.state.clone(),
            selected_id: self.selected_id.clone(),
            last_error: board.last_error.clone(),
        }
    }

    /// Mark one candidate; replaces any earlier selection.
    pub async fn select(&mut self, id: &str) -> Result<(), WorkflowError> {
        match &self.board.read().await.state {
            ProposalState::Loading => return Err(WorkflowError::NotReady("Proposal")),
            ProposalState::Ready { proposals } => {
                if !proposals.iter().any(|p| p.id == id) {
                    return Err(WorkflowError::UnknownProposal(id.to_string()));
                }
            }
        }
        self.selected_id = Some(id.to_string());
        Ok(())
    }

    /// Manual advancement; requires exactly one selected candidate.
    pub async fn confirm(&self) -> Result<VisualProposal, WorkflowError> {
        let id = self.selected_id.as_deref().ok_or(WorkflowError::NoSelection)?;
        match &self.board.read().await.state {
            ProposalState::Ready { proposals } => proposals
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| WorkflowError::UnknownProposal(id.to_string())),
            ProposalState::Loading => Err(WorkflowError::NotReady("Proposal")),
        }
    }

    pub async fn settle(&mut self) {
        self.job.join().await;
    }
}
