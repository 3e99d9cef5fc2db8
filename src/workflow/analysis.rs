// Analysis step - one structured decomposition request per activation
use super::job::OneShotJob;
use crate::error::WorkflowError;
use crate::gateway::SharedGateway;
use crate::types::AnalysisResult;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze image structure. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum AnalysisState {
    Loading,
    Success(AnalysisResult),
    /// Retrying means starting a new run
    Error(String),
}

pub struct AnalysisStep {
    state: Arc<RwLock<AnalysisState>>,
    job: OneShotJob,
}

impl Default for AnalysisStep {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStep {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AnalysisState::Loading)),
            job: OneShotJob::new("analysis"),
        }
    }

    /// Issue the analysis request. No retry, no backoff.
    pub fn activate(&mut self, gateway: SharedGateway, image: Arc<Vec<u8>>) -> bool {
        let state = self.state.clone();
        self.job.start(async move {
            let next = match gateway.analyze(&image).await {
                Ok(result) => {
                    tracing::info!("✅ Analysis complete: {}", result.typology);
                    AnalysisState::Success(result)
                }
                Err(e) => {
                    tracing::error!("❌ Analysis failed: {}", e);
                    AnalysisState::Error(ANALYSIS_FAILED_MESSAGE.to_string())
                }
            };
            *state.write().await = next;
        })
    }

    pub fn is_active(&self) -> bool {
        self.job.is_started()
    }

    pub async fn snapshot(&self) -> AnalysisState {
        self.state.read().await.clone()
    }

    /// Manual confirmation; only a successful analysis can be carried forward.
    pub async fn proceed(&self) -> Result<AnalysisResult, WorkflowError> {
        match &*self.state.read().await {
            AnalysisState::Success(result) => Ok(result.clone()),
            _ => Err(WorkflowError::NotReady("Analysis")),
        }
    }

    pub async fn settle(&mut self) {
        self.job.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{sample_analysis, StubGateway};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_success_waits_for_manual_proceed() {
        let (stub, gateway) = StubGateway::new().shared();
        let mut step = AnalysisStep::new();
        assert_eq!(step.snapshot().await, AnalysisState::Loading);
        assert!(step.proceed().await.is_err());

        step.activate(gateway, Arc::new(vec![1, 2, 3]));
        step.settle().await;

        assert_eq!(step.snapshot().await, AnalysisState::Success(sample_analysis()));
        assert_eq!(step.proceed().await.unwrap(), sample_analysis());
        assert_eq!(stub.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_surfaces_generic_error() {
        let stub = StubGateway {
            analysis_fails: true,
            ..Default::default()
        };
        let (_stub, gateway) = stub.shared();
        let mut step = AnalysisStep::new();
        step.activate(gateway, Arc::new(vec![1]));
        step.settle().await;

        assert_eq!(
            step.snapshot().await,
            AnalysisState::Error(ANALYSIS_FAILED_MESSAGE.to_string())
        );
        assert!(matches!(step.proceed().await, Err(WorkflowError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_repeated_activation_issues_one_request() {
        let (stub, gateway) = StubGateway::new().shared();
        let mut step = AnalysisStep::new();
        let image = Arc::new(vec![1]);
        assert!(step.activate(gateway.clone(), image.clone()));
        assert!(!step.activate(gateway, image));
        step.settle().await;

        assert_eq!(stub.analyze_calls.load(Ordering::SeqCst), 1);
    }
}
