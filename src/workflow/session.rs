// Session - one run of the workflow plus the controllers of its steps
use super::analysis::{AnalysisState, AnalysisStep};
use super::image_gen::{ImageGenStep, ImageGenView};
use super::proposal::{ProposalStep, ProposalView};
use super::state::{ActiveStep, Workflow};
use super::upload::UploadForm;
use super::video_gen::{VideoGenStep, VideoGenView};
use crate::config::ArchConfig;
use crate::error::WorkflowError;
use crate::gateway::SharedGateway;
use crate::types::{AnalysisResult, GeneratedAsset, VisualProposal, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// What the active step currently shows
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepView {
    Upload,
    Analysis(AnalysisState),
    Proposal(ProposalView),
    ImageGen(ImageGenView),
    VideoGen(VideoGenView),
    /// Step reached without the artifacts it needs; nothing to show
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepMarker {
    pub step: WorkflowStep,
    pub label: &'static str,
    pub done: bool,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub step: WorkflowStep,
    pub progress: Vec<StepMarker>,
    pub config: ArchConfig,
    pub analysis: Option<AnalysisResult>,
    pub selected_proposal: Option<VisualProposal>,
    pub view: StepView,
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    workflow: Workflow,
    analysis: Option<AnalysisStep>,
    proposal: Option<ProposalStep>,
    images: Option<ImageGenStep>,
    videos: Option<VideoGenStep>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            workflow: Workflow::new(),
            analysis: None,
            proposal: None,
            images: None,
            videos: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn step(&self) -> WorkflowStep {
        self.workflow.step()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    fn require_step(&self, expected: WorkflowStep, action: &'static str) -> Result<(), WorkflowError> {
        if self.workflow.step() == expected {
            Ok(())
        } else {
            Err(WorkflowError::WrongStep {
                action,
                actual: self.workflow.step(),
            })
        }
    }

    pub fn submit_upload(&mut self, form: &UploadForm) -> Result<(), WorkflowError> {
        self.require_step(WorkflowStep::Upload, "submit an upload")?;
        let output = form.submit()?;
        self.workflow.submit_upload(output)
    }

    /// Start the controller of the current step if it is not running yet.
    /// Returns whether any work was scheduled.
    pub fn activate(&mut self, gateway: &SharedGateway) -> bool {
        match self.workflow.active_step() {
            None | Some(ActiveStep::Upload) => false,
            Some(ActiveStep::Analysis { image }) => self
                .analysis
                .get_or_insert_with(AnalysisStep::new)
                .activate(gateway.clone(), image.clone()),
            Some(ActiveStep::Proposal { analysis, config }) => self
                .proposal
                .get_or_insert_with(ProposalStep::new)
                .activate(gateway.clone(), analysis.clone(), config.clone()),
            Some(ActiveStep::ImageGen {
                base_image,
                proposal,
                config,
            }) => self
                .images
                .get_or_insert_with(|| ImageGenStep::new(config.clone()))
                .activate(gateway.clone(), base_image.clone(), proposal.clone()),
            Some(ActiveStep::VideoGen { source_images, config }) => self
                .videos
                .get_or_insert_with(|| VideoGenStep::new(config.clone()))
                .activate(gateway.clone(), source_images),
        }
    }

    pub async fn proceed_analysis(&mut self) -> Result<(), WorkflowError> {
        self.require_step(WorkflowStep::Analysis, "proceed from analysis")?;
        let controller = self.analysis.as_ref().ok_or(WorkflowError::NotReady("Analysis"))?;
        let result = controller.proceed().await?;
        self.workflow.complete_analysis(result)
    }

    pub async fn select_proposal(&mut self, id: &str) -> Result<(), WorkflowError> {
        self.require_step(WorkflowStep::Proposal, "select a proposal")?;
        let controller = self.proposal.as_mut().ok_or(WorkflowError::NotReady("Proposal"))?;
        controller.select(id).await
    }

    pub async fn confirm_proposal(&mut self) -> Result<(), WorkflowError> {
        self.require_step(WorkflowStep::Proposal, "confirm a proposal")?;
        let controller = self.proposal.as_ref().ok_or(WorkflowError::NotReady("Proposal"))?;
        let proposal = controller.confirm().await?;
        tracing::info!("🎯 Direction chosen: {}", proposal.title);
        self.workflow.select_proposal(proposal)
    }

    pub async fn approve_images(&mut self) -> Result<(), WorkflowError> {
        self.require_step(WorkflowStep::ImageGen, "approve images")?;
        let controller = self.images.as_ref().ok_or(WorkflowError::NotReady("Image generation"))?;
        let assets = controller.approve().await?;
        self.workflow.complete_images(assets)
    }

    pub async fn image_asset(&self, slot: usize) -> Option<GeneratedAsset> {
        match &self.images {
            Some(controller) => controller.rendered(slot).await,
            None => None,
        }
    }

    pub async fn video_asset(&self, slot: usize) -> Option<GeneratedAsset> {
        match &self.videos {
            Some(controller) => controller.rendered(slot).await,
            None => None,
        }
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let current = self.workflow.step();
        let progress = WorkflowStep::ALL
            .iter()
            .map(|&step| StepMarker {
                step,
                label: step.label(),
                done: step < current,
                current: step == current,
            })
            .collect();

        let view = match (current, self.workflow.active_step()) {
            (_, None) => StepView::Empty,
            (WorkflowStep::Upload, _) => StepView::Upload,
            (WorkflowStep::Analysis, _) => match &self.analysis {
                Some(c) => StepView::Analysis(c.snapshot().await),
                None => StepView::Analysis(AnalysisState::Loading),
            },
            (WorkflowStep::Proposal, _) => match &self.proposal {
                Some(c) => StepView::Proposal(c.snapshot().await),
                None => StepView::Proposal(ProposalStep::new().snapshot().await),
            },
            (WorkflowStep::ImageGen, _) => match &self.images {
                Some(c) => StepView::ImageGen(c.snapshot().await),
                None => StepView::ImageGen(ImageGenStep::new(self.workflow.config().clone()).snapshot().await),
            },
            (WorkflowStep::VideoGen, _) => match &self.videos {
                Some(c) => StepView::VideoGen(c.snapshot().await),
                None => StepView::VideoGen(VideoGenStep::new(self.workflow.config().clone()).snapshot().await),
            },
        };

        RunSnapshot {
            id: self.id,
            created_at: self.created_at,
            step: current,
            progress,
            config: self.workflow.config().as_ref().clone(),
            analysis: self.workflow.analysis().cloned(),
            selected_proposal: self.workflow.selected_proposal().cloned(),
            view,
        }
    }

    /// Wait for every started controller to finish its work.
    pub async fn settle(&mut self) {
        if let Some(c) = self.analysis.as_mut() {
            c.settle().await;
        }
        if let Some(c) = self.proposal.as_mut() {
            c.settle().await;
        }
        if let Some(c) = self.images.as_mut() {
            c.settle().await;
        }
        if let Some(c) = self.videos.as_mut() {
            c.settle().await;
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

struct StoredRun {
    created_at: DateTime<Utc>,
    session: SharedSession,
}

/// In-memory registry of runs. Nothing is persisted; runs older than
/// `max_age` are swept out on every insert and by `cleanup_old_runs`.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, StoredRun>>>,
    max_age: Option<chrono::Duration>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(max_age: chrono::Duration) -> Self {
        Self {
            max_age: Some(max_age),
            ..Self::default()
        }
    }

    pub async fn insert(&self, session: Session) -> (Uuid, SharedSession) {
        if let Some(max_age) = self.max_age {
            self.cleanup_old_runs(max_age).await;
        }

        let id = session.id();
        let created_at = session.created_at;
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(
            id,
            StoredRun {
                created_at,
                session: shared.clone(),
            },
        );
        tracing::info!(run_id = %id, "🆕 Run created");
        (id, shared)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(id).map(|run| run.session.clone())
    }

    /// Drop runs created more than `max_age` ago. Returns how many were removed.
    pub async fn cleanup_old_runs(&self, max_age: chrono::Duration) -> usize {
        match Utc::now().checked_sub_signed(max_age) {
            Some(cutoff) => self.evict_created_before(cutoff).await,
            None => 0,
        }
    }

    /// Sweep using the store's own `max_age`, if it has one.
    pub async fn sweep(&self) -> usize {
        match self.max_age {
            Some(max_age) => self.cleanup_old_runs(max_age).await,
            None => 0,
        }
    }

    pub async fn evict_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, run| {
            let keep = run.created_at >= cutoff;
            if !keep {
                tracing::debug!("🗑️ Cleaned up old run: {}", id);
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{Outcome, StubGateway};
    use crate::workflow::upload::ImageInput;
    use std::sync::atomic::Ordering;

    fn form() -> UploadForm {
        UploadForm::new().with_image(ImageInput::Bytes(vec![0x89, 0x50, 0x4E, 0x47]))
    }

    #[tokio::test]
    async fn test_end_to_end_with_one_failed_render() {
        let (stub, gateway) = StubGateway::new().with_image("close", Outcome::Fail).shared();
        let mut session = Session::new();
        assert!(!session.activate(&gateway));

        session.submit_upload(&form()).unwrap();
        assert!(session.activate(&gateway));
        assert!(!session.activate(&gateway));
        session.settle().await;
        session.proceed_analysis().await.unwrap();

        session.activate(&gateway);
        session.settle().await;
        assert!(matches!(session.confirm_proposal().await, Err(WorkflowError::NoSelection)));
        session.select_proposal("prop-verdant").await.unwrap();
        session.confirm_proposal().await.unwrap();
        assert_eq!(session.step(), WorkflowStep::ImageGen);

        session.activate(&gateway);
        session.settle().await;
        match session.snapshot().await.view {
            StepView::ImageGen(view) => {
                assert_eq!(view.completed, 4);
                assert!(view.can_advance);
            }
            other => panic!("expected image view, got {:?}", other),
        }
        session.approve_images().await.unwrap();
        assert_eq!(session.workflow().generated_images().len(), 3);

        session.activate(&gateway);
        session.settle().await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.step, WorkflowStep::VideoGen);
        assert_eq!(snapshot.selected_proposal.map(|p| p.id), Some("prop-verdant".to_string()));
        assert!(snapshot.progress[..4].iter().all(|m| m.done));
        match snapshot.view {
            StepView::VideoGen(view) => {
                assert!(view.all_settled);
                assert_eq!(
                    view.slots[0].asset.as_ref().and_then(|a| a.prompt_used.as_deref()),
                    Some("slow cinematic")
                );
            }
            other => panic!("expected video view, got {:?}", other),
        }
        assert!(session.video_asset(1).await.is_some());
        assert!(session.image_asset(2).await.is_none());

        // seed is the first image to arrive, which is never the failed slot
        let seeds = stub.video_seeds.lock().unwrap().clone();
        let first = session.workflow().generated_images()[0].content.data.clone();
        assert!(seeds.iter().all(|s| *s == first));
        assert_eq!(stub.analyze_calls.load(Ordering::SeqCst), 1);
        assert_eq!(stub.propose_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_actions_out_of_order_are_rejected() {
        let (_stub, gateway) = StubGateway::new().shared();
        let mut session = Session::new();
        assert!(matches!(
            session.approve_images().await,
            Err(WorkflowError::WrongStep { .. })
        ));

        session.submit_upload(&form()).unwrap();
        assert!(matches!(
            session.proceed_analysis().await,
            Err(WorkflowError::NotReady(_))
        ));
        session.activate(&gateway);
        session.settle().await;
        assert!(session.submit_upload(&form()).is_err());
        assert_eq!(session.step(), WorkflowStep::Analysis);
    }

    #[tokio::test]
    async fn test_failed_analysis_blocks_the_run() {
        let stub = StubGateway {
            analysis_fails: true,
            ..Default::default()
        };
        let (_stub, gateway) = stub.shared();
        let mut session = Session::new();
        session.submit_upload(&form()).unwrap();
        session.activate(&gateway);
        session.settle().await;

        assert!(matches!(
            session.snapshot().await.view,
            StepView::Analysis(AnalysisState::Error(_))
        ));
        assert!(session.proceed_analysis().await.is_err());
        assert_eq!(session.step(), WorkflowStep::Analysis);
    }

    #[tokio::test]
    async fn test_store_hands_out_shared_sessions() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);
        let (id, _) = store.insert(Session::new()).await;
        let found = store.get(&id).await.unwrap();
        assert_eq!(found.lock().await.id(), id);
        assert!(store.get(&Uuid::new_v4()).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_old_runs_are_evicted_by_age() {
        let store = SessionStore::new();
        let mut stale = Session::new();
        stale.created_at = Utc::now() - chrono::Duration::hours(48);
        let (stale_id, _) = store.insert(stale).await;
        let (fresh_id, _) = store.insert(Session::new()).await;

        assert_eq!(store.cleanup_old_runs(chrono::Duration::hours(24)).await, 1);
        assert!(store.get(&stale_id).await.is_none());
        assert!(store.get(&fresh_id).await.is_some());

        // a cutoff before every creation time keeps everything
        assert_eq!(store.evict_created_before(Utc::now() - chrono::Duration::hours(1)).await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_sweeps_when_max_age_is_set() {
        let store = SessionStore::with_max_age(chrono::Duration::hours(1));
        let mut stale = Session::new();
        stale.created_at = Utc::now() - chrono::Duration::hours(2);
        let (stale_id, _) = store.insert(stale).await;
        assert_eq!(store.len().await, 1);

        let (fresh_id, _) = store.insert(Session::new()).await;
        assert!(store.get(&stale_id).await.is_none());
        assert!(store.get(&fresh_id).await.is_some());
        assert_eq!(store.sweep().await, 0);
        assert_eq!(SessionStore::new().sweep().await, 0);
    }
}
