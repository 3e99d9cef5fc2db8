// Image generation step - one render per configured camera angle, in parallel
use super::job::OneShotJob;
use super::slots::SlotTable;
use crate::config::ArchConfig;
use crate::error::{SlotError, WorkflowError};
use crate::gateway::SharedGateway;
use crate::types::{AssetContent, AssetKind, GeneratedAsset, VisualProposal};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    Rendered(GeneratedAsset),
    Failed(String),
}

/// One cell of the render grid, addressed by slot (request index).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GridCell {
    Pending { slot: usize, label: String },
    Rendered { slot: usize, asset: GeneratedAsset },
    Failed { slot: usize, label: String },
}

/// Progress shared between the slot tasks. `assets` is in arrival order;
/// `slots` is the only way to find the asset of a given request.
#[derive(Debug, Clone)]
pub struct ImageProgress {
    total: usize,
    completed: usize,
    assets: Vec<GeneratedAsset>,
    slots: SlotTable<SlotOutcome>,
}

impl ImageProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            assets: Vec::new(),
            slots: SlotTable::new(total),
        }
    }

    fn record_success(&mut self, slot: usize, asset: GeneratedAsset) -> Result<(), SlotError> {
        self.slots.fill(slot, SlotOutcome::Rendered(asset.clone()))?;
        self.assets.push(asset);
        self.completed += 1;
        Ok(())
    }

    fn record_failure(&mut self, slot: usize, reason: String) -> Result<(), SlotError> {
        self.slots.fill(slot, SlotOutcome::Failed(reason))?;
        self.completed += 1;
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Successful renders in the order they arrived
    pub fn assets(&self) -> &[GeneratedAsset] {
        &self.assets
    }

    pub fn outcome(&self, slot: usize) -> Option<&SlotOutcome> {
        self.slots.get(slot)
    }

    /// Group finished and at least one render is usable. Does not require every slot to succeed.
    pub fn can_advance(&self) -> bool {
        self.completed == self.total && !self.assets.is_empty()
    }

    pub fn grid(&self, config: &ArchConfig) -> Vec<GridCell> {
        self.slots
            .iter()
            .map(|(slot, outcome)| match outcome {
                Some(SlotOutcome::Rendered(asset)) => GridCell::Rendered {
                    slot,
                    asset: asset.clone(),
                },
                Some(SlotOutcome::Failed(_)) => GridCell::Failed {
                    slot,
                    label: config.camera_angle(slot).to_string(),
                },
                None => GridCell::Pending {
                    slot,
                    label: config.camera_angle(slot).to_string(),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageGenView {
    pub completed: usize,
    pub total: usize,
    pub can_advance: bool,
    pub grid: Vec<GridCell>,
}

pub struct ImageGenStep {
    config: Arc<ArchConfig>,
    progress: Arc<RwLock<ImageProgress>>,
    job: OneShotJob,
}

impl ImageGenStep {
    pub fn new(config: Arc<ArchConfig>) -> Self {
        let total = config.image_generation.number_of_images;
        Self {
            config,
            progress: Arc::new(RwLock::new(ImageProgress::new(total))),
            job: OneShotJob::new("image_generation"),
        }
    }

    /// Fan out every render at once. Requests are spawned in slot order.
    pub fn activate(&mut self, gateway: SharedGateway, massing: Arc<Vec<u8>>, proposal: VisualProposal) -> bool {
        let config = self.config.clone();
        let progress = self.progress.clone();
        let proposal = Arc::new(proposal);

        self.job.start(async move {
            let total = config.image_generation.number_of_images;
            tracing::info!("🖼️ Generating {} renders for '{}'", total, proposal.title);

            let handles: Vec<_> = (0..total)
                .map(|slot| {
                    let gateway = gateway.clone();
                    let massing = massing.clone();
                    let proposal = proposal.clone();
                    let config = config.clone();
                    let progress = progress.clone();

                    tokio::spawn(async move {
                        let angle = config.camera_angle(slot).to_string();
                        let result = gateway.render_image(&massing, &proposal, &config, &angle).await;

                        let mut progress = progress.write().await;
                        let recorded = match result {
                            Ok(image) => {
                                let asset = GeneratedAsset::new(
                                    AssetKind::Image,
                                    slot,
                                    AssetContent::inline(image.mime_type, image.data),
                                    format!("Angle: {}", angle),
                                );
                                progress.record_success(slot, asset)
                            }
                            Err(e) => {
                                tracing::error!(slot, "Failed to generate image {}: {}", slot, e);
                                progress.record_failure(slot, e.public_message().to_string())
                            }
                        };
                        if let Err(e) = recorded {
                            tracing::warn!(slot, "Render result dropped: {}", e);
                        }
                    })
                })
                .collect();

            for (slot, joined) in join_all(handles).await.into_iter().enumerate() {
                if let Err(e) = joined {
                    tracing::error!(slot, "Render task aborted: {}", e);
                    let mut progress = progress.write().await;
                    if progress.outcome(slot).is_none() {
                        let _ = progress.record_failure(slot, "Render task aborted".to_string());
                    }
                }
            }

            let progress = progress.read().await;
            tracing::info!(
                "🏁 Image generation settled: {}/{} rendered",
                progress.assets().len(),
                total
            );
        })
    }

    pub fn is_active(&self) -> bool {
        self.job.is_started()
    }

    pub async fn progress(&self) -> ImageProgress {
        self.progress.read().await.clone()
    }

    pub async fn snapshot(&self) -> ImageGenView {
        let progress = self.progress.read().await;
        ImageGenView {
            completed: progress.completed(),
            total: progress.total(),
            can_advance: progress.can_advance(),
            grid: progress.grid(&self.config),
        }
    }

    /// Hand the arrival-ordered renders to the next step once the gate is met.
    pub async fn approve(&self) -> Result<Vec<GeneratedAsset>, WorkflowError> {
        let progress = self.progress.read().await;
        if !progress.can_advance() {
            return Err(WorkflowError::NotReady("Image generation"));
        }
        Ok(progress.assets().to_vec())
    }

    pub async fn rendered(&self, slot: usize) -> Option<GeneratedAsset> {
        match self.progress.read().await.outcome(slot) {
            Some(SlotOutcome::Rendered(asset)) => Some(asset.clone()),
            _ => None,
        }
    }

    pub async fn settle(&mut self) {
        self.job.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{sample_proposals, Outcome, StubGateway};
    use std::sync::atomic::Ordering;
    use tokio::sync::Notify;

    fn start(gateway: SharedGateway, config: ArchConfig) -> ImageGenStep {
        let mut step = ImageGenStep::new(Arc::new(config));
        step.activate(gateway, Arc::new(vec![0x89, 0x50]), sample_proposals().remove(0));
        step
    }

    #[tokio::test]
    async fn test_partial_failure_still_opens_the_gate() {
        let (stub, gateway) = StubGateway::new().with_image("close", Outcome::Fail).shared();
        let mut step = start(gateway, ArchConfig::default());
        step.settle().await;

        let progress = step.progress().await;
        assert_eq!(progress.completed(), 4);
        assert_eq!(progress.assets().len(), 3);
        assert!(progress.can_advance());
        assert!(matches!(progress.outcome(2), Some(SlotOutcome::Failed(_))));
        assert_eq!(stub.image_calls.load(Ordering::SeqCst), 4);

        let grid = step.snapshot().await.grid;
        assert!(matches!(&grid[2], GridCell::Failed { label, .. } if label == "close"));
        assert_eq!(step.approve().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_all_failures_keep_the_gate_closed() {
        let stub = ["wide", "medium", "close", "aerial"]
            .iter()
            .fold(StubGateway::new(), |stub, angle| stub.with_image(angle, Outcome::Fail));
        let (_stub, gateway) = stub.shared();
        let mut step = start(gateway, ArchConfig::default());
        step.settle().await;

        let view = step.snapshot().await;
        assert_eq!(view.completed, 4);
        assert!(!view.can_advance);
        assert!(matches!(step.approve().await, Err(WorkflowError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_grid_is_addressed_by_slot_not_arrival() {
        let gate = Arc::new(Notify::new());
        let (_stub, gateway) = StubGateway::new()
            .with_image("wide", Outcome::WaitFor(gate.clone()))
            .shared();
        let mut step = start(gateway, ArchConfig::default());

        // wait until every slot except the gated one has landed
        loop {
            if step.progress().await.completed() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let view = step.snapshot().await;
        assert!(!view.can_advance);
        assert_eq!(
            view.grid[0],
            GridCell::Pending {
                slot: 0,
                label: "wide".to_string()
            }
        );
        match &view.grid[1] {
            GridCell::Rendered { asset, .. } => assert_eq!(asset.prompt_used.as_deref(), Some("Angle: medium")),
            other => panic!("slot 1 should be rendered, got {:?}", other),
        }

        gate.notify_one();
        step.settle().await;

        let progress = step.progress().await;
        assert_eq!(progress.assets().last().and_then(|a| a.prompt_used.as_deref()), Some("Angle: wide"));
        assert!(matches!(
            progress.outcome(0),
            Some(SlotOutcome::Rendered(asset)) if asset.prompt_used.as_deref() == Some("Angle: wide")
        ));
    }

    #[tokio::test]
    async fn test_short_angle_list_uses_fallback_angle() {
        let mut config = ArchConfig::default();
        config.image_generation.number_of_images = 5;
        let (_stub, gateway) = StubGateway::new().shared();
        let mut step = start(gateway, config);
        step.settle().await;

        let asset = step.rendered(4).await.unwrap();
        assert_eq!(asset.prompt_used.as_deref(), Some("Angle: dynamic perspective"));
        assert_eq!(asset.content.data, b"dynamic perspective".to_vec());
    }

    #[tokio::test]
    async fn test_activation_is_start_once() {
        let (stub, gateway) = StubGateway::new().shared();
        let mut step = start(gateway.clone(), ArchConfig::default());
        assert!(!step.activate(gateway, Arc::new(vec![1]), sample_proposals().remove(1)));
        step.settle().await;

        assert_eq!(stub.image_calls.load(Ordering::SeqCst), 4);
        assert_eq!(step.progress().await.assets().len(), 4);
    }

    #[test]
    fn test_duplicate_slot_result_is_not_counted() {
        let mut progress = ImageProgress::new(1);
        progress.record_failure(0, "boom".to_string()).unwrap();
        assert!(progress.record_failure(0, "again".to_string()).is_err());
        assert_eq!(progress.completed(), 1);
        assert!(!progress.can_advance());
    }
}
