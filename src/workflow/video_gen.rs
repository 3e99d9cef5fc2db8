// Video generation step - one long-running render per configured video
use super::job::OneShotJob;
use super::slots::{SlotStatus, SlotTable};
use crate::config::ArchConfig;
use crate::error::SlotError;
use crate::gateway::SharedGateway;
use crate::types::{AssetContent, AssetKind, GeneratedAsset};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-slot status and result tables, both indexed by video slot.
#[derive(Debug, Clone)]
pub struct VideoBoard {
    statuses: Vec<SlotStatus>,
    results: SlotTable<GeneratedAsset>,
    errors: SlotTable<String>,
}

impl VideoBoard {
    pub fn new(slots: usize) -> Self {
        Self {
            statuses: vec![SlotStatus::Initializing; slots],
            results: SlotTable::new(slots),
            errors: SlotTable::new(slots),
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn status(&self, slot: usize) -> Option<SlotStatus> {
        self.statuses.get(slot).copied()
    }

    pub fn result(&self, slot: usize) -> Option<&GeneratedAsset> {
        self.results.get(slot)
    }

    pub fn error(&self, slot: usize) -> Option<&str> {
        self.errors.get(slot).map(String::as_str)
    }

    pub fn all_settled(&self) -> bool {
        self.statuses.iter().all(|s| s.is_terminal())
    }

    fn transition(&mut self, slot: usize, next: SlotStatus) -> Result<(), SlotError> {
        let len = self.statuses.len();
        let current = self
            .statuses
            .get_mut(slot)
            .ok_or(SlotError::OutOfRange { index: slot, len })?;
        if !current.can_advance_to(next) {
            return Err(SlotError::InvalidTransition {
                index: slot,
                from: *current,
                to: next,
            });
        }
        *current = next;
        Ok(())
    }

    fn start(&mut self, slot: usize) -> Result<(), SlotError> {
        self.transition(slot, SlotStatus::Generating)
    }

    fn complete(&mut self, slot: usize, asset: GeneratedAsset) -> Result<(), SlotError> {
        self.transition(slot, SlotStatus::Complete)?;
        self.results.fill(slot, asset)
    }

    fn fail(&mut self, slot: usize, reason: String) -> Result<(), SlotError> {
        self.transition(slot, SlotStatus::Failed)?;
        self.errors.fill(slot, reason)
    }
}

/// One rendered sequence card
#[derive(Debug, Clone, Serialize)]
pub struct VideoSlotView {
    pub slot: usize,
    pub status: SlotStatus,
    pub status_label: &'static str,
    pub motion_style: String,
    pub camera_movements: String,
    pub duration_seconds: u32,
    pub download_name: String,
    pub asset: Option<GeneratedAsset>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoGenView {
    pub seed_asset_id: Option<String>,
    pub all_settled: bool,
    pub slots: Vec<VideoSlotView>,
}

pub fn download_name(slot: usize) -> String {
    format!("sequence_0{}.mp4", slot + 1)
}

pub struct VideoGenStep {
    config: Arc<ArchConfig>,
    board: Arc<RwLock<VideoBoard>>,
    seed_asset_id: Option<String>,
    job: OneShotJob,
}

impl VideoGenStep {
    pub fn new(config: Arc<ArchConfig>) -> Self {
        let slots = config.video_generation.videos.len();
        Self {
            config,
            board: Arc::new(RwLock::new(VideoBoard::new(slots))),
            seed_asset_id: None,
            job: OneShotJob::new("video_generation"),
        }
    }

    /// Seed every configured video with the first handed-over image.
    /// Returns false if already started or there is no seed.
    pub fn activate(&mut self, gateway: SharedGateway, source_images: &[GeneratedAsset]) -> bool {
        if self.job.is_started() {
            return false;
        }
        let Some(seed) = source_images.first() else {
            tracing::warn!("No generated images to seed video generation");
            return false;
        };
        self.seed_asset_id = Some(seed.id.clone());

        let seed = Arc::new(seed.content.data.clone());
        let config = self.config.clone();
        let board = self.board.clone();

        self.job.start(async move {
            let videos = &config.video_generation.videos;
            tracing::info!("🎬 Generating {} cinematic sequences", videos.len());

            let handles: Vec<_> = (0..videos.len())
                .map(|slot| {
                    let gateway = gateway.clone();
                    let seed = seed.clone();
                    let config = config.clone();
                    let board = board.clone();

                    tokio::spawn(async move {
                        if let Err(e) = board.write().await.start(slot) {
                            tracing::warn!(slot, "Video slot not started: {}", e);
                            return;
                        }

                        let video = &config.video_generation.videos[slot];
                        let result = gateway.render_video(&seed, video, &config).await;

                        let mut board = board.write().await;
                        let recorded = match result {
                            Ok(rendered) => {
                                tracing::info!(slot, "✅ Sequence {} ready ({} bytes)", slot + 1, rendered.data.len());
                                let content = AssetContent::inline(rendered.mime_type, rendered.data)
                                    .with_source_uri(rendered.source_uri);
                                let asset =
                                    GeneratedAsset::new(AssetKind::Video, slot, content, video.motion_style.clone());
                                board.complete(slot, asset)
                            }
                            Err(e) => {
                                tracing::error!(slot, "Failed to generate video {}: {}", slot, e);
                                board.fail(slot, e.public_message().to_string())
                            }
                        };
                        if let Err(e) = recorded {
                            tracing::warn!(slot, "Video result dropped: {}", e);
                        }
                    })
                })
                .collect();

            for (slot, joined) in join_all(handles).await.into_iter().enumerate() {
                if let Err(e) = joined {
                    tracing::error!(slot, "Video task aborted: {}", e);
                    let mut board = board.write().await;
                    if board.status(slot).is_some_and(|s| !s.is_terminal()) {
                        if board.status(slot) == Some(SlotStatus::Initializing) {
                            let _ = board.start(slot);
                        }
                        let _ = board.fail(slot, "Video task aborted".to_string());
                    }
                }
            }

            tracing::info!("🏁 Video generation settled");
        })
    }

    pub fn is_active(&self) -> bool {
        self.job.is_started()
    }

    pub async fn board(&self) -> VideoBoard {
        self.board.read().await.clone()
    }

    pub async fn snapshot(&self) -> VideoGenView {
        let board = self.board.read().await;
        let slots = self
            .config
            .video_generation
            .videos
            .iter()
            .enumerate()
            .map(|(slot, video)| {
                let status = board.status(slot).unwrap_or(SlotStatus::Initializing);
                VideoSlotView {
                    slot,
                    status,
                    status_label: status.label(),
                    motion_style: video.motion_style.clone(),
                    camera_movements: video.camera_movements.join(" + "),
                    duration_seconds: video.duration_seconds,
                    download_name: download_name(slot),
                    asset: board.result(slot).cloned(),
                    error: board.error(slot).map(str::to_string),
                }
            })
            .collect();

        VideoGenView {
            seed_asset_id: self.seed_asset_id.clone(),
            all_settled: board.all_settled(),
            slots,
        }
    }

    pub async fn rendered(&self, slot: usize) -> Option<GeneratedAsset> {
        self.board.read().await.result(slot).cloned()
    }

    pub async fn settle(&mut self) {
        self.job.join().await;
    }
}
