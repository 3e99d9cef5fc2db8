// gateway.rs - Seam between the workflow and the remote generation service
use crate::config::{ArchConfig, StyleConfig, VideoConfig};
use crate::error::GatewayError;
use crate::types::{AnalysisResult, VisualProposal};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Image bytes returned by a render request
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Finished video resource, already downloaded
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub source_uri: String,
}

/// Remote multimodal generation service used by every workflow step.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Succeeds when a usable credential is present.
    async fn ensure_credential(&self) -> Result<(), GatewayError>;

    /// Replace the credential at runtime.
    async fn connect(&self, api_key: String) -> Result<(), GatewayError>;

    async fn analyze(&self, image: &[u8]) -> Result<AnalysisResult, GatewayError>;

    async fn propose(
        &self,
        analysis: &AnalysisResult,
        style: &StyleConfig,
    ) -> Result<Vec<VisualProposal>, GatewayError>;

    async fn render_image(
        &self,
        massing: &[u8],
        proposal: &VisualProposal,
        config: &ArchConfig,
        camera_angle: &str,
    ) -> Result<RenderedImage, GatewayError>;

    /// Submits a long-running job and resolves once its resource is downloaded.
    async fn render_video(
        &self,
        seed: &[u8],
        video: &VideoConfig,
        config: &ArchConfig,
    ) -> Result<RenderedVideo, GatewayError>;
}

pub type SharedGateway = Arc<dyn GenerationGateway>;

/// Fixed-interval polling with an upper bound on total wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(900),
        }
    }
}

/// Sleep one interval, then fetch, until `fetch` yields a value.
/// Fails with `GatewayError::Timeout` once another interval would pass `max_wait`.
pub async fn poll_until_done<T, F, Fut>(
    policy: &PollPolicy,
    operation: &str,
    mut fetch: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, GatewayError>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if started.elapsed() + policy.interval > policy.max_wait {
            tracing::warn!(
                operation = %operation,
                attempts,
                "⏱️ Video job still running after {}s, giving up",
                started.elapsed().as_secs()
            );
            return Err(GatewayError::Timeout {
                operation: operation.to_string(),
                waited_secs: started.elapsed().as_secs(),
            });
        }

        sleep(policy.interval).await;
        attempts += 1;

        if let Some(done) = fetch().await? {
            tracing::debug!(operation = %operation, attempts, "Video job finished");
            return Ok(done);
        }
        tracing::debug!(operation = %operation, attempts, "Video job not done yet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_when_job_reports_done() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy::default();

        let result = poll_until_done(&policy, "operations/abc", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(if n == 3 { Some("uri") } else { None }) }
        })
        .await
        .unwrap();

        assert_eq!(result, "uri");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_after_max_wait() {
        let calls = AtomicU32::new(0);
        let policy = PollPolicy {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(12),
        };

        let err = poll_until_done::<(), _, _>(&policy, "operations/slow", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout { waited_secs: 10, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_propagates_fetch_errors() {
        let policy = PollPolicy::default();
        let err = poll_until_done::<(), _, _>(&policy, "operations/broken", || async {
            Err(GatewayError::VideoFailed("quota".to_string()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::VideoFailed(_)));
    }
}
