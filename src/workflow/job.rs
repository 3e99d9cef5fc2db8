// One-shot background job owned by a step controller
use std::future::Future;
use tokio::task::JoinHandle;

/// Guards a controller's fan-out so repeated activation never schedules it twice.
#[derive(Debug, Default)]
pub struct OneShotJob {
    name: &'static str,
    started: bool,
    handle: Option<JoinHandle<()>>,
}

impl OneShotJob {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            started: false,
            handle: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        match &self.handle {
            Some(handle) => handle.is_finished(),
            None => self.started,
        }
    }

    /// Spawn `job` unless this handle already ran one. Returns whether it was spawned.
    pub fn start<F>(&mut self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.started {
            tracing::debug!(job = self.name, "Job already started, skipping");
            return false;
        }
        self.started = true;
        self.handle = Some(tokio::spawn(job));
        tracing::debug!(job = self.name, "Job started");
        true
    }

    /// Wait for the job to finish.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(job = self.name, "Job task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_start_is_ignored() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut job = OneShotJob::new("test");
        assert!(!job.is_started());

        for _ in 0..3 {
            let runs = runs.clone();
            job.start(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        job.join().await;

        assert!(job.is_started());
        assert!(job.is_finished());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_without_start_returns() {
        let mut job = OneShotJob::new("idle");
        job.join().await;
        assert!(!job.is_finished());
    }
}
