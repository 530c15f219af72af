use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::worker::{analysis_loop, AnalysisJob, AnalysisWorker};

/// Owns the lifetime of the single analysis consumer task.
pub struct AnalysisController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl AnalysisController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn start(
        &mut self,
        worker: AnalysisWorker,
        jobs: mpsc::UnboundedReceiver<AnalysisJob>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("analysis worker already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(analysis_loop(worker, jobs, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            info!("Waiting for analysis worker to stop");
            handle
                .await
                .context("analysis worker task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for AnalysisController {
    fn default() -> Self {
        Self::new()
    }
}
