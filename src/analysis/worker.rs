use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{buffer::ConsistencyBuffer, preprocess::landmark_features};
use crate::{
    db::Database,
    engines::PostureModel,
    posture::PoseLandmarks,
    relay::pool::ComputePool,
    store::{keys, StateStore},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// One alert episode handed over by the relay for fine-grained classification.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub session_id: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub landmarks: PoseLandmarks,
    /// Bad-posture seconds reported by the mailbox, when it could be parsed.
    pub bad_time: Option<f64>,
}

/// Producer side of the analysis queue. Unbounded: jobs only arrive once per
/// alert episode, so the queue stays short.
#[derive(Clone)]
pub struct AnalysisQueue {
    sender: mpsc::UnboundedSender<AnalysisJob>,
}

impl AnalysisQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AnalysisJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn submit(&self, job: AnalysisJob) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|_| anyhow!("analysis worker is not running"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub postura: String,
    pub tiempo_mala_postura: Option<f64>,
}

pub fn label_name(labels: &[String], index: Option<usize>) -> &str {
    match index {
        None => "No gesture",
        Some(index) => labels
            .get(index)
            .map(String::as_str)
            .unwrap_or("Unknown gesture"),
    }
}

pub struct AnalysisWorker {
    store: Arc<dyn StateStore>,
    db: Database,
    model: Arc<dyn PostureModel>,
    pool: ComputePool,
    buffer: ConsistencyBuffer,
    timeline_cap: usize,
}

impl AnalysisWorker {
    pub fn new(
        store: Arc<dyn StateStore>,
        db: Database,
        model: Arc<dyn PostureModel>,
        pool: ComputePool,
        buffer: ConsistencyBuffer,
        timeline_cap: usize,
    ) -> Self {
        Self {
            store,
            db,
            model,
            pool,
            buffer,
            timeline_cap,
        }
    }

    /// Classifies one job and persists the label if the buffer confirms one.
    /// Returns the persisted label name.
    pub async fn process(&mut self, job: AnalysisJob) -> Result<Option<String>> {
        let features = landmark_features(&job.landmarks, job.frame_width, job.frame_height);
        let model = self.model.clone();
        let index = self
            .pool
            .run(move || model.classify(&features))
            .await?
            .context("posture model failed")?;

        self.buffer.add(index);
        let confirmed = self.buffer.confirm();
        let labels = self.model.labels();

        let Some(confirmed) = confirmed.filter(|index| *index < labels.len()) else {
            log_debug!(
                "session {}: model said {}, nothing to persist ({})",
                job.session_id,
                index,
                label_name(labels, confirmed)
            );
            return Ok(None);
        };
        let label = labels[confirmed].clone();

        let record: Vec<(String, String)> = labels
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let score = if i == confirmed { "100" } else { "0" };
                (name.clone(), score.to_string())
            })
            .collect();
        self.store
            .hset_many(&keys::analysis(&job.session_id), &record)
            .context("failed to write analysis record")?;

        let count = self
            .db
            .increment_posture_count(&job.session_id, &label)
            .await?;
        log_debug!(
            "session {}: {} seen {} time(s)",
            job.session_id,
            label,
            count
        );

        let event = TimelineEvent {
            timestamp: Utc::now(),
            postura: label.clone(),
            tiempo_mala_postura: job.bad_time,
        };
        let payload = serde_json::to_string(&event).context("failed to serialize timeline event")?;
        self.store
            .push_bounded(&keys::timeline(&job.session_id), &payload, self.timeline_cap)
            .context("failed to append timeline event")?;

        Ok(Some(label))
    }
}

pub async fn analysis_loop(
    mut worker: AnalysisWorker,
    mut jobs: mpsc::UnboundedReceiver<AnalysisJob>,
    cancel_token: CancellationToken,
) {
    log_info!("analysis worker started");
    loop {
        tokio::select! {
            job = jobs.recv() => {
                let Some(job) = job else {
                    log_warn!("analysis queue closed");
                    break;
                };
                let session_id = job.session_id.clone();
                match worker.process(job).await {
                    Ok(Some(label)) => log_info!("session {}: posture confirmed as {}", session_id, label),
                    Ok(None) => {}
                    Err(err) => log_error!("analysis job for session {} dropped: {err:#}", session_id),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("analysis worker shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::posture::monitor::tests::upright_pose;
    use crate::store::MemoryStore;

    /// Replays scripted class indices; `None` entries fail the call.
    pub(crate) struct ScriptedModel {
        outputs: Mutex<VecDeque<Option<usize>>>,
        labels: Vec<String>,
    }

    impl ScriptedModel {
        pub(crate) fn new(outputs: impl IntoIterator<Item = Option<usize>>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into_iter().collect()),
                labels: ["encorvado", "erguido", "menton_en_mano"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }
        }
    }

    impl PostureModel for ScriptedModel {
        fn classify(&self, features: &[f32]) -> Result<usize> {
            assert_eq!(features.len(), 36);
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .flatten()
                .ok_or_else(|| anyhow!("interpreter failed"))
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    pub(crate) fn job(session_id: &str, bad_time: Option<f64>) -> AnalysisJob {
        AnalysisJob {
            session_id: session_id.to_string(),
            frame_width: 640,
            frame_height: 480,
            landmarks: upright_pose(),
            bad_time,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        db: Database,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("shpd.sqlite3")).unwrap();
        Fixture {
            _dir: dir,
            store: Arc::new(MemoryStore::new()),
            db,
        }
    }

    fn worker(fx: &Fixture, outputs: Vec<Option<usize>>, buffer_len: usize) -> AnalysisWorker {
        AnalysisWorker::new(
            fx.store.clone(),
            fx.db.clone(),
            Arc::new(ScriptedModel::new(outputs)),
            ComputePool::new(1),
            ConsistencyBuffer::new(buffer_len, 0.2),
            200,
        )
    }

    #[test]
    fn label_names() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(label_name(&labels, None), "No gesture");
        assert_eq!(label_name(&labels, Some(1)), "b");
        assert_eq!(label_name(&labels, Some(2)), "Unknown gesture");
    }

    #[tokio::test]
    async fn confirmed_label_is_persisted_everywhere() {
        let fx = fixture();
        let mut worker = worker(&fx, vec![Some(1), Some(1)], 2);

        assert_eq!(worker.process(job("s1", Some(2.0))).await.unwrap(), None);
        assert!(fx.store.hgetall(&keys::analysis("s1")).unwrap().is_empty());

        let label = worker.process(job("s1", Some(2.0))).await.unwrap();
        assert_eq!(label.as_deref(), Some("erguido"));

        let analysis = fx.store.hgetall(&keys::analysis("s1")).unwrap();
        assert_eq!(analysis.len(), 3);
        assert_eq!(analysis["erguido"], "100");
        assert_eq!(analysis["encorvado"], "0");
        assert_eq!(analysis["menton_en_mano"], "0");

        let counts = fx.db.get_posture_counts("s1").await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].posture_label, "erguido");
        assert_eq!(counts[0].count, 1);

        let timeline = fx.store.list(&keys::timeline("s1")).unwrap();
        assert_eq!(timeline.len(), 1);
        let event: TimelineEvent = serde_json::from_str(&timeline[0]).unwrap();
        assert_eq!(event.postura, "erguido");
        assert_eq!(event.tiempo_mala_postura, Some(2.0));
    }

    #[tokio::test]
    async fn model_failure_drops_job_and_worker_continues() {
        let fx = fixture();
        let mut worker = worker(&fx, vec![None, Some(0)], 1);

        assert!(worker.process(job("s1", None)).await.is_err());
        assert!(fx.store.list(&keys::timeline("s1")).unwrap().is_empty());

        let label = worker.process(job("s1", None)).await.unwrap();
        assert_eq!(label.as_deref(), Some("encorvado"));
        assert_eq!(fx.db.get_posture_counts("s1").await.unwrap()[0].count, 1);
    }

    #[tokio::test]
    async fn out_of_range_label_is_dropped() {
        let fx = fixture();
        let mut worker = worker(&fx, vec![Some(7)], 1);

        assert_eq!(worker.process(job("s1", None)).await.unwrap(), None);
        assert!(fx.store.hgetall(&keys::analysis("s1")).unwrap().is_empty());
        assert!(fx.db.get_posture_counts("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_skips_aggregate_and_timeline() {
        let fx = fixture();
        // A list under the analysis key makes the hash write fail.
        fx.store.push_bounded(&keys::analysis("s1"), "x", 1).unwrap();
        let mut worker = worker(&fx, vec![Some(2)], 1);

        assert!(worker.process(job("s1", None)).await.is_err());
        assert!(fx.db.get_posture_counts("s1").await.unwrap().is_empty());
        assert!(fx.store.list(&keys::timeline("s1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_confirmations_accumulate() {
        let fx = fixture();
        let mut worker = worker(&fx, vec![Some(0); 4], 1);
        for _ in 0..4 {
            worker.process(job("s1", Some(10.0))).await.unwrap();
        }

        let counts = fx.db.get_posture_counts("s1").await.unwrap();
        assert_eq!(counts[0].count, 4);
        assert_eq!(fx.store.list(&keys::timeline("s1")).unwrap().len(), 4);
    }
}
