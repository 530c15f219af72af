use std::{
    fmt::Display,
    sync::{Arc, Mutex, PoisonError},
};

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use image::RgbImage;
use uuid::Uuid;

use super::{codec, frames::FrameQueue, mode::resolve_calibration, RelayContext};
use crate::{
    analysis::AnalysisJob,
    posture::{FrameError, PoseLandmarks, PostureMonitor},
    store::keys,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Counters reported when an ingest loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub published: u64,
    pub skipped: u64,
    pub jobs: u64,
}

struct Processed {
    jpeg: Vec<u8>,
    landmarks: Option<PoseLandmarks>,
    width: u32,
    height: u32,
}

/// Ingest loop for one device connection. Owns the device's monitor for as
/// long as the connection lives.
pub struct DeviceRelay {
    ctx: RelayContext,
    device_id: String,
    connection_id: Uuid,
    calibration_query: bool,
    output: Arc<FrameQueue>,
    session_id: Option<String>,
    calibrating: bool,
    monitor: Option<Arc<Mutex<PostureMonitor>>>,
    stats: RelayStats,
}

impl DeviceRelay {
    pub fn new(ctx: RelayContext, device_id: String, calibration_query: bool) -> Self {
        let output = ctx.hub.queue(&device_id);
        Self {
            ctx,
            device_id,
            connection_id: Uuid::new_v4(),
            calibration_query,
            output,
            session_id: None,
            calibrating: calibration_query,
            monitor: None,
            stats: RelayStats::default(),
        }
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    /// Runs until the frame stream ends, errors, or the server shuts down.
    pub async fn run<S, E>(mut self, frames: S) -> RelayStats
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut frames = std::pin::pin!(frames);
        log_info!(
            "[{}] ingest opened for device {} (calibration query: {})",
            self.connection_id,
            self.device_id,
            self.calibration_query
        );

        loop {
            self.refresh_session();

            let next = tokio::select! {
                next = frames.next() => next,
                _ = self.ctx.shutdown.cancelled() => {
                    log_info!("[{}] ingest stopping for shutdown", self.connection_id);
                    break;
                }
            };

            let data = match next {
                Some(Ok(data)) => data,
                Some(Err(err)) => {
                    log_warn!("[{}] ingest stream error: {err}", self.connection_id);
                    break;
                }
                None => break,
            };
            self.stats.received += 1;

            match self.relay_frame(data).await {
                Ok(()) => self.stats.published += 1,
                Err(err) => {
                    self.stats.skipped += 1;
                    log_debug!("[{}] frame skipped: {err}", self.connection_id);
                }
            }
        }

        log_info!(
            "[{}] ingest closed for device {}: {:?}",
            self.connection_id,
            self.device_id,
            self.stats
        );
        self.stats
    }

    /// Picks up session and mode changes from the device record. A store
    /// fault keeps whatever was seen last.
    fn refresh_session(&mut self) {
        let device_key = keys::device(&self.device_id);
        let record = match self.ctx.store.hgetall(&device_key) {
            Ok(record) => record,
            Err(err) => {
                log_warn!("[{}] failed to read {}: {err:#}", self.connection_id, device_key);
                return;
            }
        };

        let mode = record.get(keys::FIELD_MODE).map(String::as_str);
        self.calibrating = resolve_calibration(mode, self.calibration_query);

        let session_id = record.get(keys::FIELD_SESSION_ID).cloned();
        if session_id == self.session_id {
            return;
        }

        log_info!(
            "[{}] session changed on device {}: {:?} -> {:?}",
            self.connection_id,
            self.device_id,
            self.session_id,
            session_id
        );
        self.monitor = session_id.as_ref().map(|session_id| {
            Arc::new(Mutex::new(PostureMonitor::new(
                session_id.clone(),
                self.device_id.clone(),
                !self.calibrating,
                self.ctx.store.clone(),
                self.ctx.extractor.clone(),
                self.ctx.monitor_config.clone(),
            )))
        });
        self.session_id = session_id;
    }

    async fn relay_frame(&mut self, data: Bytes) -> Result<(), FrameError> {
        let pool = self.ctx.pool.clone();
        let frame = pool
            .run(move || codec::decode(&data))
            .await
            .map_err(FrameError::Compute)??;

        let processed = match self.monitor.clone() {
            None => self.pass_through(frame).await?,
            Some(monitor) => self.classify(monitor, frame).await?,
        };

        self.output.push(Bytes::from(processed.jpeg));

        if let Some(landmarks) = processed.landmarks {
            if !self.calibrating {
                self.hand_off(landmarks, processed.width, processed.height);
            }
        }
        Ok(())
    }

    async fn pass_through(&self, frame: RgbImage) -> Result<Processed, FrameError> {
        let quality = self.ctx.jpeg_quality;
        let (width, height) = frame.dimensions();
        let jpeg = self
            .ctx
            .pool
            .run(move || codec::encode_jpeg(&frame, quality))
            .await
            .map_err(FrameError::Compute)??;
        Ok(Processed {
            jpeg,
            landmarks: None,
            width,
            height,
        })
    }

    /// Runs the monitor on the compute pool. The relay keeps its own handle,
    /// so a task that dies loses the frame but not the monitor's state.
    async fn classify(
        &self,
        monitor: Arc<Mutex<PostureMonitor>>,
        frame: RgbImage,
    ) -> Result<Processed, FrameError> {
        let quality = self.ctx.jpeg_quality;
        let (width, height) = frame.dimensions();

        let result = self
            .ctx
            .pool
            .run(move || {
                // A panic mid-frame poisons the lock; the monitor itself is
                // only mutated after extraction succeeds.
                let mut monitor = monitor.lock().unwrap_or_else(PoisonError::into_inner);
                monitor.process_frame(frame).and_then(|outcome| {
                    let jpeg = codec::encode_jpeg(&outcome.frame, quality)?;
                    Ok((jpeg, outcome.landmarks))
                })
            })
            .await
            .map_err(|err| {
                log_error!("[{}] monitor task failed: {err:#}", self.connection_id);
                FrameError::Compute(err)
            })?;

        let (jpeg, landmarks) = result?;
        Ok(Processed {
            jpeg,
            landmarks,
            width,
            height,
        })
    }

    /// Moves a pending alert from the session's raw-frame mailbox into the
    /// analysis queue. The mailbox holds one slot, so at most one job leaves
    /// per alert no matter how often it was overwritten.
    fn hand_off(&mut self, landmarks: PoseLandmarks, width: u32, height: u32) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        let mailbox_key = keys::raw_frame(&session_id);

        let mailbox = match self.ctx.store.hgetall(&mailbox_key) {
            Ok(mailbox) => mailbox,
            Err(err) => {
                log_warn!("[{}] failed to read {}: {err:#}", self.connection_id, mailbox_key);
                return;
            }
        };
        if mailbox.get(keys::MAILBOX_FLAG).map(String::as_str) != Some("1") {
            return;
        }

        let bad_time = mailbox
            .get(keys::MAILBOX_BAD_TIME)
            .and_then(|raw| raw.parse::<f64>().ok());
        let job = AnalysisJob {
            session_id,
            frame_width: width,
            frame_height: height,
            landmarks,
            bad_time,
        };

        if let Err(err) = self.ctx.analysis.submit(job) {
            log_error!("[{}] alert not handed off: {err:#}", self.connection_id);
            return;
        }
        self.stats.jobs += 1;

        if let Err(err) = self.ctx.store.delete(&mailbox_key) {
            log_warn!("[{}] failed to clear {}: {err:#}", self.connection_id, mailbox_key);
        }
        log_debug!("[{}] alert handed off from {}", self.connection_id, mailbox_key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::analysis::AnalysisQueue;
    use crate::posture::monitor::tests::{ScriptedExtractor, Shot};
    use crate::posture::MonitorConfig;
    use crate::relay::{frames::FrameHub, pool::ComputePool};
    use crate::store::{MemoryStore, StateStore};

    struct Harness {
        store: Arc<MemoryStore>,
        ctx: RelayContext,
        jobs: mpsc::UnboundedReceiver<AnalysisJob>,
    }

    fn harness(shots: Vec<Shot>, queue_capacity: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let (analysis, jobs) = AnalysisQueue::channel();
        let ctx = RelayContext {
            store: store.clone(),
            extractor: Arc::new(ScriptedExtractor::new(shots)),
            pool: ComputePool::new(2),
            hub: FrameHub::new(queue_capacity),
            analysis,
            monitor_config: MonitorConfig::default(),
            jpeg_quality: 50,
            shutdown: CancellationToken::new(),
        };
        Harness { store, ctx, jobs }
    }

    fn jpeg() -> Bytes {
        Bytes::from(codec::encode_jpeg(&RgbImage::new(40, 30), 80).unwrap())
    }

    fn bind_session(store: &MemoryStore, session_id: &str, mode: Option<&str>) {
        let key = keys::device("cam-1");
        store.hset(&key, keys::FIELD_SESSION_ID, session_id).unwrap();
        if let Some(mode) = mode {
            store.hset(&key, keys::FIELD_MODE, mode).unwrap();
        }
    }

    fn frames(count: usize) -> impl Stream<Item = Result<Bytes, String>> {
        stream::iter((0..count).map(|_| Ok(jpeg())))
    }

    fn drain(jobs: &mut mpsc::UnboundedReceiver<AnalysisJob>) -> Vec<AnalysisJob> {
        let mut drained = Vec::new();
        while let Ok(job) = jobs.try_recv() {
            drained.push(job);
        }
        drained
    }

    #[tokio::test]
    async fn without_session_frames_pass_through() {
        let h = harness(vec![Shot::Bad; 3], 4);
        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);

        let stats = relay.run(frames(3)).await;
        assert_eq!(stats.published, 3);

        let output = h.ctx.hub.queue("cam-1");
        assert_eq!(output.len(), 3);
        let frame = codec::decode(&output.try_pop().unwrap()).unwrap();
        assert_eq!(frame.dimensions(), (40, 30));
        assert!(h.store.hgetall(&keys::session_counters("s1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn output_keeps_only_latest_frame() {
        let h = harness(vec![], 1);
        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);

        let stats = relay.run(frames(5)).await;
        assert_eq!(stats.published, 5);
        assert_eq!(h.ctx.hub.queue("cam-1").len(), 1);
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let h = harness(vec![], 4);
        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        let input = stream::iter(vec![
            Ok::<_, String>(Bytes::from_static(b"garbage")),
            Ok(jpeg()),
        ]);

        let stats = relay.run(input).await;
        assert_eq!(stats.received, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.published, 1);
    }

    #[tokio::test]
    async fn stream_error_ends_only_this_loop() {
        let h = harness(vec![], 4);
        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        let input = stream::iter(vec![Ok(jpeg()), Err("reset by peer".to_string()), Ok(jpeg())]);

        let stats = relay.run(input).await;
        assert_eq!(stats.published, 1);
        assert_eq!(h.ctx.hub.queue("cam-1").len(), 1);
    }

    #[tokio::test]
    async fn session_change_swaps_monitor() {
        let h = harness(vec![Shot::Good, Shot::Good, Shot::Bad], 4);
        bind_session(&h.store, "s1", Some("normal"));

        // The second item rebinds the device; the loop sees it on its next pass.
        let store = h.store.clone();
        let input = stream::iter(0..3).map(move |i| {
            if i == 1 {
                bind_session(&store, "s2", None);
            }
            Ok::<_, String>(jpeg())
        });

        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        relay.run(input).await;

        let s1 = h.store.hgetall(&keys::session_counters("s1")).unwrap();
        let s2 = h.store.hgetall(&keys::session_counters("s2")).unwrap();
        assert_eq!(s1.get(keys::GOOD_FRAMES).map(String::as_str), Some("2"));
        assert!(s1.get(keys::BAD_FRAMES).is_none());
        assert_eq!(s2.get(keys::BAD_FRAMES).map(String::as_str), Some("1"));
        assert!(s2.get(keys::GOOD_FRAMES).is_none());
    }

    #[tokio::test]
    async fn alerts_are_handed_off_once_per_episode() {
        let mut h = harness(vec![Shot::Bad, Shot::Bad, Shot::Good, Shot::Bad], 4);
        bind_session(&h.store, "s1", Some("normal"));
        h.store.set(&keys::alert_threshold("cam-1"), "0").unwrap();

        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        let stats = relay.run(frames(4)).await;

        let jobs = drain(&mut h.jobs);
        assert_eq!(stats.jobs, 2);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].session_id, "s1");
        assert_eq!(jobs[0].bad_time, Some(0.1));
        assert_eq!((jobs[0].frame_width, jobs[0].frame_height), (40, 30));
        assert!(h.store.hgetall(&keys::raw_frame("s1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn overwritten_mailbox_yields_one_job() {
        let mut h = harness(vec![Shot::Good, Shot::Good], 4);
        bind_session(&h.store, "s1", Some("normal"));
        let mailbox_key = keys::raw_frame("s1");
        for bad_time in ["10", "20.5"] {
            h.store
                .hset_many(
                    &mailbox_key,
                    &[
                        (keys::MAILBOX_FLAG.to_string(), "1".to_string()),
                        (keys::MAILBOX_BAD_TIME.to_string(), bad_time.to_string()),
                    ],
                )
                .unwrap();
        }

        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        relay.run(frames(2)).await;

        let jobs = drain(&mut h.jobs);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].bad_time, Some(20.5));
    }

    #[tokio::test]
    async fn calibration_never_hands_off() {
        let mut h = harness(vec![Shot::Good, Shot::Bad], 4);
        // Session bound but no mode yet: the query flag decides.
        bind_session(&h.store, "s1", None);
        let mailbox_key = keys::raw_frame("s1");
        h.store.hset(&mailbox_key, keys::MAILBOX_FLAG, "1").unwrap();

        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), true);
        assert!(relay.is_calibrating());
        relay.run(frames(2)).await;

        assert!(drain(&mut h.jobs).is_empty());
        assert_eq!(
            h.store.hget(&mailbox_key, keys::MAILBOX_FLAG).unwrap().as_deref(),
            Some("1")
        );
        let calib = h.store.hgetall(&keys::calibration("s1")).unwrap();
        assert!(calib.contains_key(keys::CALIB_GOOD_TIME));
        assert!(calib.contains_key(keys::CALIB_BAD_TIME));
    }

    #[tokio::test]
    async fn panicking_extractor_keeps_calibration_totals() {
        let h = harness(vec![Shot::Good, Shot::Panic, Shot::Good], 4);
        bind_session(&h.store, "s1", Some("calibracion"));

        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        let stats = relay.run(frames(3)).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.published, 2);

        let calib = h.store.hgetall(&keys::calibration("s1")).unwrap();
        let good: f64 = calib[keys::CALIB_GOOD_TIME].parse().unwrap();
        assert!((good - 0.14).abs() < 1e-9);
    }

    #[tokio::test]
    async fn panicking_extractor_keeps_alert_latch() {
        let mut h = harness(vec![Shot::Bad, Shot::Panic, Shot::Bad], 4);
        bind_session(&h.store, "s1", Some("normal"));
        h.store.set(&keys::alert_threshold("cam-1"), "0").unwrap();

        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);
        let stats = relay.run(frames(3)).await;
        assert_eq!(stats.skipped, 1);

        // Still the same bad run, so no second alert.
        assert_eq!(drain(&mut h.jobs).len(), 1);
        let counters = h.store.hgetall(&keys::session_counters("s1")).unwrap();
        assert_eq!(counters.get(keys::ALERT_COUNT).map(String::as_str), Some("1"));
        assert_eq!(counters.get(keys::BAD_FRAMES).map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn shutdown_stops_ingest() {
        let h = harness(vec![], 4);
        h.ctx.shutdown.cancel();
        let relay = DeviceRelay::new(h.ctx.clone(), "cam-1".into(), false);

        let stats = relay.run(stream::pending::<Result<Bytes, String>>()).await;
        assert_eq!(stats, RelayStats::default());
    }
}
