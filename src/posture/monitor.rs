use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;

use super::{
    alert::AlertLatch,
    geometry::{find_distance, inclination},
    landmarks::{BodyPart, PoseLandmarks},
    metrics::{round_to, PostureMetrics},
    overlay, FrameError,
};
use crate::{
    engines::LandmarkExtractor,
    store::{keys, StateStore},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureThresholds {
    /// Shoulder-to-shoulder pixel distance under which the camera is side-on.
    pub offset: f64,
    pub neck_degrees: f64,
    pub torso_degrees: f64,
}

impl Default for PostureThresholds {
    fn default() -> Self {
        Self {
            offset: 100.0,
            neck_degrees: 25.0,
            torso_degrees: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub thresholds: PostureThresholds,
    /// Frame rate assumed when turning frame counts into seconds.
    pub fps: f64,
    pub default_alert_threshold_secs: u64,
    pub metrics_history_cap: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: PostureThresholds::default(),
            fps: 15.0,
            default_alert_threshold_secs: 10,
            metrics_history_cap: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameVerdict {
    pub neck_inclination: f64,
    pub torso_inclination: f64,
    pub shoulder_offset: f64,
    pub aligned: bool,
    pub good: bool,
}

#[derive(Debug)]
pub struct FrameOutcome {
    pub frame: RgbImage,
    pub landmarks: Option<PoseLandmarks>,
    pub verdict: Option<FrameVerdict>,
    pub alert_fired: bool,
    pub metrics: Option<PostureMetrics>,
}

/// Per-session synchronous classifier.
///
/// Owns the in-memory streak counters and the alert latch; everything that
/// must survive the monitor (counters, history, mailbox, calibration times)
/// is written to the state store.
pub struct PostureMonitor {
    session_id: String,
    device_id: String,
    save_metrics: bool,
    store: Arc<dyn StateStore>,
    extractor: Arc<dyn LandmarkExtractor>,
    config: MonitorConfig,
    good_frames: u64,
    bad_frames: u64,
    latch: AlertLatch,
    time_threshold: f64,
}

impl PostureMonitor {
    pub fn new(
        session_id: String,
        device_id: String,
        save_metrics: bool,
        store: Arc<dyn StateStore>,
        extractor: Arc<dyn LandmarkExtractor>,
        config: MonitorConfig,
    ) -> Self {
        log_info!(
            "PostureMonitor created for session {} on device {} (save_metrics={})",
            session_id,
            device_id,
            save_metrics
        );

        if !save_metrics {
            let calib_key = keys::calibration(&session_id);
            match store.delete(&calib_key) {
                Ok(_) => log_debug!("{} cleared for a new calibration pass", calib_key),
                Err(err) => log_warn!("failed to reset {}: {err:#}", calib_key),
            }
        }

        let default_threshold = config.default_alert_threshold_secs as f64;
        let time_threshold =
            read_alert_threshold(store.as_ref(), &device_id).unwrap_or(default_threshold);

        Self {
            session_id,
            device_id,
            save_metrics,
            store,
            extractor,
            config,
            good_frames: 0,
            bad_frames: 0,
            latch: AlertLatch::new(),
            time_threshold,
        }
    }

    pub fn is_calibrating(&self) -> bool {
        !self.save_metrics
    }

    pub fn time_threshold(&self) -> f64 {
        self.time_threshold
    }

    pub fn process_frame(&mut self, mut frame: RgbImage) -> Result<FrameOutcome, FrameError> {
        let frame_secs = 1.0 / self.config.fps;
        let counters_key = keys::session_counters(&self.session_id);

        let pose = match self.extractor.extract(&frame) {
            Ok(Some(pose)) => pose,
            Ok(None) => {
                if self.save_metrics {
                    let result = self.store.hincr_by_float(
                        &counters_key,
                        keys::STANDING_TIME,
                        round_to(frame_secs, 1),
                    );
                    self.record("standing time", result);
                }
                return Ok(FrameOutcome {
                    frame,
                    landmarks: None,
                    verdict: None,
                    alert_fired: false,
                    metrics: None,
                });
            }
            Err(err) => return Err(FrameError::Extraction(err)),
        };

        let verdict = self.judge(&pose, frame.width(), frame.height())?;

        // Streaks and the latch always run; the counter hash is left alone
        // while calibrating.
        if verdict.good {
            self.bad_frames = 0;
            self.good_frames += 1;
            self.latch.on_good();
            if self.save_metrics {
                let result = self.store.hincr_by(&counters_key, keys::GOOD_FRAMES, 1);
                self.record("good frame counter", result);
                let result = self.store.hincr_by_float(
                    &counters_key,
                    keys::SEATED_TIME,
                    round_to(frame_secs, 1),
                );
                self.record("seated time", result);
            }
        } else {
            self.good_frames = 0;
            self.bad_frames += 1;
            let new_run = self.latch.on_bad();
            if self.save_metrics {
                let result = self.store.hincr_by(&counters_key, keys::BAD_FRAMES, 1);
                self.record("bad frame counter", result);
                if new_run {
                    let result = self.store.hincr_by(&counters_key, keys::BAD_TRANSITIONS, 1);
                    self.record("bad transition counter", result);
                }
            }
        }

        let good_time = self.good_frames as f64 / self.config.fps;
        let bad_time = self.bad_frames as f64 / self.config.fps;
        let alert_progress = if self.time_threshold > 0.0 {
            bad_time / self.time_threshold
        } else {
            1.0
        };

        let alert_fired = self.save_metrics
            && bad_time >= self.time_threshold
            && self.latch.try_fire();
        if alert_fired {
            self.raise_alert(&counters_key, bad_time);
        }

        let mut metrics = None;
        if self.save_metrics {
            let counters = self.store.hgetall(&counters_key);
            metrics = self
                .record("counter snapshot", counters)
                .map(|counters| PostureMetrics::from_counters(&counters));
            if let Some(metrics) = &metrics {
                self.persist_metrics(metrics);
            }
        } else {
            // Calibration never fires, so `bad_time` here is always the pre-alert streak.
            let calib_key = keys::calibration(&self.session_id);
            let step = round_to(frame_secs, 2);
            if good_time > 0.0 {
                let result = self
                    .store
                    .hincr_by_float(&calib_key, keys::CALIB_GOOD_TIME, step);
                self.record("calibration good time", result);
            }
            if bad_time > 0.0 {
                let result = self
                    .store
                    .hincr_by_float(&calib_key, keys::CALIB_BAD_TIME, step);
                self.record("calibration bad time", result);
            }
        }

        overlay::annotate(&mut frame, &pose, verdict.good, alert_progress);

        Ok(FrameOutcome {
            frame,
            landmarks: Some(pose),
            verdict: Some(verdict),
            alert_fired,
            metrics,
        })
    }

    fn judge(&self, pose: &PoseLandmarks, width: u32, height: u32) -> Result<FrameVerdict, FrameError> {
        let shoulder = pose.get(BodyPart::RightShoulder).to_pixel(width, height);
        let left_shoulder = pose.get(BodyPart::LeftShoulder).to_pixel(width, height);
        let ear = pose.get(BodyPart::RightEar).to_pixel(width, height);
        let hip = pose.get(BodyPart::RightHip).to_pixel(width, height);

        let neck_inclination =
            inclination(shoulder, ear).ok_or(FrameError::DegenerateGeometry("neck"))?;
        let torso_inclination =
            inclination(hip, shoulder).ok_or(FrameError::DegenerateGeometry("torso"))?;
        let shoulder_offset = find_distance(left_shoulder, shoulder);

        let thresholds = &self.config.thresholds;
        Ok(FrameVerdict {
            neck_inclination,
            torso_inclination,
            shoulder_offset,
            aligned: shoulder_offset < thresholds.offset,
            good: neck_inclination < thresholds.neck_degrees
                && torso_inclination < thresholds.torso_degrees,
        })
    }

    fn raise_alert(&mut self, counters_key: &str, bad_time: f64) {
        let result = self.store.hincr_by(counters_key, keys::ALERT_COUNT, 1);
        self.record("alert counter", result);

        let mailbox = [
            (keys::MAILBOX_FLAG.to_string(), "1".to_string()),
            (
                keys::MAILBOX_BAD_TIME.to_string(),
                round_to(bad_time, 1).to_string(),
            ),
        ];
        let result = self
            .store
            .hset_many(&keys::raw_frame(&self.session_id), &mailbox);
        self.record("raw frame mailbox", result);

        self.bad_frames = 0;
        log_info!(
            "Alert raised for session {} after {:.1}s of bad posture",
            self.session_id,
            bad_time
        );

        if let Some(threshold) = read_alert_threshold(self.store.as_ref(), &self.device_id) {
            self.time_threshold = threshold;
        }
    }

    fn persist_metrics(&self, metrics: &PostureMetrics) {
        let payload = match serde_json::to_string(metrics) {
            Ok(payload) => payload,
            Err(err) => {
                log_warn!("failed to serialize metrics for session {}: {err}", self.session_id);
                return;
            }
        };
        let result = self.store.push_bounded(
            &keys::metrics(&self.session_id),
            &payload,
            self.config.metrics_history_cap,
        );
        self.record("metrics history", result);
    }

    fn record<T>(&self, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                log_warn!("session {}: {} not persisted: {err:#}", self.session_id, what);
                None
            }
        }
    }
}

/// `None` when the key is missing, unreadable, or not a whole number of seconds.
fn read_alert_threshold(store: &dyn StateStore, device_id: &str) -> Option<f64> {
    let key = keys::alert_threshold(device_id);
    match store.get(&key) {
        Ok(Some(raw)) => match raw.trim().parse::<u64>() {
            Ok(secs) => Some(secs as f64),
            Err(_) => {
                log_warn!("ignoring non-integer {} value '{}'", key, raw);
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            log_warn!("failed to read {}: {err:#}", key);
            None
        }
    }
}
