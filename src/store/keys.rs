//! Key and field names shared with the external routers.

/// Hash written by the session router: `session_id`, `mode`.
pub fn device(device_id: &str) -> String {
    format!("shpd-data:{device_id}")
}

/// Frame counters of one session. Shares the `shpd-data:` prefix the metrics
/// router reads; session ids and device ids never collide.
pub fn session_counters(session_id: &str) -> String {
    format!("shpd-data:{session_id}")
}

pub fn metrics(session_id: &str) -> String {
    format!("metricas:{session_id}")
}

pub fn calibration(session_id: &str) -> String {
    format!("calib:{session_id}")
}

pub fn raw_frame(session_id: &str) -> String {
    format!("raw_frame:{session_id}")
}

pub fn analysis(session_id: &str) -> String {
    format!("analysis:{session_id}")
}

pub fn timeline(session_id: &str) -> String {
    format!("timeline:{session_id}")
}

pub fn alert_threshold(device_id: &str) -> String {
    format!("alert_threshold:{device_id}")
}

pub const FIELD_SESSION_ID: &str = "session_id";
pub const FIELD_MODE: &str = "mode";

pub const GOOD_FRAMES: &str = "good_frames";
pub const BAD_FRAMES: &str = "bad_frames";
pub const ALERT_COUNT: &str = "alert_count";
pub const BAD_TRANSITIONS: &str = "transiciones_malas";
pub const SEATED_TIME: &str = "tiempo_sentado";
pub const STANDING_TIME: &str = "tiempo_parado";

pub const MAILBOX_FLAG: &str = "flag_alert";
pub const MAILBOX_BAD_TIME: &str = "bad_time";

pub const CALIB_GOOD_TIME: &str = "good_time";
pub const CALIB_BAD_TIME: &str = "bad_time";
