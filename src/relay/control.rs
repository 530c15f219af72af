use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::RelayContext;
use crate::store::keys;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Deserialize)]
pub struct SessionBinding {
    pub session_id: String,
    /// `"normal"` or a calibration mode; absent leaves it to the ingest query flag.
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertThreshold {
    pub seconds: u64,
}

fn store_error(err: anyhow::Error) -> (StatusCode, String) {
    log_error!("device control write failed: {err:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

/// Points a device at a session. Running ingest loops pick it up on their
/// next frame.
pub async fn bind_session(
    Path(device_id): Path<String>,
    State(ctx): State<RelayContext>,
    Json(binding): Json<SessionBinding>,
) -> Result<StatusCode, (StatusCode, String)> {
    if binding.session_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "session_id must not be empty".into()));
    }

    let key = keys::device(&device_id);
    let mut fields = vec![(keys::FIELD_SESSION_ID.to_string(), binding.session_id.clone())];
    if let Some(mode) = &binding.mode {
        fields.push((keys::FIELD_MODE.to_string(), mode.clone()));
    }

    ctx.store.delete(&key).map_err(store_error)?;
    ctx.store.hset_many(&key, &fields).map_err(store_error)?;

    log_info!(
        "device {} bound to session {} (mode {:?})",
        device_id,
        binding.session_id,
        binding.mode
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unbind_session(
    Path(device_id): Path<String>,
    State(ctx): State<RelayContext>,
) -> Result<StatusCode, (StatusCode, String)> {
    let removed = ctx
        .store
        .delete(&keys::device(&device_id))
        .map_err(store_error)?;
    if removed {
        log_info!("device {} unbound", device_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("device {device_id} has no session")))
    }
}

pub async fn set_alert_threshold(
    Path(device_id): Path<String>,
    State(ctx): State<RelayContext>,
    Json(threshold): Json<AlertThreshold>,
) -> Result<StatusCode, (StatusCode, String)> {
    ctx.store
        .set(&keys::alert_threshold(&device_id), &threshold.seconds.to_string())
        .map_err(store_error)?;
    log_info!("device {} alert threshold set to {}s", device_id, threshold.seconds);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::analysis::AnalysisQueue;
    use crate::posture::monitor::tests::ScriptedExtractor;
    use crate::posture::MonitorConfig;
    use crate::relay::{ComputePool, FrameHub};
    use crate::store::{MemoryStore, StateStore};

    fn context(store: Arc<MemoryStore>) -> RelayContext {
        let (analysis, _jobs) = AnalysisQueue::channel();
        RelayContext {
            store,
            extractor: Arc::new(ScriptedExtractor::new(vec![])),
            pool: ComputePool::new(1),
            hub: FrameHub::new(1),
            analysis,
            monitor_config: MonitorConfig::default(),
            jpeg_quality: 50,
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn rebinding_replaces_stale_mode() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());

        let status = bind_session(
            Path("cam-1".into()),
            State(ctx.clone()),
            Json(SessionBinding {
                session_id: "s1".into(),
                mode: Some("calibracion".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        bind_session(
            Path("cam-1".into()),
            State(ctx),
            Json(SessionBinding {
                session_id: "s2".into(),
                mode: None,
            }),
        )
        .await
        .unwrap();

        let record = store.hgetall(&keys::device("cam-1")).unwrap();
        assert_eq!(record.get(keys::FIELD_SESSION_ID).map(String::as_str), Some("s2"));
        assert!(!record.contains_key(keys::FIELD_MODE));
    }

    #[tokio::test]
    async fn empty_session_is_rejected() {
        let ctx = context(Arc::new(MemoryStore::new()));
        let err = bind_session(
            Path("cam-1".into()),
            State(ctx),
            Json(SessionBinding {
                session_id: " ".into(),
                mode: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unbind_and_threshold() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());

        let err = unbind_session(Path("cam-1".into()), State(ctx.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        store.hset(&keys::device("cam-1"), keys::FIELD_SESSION_ID, "s1").unwrap();
        unbind_session(Path("cam-1".into()), State(ctx.clone()))
            .await
            .unwrap();
        assert!(store.hgetall(&keys::device("cam-1")).unwrap().is_empty());

        set_alert_threshold(Path("cam-1".into()), State(ctx), Json(AlertThreshold { seconds: 4 }))
            .await
            .unwrap();
        assert_eq!(
            store.get(&keys::alert_threshold("cam-1")).unwrap().as_deref(),
            Some("4")
        );
    }
}
