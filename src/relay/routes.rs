use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;

use super::{control, egress::forward_frames, ingest::DeviceRelay, mode::ModeAnnouncement, RelayContext};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Default, Deserialize)]
struct InputParams {
    calibracion: Option<String>,
}

pub fn router(ctx: RelayContext) -> Router {
    Router::new()
        .route("/video/input/{device_id}", get(video_input))
        .route("/video/output/{device_id}", get(video_output))
        .route(
            "/devices/{device_id}/session",
            put(control::bind_session).delete(control::unbind_session),
        )
        .route(
            "/devices/{device_id}/alert-threshold",
            put(control::set_alert_threshold),
        )
        .route("/health", get(health))
        .with_state(ctx)
}

async fn video_input(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    Query(params): Query<InputParams>,
    State(ctx): State<RelayContext>,
) -> impl IntoResponse {
    let calibrating = params.calibracion.as_deref() == Some("1");
    ws.on_upgrade(move |socket| handle_device(socket, ctx, device_id, calibrating))
}

async fn handle_device(socket: WebSocket, ctx: RelayContext, device_id: String, calibrating: bool) {
    let (mut sender, receiver) = socket.split();

    let announcement = match serde_json::to_string(&ModeAnnouncement::new(calibrating)) {
        Ok(payload) => payload,
        Err(err) => {
            log_warn!("failed to serialize mode announcement: {err}");
            return;
        }
    };
    if let Err(err) = sender.send(Message::Text(announcement.into())).await {
        log_warn!("device {} left before the mode announcement: {err}", device_id);
        return;
    }

    // Binary messages are frames; a close message ends the stream and
    // anything else is ignored.
    let frames = receiver
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Binary(data)) => Some(Ok(data)),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })
        });

    DeviceRelay::new(ctx, device_id, calibrating).run(frames).await;
}

async fn video_output(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    State(ctx): State<RelayContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, ctx, device_id))
}

async fn handle_viewer(socket: WebSocket, ctx: RelayContext, device_id: String) {
    let queue = ctx.hub.queue(&device_id);
    let (sender, mut receiver) = socket.split();
    let mut sink = sender.with(|frame: Bytes| future::ready(Ok::<_, axum::Error>(Message::Binary(frame))));

    let closed = async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    };

    log_info!("viewer attached to device {}", device_id);
    let sent = forward_frames(&queue, &mut sink, closed, ctx.shutdown.clone()).await;
    log_info!("viewer detached from device {} after {} frames", device_id, sent);
}

async fn health(State(ctx): State<RelayContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "devices": ctx.hub.device_count(),
        "compute_slots": ctx.pool.size(),
    }))
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
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn health_reports_devices_and_pool() {
        let (analysis, _jobs) = AnalysisQueue::channel();
        let ctx = RelayContext {
            store: Arc::new(MemoryStore::new()),
            extractor: Arc::new(ScriptedExtractor::new(vec![])),
            pool: ComputePool::new(3),
            hub: FrameHub::new(1),
            analysis,
            monitor_config: MonitorConfig::default(),
            jpeg_quality: 50,
            shutdown: CancellationToken::new(),
        };
        ctx.hub.queue("cam-1");

        let Json(json) = health(State(ctx)).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["devices"], 1);
        assert_eq!(json["compute_slots"], 3);
    }
}
