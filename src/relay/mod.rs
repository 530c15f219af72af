pub mod codec;
pub mod control;
pub mod egress;
pub mod frames;
pub mod ingest;
pub mod mode;
pub mod pool;
pub mod routes;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    analysis::AnalysisQueue, engines::LandmarkExtractor, posture::MonitorConfig,
    store::StateStore,
};

pub use frames::{FrameHub, FrameQueue};
pub use ingest::{DeviceRelay, RelayStats};
pub use pool::ComputePool;

/// Collaborators shared by every device and viewer connection. Built once at
/// startup and cloned into each handler.
#[derive(Clone)]
pub struct RelayContext {
    pub store: Arc<dyn StateStore>,
    pub extractor: Arc<dyn LandmarkExtractor>,
    pub pool: ComputePool,
    pub hub: FrameHub,
    pub analysis: AnalysisQueue,
    pub monitor_config: MonitorConfig,
    pub jpeg_quality: u8,
    pub shutdown: CancellationToken,
}
