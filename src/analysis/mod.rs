pub mod buffer;
pub mod controller;
pub mod preprocess;
pub mod worker;

pub use buffer::ConsistencyBuffer;
pub use controller::AnalysisController;
pub use worker::{AnalysisJob, AnalysisQueue, AnalysisWorker, TimelineEvent};
