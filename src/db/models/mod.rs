pub mod posture_count;

pub use posture_count::PostureCount;
