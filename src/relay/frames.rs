use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use axum::body::Bytes;
use tokio::sync::Notify;

/// Bounded per-device queue of encoded frames. Publishing never waits: when
/// the queue is full the oldest frame is discarded to make room.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    available: Notify,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns true when an older frame was dropped to admit this one.
    pub fn push(&self, frame: Bytes) -> bool {
        let dropped = {
            let mut frames = self.lock();
            let dropped = if frames.len() >= self.capacity {
                frames.pop_front().is_some()
            } else {
                false
            };
            frames.push_back(frame);
            dropped
        };
        self.available.notify_one();
        dropped
    }

    pub fn try_pop(&self) -> Option<Bytes> {
        self.lock().pop_front()
    }

    pub async fn pop(&self) -> Bytes {
        loop {
            let notified = self.available.notified();
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            notified.await;
        }
    }
}

/// Output queues by device id, created on first use.
#[derive(Debug, Clone)]
pub struct FrameHub {
    queues: Arc<Mutex<HashMap<String, Arc<FrameQueue>>>>,
    capacity: usize,
}

impl FrameHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    pub fn queue(&self, device_id: &str) -> Arc<FrameQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(FrameQueue::new(self.capacity)))
            .clone()
    }

    pub fn device_count(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
