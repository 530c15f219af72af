use std::collections::VecDeque;

/// Temporal majority vote over the last `capacity` classifier labels.
///
/// A label is confirmed only from a full window, and confirming clears the
/// window so the next confirmation needs fresh evidence. Between
/// confirmations the previous label is reported.
#[derive(Debug, Clone)]
pub struct ConsistencyBuffer {
    window: VecDeque<usize>,
    capacity: usize,
    min_consistency: f64,
    last_confirmed: Option<usize>,
}

impl ConsistencyBuffer {
    pub fn new(capacity: usize, min_consistency: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            min_consistency,
            last_confirmed: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn add(&mut self, label: usize) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(label);
    }

    pub fn confirm(&mut self) -> Option<usize> {
        if self.window.len() < self.capacity {
            return self.last_confirmed;
        }

        let Some((label, count)) = self.majority() else {
            return self.last_confirmed;
        };

        if count as f64 >= self.min_consistency * self.capacity as f64 {
            self.last_confirmed = Some(label);
            self.window.clear();
        }
        self.last_confirmed
    }

    /// Most frequent label; equal counts go to the lowest label index.
    fn majority(&self) -> Option<(usize, usize)> {
        let mut sorted: Vec<usize> = self.window.iter().copied().collect();
        sorted.sort_unstable();

        let mut best: Option<(usize, usize)> = None;
        for run in sorted.chunk_by(|a, b| a == b) {
            let candidate = (run[0], run.len());
            match best {
                Some((_, count)) if count >= candidate.1 => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}
