#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Armed,
    Fired,
}

/// Hysteresis latch for bad-posture alerts.
///
/// An alert may fire once per bad-posture run; any good frame re-arms it.
/// The latch also tracks whether the next bad frame starts a new run, which
/// drives the bad-transition counter.
#[derive(Debug, Clone)]
pub struct AlertLatch {
    state: AlertState,
    run_pending: bool,
}

impl Default for AlertLatch {
    fn default() -> Self {
        Self {
            state: AlertState::Armed,
            run_pending: true,
        }
    }
}

impl AlertLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == AlertState::Armed
    }

    /// Good frame: re-arm and expect a new bad run.
    pub fn on_good(&mut self) {
        self.state = AlertState::Armed;
        self.run_pending = true;
    }

    /// Bad frame. Returns true when it is the first frame of a bad run.
    pub fn on_bad(&mut self) -> bool {
        std::mem::replace(&mut self.run_pending, false)
    }

    /// Moves `Armed -> Fired`. Returns false if the latch already fired.
    pub fn try_fire(&mut self) -> bool {
        if self.state == AlertState::Armed {
            self.state = AlertState::Fired;
            true
        } else {
            false
        }
    }
}
