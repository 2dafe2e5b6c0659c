//! Detect/reuse alternation for the live stream.
//!
//! Detection plus matching is the expensive step, so a session runs it on
//! every other frame and annotates the frames in between with the previous
//! result. Boxes are not re-tracked; reuse frames lag by one frame.

use crate::types::DetectedFace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Detect,
    Reuse,
}

impl Phase {
    fn flipped(self) -> Phase {
        match self {
            Phase::Detect => Phase::Reuse,
            Phase::Reuse => Phase::Detect,
        }
    }
}

/// Per-session cadence state: the next phase and the last detect result.
#[derive(Debug)]
pub struct Cadence {
    next: Phase,
    cached: Vec<DetectedFace>,
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new()
    }
}

impl Cadence {
    pub fn new() -> Self {
        Self {
            next: Phase::Detect,
            cached: Vec::new(),
        }
    }

    /// Phase the next call to [`advance`](Self::advance) will run.
    pub fn phase(&self) -> Phase {
        self.next
    }

    /// Process one frame.
    ///
    /// On a detect frame `detect` runs and its result replaces the cache; on a
    /// reuse frame it is not called. Returns the faces to annotate this frame
    /// with.
    pub fn advance<F>(&mut self, detect: F) -> &[DetectedFace]
    where
        F: FnOnce() -> Vec<DetectedFace>,
    {
        if self.next == Phase::Detect {
            self.cached = detect();
        }
        self.next = self.next.flipped();
        &self.cached
    }

    pub fn reset(&mut self) {
        self.next = Phase::Detect;
        self.cached.clear();
    }
}
