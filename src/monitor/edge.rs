//! Debounced edge detection on a sampled digital line

use std::time::{Duration, Instant};

/// Which transitions are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low to high only
    Rising,
    /// Any change of level
    Both,
}

/// Turns raw line samples into debounced edges
///
/// After an edge is reported, further edges are ignored until the debounce
/// window has passed. For [`Edge::Both`] the reported level is reconciled
/// with the raw level as soon as the window closes, so the line's final
/// level is never lost to a bounce.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    edge: Edge,
    debounce: Duration,
    raw: bool,
    reported: bool,
    last_report: Option<Instant>,
}

impl EdgeDetector {
    /// Create a detector for a line currently at `initial`
    pub fn new(edge: Edge, debounce: Duration, initial: bool) -> Self {
        Self {
            edge,
            debounce,
            raw: initial,
            reported: initial,
            last_report: None,
        }
    }

    /// Feed one sample; returns the new level when an edge is reported
    pub fn update(&mut self, level: bool, now: Instant) -> Option<bool> {
        let previous = std::mem::replace(&mut self.raw, level);

        let settled = self
            .last_report
            .map_or(true, |at| now.duration_since(at) >= self.debounce);
        if !settled {
            return None;
        }

        let fire = match self.edge {
            Edge::Rising => !previous && level,
            Edge::Both => level != self.reported,
        };
        if !fire {
            return None;
        }

        self.reported = level;
        self.last_report = Some(now);
        Some(level)
    }
}
