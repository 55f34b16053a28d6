//! Animated indicator shown while an analysis runs.

use std::time::{Duration, Instant};

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Animation speed in milliseconds per frame.
const FRAME_DURATION_MS: u128 = 100;

#[derive(Debug, Clone)]
pub struct Spinner {
    start_time: Instant,
    label: String,
}

impl Spinner {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            label: label.into(),
        }
    }

    /// Spinner for a running EXPLAIN ANALYZE.
    pub fn analyzing() -> Self {
        Self::new("Analyzing")
    }

    /// Returns the current frame of the animation.
    pub fn frame(&self) -> &'static str {
        let frame_index = (self.start_time.elapsed().as_millis() / FRAME_DURATION_MS) as usize;
        FRAMES[frame_index % FRAMES.len()]
    }

    /// Returns the display string, e.g. `⠙ Analyzing (1.2s)`.
    pub fn display(&self) -> String {
        format!(
            "{} {} ({:.1}s)",
            self.frame(),
            self.label,
            self.elapsed().as_secs_f64()
        )
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
