//! Event handling for the TUI.
//!
//! Polls crossterm on a blocking thread so the async loop can also wait on
//! analysis results.

use crate::error::{Result, SqlPipeError};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;

/// Application events.
#[derive(Debug)]
pub enum Event {
    /// A key was pressed.
    Key(KeyEvent),
    /// The terminal was resized.
    Resize(u16, u16),
    /// A periodic tick (for animations/updates).
    Tick,
}

/// Handles terminal events.
pub struct EventHandler {
    /// Timeout for polling events.
    tick_rate: Duration,
}

impl EventHandler {
    /// Creates a new event handler with default tick rate.
    pub fn new() -> Self {
        Self {
            tick_rate: Duration::from_millis(100),
        }
    }

    /// Creates a new event handler with a custom tick rate.
    pub fn with_tick_rate(tick_rate: Duration) -> Self {
        Self { tick_rate }
    }

    /// Waits up to one tick for the next event.
    pub async fn next(&self) -> Result<Event> {
        let tick_rate = self.tick_rate;
        tokio::task::spawn_blocking(move || poll(tick_rate))
            .await
            .map_err(|e| SqlPipeError::internal(format!("Event thread failed: {e}")))?
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn poll(tick_rate: Duration) -> Result<Event> {
    if !event::poll(tick_rate)
        .map_err(|e| SqlPipeError::internal(format!("Failed to poll events: {e}")))?
    {
        return Ok(Event::Tick);
    }

    let event =
        event::read().map_err(|e| SqlPipeError::internal(format!("Failed to read event: {e}")))?;

    Ok(match event {
        // Windows reports releases too
        CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Event::Key(key),
        CrosstermEvent::Resize(width, height) => Event::Resize(width, height),
        _ => Event::Tick,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_handler_creation() {
        let handler = EventHandler::new();
        assert_eq!(handler.tick_rate, Duration::from_millis(100));
    }

    #[test]
    fn test_event_handler_custom_tick_rate() {
        let handler = EventHandler::with_tick_rate(Duration::from_millis(50));
        assert_eq!(handler.tick_rate, Duration::from_millis(50));
    }
}
