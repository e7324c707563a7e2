//! Tick Provider Abstraction
//!
//! Version stamps on graph writes default to a wall-clock-derived tick
//! count. The trait keeps version stamping deterministic in tests.
//!
//! # Examples
//!
//! ```rust
//! use hyperstore_core::models::{SystemTickProvider, TickProvider};
//!
//! let provider = SystemTickProvider;
//! let a = provider.tick();
//! let b = provider.tick();
//! assert!(b >= a);
//! ```

use chrono::Utc;

/// Source of version ticks for graph writes
pub trait TickProvider {
    /// Current tick, milliseconds since the Unix epoch
    fn tick(&self) -> u64;
}

/// System clock tick provider
///
/// This is the default implementation for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTickProvider;

impl TickProvider for SystemTickProvider {
    fn tick(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Fixed tick provider for deterministic tests
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct MockTickProvider {
    current: std::cell::Cell<u64>,
}

#[cfg(test)]
impl MockTickProvider {
    /// Create a provider starting at the given tick
    pub fn starting_at(tick: u64) -> Self {
        Self {
            current: std::cell::Cell::new(tick),
        }
    }

    /// Advance the clock
    pub fn advance(&self, by: u64) {
        self.current.set(self.current.get() + by);
    }
}

#[cfg(test)]
impl TickProvider for MockTickProvider {
    fn tick(&self) -> u64 {
        self.current.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_ticks_are_monotonic() {
        let provider = SystemTickProvider;
        let a = provider.tick();
        let b = provider.tick();
        assert!(b >= a);
    }

    #[test]
    fn test_mock_tick_advance() {
        let provider = MockTickProvider::starting_at(100);
        assert_eq!(provider.tick(), 100);
        provider.advance(50);
        assert_eq!(provider.tick(), 150);
    }
}
