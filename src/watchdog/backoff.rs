//! Capped pseudo-Fibonacci restart backoff.

use std::time::Duration;

/// Default restart delay table, in seconds. The index saturates at the
/// last entry — the delay never grows beyond 377 seconds.
pub const DEFAULT_DELAYS_SECONDS: [u64; 14] = [3, 3, 3, 5, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377];

/// Backoff state: an index into a fixed ordered delay table.
///
/// The index advances by one per failed restart cycle, saturating at the
/// last entry, and resets to 0 on a reset signal.
#[derive(Debug, Clone)]
pub struct Backoff {
    index: usize,
    table: Vec<Duration>,
}

/// The default delay table as durations.
#[must_use]
pub fn default_table() -> Vec<Duration> {
    DEFAULT_DELAYS_SECONDS
        .iter()
        .map(|&secs| Duration::from_secs(secs))
        .collect()
}

impl Backoff {
    /// Backoff over the default delay table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_table(default_table())
    }

    /// Backoff over a caller-supplied delay table. An empty table behaves
    /// as a single zero delay.
    #[must_use]
    pub fn with_table(table: Vec<Duration>) -> Self {
        Self { index: 0, table }
    }

    /// Current index into the delay table.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Delay for the current cycle.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.table.get(self.index).copied().unwrap_or(Duration::ZERO)
    }

    /// Advance one failed cycle, saturating at the last table entry.
    pub fn advance(&mut self) {
        if self.index + 1 < self.table.len() {
            self.index += 1;
        }
    }

    /// Reset to the first table entry.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
