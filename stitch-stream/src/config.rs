// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum number of items grouped into one window.
pub const DEFAULT_MAX_WINDOW_SIZE: usize = 100;

/// Default time to wait for a window to fill up before it is handed over anyway.
pub const DEFAULT_MAX_WINDOW_DELAY: Duration = Duration::from_millis(50);

/// Default time lookups of a freshly subscribed auto-cache wait for its first window of events.
pub const DEFAULT_AUTO_CACHE_INIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Size and time bounds for grouping a stream into windows.
///
/// A window is emitted as soon as it holds `max_size` items or `max_delay` has passed since its
/// first item arrived, whichever happens first. When the underlying stream ends the remaining
/// items are emitted right away.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub max_size: usize,
    pub max_delay: Duration,
}

impl WindowConfig {
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Window size which is safe to use, zero-sized windows are not possible.
    pub(crate) fn effective_max_size(&self) -> usize {
        self.max_size.max(1)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_WINDOW_SIZE,
            max_delay: DEFAULT_MAX_WINDOW_DELAY,
        }
    }
}

/// Configuration of how an assembler consumes a stream of windows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleConfig {
    /// Number of windows which are resolved at the same time.
    ///
    /// Results are always emitted in window order, a window which completes early is held back
    /// until all windows before it were emitted.
    pub max_concurrent_windows: usize,
}

impl AssembleConfig {
    pub fn max_concurrent_windows(mut self, value: usize) -> Self {
        self.max_concurrent_windows = value;
        self
    }
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_windows: 1,
        }
    }
}
