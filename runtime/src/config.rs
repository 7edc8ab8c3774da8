//! Runtime configuration.

/// Configuration for the dispatcher and event queue
///
/// # Example
///
/// ```
/// use refract_runtime::RuntimeConfig;
///
/// let config = RuntimeConfig::default()
///     .with_queue_capacity(16)
///     .with_log_state_diffs(true);
///
/// assert_eq!(config.queue_capacity, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Events the asynchronous queue buffers before `try_dispatch` reports
    /// [`refract_core::DispatchError::QueueFull`]
    pub queue_capacity: usize,
    /// Log the full before/after state at `trace` level on every commit
    pub log_state_diffs: bool,
}

impl RuntimeConfig {
    /// Create a new configuration with custom values
    ///
    /// # Arguments
    ///
    /// - `queue_capacity`: Event queue buffer size (clamped to at least 1)
    /// - `log_state_diffs`: Whether commits log full states
    #[must_use]
    pub const fn new(queue_capacity: usize, log_state_diffs: bool) -> Self {
        Self {
            queue_capacity: if queue_capacity == 0 { 1 } else { queue_capacity },
            log_state_diffs,
        }
    }

    /// Set the event queue capacity
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Enable or disable full-state logging on commit
    #[must_use]
    pub const fn with_log_state_diffs(mut self, enabled: bool) -> Self {
        self.log_state_diffs = enabled;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            log_state_diffs: false,
        }
    }
}
