//! Scheduler configuration.

/// Options controlling reductions, bounds, and reporting. Flags map 1:1
/// onto the CLI surface.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Keep only senders whose head message is minimal in the
    /// receiver-queue order.
    pub use_receiver_queue_semantics: bool,
    /// Per-machine buffers are unordered bags instead of FIFO queues.
    pub use_bag_semantics: bool,
    /// Prune senders whose clock was already explored at a branch.
    pub use_sleep_sets: bool,
    /// Apply the interleave-order filter to candidate senders.
    pub use_filters: bool,
    /// Enumerate concrete states and keep only candidates that can reach
    /// an unseen one.
    pub use_state_caching: bool,
    /// Snapshot source state at every step for backtracking.
    pub use_backtrack: bool,
    /// Track vector clocks even when no reduction needs them.
    pub is_dpor: bool,
    /// Stop when the depth reaches this bound (0 = unlimited).
    pub max_step_bound: usize,
    /// Bound on per-machine internal steps during event-to-completion
    /// (0 = unlimited).
    pub max_internal_steps: usize,
    /// Statistics collection level, 0-4. Levels above 3 count concrete
    /// messages per step.
    pub collect_stats: u32,
    /// Log verbosity, 0-5.
    pub verbosity: u32,
    /// Memory cap in MB (0 = unlimited).
    pub mem_limit_mb: f64,
    /// Wall-clock cap in seconds (0 = unlimited).
    pub time_limit_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            use_receiver_queue_semantics: false,
            use_bag_semantics: false,
            use_sleep_sets: false,
            use_filters: false,
            use_state_caching: false,
            use_backtrack: false,
            is_dpor: false,
            max_step_bound: 1000,
            max_internal_steps: 1000,
            collect_stats: 1,
            verbosity: 0,
            mem_limit_mb: 0.0,
            time_limit_secs: 0.0,
        }
    }
}

impl SchedulerConfig {
    /// Whether any enabled option needs vector clocks maintained.
    pub fn needs_clocks(&self) -> bool {
        self.use_receiver_queue_semantics || self.use_sleep_sets || self.is_dpor
    }
}
