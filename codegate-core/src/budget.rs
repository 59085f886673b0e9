//! Budget and limiter policy shared by the orchestrator and the dispatcher
//!
//! Every limit in this module is checked before the action it bounds:
//! a tool batch is admitted or rejected as a whole before any call runs,
//! and a diff is cut down before it is handed to the reviewer.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Default number of reviewer rounds in an agent review
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default number of tool calls across a whole agent review
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 10;

/// Lower bound for the dispatcher worker count
pub const MIN_CONCURRENCY: usize = 1;

/// Upper bound for the dispatcher worker count
pub const MAX_CONCURRENCY: usize = 8;

/// Default diff line ceiling for a single file
pub const DEFAULT_MAX_DIFF_LINES: usize = 10_000;

/// Limits for one agent conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBudget {
    max_iterations: u32,
    max_tool_calls: u32,
}

impl AgentBudget {
    /// Create a budget. At least one round is always allowed.
    pub fn new(max_iterations: u32, max_tool_calls: u32) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            max_tool_calls,
        }
    }

    /// Maximum number of reviewer rounds
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Maximum number of executed tool calls
    pub fn max_tool_calls(&self) -> u32 {
        self.max_tool_calls
    }

    /// Whether another round may start after `completed_rounds` rounds
    pub fn allows_round(&self, completed_rounds: u32) -> bool {
        completed_rounds < self.max_iterations
    }

    /// Whether a batch of `requested` calls fits next to `used` executed calls
    ///
    /// All-or-nothing: a batch that would overflow is rejected wholesale.
    pub fn admits_batch(&self, used: u32, requested: usize) -> bool {
        let requested = u64::try_from(requested).unwrap_or(u64::MAX);
        u64::from(used).saturating_add(requested) <= u64::from(self.max_tool_calls)
    }

    /// Upper bound on reviewer calls for one conversation (rounds plus one forced finalization)
    pub fn max_reviewer_calls(&self) -> u32 {
        self.max_iterations.saturating_add(1)
    }
}

impl Default for AgentBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOOL_CALLS)
    }
}

/// Clamp a requested worker count into `[MIN_CONCURRENCY, MAX_CONCURRENCY]`
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Line ceiling for the diff of a single review unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimit {
    max_lines: usize,
}

impl DiffLimit {
    /// Create a limit. Zero falls back to [`DEFAULT_MAX_DIFF_LINES`].
    pub fn new(max_lines: usize) -> Self {
        let max_lines = if max_lines == 0 {
            DEFAULT_MAX_DIFF_LINES
        } else {
            max_lines
        };
        Self { max_lines }
    }

    /// The configured ceiling
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Keep the first `max_lines` lines and append a note with the original total
    pub fn apply<'a>(&self, diff: &'a str) -> Cow<'a, str> {
        let total = diff.split('\n').count();
        if total <= self.max_lines {
            return Cow::Borrowed(diff);
        }

        let kept: Vec<&str> = diff.split('\n').take(self.max_lines).collect();
        Cow::Owned(format!("{}{}", kept.join("\n"), truncation_note(total)))
    }
}

impl Default for DiffLimit {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIFF_LINES)
    }
}

/// Note appended to a truncated diff
pub fn truncation_note(total_lines: usize) -> String {
    format!("\n...(Diff truncated due to length, total lines: {total_lines})")
}
