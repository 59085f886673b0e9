//! Codegate Core - Core library for AI-assisted code review
//!
//! This crate drives review conversations with a language-model reviewer,
//! lets the reviewer pull extra repository context through a small set of
//! tools, and fans reviews out across the files of a change with bounded
//! concurrency.

pub mod agent;
pub mod budget;
pub mod config;
pub mod error;
pub mod git;
pub mod review;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{
    ConversationState, Message, Orchestrator, Phase, ReviewInput, Reviewer, ReviewerResponse,
    RunOptions, ToolCall, ToolOutcome, ToolResult,
};
pub use budget::{AgentBudget, DiffLimit};
pub use config::{Config, Provider};
pub use error::{Error, Result};
pub use git::{DiffSource, GitRepo};
pub use review::{
    DispatchObserver, DispatchOptions, DispatchPlan, Dispatcher, FileChange, Preparation,
    PreparedReview, Report, ReportMeta, ResultSet, ReviewEngine, ReviewFlow, ReviewItem,
    ReviewMode, StatusSnapshot,
};
pub use tools::{RepoTools, ToolDefinition, ToolError, ToolExecutor, ToolKind};
