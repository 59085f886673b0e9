//! Agent module: reviewer conversations with tool use

mod orchestrator;
pub mod prompts;
mod reviewer;
mod types;

pub use orchestrator::{
    ConversationState, IterationObserver, Orchestrator, Phase, RunOptions, ToolCallObserver,
};
pub use prompts::{PromptContext, Template};
pub use reviewer::Reviewer;
pub use types::{Message, ReviewInput, ReviewerResponse, Role, ToolCall, ToolOutcome, ToolResult};
