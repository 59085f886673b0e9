//! Reviewer abstraction for language-model backends

use async_trait::async_trait;

use crate::tools::ToolDefinition;
use crate::Result;

use super::prompts;
use super::types::{Message, ReviewerResponse};

/// A language model that reviews code
///
/// Implementations must accept an empty tool list; the orchestrator uses one
/// to force a final text answer.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Model identifier used in logs and reports
    fn model(&self) -> &str {
        "unknown"
    }

    /// Send the transcript and available tools, get text and/or tool calls back
    async fn call(&self, messages: &[Message], tools: &[ToolDefinition])
        -> Result<ReviewerResponse>;

    /// Single-shot review of a diff without tools
    async fn review(&self, prompt: &str, diff: &str) -> Result<String> {
        let messages = [
            Message::system(prompt),
            Message::user(prompts::direct_user_prompt(diff)),
        ];
        let response = self.call(&messages, &[]).await?;
        Ok(response.text.unwrap_or_default())
    }
}
