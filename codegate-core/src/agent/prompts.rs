//! Reviewer prompt templates
//!
//! Templates are embedded at compile time and use `{{VARIABLE}}` placeholders.
//! Rendering is a single pass over the template, so substituted values (diffs
//! in particular) are never scanned for placeholders themselves.

use std::collections::HashMap;

const AGENT_SYSTEM_PROMPT: &str = include_str!("prompts/agent_system.md");
const AGENT_USER_PROMPT: &str = include_str!("prompts/agent_user.md");
const DIRECT_USER_PROMPT: &str = include_str!("prompts/direct_user.md");

/// Sent when a conversation runs out of tool calls or rounds
pub const FINALIZE_PROMPT: &str = "The tool-call or iteration limit has been reached. \
Using the information gathered so far, write the final code review report now.";

/// Embedded prompt templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// System message of an agent review
    AgentSystem,
    /// First user message of an agent review
    AgentUser,
    /// User message of a single-shot review
    DirectUser,
}

impl Template {
    /// Raw template text
    pub fn source(&self) -> &'static str {
        match self {
            Template::AgentSystem => AGENT_SYSTEM_PROMPT,
            Template::AgentUser => AGENT_USER_PROMPT,
            Template::DirectUser => DIRECT_USER_PROMPT,
        }
    }
}

/// Variables for rendering a template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set the reviewer instructions
    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        self.with("PROMPT", prompt)
    }

    /// Set the diff under review
    pub fn with_diff(self, diff: impl Into<String>) -> Self {
        self.with("DIFF", diff)
    }

    /// Set the touched files as a bullet list
    pub fn with_files(self, files: &[String]) -> Self {
        let files_str = if files.is_empty() {
            "(no specific files)".to_string()
        } else {
            files
                .iter()
                .map(|f| format!("- `{}`", f))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.with("FILES", files_str)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

/// Render an embedded template
pub fn render(template: Template, context: &PromptContext) -> String {
    render_template(template.source(), context)
}

/// Render a template string
///
/// Known variables are substituted. Unset `{{UPPERCASE_NAME}}` placeholders
/// become "(not specified)"; any other `{{...}}` text is left alone.
pub fn render_template(template: &str, context: &PromptContext) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            result.push_str(&rest[start..]);
            return result;
        };

        let name = &after[..end];
        match context.get(name) {
            Some(value) => result.push_str(value),
            None if is_placeholder_name(name) => result.push_str("(not specified)"),
            None => {
                result.push_str("{{");
                rest = after;
                continue;
            }
        }
        rest = &after[end + 2..];
    }

    result.push_str(rest);
    result
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}

/// System message for an agent review
pub fn agent_system_prompt(prompt: &str) -> String {
    render(Template::AgentSystem, &PromptContext::new().with_prompt(prompt))
}

/// First user message for an agent review
pub fn agent_user_prompt(diff: &str, files: &[String]) -> String {
    render(
        Template::AgentUser,
        &PromptContext::new().with_diff(diff).with_files(files),
    )
}

/// User message for a single-shot review
pub fn direct_user_prompt(diff: &str) -> String {
    render(Template::DirectUser, &PromptContext::new().with_diff(diff))
}
