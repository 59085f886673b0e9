//! In-memory reviewers and tools for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::{Message, Reviewer, ReviewerResponse, ToolCall};
use crate::tools::{ToolDefinition, ToolError, ToolExecutor, ToolKind};
use crate::{Error, Result};

/// Build a tool call from a JSON object literal
pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    let arguments = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ToolCall::new(id, name, arguments)
}

/// One recorded reviewer call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: usize,
}

/// Reviewer that replays a fixed script of responses
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<Result<ReviewerResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedReviewer {
    pub fn new(script: Vec<Result<ReviewerResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ReviewerResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.len(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Reviewer("script exhausted".to_string())))
    }
}

/// Tool executor that echoes its arguments
///
/// A numeric `delay_ms` argument delays completion so tests can force an
/// out-of-order finish.
#[derive(Default)]
pub struct FakeTools {
    executed: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Completion order: "slow" for delayed calls, "fast" for the rest
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for FakeTools {
    async fn execute(&self, kind: ToolKind, args: &Map<String, Value>) -> std::result::Result<Value, ToolError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if let Some(ms) = args.get("delay_ms").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        let label = if args.contains_key("delay_ms") { "slow" } else { "fast" };
        self.completed.lock().unwrap().push(label.to_string());
        Ok(serde_json::json!({ "tool": kind.name(), "args": args }))
    }
}

/// Reviewer for dispatcher tests
///
/// Tracks in-flight calls. A diff containing "boom" fails and one containing
/// "panic" panics.
#[derive(Default)]
pub struct CountingReviewer {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    reviewed: Mutex<Vec<String>>,
    delay: Duration,
}

impl CountingReviewer {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Diffs seen, in call order
    pub fn reviewed(&self) -> Vec<String> {
        self.reviewed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reviewer for CountingReviewer {
    fn name(&self) -> &str {
        "counting"
    }

    async fn call(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<ReviewerResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let diff = messages
            .last()
            .and_then(Message::content)
            .unwrap_or_default()
            .to_string();
        self.reviewed.lock().unwrap().push(diff.clone());

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if diff.contains("boom") {
            return Err(Error::Reviewer("model unavailable".to_string()));
        }
        if diff.contains("panic") {
            panic!("reviewer crashed");
        }
        Ok(ReviewerResponse::text(format!("reviewed {} bytes", diff.len())))
    }
}
