//! Bounded review conversation with tool use
//!
//! The orchestrator drives one conversation per review unit:
//! ask the reviewer, run the tools it requested, feed the results back, and
//! repeat until the reviewer answers with plain text or a budget runs out.
//! When a budget runs out the reviewer is asked once more, without tools, for
//! its final report.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::budget::AgentBudget;
use crate::tools::{execute_batch, ToolExecutor};
use crate::Result;

use super::prompts::{self, FINALIZE_PROMPT};
use super::reviewer::Reviewer;
use super::types::{Message, ReviewInput, ToolCall};

/// Observer fired when a round's tool batch is admitted: `(iteration, calls)`
pub type IterationObserver = Arc<dyn Fn(u32, usize) + Send + Sync>;

/// Observer fired for each admitted tool call
pub type ToolCallObserver = Arc<dyn Fn(&ToolCall) + Send + Sync>;

/// Lifecycle of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Rounds of reviewer calls and tool batches
    Running,
    /// A budget ran out; waiting for the tool-less final answer
    AwaitingFinal,
    /// Final text produced
    Done,
}

/// State of one conversation, owned by a single run
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    iteration: u32,
    total_tool_calls: u32,
    phase: Phase,
}

impl ConversationState {
    /// Seed a transcript with the system and user messages for `input`
    pub fn new(input: &ReviewInput) -> Self {
        Self {
            messages: vec![
                Message::system(prompts::agent_system_prompt(&input.prompt)),
                Message::user(prompts::agent_user_prompt(&input.diff, &input.files)),
            ],
            iteration: 0,
            total_tool_calls: 0,
            phase: Phase::Running,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Rounds started so far
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Tool calls executed so far
    pub fn total_tool_calls(&self) -> u32 {
        self.total_tool_calls
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// Budget and observers for a run
#[derive(Clone, Default)]
pub struct RunOptions {
    pub budget: AgentBudget,
    pub on_iteration: Option<IterationObserver>,
    pub on_tool_call: Option<ToolCallObserver>,
}

impl RunOptions {
    pub fn new(budget: AgentBudget) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    /// Set the iteration observer
    pub fn on_iteration(mut self, observer: impl Fn(u32, usize) + Send + Sync + 'static) -> Self {
        self.on_iteration = Some(Arc::new(observer));
        self
    }

    /// Set the tool call observer
    pub fn on_tool_call(mut self, observer: impl Fn(&ToolCall) + Send + Sync + 'static) -> Self {
        self.on_tool_call = Some(Arc::new(observer));
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("budget", &self.budget)
            .field("on_iteration", &self.on_iteration.is_some())
            .field("on_tool_call", &self.on_tool_call.is_some())
            .finish()
    }
}

/// Runs review conversations against a reviewer and a tool executor
#[derive(Clone)]
pub struct Orchestrator {
    reviewer: Arc<dyn Reviewer>,
    tools: Arc<dyn ToolExecutor>,
}

impl Orchestrator {
    pub fn new(reviewer: Arc<dyn Reviewer>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self { reviewer, tools }
    }

    pub fn reviewer(&self) -> &Arc<dyn Reviewer> {
        &self.reviewer
    }

    /// Run a full conversation and return the final review text
    pub async fn run(&self, input: &ReviewInput, options: &RunOptions) -> Result<String> {
        let mut state = ConversationState::new(input);
        self.drive(&mut state, options).await
    }

    /// Drive an existing conversation to completion
    ///
    /// On error the state holds no partial messages from the failed call and
    /// may be driven again.
    pub async fn drive(&self, state: &mut ConversationState, options: &RunOptions) -> Result<String> {
        let budget = options.budget;
        let definitions = self.tools.definitions();

        while state.phase == Phase::Running && budget.allows_round(state.iteration) {
            state.iteration += 1;
            let iteration = state.iteration;
            debug!(iteration, reviewer = self.reviewer.name(), "Calling reviewer");

            let response = match self.reviewer.call(&state.messages, &definitions).await {
                Ok(response) => response,
                Err(e) => {
                    state.iteration -= 1;
                    return Err(e);
                }
            };

            if response.tool_calls.is_empty() {
                state.phase = Phase::Done;
                debug!(iteration, "Reviewer finished without tool calls");
                return Ok(response.text.unwrap_or_default());
            }

            let requested = response.tool_calls.len();
            if !budget.admits_batch(state.total_tool_calls, requested) {
                info!(
                    iteration,
                    requested,
                    used = state.total_tool_calls,
                    max = budget.max_tool_calls(),
                    "Tool call budget exhausted, requesting final report"
                );
                for call in &response.tool_calls {
                    debug!(tool = %call.name, id = %call.id, "Dropping tool call");
                }
                return self.finalize(state, response.text).await;
            }

            if let Some(observer) = &options.on_iteration {
                observer(iteration, requested);
            }
            if let Some(observer) = &options.on_tool_call {
                for call in &response.tool_calls {
                    observer(call);
                }
            }

            let results = execute_batch(self.tools.as_ref(), &response.tool_calls).await;
            for result in results.iter().filter(|r| r.is_error()) {
                debug!(tool = %result.name, error = ?result.error(), "Tool call failed");
            }

            state.messages.push(Message::assistant_with_calls(
                response.text,
                response.tool_calls,
            ));
            state.messages.extend(results.iter().map(Message::tool));
            state.total_tool_calls += u32::try_from(requested).unwrap_or(u32::MAX);
        }

        if state.phase == Phase::Running {
            info!(
                iterations = state.iteration,
                "Iteration budget exhausted, requesting final report"
            );
        }
        self.finalize(state, None).await
    }

    /// Ask for the final report without tools
    async fn finalize(&self, state: &mut ConversationState, last_text: Option<String>) -> Result<String> {
        let checkpoint = state.messages.len();
        let previous = state.phase;
        state.phase = Phase::AwaitingFinal;

        if let Some(text) = last_text.filter(|t| !t.is_empty()) {
            state.messages.push(Message::assistant(text));
        }
        state.messages.push(Message::user(FINALIZE_PROMPT));

        match self.reviewer.call(&state.messages, &[]).await {
            Ok(response) => {
                state.phase = Phase::Done;
                Ok(response.text.unwrap_or_default())
            }
            Err(e) => {
                warn!(error = %e, "Final reviewer call failed");
                state.messages.truncate(checkpoint);
                state.phase = previous;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::{ReviewerResponse, Role};
    use crate::testing::{call, FakeTools, ScriptedReviewer};
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn input() -> ReviewInput {
        ReviewInput::new("Review it", "diff --git a/a.rs b/a.rs", vec!["a.rs".to_string()])
    }

    fn calls(n: usize) -> Vec<ToolCall> {
        (0..n)
            .map(|i| call(&format!("c{i}"), "read_file", serde_json::json!({"path": format!("f{i}")})))
            .collect()
    }

    fn orchestrator(reviewer: &Arc<ScriptedReviewer>, tools: &Arc<FakeTools>) -> Orchestrator {
        Orchestrator::new(reviewer.clone(), tools.clone())
    }

    #[tokio::test]
    async fn test_plain_answer_ends_run() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![Ok(ReviewerResponse::text("LGTM"))]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let mut state = ConversationState::new(&input());
        let text = orch.drive(&mut state, &RunOptions::default()).await.unwrap();

        assert_eq!(text, "LGTM");
        assert!(state.is_done());
        assert_eq!(state.iteration(), 1);
        assert_eq!(state.messages().len(), 2);
        assert_eq!(reviewer.calls().len(), 1);
        assert_eq!(reviewer.calls()[0].tools, 3);
        assert_eq!(tools.executed(), 0);
    }

    #[tokio::test]
    async fn test_seeded_transcript() {
        let state = ConversationState::new(&input());
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(state.messages()[0].role(), Role::System);
        assert!(state.messages()[0].content().unwrap().contains("Review it"));
        assert_eq!(state.messages()[1].role(), Role::User);
        assert!(state.messages()[1].content().unwrap().contains("a.rs"));
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(Some("checking".into()), calls(2))),
            Ok(ReviewerResponse::text("final")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let mut state = ConversationState::new(&input());
        let text = orch.drive(&mut state, &RunOptions::default()).await.unwrap();

        assert_eq!(text, "final");
        assert_eq!(state.total_tool_calls(), 2);
        // system, user, assistant(with calls), tool, tool
        let roles: Vec<Role> = state.messages().iter().map(Message::role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert_eq!(state.messages()[2].tool_calls().len(), 2);
        assert_eq!(reviewer.calls()[1].messages.len(), 5);
    }

    #[tokio::test]
    async fn test_tool_results_keep_request_order() {
        let mut slow = call("slow", "read_file", serde_json::json!({"delay_ms": 60}));
        slow.arguments.insert("path".into(), serde_json::json!("a"));
        let fast = call("fast", "read_file", serde_json::json!({"path": "b"}));

        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, vec![slow, fast])),
            Ok(ReviewerResponse::text("done")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let mut state = ConversationState::new(&input());
        orch.drive(&mut state, &RunOptions::default()).await.unwrap();

        assert_eq!(tools.completion_order(), vec!["fast", "slow"]);
        let ids: Vec<String> = state
            .messages()
            .iter()
            .filter_map(|m| match m {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_tool_budget_overflow_forces_final() {
        // maxIterations = 2, maxToolCalls = 10: 3 calls run, then 9 would overflow
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, calls(3))),
            Ok(ReviewerResponse::with_calls(Some("need more".into()), calls(9))),
            Ok(ReviewerResponse::text("final report")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);
        let options = RunOptions::new(AgentBudget::new(2, 10));

        let mut state = ConversationState::new(&input());
        let text = orch.drive(&mut state, &options).await.unwrap();

        assert_eq!(text, "final report");
        assert_eq!(tools.executed(), 3);
        assert_eq!(state.total_tool_calls(), 3);
        assert!(state.is_done());

        let recorded = reviewer.calls();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[2].tools, 0);

        let messages = state.messages();
        let n = messages.len();
        assert_eq!(messages[n - 2], Message::assistant("need more"));
        assert_eq!(messages[n - 1], Message::user(FINALIZE_PROMPT));
    }

    #[tokio::test]
    async fn test_iteration_budget_forces_final() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, calls(1))),
            Ok(ReviewerResponse::with_calls(None, calls(1))),
            Ok(ReviewerResponse::text("wrapped up")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);
        let options = RunOptions::new(AgentBudget::new(2, 10));

        let mut state = ConversationState::new(&input());
        let text = orch.drive(&mut state, &options).await.unwrap();

        assert_eq!(text, "wrapped up");
        assert_eq!(state.iteration(), 2);
        let recorded = reviewer.calls();
        assert_eq!(recorded.len(), options.budget.max_reviewer_calls() as usize);
        assert_eq!(recorded[2].tools, 0);
        assert_eq!(
            state.messages().last(),
            Some(&Message::user(FINALIZE_PROMPT))
        );
    }

    #[tokio::test]
    async fn test_zero_tool_budget_skips_execution() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, calls(1))),
            Ok(ReviewerResponse::text("no tools needed")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let text = orch
            .run(&input(), &RunOptions::new(AgentBudget::new(5, 0)))
            .await
            .unwrap();
        assert_eq!(text, "no tools needed");
        assert_eq!(tools.executed(), 0);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_round() {
        let bad = call("bad", "delete_everything", serde_json::json!({}));
        let good = call("good", "read_file", serde_json::json!({"path": "a"}));
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, vec![bad, good])),
            Ok(ReviewerResponse::text("ok")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let mut state = ConversationState::new(&input());
        let text = orch.drive(&mut state, &RunOptions::default()).await.unwrap();
        assert_eq!(text, "ok");

        match &state.messages()[3] {
            Message::Tool { content, .. } => {
                assert_eq!(content, r#"{"error":"Unknown tool: delete_everything"}"#)
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(state.total_tool_calls(), 2);
    }

    #[tokio::test]
    async fn test_observers_fire_for_admitted_batches() {
        let rounds = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(AtomicUsize::new(0));

        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, calls(2))),
            Ok(ReviewerResponse::with_calls(None, calls(5))),
            Ok(ReviewerResponse::text("final")),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let rounds_clone = rounds.clone();
        let seen_clone = seen.clone();
        let options = RunOptions::new(AgentBudget::new(5, 4))
            .on_iteration(move |iteration, count| {
                rounds_clone.lock().unwrap().push((iteration, count))
            })
            .on_tool_call(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            });

        orch.run(&input(), &options).await.unwrap();
        assert_eq!(*rounds.lock().unwrap(), vec![(1, 2)]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reviewer_failure_leaves_no_partial_messages() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![Err(Error::Reviewer(
            "connection refused".into(),
        ))]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let mut state = ConversationState::new(&input());
        let err = orch
            .drive(&mut state, &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Reviewer(_)));
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(state.iteration(), 0);
    }

    #[tokio::test]
    async fn test_final_call_failure_rolls_back() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(Some("partial".into()), calls(3))),
            Err(Error::Reviewer("timeout".into())),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let mut state = ConversationState::new(&input());
        let result = orch
            .drive(&mut state, &RunOptions::new(AgentBudget::new(5, 2)))
            .await;
        assert!(result.is_err());
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(tools.executed(), 0);
    }

    #[tokio::test]
    async fn test_empty_final_text() {
        let reviewer = Arc::new(ScriptedReviewer::new(vec![
            Ok(ReviewerResponse::with_calls(None, calls(1))),
            Ok(ReviewerResponse::default()),
        ]));
        let tools = Arc::new(FakeTools::new());
        let orch = orchestrator(&reviewer, &tools);

        let text = orch
            .run(&input(), &RunOptions::new(AgentBudget::new(1, 10)))
            .await
            .unwrap();
        assert_eq!(text, "");
    }
}
