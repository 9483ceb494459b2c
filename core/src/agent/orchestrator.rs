use crate::agent::{ContextBuilder, ToolRegistry};
use crate::error::{Error, Result};
use crate::traits::{
    ChatMessage, ChatRequest, ChatResponse, Memory, Provider, ToolCall, ToolSpec, log_key,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// States of a single tool-augmented turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Init,
    ContextAssembled,
    AwaitingModel,
    ToolCallDetected,
    ToolDispatched,
    FinalAnswer,
    Done,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub final_text: String,
    pub tool_invocation: Option<ToolInvocation>,
    /// Tool calls the model asked for that were not executed.
    pub ignored_tool_calls: Vec<ToolCall>,
    pub round_trips: usize,
    pub memory_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub key: String,
    pub user_message: String,
}

struct Turn {
    state: TurnState,
    round_trips: usize,
}

impl Turn {
    fn new() -> Self {
        Self {
            state: TurnState::Init,
            round_trips: 0,
        }
    }

    fn advance(&mut self, next: TurnState) {
        debug!(from = ?self.state, to = ?next, "Turn state");
        self.state = next;
    }
}

/// Drives one user message through at most two model round-trips.
///
/// Only the first tool call of the first response is dispatched. The second
/// round-trip is sent without tools and its content is final, whatever it
/// contains.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    context_builder: ContextBuilder,
    tool_registry: Arc<ToolRegistry>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        context_builder: ContextBuilder,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            context_builder,
            tool_registry,
        }
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        self.context_builder.memory()
    }

    pub async fn process(&self, user_message: &str) -> Result<TurnOutcome> {
        if user_message.trim().is_empty() {
            return Err(Error::Validation("userMessage is required".to_string()));
        }

        let mut turn = Turn::new();
        let mut messages = self.context_builder.build_messages(user_message).await?;
        turn.advance(TurnState::ContextAssembled);

        let tools = self.tool_registry.list_descriptors();
        turn.advance(TurnState::AwaitingModel);
        let first = self.round_trip(&mut turn, &messages, Some(tools.as_slice())).await?;

        let mut ignored_tool_calls = Vec::new();

        let (final_text, tool_invocation) = if !first.has_tool_calls() {
            turn.advance(TurnState::FinalAnswer);
            (first.text.unwrap_or_default(), None)
        } else {
            turn.advance(TurnState::ToolCallDetected);

            let mut calls = first.tool_calls.into_iter();
            let call = calls.next().ok_or_else(|| {
                Error::ModelService("empty tool call list".to_string())
            })?;
            ignored_tool_calls.extend(calls);
            if !ignored_tool_calls.is_empty() {
                warn!(
                    dispatched = %call.name,
                    ignored = ignored_tool_calls.len(),
                    "Only the first tool call is executed"
                );
            }

            let invocation = self
                .dispatch(&call)
                .await
                .map_err(|e| Error::ToolExecution(Box::new(e)))?;
            turn.advance(TurnState::ToolDispatched);

            let assistant_text = first.text.unwrap_or_default();
            messages.push(ChatMessage::assistant_with_tool_calls(
                assistant_text,
                vec![call.clone()],
            ));
            messages.push(ChatMessage::tool_result(
                call.id.clone(),
                json!({ "result": invocation.result }).to_string(),
            ));

            turn.advance(TurnState::AwaitingModel);
            let second = self.round_trip(&mut turn, &messages, None).await?;
            if second.has_tool_calls() {
                warn!(
                    ignored = second.tool_calls.len(),
                    "Follow-up response requested more tools; treating it as final"
                );
                ignored_tool_calls.extend(second.tool_calls.iter().cloned());
            }

            turn.advance(TurnState::FinalAnswer);
            (second.text.unwrap_or_default(), Some(invocation))
        };

        let memory_key = log_key();
        self.memory().append(&memory_key, user_message).await?;
        turn.advance(TurnState::Done);

        info!(
            round_trips = turn.round_trips,
            tool = tool_invocation.as_ref().map(|t| t.name.as_str()),
            "Turn complete"
        );

        Ok(TurnOutcome {
            final_text,
            tool_invocation,
            ignored_tool_calls,
            round_trips: turn.round_trips,
            memory_key,
        })
    }

    /// Logs a raw prompt from an arbitrary client state object.
    pub async fn record_prompt(&self, state: &Value) -> Result<PromptRecord> {
        let user_message = state
            .get("userMessage")
            .or_else(|| state.get("user_message"))
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::Validation("userMessage is required".to_string()))?;

        let key = log_key();
        self.memory().append(&key, user_message).await?;
        info!(key = %key, "Prompt recorded");

        Ok(PromptRecord {
            key,
            user_message: user_message.to_string(),
        })
    }

    async fn round_trip(
        &self,
        turn: &mut Turn,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<ChatResponse> {
        let request = ChatRequest { messages, tools };
        turn.round_trips += 1;

        let response = self.provider.chat(request).await.map_err(|e| {
            Error::ModelService(format!("{} round-trip failed: {:#}", self.provider.name(), e))
        })?;

        let has_text = response.text.as_ref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && !response.has_tool_calls() {
            return Err(Error::ModelService(
                "response carried neither content nor tool calls".to_string(),
            ));
        }

        Ok(response)
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<ToolInvocation> {
        let arguments = if call.arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                Error::Validation(format!(
                    "arguments for '{}' are not valid JSON: {}",
                    call.name, e
                ))
            })?
        };

        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        let result = self.tool_registry.invoke(&call.name, arguments.clone()).await?;

        Ok(ToolInvocation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::VolatileMemory;
    use crate::tools::{GreetUserTool, MemoryWriteTool};
    use crate::traits::{LOG_KEY_PREFIX, Role};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Recorded {
        messages: Vec<ChatMessage>,
        had_tools: bool,
    }

    /// Returns queued responses in order and records every request.
    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<VecDeque<anyhow::Result<ChatResponse>>>,
        requests: Mutex<Vec<Recorded>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<anyhow::Result<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
            self.requests.lock().unwrap().push(Recorded {
                messages: request.messages.to_vec(),
                had_tools: request.tools.is_some(),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn text(content: &str) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            text: Some(content.to_string()),
            tool_calls: vec![],
        })
    }

    fn calls(calls: &[(&str, &str, &str)]) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            text: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, arguments)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                })
                .collect(),
        })
    }

    fn orchestrator(provider: Arc<ScriptedProvider>) -> (Orchestrator, Arc<VolatileMemory>) {
        let memory = Arc::new(VolatileMemory::new());
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(GreetUserTool)).unwrap();
        registry
            .register(Arc::new(MemoryWriteTool::new(memory.clone())))
            .unwrap();

        let orchestrator = Orchestrator::new(
            provider,
            ContextBuilder::new(memory.clone()),
            registry,
        );
        (orchestrator, memory)
    }

    #[tokio::test]
    async fn plain_answer_takes_one_round_trip() {
        let provider = ScriptedProvider::new(vec![text("Hi there")]);
        let (orchestrator, memory) = orchestrator(provider.clone());

        let outcome = orchestrator.process("hello").await.unwrap();

        assert_eq!(outcome.final_text, "Hi there");
        assert_eq!(outcome.round_trips, 1);
        assert!(outcome.tool_invocation.is_none());
        assert_eq!(provider.request_count(), 1);

        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].had_tools);
        assert_eq!(requests[0].messages.len(), 3);

        let all = memory.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].key.starts_with(LOG_KEY_PREFIX));
        assert_eq!(all[0].value, "hello");
        assert_eq!(all[0].key, outcome.memory_key);
    }

    #[tokio::test]
    async fn tool_call_takes_two_round_trips() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("call_1", "greetUser", r#"{"name":"Ada"}"#)]),
            text("I said hello to Ada."),
        ]);
        let (orchestrator, _) = orchestrator(provider.clone());

        let outcome = orchestrator.process("greet Ada").await.unwrap();

        assert_eq!(outcome.final_text, "I said hello to Ada.");
        assert_eq!(outcome.round_trips, 2);
        let invocation = outcome.tool_invocation.unwrap();
        assert_eq!(invocation.name, "greetUser");
        assert_eq!(invocation.result, json!({"greeting": "Hello, Ada!"}));

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(!requests[1].had_tools);

        let fed_back = &requests[1].messages;
        assert_eq!(fed_back.len(), 5);
        assert_eq!(fed_back[3].role, Role::Assistant);
        assert_eq!(fed_back[3].tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(fed_back[4].role, Role::Tool);
        assert_eq!(fed_back[4].tool_call_id.as_deref(), Some("call_1"));
        let content: Value = serde_json::from_str(&fed_back[4].content).unwrap();
        assert_eq!(content, json!({"result": {"greeting": "Hello, Ada!"}}));
    }

    #[tokio::test]
    async fn only_first_tool_call_runs() {
        let provider = ScriptedProvider::new(vec![
            calls(&[
                ("call_1", "remember", r#"{"key":"pet","value":"cat"}"#),
                ("call_2", "remember", r#"{"key":"car","value":"van"}"#),
            ]),
            text("Noted."),
        ]);
        let (orchestrator, memory) = orchestrator(provider);

        let outcome = orchestrator.process("remember things").await.unwrap();

        assert_eq!(outcome.ignored_tool_calls.len(), 1);
        assert_eq!(outcome.ignored_tool_calls[0].id, "call_2");

        let keys: Vec<_> = memory.all().await.unwrap().into_iter().map(|r| r.key).collect();
        assert!(keys.contains(&"pet".to_string()));
        assert!(!keys.contains(&"car".to_string()));
    }

    #[tokio::test]
    async fn second_tool_request_is_final() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("call_1", "greetUser", r#"{"name":"Ada"}"#)]),
            Ok(ChatResponse {
                text: Some("Partial".to_string()),
                tool_calls: vec![ToolCall {
                    id: "call_2".to_string(),
                    name: "greetUser".to_string(),
                    arguments: r#"{"name":"Bob"}"#.to_string(),
                }],
            }),
        ]);
        let (orchestrator, _) = orchestrator(provider.clone());

        let outcome = orchestrator.process("greet").await.unwrap();

        assert_eq!(outcome.final_text, "Partial");
        assert_eq!(outcome.round_trips, 2);
        assert_eq!(outcome.ignored_tool_calls[0].id, "call_2");
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn model_failure_aborts_without_memory_write() {
        let provider = ScriptedProvider::new(vec![Err(anyhow::anyhow!("503"))]);
        let (orchestrator, memory) = orchestrator(provider);

        let err = orchestrator.process("hello").await.unwrap_err();
        assert!(matches!(err, Error::ModelService(ref m) if m.contains("503")));
        assert!(memory.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_response_is_model_error() {
        let provider = ScriptedProvider::new(vec![Ok(ChatResponse::default())]);
        let (orchestrator, _) = orchestrator(provider);

        assert!(matches!(
            orchestrator.process("hello").await,
            Err(Error::ModelService(_))
        ));
    }

    #[tokio::test]
    async fn tool_failure_skips_second_round_trip() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("call_1", "greetUser", "{}")]),
            text("unreachable"),
        ]);
        let (orchestrator, _) = orchestrator(provider.clone());

        let err = orchestrator.process("greet").await.unwrap_err();
        match &err {
            Error::ToolExecution(inner) => assert!(matches!(
                inner.as_ref(),
                Error::MissingParameter { parameter, .. } if parameter == "name"
            )),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_validation());
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_tool_execution_error() {
        let provider = ScriptedProvider::new(vec![calls(&[("call_1", "teleport", "{}")])]);
        let (orchestrator, _) = orchestrator(provider);

        let err = orchestrator.process("go").await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution(_)));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected() {
        let provider = ScriptedProvider::new(vec![calls(&[("call_1", "greetUser", "{name")])]);
        let (orchestrator, _) = orchestrator(provider);

        let err = orchestrator.process("greet").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn retrieved_memory_reaches_the_model() {
        let provider = ScriptedProvider::new(vec![text("Blue.")]);
        let (orchestrator, memory) = orchestrator(provider.clone());
        memory.append("favorite_color", "blue").await.unwrap();

        orchestrator
            .process("what is my favorite color")
            .await
            .unwrap();

        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].messages[1].content.contains("favorite_color: blue"));
    }

    #[tokio::test]
    async fn logged_turns_are_not_fed_back() {
        let provider = ScriptedProvider::new(vec![text("ok"), text("ok")]);
        let (orchestrator, _) = orchestrator(provider.clone());

        orchestrator.process("I love sourdough bread").await.unwrap();
        orchestrator.process("sourdough recipes?").await.unwrap();

        let requests = provider.requests.lock().unwrap();
        assert!(!requests[1].messages[1].content.contains("sourdough"));
    }

    #[tokio::test]
    async fn record_prompt_requires_user_message() {
        let provider = ScriptedProvider::new(vec![]);
        let (orchestrator, memory) = orchestrator(provider);

        let err = orchestrator
            .record_prompt(&json!({"chatgpt": false}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let record = orchestrator
            .record_prompt(&json!({"userMessage": "remember the milk"}))
            .await
            .unwrap();
        assert!(record.key.starts_with(LOG_KEY_PREFIX));

        let all = memory.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "remember the milk");
    }

    #[tokio::test]
    async fn blank_message_is_validation_error() {
        let provider = ScriptedProvider::new(vec![]);
        let (orchestrator, _) = orchestrator(provider.clone());

        assert!(matches!(
            orchestrator.process("   ").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(provider.request_count(), 0);
    }
}
