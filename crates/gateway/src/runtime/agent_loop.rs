//! Agent Loop — drives one assistant turn end-to-end, emitting a canonical
//! [`JobEvent`] stream consumed by the Job Runner and (for the inline
//! streaming path) forwarded directly to a connected client.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use sa_domain::error::Error;
use sa_domain::job_event::{JobEvent, JobPhaseStatus};
use sa_domain::message::{ContentPart, Message, MessageContent, Role};
use sa_domain::stream::{BoxStream, StreamEvent};
use sa_domain::tool::ToolContext;
use sa_providers::{ChatRequest, LlmProvider};

use super::tools::{ToolExecutor, ToolRegistry};

/// Everything the loop needs for one turn. The caller (inline streaming
/// endpoint or Job Runner) assembles this from the job, its thread, and
/// the project's resource projection.
pub struct AgentLoopInput {
    pub system_prompt: String,
    /// Prior turns, oldest first. Does not include the new question.
    pub history: Vec<Message>,
    pub question: String,
    pub tool_ctx: ToolContext,
}

/// Drives the loop to completion, yielding events as they occur. Honors
/// `max_iterations` (a distinct "loop limit" error if exceeded) and
/// `cancel` (a cooperative cancellation signal checked between stream
/// tokens).
pub fn run(
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    input: AgentLoopInput,
    max_iterations: u32,
    cancel: CancellationToken,
) -> BoxStream<'static, JobEvent> {
    let executor = ToolExecutor::new(registry.clone());

    Box::pin(async_stream::stream! {
        yield JobEvent::Status { status: JobPhaseStatus::Running };

        let mut messages = vec![Message::system(input.system_prompt)];
        messages.extend(input.history);
        messages.push(Message::user(input.question));

        let mut iteration: u32 = 0;

        loop {
            iteration += 1;
            if iteration > max_iterations {
                yield JobEvent::Error {
                    message: "loop limit exceeded".into(),
                    cancelled: false,
                };
                return;
            }

            let tools = registry.tool_definitions(&input.tool_ctx);
            let request = ChatRequest {
                messages: messages.clone(),
                tools,
                ..Default::default()
            };

            let stream = match provider.chat_stream(request).await {
                Ok(s) => s,
                Err(e) => {
                    yield JobEvent::Error { message: e.to_string(), cancelled: false };
                    return;
                }
            };
            tokio::pin!(stream);

            let mut text_acc = String::new();
            let mut finished_calls = Vec::new();
            let mut usage = None;
            let mut stream_error: Option<Error> = None;
            let mut cancelled = false;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => { cancelled = true; None }
                    ev = stream.next() => ev,
                };
                let Some(event) = next else { break };

                match event {
                    Ok(StreamEvent::Thinking { text }) => yield JobEvent::Thinking { content: text },
                    Ok(StreamEvent::Token { text }) => {
                        text_acc.push_str(&text);
                        yield JobEvent::Chunk { content: text };
                    }
                    Ok(StreamEvent::ToolCallStarted { .. }) => {}
                    Ok(StreamEvent::ToolCallDelta { .. }) => {}
                    Ok(StreamEvent::ToolCallFinished { call_id, tool_name, arguments }) => {
                        finished_calls.push(sa_domain::message::ToolCall { call_id, tool_name, arguments });
                    }
                    Ok(StreamEvent::Done { usage: u, .. }) => usage = u,
                    Ok(StreamEvent::Error { message }) => {
                        stream_error = Some(Error::Upstream { provider: provider.provider_id().to_owned(), message });
                        break;
                    }
                    Err(e) => {
                        stream_error = Some(e);
                        break;
                    }
                }
            }

            if cancelled {
                yield JobEvent::Error { message: "job cancelled".into(), cancelled: true };
                return;
            }
            if let Some(e) = stream_error {
                yield JobEvent::Error { message: e.to_string(), cancelled: false };
                return;
            }

            if let Some(u) = usage {
                yield JobEvent::Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                };
            }

            if finished_calls.is_empty() {
                yield JobEvent::Sources { sources: Vec::new() };
                yield JobEvent::Status { status: JobPhaseStatus::Responding };
                yield JobEvent::Done;
                return;
            }

            let mut assistant_parts = Vec::new();
            if !text_acc.is_empty() {
                assistant_parts.push(ContentPart::Text { text: text_acc });
            }
            for call in &finished_calls {
                assistant_parts.push(ContentPart::ToolUse {
                    id: call.call_id.clone(),
                    name: call.tool_name.clone(),
                    input: call.arguments.clone(),
                });
            }
            messages.push(Message { role: Role::Assistant, content: MessageContent::Parts(assistant_parts) });

            let mut collected_sources = Vec::new();
            for call in &finished_calls {
                let outcome = executor.dispatch(call, &input.tool_ctx).await;
                yield outcome.tool_call_event;
                yield outcome.tool_result_event;
                if let Some(sources) = outcome.sources {
                    collected_sources.extend(sources);
                }
                messages.push(Message::tool_result(call.call_id.clone(), outcome.content));
            }

            if !collected_sources.is_empty() {
                yield JobEvent::Sources { sources: collected_sources };
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::error::Result;
    use sa_domain::stream::Usage;
    use sa_providers::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse};
    use sa_threads::FindingStore;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        capabilities: LlmCapabilities,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            unimplemented!()
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let events: Vec<Result<StreamEvent>> = if n == 0 {
                vec![
                    Ok(StreamEvent::ToolCallStarted { call_id: "c1".into(), tool_name: "save_finding".into() }),
                    Ok(StreamEvent::ToolCallFinished {
                        call_id: "c1".into(),
                        tool_name: "save_finding".into(),
                        arguments: serde_json::json!({ "content": "note" }),
                    }),
                    Ok(StreamEvent::Done { usage: Some(Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 }), finish_reason: Some("tool_calls".into()) }),
                ]
            } else {
                vec![
                    Ok(StreamEvent::Token { text: "All set.".into() }),
                    Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }),
                ]
            };
            Ok(Box::pin(futures_util::stream::iter(events)))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn tool_ctx() -> ToolContext {
        ToolContext {
            project_id: "p1".into(),
            thread_id: "t1".into(),
            job_id: "j1".into(),
            available: HashSet::new(),
            resources: Vec::new(),
        }
    }

    #[tokio::test]
    async fn completes_after_a_tool_call_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let findings = Arc::new(FindingStore::new(dir.path()).unwrap());
        let registry = Arc::new(ToolRegistry::new(&Default::default(), findings).unwrap());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider {
            capabilities: LlmCapabilities::default(),
            calls: AtomicUsize::new(0),
        });

        let input = AgentLoopInput {
            system_prompt: "You are helpful.".into(),
            history: Vec::new(),
            question: "Save a note".into(),
            tool_ctx: tool_ctx(),
        };

        let mut stream = run(provider, registry, input, 25, CancellationToken::new());
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }

        assert!(matches!(events.last(), Some(JobEvent::Done)));
        assert!(events.iter().any(|e| matches!(e, JobEvent::ToolCall { tool, .. } if tool == "save_finding")));
        assert!(events.iter().any(|e| matches!(e, JobEvent::ToolResult { found: true, .. })));
    }

    #[tokio::test]
    async fn loop_limit_emits_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let findings = Arc::new(FindingStore::new(dir.path()).unwrap());
        let registry = Arc::new(ToolRegistry::new(&Default::default(), findings).unwrap());
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider {
            capabilities: LlmCapabilities::default(),
            calls: AtomicUsize::new(0),
        });

        let input = AgentLoopInput {
            system_prompt: "sys".into(),
            history: Vec::new(),
            question: "loop forever".into(),
            tool_ctx: tool_ctx(),
        };

        let mut stream = run(provider, registry, input, 1, CancellationToken::new());
        let mut last = None;
        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            last = Some(event);
            if terminal {
                break;
            }
        }

        match last {
            Some(JobEvent::Error { message, cancelled }) => {
                assert!(message.contains("loop limit"));
                assert!(!cancelled);
            }
            other => panic!("expected loop-limit error, got {other:?}"),
        }
    }
}
