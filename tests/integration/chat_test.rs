//! Chat Orchestrator Integration Tests
//!
//! End-to-end runs through the scripted runtime: streaming, tool activity,
//! checklist interception, question round trips, and error classification.

use serde_json::json;

use atelier_host::models::envelope::{channels, AnswerSubmission, SendMessageRequest};
use atelier_host::services::runtime::{RunEvent, ASK_USER_TOOL, SKILL_TOOL, TODO_TOOL};
use atelier_host::TodoStatus;

use crate::support::{wait_for, Harness};

fn completed() -> RunEvent {
    RunEvent::Completed {
        is_error: false,
        message: None,
    }
}

#[tokio::test]
async fn test_streaming_chunks_then_complete() {
    let harness = Harness::start(vec![vec![
        RunEvent::TextDelta {
            content: "Hello ".to_string(),
        },
        RunEvent::TextDelta {
            content: "world".to_string(),
        },
        RunEvent::Usage {
            input_tokens: 10,
            output_tokens: 4,
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "greet me").await.unwrap();
    harness.wait_idle().await;

    // first push is the processing status, ahead of any content
    let statuses = harness.sink.on_channel(channels::STATUS_UPDATE);
    assert_eq!(statuses[0]["status"], "processing");
    assert_eq!(statuses.last().unwrap()["status"], "idle");

    let chunks = harness.sink.on_channel(channels::MESSAGE_CHUNK);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["content"], "Hello ");
    assert_eq!(chunks[0]["requestId"], "req-1");
    assert_eq!(chunks[1]["content"], "world");

    let complete = harness.sink.on_channel(channels::MESSAGE_COMPLETE);
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["content"], "Hello world");
    assert_eq!(complete[0]["requestId"], "req-1");
    assert_eq!(complete[0]["usage"]["inputTokens"], 10);
    assert_eq!(complete[0]["usage"]["outputTokens"], 4);
}

#[tokio::test]
async fn test_tool_use_precedes_tool_result() {
    let harness = Harness::start(vec![vec![
        RunEvent::ToolUse {
            tool_use_id: "tu-1".to_string(),
            tool_name: "Bash".to_string(),
            input: json!({ "command": "ls" }),
        },
        RunEvent::ToolResult {
            tool_use_id: "tu-1".to_string(),
            output: "file.txt".to_string(),
            is_error: false,
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "list files").await.unwrap();
    harness.wait_idle().await;

    let frames = harness.sink.frames();
    let use_at = frames
        .iter()
        .position(|f| f.channel == channels::TOOL_USE)
        .unwrap();
    let result_at = frames
        .iter()
        .position(|f| f.channel == channels::TOOL_RESULT)
        .unwrap();
    assert!(use_at < result_at);

    let uses = harness.sink.on_channel(channels::TOOL_USE);
    assert_eq!(uses[0]["toolName"], "Bash");
    assert_eq!(uses[0]["toolUseId"], "tu-1");

    let results = harness.sink.on_channel(channels::TOOL_RESULT);
    assert_eq!(results[0]["toolUseId"], "tu-1");
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[0]["output"], "file.txt");
    assert!(results[0].get("error").is_none());
    // timed from the observed invocation
    assert!(results[0]["durationMs"].is_i64());
}

#[tokio::test]
async fn test_failed_tool_result_carries_error() {
    let harness = Harness::start(vec![vec![
        RunEvent::ToolUse {
            tool_use_id: "tu-1".to_string(),
            tool_name: "Read".to_string(),
            input: json!({ "file_path": "/missing" }),
        },
        RunEvent::ToolResult {
            tool_use_id: "tu-1".to_string(),
            output: "no such file".to_string(),
            is_error: true,
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "read it").await.unwrap();
    harness.wait_idle().await;

    let results = harness.sink.on_channel(channels::TOOL_RESULT);
    assert_eq!(results[0]["success"], false);
    assert_eq!(results[0]["error"], "no such file");
    assert!(results[0]["durationMs"].is_i64());
}

#[tokio::test]
async fn test_stop_does_not_starve_next_request() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use atelier_host::models::envelope::InitRequest;
    use atelier_host::services::runtime::{AgentRuntime, RunRequest};
    use atelier_host::{AgentBridge, AgentResult, ChatOrchestrator, HostConfig, TodoStore};
    use tokio::sync::mpsc;

    use crate::support::CollectingSink;

    // First run: the event stream stays open long after cancellation, like
    // a runtime process that takes its time dying. Second run completes.
    struct SluggishRuntime {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AgentRuntime for SluggishRuntime {
        async fn run(&self, _request: RunRequest) -> AgentResult<mpsc::Receiver<RunEvent>> {
            let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                if first {
                    let _hold = tx;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                } else {
                    let _ = tx
                        .send(RunEvent::TextDelta {
                            content: "fresh".to_string(),
                        })
                        .await;
                    let _ = tx
                        .send(RunEvent::Completed {
                            is_error: false,
                            message: None,
                        })
                        .await;
                }
            });
            Ok(rx)
        }
    }

    let sink = Arc::new(CollectingSink::default());
    let (bridge, commands) = AgentBridge::new(sink.clone(), &HostConfig::default());
    let todos = Arc::new(TodoStore::new());
    let runtime = Arc::new(SluggishRuntime {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(ChatOrchestrator::new(
        Arc::clone(&bridge),
        runtime as Arc<dyn AgentRuntime>,
        todos,
    ));
    tokio::spawn(async move { orchestrator.run(commands).await });

    let workspace = tempfile::tempdir().unwrap();
    let reply = bridge
        .init(InitRequest {
            workspace_path: Some(workspace.path().display().to_string()),
            ..Default::default()
        })
        .await;
    assert!(reply.success);

    bridge
        .send_message(SendMessageRequest {
            request_id: "req-1".to_string(),
            content: "slow one".to_string(),
            attachments: Vec::new(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(bridge.stop().await.success);

    // the next request must be serviced even though the cancelled run's
    // stream never closed
    bridge
        .send_message(SendMessageRequest {
            request_id: "req-2".to_string(),
            content: "quick one".to_string(),
            attachments: Vec::new(),
        })
        .await
        .unwrap();

    let observer = sink.clone();
    assert!(
        wait_for(|| {
            observer
                .on_channel(channels::MESSAGE_COMPLETE)
                .iter()
                .any(|complete| complete["requestId"] == "req-2")
        })
        .await,
        "second request was never serviced"
    );
    assert!(sink
        .on_channel(channels::MESSAGE_COMPLETE)
        .iter()
        .all(|complete| complete["requestId"] != "req-1"));
}

#[tokio::test]
async fn test_todo_write_is_mirrored_and_broadcast() {
    let harness = Harness::start(vec![vec![
        RunEvent::ToolUse {
            tool_use_id: "tu-1".to_string(),
            tool_name: TODO_TOOL.to_string(),
            input: json!({
                "todos": [
                    { "content": "research", "status": "pending" },
                    { "content": "write", "status": "pending" }
                ]
            }),
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "plan the work").await.unwrap();
    harness.wait_idle().await;

    let updates = harness.sink.on_channel(channels::TODO_UPDATE);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["requestId"], "req-1");
    let todos = updates[0]["todos"].as_array().unwrap();
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0]["content"], "research");
    assert_eq!(todos[0]["status"], "pending");
    // both items stamped in the same replace
    assert_eq!(todos[0]["createdAt"], todos[1]["createdAt"]);

    // the store mirrors what was broadcast
    let list = harness.todos.get_list().await.unwrap();
    assert_eq!(list.items.len(), 2);
    assert!(list
        .items
        .iter()
        .all(|item| item.status == TodoStatus::Pending));
}

#[tokio::test]
async fn test_malformed_todo_write_does_not_fail_run() {
    let harness = Harness::start(vec![vec![
        RunEvent::ToolUse {
            tool_use_id: "tu-1".to_string(),
            tool_name: TODO_TOOL.to_string(),
            input: json!({ "todos": "not an array" }),
        },
        RunEvent::TextDelta {
            content: "carrying on".to_string(),
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "plan").await.unwrap();
    harness.wait_idle().await;

    assert!(harness.sink.on_channel(channels::TODO_UPDATE).is_empty());
    assert!(harness.sink.on_channel(channels::ERROR).is_empty());
    assert_eq!(harness.sink.on_channel(channels::MESSAGE_COMPLETE).len(), 1);
    assert!(harness.todos.get_list().await.is_none());
}

#[tokio::test]
async fn test_run_failure_classified_and_recoverable() {
    let harness = Harness::start(vec![
        vec![RunEvent::Completed {
            is_error: true,
            message: Some("connection reset by upstream".to_string()),
        }],
        vec![
            RunEvent::TextDelta {
                content: "second try".to_string(),
            },
            completed(),
        ],
    ]);
    harness.init().await;
    harness.send("req-1", "try").await.unwrap();
    harness.wait_idle().await;

    let errors = harness.sink.on_channel(channels::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "NETWORK_ERROR");
    assert_eq!(errors[0]["recoverable"], true);
    assert_eq!(errors[0]["requestId"], "req-1");
    assert!(harness.sink.on_channel(channels::MESSAGE_COMPLETE).is_empty());

    // recoverable means a plain retry is admitted without re-init
    harness.send("req-2", "try again").await.unwrap();
    harness.wait_idle().await;
    let complete = harness.sink.on_channel(channels::MESSAGE_COMPLETE);
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0]["requestId"], "req-2");
}

#[tokio::test]
async fn test_question_answers_injected_into_tool_input() {
    let harness = Harness::start(vec![vec![
        RunEvent::ToolUse {
            tool_use_id: "tu-q".to_string(),
            tool_name: ASK_USER_TOOL.to_string(),
            input: json!({
                "questions": [{
                    "question": "Deploy where?",
                    "multiSelect": true,
                    "options": [{ "label": "staging" }, { "label": "production" }]
                }]
            }),
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "deploy").await.unwrap();

    let sink = harness.sink.clone();
    assert!(wait_for(|| !sink.on_channel(channels::QUESTION).is_empty()).await);
    let question = &harness.sink.on_channel(channels::QUESTION)[0];
    assert_eq!(question["question"], "Deploy where?");
    assert_eq!(question["multiSelect"], true);
    assert_eq!(question["options"][1]["label"], "production");
    assert_eq!(question["requestId"], "req-1");

    let question_id = question["questionId"].as_str().unwrap().to_string();
    harness
        .bridge
        .answer(AnswerSubmission {
            question_id,
            request_id: "req-1".to_string(),
            selected_values: vec!["staging".to_string()],
        })
        .await;
    harness.wait_idle().await;

    // the forwarded tool-use carries the collected answers
    let uses = harness.sink.on_channel(channels::TOOL_USE);
    assert_eq!(uses.len(), 1);
    assert_eq!(
        uses[0]["toolInput"]["questions"][0]["selectedValues"],
        json!(["staging"])
    );
}

#[tokio::test]
async fn test_session_resume_and_attachment_context() {
    let harness = Harness::start(vec![
        vec![
            RunEvent::Session {
                session_id: "sess-42".to_string(),
            },
            completed(),
        ],
        vec![completed()],
    ]);
    harness.init().await;

    let attachment = harness.workspace.path().join("notes.txt");
    std::fs::write(&attachment, "remember the milk").unwrap();
    harness
        .bridge
        .send_message(SendMessageRequest {
            request_id: "req-1".to_string(),
            content: "first".to_string(),
            attachments: vec![atelier_host::models::envelope::Attachment {
                path: attachment.display().to_string(),
                name: Some("notes.txt".to_string()),
                mime_type: None,
            }],
        })
        .await
        .unwrap();
    harness.wait_idle().await;

    harness.send("req-2", "second").await.unwrap();
    harness.wait_idle().await;

    let runs = harness.runtime.runs();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].resume_session.is_none());
    assert!(runs[0].prompt.starts_with("first"));
    assert!(runs[0].prompt.contains("remember the milk"));
    // the captured session id threads into the next run
    assert_eq!(runs[1].resume_session.as_deref(), Some("sess-42"));
    assert_eq!(runs[1].prompt, "second");
}

#[tokio::test]
async fn test_skill_invocation_is_broadcast() {
    let harness = Harness::start(vec![vec![
        RunEvent::ToolUse {
            tool_use_id: "tu-1".to_string(),
            tool_name: SKILL_TOOL.to_string(),
            input: json!({ "name": "pdf-extraction" }),
        },
        completed(),
    ]]);
    harness.init().await;
    harness.send("req-1", "read the pdf").await.unwrap();
    harness.wait_idle().await;

    let skills = harness.sink.on_channel(channels::SKILL_LOADED);
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0]["skillName"], "pdf-extraction");
    assert_eq!(skills[0]["requestId"], "req-1");
}

#[tokio::test]
async fn test_artifact_push_carries_envelope() {
    let harness = Harness::start(vec![]);
    harness
        .bridge
        .send_artifact_created("req-1", json!({ "path": "report.md", "kind": "document" }));

    let artifacts = harness.sink.on_channel(channels::ARTIFACT_CREATED);
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0]["artifact"]["path"], "report.md");
    assert_eq!(artifacts[0]["requestId"], "req-1");
    assert!(artifacts[0]["id"].is_string());
    assert!(artifacts[0]["timestamp"].is_i64());
}

#[tokio::test]
async fn test_default_model_applies_when_init_omits_one() {
    let config = atelier_host::HostConfig {
        default_model: Some("sonnet".to_string()),
        ..Default::default()
    };
    let harness = Harness::start_with_config(vec![vec![completed()]], config);
    harness.init().await;
    assert_eq!(harness.bridge.status().await.model.as_deref(), Some("sonnet"));

    harness.send("req-1", "hi").await.unwrap();
    harness.wait_idle().await;
    assert_eq!(harness.runtime.runs()[0].model.as_deref(), Some("sonnet"));
}

#[tokio::test]
async fn test_question_timeout_resolves_with_empty_answer() {
    let config = atelier_host::HostConfig {
        question_timeout_secs: Some(0),
        ..Default::default()
    };
    let harness = Harness::start_with_config(
        vec![vec![
            RunEvent::ToolUse {
                tool_use_id: "tu-q".to_string(),
                tool_name: ASK_USER_TOOL.to_string(),
                input: json!({
                    "questions": [{
                        "question": "Still there?",
                        "options": [{ "label": "yes" }]
                    }]
                }),
            },
            completed(),
        ]],
        config,
    );
    harness.init().await;
    harness.send("req-1", "ask away").await.unwrap();
    harness.wait_idle().await;

    // the run finished despite no answer arriving
    assert_eq!(harness.sink.on_channel(channels::MESSAGE_COMPLETE).len(), 1);
    let uses = harness.sink.on_channel(channels::TOOL_USE);
    assert_eq!(
        uses[0]["toolInput"]["questions"][0]["selectedValues"],
        json!([])
    );
}
