//! Calls whose handlers call back into the client before they finish.

use docmcp::documents::{document_server, DocumentServerOptions};
use docmcp::network_adapter::MemoryAdapter;
use docmcp::store::DocumentStore;
use docmcp::types::{
    CallToolResult, Content, CreateMessageResult, ElicitResult, LogLevel, ProgressParams, Role,
    Root, Tool,
};
use docmcp::{Client, ClientBuilder, Error, Server};
use serde_json::{json, Map};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Routes library logs to the test harness. Set `RUST_LOG` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn documents(options: DocumentServerOptions) -> Server {
    document_server(Arc::new(DocumentStore::seeded()), options)
}

async fn connect(server: Server, builder: ClientBuilder) -> Client {
    init_tracing();
    let (client_end, server_end) = MemoryAdapter::pair();
    tokio::spawn(async move { server.handle_connection(server_end).await });
    builder.connect(client_end).await.unwrap()
}

fn accept(pairs: serde_json::Value) -> ElicitResult {
    let content: Map<String, serde_json::Value> = serde_json::from_value(pairs).unwrap();
    ElicitResult::Accept { content }
}

#[tokio::test]
async fn test_call_suspended_in_elicitation_does_not_block_others() {
    let test_body = async {
        let asked = Arc::new(Notify::new());
        let answer = Arc::new(Notify::new());
        let builder = Client::builder().on_elicit({
            let asked = Arc::clone(&asked);
            let answer = Arc::clone(&answer);
            move |params| {
                let asked = Arc::clone(&asked);
                let answer = Arc::clone(&answer);
                async move {
                    assert!(params.message.starts_with("Ordering a large pizza"));
                    asked.notify_one();
                    answer.notified().await;
                    Ok(accept(json!({ "want_toppings": true, "toppings": "olives" })))
                }
            }
        });
        let client = Arc::new(connect(documents(DocumentServerOptions::immediate()), builder).await);

        let pizza = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call_tool("order_pizza", json!({ "size": "large" })).await }
        });
        asked.notified().await;

        // The pizza order is parked in the client's elicitation callback.
        let read = client
            .call_tool("read_doc_contents", json!({ "doc_id": "deposition.md" }))
            .await
            .unwrap();
        assert_eq!(
            read.text_content(),
            "This deposition covers the testimony of Angela Smith, P.E."
        );
        assert!(!pizza.is_finished());

        answer.notify_one();
        let pizza = pizza.await.unwrap().unwrap();
        assert_eq!(pizza.text_content(), "Order confirmed: large pizza with olives");
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_elicitation_outcomes() {
    let test_body = async {
        let answers = Arc::new(Mutex::new(vec![
            ElicitResult::Cancel,
            ElicitResult::Decline,
            accept(json!({ "want_toppings": false })),
            // toppings falls back to the schema default
            accept(json!({ "want_toppings": true })),
        ]));
        let builder = Client::builder().on_elicit(move |_params| {
            let next = answers.lock().unwrap().pop();
            async move { next.ok_or_else(|| Error::Other("no more answers".to_string())) }
        });
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;

        let mut texts = Vec::new();
        for size in ["small", "medium", "large", "xl"] {
            let result = client.call_tool("order_pizza", json!({ "size": size })).await.unwrap();
            texts.push(result.text_content());
        }
        assert_eq!(
            texts,
            vec![
                "Order confirmed: small pizza with mushrooms",
                "Order confirmed: medium plain pizza",
                "Order declined: No pizza ordered",
                "Order cancelled",
            ]
        );
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_malformed_accept_is_rejected() {
    let test_body = async {
        let builder = Client::builder()
            .on_elicit(|_params| async { Ok(accept(json!({ "toppings": "ham" }))) });
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;

        let result = client.call_tool("order_pizza", json!({ "size": "large" })).await.unwrap();
        assert!(
            result.text_content().starts_with("Error processing pizza order:"),
            "got {}",
            result.text_content()
        );
        assert!(result.text_content().contains("want_toppings"));
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_sampling_round_trip() {
    let test_body = async {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let builder = Client::builder().on_sample({
            let prompts = Arc::clone(&prompts);
            move |params| {
                let text = params.messages[0].content.as_text().unwrap_or_default().to_string();
                prompts.lock().unwrap().push((text, params.max_tokens));
                async {
                    Ok(CreateMessageResult {
                        role: Role::Assistant,
                        content: Content::text("Once there was a crab. It rusted. The end."),
                        model: "mock".to_string(),
                        stop_reason: None,
                    })
                }
            }
        });
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;

        let result = client.call_tool("create_story", json!({ "topic": "crabs" })).await.unwrap();
        assert_eq!(result.text_content(), "Once there was a crab. It rusted. The end.");
        assert_eq!(
            prompts.lock().unwrap().as_slice(),
            &[(
                "Write a very short, three-sentence story about: crabs".to_string(),
                100
            )]
        );
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_missing_capabilities_become_text_results() {
    let test_body = async {
        let client = connect(documents(DocumentServerOptions::immediate()), Client::builder()).await;

        let story = client.call_tool("create_story", json!({ "topic": "x" })).await.unwrap();
        assert!(story.text_content().starts_with("Error asking client to generate story:"));
        assert!(story.text_content().contains("sampling"));

        let pizza = client.call_tool("order_pizza", json!({ "size": "small" })).await.unwrap();
        assert!(pizza.text_content().starts_with("Error processing pizza order:"));
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_analyze_project_uses_client_roots() {
    let test_body = async {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/bin")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/bin/tool.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        let uri = url::Url::from_directory_path(dir.path()).unwrap().to_string();

        let builder = Client::builder().with_roots(vec![
            Root {
                uri: "https://example.com/not-a-dir".to_string(),
                name: None,
            },
            Root {
                uri,
                name: Some("project".to_string()),
            },
        ]);
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;
        let result = client.call_tool("analyze_project", json!({})).await.unwrap();
        assert!(
            result.text_content().starts_with("Found 2 Rust files in project at "),
            "got {}",
            result.text_content()
        );

        let builder = Client::builder().with_roots(Vec::new());
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;
        let result = client.call_tool("analyze_project", json!({})).await.unwrap();
        assert_eq!(result.text_content(), "No project roots found");
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_log_messages_respect_level() {
    let test_body = async {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let builder = Client::builder().on_log({
            let levels = Arc::clone(&levels);
            move |message| levels.lock().unwrap().push(message.level)
        });
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;

        let ok = client
            .call_tool("process_item", json!({ "item_id": "a1" }))
            .await
            .unwrap();
        assert_eq!(ok.text_content(), "Successfully processed a1.");
        assert_eq!(
            std::mem::take(&mut *levels.lock().unwrap()),
            vec![LogLevel::Debug, LogLevel::Info, LogLevel::Info]
        );

        client.set_log_level(LogLevel::Warning).await.unwrap();
        let failed = client
            .call_tool("process_item", json!({ "item_id": "b2", "should_fail": true }))
            .await
            .unwrap();
        assert_eq!(failed.text_content(), "Failed to process b2.");
        assert_eq!(
            *levels.lock().unwrap(),
            vec![LogLevel::Warning, LogLevel::Error]
        );
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_progress_is_reported_in_order() {
    let test_body = async {
        let updates: Arc<Mutex<Vec<ProgressParams>>> = Arc::new(Mutex::new(Vec::new()));
        let builder = Client::builder().on_progress({
            let updates = Arc::clone(&updates);
            move |p| updates.lock().unwrap().push(p)
        });
        let client = connect(documents(DocumentServerOptions::immediate()), builder).await;

        let result = client
            .call_tool("download_file", json!({ "filename": "a.bin", "size_mb": 1 }))
            .await
            .unwrap();
        assert_eq!(result.text_content(), "Successfully downloaded a.bin (1MB)");

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 11);
        let progress: Vec<f64> = updates.iter().map(|p| p.progress).collect();
        assert_eq!(progress, (0..=10).map(f64::from).collect::<Vec<_>>());
        assert!(updates.iter().all(|p| p.total == Some(10.0)));
        assert_eq!(updates[0].message.as_deref(), Some("Downloading a.bin... 0.0%"));
        assert_eq!(updates[10].message.as_deref(), Some("Downloading a.bin... 100.0%"));
        // All updates carry the token of the one call that produced them.
        assert!(updates.iter().all(|p| p.progress_token == updates[0].progress_token));
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_close_cancels_every_pending_call() {
    let test_body = async {
        let options = DocumentServerOptions {
            chunk_interval: Duration::from_millis(20),
            ..DocumentServerOptions::immediate()
        };
        let server = documents(options).register_tool(
            Tool {
                name: "wait_forever".to_string(),
                ..Default::default()
            },
            |_ctx, _args| async {
                std::future::pending::<()>().await;
                Ok(CallToolResult::text("unreachable"))
            },
        );

        let asked = Arc::new(Notify::new());
        let progressed = Arc::new(Notify::new());
        let progress_count = Arc::new(AtomicUsize::new(0));
        let builder = Client::builder()
            .on_elicit({
                let asked = Arc::clone(&asked);
                move |_params| {
                    asked.notify_one();
                    std::future::pending::<docmcp::Result<ElicitResult>>()
                }
            })
            .on_progress({
                let progressed = Arc::clone(&progressed);
                let progress_count = Arc::clone(&progress_count);
                move |_p| {
                    progress_count.fetch_add(1, Ordering::SeqCst);
                    progressed.notify_one();
                }
            });
        let client = Arc::new(connect(server, builder).await);

        let calls = [
            ("wait_forever", json!({})),
            ("order_pizza", json!({ "size": "large" })),
            ("download_file", json!({ "filename": "big.iso", "size_mb": 1000 })),
        ]
        .map(|(name, args)| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call_tool(name, args).await })
        });

        asked.notified().await;
        progressed.notified().await;
        assert_eq!(client.session().outstanding_requests().len(), 3);

        client.close();
        for call in calls {
            let outcome = call.await.unwrap();
            assert!(matches!(outcome, Err(Error::Cancelled)), "got {:?}", outcome);
        }

        let seen = progress_count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(progress_count.load(Ordering::SeqCst), seen);
        assert!(client.session().outstanding_requests().is_empty());
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_call_timeout() {
    let test_body = async {
        let server = Server::new("slow").register_tool(
            Tool {
                name: "sleepy".to_string(),
                ..Default::default()
            },
            |_ctx, _args| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(CallToolResult::text("late"))
            },
        );
        let client = connect(server, Client::builder()).await;
        let outcome = client
            .call_tool_with_timeout("sleepy", json!({}), Duration::from_millis(50))
            .await;
        assert!(matches!(outcome, Err(Error::Timeout)), "got {:?}", outcome);
        client.ping().await.unwrap();
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_oversized_download_is_a_tool_error() {
    let test_body = async {
        let client = connect(documents(DocumentServerOptions::immediate()), Client::builder()).await;
        let result = client
            .call_tool("download_file", json!({ "filename": "huge.iso", "size_mb": 500_000_000 }))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.text_content().contains("too large"), "got {}", result.text_content());
        client.ping().await.unwrap();
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}
