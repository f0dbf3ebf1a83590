//! End-to-end tests: the document server and a `Client` talking over real TCP.

use docmcp::documents::{document_server, DocumentServerOptions};
use docmcp::network_adapter::NdjsonAdapter;
use docmcp::store::DocumentStore;
use docmcp::types::{ResourceContents, INVALID_PARAMS, RESOURCE_NOT_FOUND};
use docmcp::{Client, Error};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// --- Test Setup ---

/// Routes library logs to the test harness. Set `RUST_LOG` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Binds to port 0 and hands the bound listener to the server, so there is no
// window in which another process could take the port.
async fn setup_test_server(store: Arc<DocumentStore>) -> (String, JoinHandle<()>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap().to_string();
    let server = document_server(store, DocumentServerOptions::immediate());
    let server_handle = tokio::spawn(async move {
        let _ = server.serve_listener::<NdjsonAdapter>(listener).await;
    });
    (server_addr, server_handle)
}

async fn connect(addr: &str) -> Client {
    let adapter = NdjsonAdapter::connect(addr).await.unwrap();
    Client::connect(adapter).await.unwrap()
}

fn text_of(contents: &[ResourceContents]) -> &str {
    match &contents[0] {
        ResourceContents::Text(text) => &text.text,
        other => panic!("expected text contents, got {:?}", other),
    }
}

// --- The Tests ---

#[tokio::test]
async fn test_handshake_and_listing() {
    let test_body = async {
        let (addr, _server) = setup_test_server(Arc::new(DocumentStore::seeded())).await;
        let client = connect(&addr).await;

        assert_eq!(client.server_info().server_info.name, "DocumentMCP");
        assert!(client.server_info().capabilities.completions.is_some());
        client.ping().await.unwrap();

        let tools: Vec<String> = client.list_tools().await.unwrap().into_iter().map(|t| t.name).collect();
        for name in [
            "read_doc_contents",
            "edit_document",
            "create_story",
            "order_pizza",
            "process_item",
            "download_file",
            "process_data",
            "analyze_project",
        ] {
            assert!(tools.contains(&name.to_string()), "missing tool {}", name);
        }

        let templates = client.list_resource_templates().await.unwrap();
        assert_eq!(templates.len(), 2);
        let prompts = client.list_prompts().await.unwrap();
        assert_eq!(prompts.len(), 4);
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_read_and_edit_documents() {
    let test_body = async {
        let store = Arc::new(DocumentStore::seeded());
        let (addr, _server) = setup_test_server(Arc::clone(&store)).await;
        let client = connect(&addr).await;

        let first = client.read_resource("docs://documents").await.unwrap();
        let second = client.read_resource("docs://documents").await.unwrap();
        assert_eq!(first, second);
        let ids: Vec<String> = serde_json::from_str(text_of(&first.contents)).unwrap();
        assert_eq!(ids.len(), 6);
        assert!(ids.contains(&"report.pdf".to_string()));

        let result = client
            .call_tool(
                "edit_document",
                json!({ "doc_id": "report.pdf", "old_str": "20m", "new_str": "25m" }),
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "Successfully updated document report.pdf");

        let doc = client.read_resource("docs://report.pdf").await.unwrap();
        assert_eq!(
            text_of(&doc.contents),
            "The report details the state of a 25m condenser tower."
        );
        // The edit went to the shared store, not a per-connection copy.
        assert_eq!(
            store.read("report.pdf").await.unwrap(),
            "The report details the state of a 25m condenser tower."
        );

        let read = client
            .call_tool("read_doc_contents", json!({ "doc_id": "plan.md" }))
            .await
            .unwrap();
        assert_eq!(
            read.text_content(),
            "The plan outlines the steps for the project's implementation."
        );
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_errors_are_reported_per_surface() {
    let test_body = async {
        let (addr, _server) = setup_test_server(Arc::new(DocumentStore::seeded())).await;
        let client = connect(&addr).await;

        // A failing tool is a result with is_error set.
        let missing = client
            .call_tool("read_doc_contents", json!({ "doc_id": "nope.txt" }))
            .await
            .unwrap();
        assert!(missing.is_error);
        assert!(missing.text_content().contains("Doc with id nope.txt not found"));

        // Arguments that do not fit the schema never reach the handler.
        let invalid = client
            .call_tool("edit_document", json!({ "doc_id": "plan.md" }))
            .await
            .unwrap();
        assert!(invalid.is_error);
        assert!(invalid.text_content().contains("Invalid arguments for tool 'edit_document'"));

        match client.call_tool("does-not-exist", json!({})).await {
            Err(Error::Remote(data)) => assert_eq!(data.code, INVALID_PARAMS),
            other => panic!("unexpected {:?}", other),
        }
        match client.read_resource("docs://nope.txt").await {
            Err(Error::Remote(data)) => assert_eq!(data.code, RESOURCE_NOT_FOUND),
            other => panic!("unexpected {:?}", other),
        }
        match client.get_prompt("format", HashMap::new()).await {
            Err(Error::Remote(data)) => assert_eq!(data.code, INVALID_PARAMS),
            other => panic!("unexpected {:?}", other),
        }

        // The connection survives all of the above.
        client.ping().await.unwrap();
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_prompts_and_github_resource() {
    let test_body = async {
        let (addr, _server) = setup_test_server(Arc::new(DocumentStore::seeded())).await;
        let client = connect(&addr).await;

        let prompt = client
            .get_prompt(
                "setup_project",
                HashMap::from([
                    ("language".to_string(), "rust".to_string()),
                    ("framework".to_string(), "axum".to_string()),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(prompt.messages.len(), 1);
        assert_eq!(
            prompt.messages[0].content.as_text(),
            Some("Create a rust project using axum framework.")
        );

        let repo = client.read_resource("github://repos/google/protobuf").await.unwrap();
        assert_eq!(
            text_of(&repo.contents),
            "GitHub Repository: google/protobuf\nURL: https://github.com/google/protobuf"
        );
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_two_clients_share_one_store() {
    let test_body = async {
        let (addr, _server) = setup_test_server(Arc::new(DocumentStore::seeded())).await;
        let writer = connect(&addr).await;
        let reader = connect(&addr).await;

        writer
            .call_tool(
                "edit_document",
                json!({ "doc_id": "spec.txt", "old_str": "equipment", "new_str": "pumps" }),
            )
            .await
            .unwrap();
        let read = reader
            .call_tool("read_doc_contents", json!({ "doc_id": "spec.txt" }))
            .await
            .unwrap();
        assert_eq!(
            read.text_content(),
            "These specifications define the technical requirements for the pumps."
        );
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}
