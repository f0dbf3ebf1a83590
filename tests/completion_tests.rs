//! `completion/complete` against the document server's catalog.

use docmcp::documents::{document_server, DocumentServerOptions};
use docmcp::network_adapter::MemoryAdapter;
use docmcp::store::DocumentStore;
use docmcp::types::CompletionReference;
use docmcp::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn connect() -> Client {
    init_tracing();
    let (client_end, server_end) = MemoryAdapter::pair();
    let server = document_server(Arc::new(DocumentStore::seeded()), DocumentServerOptions::immediate());
    tokio::spawn(async move { server.handle_connection(server_end).await });
    Client::connect(client_end).await.unwrap()
}

fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn test_prompt_argument_completion() {
    let test_body = async {
        let client = connect().await;
        let review = CompletionReference::prompt("review_code");

        let all = client.complete(review.clone(), "language", "", HashMap::new()).await.unwrap();
        assert_eq!(all.values, vec!["python", "javascript", "typescript", "java", "go", "rust"]);
        assert_eq!(all.total, Some(6));
        assert_eq!(all.has_more, Some(false));

        let java = client.complete(review.clone(), "language", "java", HashMap::new()).await.unwrap();
        assert_eq!(java.values, vec!["javascript", "java"]);

        // Matching is case sensitive.
        let upper = client.complete(review.clone(), "language", "Py", HashMap::new()).await.unwrap();
        assert!(upper.values.is_empty());

        let focus = client.complete(review, "focus", "s", HashMap::new()).await.unwrap();
        assert_eq!(focus.values, vec!["security", "style"]);
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_framework_depends_on_language() {
    let test_body = async {
        let client = connect().await;
        let setup = CompletionReference::prompt("setup_project");

        let python = client
            .complete(setup.clone(), "framework", "", context(&[("language", "python")]))
            .await
            .unwrap();
        assert_eq!(python.values, vec!["fastapi", "flask", "django"]);

        let mixed_case = client
            .complete(setup.clone(), "framework", "n", context(&[("language", "TypeScript")]))
            .await
            .unwrap();
        assert_eq!(mixed_case.values, vec!["nestjs", "next"]);

        let ruby = client
            .complete(setup.clone(), "framework", "", context(&[("language", "ruby")]))
            .await
            .unwrap();
        assert!(ruby.values.is_empty());

        let unbound = client.complete(setup, "framework", "", HashMap::new()).await.unwrap();
        assert!(unbound.values.is_empty());
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_resource_template_completion() {
    let test_body = async {
        let client = connect().await;
        let github = CompletionReference::resource_template("github://repos/{owner}/{repo}");

        let owners = client.complete(github.clone(), "owner", "", HashMap::new()).await.unwrap();
        assert_eq!(owners.values, vec!["microsoft", "google", "facebook", "openai", "anthropic"]);

        let repos = client
            .complete(github, "repo", "t", context(&[("owner", "google")]))
            .await
            .unwrap();
        assert_eq!(repos.values, vec!["tensorflow"]);
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}

#[tokio::test]
async fn test_unknown_reference_completes_to_nothing() {
    let test_body = async {
        let client = connect().await;

        let unknown_prompt = client
            .complete(CompletionReference::prompt("format"), "doc_id", "", HashMap::new())
            .await
            .unwrap();
        assert!(unknown_prompt.values.is_empty());

        let unknown_template = client
            .complete(CompletionReference::resource_template("docs://{doc_id}"), "doc_id", "", HashMap::new())
            .await
            .unwrap();
        assert!(unknown_template.values.is_empty());
        assert_eq!(unknown_template.has_more, None);
    };

    tokio::time::timeout(Duration::from_secs(6), test_body)
        .await
        .expect("Test timed out after 6 seconds");
}
