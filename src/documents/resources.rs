use super::completions::GITHUB_REPO_TEMPLATE;
use crate::error::{Error, Result};
use crate::server::Server;
use crate::store::DocumentStore;
use crate::types::{ReadResourceResult, Resource, ResourceTemplate};
use std::collections::HashMap;
use std::sync::Arc;

pub const DOCUMENT_LIST_URI: &str = "docs://documents";
pub const DOCUMENT_TEMPLATE: &str = "docs://{doc_id}";

pub fn register(server: Server, store: Arc<DocumentStore>) -> Server {
    let list_store = Arc::clone(&store);
    server
        .register_resource(
            Resource {
                uri: DOCUMENT_LIST_URI.to_string(),
                name: "documents".to_string(),
                description: Some("The ids of all documents.".to_string()),
                mime_type: Some("application/json".to_string()),
            },
            move |_ctx, uri| list_documents(Arc::clone(&list_store), uri),
        )
        .register_resource_template(
            ResourceTemplate {
                uri_template: DOCUMENT_TEMPLATE.to_string(),
                name: "document".to_string(),
                description: Some("The contents of a single document.".to_string()),
                mime_type: Some("text/plain".to_string()),
            },
            move |_ctx, uri, vars| fetch_document(Arc::clone(&store), uri, vars),
        )
        .register_resource_template(
            ResourceTemplate {
                uri_template: GITHUB_REPO_TEMPLATE.to_string(),
                name: "github_repo".to_string(),
                description: Some("GitHub repository with owner and repo completions.".to_string()),
                mime_type: Some("text/plain".to_string()),
            },
            |_ctx, uri, vars| async move { github_repo(&uri, &vars) },
        )
}

async fn list_documents(store: Arc<DocumentStore>, uri: String) -> Result<ReadResourceResult> {
    let ids = store.ids().await;
    Ok(ReadResourceResult::text(&uri, "application/json", serde_json::to_string(&ids)?))
}

async fn fetch_document(
    store: Arc<DocumentStore>,
    uri: String,
    vars: HashMap<String, String>,
) -> Result<ReadResourceResult> {
    let doc_id = variable(&vars, "doc_id")?;
    let content = store.read(doc_id).await?;
    Ok(ReadResourceResult::text(&uri, "text/plain", content))
}

fn github_repo(uri: &str, vars: &HashMap<String, String>) -> Result<ReadResourceResult> {
    let owner = variable(vars, "owner")?;
    let repo = variable(vars, "repo")?;
    Ok(ReadResourceResult::text(
        uri,
        "text/plain",
        format!(
            "GitHub Repository: {owner}/{repo}\nURL: https://github.com/{owner}/{repo}"
        ),
    ))
}

fn variable<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Malformed(format!("missing URI variable '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_repo_text() {
        let vars = HashMap::from([
            ("owner".to_string(), "openai".to_string()),
            ("repo".to_string(), "whisper".to_string()),
        ]);
        let result = github_repo("github://repos/openai/whisper", &vars).unwrap();
        let crate::types::ResourceContents::Text(text) = &result.contents[0] else {
            panic!("expected text contents");
        };
        assert_eq!(
            text.text,
            "GitHub Repository: openai/whisper\nURL: https://github.com/openai/whisper"
        );
    }

    #[tokio::test]
    async fn test_fetch_unknown_document_is_not_found() {
        let store = Arc::new(DocumentStore::seeded());
        let vars = HashMap::from([("doc_id".to_string(), "missing.md".to_string())]);
        let err = fetch_document(store, "docs://missing.md".to_string(), vars)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
