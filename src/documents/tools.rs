//! The document server's tools.
//!
//! `create_story`, `order_pizza` and `analyze_project` call back into the client
//! while their own call is still in flight. A failed sub-request is reported as the
//! tool's text result rather than as a protocol error.

use super::DocumentServerOptions;
use crate::error::Result;
use crate::interaction::Elicitation;
use crate::server::Server;
use crate::session::RequestContext;
use crate::store::DocumentStore;
use crate::types::{CallToolResult, CreateMessageParams, SamplingMessage, Tool};
use crate::Schema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

#[derive(Schema, Deserialize)]
pub struct ReadDocArgs {
    #[schema(desc = "Id of the document to read")]
    pub doc_id: String,
}

#[derive(Schema, Deserialize)]
pub struct EditDocArgs {
    #[schema(desc = "Id of the document that will be edited")]
    pub doc_id: String,
    #[schema(desc = "The text to replace. Must match exactly, including whitespace.")]
    pub old_str: String,
    #[schema(desc = "The new text to insert in place of the old text.")]
    pub new_str: String,
}

#[derive(Schema, Deserialize)]
pub struct StoryArgs {
    #[schema(desc = "The topic for the story")]
    pub topic: String,
}

#[derive(Schema, Deserialize)]
pub struct PizzaArgs {
    #[schema(desc = "Size of the pizza (small, medium, large)")]
    pub size: String,
}

/// The form shown to the user by `order_pizza`.
#[derive(Schema, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderPreferences {
    #[schema(desc = "Would you like to add extra toppings?")]
    pub want_toppings: bool,
    #[schema(desc = "What toppings would you like? (comma-separated)", default = "mushrooms")]
    #[serde(default = "default_toppings")]
    pub toppings: String,
}

fn default_toppings() -> String {
    "mushrooms".to_string()
}

#[derive(Schema, Deserialize)]
pub struct ProcessItemArgs {
    pub item_id: String,
    #[schema(default = false)]
    #[serde(default)]
    pub should_fail: bool,
}

#[derive(Schema, Deserialize)]
pub struct DownloadArgs {
    #[schema(desc = "Name of the file to download")]
    pub filename: String,
    #[schema(desc = "Size of the file in MB (determines duration)")]
    pub size_mb: u32,
}

#[derive(Schema, Deserialize)]
pub struct ProcessDataArgs {
    #[schema(desc = "Number of records to process")]
    pub records: u32,
}

#[derive(Schema, Deserialize)]
pub struct NoArgs {}

pub fn register(
    server: Server,
    store: Arc<DocumentStore>,
    options: Arc<DocumentServerOptions>,
) -> Server {
    let read_store = Arc::clone(&store);
    let item_options = Arc::clone(&options);
    let download_options = Arc::clone(&options);
    server
        .register_tool_typed(
            Tool::from_args::<ReadDocArgs>(
                "read_doc_contents",
                Some("Read the contents of a document and return it as a string."),
            ),
            move |_ctx, args: ReadDocArgs| read_document(Arc::clone(&read_store), args),
        )
        .register_tool_typed(
            Tool::from_args::<EditDocArgs>(
                "edit_document",
                Some(
                    "Edit a document by replacing a string in the documents content \
                     with a new string.",
                ),
            ),
            move |_ctx, args: EditDocArgs| edit_document(Arc::clone(&store), args),
        )
        .register_tool_typed(
            Tool::from_args::<StoryArgs>(
                "create_story",
                Some("Creates a short story by asking the client to generate it via sampling."),
            ),
            create_story,
        )
        .register_tool_typed(
            Tool::from_args::<PizzaArgs>(
                "order_pizza",
                Some("Orders a pizza with optional toppings through user elicitation."),
            ),
            order_pizza,
        )
        .register_tool_typed(
            Tool::from_args::<ProcessItemArgs>(
                "process_item",
                Some("Demonstrates logging by emitting messages at different severity levels."),
            ),
            move |ctx, args: ProcessItemArgs| process_item(ctx, args, Arc::clone(&item_options)),
        )
        .register_tool_typed(
            Tool::from_args::<DownloadArgs>(
                "download_file",
                Some("Simulate downloading a file with progress tracking."),
            ),
            move |ctx, args: DownloadArgs| download_file(ctx, args, Arc::clone(&download_options)),
        )
        .register_tool_typed(
            Tool::from_args::<ProcessDataArgs>(
                "process_data",
                Some("Simulate processing data records with progress tracking."),
            ),
            move |ctx, args: ProcessDataArgs| process_data(ctx, args, Arc::clone(&options)),
        )
        .register_tool_typed(
            Tool::from_args::<NoArgs>(
                "analyze_project",
                Some("Analyzes project structure using roots provided by the client."),
            ),
            |ctx, _args: NoArgs| analyze_project(ctx),
        )
}

async fn read_document(store: Arc<DocumentStore>, args: ReadDocArgs) -> Result<CallToolResult> {
    Ok(CallToolResult::text(store.read(&args.doc_id).await?))
}

async fn edit_document(store: Arc<DocumentStore>, args: EditDocArgs) -> Result<CallToolResult> {
    store.edit(&args.doc_id, &args.old_str, &args.new_str).await?;
    Ok(CallToolResult::text(format!("Successfully updated document {}", args.doc_id)))
}

async fn create_story(ctx: RequestContext, args: StoryArgs) -> Result<CallToolResult> {
    info!("[Server] Asking client to write a story about '{}'", args.topic);
    let params = CreateMessageParams::new(
        vec![SamplingMessage::user(format!(
            "Write a very short, three-sentence story about: {}",
            args.topic
        ))],
        100,
    );
    match ctx.sample(params).await {
        Ok(result) => {
            let story = match result.content.as_text() {
                Some(text) => text.to_string(),
                None => serde_json::to_string(&result.content)?,
            };
            Ok(CallToolResult::text(story))
        }
        Err(e) => {
            warn!("[Server] Sampling failed: {}", e);
            Ok(CallToolResult::text(format!(
                "Error asking client to generate story: {}",
                e
            )))
        }
    }
}

async fn order_pizza(ctx: RequestContext, args: PizzaArgs) -> Result<CallToolResult> {
    let size = args.size;
    let message = format!(
        "Ordering a {} pizza. Would you like to customize it? Max 3 toppings.",
        size
    );
    let text = match ctx.elicit_as::<OrderPreferences>(message).await {
        Ok(Elicitation::Accept(prefs)) if prefs.want_toppings => {
            format!("Order confirmed: {} pizza with {}", size, prefs.toppings)
        }
        Ok(Elicitation::Accept(_)) => format!("Order confirmed: {} plain pizza", size),
        Ok(Elicitation::Decline) => "Order declined: No pizza ordered".to_string(),
        Ok(Elicitation::Cancel) => "Order cancelled".to_string(),
        Err(e) => {
            warn!("[Server] Elicitation failed: {}", e);
            format!("Error processing pizza order: {}", e)
        }
    };
    Ok(CallToolResult::text(text))
}

async fn process_item(
    ctx: RequestContext,
    args: ProcessItemArgs,
    options: Arc<DocumentServerOptions>,
) -> Result<CallToolResult> {
    let item = args.item_id;
    ctx.debug(format!("Starting processing for item: {}", item));
    tokio::time::sleep(options.log_interval).await;
    ctx.info("Configuration loaded successfully.");
    tokio::time::sleep(options.log_interval).await;

    if args.should_fail {
        ctx.warning(format!(
            "Item '{}' has a validation issue. Attempting to proceed...",
            item
        ));
        tokio::time::sleep(options.log_interval).await;
        ctx.error(format!("Failed to process item '{}'. Critical failure.", item));
        return Ok(CallToolResult::text(format!("Failed to process {}.", item)));
    }

    ctx.info(format!("Item '{}' processed successfully.", item));
    Ok(CallToolResult::text(format!("Successfully processed {}.", item)))
}

async fn download_file(
    ctx: RequestContext,
    args: DownloadArgs,
    options: Arc<DocumentServerOptions>,
) -> Result<CallToolResult> {
    let DownloadArgs { filename, size_mb } = args;
    ctx.info(format!("Starting download of {} ({}MB)", filename, size_mb));

    // 10 chunks per MB
    let Some(total_chunks) = size_mb.checked_mul(10) else {
        return Ok(CallToolResult::error(format!(
            "File size {}MB is too large to download",
            size_mb
        )));
    };
    for chunk in 0..=total_chunks {
        let percentage = if total_chunks == 0 {
            100.0
        } else {
            f64::from(chunk) / f64::from(total_chunks) * 100.0
        };
        ctx.report_progress(
            f64::from(chunk),
            Some(f64::from(total_chunks)),
            Some(format!("Downloading {}... {:.1}%", filename, percentage)),
        );
        tokio::time::sleep(options.chunk_interval).await;
    }

    ctx.info(format!("Download completed: {}", filename));
    Ok(CallToolResult::text(format!(
        "Successfully downloaded {} ({}MB)",
        filename, size_mb
    )))
}

fn processing_stage(i: u32, records: u32) -> &'static str {
    if i == 0 {
        "Initializing data processor..."
    } else if i < records / 4 {
        "Loading and validating records..."
    } else if i < records / 2 {
        "Applying transformations..."
    } else if u64::from(i) < u64::from(records) * 3 / 4 {
        "Running calculations..."
    } else {
        "Finalizing results..."
    }
}

async fn process_data(
    ctx: RequestContext,
    args: ProcessDataArgs,
    options: Arc<DocumentServerOptions>,
) -> Result<CallToolResult> {
    let records = args.records;
    ctx.info(format!("Starting to process {} records", records));
    for i in 0..=records {
        ctx.report_progress(
            f64::from(i),
            Some(f64::from(records)),
            Some(processing_stage(i, records).to_string()),
        );
        tokio::time::sleep(options.record_interval).await;
    }
    ctx.info(format!("Processing completed: {} records", records));
    Ok(CallToolResult::text(format!(
        "Successfully processed {} records",
        records
    )))
}

async fn analyze_project(ctx: RequestContext) -> Result<CallToolResult> {
    let roots = match ctx.list_roots().await {
        Ok(result) => result.roots,
        Err(e) => {
            warn!("[Server] Listing roots failed: {}", e);
            return Ok(CallToolResult::text(format!("Error listing project roots: {}", e)));
        }
    };

    let Some(path) = roots.iter().find_map(|root| root_path(&root.uri)) else {
        return Ok(CallToolResult::text("No project roots found"));
    };
    info!("[Server] Analyzing project at {}", path.display());

    let walk_root = path.clone();
    let count = tokio::task::spawn_blocking(move || count_rust_files(&walk_root))
        .await
        .map_err(|e| crate::error::Error::Other(e.to_string()))?;

    Ok(CallToolResult::text(format!(
        "Found {} Rust files in project at {}",
        count,
        path.display()
    )))
}

/// The local path of a `file://` root.
fn root_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

fn count_rust_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaDescriptor;

    #[test]
    fn test_processing_stages() {
        let stages: Vec<&str> = (0..=8).map(|i| processing_stage(i, 8)).collect();
        assert_eq!(stages[0], "Initializing data processor...");
        assert_eq!(stages[1], "Loading and validating records...");
        assert_eq!(stages[2], "Applying transformations...");
        assert_eq!(stages[4], "Running calculations...");
        assert_eq!(stages[6], "Finalizing results...");
        assert_eq!(stages[8], "Finalizing results...");

        // Large record counts must not overflow the stage boundaries.
        assert_eq!(processing_stage(u32::MAX, u32::MAX), "Finalizing results...");
        assert_eq!(processing_stage(u32::MAX / 2, u32::MAX), "Running calculations...");
    }

    #[test]
    fn test_order_preferences_schema() {
        let schema = OrderPreferences::schema();
        assert_eq!(schema["properties"]["toppings"]["default"], "mushrooms");
        assert_eq!(schema["required"], serde_json::json!(["want_toppings"]));
    }

    #[test]
    fn test_root_path_requires_file_scheme() {
        assert!(root_path("https://example.com/project").is_none());
        assert!(root_path("not a uri").is_none());
        let path = root_path("file:///tmp/project").unwrap();
        assert!(path.ends_with("project"));
    }

    #[test]
    fn test_count_rust_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/nested/mod.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        assert_eq!(count_rust_files(dir.path()), 2);
    }
}
