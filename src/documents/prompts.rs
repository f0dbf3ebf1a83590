use crate::error::{Error, Result};
use crate::server::Server;
use crate::types::{GetPromptResult, Prompt, PromptArgument, PromptMessage};
use std::collections::HashMap;

pub fn register(server: Server) -> Server {
    server
        .register_prompt(
            Prompt {
                name: "format".to_string(),
                description: Some(
                    "Rewrites the contents of the document in Markdown format.".to_string(),
                ),
                arguments: Some(vec![PromptArgument::required(
                    "doc_id",
                    "Id of the document to format",
                )]),
            },
            |_ctx, args| async move { format_document(&args) },
        )
        .register_prompt(
            Prompt {
                name: "summarize".to_string(),
                description: Some("Summarizes the contents of the document.".to_string()),
                arguments: Some(vec![PromptArgument::required(
                    "doc_id",
                    "Id of the document to summarize",
                )]),
            },
            |_ctx, args| async move { summarize_document(&args) },
        )
        .register_prompt(
            Prompt {
                name: "review_code".to_string(),
                description: Some("Code review with completable language".to_string()),
                arguments: Some(vec![
                    PromptArgument::required("language", "Programming language of the code"),
                    PromptArgument::optional("focus", "Aspect to focus on (defaults to all)"),
                ]),
            },
            |_ctx, args| async move { review_code(&args) },
        )
        .register_prompt(
            Prompt {
                name: "setup_project".to_string(),
                description: Some("Project setup with context-aware framework".to_string()),
                arguments: Some(vec![
                    PromptArgument::required("language", "Programming language of the project"),
                    PromptArgument::required("framework", "Framework to build on"),
                ]),
            },
            |_ctx, args| async move { setup_project(&args) },
        )
}

fn argument<'a>(args: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    args.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::Malformed(format!("missing prompt argument '{}'", name)))
}

fn single(description: &str, text: String) -> GetPromptResult {
    GetPromptResult {
        description: Some(description.to_string()),
        messages: vec![PromptMessage::user(text)],
    }
}

fn format_document(args: &HashMap<String, String>) -> Result<GetPromptResult> {
    let doc_id = argument(args, "doc_id")?;
    let text = format!(
        "Your goal is to reformat a document to be written with markdown syntax.\n\n\
         The id of the document you need to reformat is:\n\
         <document_id>\n{doc_id}\n</document_id>\n\n\
         Add in headers, bullet points, tables, etc as necessary. Feel free to add in extra \
         text, but don't change the meaning of the report.\n\
         Use the 'edit_document' tool to edit the document. After the document has been \
         edited, respond with the final version of the doc. Don't explain your changes.\n"
    );
    Ok(single("Rewrites the contents of the document in Markdown format.", text))
}

fn summarize_document(args: &HashMap<String, String>) -> Result<GetPromptResult> {
    let doc_id = argument(args, "doc_id")?;
    let text = format!(
        "Your goal is to summarize the contents of the document.\n\
         Document ID: {doc_id}\n\
         Include a concise summary of the document's main points.\n"
    );
    Ok(single("Summarizes the contents of the document.", text))
}

fn review_code(args: &HashMap<String, String>) -> Result<GetPromptResult> {
    let language = argument(args, "language")?;
    let focus = args.get("focus").map(String::as_str).unwrap_or("all");
    Ok(single(
        "Code review with completable language",
        format!("Please review this {language} code focusing on {focus} aspects."),
    ))
}

fn setup_project(args: &HashMap<String, String>) -> Result<GetPromptResult> {
    let language = argument(args, "language")?;
    let framework = argument(args, "framework")?;
    Ok(single(
        "Project setup with context-aware framework",
        format!("Create a {language} project using {framework} framework."),
    ))
}
