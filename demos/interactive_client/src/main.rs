//! A client that exercises the document server's interactive tools.
//!
//! Start the server first, then run for example:
//! `cargo run -p interactive-client-demo -- --scenario pizza`
//! `cargo run -p interactive-client-demo -- --scenario roots --root .`

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use docmcp::network_adapter::NdjsonAdapter;
use docmcp::types::{
    CompletionReference, Content, CreateMessageParams, CreateMessageResult, ElicitRequestParams,
    ElicitResult, LogLevel, Role, Root,
};
use docmcp::Client;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    All,
    Documents,
    Story,
    Pizza,
    Logs,
    Progress,
    Roots,
    Completions,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The server address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// A directory to offer the server as a project root. Repeatable.
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,
}

const MOCK_STORY: &str = "In a world of shimmering code, a brave little function set out to find the legendary Golden Bug. \
It traversed treacherous loops and navigated complex conditionals. \
Finally, it found not a bug, but a feature, more valuable than any treasure.";

async fn mock_sampler(params: CreateMessageParams) -> docmcp::Result<CreateMessageResult> {
    println!("<- Client: Received sampling request ({} message(s)).", params.messages.len());
    println!("-> Client: Sending mock story back to the server.");
    Ok(CreateMessageResult {
        role: Role::Assistant,
        content: Content::text(MOCK_STORY),
        model: "mock-llm".to_string(),
        stop_reason: None,
    })
}

/// Reads one line from the terminal without blocking the runtime.
async fn ask(question: String) -> docmcp::Result<String> {
    tokio::task::spawn_blocking(move || -> docmcp::Result<String> {
        print!("{} ", question);
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await
    .map_err(|e| docmcp::Error::Other(e.to_string()))?
}

async fn terminal_elicitation(params: ElicitRequestParams) -> docmcp::Result<ElicitResult> {
    println!("<- Client: Received elicitation request from server.");
    let answer = ask(format!("{} [yes/no/cancel]", params.message)).await?.to_lowercase();
    match answer.as_str() {
        "y" | "yes" | "accept" => {
            let toppings = ask("What toppings would you like?".to_string()).await?;
            let mut content = Map::new();
            content.insert("want_toppings".to_string(), Value::Bool(true));
            if !toppings.is_empty() {
                content.insert("toppings".to_string(), Value::String(toppings));
            }
            Ok(ElicitResult::Accept { content })
        }
        "n" | "no" | "decline" => Ok(ElicitResult::Decline),
        _ => Ok(ElicitResult::Cancel),
    }
}

fn root_for(path: &Path) -> Result<Root> {
    let absolute = std::fs::canonicalize(path)
        .with_context(|| format!("cannot resolve root {}", path.display()))?;
    let uri = Url::from_directory_path(&absolute)
        .map_err(|_| anyhow::anyhow!("not an absolute path: {}", absolute.display()))?;
    Ok(Root {
        uri: uri.to_string(),
        name: absolute.file_name().map(|n| n.to_string_lossy().into_owned()),
    })
}

fn print_result(label: &str, result: &docmcp::types::CallToolResult) {
    println!("[{}] {}", label, result.text_content());
}

async fn documents(client: &Client) -> Result<()> {
    let listing = client.read_resource("docs://documents").await?;
    println!("[documents] {:?}", listing.contents);
    let result = client
        .call_tool("read_doc_contents", json!({ "doc_id": "report.pdf" }))
        .await?;
    print_result("read_doc_contents", &result);
    let prompt = client
        .get_prompt("summarize", HashMap::from([("doc_id".to_string(), "report.pdf".to_string())]))
        .await?;
    println!("[summarize] {:?}", prompt.messages);
    Ok(())
}

async fn completions(client: &Client) -> Result<()> {
    let languages = client
        .complete(CompletionReference::prompt("setup_project"), "language", "py", HashMap::new())
        .await?;
    println!("[complete language 'py'] {:?}", languages.values);

    let frameworks = client
        .complete(
            CompletionReference::prompt("setup_project"),
            "framework",
            "",
            HashMap::from([("language".to_string(), "python".to_string())]),
        )
        .await?;
    println!("[complete framework for python] {:?}", frameworks.values);

    let repos = client
        .complete(
            CompletionReference::resource_template("github://repos/{owner}/{repo}"),
            "repo",
            "",
            HashMap::from([("owner".to_string(), "microsoft".to_string())]),
        )
        .await?;
    println!("[complete repo for microsoft] {:?}", repos.values);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let roots = args.roots.iter().map(|p| root_for(p)).collect::<Result<Vec<_>>>()?;

    println!("[Client] Connecting to {}...", args.addr);
    let adapter = NdjsonAdapter::connect(&args.addr).await?;
    let client = Client::builder()
        .client_info("interactive-client", env!("CARGO_PKG_VERSION"))
        .on_sample(mock_sampler)
        .on_elicit(terminal_elicitation)
        .with_roots(roots)
        .on_progress(|p| {
            let total = p.total.map(|t| format!("/{}", t)).unwrap_or_default();
            println!(
                "  progress {}{} {}",
                p.progress,
                total,
                p.message.unwrap_or_default()
            );
        })
        .on_log(|m| println!("  [{:?}] {}", m.level, m.data))
        .connect(adapter)
        .await?;
    println!(
        "[Client] Connected to {} {}",
        client.server_info().server_info.name,
        client.server_info().server_info.version
    );

    let run = |s: Scenario| args.scenario == Scenario::All || args.scenario == s;

    if run(Scenario::Documents) {
        documents(&client).await?;
    }
    if run(Scenario::Story) {
        let result = client.call_tool("create_story", json!({ "topic": "a rusty robot" })).await?;
        print_result("create_story", &result);
    }
    if run(Scenario::Pizza) {
        let result = client.call_tool("order_pizza", json!({ "size": "large" })).await?;
        print_result("order_pizza", &result);
    }
    if run(Scenario::Logs) {
        client.set_log_level(LogLevel::Debug).await?;
        for should_fail in [false, true] {
            let result = client
                .call_tool("process_item", json!({ "item_id": "item-42", "should_fail": should_fail }))
                .await?;
            print_result("process_item", &result);
        }
    }
    if run(Scenario::Progress) {
        let result = client
            .call_tool("download_file", json!({ "filename": "dataset.csv", "size_mb": 1 }))
            .await?;
        print_result("download_file", &result);
    }
    if run(Scenario::Roots) {
        let result = client.call_tool("analyze_project", json!({})).await?;
        print_result("analyze_project", &result);
    }
    if run(Scenario::Completions) {
        completions(&client).await?;
    }

    client.close();
    Ok(())
}
