//! Serves the document server over TCP or stdio.
//!
//! Run it like:
//! `cargo run -p doc-server-demo -- --addr 127.0.0.1:8080`
//! `cargo run -p doc-server-demo -- --stdio`

use anyhow::Result;
use clap::Parser;
use docmcp::documents::{document_server, DocumentServerOptions};
use docmcp::network_adapter::NdjsonAdapter;
use docmcp::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Args {
    /// The address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Serve a single session on stdin/stdout instead of listening on TCP.
    #[arg(long)]
    stdio: bool,

    /// Seconds `process_data` spends on each record.
    #[arg(long, default_value_t = 2.0)]
    record_secs: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so the stdio transport stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = DocumentServerOptions {
        record_interval: Duration::from_secs_f64(args.record_secs.max(0.0)),
        ..Default::default()
    };
    let server = document_server(Arc::new(DocumentStore::seeded()), options);

    if args.stdio {
        info!("[Server] Serving on stdio");
        server.handle_connection(NdjsonAdapter::stdio()).await?;
        return Ok(());
    }

    tokio::select! {
        result = server.tcp_listen::<NdjsonAdapter>(&args.addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("[Server] Shutting down"),
    }
    Ok(())
}
