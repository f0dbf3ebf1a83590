//! The document-editing server: tools, resources, prompts and completions over a
//! shared [`DocumentStore`].

pub mod completions;
pub mod prompts;
pub mod resources;
pub mod tools;

use crate::server::Server;
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;

pub const SERVER_NAME: &str = "DocumentMCP";

/// Pacing of the simulated long-running tools.
#[derive(Debug, Clone)]
pub struct DocumentServerOptions {
    /// Pause between log messages in `process_item`.
    pub log_interval: Duration,
    /// Pause after each chunk in `download_file`.
    pub chunk_interval: Duration,
    /// Pause after each record in `process_data`.
    pub record_interval: Duration,
}

impl Default for DocumentServerOptions {
    fn default() -> Self {
        Self {
            log_interval: Duration::from_millis(200),
            chunk_interval: Duration::from_millis(100),
            record_interval: Duration::from_secs(2),
        }
    }
}

impl DocumentServerOptions {
    /// No pauses at all.
    pub fn immediate() -> Self {
        Self {
            log_interval: Duration::ZERO,
            chunk_interval: Duration::ZERO,
            record_interval: Duration::ZERO,
        }
    }
}

/// Builds the document server on top of `store`.
pub fn document_server(store: Arc<DocumentStore>, options: DocumentServerOptions) -> Server {
    let server = Server::new(SERVER_NAME)
        .with_instructions("Read and edit documents, or try the interactive tools.")
        .with_completions(completions::catalog());
    let server = tools::register(server, Arc::clone(&store), Arc::new(options));
    let server = resources::register(server, store);
    prompts::register(server)
}
