//! A bidirectional Model Context Protocol session.
//!
//! Either end of a connection can issue requests while one of its own requests is
//! still in flight. A server tool can elicit input from the user, ask the client to
//! sample a message, or list the client's roots, and then finish its call. The crate
//! also ships the pieces a document-editing server needs: a completion catalog, URI
//! templates for resources, and an in-memory [`store::DocumentStore`].

// Lets the derive macro refer to `::docmcp` from inside this crate as well.
extern crate self as docmcp;

pub mod client;
pub mod completion;
pub mod documents;
pub mod envelope;
pub mod error;
pub mod interaction;
pub mod network_adapter;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;
pub mod types;
pub mod uri_template;

pub use client::{Client, ClientBuilder};
pub use docmcp_macros::Schema;
pub use error::{Error, Result};
pub use server::Server;
pub use session::{RequestContext, Session, SessionConfig, SessionRole};

use serde_json::Value;

/// Describes the JSON schema of a type, used for tool input schemas and
/// elicitation forms. Usually derived with `#[derive(Schema)]`.
pub trait SchemaDescriptor {
    fn schema() -> Value;
}

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
    pub use serde_json;
}
