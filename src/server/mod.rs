//! Defines the public API for the server side of a connection.
//!
//! This module declares the sub-modules for the server implementation and re-exports
//! the primary, public-facing types.

mod server;
pub mod session;

pub use server::Server;
pub use session::ServerSession;
