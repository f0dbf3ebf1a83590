//! Defines the public API for the client side of a connection.

mod client;

pub use client::{Client, ClientBuilder};
