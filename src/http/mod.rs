//! HTTP layer
//!
//! - Server accepting invocation and composition requests
//! - Client dispatching them to other hosts
//! - Form and response encoding shared by both sides

pub mod client;
pub mod messages;
pub mod server;

pub use client::HttpDispatcher;
pub use messages::{HealthResponse, InvocationForm, ERROR_HEADER};
pub use server::HttpServer;
