// HTTP surface: generation endpoint, model listing and static files

mod app;
mod client_addr;
mod error;
mod handlers;
mod headers;
mod listeners;
mod models;

pub use app::create_app;
pub use listeners::create_listener;

use crate::dispatch::Dispatcher;
use std::sync::Arc;

// Generation requests are small JSON documents
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024; // 1MB

pub type SharedDispatcher = Arc<Dispatcher>;
