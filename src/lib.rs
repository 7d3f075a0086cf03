//! # Retreever TUI
//!
//! A terminal explorer for HTTP APIs that document themselves at
//! `/retreever/*`.
//!
//! ## Features
//! - Endpoint catalogue fetched from the server and cached on disk
//! - Persistent request sessions, one per endpoint, with ordered tabs
//! - Variable substitution (`{{name}}`) from server and local variables
//! - Raw, form-data, url-encoded and binary request bodies
//! - Normalised responses with JSON highlighting
//! - Heartbeat-driven refresh of the document and environment
//!
//! ## Architecture
//! Actor-based with channels:
//! - UI Layer (Ratatui) - synchronous
//! - App Layer (State machine)
//! - Network Layer (Tokio runtime)
//! - Sync Layer (Tokio runtime)

pub mod app;
pub mod config;
pub mod content_type;
pub mod error;
pub mod messages;
pub mod models;
pub mod network;
pub mod session;
pub mod storage;
pub mod sync;
pub mod ui;
pub mod variables;

// Re-export commonly used types
pub use app::{AppActor, AppState};
pub use config::Config;
pub use content_type::{resolve, BodyKind, RawKind};
pub use error::{ApiError, StoreError};
pub use messages::{NetworkCommand, NetworkResponse, RenderState, UiEvent};
pub use models::{ApiDoc, Endpoint, HttpMethod};
pub use network::{compile, normalize, NetworkActor, NormalizedResponse};
pub use session::{SessionStore, TabDoc, UiRequest};
pub use storage::Storage;
pub use sync::SyncActor;
