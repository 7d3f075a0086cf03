//! Message types for inter-layer communication in the actor-based architecture.
//!
//! UI, App, Network and Sync layers only talk through these messages.

pub mod network;
pub mod render;
pub mod ui_events;

pub use network::{NetworkCommand, NetworkResponse};
pub use render::{EndpointRow, Health, RenderState, TabView};
pub use ui_events::{EditTarget, InputMode, Panel, UiEvent};

pub use crate::sync::{SyncCommand, SyncEvent};
