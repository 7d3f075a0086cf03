//! Render state - data structure sent from App layer to UI for rendering

use chrono::{DateTime, Utc};

use crate::messages::ui_events::{EditTarget, InputMode, Panel};
use crate::models::HttpMethod;
use crate::session::TabDoc;
use crate::variables::ResolvedVariable;

/// One line of the endpoint sidebar
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointRow {
    Group(String),
    Endpoint {
        method: HttpMethod,
        path: String,
        name: String,
        secured: bool,
        /// A session is open for this endpoint
        open: bool,
    },
}

/// One entry of the session strip
#[derive(Debug, Clone, PartialEq)]
pub struct TabView {
    pub key: String,
    pub name: String,
    pub method: HttpMethod,
    pub active: bool,
    pub loading: bool,
}

/// Last heartbeat result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Health {
    /// `None` until the first ping finished
    pub online: Option<bool>,
    pub uptime: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Complete state needed by the UI to render
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    // Document
    pub doc_title: Option<String>,
    pub endpoints: Vec<EndpointRow>,
    pub selected_endpoint: usize,

    // Sessions
    pub tabs: Vec<TabView>,
    pub session: Option<TabDoc>,
    pub selected_row: usize,
    pub is_loading: bool,
    pub response_scroll: u16,

    // Variables
    pub vars: Vec<ResolvedVariable>,
    pub selected_var: usize,

    // UI state
    pub active_panel: Panel,
    pub input_mode: InputMode,
    pub edit_target: Option<EditTarget>,
    pub input: String,
    pub cursor_position: usize,

    pub health: Health,
    pub notices: Vec<String>,
    pub status: Option<String>,

    // Popups
    pub show_help: bool,
    pub show_attach_input: bool,
    pub attach_path_input: String,
}
