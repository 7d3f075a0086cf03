//! App state - data owned by the App actor

use std::collections::HashMap;
use std::time::Duration;

use crate::content_type::BodyKind;
use crate::messages::render::{EndpointRow, Health, TabView};
use crate::messages::ui_events::{EditTarget, InputMode, Panel};
use crate::messages::RenderState;
use crate::models::{collections, ApiDoc, Collection, EndpointSummary, EnvironmentSchema};
use crate::session::{Editing, FormValue, KeyValueEntry, SessionStore, TabDoc};
use crate::storage::Storage;
use crate::variables::{self, ResolvedVariable};

/// Most recent notices kept for display
pub const MAX_NOTICES: usize = 5;

/// Editable cell of the selected request row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCell {
    pub key: String,
    /// `None` for file rows, which are edited through attachments
    pub value: Option<String>,
    pub key_editable: bool,
}

/// Main application state
pub struct AppState {
    pub storage: Storage,
    pub sessions: SessionStore,

    // Document
    pub doc: Option<ApiDoc>,
    pub collections: Vec<Collection>,
    pub selected_endpoint: usize,

    // Variables
    pub env_schema: EnvironmentSchema,
    pub vars: Vec<ResolvedVariable>,
    pub selected_var: usize,

    // UI state
    pub active_panel: Panel,
    pub input_mode: InputMode,
    pub edit_target: Option<EditTarget>,
    pub input: String,
    pub cursor_position: usize,
    pub selected_row: usize,
    pub response_scroll: u16,

    // Requests in flight, by session key
    pub next_request_id: u64,
    pub pending: HashMap<String, u64>,

    pub health: Health,
    pub notices: Vec<String>,
    pub status: Option<String>,

    // Popups
    pub show_help: bool,
    pub show_attach_input: bool,
    pub attach_path_input: String,
}

impl AppState {
    pub fn new(storage: Storage, debounce: Duration) -> Self {
        let mut sessions = SessionStore::new(&storage, debounce);
        sessions.subscribe(|event| tracing::debug!(?event, "Session transition"));
        AppState {
            sessions,
            storage,
            doc: None,
            collections: Vec::new(),
            selected_endpoint: 0,
            env_schema: EnvironmentSchema::default(),
            vars: vec![ResolvedVariable::empty()],
            selected_var: 0,
            active_panel: Panel::Endpoints,
            input_mode: InputMode::Normal,
            edit_target: None,
            input: String::new(),
            cursor_position: 0,
            selected_row: 0,
            response_scroll: 0,
            next_request_id: 1,
            pending: HashMap::new(),
            health: Health::default(),
            notices: Vec::new(),
            status: None,
            show_help: false,
            show_attach_input: false,
            attach_path_input: String::new(),
        }
    }

    /// Load persisted sessions and local variables.
    pub async fn restore(&mut self) {
        self.sessions.restore().await;
        let local = self.storage.env.local_vars().await;
        self.vars = variables::merge(&self.env_schema, &local);
    }

    /// Generate a unique request ID
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    pub fn set_document(&mut self, doc: ApiDoc) {
        self.collections = collections(&doc);
        self.doc = Some(doc);
        let count = self.endpoint_list().len();
        self.selected_endpoint = self.selected_endpoint.min(count.saturating_sub(1));
    }

    /// Re-merge the variables against a new server schema, keeping local edits.
    pub fn set_environment(&mut self, schema: EnvironmentSchema) {
        let local = variables::local_snapshot(&self.vars);
        self.vars = variables::merge(&schema, &local);
        self.env_schema = schema;
        self.selected_var = self.selected_var.min(self.vars.len().saturating_sub(1));
    }

    /// Sidebar endpoints in display order.
    pub fn endpoint_list(&self) -> Vec<&EndpointSummary> {
        self.collections
            .iter()
            .flat_map(|c| c.endpoints.iter())
            .collect()
    }

    pub fn active_key(&self) -> Option<String> {
        self.sessions.order().active().map(String::from)
    }

    pub fn active_tab(&self) -> Option<&TabDoc> {
        self.sessions.active()
    }

    /// Rows of the focused request section.
    pub fn row_cells(&self) -> Vec<RowCell> {
        let Some(tab) = self.active_tab() else {
            return Vec::new();
        };
        let req = &tab.request;
        let kv = |rows: &[KeyValueEntry]| -> Vec<RowCell> {
            rows.iter()
                .map(|r| RowCell {
                    key: r.key.clone(),
                    value: Some(r.value.clone()),
                    key_editable: r.editable,
                })
                .collect()
        };
        match req.editing {
            Editing::Params => kv(&req.query_params),
            Editing::Headers => kv(&req.headers),
            Editing::Body => match req.body_kind {
                BodyKind::FormData => req
                    .body
                    .form_data
                    .iter()
                    .map(|f| RowCell {
                        key: f.key.clone(),
                        value: match &f.value {
                            FormValue::Text(t) => Some(t.clone()),
                            FormValue::Files(_) => None,
                        },
                        key_editable: f.editable,
                    })
                    .collect(),
                BodyKind::UrlEncoded => kv(&req.body.url_encoded),
                BodyKind::None | BodyKind::Raw(_) | BodyKind::Binary => Vec::new(),
            },
        }
    }

    pub fn push_notice(&mut self, notice: String) {
        self.notices.push(notice);
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    /// Move quota notices raised by the session store into the display list.
    pub fn collect_notices(&mut self) {
        for notice in self.sessions.take_notices() {
            self.push_notice(notice);
        }
    }

    /// Convert state to RenderState for UI
    pub fn to_render_state(&self) -> RenderState {
        let active = self.sessions.order().active();

        let mut endpoints = Vec::new();
        for collection in &self.collections {
            endpoints.push(EndpointRow::Group(collection.name.clone()));
            for ep in &collection.endpoints {
                let key = crate::session::tab_key(ep.method, &ep.path);
                endpoints.push(EndpointRow::Endpoint {
                    method: ep.method,
                    path: ep.path.clone(),
                    name: ep.name.clone(),
                    secured: ep.secured,
                    open: self.sessions.order().contains(&key),
                });
            }
        }

        let tabs = self
            .sessions
            .iter()
            .map(|tab| TabView {
                key: tab.key.clone(),
                name: tab.name.clone(),
                method: tab.method,
                active: Some(tab.key.as_str()) == active,
                loading: self.pending.contains_key(&tab.key),
            })
            .collect();

        RenderState {
            doc_title: self
                .doc
                .as_ref()
                .map(|d| format!("{} {}", d.name, d.version).trim().to_string()),
            endpoints,
            selected_endpoint: self.selected_endpoint,
            tabs,
            session: self.active_tab().cloned(),
            selected_row: self.selected_row,
            is_loading: active.is_some_and(|k| self.pending.contains_key(k)),
            response_scroll: self.response_scroll,
            vars: self.vars.clone(),
            selected_var: self.selected_var,
            active_panel: self.active_panel,
            input_mode: self.input_mode,
            edit_target: self.edit_target,
            input: self.input.clone(),
            cursor_position: self.cursor_position,
            health: self.health.clone(),
            notices: self.notices.clone(),
            status: self.status.clone(),
            show_help: self.show_help,
            show_attach_input: self.show_attach_input,
            attach_path_input: self.attach_path_input.clone(),
        }
    }
}
