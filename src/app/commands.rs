//! Command handlers - business logic for processing UI events

use std::path::Path;

use crate::app::AppState;
use crate::content_type::BodyKind;
use crate::messages::ui_events::{EditTarget, InputMode, Panel};
use crate::messages::{NetworkCommand, NetworkResponse, SyncCommand, SyncEvent};
use crate::models::find_endpoint;
use crate::network::compile;
use crate::session::{Editing, FormValue, KeyValueEntry, UiRequest};
use crate::variables;

impl AppState {
    // ========================
    // Navigation
    // ========================

    pub fn next_panel(&mut self) {
        self.active_panel = self.active_panel.next();
    }

    pub fn prev_panel(&mut self) {
        self.active_panel = self.active_panel.prev();
    }

    pub fn select_prev(&mut self) {
        match self.active_panel {
            Panel::Endpoints => {
                let count = self.endpoint_list().len();
                self.selected_endpoint = wrap_prev(self.selected_endpoint, count);
            }
            Panel::Request => {
                self.selected_row = wrap_prev(self.selected_row, self.row_cells().len());
            }
            Panel::Response => self.response_scroll = self.response_scroll.saturating_sub(1),
            Panel::Variables => {
                self.selected_var = wrap_prev(self.selected_var, self.vars.len());
            }
        }
    }

    pub fn select_next(&mut self) {
        match self.active_panel {
            Panel::Endpoints => {
                let count = self.endpoint_list().len();
                self.selected_endpoint = wrap_next(self.selected_endpoint, count);
            }
            Panel::Request => {
                self.selected_row = wrap_next(self.selected_row, self.row_cells().len());
            }
            Panel::Response => self.response_scroll = self.response_scroll.saturating_add(1),
            Panel::Variables => {
                self.selected_var = wrap_next(self.selected_var, self.vars.len());
            }
        }
    }

    // ========================
    // Input editing
    // ========================

    pub fn start_editing(&mut self, target: EditTarget) {
        let initial = match self.editable_text(target) {
            Ok(text) => text,
            Err(reason) => {
                self.status = Some(reason.to_string());
                return;
            }
        };
        self.input = initial;
        self.cursor_position = self.input.len();
        self.edit_target = Some(target);
        self.input_mode = InputMode::Editing;
        self.status = None;
    }

    /// Current text of `target`, or why it cannot be edited.
    fn editable_text(&self, target: EditTarget) -> Result<String, &'static str> {
        let tab = self.active_tab();
        match target {
            EditTarget::Url => tab.map(|t| t.request.url.clone()).ok_or("No open session"),
            EditTarget::Body => {
                let tab = tab.ok_or("No open session")?;
                match tab.request.body_kind {
                    BodyKind::Raw(_) => Ok(tab.request.body.raw.clone().unwrap_or_default()),
                    _ => Err("Body is not raw text"),
                }
            }
            EditTarget::RowKey | EditTarget::RowValue => {
                let cells = self.row_cells();
                let cell = cells.get(self.selected_row).ok_or("No row selected")?;
                match target {
                    EditTarget::RowKey if !cell.key_editable => Err("Key is fixed by the schema"),
                    EditTarget::RowKey => Ok(cell.key.clone()),
                    _ => cell.value.clone().ok_or("File row: attach files with f"),
                }
            }
            EditTarget::VarName | EditTarget::VarValue => {
                let var = self.vars.get(self.selected_var).ok_or("No variable selected")?;
                match target {
                    EditTarget::VarName if !var.local => Err("Server variables cannot be renamed"),
                    EditTarget::VarName => Ok(var.name.clone()),
                    _ if !var.editable => Err("Variable is fixed by the server"),
                    _ => Ok(var.value.clone()),
                }
            }
        }
    }

    pub async fn stop_editing(&mut self) {
        self.apply_input(true).await;
        self.input_mode = InputMode::Normal;
        self.edit_target = None;
        self.input.clear();
        self.cursor_position = 0;
        self.selected_row = self
            .selected_row
            .min(self.row_cells().len().saturating_sub(1));
    }

    pub fn move_cursor_left(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position = self.input[..self.cursor_position]
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
        }
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.len() {
            self.cursor_position = self.input[self.cursor_position..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.cursor_position + i)
                .unwrap_or(self.input.len());
        }
    }

    pub async fn enter_char(&mut self, c: char) {
        if self.cursor_position <= self.input.len() {
            self.input.insert(self.cursor_position, c);
            self.cursor_position += c.len_utf8();
            self.apply_input(false).await;
        }
    }

    pub async fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            let prev = self.input[..self.cursor_position]
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.input.remove(prev);
            self.cursor_position = prev;
            self.apply_input(false).await;
        }
    }

    /// Write the input buffer into its target. Row edits that would blank
    /// the row and variable edits wait for `finished`.
    async fn apply_input(&mut self, finished: bool) {
        let Some(target) = self.edit_target else {
            return;
        };
        let text = self.input.clone();
        match target {
            EditTarget::Url | EditTarget::Body | EditTarget::RowKey | EditTarget::RowValue => {
                let Some(key) = self.active_key() else {
                    return;
                };
                if !finished && self.would_blank_row(target, &text) {
                    return;
                }
                let row = self.selected_row;
                self.sessions
                    .update(&key, move |req| match target {
                        EditTarget::Url => req.url = text,
                        EditTarget::Body => req.body.raw = Some(text),
                        _ => set_row(req, row, target, text),
                    })
                    .await;
            }
            EditTarget::VarName | EditTarget::VarValue if finished => {
                let Some(var) = self.vars.get(self.selected_var) else {
                    return;
                };
                let (name, value) = match target {
                    EditTarget::VarName => (text, var.value.clone()),
                    _ => (var.name.clone(), text),
                };
                if variables::set_variable(&mut self.vars, self.selected_var, name, value) {
                    self.persist_vars().await;
                }
                self.selected_var = self.selected_var.min(self.vars.len().saturating_sub(1));
            }
            EditTarget::VarName | EditTarget::VarValue => {}
        }
    }

    fn would_blank_row(&self, target: EditTarget, text: &str) -> bool {
        if !matches!(target, EditTarget::RowKey | EditTarget::RowValue) {
            return false;
        }
        let cells = self.row_cells();
        let Some(cell) = cells.get(self.selected_row) else {
            return false;
        };
        let (key, value) = match target {
            EditTarget::RowKey => (text, cell.value.as_deref().unwrap_or_default()),
            _ => (cell.key.as_str(), text),
        };
        key.trim().is_empty() && value.trim().is_empty() && cell.value.is_some()
    }

    // ========================
    // Sessions
    // ========================

    pub async fn open_endpoint(&mut self) {
        let Some((method, path)) = self
            .endpoint_list()
            .get(self.selected_endpoint)
            .map(|e| (e.method, e.path.clone()))
        else {
            return;
        };
        let Some(doc) = &self.doc else {
            return;
        };
        let Some(endpoint) = find_endpoint(doc, method, &path).cloned() else {
            return;
        };
        let prefix = doc.uri_prefix.clone();

        self.sessions.open(&endpoint, prefix.as_deref()).await;
        self.selected_row = 0;
        self.response_scroll = 0;
        self.active_panel = Panel::Request;
    }

    pub async fn close_tab(&mut self) -> Vec<NetworkCommand> {
        if let Some(key) = self.active_key() {
            self.sessions.close(&key).await;
        }
        self.after_close()
    }

    pub async fn close_other_tabs(&mut self) -> Vec<NetworkCommand> {
        if let Some(key) = self.active_key() {
            self.sessions.close_others(&key).await;
        }
        self.after_close()
    }

    pub async fn close_all_tabs(&mut self) -> Vec<NetworkCommand> {
        self.sessions.close_all().await;
        self.after_close()
    }

    /// Cancel requests whose session is gone.
    fn after_close(&mut self) -> Vec<NetworkCommand> {
        self.selected_row = 0;
        self.response_scroll = 0;
        let order = self.sessions.order();
        let orphaned: Vec<String> = self
            .pending
            .keys()
            .filter(|k| !order.contains(k))
            .cloned()
            .collect();
        orphaned
            .into_iter()
            .filter_map(|k| self.pending.remove(&k))
            .map(NetworkCommand::Cancel)
            .collect()
    }

    pub fn switch_tab(&mut self, step: isize) {
        if self.sessions.focus_neighbour(step).is_some() {
            self.selected_row = 0;
            self.response_scroll = 0;
        }
    }

    pub async fn move_tab(&mut self, step: isize) {
        let Some(key) = self.active_key() else {
            return;
        };
        let Some(rank) = self.sessions.order().rank(&key) else {
            return;
        };
        let target = rank as isize + step;
        if target >= 0 && (target as usize) < self.sessions.order().len() {
            self.sessions.reorder(&key, target as usize).await;
        }
    }

    // ========================
    // Request editing
    // ========================

    pub async fn next_section(&mut self) {
        if let Some(key) = self.active_key() {
            self.sessions
                .update(&key, |req| req.editing = req.editing.next())
                .await;
            self.selected_row = 0;
        }
    }

    pub async fn cycle_body_kind(&mut self) {
        if let Some(key) = self.active_key() {
            self.sessions
                .update(&key, |req| req.body_kind = req.body_kind.next())
                .await;
            self.selected_row = 0;
        }
    }

    pub async fn toggle_row(&mut self) {
        let Some(key) = self.active_key() else {
            return;
        };
        let row = self.selected_row;
        self.sessions
            .update(&key, move |req| match req.editing {
                Editing::Params => toggle_kv(&mut req.query_params, row),
                Editing::Headers => toggle_kv(&mut req.headers, row),
                Editing::Body => match req.body_kind {
                    BodyKind::FormData => {
                        if let Some(f) = req.body.form_data.get_mut(row) {
                            f.ignore = !f.ignore;
                        }
                    }
                    BodyKind::UrlEncoded => toggle_kv(&mut req.body.url_encoded, row),
                    _ => {}
                },
            })
            .await;
    }

    /// Remove the selected local row, or the binary body. Schema rows can
    /// only be ignored.
    pub async fn delete_row(&mut self) {
        let Some(tab) = self.active_tab() else {
            return;
        };
        let key = tab.key.clone();
        let req = &tab.request;
        let (editing, kind) = (req.editing, req.body_kind);
        let row = self.selected_row;

        let local = match (editing, kind) {
            (Editing::Params, _) => req.query_params.get(row).map(|r| r.local),
            (Editing::Headers, _) => req.headers.get(row).map(|r| r.local),
            (Editing::Body, BodyKind::FormData) => req.body.form_data.get(row).map(|r| r.local),
            (Editing::Body, BodyKind::UrlEncoded) => req.body.url_encoded.get(row).map(|r| r.local),
            (Editing::Body, BodyKind::Binary) => Some(req.body.binary_file_id.is_some()),
            (Editing::Body, _) => None,
        };
        match local {
            Some(true) => {}
            Some(false) if kind != BodyKind::Binary || editing != Editing::Body => {
                self.status = Some("Schema rows can only be ignored".to_string());
                return;
            }
            _ => return,
        }

        match (editing, kind) {
            (Editing::Body, BodyKind::Binary) => {
                self.sessions
                    .update(&key, |req| req.body.binary_file_id = None)
                    .await;
            }
            (Editing::Body, BodyKind::FormData) => {
                self.sessions.remove_form_row(&key, row).await;
            }
            _ => {
                self.sessions
                    .update(&key, move |req| {
                        let rows = match req.editing {
                            Editing::Params => &mut req.query_params,
                            Editing::Headers => &mut req.headers,
                            Editing::Body => &mut req.body.url_encoded,
                        };
                        if row < rows.len() {
                            rows.remove(row);
                        }
                    })
                    .await;
            }
        }
        self.selected_row = self
            .selected_row
            .min(self.row_cells().len().saturating_sub(1));
    }

    // ========================
    // Attachments
    // ========================

    pub fn open_attach_input(&mut self) {
        let accepts = self.active_tab().is_some_and(|t| {
            t.request.body_kind == BodyKind::Binary
                || (t.request.body_kind == BodyKind::FormData && t.request.editing == Editing::Body)
        });
        if accepts {
            self.show_attach_input = true;
            self.attach_path_input.clear();
        } else {
            self.status = Some("Select a form-data row or a binary body first".to_string());
        }
    }

    pub fn attach_path_char(&mut self, c: char) {
        self.attach_path_input.push(c);
    }

    pub fn attach_path_backspace(&mut self) {
        self.attach_path_input.pop();
    }

    pub fn cancel_attach_input(&mut self) {
        self.show_attach_input = false;
        self.attach_path_input.clear();
    }

    /// Read the file at the entered path and store it as an attachment.
    pub async fn load_attachment(&mut self) {
        let path = self.attach_path_input.trim().to_string();
        self.cancel_attach_input();
        let Some(tab) = self.active_tab() else {
            return;
        };
        let key = tab.key.clone();
        let kind = tab.request.body_kind;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Reading attachment failed");
                self.status = Some(format!("Cannot read {}: {}", path, e));
                return;
            }
        };
        let file_name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());

        let stored = match kind {
            BodyKind::Binary => self.sessions.set_binary(&key, &file_name, None, &bytes).await,
            _ => {
                self.sessions
                    .attach_file(&key, self.selected_row, &file_name, None, &bytes)
                    .await
            }
        };
        self.status = Some(match stored {
            Some(_) => format!("Attached {} ({} bytes)", file_name, bytes.len()),
            None => format!("Could not attach {}", file_name),
        });
    }

    // ========================
    // Variables
    // ========================

    pub async fn delete_variable(&mut self) {
        if variables::remove_variable(&mut self.vars, self.selected_var) {
            self.selected_var = self.selected_var.min(self.vars.len().saturating_sub(1));
            self.persist_vars().await;
        } else {
            self.status = Some("Server variables cannot be removed".to_string());
        }
    }

    async fn persist_vars(&mut self) {
        let snapshot = variables::local_snapshot(&self.vars);
        if let Err(e) = self.storage.env.save_local_vars(&snapshot).await {
            tracing::warn!(error = %e, "Saving variables failed");
            if e.is_quota() {
                self.push_notice(e.to_string());
            }
        }
    }

    // ========================
    // HTTP
    // ========================

    /// Compile the active session into a network command.
    pub async fn prepare_request(&mut self) -> Option<NetworkCommand> {
        let tab = self.active_tab()?;
        if self.pending.contains_key(&tab.key) {
            self.status = Some("Request already running".to_string());
            return None;
        }
        let tab_key = tab.key.clone();
        let request = compile(tab, &self.vars, &self.storage.files).await;

        let id = self.next_id();
        self.pending.insert(tab_key.clone(), id);
        self.status = None;
        tracing::info!(id, method = %request.method, url = %request.url, "Sending request");
        Some(NetworkCommand::Execute {
            id,
            tab_key,
            request,
        })
    }

    pub fn cancel_request(&mut self) -> Option<NetworkCommand> {
        let key = self.active_key()?;
        let id = self.pending.remove(&key)?;
        self.status = Some("Request cancelled".to_string());
        Some(NetworkCommand::Cancel(id))
    }

    pub async fn handle_response(&mut self, response: NetworkResponse) {
        // responses for superseded requests are dropped
        if self.pending.get(response.tab_key()) != Some(&response.id()) {
            tracing::debug!(id = response.id(), "Ignoring stale response");
            return;
        }
        self.pending.remove(response.tab_key());

        match response {
            NetworkResponse::Completed {
                tab_key, response, ..
            } => {
                if self.active_key().as_deref() == Some(tab_key.as_str()) {
                    self.response_scroll = 0;
                }
                self.sessions.set_response(&tab_key, response).await;
            }
            NetworkResponse::Cancelled { .. } => {
                self.status = Some("Request cancelled".to_string());
            }
        }
    }

    // ========================
    // Sync
    // ========================

    pub fn refresh(&mut self) -> SyncCommand {
        self.status = Some("Refreshing document...".to_string());
        SyncCommand::Refresh
    }

    pub fn handle_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::DocLoaded { doc, from_cache } => {
                tracing::debug!(from_cache, up_time = %doc.up_time, "Document loaded");
                self.set_document(doc);
                if !from_cache {
                    self.status = None;
                }
            }
            SyncEvent::EnvLoaded { schema, .. } => self.set_environment(schema),
            SyncEvent::Health {
                online,
                uptime,
                checked_at,
            } => {
                self.health.online = Some(online);
                self.health.uptime = uptime;
                self.health.checked_at = Some(checked_at);
            }
        }
    }

    // ========================
    // Popups
    // ========================

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn close_help(&mut self) {
        self.show_help = false;
    }
}

fn wrap_prev(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        index.checked_sub(1).unwrap_or(len - 1).min(len - 1)
    }
}

fn wrap_next(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (index + 1) % len
    }
}

fn toggle_kv(rows: &mut [KeyValueEntry], row: usize) {
    if let Some(r) = rows.get_mut(row) {
        r.ignore = !r.ignore;
    }
}

fn set_kv(rows: &mut [KeyValueEntry], row: usize, target: EditTarget, text: String) {
    let Some(r) = rows.get_mut(row) else {
        return;
    };
    match target {
        EditTarget::RowKey if r.editable => r.key = text,
        EditTarget::RowValue => r.value = text,
        _ => {}
    }
}

fn set_row(req: &mut UiRequest, row: usize, target: EditTarget, text: String) {
    match req.editing {
        Editing::Params => set_kv(&mut req.query_params, row, target, text),
        Editing::Headers => set_kv(&mut req.headers, row, target, text),
        Editing::Body => match req.body_kind {
            BodyKind::FormData => {
                let Some(f) = req.body.form_data.get_mut(row) else {
                    return;
                };
                match (target, &mut f.value) {
                    (EditTarget::RowKey, _) if f.editable => f.key = text,
                    (EditTarget::RowValue, FormValue::Text(t)) => *t = text,
                    _ => {}
                }
            }
            BodyKind::UrlEncoded => set_kv(&mut req.body.url_encoded, row, target, text),
            BodyKind::None | BodyKind::Raw(_) | BodyKind::Binary => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{doc, endpoint};
    use crate::models::{EnvironmentSchema, HttpMethod, ServerVariable, VariableSource};
    use crate::network::normalize::{normalize, Payload, RawHttpResponse, Timing};
    use crate::storage::Storage;
    use chrono::Utc;
    use std::time::Duration;

    fn app() -> AppState {
        let mut state = AppState::new(Storage::in_memory(), Duration::from_millis(400));
        let mut users = endpoint(HttpMethod::GET, "/users/{{id}}", "Get user");
        users.headers.push(crate::models::EndpointHeader {
            name: "X-Trace".into(),
            kind: "string".into(),
            required: false,
            description: None,
        });
        state.set_document(doc("t1", vec![users]));
        state
    }

    async fn type_text(state: &mut AppState, text: &str) {
        for c in text.chars() {
            state.enter_char(c).await;
        }
    }

    fn ok_response() -> crate::network::NormalizedResponse {
        normalize(
            RawHttpResponse {
                status: 200,
                status_text: "OK".into(),
                headers: vec![("content-type".into(), "application/json".into())],
                payload: Payload::Text("{}".into()),
            },
            Timing {
                duration_ms: 5.0,
                timestamp: Utc::now(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_edit_and_send() {
        let mut state = app();
        state.set_environment(EnvironmentSchema {
            variables: vec![ServerVariable {
                name: "id".into(),
                source: VariableSource {
                    kind: Some("STATIC".into()),
                    value: Some("42".into()),
                },
            }],
        });

        state.open_endpoint().await;
        assert_eq!(state.active_panel, Panel::Request);

        // first query row is the trailing blank one
        state.start_editing(EditTarget::RowKey);
        type_text(&mut state, "page").await;
        state.stop_editing().await;
        state.start_editing(EditTarget::RowValue);
        type_text(&mut state, "2").await;
        state.stop_editing().await;

        let Some(NetworkCommand::Execute { id, tab_key, request }) = state.prepare_request().await
        else {
            panic!("expected an execute command");
        };
        assert_eq!(request.url, "http://localhost:8080/users/42?page=2");
        assert!(state.prepare_request().await.is_none());

        state
            .handle_response(NetworkResponse::Completed {
                id,
                tab_key: tab_key.clone(),
                response: ok_response(),
            })
            .await;
        assert!(state.pending.is_empty());
        let tab = state.sessions.get(&tab_key).unwrap();
        assert_eq!(tab.last_response.as_ref().unwrap().status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_ignored() {
        let mut state = app();
        state.open_endpoint().await;
        let Some(NetworkCommand::Execute { id, tab_key, .. }) = state.prepare_request().await else {
            panic!("expected an execute command");
        };
        assert_eq!(state.cancel_request(), Some(NetworkCommand::Cancel(id)));

        state
            .handle_response(NetworkResponse::Completed {
                id,
                tab_key: tab_key.clone(),
                response: ok_response(),
            })
            .await;
        assert!(state.sessions.get(&tab_key).unwrap().last_response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_a_session_cancels_its_request() {
        let mut state = app();
        state.open_endpoint().await;
        let Some(NetworkCommand::Execute { id, .. }) = state.prepare_request().await else {
            panic!("expected an execute command");
        };
        assert_eq!(state.close_tab().await, vec![NetworkCommand::Cancel(id)]);
        assert!(state.sessions.active().is_none());
        assert!(state.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_rows_are_fixed() {
        let mut state = app();
        state.open_endpoint().await;
        state.next_section().await;
        assert_eq!(state.active_tab().unwrap().request.editing, Editing::Headers);

        state.start_editing(EditTarget::RowKey);
        assert_eq!(state.input_mode, InputMode::Normal);
        assert!(state.status.is_some());

        state.delete_row().await;
        assert_eq!(state.active_tab().unwrap().request.headers[0].key, "X-Trace");

        state.toggle_row().await;
        assert!(state.active_tab().unwrap().request.headers[0].ignore);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_variables_are_persisted() {
        let mut state = app();
        state.active_panel = Panel::Variables;
        state.start_editing(EditTarget::VarName);
        type_text(&mut state, "token").await;
        // variables apply when editing stops
        assert_eq!(state.vars.len(), 1);
        state.stop_editing().await;
        state.start_editing(EditTarget::VarValue);
        type_text(&mut state, "abc").await;
        state.stop_editing().await;

        let stored = state.storage.env.local_vars().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "token");
        assert_eq!(stored[0].value, "abc");

        state.delete_variable().await;
        assert!(state.storage.env.local_vars().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_events_update_state() {
        let mut state = AppState::new(Storage::in_memory(), Duration::from_millis(400));
        state.handle_sync_event(SyncEvent::Health {
            online: false,
            uptime: None,
            checked_at: Utc::now(),
        });
        assert_eq!(state.health.online, Some(false));

        state.handle_sync_event(SyncEvent::DocLoaded {
            doc: doc("t1", vec![endpoint(HttpMethod::GET, "/a", "A")]),
            from_cache: true,
        });
        let render = state.to_render_state();
        assert_eq!(render.endpoints.len(), 2);
        assert_eq!(render.doc_title.as_deref(), Some("Pets 1.0"));
    }
}
