//! Set of open sessions
//!
//! `SessionStore` is the only writer of session state. Every transition
//! updates memory first, then schedules or performs the matching storage
//! work and finally notifies subscribed listeners.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::models::Endpoint;
use crate::network::normalize::NormalizedResponse;
use crate::session::{
    build_tab_doc, Debouncer, FormValue, TabDoc, TabOrder, UiRequest,
};
use crate::storage::{AttachmentStorage, Storage, TabStorage};

/// Notification sent to listeners after a transition completed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Opened(String),
    Closed(String),
    Updated(String),
    Focused(Option<String>),
}

type Listener = Box<dyn Fn(&SessionEvent) + Send + Sync>;

pub struct SessionStore {
    order: TabOrder,
    sessions: HashMap<String, TabDoc>,
    tabs: TabStorage,
    files: AttachmentStorage,
    debouncer: Debouncer<TabDoc>,
    listeners: Vec<Listener>,
    notices: Vec<String>,
}

impl SessionStore {
    pub fn new(storage: &Storage, window: Duration) -> Self {
        let sink = Arc::new(storage.tabs.clone());
        SessionStore {
            order: TabOrder::new(),
            sessions: HashMap::new(),
            tabs: storage.tabs.clone(),
            files: storage.files.clone(),
            debouncer: Debouncer::new(window, sink),
            listeners: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Register a listener for every later transition.
    pub fn subscribe(&mut self, listener: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&self, event: SessionEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    /// Log a storage failure; quota exhaustion is kept for the user.
    fn note(&mut self, context: &str, error: StoreError) {
        tracing::warn!(error = %error, "{}", context);
        if error.is_quota() {
            self.notices.push(error.to_string());
        }
    }

    /// Load the persisted ordering record and every session it names.
    /// Entries without a readable record are dropped.
    pub async fn restore(&mut self) {
        let persisted = self.tabs.order().await;
        let mut records: HashMap<String, TabDoc> = self
            .tabs
            .all()
            .await
            .into_iter()
            .map(|t| (t.key.clone(), t))
            .collect();

        let wanted = persisted.len();
        let items = persisted
            .into_iter()
            .filter(|item| records.contains_key(&item.tab_key))
            .collect();
        self.order = TabOrder::from_items(items);

        self.sessions.clear();
        for key in self.order.keys() {
            if let Some(mut tab) = records.remove(key) {
                tab.request.normalize();
                self.sessions.insert(key.to_string(), tab);
            }
        }
        let first = self.order.keys().next().map(String::from);
        if let Some(first) = first {
            self.order.focus(&first);
        }

        // records no longer referenced by the ordering record
        for tab in records.into_values() {
            for id in tab.attachment_ids() {
                if let Err(e) = self.files.delete(&id).await {
                    self.note("Deleting attachment failed", e);
                }
            }
            if let Err(e) = self.tabs.remove(&tab.key).await {
                self.note("Dropping orphaned session failed", e);
            }
        }
        if self.order.len() != wanted {
            self.persist_order().await;
        }

        // blobs left behind by an interrupted close
        let referenced: HashSet<String> = self
            .sessions
            .values()
            .flat_map(|t| t.attachment_ids())
            .collect();
        for id in self.files.ids().await {
            if !referenced.contains(&id) {
                if let Err(e) = self.files.delete(&id).await {
                    self.note("Deleting orphaned attachment failed", e);
                }
            }
        }
        tracing::info!(sessions = self.order.len(), "Restored sessions");
    }

    pub fn order(&self) -> &TabOrder {
        &self.order
    }

    pub fn get(&self, key: &str) -> Option<&TabDoc> {
        self.sessions.get(key)
    }

    pub fn active(&self) -> Option<&TabDoc> {
        self.order.active().and_then(|k| self.sessions.get(k))
    }

    /// Sessions in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &TabDoc> {
        self.order.keys().filter_map(|k| self.sessions.get(k))
    }

    /// Open the session for `endpoint`, creating it on first use, and focus
    /// it. Returns its key.
    pub async fn open(&mut self, endpoint: &Endpoint, uri_prefix: Option<&str>) -> String {
        let key = crate::session::tab_key(endpoint.method, &endpoint.path);
        if self.order.contains(&key) {
            self.order.focus(&key);
            self.emit(SessionEvent::Focused(Some(key.clone())));
            return key;
        }

        let tab = match self.tabs.get(&key).await {
            Some(mut stored) => {
                stored.request.normalize();
                stored
            }
            None => {
                let tab = build_tab_doc(endpoint, uri_prefix);
                self.debouncer.schedule(&key, tab.clone()).await;
                tab
            }
        };

        self.order.open(&key, &tab.name);
        self.sessions.insert(key.clone(), tab);
        self.persist_order().await;
        tracing::debug!(key = %key, "Opened session");
        self.emit(SessionEvent::Opened(key.clone()));
        key
    }

    pub fn focus(&mut self, key: &str) -> bool {
        let focused = self.order.focus(key);
        if focused {
            self.emit(SessionEvent::Focused(Some(key.to_string())));
        }
        focused
    }

    /// Focus the session `step` places away from the active one.
    pub fn focus_neighbour(&mut self, step: isize) -> Option<String> {
        let key = self.order.neighbour(step)?.to_string();
        self.focus(&key);
        Some(key)
    }

    pub async fn reorder(&mut self, key: &str, to: usize) -> bool {
        if !self.order.reorder(key, to) {
            return false;
        }
        self.persist_order().await;
        true
    }

    /// Close one session, deleting its record and attachments.
    pub async fn close(&mut self, key: &str) -> bool {
        if !self.order.close(key) {
            return false;
        }
        self.destroy(key).await;
        self.persist_order().await;
        self.emit(SessionEvent::Closed(key.to_string()));
        self.emit(SessionEvent::Focused(self.order.active().map(String::from)));
        true
    }

    /// Close every session except `key`. An untracked `key` closes all.
    pub async fn close_others(&mut self, key: &str) -> usize {
        let closed = self.order.close_others(key);
        for k in &closed {
            self.destroy(k).await;
        }
        self.persist_order().await;
        for k in &closed {
            self.emit(SessionEvent::Closed(k.clone()));
        }
        self.emit(SessionEvent::Focused(self.order.active().map(String::from)));
        closed.len()
    }

    pub async fn close_all(&mut self) -> usize {
        let closed = self.order.close_all();
        for k in &closed {
            self.destroy(k).await;
        }
        // stray records left by earlier failures
        for tab in self.tabs.all().await {
            self.destroy(&tab.key).await;
        }
        // and any that could not be read at all
        if let Err(e) = self.tabs.clear().await {
            self.note("Clearing session records failed", e);
        }
        if let Err(e) = self.files.clear().await {
            self.note("Clearing attachments failed", e);
        }
        self.persist_order().await;
        for k in &closed {
            self.emit(SessionEvent::Closed(k.clone()));
        }
        self.emit(SessionEvent::Focused(None));
        closed.len()
    }

    /// Flush the pending write for `key`, delete the attachments it
    /// references, then delete its record.
    async fn destroy(&mut self, key: &str) {
        if let Err(e) = self.debouncer.flush(key).await {
            self.note("Flushing session before close failed", e);
        }

        let mut ids: Vec<String> = self
            .sessions
            .remove(key)
            .map(|t| t.attachment_ids())
            .unwrap_or_default();
        if let Some(stored) = self.tabs.get(key).await {
            ids.extend(stored.attachment_ids());
        }
        ids.sort();
        ids.dedup();

        for id in &ids {
            if let Err(e) = self.files.delete(id).await {
                self.note("Deleting attachment failed", e);
            }
        }
        if let Err(e) = self.tabs.remove(key).await {
            self.note("Deleting session record failed", e);
        }
        tracing::debug!(key = %key, attachments = ids.len(), "Closed session");
    }

    async fn persist_order(&mut self) {
        if let Err(e) = self.tabs.save_order(self.order.items()).await {
            self.note("Saving session order failed", e);
        }
    }

    /// Apply `edit` to the request of `key`. List invariants are restored
    /// and attachments no longer referenced are deleted.
    pub async fn update(&mut self, key: &str, edit: impl FnOnce(&mut UiRequest)) -> bool {
        let Some(tab) = self.sessions.get_mut(key) else {
            return false;
        };
        let before: HashSet<String> = tab.attachment_ids().into_iter().collect();
        edit(&mut tab.request);
        tab.request.normalize();
        tab.updated_at = Utc::now();
        let after: HashSet<String> = tab.attachment_ids().into_iter().collect();
        let snapshot = tab.clone();

        for id in before.difference(&after) {
            if let Err(e) = self.files.delete(id).await {
                self.note("Deleting attachment failed", e);
            }
        }
        self.debouncer.schedule(key, snapshot).await;
        self.emit(SessionEvent::Updated(key.to_string()));
        true
    }

    pub async fn set_response(&mut self, key: &str, response: NormalizedResponse) -> bool {
        let Some(tab) = self.sessions.get_mut(key) else {
            return false;
        };
        tab.last_response = Some(response);
        tab.updated_at = Utc::now();
        let snapshot = tab.clone();
        self.debouncer.schedule(key, snapshot).await;
        self.emit(SessionEvent::Updated(key.to_string()));
        true
    }

    /// Upload a file into the form-data row at `row`, which becomes a
    /// file row. Returns the attachment id.
    pub async fn attach_file(
        &mut self,
        key: &str,
        row: usize,
        file_name: &str,
        mime: Option<&str>,
        bytes: &[u8],
    ) -> Option<String> {
        if self.sessions.get(key)?.request.body.form_data.len() <= row {
            return None;
        }
        let id = match self.files.upload(file_name, mime, bytes).await {
            Ok(id) => id,
            Err(e) => {
                self.note("Storing attachment failed", e);
                return None;
            }
        };

        let new_id = id.clone();
        self.update(key, move |req| {
            if let Some(entry) = req.body.form_data.get_mut(row) {
                match &mut entry.value {
                    FormValue::Files(ids) => ids.push(new_id),
                    value => *value = FormValue::Files(vec![new_id]),
                }
                if entry.key.is_empty() {
                    entry.key = "file".to_string();
                }
            }
        })
        .await;
        Some(id)
    }

    /// Upload a file as the binary body, replacing any previous one.
    pub async fn set_binary(
        &mut self,
        key: &str,
        file_name: &str,
        mime: Option<&str>,
        bytes: &[u8],
    ) -> Option<String> {
        if !self.sessions.contains_key(key) {
            return None;
        }
        let id = match self.files.upload(file_name, mime, bytes).await {
            Ok(id) => id,
            Err(e) => {
                self.note("Storing attachment failed", e);
                return None;
            }
        };
        let new_id = id.clone();
        self.update(key, move |req| req.body.binary_file_id = Some(new_id))
            .await;
        Some(id)
    }

    pub async fn remove_form_row(&mut self, key: &str, row: usize) -> bool {
        self.update(key, |req| {
            if row < req.body.form_data.len() {
                req.body.form_data.remove(row);
            }
        })
        .await
    }

    /// Write every pending session now.
    pub async fn flush(&mut self) {
        if let Err(e) = self.debouncer.flush_all().await {
            self.note("Flushing sessions failed", e);
        }
    }

    /// Quota notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        for failure in self.debouncer.take_failures() {
            if failure.is_quota() {
                self.notices.push(failure.to_string());
            }
        }
        std::mem::take(&mut self.notices)
    }
}
