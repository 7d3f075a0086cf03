//! Request sessions
//!
//! A session ("tab document") is the editable, persisted request state bound
//! to one endpoint identity. This module holds the model; `store` owns the
//! set of open sessions.

pub mod debounce;
pub mod factory;
pub mod order;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content_type::BodyKind;
use crate::models::HttpMethod;
use crate::network::normalize::NormalizedResponse;

pub use debounce::{DebounceSink, Debouncer};
pub use factory::{build_tab_doc, parse_tab_key, tab_key};
pub use order::{TabOrder, TabOrderItem};
pub use store::{SessionEvent, SessionStore};

/// Which request section the editor is focused on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Editing {
    #[default]
    Params,
    Headers,
    Body,
}

impl Editing {
    pub fn next(&self) -> Editing {
        match self {
            Editing::Params => Editing::Headers,
            Editing::Headers => Editing::Body,
            Editing::Body => Editing::Params,
        }
    }
}

/// Rows of a dynamic key/value list
pub trait Row {
    fn blank() -> Self;
    fn is_blank(&self) -> bool;
}

/// Drop blank rows and append exactly one at the end.
pub fn ensure_trailing_blank<R: Row>(rows: &mut Vec<R>) {
    rows.retain(|r| !r.is_blank());
    rows.push(R::blank());
}

/// Header, query parameter or url-encoded field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueEntry {
    pub key: String,
    pub value: String,
    /// Key may be renamed
    pub editable: bool,
    /// Added by the user rather than taken from the schema
    pub local: bool,
    /// Excluded from the compiled request
    pub ignore: bool,
}

impl KeyValueEntry {
    /// A schema-sourced row: fixed key, not local.
    pub fn schema(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValueEntry {
            key: key.into(),
            value: value.into(),
            editable: false,
            local: false,
            ignore: false,
        }
    }

    pub fn local(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValueEntry {
            key: key.into(),
            value: value.into(),
            editable: true,
            local: true,
            ignore: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.ignore && !self.key.is_empty()
    }
}

impl Row for KeyValueEntry {
    fn blank() -> Self {
        KeyValueEntry::local("", "")
    }

    fn is_blank(&self) -> bool {
        self.key.trim().is_empty() && self.value.trim().is_empty()
    }
}

/// Value of a multipart field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FormValue {
    Text(String),
    /// Attachment ids, one part per id
    Files(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEntry {
    pub key: String,
    pub value: FormValue,
    pub editable: bool,
    pub local: bool,
    pub ignore: bool,
}

impl FormEntry {
    pub fn schema(key: impl Into<String>) -> Self {
        FormEntry {
            key: key.into(),
            value: FormValue::Text(String::new()),
            editable: false,
            local: false,
            ignore: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.ignore && !self.key.is_empty()
    }

    pub fn file_ids(&self) -> &[String] {
        match &self.value {
            FormValue::Files(ids) => ids,
            FormValue::Text(_) => &[],
        }
    }
}

impl Row for FormEntry {
    fn blank() -> Self {
        FormEntry {
            key: String::new(),
            value: FormValue::Text(String::new()),
            editable: true,
            local: true,
            ignore: false,
        }
    }

    fn is_blank(&self) -> bool {
        let empty_value = match &self.value {
            FormValue::Text(s) => s.trim().is_empty(),
            FormValue::Files(ids) => ids.is_empty(),
        };
        self.key.trim().is_empty() && empty_value
    }
}

/// Body content for every kind, so switching kinds loses nothing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody {
    pub raw: Option<String>,
    pub form_data: Vec<FormEntry>,
    pub url_encoded: Vec<KeyValueEntry>,
    pub binary_file_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiRequest {
    pub url: String,
    pub headers: Vec<KeyValueEntry>,
    pub query_params: Vec<KeyValueEntry>,
    /// Content types the endpoint accepts
    pub consumes: Vec<String>,
    pub editing: Editing,
    pub body_kind: BodyKind,
    pub body: RequestBody,
}

impl UiRequest {
    /// Restore the trailing blank row of every list.
    pub fn normalize(&mut self) {
        ensure_trailing_blank(&mut self.headers);
        ensure_trailing_blank(&mut self.query_params);
        ensure_trailing_blank(&mut self.body.form_data);
        ensure_trailing_blank(&mut self.body.url_encoded);
    }
}

/// Editable, persisted request state for one endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabDoc {
    /// `"{METHOD}:{path}"`
    pub key: String,
    pub name: String,
    pub method: HttpMethod,
    pub path: String,
    pub request: UiRequest,
    pub last_response: Option<NormalizedResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TabDoc {
    /// Every attachment this session owns.
    pub fn attachment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .request
            .body
            .form_data
            .iter()
            .flat_map(|f| f.file_ids().iter().cloned())
            .collect();
        if let Some(id) = &self.request.body.binary_file_id {
            ids.push(id.clone());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_blank_is_unique_and_last() {
        let mut rows = vec![
            KeyValueEntry::blank(),
            KeyValueEntry::schema("X-Trace", ""),
            KeyValueEntry::blank(),
            KeyValueEntry::local("a", "1"),
        ];
        ensure_trailing_blank(&mut rows);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|r| r.is_blank()).count(), 1);
        assert!(rows[2].is_blank());

        // idempotent
        ensure_trailing_blank(&mut rows);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_file_row_with_ids_is_not_blank() {
        let row = FormEntry {
            value: FormValue::Files(vec!["f1".into()]),
            ..FormEntry::blank()
        };
        assert!(!row.is_blank());
        assert_eq!(row.file_ids(), ["f1".to_string()]);
    }
}
