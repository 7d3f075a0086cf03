//! UI events - messages from UI layer to App layer

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What an editing session writes into
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EditTarget {
    Url,
    /// Raw body text
    Body,
    RowKey,
    RowValue,
    VarName,
    VarValue,
}

/// Events generated from user input in the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    // Panel navigation
    NextPanel,
    PrevPanel,
    SelectPrev,
    SelectNext,

    // Input editing
    StartEditing(EditTarget),
    StopEditing,
    CharInput(char),
    Backspace,
    CursorLeft,
    CursorRight,

    // Sessions
    OpenEndpoint,
    CloseTab,
    CloseOtherTabs,
    CloseAllTabs,
    NextTab,
    PrevTab,
    MoveTabLeft,
    MoveTabRight,

    // Request editing
    NextSection,
    CycleBodyKind,
    ToggleRow,
    DeleteRow,

    // Attachments
    OpenAttachInput,
    AttachPathChar(char),
    AttachPathBackspace,
    LoadAttachment,
    CancelAttachInput,

    // Variables
    DeleteVariable,

    // HTTP
    SendRequest,
    CancelRequest,

    // Sync
    Refresh,

    // Popups
    ToggleHelp,
    CloseHelp,

    // System
    Quit,
}

/// Active panel in the UI (needed for context-aware event mapping)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Panel {
    #[default]
    Endpoints,
    Request,
    Response,
    Variables,
}

impl Panel {
    pub fn next(&self) -> Panel {
        match self {
            Panel::Endpoints => Panel::Request,
            Panel::Request => Panel::Response,
            Panel::Response => Panel::Variables,
            Panel::Variables => Panel::Endpoints,
        }
    }

    pub fn prev(&self) -> Panel {
        match self {
            Panel::Endpoints => Panel::Variables,
            Panel::Request => Panel::Endpoints,
            Panel::Response => Panel::Request,
            Panel::Variables => Panel::Response,
        }
    }
}

/// Input mode
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Editing,
}

/// Convert a key event to a UiEvent based on current UI context
pub fn key_to_ui_event(
    key: KeyEvent,
    active_panel: Panel,
    input_mode: InputMode,
    show_help: bool,
    show_attach_input: bool,
) -> Option<UiEvent> {
    use crossterm::event::KeyEventKind;

    if key.kind != KeyEventKind::Press {
        return None;
    }

    // Global Ctrl shortcuts
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('x') => return Some(UiEvent::CancelRequest),
            KeyCode::Char('c') => return Some(UiEvent::Quit),
            _ => {}
        }
    }

    if show_help {
        return Some(UiEvent::CloseHelp);
    }

    if show_attach_input {
        return match key.code {
            KeyCode::Esc => Some(UiEvent::CancelAttachInput),
            KeyCode::Enter => Some(UiEvent::LoadAttachment),
            KeyCode::Backspace => Some(UiEvent::AttachPathBackspace),
            KeyCode::Char(c) => Some(UiEvent::AttachPathChar(c)),
            _ => None,
        };
    }

    match input_mode {
        InputMode::Editing => editing_keys(key),
        InputMode::Normal => normal_keys(key, active_panel),
    }
}

fn editing_keys(key: KeyEvent) -> Option<UiEvent> {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => Some(UiEvent::StopEditing),
        KeyCode::Left => Some(UiEvent::CursorLeft),
        KeyCode::Right => Some(UiEvent::CursorRight),
        KeyCode::Backspace => Some(UiEvent::Backspace),
        KeyCode::Char(c) => Some(UiEvent::CharInput(c)),
        _ => None,
    }
}

fn normal_keys(key: KeyEvent, active_panel: Panel) -> Option<UiEvent> {
    // keys shared by every panel
    match key.code {
        KeyCode::Char('q') => return Some(UiEvent::Quit),
        KeyCode::Char('?') => return Some(UiEvent::ToggleHelp),
        KeyCode::Tab => return Some(UiEvent::NextPanel),
        KeyCode::BackTab => return Some(UiEvent::PrevPanel),
        KeyCode::Char('s') => return Some(UiEvent::SendRequest),
        KeyCode::Char('r') => return Some(UiEvent::Refresh),
        KeyCode::Char(']') => return Some(UiEvent::NextTab),
        KeyCode::Char('[') => return Some(UiEvent::PrevTab),
        KeyCode::Char('}') => return Some(UiEvent::MoveTabRight),
        KeyCode::Char('{') => return Some(UiEvent::MoveTabLeft),
        KeyCode::Char('x') => return Some(UiEvent::CloseTab),
        KeyCode::Char('o') => return Some(UiEvent::CloseOtherTabs),
        KeyCode::Char('X') => return Some(UiEvent::CloseAllTabs),
        KeyCode::Up => return Some(UiEvent::SelectPrev),
        KeyCode::Down => return Some(UiEvent::SelectNext),
        _ => {}
    }

    match active_panel {
        Panel::Endpoints => match key.code {
            KeyCode::Enter => Some(UiEvent::OpenEndpoint),
            _ => None,
        },
        Panel::Request => match key.code {
            KeyCode::Char('u') => Some(UiEvent::StartEditing(EditTarget::Url)),
            KeyCode::Char('e') | KeyCode::Enter => Some(UiEvent::StartEditing(EditTarget::RowValue)),
            KeyCode::Char('k') => Some(UiEvent::StartEditing(EditTarget::RowKey)),
            KeyCode::Char('w') => Some(UiEvent::StartEditing(EditTarget::Body)),
            KeyCode::Char('p') => Some(UiEvent::NextSection),
            KeyCode::Char('b') => Some(UiEvent::CycleBodyKind),
            KeyCode::Char(' ') => Some(UiEvent::ToggleRow),
            KeyCode::Char('d') => Some(UiEvent::DeleteRow),
            KeyCode::Char('f') => Some(UiEvent::OpenAttachInput),
            _ => None,
        },
        Panel::Variables => match key.code {
            KeyCode::Char('e') | KeyCode::Enter => Some(UiEvent::StartEditing(EditTarget::VarValue)),
            KeyCode::Char('k') => Some(UiEvent::StartEditing(EditTarget::VarName)),
            KeyCode::Char('d') => Some(UiEvent::DeleteVariable),
            _ => None,
        },
        Panel::Response => None,
    }
}
