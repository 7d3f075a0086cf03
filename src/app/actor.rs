//! App actor - message loop processing UI events, network responses and
//! sync events

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::app::state::AppState;
use crate::messages::ui_events::InputMode;
use crate::messages::{
    NetworkCommand, NetworkResponse, RenderState, SyncCommand, SyncEvent, UiEvent,
};

/// App actor that owns [`AppState`] and drives the other actors
pub struct AppActor {
    state: AppState,
    network_tx: mpsc::UnboundedSender<NetworkCommand>,
    sync_tx: mpsc::UnboundedSender<SyncCommand>,
    render_tx: mpsc::UnboundedSender<RenderState>,
    token: CancellationToken,
}

impl AppActor {
    pub fn new(
        state: AppState,
        network_tx: mpsc::UnboundedSender<NetworkCommand>,
        sync_tx: mpsc::UnboundedSender<SyncCommand>,
        render_tx: mpsc::UnboundedSender<RenderState>,
        token: CancellationToken,
    ) -> Self {
        AppActor {
            state,
            network_tx,
            sync_tx,
            render_tx,
            token,
        }
    }

    /// Run the actor message loop
    pub async fn run(
        mut self,
        mut ui_rx: mpsc::UnboundedReceiver<UiEvent>,
        mut net_rx: mpsc::UnboundedReceiver<NetworkResponse>,
        mut sync_rx: mpsc::UnboundedReceiver<SyncEvent>,
    ) {
        // Send initial render state
        self.render();

        loop {
            tokio::select! {
                Some(event) = ui_rx.recv() => {
                    if self.handle_ui_event(event).await {
                        break;
                    }
                }
                Some(response) = net_rx.recv() => {
                    self.state.handle_response(response).await;
                }
                Some(event) = sync_rx.recv() => {
                    self.state.handle_sync_event(event);
                }
                else => break,
            }
            self.state.collect_notices();
            self.render();
        }

        self.shutdown().await;
    }

    fn render(&self) {
        let _ = self.render_tx.send(self.state.to_render_state());
    }

    /// Persist pending session writes and stop the other actors.
    async fn shutdown(&mut self) {
        if self.state.input_mode == InputMode::Editing {
            self.state.stop_editing().await;
        }
        self.state.sessions.flush().await;
        let _ = self.network_tx.send(NetworkCommand::Shutdown);
        self.token.cancel();
        tracing::info!("App actor stopped");
    }

    fn send_network(&self, commands: impl IntoIterator<Item = NetworkCommand>) {
        for cmd in commands {
            let _ = self.network_tx.send(cmd);
        }
    }

    /// Handle a UI event, returns true if quit was requested
    async fn handle_ui_event(&mut self, event: UiEvent) -> bool {
        match event {
            // Panel navigation
            UiEvent::NextPanel => self.state.next_panel(),
            UiEvent::PrevPanel => self.state.prev_panel(),
            UiEvent::SelectPrev => self.state.select_prev(),
            UiEvent::SelectNext => self.state.select_next(),

            // Input editing
            UiEvent::StartEditing(target) => self.state.start_editing(target),
            UiEvent::StopEditing => self.state.stop_editing().await,
            UiEvent::CharInput(c) => self.state.enter_char(c).await,
            UiEvent::Backspace => self.state.delete_char().await,
            UiEvent::CursorLeft => self.state.move_cursor_left(),
            UiEvent::CursorRight => self.state.move_cursor_right(),

            // Sessions
            UiEvent::OpenEndpoint => self.state.open_endpoint().await,
            UiEvent::CloseTab => {
                let cmds = self.state.close_tab().await;
                self.send_network(cmds);
            }
            UiEvent::CloseOtherTabs => {
                let cmds = self.state.close_other_tabs().await;
                self.send_network(cmds);
            }
            UiEvent::CloseAllTabs => {
                let cmds = self.state.close_all_tabs().await;
                self.send_network(cmds);
            }
            UiEvent::NextTab => self.state.switch_tab(1),
            UiEvent::PrevTab => self.state.switch_tab(-1),
            UiEvent::MoveTabLeft => self.state.move_tab(-1).await,
            UiEvent::MoveTabRight => self.state.move_tab(1).await,

            // Request editing
            UiEvent::NextSection => self.state.next_section().await,
            UiEvent::CycleBodyKind => self.state.cycle_body_kind().await,
            UiEvent::ToggleRow => self.state.toggle_row().await,
            UiEvent::DeleteRow => self.state.delete_row().await,

            // Attachments
            UiEvent::OpenAttachInput => self.state.open_attach_input(),
            UiEvent::AttachPathChar(c) => self.state.attach_path_char(c),
            UiEvent::AttachPathBackspace => self.state.attach_path_backspace(),
            UiEvent::LoadAttachment => self.state.load_attachment().await,
            UiEvent::CancelAttachInput => self.state.cancel_attach_input(),

            // Variables
            UiEvent::DeleteVariable => self.state.delete_variable().await,

            // HTTP
            UiEvent::SendRequest => {
                if self.state.input_mode == InputMode::Editing {
                    self.state.stop_editing().await;
                }
                if let Some(cmd) = self.state.prepare_request().await {
                    let _ = self.network_tx.send(cmd);
                }
            }
            UiEvent::CancelRequest => {
                if let Some(cmd) = self.state.cancel_request() {
                    let _ = self.network_tx.send(cmd);
                }
            }

            // Sync
            UiEvent::Refresh => {
                let cmd = self.state.refresh();
                let _ = self.sync_tx.send(cmd);
            }

            // Popups
            UiEvent::ToggleHelp => self.state.toggle_help(),
            UiEvent::CloseHelp => self.state.close_help(),

            // System
            UiEvent::Quit => return true,
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{doc, endpoint};
    use crate::models::HttpMethod;
    use crate::storage::Storage;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_quit_flushes_and_shuts_down() {
        let storage = Storage::in_memory();
        let state = AppState::new(storage.clone(), Duration::from_secs(60));
        let (network_tx, mut network_rx) = mpsc::unbounded_channel();
        let (sync_tx, _sync_rx) = mpsc::unbounded_channel();
        let (render_tx, mut render_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let actor = AppActor::new(state, network_tx, sync_tx, render_tx, token.clone());

        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (_net_tx, net_rx) = mpsc::unbounded_channel();
        let (sync_event_tx, sync_event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(actor.run(ui_rx, net_rx, sync_event_rx));
        assert!(render_rx.recv().await.unwrap().endpoints.is_empty());

        sync_event_tx
            .send(SyncEvent::DocLoaded {
                doc: doc("t1", vec![endpoint(HttpMethod::GET, "/pets", "All pets")]),
                from_cache: false,
            })
            .unwrap();
        assert_eq!(render_rx.recv().await.unwrap().endpoints.len(), 2);

        ui_tx.send(UiEvent::OpenEndpoint).unwrap();
        ui_tx.send(UiEvent::SendRequest).unwrap();
        ui_tx.send(UiEvent::Quit).unwrap();
        handle.await.unwrap();

        assert!(matches!(network_rx.recv().await, Some(NetworkCommand::Execute { .. })));
        assert_eq!(network_rx.recv().await, Some(NetworkCommand::Shutdown));
        assert!(token.is_cancelled());

        assert!(storage.tabs.get("GET:/pets").await.is_some());

        let mut last = None;
        while let Ok(render) = render_rx.try_recv() {
            last = Some(render);
        }
        assert_eq!(last.unwrap().tabs.len(), 1);
    }
}
