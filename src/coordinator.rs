//! Session coordinator
//!
//! Reacts to connection status changes by driving the presentation, forwards
//! UI commands to their owners and broadcasts state changes back to the UI.
//! It owns the retry timer: the supervisor never reconnects on its own.

use crate::core::config::Config;
use crate::core::events::AppEvent;
use crate::core::store::ConfigStore;
use crate::remote::RemoteEvent;
use crate::session::{ConnectError, ConnectionStatus, ConnectionSupervisor};
use crate::sync::{HostEnd, Inbound, Notification, Notifier, UiCommand, UiRequest, UiResponse};
use crate::window::{Mode, PresentationStateMachine};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shown in the loading window once the failure threshold is reached
pub const CONNECTION_HINT: &str =
    "Could not reach OBS. Check that OBS is running and that the WebSocket server is enabled \
     (Tools > WebSocket Server Settings).";

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Delay between a successful connection and leaving the loading window
    pub settle_delay: Duration,
    /// Background reconnect interval; `None` disables retries
    pub retry_interval: Option<Duration>,
    /// Consecutive failures before the remediation hint is shown
    pub failure_hint_threshold: u32,
    pub connect_on_start: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            retry_interval: Some(Duration::from_secs(5)),
            failure_hint_threshold: 2,
            connect_on_start: true,
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            settle_delay: config.presentation.settle_delay(),
            retry_interval: config.connection.retry_interval(),
            failure_hint_threshold: config.connection.failure_hint_threshold,
            connect_on_start: true,
        }
    }
}

pub struct SessionCoordinator {
    supervisor: Arc<ConnectionSupervisor>,
    presentation: PresentationStateMachine,
    host: HostEnd,
    notifier: Notifier,
    store: Arc<dyn ConfigStore>,
    events: mpsc::UnboundedReceiver<AppEvent>,
    settings: CoordinatorSettings,
    retry: Option<JoinHandle<()>>,
    settle: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        presentation: PresentationStateMachine,
        host: HostEnd,
        store: Arc<dyn ConfigStore>,
        events: mpsc::UnboundedReceiver<AppEvent>,
        settings: CoordinatorSettings,
    ) -> Self {
        let notifier = host.notifier();
        Self {
            supervisor,
            presentation,
            host,
            notifier,
            store,
            events,
            settings,
            retry: None,
            settle: None,
        }
    }

    /// Process UI traffic and state events until either side goes away
    pub async fn run(mut self) {
        if self.settings.connect_on_start {
            self.spawn_connect();
        }

        loop {
            tokio::select! {
                inbound = self.host.recv() => match inbound {
                    Some(inbound) => self.handle_inbound(inbound),
                    None => {
                        info!("UI channel closed, stopping coordinator");
                        break;
                    }
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        self.cancel_retry();
        if let Some(settle) = self.settle.take() {
            settle.abort();
        }
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ConnectionStatus {
                status,
                attempt,
                detail,
            } => self.on_connection_status(status, attempt, detail),
            AppEvent::Remote(RemoteEvent::StateChanged { name, data }) => {
                self.notifier
                    .notify(Notification::RemoteEvent { name, data });
            }
            // Reported by the supervisor as a status change
            AppEvent::Remote(RemoteEvent::ConnectionClosed) => {}
            AppEvent::ModeChanged { mode, previous } => {
                debug!("Mode is now {}", mode);
                self.notifier
                    .notify(Notification::ModeChanged { mode, previous });
            }
        }
    }

    fn on_connection_status(
        &mut self,
        status: ConnectionStatus,
        attempt: u32,
        detail: Option<String>,
    ) {
        let mode = self.presentation.current_mode();
        let threshold_reached =
            status == ConnectionStatus::Failed && attempt >= self.settings.failure_hint_threshold;
        let hint = (threshold_reached && mode.is_loading()).then(|| CONNECTION_HINT.to_string());

        self.notifier.notify(Notification::ConnectionStatus {
            status,
            detail,
            hint,
        });

        match status {
            ConnectionStatus::Connected => {
                self.cancel_retry();
                if mode.is_loading() {
                    self.schedule_settle();
                }
            }
            ConnectionStatus::Failed => {
                if threshold_reached && mode == Mode::Loading {
                    info!("{} failed attempts, showing connection hint", attempt);
                    self.presentation.request_transition(Mode::LoadingError);
                }
                self.schedule_retry();
            }
            ConnectionStatus::Disconnected => self.schedule_retry(),
            ConnectionStatus::Connecting => {}
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Command(command) => self.handle_command(command),
            Inbound::Request { request, reply } => match request {
                UiRequest::GetCurrentMode => reply.respond(UiResponse::CurrentMode {
                    mode: self.presentation.current_mode(),
                }),
            },
        }
    }

    fn handle_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::RequestModeChange { mode } => match mode.parse::<Mode>() {
                Ok(mode) => self.presentation.request_transition(mode),
                Err(e) => warn!("Ignoring mode change: {}", e),
            },
            UiCommand::RequestConnect => {
                self.cancel_retry();
                self.spawn_connect();
            }
            UiCommand::GetConfig { domain } => {
                let value = self.store.get(&domain);
                self.notifier.notify(Notification::Config { domain, value });
            }
            UiCommand::SaveConfig { domain, value } => {
                if let Err(e) = self.store.set(&domain, value) {
                    error!("Failed to save {} settings: {:#}", domain, e);
                }
            }
            UiCommand::RemoteCommand { name, args } => {
                let supervisor = Arc::clone(&self.supervisor);
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    let notification = match supervisor.call(&name, args).await {
                        Ok(data) => Notification::CommandResult {
                            name,
                            ok: true,
                            data,
                        },
                        Err(e) => {
                            warn!("Remote command {} failed: {}", name, e);
                            Notification::CommandResult {
                                name,
                                ok: false,
                                data: json!({ "error": e.to_string() }),
                            }
                        }
                    };
                    notifier.notify(notification);
                });
            }
        }
    }

    fn spawn_connect(&self) {
        spawn_connect(Arc::clone(&self.supervisor), Arc::clone(&self.store));
    }

    fn schedule_settle(&mut self) {
        if let Some(settle) = self.settle.take() {
            settle.abort();
        }
        let supervisor = Arc::clone(&self.supervisor);
        let presentation = self.presentation.clone();
        let delay = self.settings.settle_delay;
        self.settle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mode = presentation.current_mode();
            if supervisor.status() == ConnectionStatus::Connected && mode.is_loading() {
                presentation.request_transition(Mode::Overlay);
            } else {
                debug!("Skipping auto-advance from {}", mode);
            }
        }));
    }

    /// Replaces any pending retry with a fresh one. The timer only spawns the
    /// attempt, so cancelling it never aborts a connect in progress.
    fn schedule_retry(&mut self) {
        let Some(interval) = self.settings.retry_interval else {
            return;
        };
        self.cancel_retry();
        debug!("Retrying connection in {:?}", interval);
        let supervisor = Arc::clone(&self.supervisor);
        let store = Arc::clone(&self.store);
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            spawn_connect(supervisor, store);
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}

fn spawn_connect(supervisor: Arc<ConnectionSupervisor>, store: Arc<dyn ConfigStore>) {
    let endpoint = store.endpoint();
    tokio::spawn(async move {
        match supervisor.connect(endpoint).await {
            Ok(()) => {}
            Err(ConnectError::AttemptSkipped) => debug!("Connect already in progress"),
            Err(e) => debug!("Connect attempt ended: {}", e),
        }
    });
}
