//! End-to-end session flow tests
//!
//! Drives the coordinator through the UI end of the state sync channel with a
//! scripted remote service and the paused tokio clock.

use obs_overlay::{
    coordinator::{CoordinatorSettings, SessionCoordinator},
    core::{events::EventSender, store::JsonFileStore},
    remote::{MockConnect, MockRemote, RemoteService},
    session::{ConnectionStatus, ConnectionSupervisor, DEFAULT_CONNECT_TIMEOUT},
    sync::{Notification, StateSyncChannel, UiCommand, UiEnd, UiRequest, UiResponse},
    window::{ChannelSurface, Mode, PresentationStateMachine, SurfaceCommand, TransitionTiming},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

struct Session {
    remote: Arc<MockRemote>,
    supervisor: Arc<ConnectionSupervisor>,
    presentation: PresentationStateMachine,
    ui: UiEnd,
    _dir: tempfile::TempDir,
}

fn start(remote: MockRemote, settings: CoordinatorSettings) -> Session {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::open(dir.path().join("settings.json")).unwrap());
    let remote = Arc::new(remote);
    let (events, events_rx) = EventSender::channel();
    let (host, ui) = StateSyncChannel::open();

    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::clone(&remote) as Arc<dyn RemoteService>,
        DEFAULT_CONNECT_TIMEOUT,
        events.clone(),
    ));
    let presentation = PresentationStateMachine::new(
        Arc::new(ChannelSurface::new(host.notifier())),
        TransitionTiming::default(),
        events,
    );
    let coordinator = SessionCoordinator::new(
        Arc::clone(&supervisor),
        presentation.clone(),
        host,
        store,
        events_rx,
        settings,
    );
    tokio::spawn(coordinator.run());

    Session {
        remote,
        supervisor,
        presentation,
        ui,
        _dir: dir,
    }
}

fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        notifications.push(notification);
    }
    notifications
}

fn modes(rx: &mut UnboundedReceiver<Notification>) -> Vec<(Mode, Option<Mode>)> {
    drain(rx)
        .into_iter()
        .filter_map(|n| match n {
            Notification::ModeChanged { mode, previous } => Some((mode, previous)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_startup_connect_advances_to_overlay_after_settle_delay() {
    let session = start(MockRemote::accepting(), CoordinatorSettings::default());
    let mut mode_rx = session.ui.listen("mode-changed", "window");
    let mut surface_rx = session.ui.listen("surface", "window");

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(session.supervisor.status(), ConnectionStatus::Connected);
    assert!(modes(&mut mode_rx).is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        modes(&mut mode_rx),
        vec![(Mode::Overlay, Some(Mode::Loading))]
    );

    let commands: Vec<SurfaceCommand> = drain(&mut surface_rx)
        .into_iter()
        .filter_map(|n| match n {
            Notification::Surface { command } => Some(command),
            _ => None,
        })
        .collect();
    assert!(commands.contains(&SurfaceCommand::Resize {
        width: 300,
        height: 40
    }));
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success() {
    let remote = MockRemote::accepting();
    remote.script([
        MockConnect::Refuse("connection refused".into()),
        MockConnect::Refuse("connection refused".into()),
        MockConnect::Accept,
    ]);
    let session = start(remote, CoordinatorSettings::default());
    let mut mode_rx = session.ui.listen("mode-changed", "window");
    let mut status_rx = session.ui.listen("connection-status", "window");

    // First failure: still loading, no hint yet
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.presentation.current_mode(), Mode::Loading);

    // Second failure after the retry interval
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.presentation.current_mode(), Mode::LoadingError);
    let hinted = drain(&mut status_rx).into_iter().any(|n| {
        matches!(
            n,
            Notification::ConnectionStatus {
                status: ConnectionStatus::Failed,
                hint: Some(_),
                ..
            }
        )
    });
    assert!(hinted);

    // Third attempt succeeds, then the settle delay elapses
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.supervisor.status(), ConnectionStatus::Connected);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(
        modes(&mut mode_rx),
        vec![
            (Mode::LoadingError, Some(Mode::Loading)),
            (Mode::Overlay, Some(Mode::LoadingError)),
        ]
    );
    assert_eq!(session.remote.connect_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ui_mode_requests_pass_through() {
    let settings = CoordinatorSettings {
        connect_on_start: false,
        ..CoordinatorSettings::default()
    };
    let session = start(MockRemote::accepting(), settings);
    let mut mode_rx = session.ui.listen("mode-changed", "window");

    session
        .ui
        .send(UiCommand::RequestModeChange {
            mode: "config".into(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        session.ui.request(UiRequest::GetCurrentMode).await,
        Ok(UiResponse::CurrentMode { mode: Mode::Config })
    );

    // Config -> Overlay animates; the second request lands in the pending slot
    session
        .ui
        .send(UiCommand::RequestModeChange {
            mode: "overlay".into(),
        })
        .unwrap();
    session
        .ui
        .send(UiCommand::RequestModeChange {
            mode: "config".into(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        modes(&mut mode_rx),
        vec![
            (Mode::Config, Some(Mode::Loading)),
            (Mode::Overlay, Some(Mode::Config)),
            (Mode::Config, Some(Mode::Overlay)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_mode_request_is_a_no_op() {
    let settings = CoordinatorSettings {
        connect_on_start: false,
        ..CoordinatorSettings::default()
    };
    let session = start(MockRemote::accepting(), settings);
    let mut surface_rx = session.ui.listen("surface", "window");

    session
        .ui
        .send(UiCommand::RequestModeChange {
            mode: "minimized".into(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = session.presentation.snapshot();
    assert_eq!(state.current_mode, Mode::Loading);
    assert_eq!(state.previous_mode, None);
    assert!(drain(&mut surface_rx).is_empty());
}
