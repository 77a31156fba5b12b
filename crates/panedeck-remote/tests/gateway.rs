#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use panedeck_pty::ShellProfile;
use panedeck_pty::SpawnErrorKind;
use panedeck_pty::TerminalSize;
use panedeck_remote::AccessTokenStore;
use panedeck_remote::ClientMessage;
use panedeck_remote::CloseReason;
use panedeck_remote::ConnectionLimit;
use panedeck_remote::GatewayConfig;
use panedeck_remote::GatewayError;
use panedeck_remote::Outbound;
use panedeck_remote::RemoteGateway;
use panedeck_remote::RotationPolicy;
use panedeck_remote::ServerMessage;
use panedeck_remote::SocketId;
use panedeck_remote::StaticEdition;
use panedeck_session::test_support::MockProcess;
use panedeck_session::test_support::MockSpawner;
use tokio::sync::mpsc;

const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

struct Harness {
    gateway: RemoteGateway,
    spawner: Arc<MockSpawner>,
}

fn harness(limit: ConnectionLimit, rotation: RotationPolicy) -> Harness {
    let spawner = Arc::new(MockSpawner::new());
    let config = GatewayConfig::new(ShellProfile::new("/bin/sh", vec!["-l".to_string()]))
        .with_rotation(rotation);
    let gateway = RemoteGateway::new(
        spawner.clone(),
        AccessTokenStore::with_token(TOKEN),
        Arc::new(StaticEdition(limit)),
        config,
    );
    Harness { gateway, spawner }
}

fn default_harness() -> Harness {
    harness(ConnectionLimit::Limited(4), RotationPolicy::NewConnectionsOnly)
}

struct Client {
    socket: SocketId,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Client {
    fn connect(gateway: &RemoteGateway) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = gateway.connect(tx).expect("connection admitted");
        Self { socket, rx }
    }

    fn authenticated(gateway: &RemoteGateway) -> Self {
        let mut client = Self::connect(gateway);
        gateway
            .handle(
                client.socket,
                ClientMessage::Auth {
                    token: TOKEN.to_string(),
                },
            )
            .unwrap();
        assert_eq!(client.message(), ServerMessage::AuthSuccess {});
        client
    }

    fn next(&mut self) -> Outbound {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Ok(item) = self.rx.try_recv() {
                return item;
            }
            assert!(Instant::now() < deadline, "no outbound item within {WAIT:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn message(&mut self) -> ServerMessage {
        match self.next() {
            Outbound::Message(message) => message,
            Outbound::Close(reason) => panic!("unexpected close: {reason:?}"),
        }
    }

    fn assert_quiet(&mut self) {
        thread::sleep(QUIET);
        assert!(self.rx.try_recv().is_err(), "unexpected outbound item");
    }
}

fn create(h: &Harness, client: &mut Client) -> MockProcess {
    h.gateway
        .handle(
            client.socket,
            ClientMessage::CreateTerminal {
                cwd: None,
                cols: None,
                rows: None,
            },
        )
        .unwrap();
    let ServerMessage::TerminalReady { pid } = client.message() else {
        panic!("expected terminal_ready");
    };
    h.spawner.process(pid).expect("spawned process")
}

#[test]
fn capacity_is_checked_before_authentication() {
    let h = harness(ConnectionLimit::Limited(1), RotationPolicy::NewConnectionsOnly);
    let first = Client::connect(&h.gateway);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let err = h.gateway.connect(tx).unwrap_err();

    assert!(matches!(err, GatewayError::CapacityExceeded { limit: 1 }));
    assert!(matches!(
        rx.try_recv().unwrap(),
        Outbound::Message(ServerMessage::Error { .. })
    ));
    assert_eq!(rx.try_recv().unwrap(), Outbound::Close(CloseReason::Capacity));
    assert_eq!(h.gateway.connection_count(), 1);
    assert_eq!(h.spawner.spawn_count(), 0);

    // The slot frees up once the unauthenticated holder goes away.
    assert!(h.gateway.disconnect(first.socket));
    let _second = Client::authenticated(&h.gateway);
    assert_eq!(h.gateway.connection_count(), 1);
}

#[test]
fn full_gateway_refuses_newcomer_while_holder_runs_a_terminal() {
    let h = harness(ConnectionLimit::Limited(1), RotationPolicy::NewConnectionsOnly);
    let mut holder = Client::authenticated(&h.gateway);
    let process = create(&h, &mut holder);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let err = h.gateway.connect(tx).unwrap_err();

    assert!(matches!(err, GatewayError::CapacityExceeded { limit: 1 }));
    assert!(matches!(
        rx.try_recv().unwrap(),
        Outbound::Message(ServerMessage::Error { .. })
    ));
    assert_eq!(rx.try_recv().unwrap(), Outbound::Close(CloseReason::Capacity));
    assert!(rx.try_recv().is_err());

    assert_eq!(h.gateway.connection_count(), 1);
    assert_eq!(h.gateway.authenticated_count(), 1);
    assert!(h.gateway.has_terminal(holder.socket));
    assert!(!process.was_killed());
    assert_eq!(h.spawner.spawn_count(), 1);
    holder.assert_quiet();
}

#[test]
fn unlimited_edition_admits_every_connection() {
    let h = harness(ConnectionLimit::Unlimited, RotationPolicy::NewConnectionsOnly);
    let clients: Vec<Client> = (0..8).map(|_| Client::connect(&h.gateway)).collect();
    assert_eq!(h.gateway.connection_count(), clients.len());
}

#[test]
fn messages_before_auth_are_rejected() {
    let h = default_harness();
    let mut client = Client::connect(&h.gateway);

    let err = h
        .gateway
        .handle(
            client.socket,
            ClientMessage::CreateTerminal {
                cwd: None,
                cols: None,
                rows: None,
            },
        )
        .unwrap_err();

    assert!(matches!(err, GatewayError::NotAuthenticated));
    assert_eq!(client.message(), ServerMessage::error("not authenticated"));
    assert_eq!(h.spawner.spawn_count(), 0);
    assert_eq!(h.gateway.connection_count(), 1);
}

#[test]
fn bad_token_closes_and_forgets_the_socket() {
    let h = default_harness();
    let mut client = Client::connect(&h.gateway);

    let err = h
        .gateway
        .handle(
            client.socket,
            ClientMessage::Auth {
                token: "nope".to_string(),
            },
        )
        .unwrap_err();

    assert!(matches!(err, GatewayError::AuthFailed));
    assert!(matches!(client.message(), ServerMessage::AuthError { .. }));
    assert_eq!(client.next(), Outbound::Close(CloseReason::AuthFailed));
    assert_eq!(h.gateway.connection_count(), 0);
}

#[test]
fn rotation_rejects_old_token_for_new_connections() {
    let h = default_harness();
    let mut existing = Client::authenticated(&h.gateway);

    let new_token = h.gateway.regenerate_token();
    assert_ne!(new_token, TOKEN);
    assert_eq!(new_token.len(), TOKEN.len());

    let mut stale = Client::connect(&h.gateway);
    h.gateway
        .handle(
            stale.socket,
            ClientMessage::Auth {
                token: TOKEN.to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(stale.message(), ServerMessage::AuthError { .. }));

    let mut fresh = Client::connect(&h.gateway);
    h.gateway
        .handle(fresh.socket, ClientMessage::Auth { token: new_token })
        .unwrap();
    assert_eq!(fresh.message(), ServerMessage::AuthSuccess {});

    // Sockets authenticated before the rotation keep working.
    let _process = create(&h, &mut existing);
    assert_eq!(h.gateway.authenticated_count(), 2);
}

#[test]
fn revoke_all_rotation_closes_authenticated_sockets() {
    let h = harness(ConnectionLimit::Limited(4), RotationPolicy::RevokeAll);
    let mut authed = Client::authenticated(&h.gateway);
    let process = create(&h, &mut authed);
    let mut pending = Client::connect(&h.gateway);

    h.gateway.regenerate_token();

    assert_eq!(authed.message(), ServerMessage::error("access token rotated"));
    assert_eq!(authed.next(), Outbound::Close(CloseReason::Revoked));
    assert!(process.was_killed());
    assert_eq!(h.gateway.connection_count(), 1);
    pending.assert_quiet();
}

#[test]
fn terminal_session_round_trip() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);

    h.gateway
        .handle(
            client.socket,
            ClientMessage::CreateTerminal {
                cwd: Some("/tmp".to_string()),
                cols: Some(100),
                rows: Some(30),
            },
        )
        .unwrap();
    let ServerMessage::TerminalReady { pid } = client.message() else {
        panic!("expected terminal_ready");
    };
    let process = h.spawner.process(pid).expect("spawned process");
    assert_eq!(process.spec.program, "/bin/sh");
    assert_eq!(process.spec.size, TerminalSize::new(100, 30));
    assert_eq!(process.spec.cwd.as_deref(), Some(std::path::Path::new("/tmp")));

    process.emit("hello");
    assert_eq!(
        client.message(),
        ServerMessage::TerminalData {
            data: "hello".to_string()
        }
    );

    h.gateway
        .handle(
            client.socket,
            ClientMessage::TerminalInput {
                data: "ls\r".to_string(),
            },
        )
        .unwrap();
    assert_eq!(process.written(), "ls\r");

    h.gateway
        .handle(client.socket, ClientMessage::TerminalResize { cols: 120, rows: 40 })
        .unwrap();
    assert_eq!(process.resizes(), vec![TerminalSize::new(120, 40)]);

    process.exit(0);
    assert_eq!(client.message(), ServerMessage::TerminalExit { exit_code: 0 });
    assert!(!h.gateway.has_terminal(client.socket));

    // A finished terminal frees the socket for a new one.
    let second = create(&h, &mut client);
    assert_ne!(second.pid, process.pid);
}

#[test]
fn second_create_is_rejected_and_socket_stays_open() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);
    let _process = create(&h, &mut client);

    let err = h
        .gateway
        .handle(
            client.socket,
            ClientMessage::CreateTerminal {
                cwd: None,
                cols: None,
                rows: None,
            },
        )
        .unwrap_err();

    assert!(matches!(err, GatewayError::DuplicateTerminal));
    assert!(matches!(client.message(), ServerMessage::Error { .. }));
    assert_eq!(h.spawner.spawn_count(), 1);
    assert_eq!(h.gateway.connection_count(), 1);
    assert!(h.gateway.has_terminal(client.socket));
}

#[test]
fn kill_terminal_always_acknowledges() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);

    h.gateway
        .handle(client.socket, ClientMessage::KillTerminal)
        .unwrap();
    assert_eq!(client.message(), ServerMessage::TerminalKilled {});

    let process = create(&h, &mut client);
    h.gateway
        .handle(client.socket, ClientMessage::KillTerminal)
        .unwrap();
    assert_eq!(client.message(), ServerMessage::TerminalKilled {});
    assert!(process.was_killed());
    assert!(!h.gateway.has_terminal(client.socket));

    // Late output and exit of the killed process never reach the client.
    process.emit("late");
    process.exit(137);
    client.assert_quiet();
}

#[test]
fn input_without_terminal_reports_error() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);

    let err = h
        .gateway
        .handle(
            client.socket,
            ClientMessage::TerminalInput {
                data: "x".to_string(),
            },
        )
        .unwrap_err();

    assert!(matches!(err, GatewayError::NoTerminal));
    assert_eq!(
        client.message(),
        ServerMessage::error("No terminal for this connection")
    );
}

#[test]
fn invalid_resize_is_rejected() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);
    let process = create(&h, &mut client);

    let err = h
        .gateway
        .handle(client.socket, ClientMessage::TerminalResize { cols: 0, rows: 24 })
        .unwrap_err();

    assert!(matches!(err, GatewayError::InvalidSize { cols: 0, rows: 24 }));
    assert!(matches!(client.message(), ServerMessage::Error { .. }));
    assert!(process.resizes().is_empty());
}

#[test]
fn spawn_failure_is_reported_and_retryable() {
    let h = default_harness();
    h.spawner.fail_program("/bin/sh", SpawnErrorKind::NotFound);
    let mut client = Client::authenticated(&h.gateway);

    for _ in 0..2 {
        let err = h
            .gateway
            .handle(
                client.socket,
                ClientMessage::CreateTerminal {
                    cwd: None,
                    cols: None,
                    rows: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::Pty(_)));
        assert_eq!(
            client.message(),
            ServerMessage::error("Failed to start terminal: /bin/sh: command not found")
        );
    }
    assert_eq!(h.spawner.spawn_count(), 2);
    assert!(!h.gateway.has_terminal(client.socket));
}

#[test]
fn disconnect_kills_the_terminal() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);
    let process = create(&h, &mut client);

    assert!(h.gateway.disconnect(client.socket));

    assert!(process.was_killed());
    assert_eq!(h.gateway.connection_count(), 0);
    assert!(!h.gateway.disconnect(client.socket));
}

#[test]
fn shutdown_closes_everything() {
    let h = default_harness();
    let mut client = Client::authenticated(&h.gateway);
    let process = create(&h, &mut client);
    let mut idle = Client::connect(&h.gateway);

    assert_eq!(h.gateway.shutdown(), 2);

    assert_eq!(client.next(), Outbound::Close(CloseReason::Shutdown));
    assert_eq!(idle.next(), Outbound::Close(CloseReason::Shutdown));
    assert!(process.was_killed());
    assert_eq!(h.gateway.connection_count(), 0);
}
