//! WebSocket transport for the remote gateway.

use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;

use axum::Json;
use axum::extract::State;
use axum::extract::ws::CloseFrame;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::close_code;
use axum::response::Response;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::ClientMessage;
use crate::CloseReason;
use crate::Outbound;
use crate::RemoteConfig;
use crate::RemoteGateway;
use crate::RemoteServerError;
use crate::ServerMessage;
use crate::SocketId;

const WS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const WS_RECV_TIMEOUT: Duration = Duration::from_secs(60);
const WS_SEND_TIMEOUT: Duration = Duration::from_secs(15);
const WS_PING_INTERVAL: Duration = Duration::from_secs(20);
const WS_MAX_PARSE_ERRORS: u8 = 3;

pub struct RemoteServerHandle {
    gateway: RemoteGateway,
    shutdown_tx: Option<watch::Sender<bool>>,
    join: Option<thread::JoinHandle<()>>,
    state_path: PathBuf,
    local_addr: SocketAddr,
    ws_url: String,
    started_at: u64,
}

impl RemoteServerHandle {
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn gateway(&self) -> &RemoteGateway {
        &self.gateway
    }

    /// Rotates the token and republishes it in the state file.
    pub fn regenerate_token(&self) -> String {
        let token = self.gateway.regenerate_token();
        self.publish_state(&token);
        token
    }

    fn publish_state(&self, token: &str) {
        let state = RemoteStateFile {
            pid: std::process::id(),
            ws_url: &self.ws_url,
            listen: &self.local_addr.to_string(),
            token,
            started_at: self.started_at,
        };
        if let Err(err) = write_state_file(&self.state_path, &state) {
            warn!(error = %err, path = %self.state_path.display(), "Failed to write remote state file");
        }
    }

    pub fn shutdown(mut self) {
        let closed = self.gateway.shutdown();
        if closed > 0 {
            info!(closed, "Closed remote connections for shutdown");
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(join) = self.join.take() {
            let (done_tx, done_rx) = std_mpsc::channel();
            let _ = thread::Builder::new()
                .name("remote-shutdown".to_string())
                .spawn(move || {
                    let _ = join.join();
                    let _ = done_tx.send(());
                });
            if done_rx.recv_timeout(WS_SHUTDOWN_TIMEOUT).is_err() {
                warn!("Remote server did not stop within shutdown timeout");
            }
        }
        if !self.state_path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.state_path);
        }
    }
}

struct ServerState {
    gateway: RemoteGateway,
    shutdown_rx: watch::Receiver<bool>,
}

pub fn start_remote_server(
    gateway: RemoteGateway,
    config: &RemoteConfig,
) -> Result<RemoteServerHandle, RemoteServerError> {
    if !config.enabled {
        return Err(RemoteServerError::Disabled);
    }

    let (listener, local_addr) = bind_listener(&config.listen, config.allow_remote)?;
    let ws_url = format_ws_url(&local_addr);
    let started_at = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(ServerState {
        gateway: gateway.clone(),
        shutdown_rx: shutdown_rx.clone(),
    });

    let url_for_log = ws_url.clone();
    let join = thread::Builder::new()
        .name("panedeck-remote".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build();
            let runtime = match runtime {
                Ok(rt) => rt,
                Err(err) => {
                    error!(error = %err, "Failed to build remote server runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let app = build_router(state);
                let listener = match TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(err) => {
                        error!(error = %err, "Failed to create async listener");
                        return;
                    }
                };
                info!(ws = %url_for_log, "Remote server listening");
                let mut shutdown_rx_server = shutdown_rx.clone();
                let mut shutdown_rx_wait = shutdown_rx;

                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx_server.changed().await;
                });
                let mut server_task = tokio::spawn(async move { server.await });

                tokio::select! {
                    join_result = &mut server_task => {
                        if let Err(err) = join_result {
                            error!(error = %err, "Remote server task failed");
                        }
                    }
                    changed = shutdown_rx_wait.changed() => {
                        if changed.is_err() {
                            warn!("Remote shutdown channel closed");
                        }
                        match tokio::time::timeout(WS_SHUTDOWN_TIMEOUT, &mut server_task).await {
                            Ok(join_result) => {
                                if let Err(err) = join_result {
                                    error!(error = %err, "Remote server task failed");
                                }
                            }
                            Err(_) => {
                                warn!(
                                    timeout_ms = WS_SHUTDOWN_TIMEOUT.as_millis(),
                                    "Remote server shutdown timed out; aborting"
                                );
                                server_task.abort();
                            }
                        }
                    }
                }
            });
        })
        .map_err(|e| RemoteServerError::Io {
            operation: "spawn remote thread",
            source: e,
        })?;

    let handle = RemoteServerHandle {
        gateway,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
        state_path: config.state_path.clone(),
        local_addr,
        ws_url,
        started_at,
    };
    handle.publish_state(&handle.gateway.tokens().current());
    Ok(handle)
}

fn build_router(state: Arc<ServerState>) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.gateway.connection_count(),
        "limit": state.gateway.limit(),
    }))
}

async fn ws_handler(State(state): State<Arc<ServerState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>) {
    let (outbox, mut outbound) = mpsc::unbounded_channel();
    let socket_id = match state.gateway.connect(outbox) {
        Ok(id) => id,
        Err(err) => {
            debug!(error = %err, "Remote connection refused");
            while let Ok(item) = outbound.try_recv() {
                if !matches!(send_outbound(&mut socket, item).await, Ok(true)) {
                    break;
                }
            }
            return;
        }
    };

    run_socket(&mut socket, &state, socket_id, &mut outbound).await;

    let gateway = state.gateway.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || gateway.disconnect(socket_id)).await {
        error!(%socket_id, error = %err, "Remote disconnect task failed");
    }
}

async fn run_socket(
    socket: &mut WebSocket,
    state: &ServerState,
    socket_id: SocketId,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) {
    let mut shutdown_rx = state.shutdown_rx.clone();
    let mut parse_errors = 0u8;
    let mut last_seen = Instant::now();
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + WS_PING_INTERVAL,
        WS_PING_INTERVAL,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    warn!("Remote shutdown channel closed");
                }
                let _ = send_outbound(socket, Outbound::Close(CloseReason::Shutdown)).await;
                break;
            }
            item = outbound.recv() => {
                let Some(item) = item else {
                    break;
                };
                if !matches!(send_outbound(socket, item).await, Ok(true)) {
                    break;
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() >= WS_RECV_TIMEOUT {
                    debug!(%socket_id, "Remote client timed out");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                if send_with_timeout(socket, Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else {
                    break;
                };
                last_seen = Instant::now();

                match msg {
                    Message::Text(text) => {
                        let message = match ClientMessage::parse(&text) {
                            Ok(message) => message,
                            Err(err) => {
                                let reply = Outbound::Message(ServerMessage::error(err.to_string()));
                                if send_outbound(socket, reply).await.is_err() {
                                    break;
                                }
                                parse_errors = parse_errors.saturating_add(1);
                                if parse_errors >= WS_MAX_PARSE_ERRORS {
                                    let _ = socket.send(Message::Close(Some(CloseFrame {
                                        code: close_code::POLICY,
                                        reason: "too many parse errors".into(),
                                    }))).await;
                                    break;
                                }
                                continue;
                            }
                        };
                        parse_errors = 0;

                        let gateway = state.gateway.clone();
                        match tokio::task::spawn_blocking(move || gateway.handle(socket_id, message)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => debug!(%socket_id, error = %err, "Remote request failed"),
                            Err(err) => {
                                error!(%socket_id, error = %err, "Remote request task failed");
                                break;
                            }
                        }
                    }
                    Message::Binary(_) => {
                        let _ = socket.send(Message::Close(Some(CloseFrame {
                            code: close_code::PROTOCOL,
                            reason: "binary frames are not supported".into(),
                        }))).await;
                        break;
                    }
                    Message::Close(_) => break,
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                }
            }
        }
    }
}

/// Sends one gateway item. `Ok(false)` means the socket was closed on purpose.
async fn send_outbound(socket: &mut WebSocket, item: Outbound) -> Result<bool, ()> {
    match item {
        Outbound::Message(message) => {
            send_with_timeout(socket, Message::Text(message.to_json())).await?;
            Ok(true)
        }
        Outbound::Close(reason) => {
            let frame = CloseFrame {
                code: close_code_for(reason),
                reason: reason.as_str().into(),
            };
            send_with_timeout(socket, Message::Close(Some(frame))).await?;
            Ok(false)
        }
    }
}

async fn send_with_timeout(socket: &mut WebSocket, message: Message) -> Result<(), ()> {
    match tokio::time::timeout(WS_SEND_TIMEOUT, socket.send(message)).await {
        Ok(result) => result.map_err(|_| ()),
        Err(_) => Err(()),
    }
}

fn close_code_for(reason: CloseReason) -> u16 {
    match reason {
        CloseReason::Capacity => close_code::AGAIN,
        CloseReason::AuthFailed | CloseReason::Revoked => close_code::POLICY,
        CloseReason::Shutdown => close_code::AWAY,
    }
}

fn bind_listener(
    listen: &str,
    allow_remote: bool,
) -> Result<(std::net::TcpListener, SocketAddr), RemoteServerError> {
    let mut addrs = listen
        .to_socket_addrs()
        .map_err(|e| RemoteServerError::InvalidListen {
            message: e.to_string(),
        })?;
    let addr = addrs.next().ok_or_else(|| RemoteServerError::InvalidListen {
        message: "no resolved address".to_string(),
    })?;

    if !allow_remote && !addr.ip().is_loopback() {
        return Err(RemoteServerError::InvalidListen {
            message: "refusing to bind non-loopback address without PANEDECK_REMOTE_ALLOW_REMOTE=1"
                .to_string(),
        });
    }

    let listener = std::net::TcpListener::bind(addr).map_err(|e| RemoteServerError::Io {
        operation: "bind",
        source: e,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| RemoteServerError::Io {
            operation: "set non-blocking",
            source: e,
        })?;
    let local_addr = listener.local_addr().map_err(|e| RemoteServerError::Io {
        operation: "read local address",
        source: e,
    })?;
    Ok((listener, local_addr))
}

fn format_ws_url(addr: &SocketAddr) -> String {
    let host = match addr.ip() {
        std::net::IpAddr::V4(ip) => ip.to_string(),
        std::net::IpAddr::V6(ip) => format!("[{ip}]"),
    };
    format!("ws://{}:{}/ws", host, addr.port())
}

#[derive(Serialize)]
struct RemoteStateFile<'a> {
    pid: u32,
    ws_url: &'a str,
    listen: &'a str,
    token: &'a str,
    started_at: u64,
}

fn write_state_file(path: &Path, state: &RemoteStateFile<'_>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, serde_json::to_vec_pretty(state).unwrap_or_default())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600));
    }
    std::fs::rename(&tmp_path, path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
