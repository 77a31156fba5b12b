use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use panedeck_common::mutex_lock_or_recover;
use panedeck_pty::PtyControl;
use panedeck_pty::PtyError;
use panedeck_pty::PtySpawner;
use panedeck_pty::ShellProfile;
use panedeck_pty::TerminalSize;
use panedeck_session::OutputTarget;
use panedeck_session::ProcessStamp;
use panedeck_session::spawn_output_pump;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::AccessTokenStore;
use crate::ClientMessage;
use crate::ConnectionLimit;
use crate::EditionPolicy;
use crate::GatewayError;
use crate::ServerMessage;

/// Identifies one accepted socket for the lifetime of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Capacity,
    AuthFailed,
    Revoked,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Capacity => "connection limit reached",
            CloseReason::AuthFailed => "authentication failed",
            CloseReason::Revoked => "access token rotated",
            CloseReason::Shutdown => "server shutting down",
        }
    }
}

/// What the gateway asks the transport to do with a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(ServerMessage),
    Close(CloseReason),
}

pub type Outbox = UnboundedSender<Outbound>;

/// What happens to already-authenticated sockets when the token rotates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Only later `auth` attempts see the new token.
    #[default]
    NewConnectionsOnly,
    /// Authenticated sockets are closed and their terminals killed.
    RevokeAll,
}

impl FromStr for RotationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new-connections-only" | "new" => Ok(RotationPolicy::NewConnectionsOnly),
            "revoke-all" | "revoke" => Ok(RotationPolicy::RevokeAll),
            other => Err(format!("unknown token rotation policy '{other}'")),
        }
    }
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationPolicy::NewConnectionsOnly => f.write_str("new-connections-only"),
            RotationPolicy::RevokeAll => f.write_str("revoke-all"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub shell: ShellProfile,
    pub default_size: TerminalSize,
    pub rotation: RotationPolicy,
}

impl GatewayConfig {
    pub fn new(shell: ShellProfile) -> Self {
        Self {
            shell,
            default_size: TerminalSize::default(),
            rotation: RotationPolicy::default(),
        }
    }

    pub fn with_default_size(mut self, size: TerminalSize) -> Self {
        self.default_size = size;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }
}

type SharedControl = Arc<Mutex<Box<dyn PtyControl>>>;

struct RemoteTerminal {
    stamp: ProcessStamp,
    control: SharedControl,
}

struct Connection {
    authenticated: bool,
    spawning: bool,
    terminal: Option<RemoteTerminal>,
    outbox: Outbox,
}

impl Connection {
    fn send(&self, message: ServerMessage) {
        // A closed outbox means the socket task is already gone.
        let _ = self.outbox.send(Outbound::Message(message));
    }

    fn close(&self, reason: CloseReason) {
        let _ = self.outbox.send(Outbound::Close(reason));
    }
}

struct GatewayShared {
    spawner: Arc<dyn PtySpawner>,
    tokens: AccessTokenStore,
    edition: Arc<dyn EditionPolicy>,
    config: GatewayConfig,
    connections: Mutex<HashMap<SocketId, Connection>>,
    next_socket: AtomicU64,
    next_generation: AtomicU64,
}

impl GatewayShared {
    fn connections(&self) -> MutexGuard<'_, HashMap<SocketId, Connection>> {
        mutex_lock_or_recover(&self.connections)
    }
}

/// Connection registry and per-socket terminal lifecycle for remote clients.
///
/// Each socket owns at most one shell. Replies are pushed into the socket's
/// [`Outbox`] rather than returned, so PTY output and command replies share
/// one ordered stream.
#[derive(Clone)]
pub struct RemoteGateway {
    shared: Arc<GatewayShared>,
}

impl RemoteGateway {
    pub fn new(
        spawner: Arc<dyn PtySpawner>,
        tokens: AccessTokenStore,
        edition: Arc<dyn EditionPolicy>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            shared: Arc::new(GatewayShared {
                spawner,
                tokens,
                edition,
                config,
                connections: Mutex::new(HashMap::new()),
                next_socket: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn tokens(&self) -> &AccessTokenStore {
        &self.shared.tokens
    }

    pub fn rotation(&self) -> RotationPolicy {
        self.shared.config.rotation
    }

    pub fn limit(&self) -> ConnectionLimit {
        self.shared.edition.connection_limit()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections().len()
    }

    pub fn authenticated_count(&self) -> usize {
        self.shared
            .connections()
            .values()
            .filter(|conn| conn.authenticated)
            .count()
    }

    pub fn has_terminal(&self, socket: SocketId) -> bool {
        self.shared
            .connections()
            .get(&socket)
            .is_some_and(|conn| conn.terminal.is_some())
    }

    /// Registers a new socket if the edition ceiling allows it.
    ///
    /// The ceiling is checked before any authentication, so a client over
    /// capacity is refused without its token ever being read.
    pub fn connect(&self, outbox: Outbox) -> Result<SocketId, GatewayError> {
        let limit = self.limit();
        let mut connections = self.shared.connections();
        if !limit.admits(connections.len()) {
            let error = GatewayError::CapacityExceeded {
                limit: limit.as_option().unwrap_or_default(),
            };
            warn!(limit = %limit, "Rejecting remote connection over capacity");
            let _ = outbox.send(Outbound::Message(ServerMessage::error(error.client_message())));
            let _ = outbox.send(Outbound::Close(CloseReason::Capacity));
            return Err(error);
        }
        let socket = SocketId(self.shared.next_socket.fetch_add(1, Ordering::Relaxed));
        connections.insert(
            socket,
            Connection {
                authenticated: false,
                spawning: false,
                terminal: None,
                outbox,
            },
        );
        info!(%socket, connections = connections.len(), "Remote connection registered");
        Ok(socket)
    }

    pub fn handle(&self, socket: SocketId, message: ClientMessage) -> Result<(), GatewayError> {
        debug!(%socket, event = message.event_name(), "Remote message");
        match message {
            ClientMessage::Auth { token } => self.authenticate(socket, &token),
            ClientMessage::CreateTerminal { cwd, cols, rows } => {
                self.authorized(socket, || self.create_terminal(socket, cwd, cols, rows))
            }
            ClientMessage::TerminalInput { data } => {
                self.authorized(socket, || self.input(socket, data.as_bytes()))
            }
            ClientMessage::TerminalResize { cols, rows } => {
                self.authorized(socket, || self.resize(socket, cols, rows))
            }
            ClientMessage::KillTerminal => self.authorized(socket, || {
                self.kill_terminal(socket);
                Ok(())
            }),
        }
    }

    /// Runs `op` for an authenticated socket and reports its failure to the client.
    fn authorized(
        &self,
        socket: SocketId,
        op: impl FnOnce() -> Result<(), GatewayError>,
    ) -> Result<(), GatewayError> {
        self.require_authenticated(socket)?;
        let result = op();
        if let Err(err) = &result {
            self.send(socket, ServerMessage::error(err.client_message()));
        }
        result
    }

    /// Forgets a socket and kills its terminal, if any.
    pub fn disconnect(&self, socket: SocketId) -> bool {
        let removed = self.shared.connections().remove(&socket);
        let Some(conn) = removed else {
            return false;
        };
        if let Some(terminal) = conn.terminal {
            kill_control(&terminal.control, terminal.stamp);
        }
        info!(%socket, "Remote connection closed");
        true
    }

    /// Rotates the access token and applies the configured [`RotationPolicy`].
    pub fn regenerate_token(&self) -> String {
        let token = self.shared.tokens.regenerate();
        if self.shared.config.rotation == RotationPolicy::RevokeAll {
            let revoked = self.evict(|conn| conn.authenticated, CloseReason::Revoked);
            if revoked > 0 {
                info!(revoked, "Closed authenticated remote connections after token rotation");
            }
        }
        token
    }

    /// Closes every socket and kills every remote terminal.
    pub fn shutdown(&self) -> usize {
        self.evict(|_| true, CloseReason::Shutdown)
    }

    fn evict(&self, select: impl Fn(&Connection) -> bool, reason: CloseReason) -> usize {
        let evicted: Vec<Connection> = {
            let mut connections = self.shared.connections();
            let ids: Vec<SocketId> = connections
                .iter()
                .filter(|(_, conn)| select(conn))
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| connections.remove(id))
                .collect()
        };
        for conn in &evicted {
            if reason == CloseReason::Revoked {
                conn.send(ServerMessage::error(reason.as_str()));
            }
            conn.close(reason);
            if let Some(terminal) = &conn.terminal {
                kill_control(&terminal.control, terminal.stamp);
            }
        }
        evicted.len()
    }

    fn send(&self, socket: SocketId, message: ServerMessage) {
        if let Some(conn) = self.shared.connections().get(&socket) {
            conn.send(message);
        }
    }

    fn require_authenticated(&self, socket: SocketId) -> Result<(), GatewayError> {
        let connections = self.shared.connections();
        let conn = connections
            .get(&socket)
            .ok_or(GatewayError::UnknownSocket(socket))?;
        if conn.authenticated {
            return Ok(());
        }
        conn.send(ServerMessage::error(
            GatewayError::NotAuthenticated.client_message(),
        ));
        Err(GatewayError::NotAuthenticated)
    }

    fn authenticate(&self, socket: SocketId, token: &str) -> Result<(), GatewayError> {
        let valid = self.shared.tokens.validate(token);
        let mut connections = self.shared.connections();
        if valid {
            let conn = connections
                .get_mut(&socket)
                .ok_or(GatewayError::UnknownSocket(socket))?;
            conn.authenticated = true;
            conn.send(ServerMessage::AuthSuccess {});
            info!(%socket, "Remote client authenticated");
            return Ok(());
        }

        let conn = connections
            .remove(&socket)
            .ok_or(GatewayError::UnknownSocket(socket))?;
        drop(connections);
        warn!(%socket, "Remote client failed authentication");
        conn.send(ServerMessage::AuthError {
            message: "Invalid access token".to_string(),
        });
        conn.close(CloseReason::AuthFailed);
        if let Some(terminal) = conn.terminal {
            kill_control(&terminal.control, terminal.stamp);
        }
        Err(GatewayError::AuthFailed)
    }

    fn create_terminal(
        &self,
        socket: SocketId,
        cwd: Option<String>,
        cols: Option<u16>,
        rows: Option<u16>,
    ) -> Result<(), GatewayError> {
        let generation = {
            let mut connections = self.shared.connections();
            let conn = connections
                .get_mut(&socket)
                .ok_or(GatewayError::UnknownSocket(socket))?;
            if conn.terminal.is_some() || conn.spawning {
                return Err(GatewayError::DuplicateTerminal);
            }
            conn.spawning = true;
            self.shared.next_generation.fetch_add(1, Ordering::Relaxed)
        };

        let default_size = self.shared.config.default_size;
        let requested = TerminalSize::new(
            cols.unwrap_or(default_size.cols),
            rows.unwrap_or(default_size.rows),
        );
        let size = if requested.is_valid() {
            requested
        } else {
            default_size
        };
        let spec = self
            .shared
            .config
            .shell
            .spawn_spec()
            .with_cwd(cwd.map(PathBuf::from))
            .with_size(size);

        let spawned = match self.shared.spawner.spawn(&spec) {
            Ok(spawned) => spawned,
            Err(err) => {
                if let Some(conn) = self.shared.connections().get_mut(&socket) {
                    conn.spawning = false;
                }
                warn!(%socket, error = %err, "Failed to start remote terminal");
                return Err(err.into());
            }
        };

        let stamp = ProcessStamp::new(spawned.pid, generation);
        let control: SharedControl = Arc::new(Mutex::new(spawned.control));
        {
            let mut connections = self.shared.connections();
            let Some(conn) = connections.get_mut(&socket) else {
                drop(connections);
                debug!(%socket, %stamp, "Socket closed while spawning; killing terminal");
                kill_control(&control, stamp);
                return Err(GatewayError::UnknownSocket(socket));
            };
            conn.spawning = false;
            conn.terminal = Some(RemoteTerminal {
                stamp,
                control: Arc::clone(&control),
            });
            // Sent before the pump starts, so it always precedes output.
            conn.send(ServerMessage::TerminalReady { pid: stamp.pid });
        }
        info!(%socket, %stamp, program = %spec.program, "Remote terminal started");

        let target = Arc::new(RemoteTarget {
            socket,
            shared: Arc::clone(&self.shared),
        });
        if let Err(err) = spawn_output_pump(
            format!("remote-pump-{}", socket.0),
            stamp,
            spawned.events,
            target,
        ) {
            self.clear_terminal_if(socket, stamp);
            kill_control(&control, stamp);
            return Err(PtyError::Open(format!("failed to start output pump: {err}")).into());
        }
        Ok(())
    }

    fn terminal_control(&self, socket: SocketId) -> Result<SharedControl, GatewayError> {
        let connections = self.shared.connections();
        let conn = connections
            .get(&socket)
            .ok_or(GatewayError::UnknownSocket(socket))?;
        conn.terminal
            .as_ref()
            .map(|terminal| Arc::clone(&terminal.control))
            .ok_or(GatewayError::NoTerminal)
    }

    fn input(&self, socket: SocketId, data: &[u8]) -> Result<(), GatewayError> {
        let control = self.terminal_control(socket)?;
        mutex_lock_or_recover(&control).write(data)?;
        Ok(())
    }

    fn resize(&self, socket: SocketId, cols: u16, rows: u16) -> Result<(), GatewayError> {
        let size = TerminalSize::new(cols, rows);
        if !size.is_valid() {
            return Err(GatewayError::InvalidSize { cols, rows });
        }
        let control = self.terminal_control(socket)?;
        mutex_lock_or_recover(&control).resize(size)?;
        Ok(())
    }

    fn kill_terminal(&self, socket: SocketId) {
        let terminal = {
            let mut connections = self.shared.connections();
            let Some(conn) = connections.get_mut(&socket) else {
                return;
            };
            let terminal = conn.terminal.take();
            conn.send(ServerMessage::TerminalKilled {});
            terminal
        };
        if let Some(terminal) = terminal {
            kill_control(&terminal.control, terminal.stamp);
            info!(%socket, stamp = %terminal.stamp, "Remote terminal killed");
        }
    }

    fn clear_terminal_if(&self, socket: SocketId, stamp: ProcessStamp) {
        let mut connections = self.shared.connections();
        match connections.get_mut(&socket) {
            Some(conn) if conn.terminal.as_ref().is_some_and(|t| t.stamp == stamp) => {
                conn.terminal = None;
            }
            _ => {}
        }
    }
}

fn kill_control(control: &SharedControl, stamp: ProcessStamp) {
    if let Err(err) = mutex_lock_or_recover(control).kill() {
        warn!(%stamp, error = %err, "Failed to kill remote terminal");
    }
}

/// Routes one remote process's output to the socket that owns it.
struct RemoteTarget {
    socket: SocketId,
    shared: Arc<GatewayShared>,
}

impl OutputTarget for RemoteTarget {
    fn accept_data(&self, stamp: ProcessStamp, data: String) -> bool {
        let connections = self.shared.connections();
        match connections.get(&self.socket) {
            Some(conn) if conn.terminal.as_ref().is_some_and(|t| t.stamp == stamp) => {
                conn.send(ServerMessage::TerminalData { data });
                true
            }
            _ => false,
        }
    }

    fn accept_exit(&self, stamp: ProcessStamp, exit_code: i32) -> bool {
        let mut connections = self.shared.connections();
        match connections.get_mut(&self.socket) {
            Some(conn) if conn.terminal.as_ref().is_some_and(|t| t.stamp == stamp) => {
                conn.terminal = None;
                conn.send(ServerMessage::TerminalExit { exit_code });
                info!(socket = %self.socket, %stamp, exit_code, "Remote terminal exited");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_policy_parse() {
        assert_eq!(
            "new-connections-only".parse(),
            Ok(RotationPolicy::NewConnectionsOnly)
        );
        assert_eq!("REVOKE-ALL".parse(), Ok(RotationPolicy::RevokeAll));
        assert!("sometimes".parse::<RotationPolicy>().is_err());
        assert_eq!(RotationPolicy::default().to_string(), "new-connections-only");
    }

    #[test]
    fn test_socket_id_display() {
        assert_eq!(SocketId(7).to_string(), "socket-7");
    }
}
