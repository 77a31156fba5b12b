use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use panedeck_common::mutex_lock_or_recover;
use panedeck_layout::SplitLayoutState;
use panedeck_pty::NativePtySpawner;
use panedeck_pty::PtySpawner;
use panedeck_remote::AccessTokenStore;
use panedeck_remote::RemoteGateway;
use panedeck_remote::RemoteServerError;
use panedeck_remote::RemoteServerHandle;
use panedeck_remote::StaticEdition;
use panedeck_remote::start_remote_server;
use panedeck_session::LocalFanout;
use panedeck_session::SessionManager;
use tracing::error;
use tracing::info;

use crate::HostConfig;

/// Process-wide state behind the command surface.
pub struct Host {
    sessions: SessionManager,
    fanout: Arc<LocalFanout>,
    layout: Mutex<SplitLayoutState>,
    remote: Mutex<Option<RemoteServerHandle>>,
}

impl Host {
    pub fn new(
        sessions: SessionManager,
        fanout: Arc<LocalFanout>,
        remote: Option<RemoteServerHandle>,
    ) -> Self {
        Self {
            sessions,
            fanout,
            layout: Mutex::new(SplitLayoutState::default()),
            remote: Mutex::new(remote),
        }
    }

    /// Builds the production host: native PTYs, local fan-out and, when
    /// enabled, the remote server.
    ///
    /// A remote server that fails to start is logged and left out; local
    /// terminals keep working.
    pub fn start(config: &HostConfig) -> Self {
        let spawner: Arc<dyn PtySpawner> = Arc::new(NativePtySpawner::new());
        let fanout = Arc::new(LocalFanout::new());
        let sessions = SessionManager::new(
            Arc::clone(&spawner),
            fanout.clone(),
            config.session_config(),
        );

        let gateway = RemoteGateway::new(
            spawner,
            AccessTokenStore::new(),
            Arc::new(StaticEdition(config.remote.max_connections)),
            config.gateway_config(),
        );
        let remote = match start_remote_server(gateway, &config.remote) {
            Ok(handle) => {
                info!(url = handle.ws_url(), "Remote access enabled");
                Some(handle)
            }
            Err(RemoteServerError::Disabled) => None,
            Err(err) => {
                error!(error = %err, "Remote access unavailable");
                None
            }
        };

        Self::new(sessions, fanout, remote)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn fanout(&self) -> &Arc<LocalFanout> {
        &self.fanout
    }

    pub fn layout(&self) -> MutexGuard<'_, SplitLayoutState> {
        mutex_lock_or_recover(&self.layout)
    }

    pub fn remote(&self) -> MutexGuard<'_, Option<RemoteServerHandle>> {
        mutex_lock_or_recover(&self.remote)
    }

    /// Stops every terminal and the remote server.
    pub fn shutdown(&self) {
        let killed = self.sessions.shutdown();
        let remote = self.remote().take();
        if let Some(remote) = remote {
            remote.shutdown();
        }
        self.fanout.detach();
        info!(killed, "Host shut down");
    }
}
