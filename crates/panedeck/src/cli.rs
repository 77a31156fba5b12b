use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueHint;
use panedeck_common::telemetry::LogFormat;
use panedeck_common::telemetry::LogSettings;
use panedeck_pty::TerminalSize;
use panedeck_remote::ConnectionLimit;
use panedeck_remote::RotationPolicy;

use crate::HostConfig;
use crate::config::parse_agent_args;
use crate::config::valid_size_or_default;

const LONG_ABOUT: &str = "\
Host local terminals and an optional remote terminal for a split-pane UI.\n\
\n\
The UI sends one JSON request per line on stdin and reads responses and\n\
terminal output events as JSON lines on stdout. Logs go to stderr.";

const AFTER_LONG_HELP: &str = r#"REQUESTS:
    {"id":1,"method":"create","params":{"id":"t1","cwd":"/tmp"}}
    {"id":2,"method":"write","params":{"id":"t1","data":"ls\r"}}
    {"id":3,"method":"layout.select","params":{"layoutId":"horizontal-2"}}

EVENTS:
    {"event":"data","params":{"id":"t1","data":"..."}}
    {"event":"exit","params":{"id":"t1","exitCode":0}}

ENVIRONMENT:
    PANEDECK_COLS / PANEDECK_ROWS      Default terminal size
    PANEDECK_SHELL                     Shell program
    PANEDECK_AGENT / _AGENT_ARGS       Agent program and arguments
    PANEDECK_REMOTE_ENABLED            Start the remote WebSocket server
    PANEDECK_REMOTE_LISTEN             Remote listen address
    PANEDECK_REMOTE_MAX_CONNECTIONS    Connection limit or 'unlimited'
    RUST_LOG                           Log filter
    PANEDECK_LOG                       Log file (default: stderr)
    PANEDECK_LOG_FORMAT                text or json"#;

#[derive(Debug, Parser)]
#[command(name = "panedeck")]
#[command(author, version, propagate_version = true)]
#[command(about = "Multi-terminal PTY host for split-pane UIs")]
#[command(long_about = LONG_ABOUT)]
#[command(after_long_help = AFTER_LONG_HELP)]
pub struct Cli {
    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the JSON-lines command surface on stdin/stdout
    Serve,
    /// Print the resolved configuration as JSON
    Env,
}

/// Flags that take precedence over environment variables.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Default terminal columns
    #[arg(long, global = true, value_name = "COLS", help_heading = "Terminal Options")]
    pub cols: Option<u16>,

    /// Default terminal rows
    #[arg(long, global = true, value_name = "ROWS", help_heading = "Terminal Options")]
    pub rows: Option<u16>,

    /// Shell program for new terminals
    #[arg(
        long,
        global = true,
        value_name = "PROGRAM",
        value_hint = ValueHint::CommandName,
        help_heading = "Terminal Options"
    )]
    pub shell: Option<String>,

    /// Agent program started by `runAgent`
    #[arg(
        long,
        global = true,
        value_name = "PROGRAM",
        value_hint = ValueHint::CommandName,
        help_heading = "Agent Options"
    )]
    pub agent: Option<String>,

    /// Agent arguments, split with shell quoting rules
    #[arg(
        long,
        global = true,
        value_name = "ARGS",
        allow_hyphen_values = true,
        help_heading = "Agent Options"
    )]
    pub agent_args: Option<String>,

    /// Enable the remote WebSocket server
    #[arg(long, global = true, help_heading = "Remote Options")]
    pub remote: bool,

    /// Remote listen address (loopback unless remote binds are allowed)
    #[arg(long, global = true, value_name = "ADDR", help_heading = "Remote Options")]
    pub remote_listen: Option<String>,

    /// Concurrent remote connections: a number or 'unlimited'
    #[arg(long, global = true, value_name = "LIMIT", help_heading = "Remote Options")]
    pub remote_max_connections: Option<ConnectionLimit>,

    /// What regenerating the token does to live remote sessions
    #[arg(long, global = true, value_name = "POLICY", help_heading = "Remote Options")]
    pub token_rotation: Option<RotationPolicy>,

    /// Append logs to this file instead of stderr
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        help_heading = "Logging Options"
    )]
    pub log_file: Option<PathBuf>,

    /// Log line format: text or json
    #[arg(long, global = true, value_name = "FORMAT", help_heading = "Logging Options")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Resolves the environment and then applies command-line flags.
    pub fn host_config(&self) -> HostConfig {
        let mut config = HostConfig::from_env();
        self.overrides.apply(&mut config);
        config
    }

    /// Log settings from `PANEDECK_LOG*`, with the logging flags on top.
    pub fn log_settings(&self) -> LogSettings {
        let mut settings = LogSettings::from_env("info");
        if let Some(format) = self.overrides.log_format {
            settings = settings.with_format(format);
        }
        if let Some(path) = &self.overrides.log_file {
            settings = settings.with_file(path.clone());
        }
        settings
    }
}

impl Overrides {
    pub fn apply(&self, config: &mut HostConfig) {
        if self.cols.is_some() || self.rows.is_some() {
            let size = TerminalSize::new(
                self.cols.unwrap_or(config.default_size.cols),
                self.rows.unwrap_or(config.default_size.rows),
            );
            config.default_size = valid_size_or_default(size);
        }
        if let Some(shell) = non_blank(&self.shell) {
            config.shell = Some(shell.to_string());
        }
        if let Some(agent) = non_blank(&self.agent) {
            config.agent = agent.to_string();
        }
        if let Some(args) = &self.agent_args {
            config.agent_args = parse_agent_args(args);
        }
        if self.remote {
            config.remote.enabled = true;
        }
        if let Some(listen) = non_blank(&self.remote_listen) {
            config.remote.listen = listen.to_string();
        }
        if let Some(limit) = self.remote_max_connections {
            config.remote.max_connections = limit;
        }
        if let Some(rotation) = self.token_rotation {
            config.remote.rotation = rotation;
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
