use std::path::PathBuf;

use panedeck_pty::TerminalSize;
use panedeck_session::CreateOutcome;
use panedeck_session::KillOutcome;
use serde_json::Value;
use serde_json::json;
use tracing::debug_span;

use super::param;
use super::session_error_response;
use crate::Host;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;

fn cwd_param(request: &RpcRequest) -> Option<PathBuf> {
    request
        .param_str("cwd")
        .filter(|cwd| !cwd.trim().is_empty())
        .map(PathBuf::from)
}

fn outcome_fields(outcome: &CreateOutcome) -> Value {
    match outcome {
        CreateOutcome::Created { pid } => json!({ "status": "created", "pid": pid }),
        CreateOutcome::AlreadyRunning => json!({ "status": "alreadyRunning" }),
        CreateOutcome::FellBack { pid, reason } => json!({
            "status": "fellBack",
            "pid": pid,
            "fallbackReason": reason,
        }),
        CreateOutcome::Cancelled => json!({ "status": "cancelled" }),
    }
}

pub fn handle_create(host: &Host, request: &RpcRequest) -> RpcResponse {
    let id = param!(request.require_terminal_id("id"));
    let _span = debug_span!("create", %id).entered();
    match host.sessions().create(&id, cwd_param(request)) {
        Ok(outcome) => RpcResponse::action_success_with(request.id.clone(), outcome_fields(&outcome)),
        Err(err) => session_error_response(request.id.clone(), &err),
    }
}

pub fn handle_run_agent(host: &Host, request: &RpcRequest) -> RpcResponse {
    let id = param!(request.require_terminal_id("id"));
    let _span = debug_span!("run_agent", %id).entered();
    match host.sessions().run_agent(&id, cwd_param(request)) {
        Ok(outcome) => RpcResponse::action_success_with(request.id.clone(), outcome_fields(&outcome)),
        Err(err) => session_error_response(request.id.clone(), &err),
    }
}

pub fn handle_write(host: &Host, request: &RpcRequest) -> RpcResponse {
    let id = param!(request.require_terminal_id("id"));
    let data = param!(request.require_str("data"));
    match host.sessions().write(&id, data.as_bytes()) {
        Ok(()) => RpcResponse::action_success(request.id.clone()),
        Err(err) => session_error_response(request.id.clone(), &err),
    }
}

pub fn handle_resize(host: &Host, request: &RpcRequest) -> RpcResponse {
    let id = param!(request.require_terminal_id("id"));
    let cols = param!(request.require_u16("cols"));
    let rows = param!(request.require_u16("rows"));
    match host.sessions().resize(&id, TerminalSize::new(cols, rows)) {
        Ok(()) => RpcResponse::action_success(request.id.clone()),
        Err(err) => session_error_response(request.id.clone(), &err),
    }
}

/// Kill never fails; a terminal that is already gone is reported as such.
/// Panels keep pointing at the killed id until the UI reassigns them.
pub fn handle_kill(host: &Host, request: &RpcRequest) -> RpcResponse {
    let id = param!(request.require_terminal_id("id"));
    let fields = match host.sessions().kill(&id) {
        KillOutcome::Killed { pid } => json!({ "status": "killed", "pid": pid }),
        KillOutcome::CancelledPending => json!({ "status": "cancelledPending" }),
        KillOutcome::AlreadyAbsent => json!({ "status": "alreadyAbsent" }),
    };
    RpcResponse::action_success_with(request.id.clone(), fields)
}

pub fn handle_list(host: &Host, request: &RpcRequest) -> RpcResponse {
    RpcResponse::action_success_with(
        request.id.clone(),
        json!({ "terminals": host.sessions().list() }),
    )
}
