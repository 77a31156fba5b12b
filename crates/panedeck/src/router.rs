use serde_json::json;

use crate::Host;
use crate::handlers;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;

/// Dispatches one request to its handler.
pub fn route(host: &Host, request: &RpcRequest) -> RpcResponse {
    match request.method.as_str() {
        "ping" => RpcResponse::success(request.id.clone(), json!({ "success": true, "pong": true })),

        "create" => handlers::terminal::handle_create(host, request),
        "runAgent" => handlers::terminal::handle_run_agent(host, request),
        "write" => handlers::terminal::handle_write(host, request),
        "resize" => handlers::terminal::handle_resize(host, request),
        "kill" => handlers::terminal::handle_kill(host, request),
        "list" => handlers::terminal::handle_list(host, request),

        "layout.get" => handlers::layout::handle_get(host, request),
        "layout.select" => handlers::layout::handle_select(host, request),
        "layout.assign" => handlers::layout::handle_assign(host, request),
        "layout.swap" => handlers::layout::handle_swap(host, request),
        "layout.ratios" => handlers::layout::handle_ratios(host, request),
        "layout.focus" => handlers::layout::handle_focus(host, request),

        "remote.status" => handlers::remote::handle_status(host, request),
        "remote.token" => handlers::remote::handle_token(host, request),
        "remote.regenerateToken" => handlers::remote::handle_regenerate_token(host, request),

        other => RpcResponse::method_not_found(request.id.clone(), other),
    }
}

/// Parses and routes one input line. Malformed lines get a parse error.
pub fn handle_line(host: &Host, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => route(host, &request),
        Err(err) => RpcResponse::parse_error(&format!("Parse error: {err}")),
    }
}
