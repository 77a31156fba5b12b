use panedeck_common::error_codes;
use panedeck_remote::RemoteServerHandle;
use serde_json::json;

use crate::Host;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;

fn with_remote(
    host: &Host,
    request: &RpcRequest,
    f: impl FnOnce(&RemoteServerHandle) -> serde_json::Value,
) -> RpcResponse {
    let remote = host.remote();
    match remote.as_ref() {
        Some(handle) => RpcResponse::action_success_with(request.id.clone(), f(handle)),
        None => RpcResponse::action_failed(
            request.id.clone(),
            error_codes::REMOTE_UNAVAILABLE,
            "remote access is disabled",
            Some("Set PANEDECK_REMOTE_ENABLED=1 and restart panedeck.".to_string()),
        ),
    }
}

/// Reports `enabled: false` instead of failing when remote access is off.
pub fn handle_status(host: &Host, request: &RpcRequest) -> RpcResponse {
    let remote = host.remote();
    let fields = match remote.as_ref() {
        Some(handle) => {
            let gateway = handle.gateway();
            json!({
                "enabled": true,
                "url": handle.ws_url(),
                "connections": gateway.connection_count(),
                "authenticated": gateway.authenticated_count(),
                "limit": gateway.limit(),
                "tokenRotation": gateway.rotation().to_string(),
            })
        }
        None => json!({ "enabled": false }),
    };
    RpcResponse::action_success_with(request.id.clone(), fields)
}

pub fn handle_token(host: &Host, request: &RpcRequest) -> RpcResponse {
    with_remote(host, request, |handle| {
        json!({ "token": handle.gateway().tokens().current(), "url": handle.ws_url() })
    })
}

pub fn handle_regenerate_token(host: &Host, request: &RpcRequest) -> RpcResponse {
    with_remote(host, request, |handle| {
        json!({ "token": handle.regenerate_token(), "url": handle.ws_url() })
    })
}
