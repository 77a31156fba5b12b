use panedeck_common::TerminalId;
use panedeck_common::error_codes;
use panedeck_layout::LayoutError;
use panedeck_layout::SplitLayoutState;
use serde_json::json;

use super::param;
use crate::Host;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;

/// Applies `change` and answers with the resulting layout.
fn update(
    host: &Host,
    request: &RpcRequest,
    change: impl FnOnce(&mut SplitLayoutState) -> Result<(), LayoutError>,
) -> RpcResponse {
    let mut layout = host.layout();
    match change(&mut layout) {
        Ok(()) => RpcResponse::action_success_with(request.id.clone(), json!({ "layout": *layout })),
        Err(err) => RpcResponse::action_failed(
            request.id.clone(),
            error_codes::LAYOUT_ERROR,
            &err.to_string(),
            Some(err.suggestion()),
        ),
    }
}

pub fn handle_get(host: &Host, request: &RpcRequest) -> RpcResponse {
    update(host, request, |_| Ok(()))
}

pub fn handle_select(host: &Host, request: &RpcRequest) -> RpcResponse {
    let layout_id = param!(request.require_str("layoutId"));
    update(host, request, |layout| layout.select_layout(layout_id))
}

/// `terminalId` may be omitted or null to clear the panel.
pub fn handle_assign(host: &Host, request: &RpcRequest) -> RpcResponse {
    let panel_id = param!(request.require_str("panelId"));
    let terminal = if request.has_param("terminalId") {
        Some(param!(request.require_terminal_id("terminalId")))
    } else {
        None
    };
    update(host, request, |layout| layout.assign(panel_id, terminal))
}

pub fn handle_swap(host: &Host, request: &RpcRequest) -> RpcResponse {
    let terminal: TerminalId = param!(request.require_terminal_id("terminalId"));
    let panel_id = param!(request.require_str("panelId"));
    update(host, request, |layout| layout.swap(&terminal, panel_id))
}

/// Non-numeric entries count as invalid ratios and are treated as zero.
pub fn handle_ratios(host: &Host, request: &RpcRequest) -> RpcResponse {
    let Some(values) = request.param_array("ratios") else {
        return RpcResponse::invalid_params(request.id.clone(), "Missing 'ratios' param".to_string());
    };
    let ratios: Vec<f64> = values
        .iter()
        .map(|v| v.as_f64().unwrap_or(f64::NAN))
        .collect();
    update(host, request, |layout| layout.update_ratios(&ratios))
}

pub fn handle_focus(host: &Host, request: &RpcRequest) -> RpcResponse {
    let panel_id = param!(request.require_str("panelId"));
    update(host, request, |layout| layout.set_active_panel(panel_id))
}
