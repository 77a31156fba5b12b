pub mod layout;
pub mod remote;
pub mod terminal;

use panedeck_session::SessionError;
use serde_json::Value;

use crate::rpc::RpcResponse;

pub fn session_error_response(id: Value, err: &SessionError) -> RpcResponse {
    RpcResponse::action_failed(id, err.code(), &err.to_string(), Some(err.suggestion()))
}

/// Unwraps a parameter or returns its failure response from the handler.
macro_rules! param {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(response) => return response,
        }
    };
}

pub(crate) use param;
