//! Request and response envelopes of the stdio command surface.

use panedeck_common::TerminalId;
use panedeck_common::error_codes;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref()?.get(key).filter(|v| !v.is_null())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(|v| v.as_str())
    }

    pub fn param_u16(&self, key: &str) -> Option<u16> {
        self.param(key)
            .and_then(|v| v.as_u64())
            .and_then(|n| u16::try_from(n).ok())
    }

    pub fn param_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.param(key)?.as_array()
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    #[allow(clippy::result_large_err)]
    pub fn require_str(&self, key: &str) -> Result<&str, RpcResponse> {
        self.param_str(key)
            .ok_or_else(|| RpcResponse::invalid_params(self.id.clone(), format!("Missing '{key}' param")))
    }

    #[allow(clippy::result_large_err)]
    pub fn require_u16(&self, key: &str) -> Result<u16, RpcResponse> {
        self.param_u16(key).ok_or_else(|| {
            RpcResponse::invalid_params(
                self.id.clone(),
                format!("Missing or invalid '{key}' param (expected 0-65535)"),
            )
        })
    }

    /// Reads a terminal id, rejecting blank values.
    #[allow(clippy::result_large_err)]
    pub fn require_terminal_id(&self, key: &str) -> Result<TerminalId, RpcResponse> {
        let id = TerminalId::new(self.require_str(key)?);
        if id.is_empty() {
            return Err(RpcResponse::invalid_params(
                self.id.clone(),
                format!("'{key}' must not be empty"),
            ));
        }
        Ok(id)
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcServerError>,
}

#[derive(Debug, Serialize)]
pub struct RpcServerError {
    code: i32,
    message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Protocol-level failure: the request itself could not be understood.
    pub fn error(id: Value, code: i32, message: &str) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcServerError {
                code,
                message: message.to_string(),
            }),
        }
    }

    pub fn parse_error(message: &str) -> Self {
        Self::error(Value::Null, error_codes::PARSE_ERROR, message)
    }

    pub fn action_success(id: Value) -> Self {
        Self::success(id, json!({ "success": true }))
    }

    /// `{"success": true}` merged with the fields of `extra`.
    pub fn action_success_with(id: Value, extra: Value) -> Self {
        let mut result = match extra {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        result.insert("success".to_string(), Value::Bool(true));
        Self::success(id, Value::Object(result))
    }

    pub fn action_failed(id: Value, code: i32, message: &str, suggestion: Option<String>) -> Self {
        let mut result = json!({
            "success": false,
            "error": message,
            "code": code,
        });
        if let (Some(suggestion), Some(map)) = (suggestion, result.as_object_mut()) {
            map.insert("suggestion".to_string(), Value::String(suggestion));
        }
        Self::success(id, result)
    }

    pub fn invalid_params(id: Value, message: String) -> Self {
        Self::action_failed(id, error_codes::INVALID_PARAMS, &message, None)
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::action_failed(
            id,
            error_codes::METHOD_NOT_FOUND,
            &format!("unknown method '{method}'"),
            None,
        )
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.result
            .as_ref()
            .and_then(|r| r.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"id":null,"error":{"code":-32603,"message":"failed to serialize response"}}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(params: Value) -> RpcRequest {
        RpcRequest::new(7, "test", params)
    }

    #[test]
    fn test_param_helpers() {
        let req = request(json!({"id": "t1", "cols": 120, "big": 70000, "gone": null}));
        assert_eq!(req.param_str("id"), Some("t1"));
        assert_eq!(req.param_u16("cols"), Some(120));
        assert_eq!(req.param_u16("big"), None);
        assert!(!req.has_param("gone"));
        assert!(req.has_param("id"));
    }

    #[test]
    fn test_require_terminal_id_rejects_blank() {
        let req = request(json!({"id": "  "}));
        let response = req.require_terminal_id("id").unwrap_err();
        assert!(!response.is_success());
        let result = response.result().unwrap();
        assert_eq!(result["code"], error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_missing_param_is_structured_failure() {
        let req = RpcRequest {
            id: json!("abc"),
            method: "write".to_string(),
            params: None,
        };
        let response = req.require_str("data").unwrap_err();
        let line: Value = serde_json::from_str(&response.to_line()).unwrap();
        assert_eq!(line["id"], "abc");
        assert_eq!(line["result"]["success"], false);
        assert_eq!(line["result"]["error"], "Missing 'data' param");
    }

    #[test]
    fn test_parse_error_shape() {
        let line: Value = serde_json::from_str(&RpcResponse::parse_error("bad").to_line()).unwrap();
        assert_eq!(
            line,
            json!({"id": null, "error": {"code": -32700, "message": "bad"}})
        );
    }

    #[test]
    fn test_action_success_with_merges_fields() {
        let response = RpcResponse::action_success_with(json!(1), json!({"pid": 42}));
        assert!(response.is_success());
        assert_eq!(response.result().unwrap()["pid"], 42);
    }
}
