//! Numeric error codes carried in command-surface failure results.

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

pub const GENERIC_ERROR: i32 = -32000;
pub const TERMINAL_NOT_FOUND: i32 = -32001;
pub const PTY_ERROR: i32 = -32008;
pub const COMMAND_NOT_FOUND: i32 = -32014;
pub const PERMISSION_DENIED: i32 = -32015;

pub const LAYOUT_ERROR: i32 = -32020;
pub const REMOTE_UNAVAILABLE: i32 = -32030;
