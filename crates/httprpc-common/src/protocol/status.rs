//! Outcome of one RPC call as a code/message pair.

use std::fmt;

use super::error::RpcError;

/// Code reported for failures that never reached the remote application.
pub const LOCAL_FAILURE: i32 = -1;

/// Result code of an RPC attempt.
///
/// - `0`: success
/// - negative: local or transport failure
/// - positive: HTTP status other than 200, with the response body as message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RpcStatus {
    pub code: i32,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self::new(LOCAL_FAILURE, message)
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.code, self.message)
    }
}

impl<T> From<&std::result::Result<T, RpcError>> for RpcStatus {
    fn from(result: &std::result::Result<T, RpcError>) -> Self {
        match result {
            Ok(_) => RpcStatus::ok(),
            Err(e) => e.status(),
        }
    }
}
